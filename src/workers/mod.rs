// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 按阶段执行流水线计划
pub mod pipeline_runner;

pub use pipeline_runner::{PipelineExecutor, PipelineRunner};
