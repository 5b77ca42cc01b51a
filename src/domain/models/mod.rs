// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// - 原始数据（raw_data）：采集器写入的原始记录及其来源
/// - 子任务（subtask）：插件声明的执行步骤与运行上下文
/// - 流水线计划（pipeline_plan）：按阶段组织的任务列表
/// - 蓝图（blueprint）：项目级同步配置与触发方式
/// - 流水线（pipeline）：一次计划执行的记录
pub mod blueprint;
pub mod pipeline;
pub mod pipeline_plan;
pub mod raw_data;
pub mod subtask;
