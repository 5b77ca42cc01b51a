// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 领域层只依赖这些抽象，具体实现由基础设施层基于 sea-orm 提供：
/// - 原始数据仓库（raw_data_repository）：`_raw_*` 表的读写
/// - 批量写入（bulk_writer）：转换后实体的分表批量 upsert
/// - 蓝图仓库（blueprint_repository）：蓝图配置的持久化
pub mod blueprint_repository;
pub mod bulk_writer;
pub mod raw_data_repository;
