// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 包含的服务：
/// - 批量保存分流器（batch_save_divider）：按实体类型缓冲并批量写入
/// - 蓝图服务（blueprint_service）：蓝图增删改查、手动触发与调度重载
/// - 领域ID生成器（domain_id）：跨插件的确定性ID
/// - 计划构建器（plan_builder）：子任务排序与分阶段执行计划
pub mod batch_save_divider;
pub mod blueprint_service;
pub mod domain_id;
pub mod plan_builder;
