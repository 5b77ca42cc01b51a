// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含系统的核心业务逻辑，包括：
/// - 领域模型（models）：原始数据、子任务、执行计划与蓝图
/// - 插件（plugin）：插件特质与显式注册表
/// - 仓库接口（repositories）：数据持久化抽象接口
/// - 服务（services）：领域服务和业务规则
///
/// 领域层不依赖于任何具体的存储或调度实现。
pub mod models;
pub mod plugin;
pub mod repositories;
pub mod services;
