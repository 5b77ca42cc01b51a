// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 采集模块
///
/// 限流的分页采集器、原始数据抽取器与数据转换器
pub mod collector;

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 包含核心业务实体、插件注册表、服务和仓库接口
pub mod domain;

/// 基础设施模块
///
/// 提供数据库、cron 与指标导出等外部集成
pub mod infrastructure;

/// 队列模块
///
/// 蓝图调度
pub mod queue;

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
pub mod utils;

/// 工作器模块
///
/// 流水线执行
pub mod workers;
