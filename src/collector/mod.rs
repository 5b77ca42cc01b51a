// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 采集模块
///
/// 从分页 REST 接口拉取原始数据，并把原始数据抽取、转换为实体：
/// - 限流客户端（api_client、rate_limiter）：准入控制与重试
/// - 节拍池（tick_pool）：有界并发的后台任务池
/// - 采集器（api_collector）：分页请求写入 `_raw_*` 表
/// - 抽取器与转换器（api_extractor、data_converter）：经批量保存分流器写入实体表
pub mod api_client;
pub mod api_collector;
pub mod api_extractor;
pub mod data_converter;
pub mod iterator;
pub mod rate_limiter;
pub mod tick_pool;
pub mod traits;
pub mod url_template;

pub use api_collector::{ApiCollector, ApiCollectorArgs};
pub use api_extractor::{ApiExtractor, ApiExtractorArgs};
pub use data_converter::{DataConverter, DataConverterArgs};
pub use traits::CollectorError;
