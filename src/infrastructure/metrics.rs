// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

/// 启动 Prometheus 指标导出器
///
/// # 参数
///
/// * `addr` - 监听地址，例如 `0.0.0.0:9000`
///
/// # 返回值
///
/// 地址无法解析时返回错误；导出器安装失败（例如端口被占用）只记录警告
pub fn init_metrics(addr: &str) -> Result<(), std::net::AddrParseError> {
    let addr: SocketAddr = addr.parse()?;

    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!("Failed to install Prometheus recorder: {}. This might happen if the port is already in use.", e);
        return Ok(());
    }

    info!("Metrics exporter listening on {}", addr);
    Ok(())
}
