// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::collector::rate_limiter::ApiRateLimiter;
use crate::collector::traits::{ApiResponse, CollectorError};
use crate::config::settings::CollectorSettings;
use crate::utils::retry_policy::{is_retryable_status, is_retryable_transport, RetryPolicy};

/// API 客户端选项
#[derive(Debug, Clone)]
pub struct ApiClientOptions {
    /// 每个请求附带的请求头
    pub headers: HashMap<String, String>,
    /// 请求超时时间
    pub timeout: Duration,
    /// 每分钟请求数上限，0 表示不限
    pub requests_per_minute: u32,
    /// 最大在途请求数
    pub max_outstanding: usize,
    /// 重试策略
    pub retry: RetryPolicy,
}

impl Default for ApiClientOptions {
    fn default() -> Self {
        Self {
            headers: HashMap::new(),
            timeout: Duration::from_secs(60),
            requests_per_minute: 0,
            max_outstanding: 5,
            retry: RetryPolicy::standard(),
        }
    }
}

impl ApiClientOptions {
    /// 由采集器配置构造
    pub fn from_settings(settings: &CollectorSettings) -> Self {
        Self {
            headers: HashMap::new(),
            timeout: settings.timeout(),
            requests_per_minute: settings.requests_per_minute,
            max_outstanding: settings.concurrency,
            retry: settings.retry_policy(),
        }
    }

    /// 追加请求头
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// 限速 API 客户端
///
/// 所有请求都先经过 [`ApiRateLimiter`] 准入，可重试的失败按退避策略重试，
/// 非成功状态码原样返回给调用方，由采集器决定是否降级
pub struct ApiClient {
    http: reqwest::Client,
    endpoint: Url,
    limiter: Arc<ApiRateLimiter>,
    retry: RetryPolicy,
}

impl ApiClient {
    /// 创建新的 API 客户端实例
    ///
    /// # 参数
    ///
    /// * `endpoint` - API 根地址，相对路径基于它解析
    /// * `options` - 客户端选项
    ///
    /// # 返回值
    ///
    /// * `Ok(ApiClient)` - 客户端
    /// * `Err(CollectorError)` - 地址或请求头无效
    pub fn new(endpoint: &str, options: ApiClientOptions) -> Result<Self, CollectorError> {
        let mut endpoint = Url::parse(endpoint)?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        for (k, v) in &options.headers {
            let name = HeaderName::from_bytes(k.as_bytes())
                .map_err(|e| CollectorError::InvalidArgs(format!("header {}: {}", k, e)))?;
            let value = HeaderValue::from_str(v)
                .map_err(|e| CollectorError::InvalidArgs(format!("header {}: {}", k, e)))?;
            headers.insert(name, value);
        }

        let http = reqwest::Client::builder()
            .user_agent("ingestrs/0.1")
            .timeout(options.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            endpoint,
            limiter: Arc::new(ApiRateLimiter::new(
                options.requests_per_minute,
                options.max_outstanding,
            )),
            retry: options.retry,
        })
    }

    /// 解析请求地址
    ///
    /// 绝对地址原样使用，相对地址基于 endpoint 拼接
    pub fn resolve(&self, path: &str) -> Result<Url, CollectorError> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Url::parse(path)?);
        }
        Ok(self.endpoint.join(path.trim_start_matches('/'))?)
    }

    /// 发送 GET 请求
    ///
    /// # 参数
    ///
    /// * `path` - 相对或绝对地址
    /// * `query` - 查询参数
    /// * `cancel` - 取消令牌
    ///
    /// # 返回值
    ///
    /// * `Ok(ApiResponse)` - 任意状态码的最终响应
    /// * `Err(CollectorError)` - 传输错误（重试耗尽）或已取消
    pub async fn get(
        &self,
        path: &str,
        query: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, CollectorError> {
        let url = self.resolve(path)?;
        let mut attempt: u32 = 0;

        loop {
            let permit = self.limiter.acquire(cancel).await?;
            debug!("GET {} (attempt {})", url, attempt + 1);

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CollectorError::Cancelled),
                res = self.http.get(url.clone()).query(query).send() => res,
            };

            let delay = match sent {
                Ok(response) => {
                    let status = response.status().as_u16();
                    counter!("collector_requests_total", "status" => status.to_string())
                        .increment(1);

                    if is_retryable_status(status) && self.retry.should_retry(attempt) {
                        let backoff = self.retry.calculate_backoff(attempt + 1);
                        let delay = retry_after(response.headers())
                            .map(|d| d.min(self.retry.max_backoff).max(backoff))
                            .unwrap_or(backoff);
                        warn!(
                            "GET {} returned {}, retrying in {:?}",
                            url, status, delay
                        );
                        delay
                    } else {
                        let final_url = response.url().to_string();
                        let headers = response.headers().clone();
                        let body = tokio::select! {
                            body = response.bytes() => body?,
                            _ = cancel.cancelled() => return Err(CollectorError::Cancelled),
                        };
                        return Ok(ApiResponse {
                            status,
                            url: final_url,
                            headers,
                            body,
                        });
                    }
                }
                Err(e) if is_retryable_transport(&e) && self.retry.should_retry(attempt) => {
                    let delay = self.retry.calculate_backoff(attempt + 1);
                    warn!("GET {} failed: {}, retrying in {:?}", url, e, delay);
                    delay
                }
                Err(e) => return Err(CollectorError::Request(e)),
            };

            drop(permit);
            attempt += 1;
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(CollectorError::Cancelled),
            }
        }
    }
}

/// 解析 Retry-After 响应头（仅支持秒数）
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
#[path = "api_client_test.rs"]
mod tests;
