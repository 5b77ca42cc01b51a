// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::collector::traits::CollectorError;

/// 请求准入许可
///
/// 持有期间占用一个在途请求名额，drop 时归还
#[derive(Debug)]
pub struct RatePermit {
    _permit: OwnedSemaphorePermit,
}

/// API 速率限制器
///
/// 采集器唯一的准入控制点：同时限制每分钟请求数和在途请求数。
/// 所有连接器的并发限制都经由它，而不是各自维护信号量。
pub struct ApiRateLimiter {
    /// 每分钟请求配额，为 None 时不限速
    quota: Option<DefaultDirectRateLimiter>,
    /// 在途请求信号量
    outstanding: Arc<Semaphore>,
}

impl ApiRateLimiter {
    /// 创建新的速率限制器实例
    ///
    /// # 参数
    ///
    /// * `requests_per_minute` - 每分钟请求数上限，0 表示不限
    /// * `max_outstanding` - 最大在途请求数，至少为 1
    pub fn new(requests_per_minute: u32, max_outstanding: usize) -> Self {
        let quota = NonZeroU32::new(requests_per_minute)
            .map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)));
        Self {
            quota,
            outstanding: Arc::new(Semaphore::new(max_outstanding.max(1))),
        }
    }

    /// 不限速，仅限制在途请求数
    pub fn unlimited(max_outstanding: usize) -> Self {
        Self::new(0, max_outstanding)
    }

    /// 等待直到预算允许发出下一个请求
    ///
    /// 先占用在途名额，再等待速率配额；两处等待都响应取消
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<RatePermit, CollectorError> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CollectorError::Cancelled),
            permit = self.outstanding.clone().acquire_owned() => {
                permit.map_err(|_| CollectorError::Cancelled)?
            }
        };

        if let Some(quota) = &self.quota {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CollectorError::Cancelled),
                _ = quota.until_ready() => {}
            }
        }

        Ok(RatePermit { _permit: permit })
    }

    /// 当前可用的在途名额
    pub fn available(&self) -> usize {
        self.outstanding.available_permits()
    }

    /// 关闭限制器，之后的 acquire 立即失败
    pub fn close(&self) {
        self.outstanding.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_permits_bound_outstanding_requests() {
        let limiter = ApiRateLimiter::unlimited(2);
        let cancel = CancellationToken::new();

        let first = limiter.acquire(&cancel).await.unwrap();
        let _second = limiter.acquire(&cancel).await.unwrap();
        assert_eq!(limiter.available(), 0);

        drop(first);
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn test_acquire_observes_cancellation() {
        let limiter = ApiRateLimiter::unlimited(1);
        let cancel = CancellationToken::new();
        let _held = limiter.acquire(&cancel).await.unwrap();

        cancel.cancel();
        let result = limiter.acquire(&cancel).await;
        assert!(matches!(result, Err(CollectorError::Cancelled)));
    }

    #[tokio::test]
    async fn test_quota_defers_requests_beyond_burst() {
        // 每分钟 2 次：前两次立即放行，第三次需要等待约 30 秒
        let limiter = ApiRateLimiter::new(2, 8);
        let cancel = CancellationToken::new();
        drop(limiter.acquire(&cancel).await.unwrap());
        drop(limiter.acquire(&cancel).await.unwrap());

        let third = tokio::time::timeout(Duration::from_millis(200), limiter.acquire(&cancel)).await;
        assert!(third.is_err());
        assert_eq!(limiter.available(), 8);
    }

    #[tokio::test]
    async fn test_quota_wait_observes_cancellation() {
        let limiter = ApiRateLimiter::new(1, 4);
        let cancel = CancellationToken::new();
        drop(limiter.acquire(&cancel).await.unwrap());

        let trigger = cancel.clone();
        let (result, _) = tokio::join!(limiter.acquire(&cancel), async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        assert!(matches!(result, Err(CollectorError::Cancelled)));
    }

    #[tokio::test]
    async fn test_closed_limiter_rejects() {
        let limiter = ApiRateLimiter::new(600, 1);
        limiter.close();
        let result = limiter.acquire(&CancellationToken::new()).await;
        assert!(matches!(result, Err(CollectorError::Cancelled)));
    }
}
