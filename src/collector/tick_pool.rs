// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::collector::api_client::ApiClient;
use crate::collector::traits::{ApiResponse, CollectorError};

/// 异步任务池
///
/// 采集器的调度核心：`next_tick` 在有空闲槽位时启动一个任务，
/// `wait_async` 等待所有在途任务完成。任意任务失败后池内令牌被取消，
/// 其余任务尽快退出，第一个真实错误由 `wait_async` 返回。
///
/// 池在 drop 时取消并中止所有剩余任务，保证每次采集的清理在任何退出路径上都执行一次。
pub struct TickPool {
    slots: Arc<Semaphore>,
    tasks: JoinSet<Result<(), CollectorError>>,
    cancel: CancellationToken,
    parent: CancellationToken,
    first_error: Option<CollectorError>,
}

impl TickPool {
    /// 创建新的任务池
    ///
    /// # 参数
    ///
    /// * `concurrency` - 同时运行的任务数上限，至少为 1
    /// * `parent` - 上层取消令牌
    pub fn new(concurrency: usize, parent: &CancellationToken) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(concurrency.max(1))),
            tasks: JoinSet::new(),
            cancel: parent.child_token(),
            parent: parent.clone(),
            first_error: None,
        }
    }

    /// 池内任务共享的取消令牌
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 在槽位空闲时调度一个任务
    ///
    /// 池已被取消（上层取消或已有任务失败）时返回 `Cancelled`，
    /// 真实错误通过 [`TickPool::wait_async`] 获取
    pub async fn next_tick<F>(&mut self, job: F) -> Result<(), CollectorError>
    where
        F: Future<Output = Result<(), CollectorError>> + Send + 'static,
    {
        self.reap();

        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(CollectorError::Cancelled),
            permit = self.slots.clone().acquire_owned() => {
                permit.map_err(|_| CollectorError::Cancelled)?
            }
        };

        let token = self.cancel.clone();
        self.tasks.spawn(async move {
            let _permit = permit;
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(CollectorError::Cancelled),
                result = job => result,
            };
            // 失败时立即取消同伴任务
            if result.is_err() {
                token.cancel();
            }
            result
        });
        Ok(())
    }

    /// 异步发送 GET 请求，并在响应到达后调用回调
    pub async fn do_get_async<H, Fut>(
        &mut self,
        client: Arc<ApiClient>,
        path: String,
        query: Vec<(String, String)>,
        handler: H,
    ) -> Result<(), CollectorError>
    where
        H: FnOnce(ApiResponse) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), CollectorError>> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.next_tick(async move {
            let response = client.get(&path, &query, &cancel).await?;
            handler(response).await
        })
        .await
    }

    /// 是否已有任务返回致命错误
    pub fn has_error(&self) -> bool {
        self.first_error
            .as_ref()
            .is_some_and(|e| !matches!(e, CollectorError::Cancelled))
    }

    /// 在途任务数
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// 等待所有在途任务完成
    ///
    /// 返回第一个致命错误；上层取消时返回 `Cancelled`
    pub async fn wait_async(&mut self) -> Result<(), CollectorError> {
        while let Some(result) = self.tasks.join_next().await {
            self.record(result);
        }

        match self.first_error.take() {
            Some(err) => Err(err),
            None if self.parent.is_cancelled() => Err(CollectorError::Cancelled),
            None => Ok(()),
        }
    }

    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            self.record(result);
        }
    }

    fn record(&mut self, result: Result<Result<(), CollectorError>, JoinError>) {
        let err = match result {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(e) => CollectorError::Join(e.to_string()),
        };

        let replace = match &self.first_error {
            None => true,
            Some(CollectorError::Cancelled) => !matches!(err, CollectorError::Cancelled),
            Some(_) => false,
        };
        if replace {
            debug!("tick pool recorded error: {}", err);
            self.first_error = Some(err);
        }
        self.cancel.cancel();
    }
}

impl Drop for TickPool {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.tasks.abort_all();
    }
}
