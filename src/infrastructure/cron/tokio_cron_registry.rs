// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::debug;
use uuid::Uuid;

use crate::queue::scheduler::{CronJob, CronRegistry, SchedulerError};

/// 基于 tokio-cron-scheduler 的 cron 注册表
pub struct TokioCronRegistry {
    sched: JobScheduler,
    jobs: Mutex<HashMap<i64, Uuid>>,
}

impl TokioCronRegistry {
    /// 创建并启动底层调度器
    pub async fn new() -> Result<Self, SchedulerError> {
        let sched = JobScheduler::new().await.map_err(registry_error)?;
        sched.start().await.map_err(registry_error)?;
        Ok(Self {
            sched,
            jobs: Mutex::new(HashMap::new()),
        })
    }

    /// 停止调度器，已注册的任务不再触发
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        let mut sched = self.sched.clone();
        sched.shutdown().await.map_err(registry_error)
    }
}

fn registry_error(e: impl std::fmt::Display) -> SchedulerError {
    SchedulerError::Registry(e.to_string())
}

#[async_trait]
impl CronRegistry for TokioCronRegistry {
    async fn register(
        &self,
        blueprint_id: i64,
        cron: &str,
        job: CronJob,
    ) -> Result<(), SchedulerError> {
        let scheduled = Job::new_async(cron, move |_uuid, _l| job()).map_err(|e| {
            SchedulerError::InvalidCron {
                expr: cron.to_string(),
                message: e.to_string(),
            }
        })?;

        let uuid = self.sched.add(scheduled).await.map_err(registry_error)?;
        let mut jobs = self.jobs.lock().await;
        if let Some(previous) = jobs.insert(blueprint_id, uuid) {
            self.sched.remove(&previous).await.map_err(registry_error)?;
        }
        debug!("Registered cron job {} for blueprint {}", uuid, blueprint_id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.lock().await;
        for (_, uuid) in jobs.drain() {
            self.sched.remove(&uuid).await.map_err(registry_error)?;
        }
        Ok(())
    }

    async fn registered(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.jobs.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_register_and_clear() {
        let registry = TokioCronRegistry::new().await.unwrap();
        let job: CronJob = Arc::new(|| async {}.boxed());

        registry.register(2, "0 0 0 * * *", job.clone()).await.unwrap();
        registry.register(1, "0 30 1 * * *", job.clone()).await.unwrap();
        registry.register(1, "0 45 1 * * *", job).await.unwrap();
        assert_eq!(registry.registered().await, vec![1, 2]);

        registry.clear().await.unwrap();
        assert!(registry.registered().await.is_empty());
        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_expression_is_rejected() {
        let registry = TokioCronRegistry::new().await.unwrap();
        let job: CronJob = Arc::new(|| async {}.boxed());
        assert!(matches!(
            registry.register(1, "whenever", job).await,
            Err(SchedulerError::InvalidCron { .. })
        ));
        assert!(registry.registered().await.is_empty());
    }

    #[tokio::test]
    async fn test_job_fires() {
        let registry = TokioCronRegistry::new().await.unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let job: CronJob = Arc::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        });

        registry.register(1, "* * * * * *", job).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2200)).await;
        assert!(hits.load(Ordering::SeqCst) >= 1);
        registry.shutdown().await.unwrap();
    }
}
