// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use ingestrs::config::settings::Settings;
use ingestrs::domain::plugin::PluginRegistry;
use ingestrs::domain::services::blueprint_service::BlueprintService;
use ingestrs::infrastructure::cron::TokioCronRegistry;
use ingestrs::infrastructure::database::connection;
use ingestrs::infrastructure::metrics;
use ingestrs::infrastructure::repositories::blueprint_repo_impl::BlueprintRepoImpl;
use ingestrs::queue::scheduler::BlueprintScheduler;
use ingestrs::utils::telemetry;
use ingestrs::workers::PipelineRunner;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 主函数
///
/// 加载配置、连接数据库并执行迁移，随后按蓝图注册定时任务，直到收到 Ctrl-C
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration
    let settings = Settings::new()?;

    // 2. Initialize logging and metrics
    telemetry::init_telemetry(settings.telemetry.json_logs);
    info!("Starting ingestrs...");
    if let Some(addr) = &settings.telemetry.metrics_addr {
        metrics::init_metrics(addr)?;
    }

    // 3. Connect to database and migrate
    let db = Arc::new(connection::connect_and_migrate(&settings.database).await?);
    info!("Database connection established");

    // 4. Plugins register their subtasks and module paths here
    let registry = Arc::new(PluginRegistry::new());
    info!("{} plugin(s) registered", registry.plugins().count());

    // 5. Pipeline runner and scheduler
    let shutdown = CancellationToken::new();
    let runner = Arc::new(PipelineRunner::new(registry.clone(), shutdown.clone()));
    let cron = Arc::new(TokioCronRegistry::new().await?);
    let blueprint_repo = Arc::new(BlueprintRepoImpl::new(db.clone()));
    let scheduler = BlueprintScheduler::new(
        blueprint_repo.clone(),
        registry.clone(),
        cron.clone(),
        runner,
    );
    let blueprints = BlueprintService::new(blueprint_repo, registry, scheduler);

    if settings.scheduler.enabled {
        let count = blueprints.reload().await?;
        info!("Scheduler started with {} blueprint(s)", count);
    } else {
        info!("Scheduler disabled");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    shutdown.cancel();
    cron.shutdown().await?;

    Ok(())
}
