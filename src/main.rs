//! Upkeep Worker - bulk ingestion backend for the Upkeep maintenance platform
//!
//! Polls the job queue on a timer, runs uploaded CSV/XLSX files through the
//! row processors, and answers status queries from the frontend over NATS.

mod cli;
mod config;
mod db;
mod handlers;
mod services;
mod store;
mod types;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::services::file_store::HttpFileStore;
use crate::services::job_runner::JobRunner;
use crate::services::row_processors::RowProcessorSet;
use crate::services::scheduler::{IngestionScheduler, SchedulerConfig};
use crate::services::status::StatusReporter;
use crate::store::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs directory - use LOGS_DIR env var or default to ./logs
    let logs_dir = std::env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &logs_dir, "worker.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stdout and file
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,upkeep_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer()) // stdout
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        ) // file
        .init();

    let args = cli::Cli::parse();

    info!("Starting Upkeep Worker...");

    // Load configuration
    let config = config::Config::from_env()?;
    info!("Configuration loaded");

    // Connect to database
    let pool = db::create_pool(&config.database_url).await?;
    info!("Connected to PostgreSQL");

    // Run migrations
    db::run_migrations(&pool).await?;

    match args.command.unwrap_or(cli::Command::Serve) {
        cli::Command::Migrate => {
            info!("Migrations applied, exiting");
            return Ok(());
        }
        cli::Command::Tick => {
            let (scheduler, _) = build_services(pool, &config);
            match scheduler.run_tick().await {
                Some(summary) => info!(
                    "tick finished: {} selected, {} completed, {} failed, {} skipped",
                    summary.selected, summary.completed, summary.failed, summary.skipped
                ),
                None => info!("tick skipped: another tick was running"),
            }
            return Ok(());
        }
        cli::Command::Serve => {}
    }

    // Connect to NATS (supports optional NATS_USER/NATS_PASSWORD auth).
    let nats_client = match (std::env::var("NATS_USER"), std::env::var("NATS_PASSWORD")) {
        (Ok(user), Ok(password)) if !user.is_empty() => {
            async_nats::ConnectOptions::new()
                .user_and_password(user, password)
                .connect(&config.nats_url)
                .await?
        }
        _ => async_nats::connect(&config.nats_url).await?,
    };
    info!("Connected to NATS at {}", config.nats_url);

    let (scheduler, jobs) = build_services(pool, &config);
    let reporter = Arc::new(StatusReporter::new(
        jobs.clone(),
        chrono::Duration::minutes(config.stale_after_minutes),
    ));

    // Background scheduler loop, stopped on ctrl-c.
    let shutdown = CancellationToken::new();
    let scheduler_task = tokio::spawn(scheduler.clone().start(shutdown.clone()));

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            ctrl_c_shutdown.cancel();
        }
    });

    // Start message handlers
    let handler_result =
        handlers::start_handlers(nats_client, jobs, reporter, scheduler, &config).await;

    shutdown.cancel();
    let _ = scheduler_task.await;

    if let Err(e) = handler_result {
        error!("Handler error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// Wire the store, runner and scheduler together.
fn build_services(
    pool: sqlx::PgPool,
    config: &config::Config,
) -> (Arc<IngestionScheduler>, Arc<PgStore>) {
    let store = Arc::new(PgStore::new(pool));
    let files = Arc::new(HttpFileStore::new());
    let processors = RowProcessorSet::new(store.clone());
    let runner = Arc::new(JobRunner::new(
        store.clone(),
        files,
        processors,
        config.max_rows_per_run,
    ));
    let scheduler = Arc::new(IngestionScheduler::new(
        store.clone(),
        runner,
        SchedulerConfig {
            interval: std::time::Duration::from_secs(config.scheduler_interval_secs),
            max_jobs_per_tick: config.max_jobs_per_tick,
            max_jobs_per_tenant: config.max_jobs_per_tenant,
            scan_limit: config.scan_limit,
        },
    ));
    (scheduler, store)
}
