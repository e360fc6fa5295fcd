//! NATS message handlers

pub mod ingestion;
pub mod ping;

use std::sync::Arc;

use anyhow::Result;
use async_nats::Client;
use tokio::select;
use tracing::{error, info};

use crate::config::Config;
use crate::services::scheduler::IngestionScheduler;
use crate::services::status::StatusReporter;
use crate::store::JobStore;

/// Start all message handlers
pub async fn start_handlers(
    client: Client,
    jobs: Arc<dyn JobStore>,
    reporter: Arc<StatusReporter>,
    scheduler: Arc<IngestionScheduler>,
    config: &Config,
) -> Result<()> {
    info!("Starting message handlers...");

    let ping_sub = client.subscribe("upkeep.ping").await?;
    let submit_sub = client.subscribe("upkeep.ingestion.submit").await?;
    let list_sub = client.subscribe("upkeep.ingestion.list").await?;
    let get_sub = client.subscribe("upkeep.ingestion.get").await?;
    let queue_status_sub = client.subscribe("upkeep.ingestion.queue.status").await?;
    let queue_stats_sub = client.subscribe("upkeep.ingestion.queue.stats").await?;
    let diagnose_sub = client.subscribe("upkeep.ingestion.queue.diagnose").await?;
    let reset_sub = client.subscribe("upkeep.ingestion.queue.reset").await?;

    let client_ping = client.clone();
    let client_submit = client.clone();
    let client_list = client.clone();
    let client_get = client.clone();
    let client_queue_status = client.clone();
    let client_queue_stats = client.clone();
    let client_diagnose = client.clone();
    let client_reset = client.clone();

    let jobs_submit = jobs.clone();
    let jobs_list = jobs.clone();
    let jobs_get = jobs.clone();

    let reporter_status = reporter.clone();
    let reporter_stats = reporter.clone();
    let reporter_diagnose = reporter.clone();
    let reporter_reset = reporter.clone();

    let ping_handle = tokio::spawn(async move { ping::handle_ping(client_ping, ping_sub).await });

    let submit_handle = tokio::spawn(async move {
        ingestion::handle_submit(client_submit, submit_sub, jobs_submit).await
    });

    let list_handle =
        tokio::spawn(async move { ingestion::handle_list(client_list, list_sub, jobs_list).await });

    let get_handle =
        tokio::spawn(async move { ingestion::handle_get(client_get, get_sub, jobs_get).await });

    let queue_status_handle = tokio::spawn(async move {
        ingestion::handle_queue_status(client_queue_status, queue_status_sub, reporter_status).await
    });

    let queue_stats_handle = tokio::spawn(async move {
        ingestion::handle_queue_stats(client_queue_stats, queue_stats_sub, reporter_stats).await
    });

    let diagnose_handle = tokio::spawn(async move {
        ingestion::handle_diagnose(client_diagnose, diagnose_sub, reporter_diagnose).await
    });

    let reset_handle = tokio::spawn(async move {
        ingestion::handle_reset_stuck(client_reset, reset_sub, reporter_reset).await
    });

    // Scheduler control is for local/dev deployments only; production
    // relies on the timer loop alone.
    let mut control_handles = Vec::new();
    if config.scheduler_control {
        let trigger_sub = client.subscribe("upkeep.ingestion.scheduler.trigger").await?;
        let pause_sub = client.subscribe("upkeep.ingestion.scheduler.pause").await?;
        let resume_sub = client.subscribe("upkeep.ingestion.scheduler.resume").await?;

        let client_trigger = client.clone();
        let client_pause = client.clone();
        let client_resume = client.clone();
        let scheduler_trigger = scheduler.clone();
        let scheduler_pause = scheduler.clone();
        let scheduler_resume = scheduler.clone();

        control_handles.push(tokio::spawn(async move {
            ingestion::handle_scheduler_trigger(client_trigger, trigger_sub, scheduler_trigger)
                .await
        }));
        control_handles.push(tokio::spawn(async move {
            ingestion::handle_scheduler_pause(client_pause, pause_sub, scheduler_pause).await
        }));
        control_handles.push(tokio::spawn(async move {
            ingestion::handle_scheduler_resume(client_resume, resume_sub, scheduler_resume).await
        }));
        info!("Scheduler control handlers enabled");
    }

    info!("All handlers started");

    // Pends forever when scheduler control is disabled.
    let control_wait = async move {
        if control_handles.is_empty() {
            std::future::pending::<()>().await;
            unreachable!()
        } else {
            let (result, _, _) = futures::future::select_all(control_handles).await;
            result
        }
    };

    // Handlers run until the process stops; any one of them finishing is
    // a fault worth surfacing.
    select! {
        result = ping_handle => {
            error!("Ping handler finished: {:?}", result);
        }
        result = submit_handle => {
            error!("Ingestion submit handler finished: {:?}", result);
        }
        result = list_handle => {
            error!("Ingestion list handler finished: {:?}", result);
        }
        result = get_handle => {
            error!("Ingestion get handler finished: {:?}", result);
        }
        result = queue_status_handle => {
            error!("Queue status handler finished: {:?}", result);
        }
        result = queue_stats_handle => {
            error!("Queue stats handler finished: {:?}", result);
        }
        result = diagnose_handle => {
            error!("Queue diagnose handler finished: {:?}", result);
        }
        result = reset_handle => {
            error!("Queue reset handler finished: {:?}", result);
        }
        result = control_wait => {
            error!("Scheduler control handler finished: {:?}", result);
        }
    }

    Ok(())
}
