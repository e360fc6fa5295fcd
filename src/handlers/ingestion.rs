//! NATS handlers for the ingestion pipeline
//!
//! Thin request/reply glue between the platform gateway and the core
//! services: job submission and queries, queue status and statistics,
//! stuck-job diagnostics and recovery, and (local deployments only)
//! manual scheduler control.

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::services::scheduler::IngestionScheduler;
use crate::services::status::{JobSummary, StatusReporter};
use crate::store::JobStore;
use crate::types::{
    EmptyPayload, EntityType, ErrorResponse, IngestionJob, JobStatus, ListRequest, ListResponse,
    Request, SuccessResponse,
};

// ==========================================================================
// Request/Response Types
// ==========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitIngestionRequest {
    pub entity_type: EntityType,
    /// Blob-store URL the upload collaborator stored the file under.
    pub file_url: String,
    pub file_name: String,
    #[serde(default)]
    pub file_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitIngestionResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetJobRequest {
    pub job_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRequest {
    #[serde(default = "default_window_days")]
    pub window_days: i64,
}

fn default_window_days() -> i64 {
    7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetStuckResponse {
    pub released: u64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerAckResponse {
    pub paused: bool,
    pub message: String,
}

// ==========================================================================
// Job submission and queries
// ==========================================================================

/// Handle ingestion.submit requests
pub async fn handle_submit(
    client: Client,
    mut subscriber: Subscriber,
    jobs: Arc<dyn JobStore>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        let request: Request<SubmitIngestionRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse ingestion submit request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let tenant_id = match request.tenant_id {
            Some(id) => id,
            None => {
                let error = ErrorResponse::new(request.id, "UNAUTHORIZED", "tenant_id required");
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let payload = request.payload;
        if payload.file_url.trim().is_empty() || payload.file_name.trim().is_empty() {
            let error = ErrorResponse::new(
                request.id,
                "INVALID_REQUEST",
                "fileUrl and fileName are required",
            );
            let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            continue;
        }

        let job = IngestionJob::new(
            tenant_id,
            payload.entity_type,
            payload.file_url,
            payload.file_name,
            payload.file_size.max(0),
        );

        match jobs.create_job(&job).await {
            Ok(()) => {
                info!(
                    "ingestion job {} submitted ({}, file '{}')",
                    job.id,
                    job.entity_type.as_str(),
                    job.file_name
                );
                let response = SubmitIngestionResponse {
                    job_id: job.id,
                    status: job.status,
                    message: "Ingestion job queued".to_string(),
                };
                let success = SuccessResponse::new(request.id, response);
                let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
            }
            Err(e) => {
                error!("Failed to create ingestion job: {}", e);
                let error = ErrorResponse::new(request.id, "SUBMIT_ERROR", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

/// Handle ingestion.list requests
pub async fn handle_list(
    client: Client,
    mut subscriber: Subscriber,
    jobs: Arc<dyn JobStore>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        let request: Request<ListRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse ingestion list request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let tenant_id = match request.tenant_id {
            Some(id) => id,
            None => {
                let error = ErrorResponse::new(request.id, "UNAUTHORIZED", "tenant_id required");
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let limit = request.payload.limit.clamp(1, 200);
        let offset = request.payload.offset.max(0);

        match jobs.list_jobs(tenant_id, limit, offset).await {
            Ok((page, total)) => {
                let response = ListResponse {
                    items: page.iter().map(JobSummary::from).collect::<Vec<_>>(),
                    total,
                    limit,
                    offset,
                };
                let success = SuccessResponse::new(request.id, response);
                let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
            }
            Err(e) => {
                error!("Failed to list ingestion jobs: {}", e);
                let error = ErrorResponse::new(request.id, "LIST_ERROR", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

/// Handle ingestion.get requests — the full job record including the
/// per-row error table and the fatal cause for failed jobs.
pub async fn handle_get(
    client: Client,
    mut subscriber: Subscriber,
    jobs: Arc<dyn JobStore>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        let request: Request<GetJobRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse ingestion get request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let tenant_id = match request.tenant_id {
            Some(id) => id,
            None => {
                let error = ErrorResponse::new(request.id, "UNAUTHORIZED", "tenant_id required");
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        match jobs.get_job(tenant_id, request.payload.job_id).await {
            Ok(Some(job)) => {
                let success = SuccessResponse::new(request.id, job);
                let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
            }
            Ok(None) => {
                let error = ErrorResponse::new(request.id, "NOT_FOUND", "job not found");
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
            Err(e) => {
                error!("Failed to load ingestion job: {}", e);
                let error = ErrorResponse::new(request.id, "GET_ERROR", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

// ==========================================================================
// Queue status, statistics, diagnostics
// ==========================================================================

/// Handle ingestion.queue.status requests
pub async fn handle_queue_status(
    client: Client,
    mut subscriber: Subscriber,
    reporter: Arc<StatusReporter>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        let request: Request<EmptyPayload> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse queue status request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        match reporter.queue_status(request.tenant_id).await {
            Ok(status) => {
                let success = SuccessResponse::new(request.id, status);
                let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
            }
            Err(e) => {
                error!("Failed to read queue status: {}", e);
                let error = ErrorResponse::new(request.id, "STATUS_ERROR", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

/// Handle ingestion.queue.stats requests
pub async fn handle_queue_stats(
    client: Client,
    mut subscriber: Subscriber,
    reporter: Arc<StatusReporter>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        let request: Request<StatsRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse queue stats request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let window_days = request.payload.window_days.clamp(1, 90);
        match reporter.statistics(request.tenant_id, window_days).await {
            Ok(stats) => {
                let success = SuccessResponse::new(request.id, stats);
                let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
            }
            Err(e) => {
                error!("Failed to compute queue statistics: {}", e);
                let error = ErrorResponse::new(request.id, "STATS_ERROR", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

/// Handle ingestion.queue.diagnose requests
pub async fn handle_diagnose(
    client: Client,
    mut subscriber: Subscriber,
    reporter: Arc<StatusReporter>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        let request: Request<EmptyPayload> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse diagnose request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        match reporter.diagnose(request.tenant_id).await {
            Ok(report) => {
                let success = SuccessResponse::new(request.id, report);
                let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
            }
            Err(e) => {
                error!("Failed to diagnose ingestion queue: {}", e);
                let error = ErrorResponse::new(request.id, "DIAGNOSE_ERROR", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

/// Handle ingestion.queue.reset requests — the administrative bulk
/// recovery for jobs orphaned by a crashed run.
pub async fn handle_reset_stuck(
    client: Client,
    mut subscriber: Subscriber,
    reporter: Arc<StatusReporter>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        let request: Request<EmptyPayload> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse reset request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        match reporter.reset_stuck().await {
            Ok(released) => {
                let response = ResetStuckResponse {
                    released,
                    message: format!("{} stuck jobs reset to pending", released),
                };
                let success = SuccessResponse::new(request.id, response);
                let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
            }
            Err(e) => {
                error!("Failed to reset stuck jobs: {}", e);
                let error = ErrorResponse::new(request.id, "RESET_ERROR", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

// ==========================================================================
// Scheduler control (local deployments only)
// ==========================================================================

/// Handle ingestion.scheduler.trigger requests
pub async fn handle_scheduler_trigger(
    client: Client,
    mut subscriber: Subscriber,
    scheduler: Arc<IngestionScheduler>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        let request_id = extract_request_id(&msg.payload);
        match scheduler.run_tick().await {
            Some(summary) => {
                let success = SuccessResponse::new(request_id, summary);
                let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
            }
            None => {
                let error = ErrorResponse::new(
                    request_id,
                    "TICK_IN_PROGRESS",
                    "a scheduler tick is already running",
                );
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

/// Handle ingestion.scheduler.pause requests
pub async fn handle_scheduler_pause(
    client: Client,
    mut subscriber: Subscriber,
    scheduler: Arc<IngestionScheduler>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        scheduler.pause();
        let response = SchedulerAckResponse {
            paused: true,
            message: "scheduler paused".to_string(),
        };
        let success = SuccessResponse::new(extract_request_id(&msg.payload), response);
        let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
    }

    Ok(())
}

/// Handle ingestion.scheduler.resume requests
pub async fn handle_scheduler_resume(
    client: Client,
    mut subscriber: Subscriber,
    scheduler: Arc<IngestionScheduler>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        scheduler.resume();
        let response = SchedulerAckResponse {
            paused: false,
            message: "scheduler resumed".to_string(),
        };
        let success = SuccessResponse::new(extract_request_id(&msg.payload), response);
        let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
    }

    Ok(())
}

fn extract_request_id(payload: &[u8]) -> Uuid {
    if let Ok(v) = serde_json::from_slice::<serde_json::Value>(payload) {
        if let Some(id_str) = v.get("id").and_then(|id| id.as_str()) {
            if let Ok(uuid) = Uuid::parse_str(id_str) {
                return uuid;
            }
        }
    }
    Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_request_wire_format() {
        let json = r#"{
            "entityType": "machine-models",
            "fileUrl": "https://files.upkeep.example/u/42",
            "fileName": "models.xlsx",
            "fileSize": 8192
        }"#;
        let request: SubmitIngestionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.entity_type, EntityType::MachineModels);
        assert_eq!(request.file_name, "models.xlsx");
    }

    #[test]
    fn test_stats_request_defaults_to_seven_days() {
        let request: StatsRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.window_days, 7);
    }

    #[test]
    fn test_extract_request_id_from_envelope() {
        let id = Uuid::new_v4();
        let payload = serde_json::json!({ "id": id.to_string() });
        let extracted = extract_request_id(payload.to_string().as_bytes());
        assert_eq!(extracted, id);
    }

    #[test]
    fn test_extract_request_id_tolerates_garbage() {
        let extracted = extract_request_id(b"not json at all");
        assert!(!extracted.is_nil());
    }
}
