//! Read-side job reporting and stuck-job recovery
//!
//! Everything here is read-only aggregation over the job store, except
//! `reset_stuck`, which is the one administrative write: the recovery
//! path for jobs orphaned by a crashed run (there is no heartbeat or
//! lease, so nothing else would ever pick them up again).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::store::{JobStore, StatusCounts};
use crate::types::{EntityType, IngestionJob, JobStatus, StoreError};

/// Condensed job view for lists and diagnostics (no error table).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub entity_type: EntityType,
    pub status: JobStatus,
    pub file_name: String,
    pub total_rows: i32,
    pub processed_rows: i32,
    pub success_rows: i32,
    pub error_rows: i32,
    pub limited_rows: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&IngestionJob> for JobSummary {
    fn from(job: &IngestionJob) -> Self {
        Self {
            id: job.id,
            tenant_id: job.tenant_id,
            entity_type: job.entity_type,
            status: job.status,
            file_name: job.file_name.clone(),
            total_rows: job.total_rows,
            processed_rows: job.processed_rows,
            success_rows: job.success_rows,
            error_rows: job.error_rows,
            limited_rows: job.limited_rows,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub counts: StatusCounts,
    /// Oldest pending job — the next one a tick will pick up.
    pub next_job: Option<JobSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTypeBreakdown {
    pub entity_type: EntityType,
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatistics {
    pub window_days: i64,
    pub total_jobs: i64,
    /// `completed / total` over the window; 0 when the window is empty.
    pub success_rate: f64,
    /// Mean `completed_at - created_at` over completed jobs only.
    pub avg_processing_seconds: Option<f64>,
    pub by_entity_type: Vec<EntityTypeBreakdown>,
    pub by_status: StatusCounts,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StuckJob {
    #[serde(flatten)]
    pub job: JobSummary,
    pub stuck_minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisReport {
    pub stuck: Vec<StuckJob>,
    pub recent: Vec<JobSummary>,
    pub counts: StatusCounts,
}

pub struct StatusReporter {
    jobs: Arc<dyn JobStore>,
    stale_after: Duration,
}

impl StatusReporter {
    pub fn new(jobs: Arc<dyn JobStore>, stale_after: Duration) -> Self {
        Self { jobs, stale_after }
    }

    pub async fn queue_status(&self, tenant_id: Option<Uuid>) -> Result<QueueStatus, StoreError> {
        let counts = self.jobs.count_by_status(tenant_id).await?;
        let next_job = self
            .jobs
            .oldest_pending(tenant_id)
            .await?
            .as_ref()
            .map(JobSummary::from);
        Ok(QueueStatus { counts, next_job })
    }

    pub async fn statistics(
        &self,
        tenant_id: Option<Uuid>,
        window_days: i64,
    ) -> Result<QueueStatistics, StoreError> {
        let since = Utc::now() - Duration::days(window_days.max(1));
        let jobs = self.jobs.jobs_created_since(tenant_id, since).await?;
        Ok(summarize(&jobs, window_days.max(1)))
    }

    pub async fn diagnose(&self, tenant_id: Option<Uuid>) -> Result<DiagnosisReport, StoreError> {
        let now = Utc::now();
        let cutoff = now - self.stale_after;

        let stuck = self
            .jobs
            .stale_jobs(cutoff)
            .await?
            .into_iter()
            .filter(|job| tenant_id.map_or(true, |t| t == job.tenant_id))
            .map(|job| StuckJob {
                stuck_minutes: (now - job.updated_at).num_minutes(),
                job: JobSummary::from(&job),
            })
            .collect();

        let recent = self
            .jobs
            .recent_jobs(tenant_id, 20)
            .await?
            .iter()
            .map(JobSummary::from)
            .collect();

        let counts = self.jobs.count_by_status(tenant_id).await?;
        Ok(DiagnosisReport {
            stuck,
            recent,
            counts,
        })
    }

    /// Force all currently-stuck jobs back to `pending` so the next tick
    /// can pick them up again.
    pub async fn reset_stuck(&self) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - self.stale_after;
        let released = self.jobs.release_stale(cutoff).await?;
        if released > 0 {
            info!("reset {} stuck ingestion jobs", released);
        }
        Ok(released)
    }
}

fn summarize(jobs: &[IngestionJob], window_days: i64) -> QueueStatistics {
    let total_jobs = jobs.len() as i64;
    let mut by_status = StatusCounts::default();
    let mut processing_seconds = Vec::new();
    let mut by_entity_type: Vec<EntityTypeBreakdown> = EntityType::ALL
        .iter()
        .map(|&entity_type| EntityTypeBreakdown {
            entity_type,
            total: 0,
            completed: 0,
            failed: 0,
        })
        .collect();

    for job in jobs {
        match job.status {
            JobStatus::Pending => by_status.pending += 1,
            JobStatus::Processing => by_status.processing += 1,
            JobStatus::Completed => by_status.completed += 1,
            JobStatus::Failed => by_status.failed += 1,
        }
        if let Some(breakdown) = by_entity_type
            .iter_mut()
            .find(|b| b.entity_type == job.entity_type)
        {
            breakdown.total += 1;
            match job.status {
                JobStatus::Completed => breakdown.completed += 1,
                JobStatus::Failed => breakdown.failed += 1,
                _ => {}
            }
        }
        if job.status == JobStatus::Completed {
            if let Some(completed_at) = job.completed_at {
                processing_seconds
                    .push((completed_at - job.created_at).num_milliseconds() as f64 / 1000.0);
            }
        }
    }

    // Only report entity types that actually appeared in the window.
    by_entity_type.retain(|b| b.total > 0);

    let success_rate = if total_jobs > 0 {
        by_status.completed as f64 / total_jobs as f64
    } else {
        0.0
    };
    let avg_processing_seconds = if processing_seconds.is_empty() {
        None
    } else {
        Some(processing_seconds.iter().sum::<f64>() / processing_seconds.len() as f64)
    };

    QueueStatistics {
        window_days,
        total_jobs,
        success_rate,
        avg_processing_seconds,
        by_entity_type,
        by_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JobStore as _, MemoryStore};
    use chrono::Duration as ChronoDuration;

    fn job_with_status(tenant: Uuid, status: JobStatus) -> IngestionJob {
        let mut job = IngestionJob::new(
            tenant,
            EntityType::Locations,
            "mem://sites.csv",
            "sites.csv",
            0,
        );
        job.status = status;
        if status.is_terminal() {
            job.completed_at = Some(job.created_at + ChronoDuration::seconds(30));
        }
        job
    }

    fn reporter(store: Arc<MemoryStore>) -> StatusReporter {
        StatusReporter::new(store, Duration::minutes(15))
    }

    #[tokio::test]
    async fn test_queue_status_counts_and_next_job() {
        let store = Arc::new(MemoryStore::new());
        let tenant = Uuid::new_v4();

        let mut oldest = job_with_status(tenant, JobStatus::Pending);
        oldest.created_at = Utc::now() - ChronoDuration::minutes(20);
        let newer = job_with_status(tenant, JobStatus::Pending);
        let done = job_with_status(tenant, JobStatus::Completed);
        store.create_job(&oldest).await.unwrap();
        store.create_job(&newer).await.unwrap();
        store.create_job(&done).await.unwrap();

        let status = reporter(store).queue_status(Some(tenant)).await.unwrap();
        assert_eq!(status.counts.pending, 2);
        assert_eq!(status.counts.completed, 1);
        assert_eq!(status.next_job.unwrap().id, oldest.id);
    }

    #[tokio::test]
    async fn test_statistics_success_rate_and_average() {
        let store = Arc::new(MemoryStore::new());
        let tenant = Uuid::new_v4();

        store
            .create_job(&job_with_status(tenant, JobStatus::Completed))
            .await
            .unwrap();
        store
            .create_job(&job_with_status(tenant, JobStatus::Completed))
            .await
            .unwrap();
        store
            .create_job(&job_with_status(tenant, JobStatus::Failed))
            .await
            .unwrap();
        store
            .create_job(&job_with_status(tenant, JobStatus::Pending))
            .await
            .unwrap();

        let stats = reporter(store).statistics(Some(tenant), 7).await.unwrap();
        assert_eq!(stats.total_jobs, 4);
        assert!((stats.success_rate - 0.5).abs() < 1e-9);
        let avg = stats.avg_processing_seconds.unwrap();
        assert!((avg - 30.0).abs() < 1.0);
        assert_eq!(stats.by_status.failed, 1);
        assert_eq!(stats.by_entity_type.len(), 1);
        assert_eq!(stats.by_entity_type[0].total, 4);
    }

    #[tokio::test]
    async fn test_statistics_empty_window() {
        let store = Arc::new(MemoryStore::new());
        let stats = reporter(store).statistics(None, 7).await.unwrap();
        assert_eq!(stats.total_jobs, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert!(stats.avg_processing_seconds.is_none());
        assert!(stats.by_entity_type.is_empty());
    }

    #[tokio::test]
    async fn test_stuck_job_diagnosis_and_reset() {
        let store = Arc::new(MemoryStore::new());
        let tenant = Uuid::new_v4();

        let mut stuck = job_with_status(tenant, JobStatus::Processing);
        stuck.updated_at = Utc::now() - ChronoDuration::minutes(45);
        store.create_job(&stuck).await.unwrap();

        let fresh = job_with_status(tenant, JobStatus::Processing);
        store.create_job(&fresh).await.unwrap();

        let reporter = reporter(store.clone());
        let report = reporter.diagnose(Some(tenant)).await.unwrap();
        assert_eq!(report.stuck.len(), 1);
        assert_eq!(report.stuck[0].job.id, stuck.id);
        assert!(report.stuck[0].stuck_minutes >= 45);

        let released = reporter.reset_stuck().await.unwrap();
        assert_eq!(released, 1);

        let reloaded = store.get_job(tenant, stuck.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Pending);

        // Eligible again: the next tick's pending scan sees it.
        let pending = store.load_pending(10).await.unwrap();
        assert!(pending.iter().any(|j| j.id == stuck.id));
    }

    #[tokio::test]
    async fn test_diagnosis_is_tenant_scoped_when_asked() {
        let store = Arc::new(MemoryStore::new());
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();

        let mut stuck_a = job_with_status(tenant_a, JobStatus::Processing);
        stuck_a.updated_at = Utc::now() - ChronoDuration::minutes(45);
        let mut stuck_b = job_with_status(tenant_b, JobStatus::Processing);
        stuck_b.updated_at = Utc::now() - ChronoDuration::minutes(45);
        store.create_job(&stuck_a).await.unwrap();
        store.create_job(&stuck_b).await.unwrap();

        let report = reporter(store).diagnose(Some(tenant_a)).await.unwrap();
        assert_eq!(report.stuck.len(), 1);
        assert_eq!(report.stuck[0].job.tenant_id, tenant_a);
    }
}
