//! Timer-driven fair ingestion scheduler
//!
//! One scheduler instance per process, constructed at startup and shared
//! by `Arc`. Ticks are guarded by an atomic try-lock: a tick that fires
//! while the previous one is still running is skipped entirely, not
//! queued. Within a tick, selected jobs run strictly sequentially.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::services::job_runner::{JobRunner, RunOutcome};
use crate::store::JobStore;
use crate::types::IngestionJob;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    /// Per-tick total selection cap.
    pub max_jobs_per_tick: usize,
    /// Per-tenant selection cap inside one tick.
    pub max_jobs_per_tenant: usize,
    /// How many pending jobs to scan per tick.
    pub scan_limit: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_jobs_per_tick: 5,
            max_jobs_per_tenant: 2,
            scan_limit: 20,
        }
    }
}

/// Summary of one executed tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSummary {
    pub selected: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct IngestionScheduler {
    jobs: Arc<dyn JobStore>,
    runner: Arc<JobRunner>,
    config: SchedulerConfig,
    tick_running: AtomicBool,
    paused: AtomicBool,
}

impl IngestionScheduler {
    pub fn new(jobs: Arc<dyn JobStore>, runner: Arc<JobRunner>, config: SchedulerConfig) -> Self {
        Self {
            jobs,
            runner,
            config,
            tick_running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
        }
    }

    /// Timer loop: one tick immediately, then on every interval until the
    /// token is cancelled.
    pub async fn start(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            "ingestion scheduler started (interval {:?}, {} jobs/tick, {} jobs/tenant)",
            self.config.interval, self.config.max_jobs_per_tick, self.config.max_jobs_per_tenant
        );
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.paused.load(Ordering::Relaxed) {
                        debug!("scheduler paused, skipping tick");
                        continue;
                    }
                    self.run_tick().await;
                }
                _ = shutdown.cancelled() => {
                    info!("ingestion scheduler shutting down");
                    break;
                }
            }
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
        info!("ingestion scheduler paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
        info!("ingestion scheduler resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Execute one tick. Returns `None` when another tick is in flight —
    /// overlapping ticks are skipped, never queued or merged.
    pub async fn run_tick(&self) -> Option<TickSummary> {
        if self
            .tick_running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            debug!("previous scheduler tick still running, skipping");
            return None;
        }
        let summary = self.execute_tick().await;
        self.tick_running.store(false, Ordering::Release);
        Some(summary)
    }

    async fn execute_tick(&self) -> TickSummary {
        let pending = match self.jobs.load_pending(self.config.scan_limit).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("failed to load pending ingestion jobs: {}", e);
                return TickSummary::default();
            }
        };
        if pending.is_empty() {
            return TickSummary::default();
        }

        let selected = select_fair(
            pending,
            self.config.max_jobs_per_tenant,
            self.config.max_jobs_per_tick,
        );
        let mut summary = TickSummary {
            selected: selected.len(),
            ..Default::default()
        };

        for job in selected {
            let job_id = job.id;
            match self.runner.run(job).await {
                Ok(RunOutcome::Completed { .. }) => summary.completed += 1,
                Ok(RunOutcome::Failed { .. }) => summary.failed += 1,
                Ok(RunOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    // One broken job must not abort the rest of the batch.
                    warn!("ingestion job {} aborted: {}", job_id, e);
                    if let Err(mark_err) = self.jobs.fail_job(job_id, &e.to_string()).await {
                        error!("failed to mark job {} as failed: {}", job_id, mark_err);
                    }
                    summary.failed += 1;
                }
            }
        }

        info!(
            "scheduler tick: {} selected, {} completed, {} failed, {} skipped",
            summary.selected, summary.completed, summary.failed, summary.skipped
        );
        summary
    }
}

/// Bounded round-robin across tenants, FIFO within a tenant.
///
/// One job per tenant per round, so a tenant with a deep backlog cannot
/// starve the others out of a tick.
fn select_fair(
    pending: Vec<IngestionJob>,
    max_per_tenant: usize,
    max_total: usize,
) -> Vec<IngestionJob> {
    // Partition by tenant, preserving the oldest-first scan order both for
    // tenant ordering and within each tenant's queue.
    let mut tenants: Vec<(Uuid, VecDeque<IngestionJob>)> = Vec::new();
    for job in pending {
        match tenants.iter_mut().find(|(tenant, _)| *tenant == job.tenant_id) {
            Some((_, queue)) => queue.push_back(job),
            None => tenants.push((job.tenant_id, VecDeque::from([job]))),
        }
    }

    let mut selected = Vec::new();
    'rounds: for _ in 0..max_per_tenant {
        let mut picked_any = false;
        for (_, queue) in tenants.iter_mut() {
            if let Some(job) = queue.pop_front() {
                selected.push(job);
                picked_any = true;
                if selected.len() >= max_total {
                    break 'rounds;
                }
            }
        }
        if !picked_any {
            break;
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::file_store::MemoryFileStore;
    use crate::services::row_processors::RowProcessorSet;
    use crate::store::{JobStore as _, MemoryStore};
    use crate::types::{EntityType, JobStatus};
    use chrono::{Duration as ChronoDuration, Utc};

    fn job_for(tenant: Uuid, age_minutes: i64) -> IngestionJob {
        let mut job = IngestionJob::new(
            tenant,
            EntityType::Locations,
            "mem://sites.csv",
            "sites.csv",
            0,
        );
        job.created_at = Utc::now() - ChronoDuration::minutes(age_minutes);
        job
    }

    #[test]
    fn test_fairness_small_tenant_is_not_starved() {
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();

        // 6 jobs from A, all older than B's single job.
        let mut pending: Vec<IngestionJob> = (0..6).map(|i| job_for(tenant_a, 60 - i)).collect();
        pending.push(job_for(tenant_b, 5));

        let selected = select_fair(pending, 2, 5);

        assert!(selected.iter().any(|j| j.tenant_id == tenant_b));
        assert_eq!(
            selected.iter().filter(|j| j.tenant_id == tenant_a).count(),
            2
        );
        assert_eq!(selected.len(), 3);
    }

    #[test]
    fn test_fairness_respects_total_cap() {
        let pending: Vec<IngestionJob> = (0..10)
            .map(|i| job_for(Uuid::new_v4(), 60 - i))
            .collect();

        let selected = select_fair(pending, 2, 5);
        assert_eq!(selected.len(), 5);
    }

    #[test]
    fn test_fairness_is_fifo_within_tenant() {
        let tenant = Uuid::new_v4();
        let old = job_for(tenant, 60);
        let newer = job_for(tenant, 10);
        let selected = select_fair(vec![old.clone(), newer], 2, 5);
        assert_eq!(selected[0].id, old.id);
    }

    #[test]
    fn test_fairness_single_tenant_capped_per_tick() {
        let tenant = Uuid::new_v4();
        let pending: Vec<IngestionJob> = (0..6).map(|i| job_for(tenant, 60 - i)).collect();
        let selected = select_fair(pending, 2, 5);
        assert_eq!(selected.len(), 2);
    }

    fn build_scheduler(store: Arc<MemoryStore>, files: Arc<MemoryFileStore>) -> IngestionScheduler {
        let runner = Arc::new(JobRunner::new(
            store.clone(),
            files,
            RowProcessorSet::new(store.clone()),
            100,
        ));
        IngestionScheduler::new(store, runner, SchedulerConfig::default())
    }

    #[tokio::test]
    async fn test_tick_drives_jobs_to_completion() {
        let store = Arc::new(MemoryStore::new());
        let files = Arc::new(MemoryFileStore::new());
        files.put("mem://sites.csv", b"code,name\nLOC-a,Hall A\n".to_vec());

        let tenant = Uuid::new_v4();
        let job = IngestionJob::new(
            tenant,
            EntityType::Locations,
            "mem://sites.csv",
            "sites.csv",
            0,
        );
        store.create_job(&job).await.unwrap();

        let scheduler = build_scheduler(store.clone(), files);
        let summary = scheduler.run_tick().await.unwrap();

        assert_eq!(summary.selected, 1);
        assert_eq!(summary.completed, 1);
        let reloaded = store.get_job(tenant, job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_failed_job_does_not_abort_batch() {
        let store = Arc::new(MemoryStore::new());
        let files = Arc::new(MemoryFileStore::new());
        files.put("mem://good.csv", b"code,name\nLOC-a,Hall A\n".to_vec());
        // "bad" has no stored file -> fetch failure -> job failed.

        let tenant = Uuid::new_v4();
        let mut bad = IngestionJob::new(
            tenant,
            EntityType::Locations,
            "mem://bad.csv",
            "bad.csv",
            0,
        );
        bad.created_at = Utc::now() - ChronoDuration::minutes(10);
        let good = IngestionJob::new(
            tenant,
            EntityType::Locations,
            "mem://good.csv",
            "good.csv",
            0,
        );
        store.create_job(&bad).await.unwrap();
        store.create_job(&good).await.unwrap();

        let scheduler = build_scheduler(store.clone(), files);
        let summary = scheduler.run_tick().await.unwrap();

        assert_eq!(summary.selected, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.completed, 1);

        let good_reloaded = store.get_job(tenant, good.id).await.unwrap().unwrap();
        assert_eq!(good_reloaded.status, JobStatus::Completed);
        let bad_reloaded = store.get_job(tenant, bad.id).await.unwrap().unwrap();
        assert_eq!(bad_reloaded.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_tick_guard_is_single_flight() {
        let store = Arc::new(MemoryStore::new());
        let files = Arc::new(MemoryFileStore::new());
        let scheduler = build_scheduler(store, files);

        // Simulate a tick still being in flight.
        scheduler.tick_running.store(true, Ordering::Relaxed);
        assert!(scheduler.run_tick().await.is_none());

        scheduler.tick_running.store(false, Ordering::Relaxed);
        assert!(scheduler.run_tick().await.is_some());
    }

    #[tokio::test]
    async fn test_empty_queue_tick_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let files = Arc::new(MemoryFileStore::new());
        let scheduler = build_scheduler(store, files);

        let summary = scheduler.run_tick().await.unwrap();
        assert_eq!(summary, TickSummary::default());
    }

    #[tokio::test]
    async fn test_pause_and_resume_flag() {
        let store = Arc::new(MemoryStore::new());
        let files = Arc::new(MemoryFileStore::new());
        let scheduler = build_scheduler(store, files);

        assert!(!scheduler.is_paused());
        scheduler.pause();
        assert!(scheduler.is_paused());
        scheduler.resume();
        assert!(!scheduler.is_paused());
    }
}
