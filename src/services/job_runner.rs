//! Runs one ingestion job end to end
//!
//! claim -> fetch -> parse -> cap -> row loop -> checkpoint -> finalize.
//! Row-scoped failures are recorded on the job and never abort the run;
//! only an unreachable file, an unreadable format or loss of the job store
//! makes the job fail. Job-level success is decoupled from the row error
//! count: a run that processed every in-cap row completes even when all of
//! them were bad.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::services::file_parser;
use crate::services::file_store::FileStore;
use crate::services::row_processors::RowProcessorSet;
use crate::store::JobStore;
use crate::types::{IngestionJob, JobStatus, StoreError};

/// Outcome of a single run attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another runner claimed the job first.
    Skipped,
    Completed {
        success_rows: i32,
        error_rows: i32,
    },
    Failed {
        reason: String,
    },
}

pub struct JobRunner {
    jobs: Arc<dyn JobStore>,
    files: Arc<dyn FileStore>,
    processors: RowProcessorSet,
    /// Hard per-run row cap; rows beyond it are counted as limited and
    /// dropped from the run.
    max_rows_per_run: usize,
    /// Persist counters every N rows so status readers see live progress.
    checkpoint_interval: usize,
}

impl JobRunner {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        files: Arc<dyn FileStore>,
        processors: RowProcessorSet,
        max_rows_per_run: usize,
    ) -> Self {
        Self {
            jobs,
            files,
            processors,
            max_rows_per_run,
            checkpoint_interval: 10,
        }
    }

    /// Run one job. The claim is the atomic `pending -> processing`
    /// transition; losing it means another worker took the job.
    pub async fn run(&self, mut job: IngestionJob) -> Result<RunOutcome, StoreError> {
        if !self.jobs.claim_job(job.id).await? {
            debug!("job {} no longer pending, skipping", job.id);
            return Ok(RunOutcome::Skipped);
        }
        job.status = JobStatus::Processing;
        info!(
            "processing ingestion job {} ({}, file '{}')",
            job.id,
            job.entity_type.as_str(),
            job.file_name
        );

        let bytes = match self.files.fetch(&job.file_url).await {
            Ok(bytes) => bytes,
            Err(e) => return self.fail(job, e.to_string()).await,
        };

        let extension = file_extension(&job.file_name);
        let rows = match file_parser::parse(&bytes, &extension) {
            Ok(rows) => rows,
            Err(e) => return self.fail(job, e.to_string()).await,
        };

        let total = rows.len();
        job.total_rows = total as i32;
        job.limited_rows = total.saturating_sub(self.max_rows_per_run) as i32;
        let rows_to_process = total.min(self.max_rows_per_run);
        if job.limited_rows > 0 {
            warn!(
                "job {}: {} rows exceed the per-run cap of {} and will not be processed",
                job.id, job.limited_rows, self.max_rows_per_run
            );
        }

        let processor = self.processors.get(job.entity_type);
        for (idx, row) in rows.iter().take(rows_to_process).enumerate() {
            let row_number = (idx + 1) as i32;
            match processor.process(job.tenant_id, row).await {
                Ok(_) => job.record_success(),
                Err(e) => job.record_failure(e.into_issue(row_number)),
            }
            if (idx + 1) % self.checkpoint_interval == 0 {
                self.jobs.save_job(&job).await?;
            }
        }

        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        self.jobs.save_job(&job).await?;
        info!(
            "ingestion job {} completed: {} ok, {} errors, {} of {} rows beyond cap",
            job.id, job.success_rows, job.error_rows, job.limited_rows, job.total_rows
        );
        Ok(RunOutcome::Completed {
            success_rows: job.success_rows,
            error_rows: job.error_rows,
        })
    }

    async fn fail(
        &self,
        mut job: IngestionJob,
        reason: String,
    ) -> Result<RunOutcome, StoreError> {
        warn!("ingestion job {} failed: {}", job.id, reason);
        job.status = JobStatus::Failed;
        job.failure_reason = Some(reason.clone());
        job.completed_at = Some(Utc::now());
        self.jobs.save_job(&job).await?;
        Ok(RunOutcome::Failed { reason })
    }
}

fn file_extension(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::file_store::MemoryFileStore;
    use crate::store::{JobStore as _, MemoryStore};
    use crate::types::EntityType;
    use uuid::Uuid;

    const CAP: usize = 100;

    fn setup() -> (Arc<MemoryStore>, Arc<MemoryFileStore>, JobRunner) {
        let store = Arc::new(MemoryStore::new());
        let files = Arc::new(MemoryFileStore::new());
        let runner = JobRunner::new(
            store.clone(),
            files.clone(),
            RowProcessorSet::new(store.clone()),
            CAP,
        );
        (store, files, runner)
    }

    fn location_csv(rows: usize) -> Vec<u8> {
        let mut csv = String::from("code,name\n");
        for i in 0..rows {
            csv.push_str(&format!("LOC-{},Hall {}\n", i, i));
        }
        csv.into_bytes()
    }

    async fn submit(
        store: &Arc<MemoryStore>,
        files: &Arc<MemoryFileStore>,
        name: &str,
        content: Vec<u8>,
    ) -> IngestionJob {
        let url = format!("mem://{}", name);
        files.put(url.clone(), content);
        let job = IngestionJob::new(Uuid::new_v4(), EntityType::Locations, url, name, 0);
        store.create_job(&job).await.unwrap();
        job
    }

    #[tokio::test]
    async fn test_all_valid_rows_complete_cleanly() {
        let (store, files, runner) = setup();
        let job = submit(&store, &files, "sites.csv", location_csv(25)).await;

        let outcome = runner.run(job.clone()).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Completed {
                success_rows: 25,
                error_rows: 0
            }
        );

        let reloaded = store.get_job(job.tenant_id, job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Completed);
        assert_eq!(reloaded.total_rows, 25);
        assert_eq!(reloaded.processed_rows, 25);
        assert_eq!(reloaded.success_rows, 25);
        assert_eq!(reloaded.error_rows, 0);
        assert_eq!(reloaded.limited_rows, 0);
        assert!(reloaded.completed_at.is_some());
        assert_eq!(store.location_count(job.tenant_id), 25);
    }

    #[tokio::test]
    async fn test_row_cap_limits_processing() {
        let (store, files, runner) = setup();
        let job = submit(&store, &files, "sites.csv", location_csv(150)).await;

        runner.run(job.clone()).await.unwrap();

        let reloaded = store.get_job(job.tenant_id, job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.total_rows, 150);
        assert_eq!(reloaded.processed_rows, 100);
        assert_eq!(reloaded.limited_rows, 50);
        assert_eq!(reloaded.status, JobStatus::Completed);
        assert_eq!(store.location_count(job.tenant_id), 100);
    }

    #[tokio::test]
    async fn test_partial_failure_records_errors_and_completes() {
        // 150 rows, 3 of the first 100 missing the required name.
        let mut csv = String::from("code,name\n");
        for i in 0..150 {
            if i == 10 || i == 20 || i == 30 {
                csv.push_str(&format!("LOC-{},\n", i));
            } else {
                csv.push_str(&format!("LOC-{},Hall {}\n", i, i));
            }
        }

        let (store, files, runner) = setup();
        let job = submit(&store, &files, "sites.csv", csv.into_bytes()).await;

        runner.run(job.clone()).await.unwrap();

        let reloaded = store.get_job(job.tenant_id, job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Completed);
        assert_eq!(reloaded.total_rows, 150);
        assert_eq!(reloaded.limited_rows, 50);
        assert_eq!(reloaded.processed_rows, 100);
        assert_eq!(reloaded.error_rows, 3);
        assert_eq!(reloaded.success_rows, 97);
        assert_eq!(
            reloaded.processed_rows,
            reloaded.success_rows + reloaded.error_rows
        );
        assert_eq!(reloaded.errors.len(), 3);
        // 1-based row numbers, strictly increasing.
        assert_eq!(reloaded.errors[0].row_number, 11);
        assert_eq!(reloaded.errors[1].row_number, 21);
        assert_eq!(reloaded.errors[2].row_number, 31);
    }

    #[tokio::test]
    async fn test_unreachable_file_fails_job_without_rows() {
        let (store, files, runner) = setup();
        let _ = files;
        let job = IngestionJob::new(
            Uuid::new_v4(),
            EntityType::Locations,
            "mem://nowhere.csv",
            "nowhere.csv",
            0,
        );
        store.create_job(&job).await.unwrap();

        let outcome = runner.run(job.clone()).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Failed { .. }));

        let reloaded = store.get_job(job.tenant_id, job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Failed);
        assert_eq!(reloaded.processed_rows, 0);
        assert!(reloaded.errors.is_empty());
        assert!(reloaded.failure_reason.is_some());
        assert!(reloaded.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_unsupported_format_fails_job() {
        let (store, files, runner) = setup();
        let job = submit(&store, &files, "sites.pdf", b"%PDF-1.4".to_vec()).await;

        let outcome = runner.run(job.clone()).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Failed { .. }));

        let reloaded = store.get_job(job.tenant_id, job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Failed);
        assert!(reloaded
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("unsupported"));
    }

    #[tokio::test]
    async fn test_empty_file_completes_with_zero_rows() {
        let (store, files, runner) = setup();
        let job = submit(&store, &files, "empty.csv", Vec::new()).await;

        let outcome = runner.run(job.clone()).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Completed {
                success_rows: 0,
                error_rows: 0
            }
        );

        let reloaded = store.get_job(job.tenant_id, job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Completed);
        assert_eq!(reloaded.total_rows, 0);
    }

    #[tokio::test]
    async fn test_already_claimed_job_is_skipped() {
        let (store, files, runner) = setup();
        let job = submit(&store, &files, "sites.csv", location_csv(3)).await;

        assert!(store.claim_job(job.id).await.unwrap());
        let outcome = runner.run(job).await.unwrap();
        assert_eq!(outcome, RunOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_reupload_updates_in_place() {
        let (store, files, runner) = setup();
        let tenant = Uuid::new_v4();

        let first = IngestionJob::new(
            tenant,
            EntityType::Locations,
            "mem://sites.csv",
            "sites.csv",
            0,
        );
        files.put("mem://sites.csv", location_csv(10));
        store.create_job(&first).await.unwrap();
        runner.run(first).await.unwrap();
        assert_eq!(store.location_count(tenant), 10);

        // Same file again: every code already exists, so everything updates.
        let second = IngestionJob::new(
            tenant,
            EntityType::Locations,
            "mem://sites.csv",
            "sites.csv",
            0,
        );
        store.create_job(&second).await.unwrap();
        let outcome = runner.run(second).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Completed {
                success_rows: 10,
                error_rows: 0
            }
        );
        assert_eq!(store.location_count(tenant), 10);
    }

    #[test]
    fn test_file_extension_is_lowercased() {
        assert_eq!(file_extension("Sites.CSV"), "csv");
        assert_eq!(file_extension("workbook.XLSX"), "xlsx");
        assert_eq!(file_extension("no-extension"), "");
    }
}
