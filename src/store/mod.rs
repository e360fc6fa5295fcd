//! Persistence seams for job and entity records
//!
//! The document store is an external collaborator: production talks to
//! PostgreSQL, tests and local tick runs use the in-memory implementation.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::types::{
    IngestionJob, Location, Machine, MachineModel, MaintenanceRange, Operation, StoreError,
};

/// Counts of jobs per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

/// Store for ingestion job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &IngestionJob) -> Result<(), StoreError>;

    async fn get_job(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<IngestionJob>, StoreError>;

    /// Tenant-scoped page of jobs, newest first, plus the total count.
    async fn list_jobs(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<IngestionJob>, i64), StoreError>;

    /// Oldest pending jobs across all tenants.
    async fn load_pending(&self, limit: i64) -> Result<Vec<IngestionJob>, StoreError>;

    /// Conditional `pending -> processing` transition. Returns `false`
    /// when the job was no longer pending (another runner claimed it).
    async fn claim_job(&self, job_id: Uuid) -> Result<bool, StoreError>;

    /// Last-write-wins persist of counters, errors, status and timestamps.
    async fn save_job(&self, job: &IngestionJob) -> Result<(), StoreError>;

    /// Force a job into `failed` with the given reason.
    async fn fail_job(&self, job_id: Uuid, reason: &str) -> Result<(), StoreError>;

    async fn count_by_status(&self, tenant_id: Option<Uuid>) -> Result<StatusCounts, StoreError>;

    async fn oldest_pending(
        &self,
        tenant_id: Option<Uuid>,
    ) -> Result<Option<IngestionJob>, StoreError>;

    /// Jobs created inside the rolling stats window, oldest first.
    async fn jobs_created_since(
        &self,
        tenant_id: Option<Uuid>,
        since: DateTime<Utc>,
    ) -> Result<Vec<IngestionJob>, StoreError>;

    /// Pending or processing jobs whose `updated_at` is older than the cutoff.
    async fn stale_jobs(&self, cutoff: DateTime<Utc>) -> Result<Vec<IngestionJob>, StoreError>;

    /// Recovery: stale processing jobs go back to pending; stale pending
    /// jobs get a refreshed `updated_at`. Returns the number touched.
    async fn release_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Most recently created jobs, any status.
    async fn recent_jobs(
        &self,
        tenant_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<IngestionJob>, StoreError>;
}

/// Store for the entity collections the row processors write.
///
/// Lookups are always by the tenant-scoped internal code; the unique index
/// on `(tenant_id, internal_code)` backs the create-vs-update decision.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn find_location(
        &self,
        tenant_id: Uuid,
        code: &str,
    ) -> Result<Option<Location>, StoreError>;
    async fn insert_location(&self, location: &Location) -> Result<(), StoreError>;
    async fn update_location(&self, location: &Location) -> Result<(), StoreError>;

    async fn find_machine_model(
        &self,
        tenant_id: Uuid,
        code: &str,
    ) -> Result<Option<MachineModel>, StoreError>;
    async fn insert_machine_model(&self, model: &MachineModel) -> Result<(), StoreError>;
    async fn update_machine_model(&self, model: &MachineModel) -> Result<(), StoreError>;

    async fn find_machine(
        &self,
        tenant_id: Uuid,
        code: &str,
    ) -> Result<Option<Machine>, StoreError>;
    async fn insert_machine(&self, machine: &Machine) -> Result<(), StoreError>;
    async fn update_machine(&self, machine: &Machine) -> Result<(), StoreError>;

    async fn find_maintenance_range(
        &self,
        tenant_id: Uuid,
        code: &str,
    ) -> Result<Option<MaintenanceRange>, StoreError>;
    async fn insert_maintenance_range(&self, range: &MaintenanceRange) -> Result<(), StoreError>;
    async fn update_maintenance_range(&self, range: &MaintenanceRange) -> Result<(), StoreError>;

    async fn find_operation(
        &self,
        tenant_id: Uuid,
        code: &str,
    ) -> Result<Option<Operation>, StoreError>;
    async fn insert_operation(&self, operation: &Operation) -> Result<(), StoreError>;
    async fn update_operation(&self, operation: &Operation) -> Result<(), StoreError>;
}
