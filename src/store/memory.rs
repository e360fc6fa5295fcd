#![allow(dead_code)]
//! In-memory job and entity store
//!
//! Test double for the Postgres store; mirrors its conditional-update
//! semantics, including the atomic claim.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::{EntityStore, JobStore, StatusCounts};
use crate::types::{
    IngestionJob, JobStatus, Location, Machine, MachineModel, MaintenanceRange, Operation,
    StoreError,
};

#[derive(Default)]
struct Collections {
    jobs: HashMap<Uuid, IngestionJob>,
    locations: Vec<Location>,
    machine_models: Vec<MachineModel>,
    machines: Vec<Machine>,
    maintenance_ranges: Vec<MaintenanceRange>,
    operations: Vec<Operation>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_count(&self) -> usize {
        self.inner.read().jobs.len()
    }

    pub fn location_count(&self, tenant_id: Uuid) -> usize {
        self.inner
            .read()
            .locations
            .iter()
            .filter(|l| l.tenant_id == tenant_id)
            .count()
    }

    pub fn machine_count(&self, tenant_id: Uuid) -> usize {
        self.inner
            .read()
            .machines
            .iter()
            .filter(|m| m.tenant_id == tenant_id)
            .count()
    }

    pub fn machine_model_count(&self, tenant_id: Uuid) -> usize {
        self.inner
            .read()
            .machine_models
            .iter()
            .filter(|m| m.tenant_id == tenant_id)
            .count()
    }

    pub fn operation_count(&self, tenant_id: Uuid) -> usize {
        self.inner
            .read()
            .operations
            .iter()
            .filter(|o| o.tenant_id == tenant_id)
            .count()
    }

    pub fn maintenance_range_count(&self, tenant_id: Uuid) -> usize {
        self.inner
            .read()
            .maintenance_ranges
            .iter()
            .filter(|r| r.tenant_id == tenant_id)
            .count()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, job: &IngestionJob) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(format!(
                "job {} already exists",
                job.id
            )));
        }
        inner.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<IngestionJob>, StoreError> {
        Ok(self
            .inner
            .read()
            .jobs
            .get(&job_id)
            .filter(|j| j.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_jobs(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<IngestionJob>, i64), StoreError> {
        let inner = self.inner.read();
        let mut jobs: Vec<IngestionJob> = inner
            .jobs
            .values()
            .filter(|j| j.tenant_id == tenant_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = jobs.len() as i64;
        let page = jobs
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn load_pending(&self, limit: i64) -> Result<Vec<IngestionJob>, StoreError> {
        let inner = self.inner.read();
        let mut pending: Vec<IngestionJob> = inner
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn claim_job(&self, job_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        match inner.jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Processing;
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn save_job(&self, job: &IngestionJob) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let mut stored = job.clone();
        stored.updated_at = Utc::now();
        inner.jobs.insert(stored.id, stored);
        Ok(())
    }

    async fn fail_job(&self, job_id: Uuid, reason: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if let Some(job) = inner.jobs.get_mut(&job_id) {
            job.status = JobStatus::Failed;
            job.failure_reason = Some(reason.to_string());
            job.completed_at = Some(Utc::now());
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn count_by_status(&self, tenant_id: Option<Uuid>) -> Result<StatusCounts, StoreError> {
        let inner = self.inner.read();
        let mut counts = StatusCounts::default();
        for job in inner.jobs.values() {
            if tenant_id.is_some_and(|t| t != job.tenant_id) {
                continue;
            }
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    async fn oldest_pending(
        &self,
        tenant_id: Option<Uuid>,
    ) -> Result<Option<IngestionJob>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .filter(|j| tenant_id.map_or(true, |t| t == j.tenant_id))
            .min_by_key(|j| j.created_at)
            .cloned())
    }

    async fn jobs_created_since(
        &self,
        tenant_id: Option<Uuid>,
        since: DateTime<Utc>,
    ) -> Result<Vec<IngestionJob>, StoreError> {
        let inner = self.inner.read();
        let mut jobs: Vec<IngestionJob> = inner
            .jobs
            .values()
            .filter(|j| j.created_at >= since)
            .filter(|j| tenant_id.map_or(true, |t| t == j.tenant_id))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    async fn stale_jobs(&self, cutoff: DateTime<Utc>) -> Result<Vec<IngestionJob>, StoreError> {
        let inner = self.inner.read();
        let mut jobs: Vec<IngestionJob> = inner
            .jobs
            .values()
            .filter(|j| {
                matches!(j.status, JobStatus::Pending | JobStatus::Processing)
                    && j.updated_at < cutoff
            })
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(jobs)
    }

    async fn release_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.inner.write();
        let now = Utc::now();
        let mut released = 0u64;
        for job in inner.jobs.values_mut() {
            if job.updated_at >= cutoff {
                continue;
            }
            match job.status {
                JobStatus::Processing => {
                    job.status = JobStatus::Pending;
                    job.updated_at = now;
                    released += 1;
                }
                JobStatus::Pending => {
                    job.updated_at = now;
                    released += 1;
                }
                _ => {}
            }
        }
        Ok(released)
    }

    async fn recent_jobs(
        &self,
        tenant_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<IngestionJob>, StoreError> {
        let inner = self.inner.read();
        let mut jobs: Vec<IngestionJob> = inner
            .jobs
            .values()
            .filter(|j| tenant_id.map_or(true, |t| t == j.tenant_id))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn find_location(
        &self,
        tenant_id: Uuid,
        code: &str,
    ) -> Result<Option<Location>, StoreError> {
        Ok(self
            .inner
            .read()
            .locations
            .iter()
            .find(|l| l.tenant_id == tenant_id && l.internal_code == code)
            .cloned())
    }

    async fn insert_location(&self, location: &Location) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner
            .locations
            .iter()
            .any(|l| l.tenant_id == location.tenant_id && l.internal_code == location.internal_code)
        {
            return Err(StoreError::Conflict(format!(
                "location code '{}' already exists",
                location.internal_code
            )));
        }
        inner.locations.push(location.clone());
        Ok(())
    }

    async fn update_location(&self, location: &Location) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        match inner.locations.iter_mut().find(|l| l.id == location.id) {
            Some(stored) => {
                *stored = location.clone();
                Ok(())
            }
            None => Err(StoreError::Conflict(format!(
                "location {} does not exist",
                location.id
            ))),
        }
    }

    async fn find_machine_model(
        &self,
        tenant_id: Uuid,
        code: &str,
    ) -> Result<Option<MachineModel>, StoreError> {
        Ok(self
            .inner
            .read()
            .machine_models
            .iter()
            .find(|m| m.tenant_id == tenant_id && m.internal_code == code)
            .cloned())
    }

    async fn insert_machine_model(&self, model: &MachineModel) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner
            .machine_models
            .iter()
            .any(|m| m.tenant_id == model.tenant_id && m.internal_code == model.internal_code)
        {
            return Err(StoreError::Conflict(format!(
                "machine model code '{}' already exists",
                model.internal_code
            )));
        }
        inner.machine_models.push(model.clone());
        Ok(())
    }

    async fn update_machine_model(&self, model: &MachineModel) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        match inner.machine_models.iter_mut().find(|m| m.id == model.id) {
            Some(stored) => {
                *stored = model.clone();
                Ok(())
            }
            None => Err(StoreError::Conflict(format!(
                "machine model {} does not exist",
                model.id
            ))),
        }
    }

    async fn find_machine(
        &self,
        tenant_id: Uuid,
        code: &str,
    ) -> Result<Option<Machine>, StoreError> {
        Ok(self
            .inner
            .read()
            .machines
            .iter()
            .find(|m| m.tenant_id == tenant_id && m.internal_code == code)
            .cloned())
    }

    async fn insert_machine(&self, machine: &Machine) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner
            .machines
            .iter()
            .any(|m| m.tenant_id == machine.tenant_id && m.internal_code == machine.internal_code)
        {
            return Err(StoreError::Conflict(format!(
                "machine code '{}' already exists",
                machine.internal_code
            )));
        }
        inner.machines.push(machine.clone());
        Ok(())
    }

    async fn update_machine(&self, machine: &Machine) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        match inner.machines.iter_mut().find(|m| m.id == machine.id) {
            Some(stored) => {
                *stored = machine.clone();
                Ok(())
            }
            None => Err(StoreError::Conflict(format!(
                "machine {} does not exist",
                machine.id
            ))),
        }
    }

    async fn find_maintenance_range(
        &self,
        tenant_id: Uuid,
        code: &str,
    ) -> Result<Option<MaintenanceRange>, StoreError> {
        Ok(self
            .inner
            .read()
            .maintenance_ranges
            .iter()
            .find(|r| r.tenant_id == tenant_id && r.internal_code == code)
            .cloned())
    }

    async fn insert_maintenance_range(&self, range: &MaintenanceRange) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner
            .maintenance_ranges
            .iter()
            .any(|r| r.tenant_id == range.tenant_id && r.internal_code == range.internal_code)
        {
            return Err(StoreError::Conflict(format!(
                "maintenance range code '{}' already exists",
                range.internal_code
            )));
        }
        inner.maintenance_ranges.push(range.clone());
        Ok(())
    }

    async fn update_maintenance_range(&self, range: &MaintenanceRange) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        match inner
            .maintenance_ranges
            .iter_mut()
            .find(|r| r.id == range.id)
        {
            Some(stored) => {
                *stored = range.clone();
                Ok(())
            }
            None => Err(StoreError::Conflict(format!(
                "maintenance range {} does not exist",
                range.id
            ))),
        }
    }

    async fn find_operation(
        &self,
        tenant_id: Uuid,
        code: &str,
    ) -> Result<Option<Operation>, StoreError> {
        Ok(self
            .inner
            .read()
            .operations
            .iter()
            .find(|o| o.tenant_id == tenant_id && o.internal_code == code)
            .cloned())
    }

    async fn insert_operation(&self, operation: &Operation) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.operations.iter().any(|o| {
            o.tenant_id == operation.tenant_id && o.internal_code == operation.internal_code
        }) {
            return Err(StoreError::Conflict(format!(
                "operation code '{}' already exists",
                operation.internal_code
            )));
        }
        inner.operations.push(operation.clone());
        Ok(())
    }

    async fn update_operation(&self, operation: &Operation) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        match inner.operations.iter_mut().find(|o| o.id == operation.id) {
            Some(stored) => {
                *stored = operation.clone();
                Ok(())
            }
            None => Err(StoreError::Conflict(format!(
                "operation {} does not exist",
                operation.id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityType;

    fn pending_job(tenant_id: Uuid) -> IngestionJob {
        IngestionJob::new(
            tenant_id,
            EntityType::Locations,
            "mem://sites.csv",
            "sites.csv",
            128,
        )
    }

    #[tokio::test]
    async fn test_claim_is_conditional_on_pending() {
        let store = MemoryStore::new();
        let job = pending_job(Uuid::new_v4());
        store.create_job(&job).await.unwrap();

        assert!(store.claim_job(job.id).await.unwrap());
        // Second claim sees status processing and loses.
        assert!(!store.claim_job(job.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_unknown_job_returns_false() {
        let store = MemoryStore::new();
        assert!(!store.claim_job(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_load_pending_is_oldest_first() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let mut first = pending_job(tenant);
        first.created_at = Utc::now() - chrono::Duration::minutes(10);
        let second = pending_job(tenant);
        store.create_job(&second).await.unwrap();
        store.create_job(&first).await.unwrap();

        let pending = store.load_pending(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, first.id);
    }

    #[tokio::test]
    async fn test_release_stale_resets_processing_to_pending() {
        let store = MemoryStore::new();
        let mut job = pending_job(Uuid::new_v4());
        job.status = JobStatus::Processing;
        job.updated_at = Utc::now() - chrono::Duration::minutes(30);
        store.create_job(&job).await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::minutes(15);
        assert_eq!(store.stale_jobs(cutoff).await.unwrap().len(), 1);
        assert_eq!(store.release_stale(cutoff).await.unwrap(), 1);

        let reloaded = store.get_job(job.tenant_id, job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Pending);
        assert!(store.stale_jobs(cutoff).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_internal_code_is_conflict() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let now = Utc::now();
        let location = Location {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            internal_code: "LOC-main".to_string(),
            name: "Main hall".to_string(),
            description: None,
            parent_id: None,
            properties: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_location(&location).await.unwrap();

        let duplicate = Location {
            id: Uuid::new_v4(),
            ..location.clone()
        };
        assert!(store.insert_location(&duplicate).await.is_err());
    }
}
