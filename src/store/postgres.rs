//! PostgreSQL job and entity store
//!
//! All writes are individual last-write-wins updates; the only conditional
//! write is the claim (`pending -> processing`), which is what keeps two
//! workers from running the same job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{EntityStore, JobStore, StatusCounts};
use crate::types::{
    EntityType, IngestionJob, JobStatus, Location, Machine, MachineModel, MaintenanceRange,
    Operation, OperationValueType, RangeType, RowIssue, StoreError,
};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ==========================================================================
// Row mapping
// ==========================================================================

#[derive(FromRow)]
struct JobRow {
    id: Uuid,
    tenant_id: Uuid,
    entity_type: String,
    status: String,
    file_url: String,
    file_name: String,
    file_size: i64,
    total_rows: i32,
    processed_rows: i32,
    success_rows: i32,
    error_rows: i32,
    limited_rows: i32,
    errors: Json<Vec<RowIssue>>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl JobRow {
    fn into_job(self) -> Result<IngestionJob, StoreError> {
        let entity_type = EntityType::parse(&self.entity_type).ok_or_else(|| {
            StoreError::Decode(format!("unknown entity type '{}'", self.entity_type))
        })?;
        let status = JobStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Decode(format!("unknown job status '{}'", self.status)))?;
        Ok(IngestionJob {
            id: self.id,
            tenant_id: self.tenant_id,
            entity_type,
            status,
            file_url: self.file_url,
            file_name: self.file_name,
            file_size: self.file_size,
            total_rows: self.total_rows,
            processed_rows: self.processed_rows,
            success_rows: self.success_rows,
            error_rows: self.error_rows,
            limited_rows: self.limited_rows,
            errors: self.errors.0,
            failure_reason: self.failure_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}

const JOB_COLUMNS: &str = "id, tenant_id, entity_type, status, file_url, file_name, file_size, \
     total_rows, processed_rows, success_rows, error_rows, limited_rows, \
     errors, failure_reason, created_at, updated_at, completed_at";

#[derive(FromRow)]
struct MaintenanceRangeRow {
    id: Uuid,
    tenant_id: Uuid,
    internal_code: String,
    name: String,
    range_type: String,
    frequency_days: Option<i32>,
    description: Option<String>,
    properties: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MaintenanceRangeRow {
    fn into_range(self) -> Result<MaintenanceRange, StoreError> {
        let range_type = RangeType::parse(&self.range_type).ok_or_else(|| {
            StoreError::Decode(format!("unknown range type '{}'", self.range_type))
        })?;
        Ok(MaintenanceRange {
            id: self.id,
            tenant_id: self.tenant_id,
            internal_code: self.internal_code,
            name: self.name,
            range_type,
            frequency_days: self.frequency_days,
            description: self.description,
            properties: self.properties,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct OperationRow {
    id: Uuid,
    tenant_id: Uuid,
    internal_code: String,
    name: String,
    value_type: String,
    unit: Option<String>,
    range_id: Option<Uuid>,
    description: Option<String>,
    properties: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OperationRow {
    fn into_operation(self) -> Result<Operation, StoreError> {
        let value_type = OperationValueType::parse(&self.value_type).ok_or_else(|| {
            StoreError::Decode(format!("unknown value type '{}'", self.value_type))
        })?;
        Ok(Operation {
            id: self.id,
            tenant_id: self.tenant_id,
            internal_code: self.internal_code,
            name: self.name,
            value_type,
            unit: self.unit,
            range_id: self.range_id,
            description: self.description,
            properties: self.properties,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ==========================================================================
// Job store
// ==========================================================================

#[async_trait]
impl JobStore for PgStore {
    async fn create_job(&self, job: &IngestionJob) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ingestion_jobs (id, tenant_id, entity_type, status,
                file_url, file_name, file_size,
                total_rows, processed_rows, success_rows, error_rows, limited_rows,
                errors, failure_reason, created_at, updated_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(job.id)
        .bind(job.tenant_id)
        .bind(job.entity_type.as_str())
        .bind(job.status.as_str())
        .bind(&job.file_url)
        .bind(&job.file_name)
        .bind(job.file_size)
        .bind(job.total_rows)
        .bind(job.processed_rows)
        .bind(job.success_rows)
        .bind(job.error_rows)
        .bind(job.limited_rows)
        .bind(Json(&job.errors))
        .bind(&job.failure_reason)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_job(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> Result<Option<IngestionJob>, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM ingestion_jobs WHERE id = $1 AND tenant_id = $2",
            JOB_COLUMNS
        ))
        .bind(job_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(JobRow::into_job).transpose()
    }

    async fn list_jobs(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<IngestionJob>, i64), StoreError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM ingestion_jobs WHERE tenant_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            JOB_COLUMNS
        ))
        .bind(tenant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM ingestion_jobs WHERE tenant_id = $1")
                .bind(tenant_id)
                .fetch_one(&self.pool)
                .await?;

        let jobs = rows
            .into_iter()
            .map(JobRow::into_job)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((jobs, total))
    }

    async fn load_pending(&self, limit: i64) -> Result<Vec<IngestionJob>, StoreError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM ingestion_jobs WHERE status = 'pending' \
             ORDER BY created_at ASC LIMIT $1",
            JOB_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn claim_job(&self, job_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE ingestion_jobs SET status = 'processing', updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn save_job(&self, job: &IngestionJob) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE ingestion_jobs
            SET status = $2,
                total_rows = $3,
                processed_rows = $4,
                success_rows = $5,
                error_rows = $6,
                limited_rows = $7,
                errors = $8,
                failure_reason = $9,
                completed_at = $10,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.total_rows)
        .bind(job.processed_rows)
        .bind(job.success_rows)
        .bind(job.error_rows)
        .bind(job.limited_rows)
        .bind(Json(&job.errors))
        .bind(&job.failure_reason)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_job(&self, job_id: Uuid, reason: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE ingestion_jobs SET status = 'failed', failure_reason = $2, \
             completed_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(job_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_by_status(&self, tenant_id: Option<Uuid>) -> Result<StatusCounts, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM ingestion_jobs \
             WHERE ($1::uuid IS NULL OR tenant_id = $1) GROUP BY status",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            match status.as_str() {
                "pending" => counts.pending = count,
                "processing" => counts.processing = count,
                "completed" => counts.completed = count,
                "failed" => counts.failed = count,
                _ => {}
            }
        }
        Ok(counts)
    }

    async fn oldest_pending(
        &self,
        tenant_id: Option<Uuid>,
    ) -> Result<Option<IngestionJob>, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM ingestion_jobs WHERE status = 'pending' \
             AND ($1::uuid IS NULL OR tenant_id = $1) \
             ORDER BY created_at ASC LIMIT 1",
            JOB_COLUMNS
        ))
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(JobRow::into_job).transpose()
    }

    async fn jobs_created_since(
        &self,
        tenant_id: Option<Uuid>,
        since: DateTime<Utc>,
    ) -> Result<Vec<IngestionJob>, StoreError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM ingestion_jobs WHERE created_at >= $2 \
             AND ($1::uuid IS NULL OR tenant_id = $1) \
             ORDER BY created_at ASC",
            JOB_COLUMNS
        ))
        .bind(tenant_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn stale_jobs(&self, cutoff: DateTime<Utc>) -> Result<Vec<IngestionJob>, StoreError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM ingestion_jobs \
             WHERE status IN ('pending', 'processing') AND updated_at < $1 \
             ORDER BY updated_at ASC",
            JOB_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn release_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let reset = sqlx::query(
            "UPDATE ingestion_jobs SET status = 'pending', updated_at = NOW() \
             WHERE status = 'processing' AND updated_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let refreshed = sqlx::query(
            "UPDATE ingestion_jobs SET updated_at = NOW() \
             WHERE status = 'pending' AND updated_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(reset.rows_affected() + refreshed.rows_affected())
    }

    async fn recent_jobs(
        &self,
        tenant_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<IngestionJob>, StoreError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM ingestion_jobs \
             WHERE ($1::uuid IS NULL OR tenant_id = $1) \
             ORDER BY created_at DESC LIMIT $2",
            JOB_COLUMNS
        ))
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }
}

// ==========================================================================
// Entity store
// ==========================================================================

#[async_trait]
impl EntityStore for PgStore {
    async fn find_location(
        &self,
        tenant_id: Uuid,
        code: &str,
    ) -> Result<Option<Location>, StoreError> {
        let location = sqlx::query_as::<_, Location>(
            "SELECT id, tenant_id, internal_code, name, description, parent_id, properties, \
             created_at, updated_at \
             FROM locations WHERE tenant_id = $1 AND internal_code = $2",
        )
        .bind(tenant_id)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(location)
    }

    async fn insert_location(&self, location: &Location) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO locations (id, tenant_id, internal_code, name, description,
                parent_id, properties, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(location.id)
        .bind(location.tenant_id)
        .bind(&location.internal_code)
        .bind(&location.name)
        .bind(&location.description)
        .bind(location.parent_id)
        .bind(&location.properties)
        .bind(location.created_at)
        .bind(location.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_location(&self, location: &Location) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE locations
            SET name = $2,
                description = $3,
                parent_id = $4,
                properties = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(location.id)
        .bind(&location.name)
        .bind(&location.description)
        .bind(location.parent_id)
        .bind(&location.properties)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_machine_model(
        &self,
        tenant_id: Uuid,
        code: &str,
    ) -> Result<Option<MachineModel>, StoreError> {
        let model = sqlx::query_as::<_, MachineModel>(
            "SELECT id, tenant_id, internal_code, name, manufacturer, description, properties, \
             created_at, updated_at \
             FROM machine_models WHERE tenant_id = $1 AND internal_code = $2",
        )
        .bind(tenant_id)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(model)
    }

    async fn insert_machine_model(&self, model: &MachineModel) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO machine_models (id, tenant_id, internal_code, name, manufacturer,
                description, properties, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(model.id)
        .bind(model.tenant_id)
        .bind(&model.internal_code)
        .bind(&model.name)
        .bind(&model.manufacturer)
        .bind(&model.description)
        .bind(&model.properties)
        .bind(model.created_at)
        .bind(model.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_machine_model(&self, model: &MachineModel) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE machine_models
            SET name = $2,
                manufacturer = $3,
                description = $4,
                properties = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(model.id)
        .bind(&model.name)
        .bind(&model.manufacturer)
        .bind(&model.description)
        .bind(&model.properties)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_machine(
        &self,
        tenant_id: Uuid,
        code: &str,
    ) -> Result<Option<Machine>, StoreError> {
        let machine = sqlx::query_as::<_, Machine>(
            "SELECT id, tenant_id, internal_code, name, serial_number, model_id, location_id, \
             description, properties, created_at, updated_at \
             FROM machines WHERE tenant_id = $1 AND internal_code = $2",
        )
        .bind(tenant_id)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(machine)
    }

    async fn insert_machine(&self, machine: &Machine) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO machines (id, tenant_id, internal_code, name, serial_number,
                model_id, location_id, description, properties, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(machine.id)
        .bind(machine.tenant_id)
        .bind(&machine.internal_code)
        .bind(&machine.name)
        .bind(&machine.serial_number)
        .bind(machine.model_id)
        .bind(machine.location_id)
        .bind(&machine.description)
        .bind(&machine.properties)
        .bind(machine.created_at)
        .bind(machine.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_machine(&self, machine: &Machine) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE machines
            SET name = $2,
                serial_number = $3,
                model_id = $4,
                location_id = $5,
                description = $6,
                properties = $7,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(machine.id)
        .bind(&machine.name)
        .bind(&machine.serial_number)
        .bind(machine.model_id)
        .bind(machine.location_id)
        .bind(&machine.description)
        .bind(&machine.properties)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_maintenance_range(
        &self,
        tenant_id: Uuid,
        code: &str,
    ) -> Result<Option<MaintenanceRange>, StoreError> {
        let row = sqlx::query_as::<_, MaintenanceRangeRow>(
            "SELECT id, tenant_id, internal_code, name, range_type, frequency_days, \
             description, properties, created_at, updated_at \
             FROM maintenance_ranges WHERE tenant_id = $1 AND internal_code = $2",
        )
        .bind(tenant_id)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        row.map(MaintenanceRangeRow::into_range).transpose()
    }

    async fn insert_maintenance_range(&self, range: &MaintenanceRange) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO maintenance_ranges (id, tenant_id, internal_code, name, range_type,
                frequency_days, description, properties, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(range.id)
        .bind(range.tenant_id)
        .bind(&range.internal_code)
        .bind(&range.name)
        .bind(range.range_type.as_str())
        .bind(range.frequency_days)
        .bind(&range.description)
        .bind(&range.properties)
        .bind(range.created_at)
        .bind(range.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_maintenance_range(&self, range: &MaintenanceRange) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE maintenance_ranges
            SET name = $2,
                range_type = $3,
                frequency_days = $4,
                description = $5,
                properties = $6,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(range.id)
        .bind(&range.name)
        .bind(range.range_type.as_str())
        .bind(range.frequency_days)
        .bind(&range.description)
        .bind(&range.properties)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_operation(
        &self,
        tenant_id: Uuid,
        code: &str,
    ) -> Result<Option<Operation>, StoreError> {
        let row = sqlx::query_as::<_, OperationRow>(
            "SELECT id, tenant_id, internal_code, name, value_type, unit, range_id, \
             description, properties, created_at, updated_at \
             FROM operations WHERE tenant_id = $1 AND internal_code = $2",
        )
        .bind(tenant_id)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        row.map(OperationRow::into_operation).transpose()
    }

    async fn insert_operation(&self, operation: &Operation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO operations (id, tenant_id, internal_code, name, value_type,
                unit, range_id, description, properties, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(operation.id)
        .bind(operation.tenant_id)
        .bind(&operation.internal_code)
        .bind(&operation.name)
        .bind(operation.value_type.as_str())
        .bind(&operation.unit)
        .bind(operation.range_id)
        .bind(&operation.description)
        .bind(&operation.properties)
        .bind(operation.created_at)
        .bind(operation.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_operation(&self, operation: &Operation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE operations
            SET name = $2,
                value_type = $3,
                unit = $4,
                range_id = $5,
                description = $6,
                properties = $7,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(operation.id)
        .bind(&operation.name)
        .bind(operation.value_type.as_str())
        .bind(&operation.unit)
        .bind(operation.range_id)
        .bind(&operation.description)
        .bind(&operation.properties)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
