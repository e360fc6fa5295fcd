//! Ingestion job types
//!
//! One `IngestionJob` tracks the lifecycle of a single uploaded file from
//! submission (`pending`) through `processing` to `completed` or `failed`.
//! Jobs are created by the submit operation, mutated only by the job runner
//! and the stuck-job recovery path, and never deleted by the worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================================================
// Tests First (TDD)
// ==========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_wire_format_is_kebab_case() {
        let json = serde_json::to_string(&EntityType::MachineModels).unwrap();
        assert_eq!(json, "\"machine-models\"");
        let parsed: EntityType = serde_json::from_str("\"maintenance-ranges\"").unwrap();
        assert_eq!(parsed, EntityType::MaintenanceRanges);
    }

    #[test]
    fn test_entity_type_round_trips_through_as_str() {
        for entity_type in EntityType::ALL {
            assert_eq!(EntityType::parse(entity_type.as_str()), Some(entity_type));
        }
        assert_eq!(EntityType::parse("widgets"), None);
    }

    #[test]
    fn test_status_transitions_forward_only() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        // Administrative recovery edge
        assert!(Processing.can_transition_to(Pending));
        // Everything else is illegal
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Processing));
    }

    #[test]
    fn test_new_job_starts_pending_with_zero_counters() {
        let job = IngestionJob::new(
            Uuid::new_v4(),
            EntityType::Locations,
            "https://files.upkeep.example/abc",
            "sites.csv",
            2048,
        );
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.total_rows, 0);
        assert_eq!(job.processed_rows, 0);
        assert!(job.errors.is_empty());
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn test_counters_stay_consistent() {
        let mut job = IngestionJob::new(
            Uuid::new_v4(),
            EntityType::Machines,
            "https://files.upkeep.example/abc",
            "machines.csv",
            0,
        );
        job.record_success();
        job.record_success();
        job.record_failure(RowIssue {
            row_number: 3,
            field: "model".to_string(),
            value: Some("MOD-missing".to_string()),
            message: "model 'MOD-missing' not found".to_string(),
        });
        assert_eq!(job.processed_rows, 3);
        assert_eq!(job.success_rows, 2);
        assert_eq!(job.error_rows, 1);
        assert_eq!(job.processed_rows, job.success_rows + job.error_rows);
        assert_eq!(job.errors.len(), 1);
    }

    #[test]
    fn test_job_serializes_camel_case() {
        let job = IngestionJob::new(
            Uuid::new_v4(),
            EntityType::Operations,
            "https://files.upkeep.example/abc",
            "ops.xlsx",
            512,
        );
        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("entityType"));
        assert!(json.contains("totalRows"));
        assert!(json.contains("limitedRows"));
        assert!(json.contains("fileUrl"));
    }
}

// ==========================================================================
// Entity types
// ==========================================================================

/// Entity collections that can be bulk-loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityType {
    Locations,
    MachineModels,
    Machines,
    MaintenanceRanges,
    Operations,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        EntityType::Locations,
        EntityType::MachineModels,
        EntityType::Machines,
        EntityType::MaintenanceRanges,
        EntityType::Operations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Locations => "locations",
            EntityType::MachineModels => "machine-models",
            EntityType::Machines => "machines",
            EntityType::MaintenanceRanges => "maintenance-ranges",
            EntityType::Operations => "operations",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "locations" => Some(EntityType::Locations),
            "machine-models" => Some(EntityType::MachineModels),
            "machines" => Some(EntityType::Machines),
            "maintenance-ranges" => Some(EntityType::MaintenanceRanges),
            "operations" => Some(EntityType::Operations),
            _ => None,
        }
    }

    /// Prefix used when generating internal codes for this collection.
    pub fn code_prefix(&self) -> &'static str {
        match self {
            EntityType::Locations => "LOC",
            EntityType::MachineModels => "MOD",
            EntityType::Machines => "MAC",
            EntityType::MaintenanceRanges => "RNG",
            EntityType::Operations => "OPR",
        }
    }
}

// ==========================================================================
// Job status
// ==========================================================================

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Forward transitions only, plus the administrative recovery edge
    /// `processing -> pending` used to unstick a crashed run.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Pending)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

// ==========================================================================
// Job record
// ==========================================================================

/// One row-scoped failure recorded on a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowIssue {
    /// 1-based position in the parsed row sequence.
    pub row_number: i32,
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub message: String,
}

/// One uploaded file's processing lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionJob {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub entity_type: EntityType,
    pub status: JobStatus,
    pub file_url: String,
    pub file_name: String,
    pub file_size: i64,
    pub total_rows: i32,
    pub processed_rows: i32,
    pub success_rows: i32,
    pub error_rows: i32,
    /// Rows beyond the per-run cap, dropped from this run.
    pub limited_rows: i32,
    pub errors: Vec<RowIssue>,
    /// Fatal cause; set only when the job failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl IngestionJob {
    pub fn new(
        tenant_id: Uuid,
        entity_type: EntityType,
        file_url: impl Into<String>,
        file_name: impl Into<String>,
        file_size: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            entity_type,
            status: JobStatus::Pending,
            file_url: file_url.into(),
            file_name: file_name.into(),
            file_size,
            total_rows: 0,
            processed_rows: 0,
            success_rows: 0,
            error_rows: 0,
            limited_rows: 0,
            errors: Vec::new(),
            failure_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn record_success(&mut self) {
        self.processed_rows += 1;
        self.success_rows += 1;
    }

    pub fn record_failure(&mut self, issue: RowIssue) {
        self.processed_rows += 1;
        self.error_rows += 1;
        self.errors.push(issue);
    }
}
