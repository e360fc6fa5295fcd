//! Error taxonomy for the ingestion pipeline
//!
//! Row-scoped errors (`RowError`) are recorded on the job and never abort
//! the batch. Job-fatal errors (`FetchError`, `ParseError`) stop the run
//! and mark the job failed.

use thiserror::Error;

use super::ingestion::RowIssue;

/// Persistence failure from a job or entity store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Decode(String),
    #[error("{0}")]
    Conflict(String),
}

/// Failure attributable to a single input row.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("{message}")]
    Validation {
        field: String,
        value: Option<String>,
        message: String,
    },
    #[error("{field} '{value}' not found")]
    ReferenceNotFound { field: String, value: String },
    #[error("write failed: {0}")]
    Persistence(#[from] StoreError),
}

impl RowError {
    pub fn missing(field: &str) -> Self {
        RowError::Validation {
            field: field.to_string(),
            value: None,
            message: format!("missing required field '{}'", field),
        }
    }

    pub fn invalid(field: &str, value: &str, message: impl Into<String>) -> Self {
        RowError::Validation {
            field: field.to_string(),
            value: Some(value.to_string()),
            message: message.into(),
        }
    }

    pub fn reference(field: &str, value: &str) -> Self {
        RowError::ReferenceNotFound {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    /// Convert into the persisted error-list entry for the given 1-based row.
    pub fn into_issue(self, row_number: i32) -> RowIssue {
        match self {
            RowError::Validation {
                field,
                value,
                message,
            } => RowIssue {
                row_number,
                field,
                value,
                message,
            },
            RowError::ReferenceNotFound { field, value } => RowIssue {
                row_number,
                message: format!("{} '{}' not found", field, value),
                field,
                value: Some(value),
            },
            RowError::Persistence(err) => RowIssue {
                row_number,
                field: String::new(),
                value: None,
                message: format!("write failed: {}", err),
            },
        }
    }
}

/// The uploaded file could not be retrieved from the blob store.
#[derive(Debug, Error)]
#[error("failed to fetch {url}: {message}")]
pub struct FetchError {
    pub url: String,
    pub message: String,
}

/// The uploaded file could not be turned into rows.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unsupported file format: .{0}")]
    UnsupportedFormat(String),
    #[error("malformed {kind} file: {message}")]
    Malformed { kind: &'static str, message: String },
}
