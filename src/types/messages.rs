//! NATS message envelopes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generic request wrapper.
///
/// `tenant_id` is resolved by the platform gateway before the message
/// reaches the worker; the worker never authenticates callers itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request<T> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    pub payload: T,
}

impl<T> Request<T> {
    pub fn for_tenant(tenant_id: Uuid, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            tenant_id: Some(tenant_id),
            payload,
        }
    }
}

/// Generic success response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponse<T> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(request_id: Uuid, payload: T) -> Self {
        Self {
            id: request_id,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(request_id: Uuid, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: request_id,
            timestamp: Utc::now(),
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

/// Empty payload that accepts both `null` and `{}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyPayload {}

/// List request with pagination
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// List response with pagination info
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_envelope_uses_camel_case() {
        let request = Request::for_tenant(Uuid::new_v4(), EmptyPayload {});
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("tenantId"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_request_without_tenant_deserializes() {
        let json = r#"{"id":"4be44b26-e2bd-45bd-91a4-2f5a26ff7871","timestamp":"2025-03-01T10:00:00Z","payload":{}}"#;
        let request: Request<EmptyPayload> = serde_json::from_str(json).unwrap();
        assert!(request.tenant_id.is_none());
    }

    #[test]
    fn test_list_request_defaults() {
        let request: ListRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.limit, 50);
        assert_eq!(request.offset, 0);
    }

    #[test]
    fn test_error_response_carries_code() {
        let response = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", "bad payload");
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("INVALID_REQUEST"));
        assert!(json.contains("bad payload"));
    }
}
