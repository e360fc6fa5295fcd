//! Domain entity records written by the row processors
//!
//! CRUD ownership of these collections lives in the platform API layer;
//! the worker only creates and updates them from imported rows. Every
//! record carries a tenant-scoped `internal_code` used to correlate rows
//! across uploads and to decide create vs. update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Site or physical location; may be nested under a parent location.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub internal_code: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub properties: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Equipment model (catalog entry)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MachineModel {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub internal_code: String,
    pub name: String,
    pub manufacturer: Option<String>,
    pub description: Option<String>,
    pub properties: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Equipment instance installed at a location.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub internal_code: String,
    pub name: String,
    pub serial_number: Option<String>,
    pub model_id: Uuid,
    pub location_id: Uuid,
    pub description: Option<String>,
    pub properties: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Maintenance range (schedule template)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceRange {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub internal_code: String,
    pub name: String,
    pub range_type: RangeType,
    pub frequency_days: Option<i32>,
    pub description: Option<String>,
    pub properties: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Maintenance operation (a single check or task, optionally attached to
/// a maintenance range).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub internal_code: String,
    pub name: String,
    pub value_type: OperationValueType,
    pub unit: Option<String>,
    pub range_id: Option<Uuid>,
    pub description: Option<String>,
    pub properties: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Maintenance range kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeType {
    Preventive,
    Predictive,
    Corrective,
}

impl RangeType {
    pub const LITERALS: &'static [&'static str] = &["preventive", "predictive", "corrective"];

    pub fn as_str(&self) -> &'static str {
        match self {
            RangeType::Preventive => "preventive",
            RangeType::Predictive => "predictive",
            RangeType::Corrective => "corrective",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "preventive" => Some(RangeType::Preventive),
            "predictive" => Some(RangeType::Predictive),
            "corrective" => Some(RangeType::Corrective),
            _ => None,
        }
    }
}

/// Value kinds an operation can record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationValueType {
    Boolean,
    Numeric,
    Text,
    Date,
}

impl OperationValueType {
    pub const LITERALS: &'static [&'static str] = &["boolean", "numeric", "text", "date"];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationValueType::Boolean => "boolean",
            OperationValueType::Numeric => "numeric",
            OperationValueType::Text => "text",
            OperationValueType::Date => "date",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "boolean" | "bool" => Some(OperationValueType::Boolean),
            "numeric" | "number" => Some(OperationValueType::Numeric),
            "text" | "string" => Some(OperationValueType::Text),
            "date" => Some(OperationValueType::Date),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_type_parses_declared_literals_only() {
        assert_eq!(RangeType::parse("preventive"), Some(RangeType::Preventive));
        assert_eq!(RangeType::parse("PREDICTIVE"), Some(RangeType::Predictive));
        assert_eq!(RangeType::parse("weekly"), None);
    }

    #[test]
    fn test_operation_value_type_accepts_common_aliases() {
        assert_eq!(
            OperationValueType::parse("bool"),
            Some(OperationValueType::Boolean)
        );
        assert_eq!(
            OperationValueType::parse("number"),
            Some(OperationValueType::Numeric)
        );
        assert_eq!(OperationValueType::parse("decimal"), None);
    }
}
