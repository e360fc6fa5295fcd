//! Row validation and persistence, one processor per entity type
//!
//! Each processor validates one parsed row and creates or updates the
//! matching entity. Identity is decided by the tenant-scoped internal
//! code: a matching code updates in place, a missing code creates with a
//! freshly generated one. A supplied-but-unknown code backfills a new
//! record for the catalog types (locations, machine models, maintenance
//! ranges, operations) but is rejected for machines, which require prior
//! existence. Failures are row-scoped and never stop the batch.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use crate::services::file_parser::RowRecord;
use crate::store::EntityStore;
use crate::types::{
    EntityType, Location, Machine, MachineModel, MaintenanceRange, Operation, OperationValueType,
    RangeType, RowError,
};

/// What a processor did with a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Created,
    Updated,
}

#[async_trait]
pub trait RowProcessor: Send + Sync {
    fn entity_type(&self) -> EntityType;

    /// Validate one row and create or update the matching entity.
    async fn process(&self, tenant_id: Uuid, row: &RowRecord) -> Result<RowOutcome, RowError>;
}

/// Processor lookup keyed by entity type — exhaustive at compile time.
pub struct RowProcessorSet {
    locations: LocationProcessor,
    machine_models: MachineModelProcessor,
    machines: MachineProcessor,
    maintenance_ranges: MaintenanceRangeProcessor,
    operations: OperationProcessor,
}

impl RowProcessorSet {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            locations: LocationProcessor {
                store: store.clone(),
            },
            machine_models: MachineModelProcessor {
                store: store.clone(),
            },
            machines: MachineProcessor {
                store: store.clone(),
            },
            maintenance_ranges: MaintenanceRangeProcessor {
                store: store.clone(),
            },
            operations: OperationProcessor { store },
        }
    }

    pub fn get(&self, entity_type: EntityType) -> &dyn RowProcessor {
        match entity_type {
            EntityType::Locations => &self.locations,
            EntityType::MachineModels => &self.machine_models,
            EntityType::Machines => &self.machines,
            EntityType::MaintenanceRanges => &self.maintenance_ranges,
            EntityType::Operations => &self.operations,
        }
    }
}

// ==========================================================================
// Shared helpers
// ==========================================================================

/// Generate a tenant-unique internal code, e.g. `LOC-x4k9w2ab`.
fn generate_internal_code(entity_type: EntityType) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{}-{}", entity_type.code_prefix(), suffix)
}

fn require<'a>(row: &'a RowRecord, field: &str) -> Result<&'a str, RowError> {
    row.get(field).ok_or_else(|| RowError::missing(field))
}

/// The optional free-form properties blob; must be a JSON object when present.
fn parse_properties(row: &RowRecord) -> Result<Option<serde_json::Value>, RowError> {
    let Some(raw) = row.get("properties") else {
        return Ok(None);
    };
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) if value.is_object() => Ok(Some(value)),
        Ok(_) => Err(RowError::invalid(
            "properties",
            raw,
            "properties must be a JSON object",
        )),
        Err(e) => Err(RowError::invalid(
            "properties",
            raw,
            format!("invalid JSON: {}", e),
        )),
    }
}

// ==========================================================================
// Locations
// ==========================================================================

pub struct LocationProcessor {
    store: Arc<dyn EntityStore>,
}

#[async_trait]
impl RowProcessor for LocationProcessor {
    fn entity_type(&self) -> EntityType {
        EntityType::Locations
    }

    async fn process(&self, tenant_id: Uuid, row: &RowRecord) -> Result<RowOutcome, RowError> {
        let name = require(row, "name")?;
        let properties = parse_properties(row)?;

        // An omitted parent means "no parent"; an explicit code that does
        // not resolve is always an error.
        let parent_id = match row.get("parent") {
            Some(code) => {
                let parent = self
                    .store
                    .find_location(tenant_id, code)
                    .await?
                    .ok_or_else(|| RowError::reference("parent", code))?;
                Some(parent.id)
            }
            None => None,
        };

        let existing = match row.get("code") {
            Some(code) => self.store.find_location(tenant_id, code).await?,
            None => None,
        };

        match existing {
            Some(mut location) => {
                location.name = name.to_string();
                if let Some(description) = row.get("description") {
                    location.description = Some(description.to_string());
                }
                if parent_id.is_some() {
                    location.parent_id = parent_id;
                }
                if properties.is_some() {
                    location.properties = properties;
                }
                location.updated_at = Utc::now();
                self.store.update_location(&location).await?;
                Ok(RowOutcome::Updated)
            }
            None => {
                let now = Utc::now();
                let location = Location {
                    id: Uuid::new_v4(),
                    tenant_id,
                    internal_code: row
                        .get("code")
                        .map(str::to_string)
                        .unwrap_or_else(|| generate_internal_code(EntityType::Locations)),
                    name: name.to_string(),
                    description: row.get("description").map(str::to_string),
                    parent_id,
                    properties,
                    created_at: now,
                    updated_at: now,
                };
                self.store.insert_location(&location).await?;
                Ok(RowOutcome::Created)
            }
        }
    }
}

// ==========================================================================
// Machine models
// ==========================================================================

pub struct MachineModelProcessor {
    store: Arc<dyn EntityStore>,
}

#[async_trait]
impl RowProcessor for MachineModelProcessor {
    fn entity_type(&self) -> EntityType {
        EntityType::MachineModels
    }

    async fn process(&self, tenant_id: Uuid, row: &RowRecord) -> Result<RowOutcome, RowError> {
        let name = require(row, "name")?;
        let properties = parse_properties(row)?;

        let existing = match row.get("code") {
            Some(code) => self.store.find_machine_model(tenant_id, code).await?,
            None => None,
        };

        match existing {
            Some(mut model) => {
                model.name = name.to_string();
                if let Some(manufacturer) = row.get("manufacturer") {
                    model.manufacturer = Some(manufacturer.to_string());
                }
                if let Some(description) = row.get("description") {
                    model.description = Some(description.to_string());
                }
                if properties.is_some() {
                    model.properties = properties;
                }
                model.updated_at = Utc::now();
                self.store.update_machine_model(&model).await?;
                Ok(RowOutcome::Updated)
            }
            None => {
                let now = Utc::now();
                let model = MachineModel {
                    id: Uuid::new_v4(),
                    tenant_id,
                    internal_code: row
                        .get("code")
                        .map(str::to_string)
                        .unwrap_or_else(|| generate_internal_code(EntityType::MachineModels)),
                    name: name.to_string(),
                    manufacturer: row.get("manufacturer").map(str::to_string),
                    description: row.get("description").map(str::to_string),
                    properties,
                    created_at: now,
                    updated_at: now,
                };
                self.store.insert_machine_model(&model).await?;
                Ok(RowOutcome::Created)
            }
        }
    }
}

// ==========================================================================
// Machines
// ==========================================================================

pub struct MachineProcessor {
    store: Arc<dyn EntityStore>,
}

#[async_trait]
impl RowProcessor for MachineProcessor {
    fn entity_type(&self) -> EntityType {
        EntityType::Machines
    }

    async fn process(&self, tenant_id: Uuid, row: &RowRecord) -> Result<RowOutcome, RowError> {
        let name = require(row, "name")?;
        let model_code = require(row, "model")?;
        let location_code = require(row, "location")?;
        let properties = parse_properties(row)?;

        let model = self
            .store
            .find_machine_model(tenant_id, model_code)
            .await?
            .ok_or_else(|| RowError::reference("model", model_code))?;
        let location = self
            .store
            .find_location(tenant_id, location_code)
            .await?
            .ok_or_else(|| RowError::reference("location", location_code))?;

        match row.get("code") {
            Some(code) => {
                // Machines are update-oriented: an unknown code is a data
                // error, not an invitation to backfill.
                let mut machine = self
                    .store
                    .find_machine(tenant_id, code)
                    .await?
                    .ok_or_else(|| {
                        RowError::invalid("code", code, format!("unknown machine code '{}'", code))
                    })?;
                machine.name = name.to_string();
                machine.model_id = model.id;
                machine.location_id = location.id;
                if let Some(serial) = row.get("serial_number") {
                    machine.serial_number = Some(serial.to_string());
                }
                if let Some(description) = row.get("description") {
                    machine.description = Some(description.to_string());
                }
                if properties.is_some() {
                    machine.properties = properties;
                }
                machine.updated_at = Utc::now();
                self.store.update_machine(&machine).await?;
                Ok(RowOutcome::Updated)
            }
            None => {
                let now = Utc::now();
                let machine = Machine {
                    id: Uuid::new_v4(),
                    tenant_id,
                    internal_code: generate_internal_code(EntityType::Machines),
                    name: name.to_string(),
                    serial_number: row.get("serial_number").map(str::to_string),
                    model_id: model.id,
                    location_id: location.id,
                    description: row.get("description").map(str::to_string),
                    properties,
                    created_at: now,
                    updated_at: now,
                };
                self.store.insert_machine(&machine).await?;
                Ok(RowOutcome::Created)
            }
        }
    }
}

// ==========================================================================
// Maintenance ranges
// ==========================================================================

pub struct MaintenanceRangeProcessor {
    store: Arc<dyn EntityStore>,
}

#[async_trait]
impl RowProcessor for MaintenanceRangeProcessor {
    fn entity_type(&self) -> EntityType {
        EntityType::MaintenanceRanges
    }

    async fn process(&self, tenant_id: Uuid, row: &RowRecord) -> Result<RowOutcome, RowError> {
        let name = require(row, "name")?;
        let type_raw = require(row, "type")?;
        let range_type = RangeType::parse(type_raw).ok_or_else(|| {
            RowError::invalid(
                "type",
                type_raw,
                format!("expected one of: {}", RangeType::LITERALS.join(", ")),
            )
        })?;
        let frequency_days = match row.get("frequency_days") {
            Some(raw) => Some(raw.parse::<i32>().map_err(|_| {
                RowError::invalid("frequency_days", raw, "expected a whole number of days")
            })?),
            None => None,
        };
        let properties = parse_properties(row)?;

        let existing = match row.get("code") {
            Some(code) => self.store.find_maintenance_range(tenant_id, code).await?,
            None => None,
        };

        match existing {
            Some(mut range) => {
                range.name = name.to_string();
                range.range_type = range_type;
                if frequency_days.is_some() {
                    range.frequency_days = frequency_days;
                }
                if let Some(description) = row.get("description") {
                    range.description = Some(description.to_string());
                }
                if properties.is_some() {
                    range.properties = properties;
                }
                range.updated_at = Utc::now();
                self.store.update_maintenance_range(&range).await?;
                Ok(RowOutcome::Updated)
            }
            None => {
                let now = Utc::now();
                let range = MaintenanceRange {
                    id: Uuid::new_v4(),
                    tenant_id,
                    internal_code: row
                        .get("code")
                        .map(str::to_string)
                        .unwrap_or_else(|| generate_internal_code(EntityType::MaintenanceRanges)),
                    name: name.to_string(),
                    range_type,
                    frequency_days,
                    description: row.get("description").map(str::to_string),
                    properties,
                    created_at: now,
                    updated_at: now,
                };
                self.store.insert_maintenance_range(&range).await?;
                Ok(RowOutcome::Created)
            }
        }
    }
}

// ==========================================================================
// Operations
// ==========================================================================

pub struct OperationProcessor {
    store: Arc<dyn EntityStore>,
}

#[async_trait]
impl RowProcessor for OperationProcessor {
    fn entity_type(&self) -> EntityType {
        EntityType::Operations
    }

    async fn process(&self, tenant_id: Uuid, row: &RowRecord) -> Result<RowOutcome, RowError> {
        let name = require(row, "name")?;
        let value_type_raw = require(row, "value_type")?;
        let value_type = OperationValueType::parse(value_type_raw).ok_or_else(|| {
            RowError::invalid(
                "value_type",
                value_type_raw,
                format!(
                    "expected one of: {}",
                    OperationValueType::LITERALS.join(", ")
                ),
            )
        })?;
        let properties = parse_properties(row)?;

        // Optional attachment to a maintenance range; explicit but
        // unresolved codes are errors.
        let range_id = match row.get("range") {
            Some(code) => {
                let range = self
                    .store
                    .find_maintenance_range(tenant_id, code)
                    .await?
                    .ok_or_else(|| RowError::reference("range", code))?;
                Some(range.id)
            }
            None => None,
        };

        let existing = match row.get("code") {
            Some(code) => self.store.find_operation(tenant_id, code).await?,
            None => None,
        };

        match existing {
            Some(mut operation) => {
                operation.name = name.to_string();
                operation.value_type = value_type;
                if let Some(unit) = row.get("unit") {
                    operation.unit = Some(unit.to_string());
                }
                if range_id.is_some() {
                    operation.range_id = range_id;
                }
                if let Some(description) = row.get("description") {
                    operation.description = Some(description.to_string());
                }
                if properties.is_some() {
                    operation.properties = properties;
                }
                operation.updated_at = Utc::now();
                self.store.update_operation(&operation).await?;
                Ok(RowOutcome::Updated)
            }
            None => {
                let now = Utc::now();
                let operation = Operation {
                    id: Uuid::new_v4(),
                    tenant_id,
                    internal_code: row
                        .get("code")
                        .map(str::to_string)
                        .unwrap_or_else(|| generate_internal_code(EntityType::Operations)),
                    name: name.to_string(),
                    value_type,
                    unit: row.get("unit").map(str::to_string),
                    range_id,
                    description: row.get("description").map(str::to_string),
                    properties,
                    created_at: now,
                    updated_at: now,
                };
                self.store.insert_operation(&operation).await?;
                Ok(RowOutcome::Created)
            }
        }
    }
}

// ==========================================================================
// Tests
// ==========================================================================
