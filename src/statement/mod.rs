// ============================================================================
// Statement Resolver
// ============================================================================
//
// Maps a logical operation (entity type + verb) to a physical statement
// name. Lookup order:
//
//   1. database-specific override keyed by "<dbIdentifier>_<logicalName>"
//   2. "<physicalType>.<logicalName>", where the type may be redirected
//      through the entity remapping table
//
// A name that resolves to nothing in the known-statement set is a
// configuration error and is surfaced immediately, never defaulted.
//
// ============================================================================

use std::sync::Arc;

use crate::config::MappingConfig;
use crate::core::{PersistenceError, Result};

/// Logical operation names used by the session and façade.
pub const OP_INSERT: &str = "insert";
pub const OP_UPDATE: &str = "update";
pub const OP_DELETE: &str = "delete";
pub const OP_DELETE_ALL: &str = "deleteAll";
pub const OP_PURGE: &str = "purge";
pub const OP_SELECT_BY_ID: &str = "selectById";
pub const OP_SELECT_ONE: &str = "selectOne";
pub const OP_SELECT_LIST: &str = "selectList";

#[derive(Debug, Clone)]
pub struct StatementResolver {
    config: Arc<MappingConfig>,
    db_identifier: String,
}

impl StatementResolver {
    pub fn new(config: Arc<MappingConfig>, db_identifier: impl Into<String>) -> Self {
        Self {
            config,
            db_identifier: db_identifier.into(),
        }
    }

    pub fn resolve(&self, entity_type: &str, logical_op: &str) -> Result<String> {
        let override_key = format!("{}_{}", self.db_identifier, logical_op);
        let name = match self.config.db_override(&override_key) {
            Some(physical) => physical.to_string(),
            None => {
                let physical_type = self.config.physical_type(entity_type);
                format!("{physical_type}.{logical_op}")
            }
        };

        if self.config.has_statement(&name) {
            Ok(name)
        } else {
            Err(PersistenceError::MissingStatement {
                statement: name,
                entity_type: entity_type.to_string(),
                operation: logical_op.to_string(),
            })
        }
    }
}
