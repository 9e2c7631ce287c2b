// ============================================================================
// Entity Model
// ============================================================================
//
// Typed domain entities and the glue the persistence layer needs to move
// them in and out of named statements:
//
// - PersistentObject: identity, tenancy, insert parameters, and a per-type
//   field-update function (no runtime reflection).
// - EntityRegistry: type name -> hydrator turning a backend row back into
//   an entity instance.
// - UpdateDescriptor: the changed-field map driving both the in-memory
//   mutation and the SQL update parameter set.
//
// ============================================================================

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::core::{EntityId, ParamMap, PersistenceError, Result, Value};

/// A domain entity that can be persisted.
///
/// Identity is assigned exactly once, before the first physical insert;
/// `assign_id` must reject reassignment. `(entity_type, id)` is unique per
/// tenant for the lifetime of the entity.
pub trait PersistentObject: fmt::Debug + Send + Sync {
    /// Concrete type name, used for statement resolution and the identity
    /// cache key.
    fn entity_type(&self) -> &'static str;

    /// Assigned identity, if any.
    fn id(&self) -> Option<EntityId>;

    /// Assign the identity. Must fail if an id is already present.
    fn assign_id(&mut self, id: EntityId) -> Result<()>;

    /// Owning tenant, for tenant-scoped entities.
    fn tenant_id(&self) -> Option<&str> {
        None
    }

    /// Full parameter set for this entity's insert statement, including
    /// `id` and (when present) `tenantId`.
    fn insert_params(&self) -> ParamMap;

    /// Apply one changed field in memory. `Value::Null` means the field is
    /// being set to SQL NULL. Implementations return `unknown_field` for
    /// fields they do not own.
    fn apply_update(&mut self, field: &str, value: &Value) -> Result<()>;
}

/// Helper for `apply_update` implementations: error for a field the entity
/// does not define, carrying enough context to reproduce the failure.
pub fn unknown_field(entity: &dyn PersistentObject, field: &str) -> PersistenceError {
    PersistenceError::EntityUpdate {
        entity_type: entity.entity_type().to_string(),
        id: entity.id().unwrap_or(0),
        field: field.to_string(),
        message: "no such field".to_string(),
    }
}

/// Helper for `apply_update` implementations: error for an operand whose
/// type does not fit the field.
pub fn field_type_mismatch(
    entity: &dyn PersistentObject,
    field: &str,
    value: &Value,
) -> PersistenceError {
    PersistenceError::EntityUpdate {
        entity_type: entity.entity_type().to_string(),
        id: entity.id().unwrap_or(0),
        field: field.to_string(),
        message: format!("value of type {} does not fit", value.type_name()),
    }
}

/// Shared handle to the canonical in-memory instance of an entity.
///
/// The identity cache guarantees at most one `EntityRef` per `(type, id)`
/// within a session; `Arc::ptr_eq` is the identity-stability check.
pub type EntityRef = Arc<RwLock<Box<dyn PersistentObject>>>;

/// Wrap a freshly built entity into a shareable handle.
pub fn entity_ref(entity: Box<dyn PersistentObject>) -> EntityRef {
    Arc::new(RwLock::new(entity))
}

type Hydrator = Arc<dyn Fn(&ParamMap) -> Result<Box<dyn PersistentObject>> + Send + Sync>;

/// Registry of per-type row hydrators.
///
/// Registered once at startup next to the mapping configuration; lookup by
/// the canonical entity type name.
#[derive(Clone, Default)]
pub struct EntityRegistry {
    hydrators: HashMap<String, Hydrator>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            hydrators: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, entity_type: &str, hydrator: F)
    where
        F: Fn(&ParamMap) -> Result<Box<dyn PersistentObject>> + Send + Sync + 'static,
    {
        self.hydrators
            .insert(entity_type.to_string(), Arc::new(hydrator));
    }

    pub fn hydrate(&self, entity_type: &str, row: &ParamMap) -> Result<Box<dyn PersistentObject>> {
        let hydrator = self
            .hydrators
            .get(entity_type)
            .ok_or_else(|| PersistenceError::UnknownEntityType(entity_type.to_string()))?;
        hydrator(row)
    }

    pub fn knows(&self, entity_type: &str) -> bool {
        self.hydrators.contains_key(entity_type)
    }
}

impl fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("types", &self.hydrators.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// One update request: the canonical entity handle plus the changed fields.
///
/// A field mapped to `Value::Null` is set to SQL NULL; a field absent from
/// the map is left untouched. Map presence is the sentinel the underlying
/// statement templating needs to tell those cases apart.
#[derive(Debug, Clone)]
pub struct UpdateDescriptor {
    pub entity: EntityRef,
    pub changes: HashMap<String, Value>,
}

impl UpdateDescriptor {
    pub fn new(entity: EntityRef) -> Self {
        Self {
            entity,
            changes: HashMap::new(),
        }
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.changes.insert(field.to_string(), value.into());
        self
    }

    pub fn set_null(mut self, field: &str) -> Self {
        self.changes.insert(field.to_string(), Value::Null);
        self
    }
}
