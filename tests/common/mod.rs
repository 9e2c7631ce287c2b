#![allow(dead_code)]

use std::sync::Arc;

use flowstore::backend::memory::{InMemoryBackend, MemoryCatalog, MemoryCounterStore};
use flowstore::prelude::*;

/// Test entity standing in for an engine-side work item.
#[derive(Debug, Clone)]
pub struct Widget {
    pub id: Option<EntityId>,
    pub tenant: Option<String>,
    pub name: String,
    pub state: Option<String>,
}

impl Widget {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            tenant: None,
            name: name.to_string(),
            state: None,
        }
    }

    pub fn tenant(mut self, tenant: &str) -> Self {
        self.tenant = Some(tenant.to_string());
        self
    }
}

impl PersistentObject for Widget {
    fn entity_type(&self) -> &'static str {
        "Widget"
    }

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn assign_id(&mut self, id: EntityId) -> Result<()> {
        if let Some(existing) = self.id {
            return Err(PersistenceError::IdentityAlreadyAssigned {
                entity_type: "Widget".to_string(),
                id: existing,
            });
        }
        self.id = Some(id);
        Ok(())
    }

    fn tenant_id(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    fn insert_params(&self) -> ParamMap {
        let mut params = ParamMap::new();
        params.insert("id".to_string(), Value::from(self.id.unwrap_or(0)));
        if let Some(tenant) = &self.tenant {
            params.insert("tenantId".to_string(), Value::from(tenant.clone()));
        }
        params.insert("name".to_string(), Value::from(self.name.clone()));
        params.insert(
            "state".to_string(),
            self.state
                .as_ref()
                .map_or(Value::Null, |s| Value::from(s.clone())),
        );
        params
    }

    fn apply_update(&mut self, field: &str, value: &Value) -> Result<()> {
        match field {
            "name" => match value {
                Value::Text(s) => {
                    self.name = s.clone();
                    Ok(())
                }
                other => Err(flowstore::entity::field_type_mismatch(self, field, other)),
            },
            "state" => match value {
                Value::Text(s) => {
                    self.state = Some(s.clone());
                    Ok(())
                }
                Value::Null => {
                    self.state = None;
                    Ok(())
                }
                other => Err(flowstore::entity::field_type_mismatch(self, field, other)),
            },
            _ => Err(flowstore::entity::unknown_field(self, field)),
        }
    }
}

pub fn widget_registry() -> EntityRegistry {
    let mut registry = EntityRegistry::new();
    registry.register("Widget", |row| {
        Ok(Box::new(Widget {
            id: row.get("id").and_then(Value::as_entity_id),
            tenant: row
                .get("tenantId")
                .and_then(|v| v.as_text())
                .map(str::to_string),
            name: row
                .get("name")
                .and_then(|v| v.as_text())
                .unwrap_or_default()
                .to_string(),
            state: row
                .get("state")
                .and_then(|v| v.as_text())
                .map(str::to_string),
        }))
    });
    registry
}

/// Log output for failing tests; first caller wins, later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Service over the in-memory backend with the standard Widget statement
/// set. The backend handle is returned for committed-state assertions.
pub fn widget_service() -> (PersistenceService, InMemoryBackend) {
    init_tracing();
    let catalog = MemoryCatalog::new().with_entity("Widget", "widgets");

    let mut source = MappingSource::new();
    for name in catalog.statement_names() {
        source = source.statement(name);
    }

    let backend = InMemoryBackend::new(catalog);
    let allocator = Arc::new(IdAllocator::new(
        Arc::new(MemoryCounterStore::new()),
        AllocatorConfig::default(),
    ));

    let service = PersistenceService::new(
        Arc::new(MappingConfig::merge([source])),
        Arc::new(widget_registry()),
        Arc::new(backend.clone()),
        allocator,
        "h2",
    );
    (service, backend)
}

/// Read a Widget field out of an entity handle.
pub async fn widget_name(entity: &EntityRef) -> String {
    let guard = entity.read().await;
    guard
        .insert_params()
        .get("name")
        .and_then(|v| v.as_text())
        .unwrap_or_default()
        .to_string()
}
