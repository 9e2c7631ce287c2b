// ============================================================================
// In-Memory Statement Backend
// ============================================================================
//
// Table-per-entity store executing the statement catalog against plain
// maps. Each connection stages its mutations locally and publishes them on
// commit, so commit/rollback visibility is observable in tests without a
// SQL driver.
//
// Compiled filter fragments are SQL text and are NOT evaluated here; this
// backend matches rows on plain parameter equality and honors the paging
// window. Fragment substitution belongs to a real SQL mapper.
//
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::backend::{
    ConnectionFactory, PARAM_FILTER, PARAM_FIRST_RESULT, PARAM_MAX_RESULTS, PARAM_ORDER_BY,
    StatementConnection,
};
use crate::core::{EntityId, ParamMap, PersistenceError, Result, Value};
use crate::idgen::CounterStore;

/// What a physical statement does when this backend executes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementVerb {
    Insert,
    Update,
    Delete,
    DeleteAll,
    SelectById,
    SelectOne,
    SelectList,
}

/// Physical statement name -> (table, verb). The in-memory equivalent of a
/// pre-authored statement list.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    statements: HashMap<String, (String, StatementVerb)>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statement(mut self, name: &str, table: &str, verb: StatementVerb) -> Self {
        self.statements
            .insert(name.to_string(), (table.to_string(), verb));
        self
    }

    /// Register the standard statement set for one entity class:
    /// `<class>.insert`, `.update`, `.delete`, `.deleteAll`, `.purge`,
    /// `.selectById`, `.selectOne`, `.selectList`.
    pub fn with_entity(self, class: &str, table: &str) -> Self {
        self.statement(&format!("{class}.insert"), table, StatementVerb::Insert)
            .statement(&format!("{class}.update"), table, StatementVerb::Update)
            .statement(&format!("{class}.delete"), table, StatementVerb::Delete)
            .statement(&format!("{class}.deleteAll"), table, StatementVerb::DeleteAll)
            .statement(&format!("{class}.purge"), table, StatementVerb::DeleteAll)
            .statement(
                &format!("{class}.selectById"),
                table,
                StatementVerb::SelectById,
            )
            .statement(
                &format!("{class}.selectOne"),
                table,
                StatementVerb::SelectOne,
            )
            .statement(
                &format!("{class}.selectList"),
                table,
                StatementVerb::SelectList,
            )
    }

    pub fn statement_names(&self) -> impl Iterator<Item = &str> {
        self.statements.keys().map(String::as_str)
    }

    fn lookup(&self, statement: &str) -> Result<(&str, StatementVerb)> {
        self.statements
            .get(statement)
            .map(|(table, verb)| (table.as_str(), *verb))
            .ok_or_else(|| PersistenceError::Backend {
                statement: statement.to_string(),
                message: "statement not in catalog".to_string(),
            })
    }
}

type Table = HashMap<EntityId, ParamMap>;
type Store = HashMap<String, Table>;

/// A mutation staged on a connection, applied to the shared store at
/// commit, in execution order.
#[derive(Debug, Clone)]
enum StagedOp {
    Upsert {
        table: String,
        id: EntityId,
        row: ParamMap,
    },
    Merge {
        table: String,
        id: EntityId,
        changes: ParamMap,
    },
    Remove {
        table: String,
        id: EntityId,
    },
    Clear {
        table: String,
    },
}

/// Shared in-memory backend; clones hand out connections over the same
/// store.
#[derive(Clone)]
pub struct InMemoryBackend {
    store: Arc<RwLock<Store>>,
    catalog: Arc<MemoryCatalog>,
}

impl InMemoryBackend {
    pub fn new(catalog: MemoryCatalog) -> Self {
        Self {
            store: Arc::new(RwLock::new(Store::new())),
            catalog: Arc::new(catalog),
        }
    }

    /// Committed row count for a table, for assertions.
    pub async fn committed_rows(&self, table: &str) -> usize {
        self.store
            .read()
            .await
            .get(table)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl ConnectionFactory for InMemoryBackend {
    async fn open_connection(&self) -> Result<Box<dyn StatementConnection>> {
        Ok(Box::new(MemoryConnection {
            store: self.store.clone(),
            catalog: self.catalog.clone(),
            staged: Vec::new(),
            open: true,
        }))
    }
}

pub struct MemoryConnection {
    store: Arc<RwLock<Store>>,
    catalog: Arc<MemoryCatalog>,
    staged: Vec<StagedOp>,
    open: bool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(PersistenceError::SessionClosed)
        }
    }

    fn required_id(statement: &str, params: &ParamMap) -> Result<EntityId> {
        params
            .get("id")
            .and_then(Value::as_entity_id)
            .ok_or_else(|| PersistenceError::Backend {
                statement: statement.to_string(),
                message: "missing or non-numeric 'id' parameter".to_string(),
            })
    }

    /// Committed table contents overlaid with this connection's staged
    /// mutations, in staging order.
    async fn view(&self, table: &str) -> Table {
        let mut view = self
            .store
            .read()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default();
        for op in &self.staged {
            match op {
                StagedOp::Upsert { table: t, id, row } if t == table => {
                    view.insert(*id, row.clone());
                }
                StagedOp::Merge {
                    table: t,
                    id,
                    changes,
                } if t == table => {
                    if let Some(existing) = view.get_mut(id) {
                        for (field, value) in changes {
                            existing.insert(field.clone(), value.clone());
                        }
                    }
                }
                StagedOp::Remove { table: t, id } if t == table => {
                    view.remove(id);
                }
                StagedOp::Clear { table: t } if t == table => {
                    view.clear();
                }
                _ => {}
            }
        }
        view
    }

    fn matches(row: &ParamMap, params: &ParamMap) -> bool {
        params.iter().all(|(key, value)| {
            if is_reserved(key) {
                return true;
            }
            row.get(key) == Some(value)
        })
    }

    async fn select_rows(&self, table: &str, params: &ParamMap) -> Vec<ParamMap> {
        let view = self.view(table).await;
        let mut rows: Vec<(EntityId, ParamMap)> = view
            .into_iter()
            .filter(|(_, row)| Self::matches(row, params))
            .collect();
        rows.sort_by_key(|(id, _)| *id);

        let first = params
            .get(PARAM_FIRST_RESULT)
            .and_then(Value::as_entity_id)
            .unwrap_or(0) as usize;
        let max = params
            .get(PARAM_MAX_RESULTS)
            .and_then(Value::as_entity_id)
            .map(|m| m as usize)
            .unwrap_or(usize::MAX);

        rows.into_iter()
            .map(|(_, row)| row)
            .skip(first)
            .take(max)
            .collect()
    }
}

fn is_reserved(key: &str) -> bool {
    matches!(
        key,
        PARAM_FILTER | PARAM_ORDER_BY | PARAM_FIRST_RESULT | PARAM_MAX_RESULTS
    )
}

fn strip_reserved(params: &ParamMap) -> ParamMap {
    params
        .iter()
        .filter(|(key, _)| !is_reserved(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[async_trait]
impl StatementConnection for MemoryConnection {
    async fn select_one(
        &mut self,
        statement: &str,
        params: &ParamMap,
    ) -> Result<Option<ParamMap>> {
        self.ensure_open()?;
        let (table, verb) = self.catalog.lookup(statement)?;
        let table = table.to_string();
        match verb {
            StatementVerb::SelectById => {
                let id = Self::required_id(statement, params)?;
                Ok(self.view(&table).await.get(&id).cloned())
            }
            StatementVerb::SelectOne | StatementVerb::SelectList => {
                Ok(self.select_rows(&table, params).await.into_iter().next())
            }
            _ => Err(PersistenceError::Backend {
                statement: statement.to_string(),
                message: "not a select statement".to_string(),
            }),
        }
    }

    async fn select_list(&mut self, statement: &str, params: &ParamMap) -> Result<Vec<ParamMap>> {
        self.ensure_open()?;
        let (table, verb) = self.catalog.lookup(statement)?;
        let table = table.to_string();
        match verb {
            StatementVerb::SelectList | StatementVerb::SelectOne => {
                Ok(self.select_rows(&table, params).await)
            }
            _ => Err(PersistenceError::Backend {
                statement: statement.to_string(),
                message: "not a select statement".to_string(),
            }),
        }
    }

    async fn execute(&mut self, statement: &str, params: &ParamMap) -> Result<u64> {
        self.ensure_open()?;
        let (table, verb) = self.catalog.lookup(statement)?;
        let table = table.to_string();
        match verb {
            StatementVerb::Insert => {
                let id = Self::required_id(statement, params)?;
                self.staged.push(StagedOp::Upsert {
                    table,
                    id,
                    row: strip_reserved(params),
                });
                Ok(1)
            }
            StatementVerb::Update => {
                let id = Self::required_id(statement, params)?;
                let mut changes = strip_reserved(params);
                changes.remove("id");
                let affected = u64::from(self.view(&table).await.contains_key(&id));
                self.staged.push(StagedOp::Merge { table, id, changes });
                Ok(affected)
            }
            StatementVerb::Delete => {
                let id = Self::required_id(statement, params)?;
                let affected = u64::from(self.view(&table).await.contains_key(&id));
                self.staged.push(StagedOp::Remove { table, id });
                Ok(affected)
            }
            StatementVerb::DeleteAll => {
                let affected = self.view(&table).await.len() as u64;
                self.staged.push(StagedOp::Clear { table });
                Ok(affected)
            }
            _ => Err(PersistenceError::Backend {
                statement: statement.to_string(),
                message: "not a mutation statement".to_string(),
            }),
        }
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        let staged = std::mem::take(&mut self.staged);
        let mut store = self.store.write().await;
        for op in staged {
            match op {
                StagedOp::Upsert { table, id, row } => {
                    store.entry(table).or_default().insert(id, row);
                }
                StagedOp::Merge { table, id, changes } => {
                    if let Some(row) = store.entry(table).or_default().get_mut(&id) {
                        for (field, value) in changes {
                            row.insert(field, value);
                        }
                    }
                }
                StagedOp::Remove { table, id } => {
                    store.entry(table).or_default().remove(&id);
                }
                StagedOp::Clear { table } => {
                    store.entry(table).or_default().clear();
                }
            }
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.staged.clear();
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // Uncommitted staged work dies with the connection.
        self.staged.clear();
        self.open = false;
        Ok(())
    }
}

/// Durable counter store backing the id allocator in tests and demos.
#[derive(Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<String, u64>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn read(&self, sequence: &str) -> Result<u64> {
        Ok(self
            .counters
            .lock()
            .await
            .get(sequence)
            .copied()
            .unwrap_or(0))
    }

    async fn compare_and_swap(&self, sequence: &str, expected: u64, next: u64) -> Result<bool> {
        let mut counters = self.counters.lock().await;
        let current = counters.get(sequence).copied().unwrap_or(0);
        if current != expected {
            return Ok(false);
        }
        counters.insert(sequence.to_string(), next);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> MemoryCatalog {
        MemoryCatalog::new().with_entity("Widget", "widgets")
    }

    fn row(id: EntityId, name: &str) -> ParamMap {
        let mut params = ParamMap::new();
        params.insert("id".to_string(), Value::from(id));
        params.insert("name".to_string(), Value::from(name));
        params
    }

    #[tokio::test]
    async fn test_staged_writes_invisible_until_commit() {
        let backend = InMemoryBackend::new(catalog());
        let mut writer = backend.open_connection().await.unwrap();
        let mut reader = backend.open_connection().await.unwrap();

        writer.execute("Widget.insert", &row(1, "a")).await.unwrap();

        // the writer sees its own staged row, the reader does not
        let mut by_id = ParamMap::new();
        by_id.insert("id".to_string(), Value::from(1_u64 as EntityId));
        assert!(
            writer
                .select_one("Widget.selectById", &by_id)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            reader
                .select_one("Widget.selectById", &by_id)
                .await
                .unwrap()
                .is_none()
        );

        writer.commit().await.unwrap();
        assert!(
            reader
                .select_one("Widget.selectById", &by_id)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_rollback_discards_staged_writes() {
        let backend = InMemoryBackend::new(catalog());
        let mut conn = backend.open_connection().await.unwrap();

        conn.execute("Widget.insert", &row(1, "a")).await.unwrap();
        conn.rollback().await.unwrap();
        conn.commit().await.unwrap();

        assert_eq!(backend.committed_rows("widgets").await, 0);
    }

    #[tokio::test]
    async fn test_operations_after_close_are_rejected() {
        let backend = InMemoryBackend::new(catalog());
        let mut conn = backend.open_connection().await.unwrap();
        conn.close().await.unwrap();
        assert!(matches!(
            conn.execute("Widget.insert", &row(1, "a")).await,
            Err(PersistenceError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_select_list_matches_params_and_pages() {
        let backend = InMemoryBackend::new(catalog());
        let mut conn = backend.open_connection().await.unwrap();
        for i in 1..=5 {
            let mut r = row(i, if i % 2 == 0 { "even" } else { "odd" });
            r.insert("bucket".to_string(), Value::from("b"));
            conn.execute("Widget.insert", &r).await.unwrap();
        }
        conn.commit().await.unwrap();

        let mut params = ParamMap::new();
        params.insert("name".to_string(), Value::from("odd"));
        let rows = conn.select_list("Widget.selectList", &params).await.unwrap();
        assert_eq!(rows.len(), 3);

        params.insert(
            PARAM_FIRST_RESULT.to_string(),
            Value::from(1_u64 as EntityId),
        );
        params.insert(
            PARAM_MAX_RESULTS.to_string(),
            Value::from(1_u64 as EntityId),
        );
        let page = conn.select_list("Widget.selectList", &params).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].get("id"), Some(&Value::from(3_u64 as EntityId)));
    }

    #[tokio::test]
    async fn test_counter_store_cas() {
        let store = MemoryCounterStore::new();
        assert!(store.compare_and_swap("s", 0, 10).await.unwrap());
        assert!(!store.compare_and_swap("s", 0, 20).await.unwrap());
        assert_eq!(store.read("s").await.unwrap(), 10);
    }
}
