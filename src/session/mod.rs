// ============================================================================
// Session
// ============================================================================
//
// One Session per technical transaction. Owns the connection-equivalent for
// the transaction's lifetime and is the only path to the identity cache and
// the deferred write buffer.
//
// Caching enabled (the default):
// - selectById probes the cache first and skips the physical read on a hit.
// - selectOne/selectList always execute the read, then reconcile every row
//   against the cache; a cached instance wins over a freshly hydrated one,
//   so later reads never fork identity.
// - insert/update/delete append a WriteStatement instead of executing;
//   insert/update also place the entity into the cache immediately, so a
//   same-transaction read observes the not-yet-flushed write.
// - prepare() replays the buffer in append order. FIFO is load-bearing: a
//   delete appended after an update to the same row executes after it.
//
// Documented limitation, preserved on purpose: reads are not re-executed
// against buffered writes. A query that would only find a new row via a
// non-id predicate, or that should exclude a just-deleted row, does not see
// the pending write until the buffer is flushed.
//
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::backend::{
    PARAM_FILTER, PARAM_FIRST_RESULT, PARAM_MAX_RESULTS, PARAM_ORDER_BY, StatementConnection,
};
use crate::config::MappingConfig;
use crate::core::{EntityId, ParamMap, PersistenceError, Result, Value};
use crate::entity::{EntityRef, EntityRegistry, PersistentObject, UpdateDescriptor, entity_ref};
use crate::filter::{FilterCompiler, FilterOption, OrderByOption, SearchFields};
use crate::statement::{
    OP_DELETE, OP_DELETE_ALL, OP_INSERT, OP_PURGE, OP_SELECT_BY_ID, OP_SELECT_LIST, OP_SELECT_ONE,
    OP_UPDATE, StatementResolver,
};

/// Query descriptor for `select_one`/`select_list`: target type, named
/// input parameters, optional filter/search/sort, and the paging window.
#[derive(Debug, Clone, Default)]
pub struct SelectDescriptor {
    pub entity_type: String,
    pub params: ParamMap,
    pub filters: Vec<FilterOption>,
    pub search: Option<SearchFields>,
    pub order_by: Vec<OrderByOption>,
    pub first_result: Option<usize>,
    pub max_results: Option<usize>,
}

impl SelectDescriptor {
    pub fn new(entity_type: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            ..Self::default()
        }
    }

    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    pub fn filter(mut self, option: FilterOption) -> Self {
        self.filters.push(option);
        self
    }

    pub fn search(mut self, search: SearchFields) -> Self {
        self.search = Some(search);
        self
    }

    pub fn order(mut self, option: OrderByOption) -> Self {
        self.order_by.push(option);
        self
    }

    pub fn page(mut self, first_result: usize, max_results: usize) -> Self {
        self.first_result = Some(first_result);
        self.max_results = Some(max_results);
        self
    }
}

/// Kind of deferred mutation, in the vocabulary of the statement verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Update,
    Delete,
}

/// An immutable unit of deferred work. Created when a mutation is
/// requested, consumed exactly once at flush time, in append order.
pub struct WriteStatement {
    pub kind: WriteKind,
    pub statement: String,
    pub params: ParamMap,
    /// Entity the write originated from, for consumers inspecting or
    /// replaying the buffer; deletes carry no handle.
    pub entity: Option<EntityRef>,
}

/// Per-session map from `(type, id)` to the canonical in-memory instance.
/// Never evicted before the session closes.
#[derive(Default)]
struct IdentityCache {
    entries: HashMap<(String, EntityId), EntityRef>,
}

impl IdentityCache {
    fn get(&self, entity_type: &str, id: EntityId) -> Option<EntityRef> {
        self.entries
            .get(&(entity_type.to_string(), id))
            .cloned()
    }

    fn put(&mut self, entity_type: &str, id: EntityId, entity: EntityRef) {
        self.entries.insert((entity_type.to_string(), id), entity);
    }
}

pub struct Session {
    connection: Option<Box<dyn StatementConnection>>,
    resolver: StatementResolver,
    config: Arc<MappingConfig>,
    registry: Arc<EntityRegistry>,
    cache: IdentityCache,
    pending: Vec<WriteStatement>,
    caching_enabled: bool,
}

impl Session {
    pub fn new(
        connection: Box<dyn StatementConnection>,
        resolver: StatementResolver,
        config: Arc<MappingConfig>,
        registry: Arc<EntityRegistry>,
        caching_enabled: bool,
    ) -> Self {
        Self {
            connection: Some(connection),
            resolver,
            config,
            registry,
            cache: IdentityCache::default(),
            pending: Vec::new(),
            caching_enabled,
        }
    }

    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    fn connection(&mut self) -> Result<&mut Box<dyn StatementConnection>> {
        self.connection.as_mut().ok_or(PersistenceError::SessionClosed)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn select_by_id(
        &mut self,
        entity_type: &str,
        id: EntityId,
    ) -> Result<Option<EntityRef>> {
        if self.caching_enabled {
            if let Some(cached) = self.cache.get(entity_type, id) {
                trace!(entity_type, id, "identity cache hit, skipping read");
                return Ok(Some(cached));
            }
        }

        let statement = self.resolver.resolve(entity_type, OP_SELECT_BY_ID)?;
        let mut params = ParamMap::new();
        params.insert("id".to_string(), Value::from(id));

        let row = self.connection()?.select_one(&statement, &params).await?;
        match row {
            None => Ok(None),
            Some(row) => {
                let entity = self.registry.hydrate(entity_type, &row)?;
                Ok(Some(self.reconcile(entity_type, entity)?))
            }
        }
    }

    pub async fn select_one(&mut self, descriptor: &SelectDescriptor) -> Result<Option<EntityRef>> {
        let entity_type = descriptor.entity_type.clone();
        let statement = self.resolver.resolve(&entity_type, OP_SELECT_ONE)?;
        let params = self.query_params(descriptor)?;

        let row = self.connection()?.select_one(&statement, &params).await?;
        match row {
            None => Ok(None),
            Some(row) => {
                let entity = self.registry.hydrate(&entity_type, &row)?;
                Ok(Some(self.reconcile(&entity_type, entity)?))
            }
        }
    }

    pub async fn select_list(&mut self, descriptor: &SelectDescriptor) -> Result<Vec<EntityRef>> {
        let entity_type = descriptor.entity_type.clone();
        let statement = self.resolver.resolve(&entity_type, OP_SELECT_LIST)?;
        let params = self.query_params(descriptor)?;

        let rows = self.connection()?.select_list(&statement, &params).await?;
        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            let entity = self.registry.hydrate(&entity_type, &row)?;
            entities.push(self.reconcile(&entity_type, entity)?);
        }
        Ok(entities)
    }

    fn query_params(&self, descriptor: &SelectDescriptor) -> Result<ParamMap> {
        let compiler = FilterCompiler::new(&self.config);
        let fragment =
            compiler.compile_fragment(&descriptor.filters, descriptor.search.as_ref())?;
        let order_by = compiler.compile_order_by(&descriptor.order_by);

        let mut params = descriptor.params.clone();
        if !fragment.is_empty() {
            params.insert(PARAM_FILTER.to_string(), Value::from(fragment));
        }
        if !order_by.is_empty() {
            params.insert(PARAM_ORDER_BY.to_string(), Value::from(order_by));
        }
        if let Some(first) = descriptor.first_result {
            params.insert(PARAM_FIRST_RESULT.to_string(), Value::from(first as i64));
        }
        if let Some(max) = descriptor.max_results {
            params.insert(PARAM_MAX_RESULTS.to_string(), Value::from(max as i64));
        }
        Ok(params)
    }

    /// Hand back the canonical instance for the hydrated entity: the cached
    /// one if present, otherwise the fresh one (cached from now on).
    fn reconcile(
        &mut self,
        entity_type: &str,
        entity: Box<dyn PersistentObject>,
    ) -> Result<EntityRef> {
        let id = entity
            .id()
            .ok_or_else(|| PersistenceError::MissingIdentity(entity_type.to_string()))?;

        if !self.caching_enabled {
            return Ok(entity_ref(entity));
        }
        if let Some(cached) = self.cache.get(entity_type, id) {
            return Ok(cached);
        }
        let fresh = entity_ref(entity);
        self.cache.put(entity_type, id, fresh.clone());
        Ok(fresh)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    pub async fn insert(&mut self, entity: Box<dyn PersistentObject>) -> Result<EntityRef> {
        let entity_type = entity.entity_type();
        let id = entity
            .id()
            .ok_or_else(|| PersistenceError::MissingIdentity(entity_type.to_string()))?;
        let statement = self.resolver.resolve(entity_type, OP_INSERT)?;
        let params = entity.insert_params();
        let handle = entity_ref(entity);

        if !self.caching_enabled {
            self.connection()?.execute(&statement, &params).await?;
            return Ok(handle);
        }

        self.cache.put(entity_type, id, handle.clone());
        self.pending.push(WriteStatement {
            kind: WriteKind::Insert,
            statement,
            params,
            entity: Some(handle.clone()),
        });
        Ok(handle)
    }

    pub async fn update(&mut self, descriptor: &UpdateDescriptor) -> Result<EntityRef> {
        let handle = descriptor.entity.clone();
        let (entity_type, id, statement, params) = {
            let mut entity = handle.write().await;
            let entity_type = entity.entity_type();
            let id = entity
                .id()
                .ok_or_else(|| PersistenceError::MissingIdentity(entity_type.to_string()))?;

            for (field, value) in &descriptor.changes {
                entity.apply_update(field, value)?;
            }

            let statement = self.resolver.resolve(entity_type, OP_UPDATE)?;
            let mut params = ParamMap::new();
            params.insert("id".to_string(), Value::from(id));
            for (field, value) in &descriptor.changes {
                params.insert(field.clone(), value.clone());
            }
            (entity_type, id, statement, params)
        };

        if !self.caching_enabled {
            self.connection()?.execute(&statement, &params).await?;
            return Ok(handle);
        }

        if self.cache.get(entity_type, id).is_none() {
            self.cache.put(entity_type, id, handle.clone());
        }
        self.pending.push(WriteStatement {
            kind: WriteKind::Update,
            statement,
            params,
            entity: Some(handle.clone()),
        });
        Ok(handle)
    }

    pub async fn delete(&mut self, entity_type: &str, id: EntityId) -> Result<()> {
        let statement = self.resolver.resolve(entity_type, OP_DELETE)?;
        let mut params = ParamMap::new();
        params.insert("id".to_string(), Value::from(id));
        self.enqueue_or_execute(WriteKind::Delete, statement, params)
            .await
    }

    pub async fn delete_all(&mut self, entity_type: &str) -> Result<()> {
        let statement = self.resolver.resolve(entity_type, OP_DELETE_ALL)?;
        self.enqueue_or_execute(WriteKind::Delete, statement, ParamMap::new())
            .await
    }

    /// Maintenance path: executes immediately against the connection,
    /// bypassing the write-behind buffer and the cache.
    pub async fn purge(&mut self, entity_type: &str) -> Result<u64> {
        let statement = self.resolver.resolve(entity_type, OP_PURGE)?;
        self.connection()?.execute(&statement, &ParamMap::new()).await
    }

    async fn enqueue_or_execute(
        &mut self,
        kind: WriteKind,
        statement: String,
        params: ParamMap,
    ) -> Result<()> {
        if !self.caching_enabled {
            self.connection()?.execute(&statement, &params).await?;
            return Ok(());
        }
        self.pending.push(WriteStatement {
            kind,
            statement,
            params,
            entity: None,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Replay the buffered WriteStatements, in append order, against the
    /// physical connection. A statement leaves the buffer only after it
    /// executed, so a mid-flush failure keeps it and everything behind it
    /// buffered; the non-empty buffer then blocks `commit`, and only
    /// `rollback` can end the transaction.
    pub async fn prepare(&mut self) -> Result<()> {
        debug!(count = self.pending.len(), "flushing write-behind buffer");
        while !self.pending.is_empty() {
            let write = &self.pending[0];
            trace!(kind = ?write.kind, statement = %write.statement, "executing buffered write");
            let connection = self
                .connection
                .as_mut()
                .ok_or(PersistenceError::SessionClosed)?;
            connection
                .execute(&write.statement, &write.params)
                .await
                .map_err(|err| PersistenceError::PrepareFailed {
                    statement: write.statement.clone(),
                    message: err.to_string(),
                })?;
            self.pending.remove(0);
        }
        Ok(())
    }

    /// Finalize the physical transaction. `prepare()` must have run first;
    /// anything still buffered at this point would be lost, so it is a
    /// commit failure.
    pub async fn commit(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            return Err(PersistenceError::CommitFailed(format!(
                "{} buffered writes not prepared",
                self.pending.len()
            )));
        }
        self.connection()?.commit().await
    }

    /// Discard the buffer without executing it and roll the physical
    /// transaction back.
    pub async fn rollback(&mut self) -> Result<()> {
        let discarded = self.pending.len();
        self.pending.clear();
        if discarded > 0 {
            debug!(discarded, "discarded write-behind buffer on rollback");
        }
        self.connection()?.rollback().await
    }

    /// Release the connection-equivalent exactly once, regardless of which
    /// path was taken. Further calls are no-ops.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut connection) = self.connection.take() {
            connection.close().await?;
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_none()
    }
}
