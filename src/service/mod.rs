// ============================================================================
// Persistence Service Façade
// ============================================================================
//
// Public CRUD and query surface used by the process-execution engine and
// the identity/organization subsystems. Every call takes an explicit
// TransactionContext handle; there is no ambient thread-local "current
// transaction".
//
// One context (Session + TechnicalTransaction) exists per logical unit of
// work and must not be shared across units of work. Calls may block on
// backend I/O; keep them off latency-sensitive paths.
//
// ============================================================================

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::ConnectionFactory;
use crate::config::MappingConfig;
use crate::core::{EntityId, PersistenceError, Result};
use crate::entity::{EntityRef, EntityRegistry, PersistentObject, UpdateDescriptor};
use crate::idgen::IdAllocator;
use crate::session::{SelectDescriptor, Session};
use crate::statement::StatementResolver;
use crate::transaction::{EnlistedResource, TechnicalTransaction, TransactionResourceState};

pub struct PersistenceService {
    config: Arc<MappingConfig>,
    registry: Arc<EntityRegistry>,
    factory: Arc<dyn ConnectionFactory>,
    allocator: Arc<IdAllocator>,
    db_identifier: String,
    caching_enabled: bool,
}

impl PersistenceService {
    pub fn new(
        config: Arc<MappingConfig>,
        registry: Arc<EntityRegistry>,
        factory: Arc<dyn ConnectionFactory>,
        allocator: Arc<IdAllocator>,
        db_identifier: impl Into<String>,
    ) -> Self {
        Self {
            config,
            registry,
            factory,
            allocator,
            db_identifier: db_identifier.into(),
            caching_enabled: true,
        }
    }

    /// Disable the identity cache and the write-behind buffer; every
    /// mutation then executes immediately against the connection.
    pub fn caching(mut self, enabled: bool) -> Self {
        self.caching_enabled = enabled;
        self
    }

    /// Open a new unit of work: one connection, one session, one technical
    /// transaction.
    pub async fn begin(&self) -> Result<TransactionContext> {
        let connection = self.factory.open_connection().await?;
        let resolver = StatementResolver::new(self.config.clone(), self.db_identifier.clone());
        let session = Session::new(
            connection,
            resolver,
            self.config.clone(),
            self.registry.clone(),
            self.caching_enabled,
        );
        let txn = TechnicalTransaction::new(session);
        debug!(txn = txn.id(), "transaction started");
        Ok(TransactionContext {
            txn: Mutex::new(txn),
        })
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Insert an entity, assigning its identity from the allocator first if
    /// it has none.
    pub async fn insert(
        &self,
        ctx: &TransactionContext,
        entity: Box<dyn PersistentObject>,
    ) -> Result<EntityRef> {
        let mut entity = entity;
        if entity.id().is_none() {
            let id = self
                .allocator
                .next_id(entity.entity_type(), entity.tenant_id())
                .await?;
            entity.assign_id(id)?;
        }
        let mut txn = ctx.txn.lock().await;
        Self::ensure_active(&txn)?;
        txn.session_mut().insert(entity).await
    }

    pub async fn insert_batch(
        &self,
        ctx: &TransactionContext,
        entities: Vec<Box<dyn PersistentObject>>,
    ) -> Result<Vec<EntityRef>> {
        let mut handles = Vec::with_capacity(entities.len());
        for entity in entities {
            handles.push(self.insert(ctx, entity).await?);
        }
        Ok(handles)
    }

    pub async fn update(
        &self,
        ctx: &TransactionContext,
        descriptor: &UpdateDescriptor,
    ) -> Result<EntityRef> {
        let mut txn = ctx.txn.lock().await;
        Self::ensure_active(&txn)?;
        txn.session_mut().update(descriptor).await
    }

    pub async fn delete(&self, ctx: &TransactionContext, entity: &EntityRef) -> Result<()> {
        let (entity_type, id) = {
            let entity = entity.read().await;
            let id = entity.id().ok_or_else(|| {
                PersistenceError::MissingIdentity(entity.entity_type().to_string())
            })?;
            (entity.entity_type(), id)
        };
        self.delete_by_id(ctx, entity_type, id).await
    }

    pub async fn delete_by_id(
        &self,
        ctx: &TransactionContext,
        entity_type: &str,
        id: EntityId,
    ) -> Result<()> {
        let entity_type = self.config.canonical_type(entity_type);
        let mut txn = ctx.txn.lock().await;
        Self::ensure_active(&txn)?;
        txn.session_mut().delete(entity_type, id).await
    }

    /// Delete several ids of one type; buffered in the given order.
    pub async fn delete_many(
        &self,
        ctx: &TransactionContext,
        entity_type: &str,
        ids: &[EntityId],
    ) -> Result<()> {
        for id in ids {
            self.delete_by_id(ctx, entity_type, *id).await?;
        }
        Ok(())
    }

    pub async fn delete_all(&self, ctx: &TransactionContext, entity_type: &str) -> Result<()> {
        let entity_type = self.config.canonical_type(entity_type);
        let mut txn = ctx.txn.lock().await;
        Self::ensure_active(&txn)?;
        txn.session_mut().delete_all(entity_type).await
    }

    /// Maintenance purge: executes immediately, bypassing the buffer.
    pub async fn purge(&self, ctx: &TransactionContext, entity_type: &str) -> Result<u64> {
        let entity_type = self.config.canonical_type(entity_type);
        let mut txn = ctx.txn.lock().await;
        Self::ensure_active(&txn)?;
        txn.session_mut().purge(entity_type).await
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn select_by_id(
        &self,
        ctx: &TransactionContext,
        entity_type: &str,
        id: EntityId,
    ) -> Result<Option<EntityRef>> {
        let entity_type = self.config.canonical_type(entity_type);
        let mut txn = ctx.txn.lock().await;
        Self::ensure_active(&txn)?;
        txn.session_mut().select_by_id(entity_type, id).await
    }

    pub async fn select_one(
        &self,
        ctx: &TransactionContext,
        descriptor: &SelectDescriptor,
    ) -> Result<Option<EntityRef>> {
        let descriptor = self.canonicalize(descriptor);
        let mut txn = ctx.txn.lock().await;
        Self::ensure_active(&txn)?;
        txn.session_mut().select_one(&descriptor).await
    }

    pub async fn select_list(
        &self,
        ctx: &TransactionContext,
        descriptor: &SelectDescriptor,
    ) -> Result<Vec<EntityRef>> {
        let descriptor = self.canonicalize(descriptor);
        let mut txn = ctx.txn.lock().await;
        Self::ensure_active(&txn)?;
        txn.session_mut().select_list(&descriptor).await
    }

    fn canonicalize(&self, descriptor: &SelectDescriptor) -> SelectDescriptor {
        let mut descriptor = descriptor.clone();
        descriptor.entity_type = self
            .config
            .canonical_type(&descriptor.entity_type)
            .to_string();
        descriptor
    }

    fn ensure_active(txn: &TechnicalTransaction) -> Result<()> {
        if txn.state().is_terminal() {
            return Err(PersistenceError::TransactionNotActive {
                id: txn.id(),
                state: txn.state().to_string(),
            });
        }
        Ok(())
    }
}

/// Explicit handle for one unit of work. Passed into every façade call;
/// never share one across units of work.
pub struct TransactionContext {
    txn: Mutex<TechnicalTransaction>,
}

impl TransactionContext {
    pub async fn id(&self) -> u64 {
        self.txn.lock().await.id()
    }

    pub async fn state(&self) -> TransactionResourceState {
        self.txn.lock().await.state()
    }

    pub async fn pending_writes(&self) -> usize {
        self.txn.lock().await.session_mut().pending_writes()
    }

    pub async fn enlist(&self, resource: Arc<dyn EnlistedResource>) -> Result<()> {
        self.txn.lock().await.enlist(resource)
    }

    /// Flush the write-behind buffer. Run once, before `commit`.
    pub async fn prepare(&self) -> Result<()> {
        self.txn.lock().await.prepare().await
    }

    pub async fn commit(&self) -> Result<()> {
        self.txn.lock().await.commit().await
    }

    pub async fn rollback(&self) -> Result<()> {
        self.txn.lock().await.rollback().await
    }
}
