// ============================================================================
// Technical Transaction
// ============================================================================
//
// The persistence layer's participant object, enlisted with the external
// transaction coordinator. Wraps one Session and drives flush-then-commit
// or discard-then-rollback.
//
// State machine:
// ```text
// CREATED ──commit────> COMMITTED
//    │
//    └────rollback────> ROLLEDBACK
// ```
// Both terminal states are absorbing; a terminal transaction rejects any
// further commit/rollback and never re-executes the flush.
//
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::core::{PersistenceError, Result};
use crate::session::Session;

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionResourceState {
    Created,
    Committed,
    RolledBack,
}

impl TransactionResourceState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionResourceState::Committed | TransactionResourceState::RolledBack
        )
    }
}

impl fmt::Display for TransactionResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionResourceState::Created => write!(f, "CREATED"),
            TransactionResourceState::Committed => write!(f, "COMMITTED"),
            TransactionResourceState::RolledBack => write!(f, "ROLLEDBACK"),
        }
    }
}

/// A synchronization resource piggybacked on this transaction's
/// commit/rollback boundary by a caller. Held read-only for the
/// coordinator; this layer never invokes it.
pub trait EnlistedResource: Send + Sync {
    fn name(&self) -> &str;
}

pub struct TechnicalTransaction {
    id: u64,
    state: TransactionResourceState,
    session: Session,
    resources: Vec<Arc<dyn EnlistedResource>>,
}

impl TechnicalTransaction {
    pub fn new(session: Session) -> Self {
        Self {
            id: NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst),
            state: TransactionResourceState::Created,
            session,
            resources: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> TransactionResourceState {
        self.state
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Resources enlisted so far, read-only.
    pub fn resources(&self) -> &[Arc<dyn EnlistedResource>] {
        &self.resources
    }

    pub fn enlist(&mut self, resource: Arc<dyn EnlistedResource>) -> Result<()> {
        if self.state.is_terminal() {
            return Err(PersistenceError::EnlistFailed(format!(
                "transaction {} is already {}",
                self.id, self.state
            )));
        }
        self.resources.push(resource);
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(PersistenceError::TransactionNotActive {
                id: self.id,
                state: self.state.to_string(),
            });
        }
        Ok(())
    }

    /// Flush the session's buffered writes. Failure is surfaced as a
    /// distinct prepare error so the coordinator can still roll back other
    /// enlisted resources.
    pub async fn prepare(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.session.prepare().await.map_err(|err| match err {
            prepared @ PersistenceError::PrepareFailed { .. } => prepared,
            other => PersistenceError::PrepareFailed {
                statement: "<session>".to_string(),
                message: other.to_string(),
            },
        })
    }

    /// Mark COMMITTED speculatively, then commit the session; a failing
    /// commit corrects the state to ROLLEDBACK. The session is closed on
    /// every path.
    pub async fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.state = TransactionResourceState::Committed;

        let committed = self.session.commit().await;
        if committed.is_err() {
            self.state = TransactionResourceState::RolledBack;
        }
        let closed = self.session.close().await;

        debug!(txn = self.id, state = %self.state, "transaction finished");
        committed.map_err(|err| match err {
            failed @ PersistenceError::CommitFailed(_) => failed,
            other => PersistenceError::CommitFailed(other.to_string()),
        })?;
        closed
    }

    /// Mark ROLLEDBACK, discard the buffer, and close the session.
    pub async fn rollback(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.state = TransactionResourceState::RolledBack;

        let rolled_back = self.session.rollback().await;
        let closed = self.session.close().await;

        debug!(txn = self.id, "transaction rolled back");
        rolled_back?;
        closed
    }
}

impl Drop for TechnicalTransaction {
    fn drop(&mut self) {
        // Buffered writes were never executed, and the connection discards
        // its uncommitted work when dropped; nothing leaks, but the caller
        // skipped an explicit commit/rollback.
        if !self.state.is_terminal() {
            warn!(
                txn = self.id,
                "transaction dropped while still CREATED; pending work discarded"
            );
        }
    }
}
