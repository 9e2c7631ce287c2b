// ============================================================================
// Flowstore Library
// ============================================================================
//
// Persistence adapter for a multi-tenant process-execution engine: typed
// entities mapped to named backend statements, per-transaction identity
// caching with write-behind flushing, dynamic filter/sort compilation into
// SQL fragments, and tenant-scoped monotonically increasing identifiers.
//
// ============================================================================

pub mod backend;
pub mod config;
pub mod core;
pub mod entity;
pub mod filter;
pub mod idgen;
pub mod service;
pub mod session;
pub mod statement;
pub mod transaction;

pub mod prelude;

// Re-export main types for convenience
pub use crate::core::{EntityId, ParamMap, PersistenceError, Result, Value};
pub use entity::{EntityRef, EntityRegistry, PersistentObject, UpdateDescriptor};
pub use service::{PersistenceService, TransactionContext};
pub use session::SelectDescriptor;
