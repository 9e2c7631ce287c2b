//! Everything an engine-side caller needs to drive the persistence layer.
//!
//! Backend implementors additionally pull the seam traits from
//! [`crate::backend`] and [`crate::idgen`].

pub use crate::backend::{ConnectionFactory, StatementConnection};
pub use crate::config::{MappingConfig, MappingSource};
pub use crate::core::{EntityId, ParamMap, PersistenceError, Result, Value};
pub use crate::entity::{
    EntityRef, EntityRegistry, PersistentObject, UpdateDescriptor, entity_ref,
};
pub use crate::filter::{FilterOption, OrderByOption, SearchFields, SortDirection};
pub use crate::idgen::{AllocatorConfig, CounterStore, IdAllocator};
pub use crate::service::{PersistenceService, TransactionContext};
pub use crate::session::SelectDescriptor;
pub use crate::transaction::{EnlistedResource, TransactionResourceState};
