pub mod error;
pub mod value;

pub use error::{PersistenceError, Result};
pub use value::{ParamMap, Value};

/// Identifier assigned to a persistent entity, unique within its concrete
/// type (and tenant, for tenant-scoped entities). Assigned exactly once,
/// before the first physical insert.
pub type EntityId = u64;
