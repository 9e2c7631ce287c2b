// ============================================================================
// Statement Backend
// ============================================================================
//
// Outbound seam toward the statement-execution backend: every physical
// operation is a named, pre-authored statement invoked with a parameter
// map. Stands in for the SQL driver/mapper; the in-memory implementation
// in `memory` backs the tests and demos.
//
// ============================================================================

pub mod memory;

use async_trait::async_trait;

use crate::core::{ParamMap, Result};

/// Reserved parameter names carrying compiled fragments and paging windows
/// into a statement. A backend substitutes them into its statement text;
/// they are never entity fields.
pub const PARAM_FILTER: &str = "__filter";
pub const PARAM_ORDER_BY: &str = "__orderBy";
pub const PARAM_FIRST_RESULT: &str = "__firstResult";
pub const PARAM_MAX_RESULTS: &str = "__maxResults";

/// One connection-equivalent, owned by a single session for the lifetime of
/// its transaction. Mutations become visible to other connections only
/// after `commit`.
#[async_trait]
pub trait StatementConnection: Send + Sync {
    async fn select_one(&mut self, statement: &str, params: &ParamMap)
    -> Result<Option<ParamMap>>;

    async fn select_list(&mut self, statement: &str, params: &ParamMap) -> Result<Vec<ParamMap>>;

    /// Execute a mutation statement; returns the affected row count.
    async fn execute(&mut self, statement: &str, params: &ParamMap) -> Result<u64>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// Hands out connections, one per unit of work.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn open_connection(&self) -> Result<Box<dyn StatementConnection>>;
}
