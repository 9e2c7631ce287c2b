// ============================================================================
// Identifier Allocation
// ============================================================================
//
// Issues unique, tenant-scoped 64-bit identifiers from pre-reserved ranges
// backed by a durable counter row. Reserving a range is one read-modify-
// write against the counter; a lost race (another node reserved first) is
// retried with a freshly read value, never surfaced and never allowed to
// hand out a duplicate.
//
// ============================================================================

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::core::{EntityId, Result};

/// Durable counter store behind the allocator.
///
/// The stored value is the floor of the next unreserved range; `0` means
/// the sequence does not exist yet.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current stored value for the sequence, `0` if absent.
    async fn read(&self, sequence: &str) -> Result<u64>;

    /// Atomically replace `expected` with `next`. Returns `false` when the
    /// stored value no longer matches `expected` (lost race).
    async fn compare_and_swap(&self, sequence: &str, expected: u64, next: u64) -> Result<bool>;
}

/// Range sizes: one global default plus per-tenant overrides.
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    pub default_range_size: u64,
    pub tenant_range_sizes: HashMap<String, u64>,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            default_range_size: 100,
            tenant_range_sizes: HashMap::new(),
        }
    }
}

impl AllocatorConfig {
    pub fn range_size_for(&self, tenant_id: Option<&str>) -> u64 {
        tenant_id
            .and_then(|t| self.tenant_range_sizes.get(t).copied())
            .unwrap_or(self.default_range_size)
            .max(1)
    }
}

/// In-memory slice of a reserved range: `[next, ceiling)`.
#[derive(Debug, Clone, Copy)]
struct IdRange {
    next: u64,
    ceiling: u64,
}

/// Issues ids for `(tenant, entity type)` sequences.
///
/// Served from the in-memory range without a store round-trip until the
/// range is exhausted; ids start at 1.
pub struct IdAllocator {
    store: std::sync::Arc<dyn CounterStore>,
    config: AllocatorConfig,
    ranges: Mutex<HashMap<String, IdRange>>,
}

impl IdAllocator {
    pub fn new(store: std::sync::Arc<dyn CounterStore>, config: AllocatorConfig) -> Self {
        Self {
            store,
            config,
            ranges: Mutex::new(HashMap::new()),
        }
    }

    /// Next unique id for the sequence. Never returns a value already
    /// issued by this or any other allocator sharing the store.
    pub async fn next_id(&self, entity_type: &str, tenant_id: Option<&str>) -> Result<EntityId> {
        let sequence = sequence_key(entity_type, tenant_id);
        let mut ranges = self.ranges.lock().await;

        if let Some(range) = ranges.get_mut(&sequence) {
            if range.next < range.ceiling {
                let id = range.next;
                range.next += 1;
                return Ok(id);
            }
        }

        let range_size = self.config.range_size_for(tenant_id);
        loop {
            let current = self.store.read(&sequence).await?;
            let floor = if current == 0 { 1 } else { current };
            let ceiling = floor + range_size;
            if self
                .store
                .compare_and_swap(&sequence, current, ceiling)
                .await?
            {
                debug!(%sequence, floor, ceiling, "reserved id range");
                ranges.insert(
                    sequence,
                    IdRange {
                        next: floor + 1,
                        ceiling,
                    },
                );
                return Ok(floor);
            }
            trace!(%sequence, "id range reservation lost a race, retrying");
        }
    }
}

fn sequence_key(entity_type: &str, tenant_id: Option<&str>) -> String {
    match tenant_id {
        Some(tenant) => format!("{tenant}:{entity_type}"),
        None => entity_type.to_string(),
    }
}
