use protostar_core::AddressRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

/// A freed address waiting out its cooldown before re-entering the warm pool
#[derive(Debug, Clone)]
pub struct CooldownRecord {
    /// The quarantined address
    pub record: AddressRecord,
    /// When the owning workload released it
    pub freed_at: Instant,
}

/// Initial pool contents injected at construction.
///
/// Pool state is not persisted across restarts; the node agent reconstructs
/// it from node-local state (or an empty seed followed by a resync round).
#[derive(Debug, Clone, Default)]
pub struct PoolSeed {
    pub used: HashMap<String, AddressRecord>,
    pub warm: Vec<AddressRecord>,
    pub allocated_prefixes: Vec<String>,
    pub prefix_usage: HashMap<String, usize>,
}

/// Deep-copied view of the pool buckets, taken under the shared lock.
///
/// Callers serialize this without holding any pool lock.
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub used: HashMap<String, AddressRecord>,
    pub warm: Vec<AddressRecord>,
    pub cooling: Vec<CooldownRecord>,
}

/// Bucket sizes and flags, for logs and the diagnostic endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub warm: usize,
    pub used: usize,
    pub cooling: usize,
    pub pending_create: usize,
    pub pending_delete: usize,
    pub resync_required: bool,
}
