//! Protostar Pool - the warm-pool IPAM state machine
//!
//! A node holds a warm reserve of assignable IPv4 addresses carved from
//! provider-allocated CIDR prefixes. Addresses move through five buckets:
//! warm (ready to hand out), used (assigned to a workload), cooling (recently
//! freed, quarantined against reuse), plus two in-flight counters for
//! asynchronous create and delete jobs.
//!
//! The pool itself is a passive shared object: callers on arbitrary threads
//! assign and free addresses, a periodic ticker drains the cooldown queue and
//! reconciles the warm size against its target, and an asynchronous worker
//! feeds job outcomes back in. All mutation happens under one reader-writer
//! lock, and jobs are constructed under the lock but dispatched by the caller
//! after it is released.

pub mod error;
pub mod job;
pub mod pool;
pub mod types;

// Re-export primary types
pub use error::PoolError;
pub use job::{JobKind, JobOutcome, PoolJob};
pub use pool::WarmPool;
pub use types::{CooldownRecord, PoolSeed, PoolSnapshot, PoolStats};
