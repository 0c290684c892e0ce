use crate::error::PoolError;
use crate::job::{JobKind, JobOutcome, PoolJob};
use crate::types::{CooldownRecord, PoolSeed, PoolSnapshot, PoolStats};
use protostar_core::{difference, expand_prefix, AddressRecord, CoreError, WarmPoolConfig};
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::Ipv4Addr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::{debug, error, info};

/// The per-node warm address pool.
///
/// Addresses live in exactly one of three buckets (warm, used, cooling) or
/// are accounted for by the two pending counters while a provider job is in
/// flight. Every mutating operation takes the exclusive lock; read-only
/// snapshots take the shared lock. No operation holds the lock across I/O:
/// jobs are built under the lock and returned to the caller for dispatch,
/// and log events are emitted after the guard is dropped.
pub struct WarmPool {
    node_id: String,
    capacity: usize,
    config: WarmPoolConfig,
    state: RwLock<PoolState>,
}

#[derive(Debug)]
struct PoolState {
    /// Addresses ready to hand out, oldest first
    warm: VecDeque<AddressRecord>,
    /// Requester id -> assigned address
    used: HashMap<String, AddressRecord>,
    /// Freed addresses in quarantine, ordered by release time
    cooling: VecDeque<CooldownRecord>,
    /// Every prefix that contributed addresses to the pool, oldest first
    allocated_prefixes: Vec<String>,
    /// Prefix -> number of its addresses currently assigned
    prefix_usage: HashMap<String, usize>,
    /// Addresses requested from the provider but not yet confirmed
    pending_create: usize,
    /// Addresses submitted for deletion but not yet confirmed
    pending_delete: usize,
    /// Set when a job failure may have left local and upstream state apart
    resync_required: bool,
}

impl WarmPool {
    /// Create a pool from injected initial contents.
    ///
    /// Every map and queue is initialized here even when the seed is empty;
    /// usage counters are backfilled for any seeded prefix that lacks one.
    pub fn new(
        node_id: impl Into<String>,
        capacity: usize,
        config: WarmPoolConfig,
        seed: PoolSeed,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        let mut prefix_usage = seed.prefix_usage;
        for prefix in &seed.allocated_prefixes {
            prefix_usage.entry(prefix.clone()).or_insert(0);
        }

        let state = PoolState {
            warm: seed.warm.into(),
            used: seed.used,
            cooling: VecDeque::new(),
            allocated_prefixes: seed.allocated_prefixes,
            prefix_usage,
            pending_create: 0,
            pending_delete: 0,
            resync_required: false,
        };

        Ok(Self {
            node_id: node_id.into(),
            capacity,
            config,
            state: RwLock::new(state),
        })
    }

    /// Node identifier carried on every job this pool emits
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Maximum number of addresses this node may hold
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The pool configuration
    pub fn config(&self) -> &WarmPoolConfig {
        &self.config
    }

    // Every mutation completes before the guard is released, so state behind
    // a poisoned lock is still consistent and can be adopted as-is.
    fn read(&self) -> RwLockReadGuard<'_, PoolState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PoolState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Assign a warm address to `requester_id`.
    ///
    /// The precondition checks run in a fixed order so the caller can tell
    /// transient exhaustion (`CoolingDown`, `CreatingResources`,
    /// `WarmPoolEmpty` - retryable) from hard exhaustion (`AtMaxCapacity`).
    /// A successful assignment, like [`PoolError::WarmPoolEmpty`], should
    /// prompt the caller to run a reconcile pass.
    pub fn assign(&self, requester_id: &str) -> Result<AddressRecord, PoolError> {
        let mut state = self.write();

        if state.used.contains_key(requester_id) {
            return Err(PoolError::already_assigned(requester_id));
        }
        if state.used.len() == self.capacity {
            return Err(PoolError::AtMaxCapacity);
        }
        // Retry within the cool down period
        if state.used.len() + state.cooling.len() == self.capacity {
            return Err(PoolError::CoolingDown);
        }
        // Retry after typical provider latency
        if state.used.len() + state.cooling.len() + state.pending_create + state.pending_delete
            == self.capacity
        {
            return Err(PoolError::CreatingResources);
        }
        let Some(record) = state.warm.pop_front() else {
            return Err(PoolError::WarmPoolEmpty);
        };

        state.used.insert(requester_id.to_string(), record.clone());
        *state
            .prefix_usage
            .entry(record.prefix_origin.clone())
            .or_insert(0) += 1;
        drop(state);

        debug!(address = %record.address, requester_id, "assigned address");
        Ok(record)
    }

    /// Release the address assigned to `requester_id` into the cool down
    /// queue. The address becomes assignable again only after the cool down
    /// period elapses, so a new workload never aliases connections of the
    /// previous one.
    pub fn free(&self, requester_id: &str, address: Ipv4Addr) -> Result<(), PoolError> {
        let mut state = self.write();

        let record = match state.used.get(requester_id) {
            None => return Err(PoolError::doesnt_exist(requester_id)),
            Some(current) if current.address != address => {
                return Err(PoolError::incorrect_owner(requester_id, address))
            }
            Some(current) => current.clone(),
        };
        state.used.remove(requester_id);

        let mut accounting_error = None;
        match state.prefix_usage.get_mut(&record.prefix_origin) {
            Some(usage) if *usage > 0 => *usage -= 1,
            _ => {
                state.resync_required = true;
                accounting_error = Some(format!(
                    "usage counter for prefix '{}' underflowed",
                    record.prefix_origin
                ));
            }
        }

        state.cooling.push_back(CooldownRecord {
            record,
            freed_at: Instant::now(),
        });
        let stats = self.stats_locked(&state);
        drop(state);

        if let Some(message) = accounting_error {
            error!(?stats, "{message}; scheduling re-sync");
        }
        debug!(%address, requester_id, "moved address to the cool down queue");
        Ok(())
    }

    /// Look up the address currently assigned to `requester_id`
    pub fn get_assigned(&self, requester_id: &str) -> Option<AddressRecord> {
        self.read().used.get(requester_id).cloned()
    }

    /// Move every cooled-down address back into the warm pool.
    ///
    /// The queue is ordered by release time, so the sweep stops at the first
    /// entry whose quarantine has not elapsed. Returns true while entries
    /// remain, signalling the caller to keep its timer armed.
    pub fn process_cool_down_queue(&self) -> bool {
        let mut state = self.write();
        let now = Instant::now();
        let mut released = 0usize;

        loop {
            let ready = match state.cooling.front() {
                Some(entry) => now.duration_since(entry.freed_at) >= self.config.cool_down_period,
                None => break,
            };
            if !ready {
                break;
            }
            if let Some(entry) = state.cooling.pop_front() {
                state.warm.push_back(entry.record);
                released += 1;
            }
        }

        let more_work = !state.cooling.is_empty();
        drop(state);

        if released > 0 {
            debug!(released, "returned cooled down addresses to the warm pool");
        }
        more_work
    }

    /// Compare the warm pool against its target size and emit at most one job
    /// for the asynchronous worker.
    ///
    /// While a re-sync is owed it takes precedence over scaling, but only
    /// once no create/delete jobs are in flight - their results would race
    /// the upstream listing.
    pub fn reconcile(&self) -> PoolJob {
        let mut state = self.write();

        if state.resync_required {
            if state.pending_create != 0 || state.pending_delete != 0 {
                drop(state);
                debug!("cannot re-sync while create/delete jobs are in flight");
                return PoolJob::None;
            }
            drop(state);
            info!(node_id = %self.node_id, "submitting pool re-sync request");
            return PoolJob::Resync {
                node_id: self.node_id.clone(),
            };
        }

        let total = state.warm.len()
            + state.used.len()
            + state.cooling.len()
            + state.pending_create
            + state.pending_delete;

        if state.used.len() + state.cooling.len() + state.pending_create + state.pending_delete
            == self.capacity
        {
            let stats = self.stats_locked(&state);
            drop(state);
            debug!(?stats, "cannot reconcile, pool is at maximum capacity");
            return PoolJob::None;
        }

        // Count in-flight creates toward the warm size so back-to-back passes
        // don't stack duplicate requests
        let deviation =
            self.config.desired_size as i64 - (state.warm.len() + state.pending_create) as i64;

        if deviation > self.config.max_deviation as i64 {
            let room = self.capacity.saturating_sub(total);
            if room == 0 {
                drop(state);
                debug!("warm pool below target but no room left to grow");
                return PoolJob::None;
            }
            let count = (deviation as usize).min(room);
            state.pending_create += count;
            let stats = self.stats_locked(&state);
            drop(state);

            info!(count, ?stats, "submitting job to add addresses to the warm pool");
            return PoolJob::Create {
                node_id: self.node_id.clone(),
                count,
            };
        }

        if -deviation > self.config.max_deviation as i64 {
            return self.build_delete_job(state, (-deviation) as usize);
        }

        drop(state);
        debug!("warm pool within tolerance, no reconciliation needed");
        PoolJob::None
    }

    /// Pick enough fully-free prefixes to cover `overshoot` addresses, pull
    /// their warm members out of the pool, and emit the delete job.
    fn build_delete_job(
        &self,
        mut state: RwLockWriteGuard<'_, PoolState>,
        overshoot: usize,
    ) -> PoolJob {
        // A prefix is only releasable when none of its addresses is assigned
        // and none sits in the cool down queue; deleting it upstream would
        // otherwise strand those addresses.
        let selected: Vec<String> = {
            let cooling_prefixes: HashSet<&str> = state
                .cooling
                .iter()
                .map(|entry| entry.record.prefix_origin.as_str())
                .collect();
            let free: Vec<&String> = state
                .allocated_prefixes
                .iter()
                .filter(|prefix| {
                    state.prefix_usage.get(*prefix).copied().unwrap_or(0) == 0
                        && !cooling_prefixes.contains(prefix.as_str())
                })
                .collect();
            let wanted = overshoot.div_ceil(self.config.prefix_size).min(free.len());
            free.into_iter().take(wanted).cloned().collect()
        };

        if selected.is_empty() {
            drop(state);
            debug!("warm pool above target but no prefix is fully free");
            return PoolJob::None;
        }

        // Removal is by prefix membership, never by position: a selected
        // prefix may contribute fewer warm members than its full size after
        // a partial re-sync.
        let selected_set: HashSet<&str> = selected.iter().map(String::as_str).collect();
        let mut records = Vec::new();
        let mut remaining = VecDeque::with_capacity(state.warm.len());
        for record in state.warm.drain(..) {
            if selected_set.contains(record.prefix_origin.as_str()) {
                records.push(record);
            } else {
                remaining.push_back(record);
            }
        }
        state.warm = remaining;
        state
            .allocated_prefixes
            .retain(|prefix| !selected_set.contains(prefix.as_str()));
        for prefix in &selected {
            state.prefix_usage.remove(prefix);
        }
        state.pending_delete += records.len();
        let stats = self.stats_locked(&state);
        drop(state);

        info!(
            prefixes = ?selected,
            count = records.len(),
            ?stats,
            "submitting job to release free prefixes"
        );
        PoolJob::Delete {
            node_id: self.node_id.clone(),
            prefixes: selected,
            records,
        }
    }

    /// Apply the outcome of an executed create/delete/resync job.
    ///
    /// Failures never touch the buckets directly - the flag is raised and the
    /// next re-sync round restores truth from upstream. Returns true when the
    /// caller should run another reconcile pass.
    pub fn update_pool(&self, outcome: &JobOutcome) -> bool {
        let mut state = self.write();
        let mut should_reconcile = false;
        let mut bad_prefixes: Vec<(String, CoreError)> = Vec::new();

        if !outcome.succeeded {
            state.resync_required = true;
            should_reconcile = true;
        } else if outcome.kind == JobKind::Create {
            for prefix in &outcome.prefixes {
                match expand_prefix(prefix, self.config.prefix_size) {
                    Ok(addresses) => {
                        for address in addresses {
                            state
                                .warm
                                .push_back(AddressRecord::new(address, prefix.clone()));
                        }
                        if !state.allocated_prefixes.iter().any(|p| p == prefix) {
                            state.allocated_prefixes.push(prefix.clone());
                        }
                        state.prefix_usage.entry(prefix.clone()).or_insert(0);
                    }
                    Err(e) => {
                        state.resync_required = true;
                        should_reconcile = true;
                        bad_prefixes.push((prefix.clone(), e));
                    }
                }
            }
        }
        // A successful delete already removed its records at submission time;
        // only the pending counter is left to settle.

        let clamped = match outcome.kind {
            JobKind::Create => Self::drain_pending(&mut state.pending_create, outcome.count),
            JobKind::Delete => Self::drain_pending(&mut state.pending_delete, outcome.count),
            JobKind::Resync => false,
        };
        if clamped {
            state.resync_required = true;
            should_reconcile = true;
        }

        let stats = self.stats_locked(&state);
        drop(state);

        for (prefix, error) in &bad_prefixes {
            error!(prefix, %error, "discarding unusable prefix from job result; scheduling re-sync");
        }
        if clamped {
            error!(
                ?stats,
                kind = %outcome.kind,
                count = outcome.count,
                "pending counter underflow; scheduling re-sync"
            );
        }
        debug!(kind = %outcome.kind, succeeded = outcome.succeeded, ?stats, "processed job outcome");
        should_reconcile
    }

    fn drain_pending(counter: &mut usize, count: usize) -> bool {
        if count > *counter {
            *counter = 0;
            true
        } else {
            *counter -= count;
            false
        }
    }

    /// Replace local belief about which addresses exist with the upstream
    /// answer.
    ///
    /// Addresses upstream knows about but the pool lost are appended to the
    /// warm pool; addresses the pool holds that upstream deleted are dropped
    /// from warm and cooling. Assigned addresses are deliberately left alone:
    /// a live workload keeps its address, and the node agent resolves the
    /// conflict by replacing the workload.
    pub fn resync(&self, upstream: &[AddressRecord]) {
        let mut state = self.write();

        // Possible when two re-sync rounds were requested back to back; the
        // first response already restored truth.
        if !state.resync_required {
            drop(state);
            info!("duplicate re-sync response, ignoring");
            return;
        }
        state.resync_required = false;

        let local: Vec<AddressRecord> = state
            .cooling
            .iter()
            .map(|entry| entry.record.clone())
            .chain(state.used.values().cloned())
            .chain(state.warm.iter().cloned())
            .collect();

        let new_records = difference(upstream, &local);
        let gone_records = difference(&local, upstream);

        if new_records.is_empty() && gone_records.is_empty() {
            drop(state);
            info!("local and upstream state are in sync");
            return;
        }

        for record in &new_records {
            // An address re-learned from upstream may belong to a prefix the
            // pool no longer tracks (e.g. after a failed delete); re-register
            // it so every warm address keeps a known origin.
            if !state
                .allocated_prefixes
                .iter()
                .any(|p| *p == record.prefix_origin)
            {
                state.allocated_prefixes.push(record.prefix_origin.clone());
            }
            state
                .prefix_usage
                .entry(record.prefix_origin.clone())
                .or_insert(0);
            state.warm.push_back(record.clone());
        }

        if !gone_records.is_empty() {
            let gone: HashSet<Ipv4Addr> = gone_records.iter().map(|r| r.address).collect();
            state.warm.retain(|record| !gone.contains(&record.address));
            state
                .cooling
                .retain(|entry| !gone.contains(&entry.record.address));
        }

        let stats = self.stats_locked(&state);
        drop(state);

        info!(
            added = new_records.len(),
            removed = gone_records.len(),
            ?stats,
            "re-synced pool with upstream"
        );
    }

    /// Deep-copied view of the three buckets, taken under the shared lock
    pub fn introspect(&self) -> PoolSnapshot {
        let state = self.read();
        PoolSnapshot {
            used: state.used.clone(),
            warm: state.warm.iter().cloned().collect(),
            cooling: state.cooling.iter().cloned().collect(),
        }
    }

    /// Bucket sizes and flags
    pub fn stats(&self) -> PoolStats {
        let state = self.read();
        self.stats_locked(&state)
    }

    fn stats_locked(&self, state: &PoolState) -> PoolStats {
        PoolStats {
            capacity: self.capacity,
            warm: state.warm.len(),
            used: state.used.len(),
            cooling: state.cooling.len(),
            pending_create: state.pending_create,
            pending_delete: state.pending_delete,
            resync_required: state.resync_required,
        }
    }
}

#[cfg(test)]
impl WarmPool {
    fn pending(&self) -> (usize, usize) {
        let state = self.read();
        (state.pending_create, state.pending_delete)
    }

    fn resync_required(&self) -> bool {
        self.read().resync_required
    }

    fn set_resync_required(&self) {
        self.write().resync_required = true;
    }

    fn prefix_usage_of(&self, prefix: &str) -> Option<usize> {
        self.read().prefix_usage.get(prefix).copied()
    }

    fn allocated(&self) -> Vec<String> {
        self.read().allocated_prefixes.clone()
    }

    fn plant_cooling(&self, record: AddressRecord, freed_at: Instant) {
        self.write().cooling.push_back(CooldownRecord { record, freed_at });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record(octets: [u8; 4], prefix: &str) -> AddressRecord {
        AddressRecord::new(Ipv4Addr::from(octets), prefix)
    }

    fn prefix_records(prefix: &str) -> Vec<AddressRecord> {
        expand_prefix(prefix, 16)
            .unwrap()
            .into_iter()
            .map(|address| AddressRecord::new(address, prefix))
            .collect()
    }

    fn test_config(desired_size: usize, max_deviation: usize) -> WarmPoolConfig {
        WarmPoolConfig {
            desired_size,
            max_deviation,
            cool_down_period: Duration::ZERO,
            prefix_size: 16,
        }
    }

    /// Pool seeded with the given warm records; prefixes are registered in
    /// first-seen order with zero usage.
    fn pool_with_warm(
        warm: Vec<AddressRecord>,
        capacity: usize,
        config: WarmPoolConfig,
    ) -> WarmPool {
        let mut allocated_prefixes: Vec<String> = Vec::new();
        for record in &warm {
            if !allocated_prefixes.contains(&record.prefix_origin) {
                allocated_prefixes.push(record.prefix_origin.clone());
            }
        }
        let seed = PoolSeed {
            warm,
            allocated_prefixes,
            ..Default::default()
        };
        WarmPool::new("node-1", capacity, config, seed).unwrap()
    }

    fn assert_invariants(pool: &WarmPool) {
        let snapshot = pool.introspect();
        let stats = pool.stats();

        let warm: HashSet<Ipv4Addr> = snapshot.warm.iter().map(|r| r.address).collect();
        let used: HashSet<Ipv4Addr> = snapshot.used.values().map(|r| r.address).collect();
        let cooling: HashSet<Ipv4Addr> =
            snapshot.cooling.iter().map(|e| e.record.address).collect();

        assert!(warm.is_disjoint(&used), "warm and used overlap");
        assert!(warm.is_disjoint(&cooling), "warm and cooling overlap");
        assert!(used.is_disjoint(&cooling), "used and cooling overlap");

        assert!(
            stats.used + stats.cooling + stats.pending_create + stats.pending_delete
                <= stats.capacity,
            "capacity bound violated: {stats:?}"
        );

        let allocated = pool.allocated();
        for record in &snapshot.warm {
            assert!(
                allocated.contains(&record.prefix_origin),
                "warm address {} has unregistered prefix {}",
                record.address,
                record.prefix_origin
            );
        }

        for prefix in &allocated {
            let expected = snapshot
                .used
                .values()
                .filter(|r| r.prefix_origin == *prefix)
                .count();
            assert_eq!(
                pool.prefix_usage_of(prefix),
                Some(expected),
                "usage counter for {prefix} out of step"
            );
        }

        for pair in snapshot.cooling.windows(2) {
            assert!(
                pair[0].freed_at <= pair[1].freed_at,
                "cool down queue out of order"
            );
        }
    }

    #[test]
    fn test_assign_from_warm_pool() {
        let pool = pool_with_warm(
            vec![
                record([10, 0, 0, 1], "10.0.0.0/28"),
                record([10, 0, 0, 2], "10.0.0.0/28"),
            ],
            64,
            test_config(2, 0),
        );

        let assigned = pool.assign("pod-1").unwrap();
        assert_eq!(assigned.address, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(assigned.prefix_origin, "10.0.0.0/28");
        assert_eq!(pool.get_assigned("pod-1"), Some(assigned));
        assert_eq!(pool.prefix_usage_of("10.0.0.0/28"), Some(1));
        assert_invariants(&pool);
    }

    #[test]
    fn test_assign_is_fifo() {
        let pool = pool_with_warm(
            vec![
                record([10, 0, 0, 1], "10.0.0.0/28"),
                record([10, 0, 0, 2], "10.0.0.0/28"),
            ],
            64,
            test_config(2, 0),
        );

        assert_eq!(
            pool.assign("pod-1").unwrap().address,
            Ipv4Addr::new(10, 0, 0, 1)
        );
        assert_eq!(
            pool.assign("pod-2").unwrap().address,
            Ipv4Addr::new(10, 0, 0, 2)
        );
    }

    #[test]
    fn test_assign_twice_fails() {
        let pool = pool_with_warm(
            vec![
                record([10, 0, 0, 1], "10.0.0.0/28"),
                record([10, 0, 0, 2], "10.0.0.0/28"),
            ],
            64,
            test_config(2, 0),
        );

        pool.assign("pod-1").unwrap();
        assert!(matches!(
            pool.assign("pod-1").unwrap_err(),
            PoolError::AlreadyAssigned { .. }
        ));
        // The failure did not consume a warm address
        assert_eq!(pool.stats().warm, 1);
    }

    #[test]
    fn test_assign_at_max_capacity() {
        let pool = pool_with_warm(
            vec![record([10, 0, 0, 1], "10.0.0.0/28")],
            1,
            test_config(1, 0),
        );

        pool.assign("pod-1").unwrap();
        assert!(matches!(
            pool.assign("pod-2").unwrap_err(),
            PoolError::AtMaxCapacity
        ));
    }

    #[test]
    fn test_assign_while_cooling() {
        let config = WarmPoolConfig {
            cool_down_period: Duration::from_secs(30),
            ..test_config(1, 0)
        };
        let pool = pool_with_warm(vec![record([10, 0, 0, 1], "10.0.0.0/28")], 1, config);

        let assigned = pool.assign("pod-1").unwrap();
        pool.free("pod-1", assigned.address).unwrap();

        assert!(matches!(
            pool.assign("pod-2").unwrap_err(),
            PoolError::CoolingDown
        ));
        assert_invariants(&pool);
    }

    #[test]
    fn test_assign_while_creating() {
        let pool = pool_with_warm(
            vec![record([10, 0, 0, 1], "10.0.0.0/28")],
            2,
            test_config(16, 2),
        );
        pool.assign("pod-1").unwrap();

        // One slot of capacity left; reconcile claims it for a create job
        let job = pool.reconcile();
        assert!(matches!(job, PoolJob::Create { count: 1, .. }));

        assert!(matches!(
            pool.assign("pod-2").unwrap_err(),
            PoolError::CreatingResources
        ));
    }

    #[test]
    fn test_assign_empty_warm_pool_wants_reconcile() {
        let pool = pool_with_warm(Vec::new(), 64, test_config(16, 2));

        let err = pool.assign("pod-1").unwrap_err();
        assert!(matches!(err, PoolError::WarmPoolEmpty));
        assert!(err.triggers_reconcile());

        // The follow-up reconcile pass requests addresses
        assert!(matches!(pool.reconcile(), PoolJob::Create { count: 16, .. }));
    }

    #[test]
    fn test_free_unknown_requester() {
        let pool = pool_with_warm(Vec::new(), 64, test_config(0, 0));
        assert!(matches!(
            pool.free("pod-1", Ipv4Addr::new(10, 0, 0, 1)).unwrap_err(),
            PoolError::DoesntExist { .. }
        ));
    }

    #[test]
    fn test_free_wrong_address() {
        let pool = pool_with_warm(
            vec![record([10, 0, 0, 1], "10.0.0.0/28")],
            64,
            test_config(1, 0),
        );
        pool.assign("pod-1").unwrap();

        assert!(matches!(
            pool.free("pod-1", Ipv4Addr::new(10, 0, 0, 9)).unwrap_err(),
            PoolError::IncorrectOwner { .. }
        ));
        // The assignment is untouched
        assert!(pool.get_assigned("pod-1").is_some());
    }

    #[test]
    fn test_free_then_cool_down_round_trip() {
        let pool = pool_with_warm(
            vec![
                record([10, 0, 0, 1], "10.0.0.0/28"),
                record([10, 0, 0, 2], "10.0.0.0/28"),
            ],
            64,
            test_config(2, 0),
        );

        let assigned = pool.assign("pod-1").unwrap();
        pool.free("pod-1", assigned.address).unwrap();
        assert_eq!(pool.stats().cooling, 1);
        assert_eq!(pool.prefix_usage_of("10.0.0.0/28"), Some(0));

        // Zero cool down: the sweep drains the whole queue
        assert!(!pool.process_cool_down_queue());

        // The freed address rejoined at the tail, behind the untouched .2
        assert_eq!(
            pool.assign("pod-2").unwrap().address,
            Ipv4Addr::new(10, 0, 0, 2)
        );
        assert_eq!(
            pool.assign("pod-3").unwrap().address,
            Ipv4Addr::new(10, 0, 0, 1)
        );
        assert_invariants(&pool);
    }

    #[test]
    fn test_cool_down_released_exactly_at_boundary() {
        let period = Duration::from_secs(30);
        let config = WarmPoolConfig {
            cool_down_period: period,
            ..test_config(1, 0)
        };
        let pool = pool_with_warm(Vec::new(), 64, config);
        pool.plant_cooling(record([10, 0, 0, 1], "10.0.0.0/28"), Instant::now() - period);

        assert!(!pool.process_cool_down_queue());
        assert_eq!(pool.stats().warm, 1);
    }

    #[test]
    fn test_cool_down_keeps_unexpired_entries() {
        let config = WarmPoolConfig {
            cool_down_period: Duration::from_secs(30),
            ..test_config(1, 0)
        };
        let pool = pool_with_warm(Vec::new(), 64, config);
        pool.plant_cooling(record([10, 0, 0, 1], "10.0.0.0/28"), Instant::now());

        assert!(pool.process_cool_down_queue());
        assert_eq!(pool.stats().warm, 0);
        assert_eq!(pool.stats().cooling, 1);
    }

    #[test]
    fn test_cool_down_stops_at_first_unready_entry() {
        let period = Duration::from_secs(30);
        let config = WarmPoolConfig {
            cool_down_period: period,
            ..test_config(2, 0)
        };
        let pool = pool_with_warm(Vec::new(), 64, config);
        pool.plant_cooling(record([10, 0, 0, 1], "10.0.0.0/28"), Instant::now() - period);
        pool.plant_cooling(record([10, 0, 0, 2], "10.0.0.0/28"), Instant::now());

        assert!(pool.process_cool_down_queue());
        let stats = pool.stats();
        assert_eq!(stats.warm, 1);
        assert_eq!(stats.cooling, 1);
    }

    #[test]
    fn test_reconcile_scales_up_from_empty() {
        let pool = pool_with_warm(Vec::new(), 64, test_config(16, 2));

        let job = pool.reconcile();
        assert_eq!(
            job,
            PoolJob::Create {
                node_id: "node-1".to_string(),
                count: 16
            }
        );
        assert_eq!(pool.pending(), (16, 0));

        let should_reconcile =
            pool.update_pool(&JobOutcome::create_succeeded(16, vec!["10.0.1.0/28".into()]));
        assert!(!should_reconcile);

        let stats = pool.stats();
        assert_eq!(stats.warm, 16);
        assert_eq!(stats.pending_create, 0);
        assert_eq!(pool.allocated(), vec!["10.0.1.0/28".to_string()]);
        assert_eq!(pool.prefix_usage_of("10.0.1.0/28"), Some(0));
        assert_invariants(&pool);
    }

    #[test]
    fn test_reconcile_create_clamped_by_capacity() {
        let pool = pool_with_warm(Vec::new(), 10, test_config(16, 2));

        // Only ten slots exist; the request is trimmed to fit
        assert!(matches!(pool.reconcile(), PoolJob::Create { count: 10, .. }));
        assert_eq!(pool.pending(), (10, 0));
    }

    #[test]
    fn test_reconcile_within_tolerance_is_noop() {
        let pool = pool_with_warm(prefix_records("10.0.0.0/28"), 64, test_config(16, 2));
        assert_eq!(pool.reconcile(), PoolJob::None);
    }

    #[test]
    fn test_consecutive_reconciles_do_not_stack_jobs() {
        let pool = pool_with_warm(Vec::new(), 64, test_config(16, 2));

        assert!(matches!(pool.reconcile(), PoolJob::Create { .. }));
        // The in-flight create counts toward the warm size
        assert_eq!(pool.reconcile(), PoolJob::None);
    }

    #[test]
    fn test_reconcile_at_capacity_is_noop() {
        let pool = pool_with_warm(
            vec![record([10, 0, 0, 1], "10.0.0.0/28")],
            1,
            test_config(16, 2),
        );
        pool.assign("pod-1").unwrap();

        assert_eq!(pool.reconcile(), PoolJob::None);
    }

    #[test]
    fn test_capacity_zero_pool() {
        let pool = pool_with_warm(Vec::new(), 0, test_config(0, 0));

        assert!(matches!(
            pool.assign("pod-1").unwrap_err(),
            PoolError::AtMaxCapacity
        ));
        assert_eq!(pool.reconcile(), PoolJob::None);
    }

    #[test]
    fn test_desired_size_equals_capacity_steady_state() {
        let pool = pool_with_warm(Vec::new(), 16, test_config(16, 2));

        let PoolJob::Create { count, .. } = pool.reconcile() else {
            panic!("expected a create job");
        };
        assert_eq!(count, 16);
        pool.update_pool(&JobOutcome::create_succeeded(count, vec!["10.0.1.0/28".into()]));

        let stats = pool.stats();
        assert_eq!(stats.warm, 16);
        assert_eq!(stats.pending_create, 0);
        assert_eq!(stats.pending_delete, 0);
        assert_eq!(pool.reconcile(), PoolJob::None);
        assert_invariants(&pool);
    }

    #[test]
    fn test_reconcile_scales_down_oldest_free_prefix() {
        let mut warm = prefix_records("10.0.1.0/28");
        warm.extend(prefix_records("10.0.2.0/28"));
        let pool = pool_with_warm(warm, 64, test_config(16, 2));

        let PoolJob::Delete {
            prefixes, records, ..
        } = pool.reconcile()
        else {
            panic!("expected a delete job");
        };
        assert_eq!(prefixes, vec!["10.0.1.0/28".to_string()]);
        assert_eq!(records.len(), 16);
        assert!(records.iter().all(|r| r.prefix_origin == "10.0.1.0/28"));

        let stats = pool.stats();
        assert_eq!(stats.warm, 16);
        assert_eq!(stats.pending_delete, 16);
        assert_eq!(pool.allocated(), vec!["10.0.2.0/28".to_string()]);

        pool.update_pool(&JobOutcome::delete_succeeded(records.len()));
        assert_eq!(pool.pending(), (0, 0));
        assert_invariants(&pool);
    }

    #[test]
    fn test_scale_down_skips_prefix_with_assigned_address() {
        let mut warm = prefix_records("10.0.1.0/28");
        warm.extend(prefix_records("10.0.2.0/28"));
        let pool = pool_with_warm(warm, 64, test_config(8, 2));

        // The head of the warm pool is 10.0.1.0, pinning the older prefix
        pool.assign("pod-1").unwrap();

        let PoolJob::Delete { prefixes, .. } = pool.reconcile() else {
            panic!("expected a delete job");
        };
        assert_eq!(prefixes, vec!["10.0.2.0/28".to_string()]);
        assert_invariants(&pool);
    }

    #[test]
    fn test_scale_down_skips_prefix_with_cooling_address() {
        let mut warm = prefix_records("10.0.1.0/28");
        warm.extend(prefix_records("10.0.2.0/28"));
        let config = WarmPoolConfig {
            cool_down_period: Duration::from_secs(30),
            ..test_config(8, 2)
        };
        let pool = pool_with_warm(warm, 64, config);

        let assigned = pool.assign("pod-1").unwrap();
        assert_eq!(assigned.prefix_origin, "10.0.1.0/28");
        pool.free("pod-1", assigned.address).unwrap();

        // 10.0.1.0 sits in the cool down queue, so its prefix is not free
        let PoolJob::Delete { prefixes, .. } = pool.reconcile() else {
            panic!("expected a delete job");
        };
        assert_eq!(prefixes, vec!["10.0.2.0/28".to_string()]);
        assert_invariants(&pool);
    }

    #[test]
    fn test_scale_down_with_partially_populated_prefix() {
        // After a partial re-sync a free prefix may contribute fewer warm
        // members than its nominal size
        let mut warm: Vec<AddressRecord> = prefix_records("10.0.1.0/28").into_iter().take(3).collect();
        warm.extend(prefix_records("10.0.2.0/28"));
        let pool = pool_with_warm(warm, 64, test_config(0, 2));

        let PoolJob::Delete {
            prefixes, records, ..
        } = pool.reconcile()
        else {
            panic!("expected a delete job");
        };
        assert_eq!(prefixes.len(), 2);
        assert_eq!(records.len(), 19);
        assert_eq!(pool.stats().warm, 0);
        assert_eq!(pool.stats().pending_delete, 19);
        assert_invariants(&pool);
    }

    #[test]
    fn test_scale_down_without_free_prefix_is_noop() {
        let warm = prefix_records("10.0.1.0/28");
        let pool = pool_with_warm(warm, 64, test_config(0, 2));
        pool.assign("pod-1").unwrap();

        assert_eq!(pool.reconcile(), PoolJob::None);
    }

    #[test]
    fn test_failed_create_triggers_resync_round() {
        let pool = pool_with_warm(Vec::new(), 64, test_config(16, 2));

        let PoolJob::Create { count, .. } = pool.reconcile() else {
            panic!("expected a create job");
        };
        assert!(pool.update_pool(&JobOutcome::create_failed(count)));
        assert_eq!(pool.pending(), (0, 0));
        assert!(pool.resync_required());

        // With nothing in flight the next pass asks for a re-sync
        assert_eq!(
            pool.reconcile(),
            PoolJob::Resync {
                node_id: "node-1".to_string()
            }
        );

        // Upstream still knows an address the pool lost track of
        let upstream = vec![record([10, 0, 9, 5], "10.0.9.0/28")];
        pool.resync(&upstream);
        assert!(!pool.resync_required());

        let stats = pool.stats();
        assert_eq!(stats.warm, 1);
        assert!(pool.allocated().contains(&"10.0.9.0/28".to_string()));
        assert_invariants(&pool);
    }

    #[test]
    fn test_resync_deferred_while_jobs_in_flight() {
        let pool = pool_with_warm(Vec::new(), 64, test_config(16, 2));

        assert!(matches!(pool.reconcile(), PoolJob::Create { .. }));
        pool.set_resync_required();

        // A create is outstanding, so the re-sync must wait
        assert_eq!(pool.reconcile(), PoolJob::None);

        pool.update_pool(&JobOutcome::create_succeeded(16, vec!["10.0.1.0/28".into()]));
        assert!(matches!(pool.reconcile(), PoolJob::Resync { .. }));
    }

    #[test]
    fn test_resync_ignored_when_not_required() {
        let pool = pool_with_warm(prefix_records("10.0.1.0/28"), 64, test_config(16, 2));

        pool.resync(&[]);

        // Nothing changed: the pool was not expecting an upstream answer
        assert_eq!(pool.stats().warm, 16);
    }

    #[test]
    fn test_resync_with_identical_snapshot_changes_nothing() {
        let config = WarmPoolConfig {
            cool_down_period: Duration::from_secs(30),
            ..test_config(16, 2)
        };
        let pool = pool_with_warm(prefix_records("10.0.1.0/28"), 64, config);
        pool.assign("pod-1").unwrap();
        let assigned = pool.assign("pod-2").unwrap();
        pool.free("pod-2", assigned.address).unwrap();

        let before = pool.introspect();
        let mut upstream: Vec<AddressRecord> = before.warm.clone();
        upstream.extend(before.used.values().cloned());
        upstream.extend(before.cooling.iter().map(|e| e.record.clone()));

        pool.set_resync_required();
        pool.resync(&upstream);

        let after = pool.introspect();
        assert!(!pool.resync_required());
        assert_eq!(after.warm, before.warm);
        assert_eq!(after.used, before.used);
        assert_eq!(after.cooling.len(), before.cooling.len());
        assert_invariants(&pool);
    }

    #[test]
    fn test_resync_removes_gone_addresses_but_keeps_used() {
        let config = WarmPoolConfig {
            cool_down_period: Duration::from_secs(30),
            ..test_config(16, 2)
        };
        let pool = pool_with_warm(prefix_records("10.0.1.0/28"), 64, config);
        let kept = pool.assign("pod-1").unwrap();
        let freed = pool.assign("pod-2").unwrap();
        pool.free("pod-2", freed.address).unwrap();

        // Upstream lost everything
        pool.set_resync_required();
        pool.resync(&[]);

        let stats = pool.stats();
        assert_eq!(stats.warm, 0);
        assert_eq!(stats.cooling, 0);
        // The live workload keeps its address; the node agent deals with it
        assert_eq!(pool.get_assigned("pod-1"), Some(kept));
    }

    #[test]
    fn test_pending_counter_underflow_is_clamped_and_flagged() {
        let pool = pool_with_warm(Vec::new(), 64, test_config(16, 2));

        let should_reconcile = pool.update_pool(&JobOutcome::delete_succeeded(5));
        assert!(should_reconcile);
        assert_eq!(pool.pending(), (0, 0));
        assert!(pool.resync_required());
    }

    #[test]
    fn test_unparseable_prefix_in_create_result_is_discarded() {
        let pool = pool_with_warm(Vec::new(), 64, test_config(16, 2));
        assert!(matches!(pool.reconcile(), PoolJob::Create { .. }));

        let should_reconcile = pool.update_pool(&JobOutcome::create_succeeded(
            16,
            vec!["10.0.1.0/28".into(), "bogus".into()],
        ));
        assert!(should_reconcile);
        assert!(pool.resync_required());
        // The good prefix still landed
        assert_eq!(pool.stats().warm, 16);
        assert_invariants(&pool);
    }

    #[test]
    fn test_mixed_operations_preserve_invariants() {
        let config = WarmPoolConfig {
            desired_size: 24,
            max_deviation: 2,
            cool_down_period: Duration::ZERO,
            prefix_size: 16,
        };
        let pool = WarmPool::new("node-1", 64, config, PoolSeed::default()).unwrap();

        let mut lcg: u64 = 0x9e37_79b9_7f4a_7c15;
        let mut next = move || {
            lcg = lcg
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (lcg >> 33) as usize
        };

        let mut outstanding: Vec<(String, AddressRecord)> = Vec::new();
        let mut next_block: u32 = 0;

        for step in 0..400 {
            match next() % 5 {
                0 => {
                    let id = format!("pod-{}", next() % 40);
                    if let Ok(assigned) = pool.assign(&id) {
                        outstanding.push((id, assigned));
                    }
                }
                1 => {
                    if !outstanding.is_empty() {
                        let index = next() % outstanding.len();
                        let (id, assigned) = outstanding.swap_remove(index);
                        pool.free(&id, assigned.address).unwrap();
                    }
                }
                2 => {
                    pool.process_cool_down_queue();
                }
                _ => match pool.reconcile() {
                    PoolJob::None => {}
                    PoolJob::Create { count, .. } => {
                        if step % 7 == 0 {
                            pool.update_pool(&JobOutcome::create_failed(count));
                        } else {
                            let prefixes: Vec<String> = (0..count.div_ceil(16))
                                .map(|_| {
                                    let base =
                                        u32::from(Ipv4Addr::new(10, 0, 0, 0)) + next_block * 16;
                                    next_block += 1;
                                    format!("{}/28", Ipv4Addr::from(base))
                                })
                                .collect();
                            pool.update_pool(&JobOutcome::create_succeeded(count, prefixes));
                        }
                    }
                    PoolJob::Delete { records, .. } => {
                        pool.update_pool(&JobOutcome::delete_succeeded(records.len()));
                    }
                    PoolJob::Resync { .. } => {
                        let snapshot = pool.introspect();
                        let mut upstream = snapshot.warm;
                        upstream.extend(snapshot.used.values().cloned());
                        upstream.extend(snapshot.cooling.iter().map(|e| e.record.clone()));
                        pool.resync(&upstream);
                    }
                },
            }
            assert_invariants(&pool);
        }
    }
}
