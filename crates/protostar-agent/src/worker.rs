use crate::provider::AddressProvider;
use protostar_pool::{JobOutcome, PoolJob, WarmPool};
use std::sync::Arc;
use tracing::warn;

/// Executes pool jobs against the provider and feeds outcomes back in.
///
/// The worker never propagates provider errors to its caller: a failed job
/// is reported to the pool, which schedules a re-sync round to restore
/// truth from upstream.
#[derive(Clone)]
pub struct JobWorker {
    pool: Arc<WarmPool>,
    provider: Arc<dyn AddressProvider>,
}

impl JobWorker {
    pub fn new(pool: Arc<WarmPool>, provider: Arc<dyn AddressProvider>) -> Self {
        Self { pool, provider }
    }

    /// Execute one job and apply its outcome. Returns true when the pool
    /// wants another reconcile pass.
    pub async fn execute(&self, job: PoolJob) -> bool {
        match job {
            PoolJob::None => false,
            PoolJob::Create { node_id, count } => {
                let prefix_count = count.div_ceil(self.pool.config().prefix_size);
                match self.provider.create_prefixes(&node_id, prefix_count).await {
                    Ok(prefixes) => self
                        .pool
                        .update_pool(&JobOutcome::create_succeeded(count, prefixes)),
                    Err(e) => {
                        warn!(error = %e, count, "create job failed");
                        self.pool.update_pool(&JobOutcome::create_failed(count))
                    }
                }
            }
            PoolJob::Delete {
                node_id,
                prefixes,
                records,
            } => match self.provider.delete_prefixes(&node_id, &prefixes).await {
                Ok(()) => self
                    .pool
                    .update_pool(&JobOutcome::delete_succeeded(records.len())),
                Err(e) => {
                    warn!(error = %e, ?prefixes, "delete job failed");
                    self.pool.update_pool(&JobOutcome::delete_failed(records.len()))
                }
            },
            PoolJob::Resync { node_id } => match self.provider.list_addresses(&node_id).await {
                Ok(upstream) => {
                    self.pool.resync(&upstream);
                    false
                }
                Err(e) => {
                    warn!(error = %e, "re-sync listing failed");
                    self.pool.update_pool(&JobOutcome::resync_failed())
                }
            },
        }
    }
}
