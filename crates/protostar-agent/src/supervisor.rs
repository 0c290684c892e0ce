use crate::provider::AddressProvider;
use crate::worker::JobWorker;
use protostar_pool::WarmPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Configuration for the pool supervisor
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Interval between periodic reconcile passes
    pub reconcile_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(5),
        }
    }
}

/// Drives the pool's periodic work: cooldown sweeps and reconcile passes.
///
/// Jobs produced by a reconcile pass are executed on their own task so a
/// slow provider never stalls the tick loop; completions that want another
/// pass nudge the loop through a [`Notify`] instead of waiting for the next
/// interval.
pub struct PoolSupervisor {
    pool: Arc<WarmPool>,
    worker: JobWorker,
    reconcile_nudge: Arc<Notify>,
    config: SupervisorConfig,
}

impl PoolSupervisor {
    pub fn new(
        pool: Arc<WarmPool>,
        provider: Arc<dyn AddressProvider>,
        config: SupervisorConfig,
    ) -> Self {
        let worker = JobWorker::new(Arc::clone(&pool), provider);
        Self {
            pool,
            worker,
            reconcile_nudge: Arc::new(Notify::new()),
            config,
        }
    }

    /// Handle for requesting an immediate reconcile pass, e.g. after an
    /// assignment failed on an empty warm pool
    pub fn reconcile_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.reconcile_nudge)
    }

    /// Run the supervisor loop until the token is cancelled
    pub async fn run(&self, token: CancellationToken) -> crate::Result<()> {
        info!(node_id = %self.pool.node_id(), "Starting pool supervisor");

        // Sweep at least twice per cool down period so no address overstays
        // its quarantine by more than half of it
        let sweep_interval =
            (self.pool.config().cool_down_period / 2).max(Duration::from_millis(10));
        let mut cooldown_tick = tokio::time::interval(sweep_interval);
        let mut reconcile_tick = tokio::time::interval(self.config.reconcile_interval);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Pool supervisor shutting down");
                    return Ok(());
                }
                _ = cooldown_tick.tick() => {
                    self.pool.process_cool_down_queue();
                }
                _ = reconcile_tick.tick() => {
                    self.reconcile_once();
                }
                _ = self.reconcile_nudge.notified() => {
                    self.reconcile_once();
                }
            }
        }
    }

    /// Run one reconcile pass and dispatch whatever job it produced
    fn reconcile_once(&self) {
        let job = self.pool.reconcile();
        if job.is_none() {
            return;
        }
        let worker = self.worker.clone();
        let nudge = Arc::clone(&self.reconcile_nudge);
        tokio::spawn(async move {
            if worker.execute(job).await {
                nudge.notify_one();
            }
        });
    }
}
