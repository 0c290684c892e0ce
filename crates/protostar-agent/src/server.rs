use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use protostar_core::AddressRecord;
use protostar_pool::{PoolStats, WarmPool};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Read-only diagnostic endpoint for the warm pool
pub struct IntrospectServer {
    listen_addr: SocketAddr,
    pool: Arc<WarmPool>,
}

/// A cooling address together with the quarantine time it has left
#[derive(Debug, Clone, Serialize)]
pub struct CoolingView {
    #[serde(flatten)]
    pub record: AddressRecord,
    pub remaining_ms: u64,
}

/// Pool state returned by the introspect API
#[derive(Debug, Clone, Serialize)]
pub struct IntrospectResponse {
    pub node_id: String,
    pub generated_at: DateTime<Utc>,
    pub stats: PoolStats,
    pub used: HashMap<String, AddressRecord>,
    pub warm: Vec<AddressRecord>,
    pub cooling: Vec<CoolingView>,
}

impl IntrospectServer {
    pub fn new(listen_addr: SocketAddr, pool: Arc<WarmPool>) -> Self {
        Self { listen_addr, pool }
    }

    /// Build the router
    fn build_router(&self) -> Router {
        Router::new()
            .route("/healthz", get(healthz))
            .route("/v1/pool", get(introspect_pool))
            .layer(TraceLayer::new_for_http())
            .with_state(self.pool.clone())
    }

    /// Run the server until the token is cancelled
    pub async fn run(self, token: CancellationToken) -> Result<(), std::io::Error> {
        let app = self.build_router();

        info!("Starting introspect server on {}", self.listen_addr);

        let listener = TcpListener::bind(self.listen_addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(token.cancelled_owned())
            .await
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn introspect_pool(State(pool): State<Arc<WarmPool>>) -> Json<IntrospectResponse> {
    Json(snapshot_response(&pool))
}

/// Build the serializable pool view.
///
/// The snapshot is deep-copied under the pool's shared lock; cooldown
/// remainders are computed here, outside any lock.
pub fn snapshot_response(pool: &WarmPool) -> IntrospectResponse {
    let snapshot = pool.introspect();
    let period = pool.config().cool_down_period;
    let now = Instant::now();

    let cooling = snapshot
        .cooling
        .into_iter()
        .map(|entry| {
            let elapsed = now.duration_since(entry.freed_at);
            CoolingView {
                record: entry.record,
                remaining_ms: period.saturating_sub(elapsed).as_millis() as u64,
            }
        })
        .collect();

    IntrospectResponse {
        node_id: pool.node_id().to_string(),
        generated_at: Utc::now(),
        stats: pool.stats(),
        used: snapshot.used,
        warm: snapshot.warm,
        cooling,
    }
}
