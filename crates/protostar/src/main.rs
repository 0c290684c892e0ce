use clap::{Parser, Subcommand};
use protostar_agent::{AgentConfig, IntrospectServer, MockProvider, PoolSupervisor};
use protostar_pool::{PoolSeed, WarmPool};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "protostar", about = "Protostar warm-pool IP address manager")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node agent (warm pool + supervisor + introspect endpoint)
    Agent {
        /// Path to a YAML configuration file; flags override its values
        #[arg(long)]
        config: Option<PathBuf>,
        /// Node identifier presented to the provider
        #[arg(long)]
        node_id: Option<String>,
        /// Bind address for the introspection endpoint
        #[arg(long)]
        listen_addr: Option<String>,
        /// Maximum number of addresses the node may hold
        #[arg(long)]
        capacity: Option<usize>,
        /// Target warm pool size
        #[arg(long)]
        desired_size: Option<usize>,
        /// Tolerated deviation from the target before reconciliation acts
        #[arg(long)]
        max_deviation: Option<usize>,
        /// Seconds a freed address stays quarantined before reuse
        #[arg(long)]
        cool_down_seconds: Option<u64>,
        /// Host addresses per provider prefix (16 for a /28)
        #[arg(long)]
        prefix_size: Option<usize>,
        /// Base block the mock provider carves prefixes from
        #[arg(long)]
        base_cidr: Option<String>,
    },
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Agent {
            config,
            node_id,
            listen_addr,
            capacity,
            desired_size,
            max_deviation,
            cool_down_seconds,
            prefix_size,
            base_cidr,
        } => {
            let mut agent_config = match config {
                Some(path) => AgentConfig::from_yaml_file(&path)?,
                None => AgentConfig::default(),
            };

            if let Some(node_id) = node_id {
                agent_config.node_id = node_id;
            }
            if let Some(listen_addr) = listen_addr {
                agent_config.listen_addr = listen_addr;
            }
            if let Some(capacity) = capacity {
                agent_config.capacity = capacity;
            }
            if let Some(desired_size) = desired_size {
                agent_config.desired_size = desired_size;
            }
            if let Some(max_deviation) = max_deviation {
                agent_config.max_deviation = max_deviation;
            }
            if let Some(cool_down_seconds) = cool_down_seconds {
                agent_config.cool_down_seconds = cool_down_seconds;
            }
            if let Some(prefix_size) = prefix_size {
                agent_config.prefix_size = prefix_size;
            }
            if let Some(base_cidr) = base_cidr {
                agent_config.base_cidr = base_cidr;
            }
            agent_config.validate()?;

            run_agent(agent_config).await
        }
    }
}

/// Wait for either SIGINT (ctrl-c) or SIGTERM, returning which one fired.
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

/// Run the agent: warm pool + supervisor loop + introspect server
async fn run_agent(config: AgentConfig) -> miette::Result<()> {
    info!("Starting protostar agent for node '{}'", config.node_id);

    // Pool state is not persisted; start empty and let the first reconcile
    // pass fill the warm pool from the provider
    let pool = Arc::new(WarmPool::new(
        config.node_id.clone(),
        config.capacity,
        config.warm_pool_config(),
        PoolSeed::default(),
    )?);

    let provider = Arc::new(MockProvider::new(&config.base_cidr, config.prefix_size)?);

    let token = CancellationToken::new();

    // 1. Spawn the supervisor loop
    let supervisor = PoolSupervisor::new(pool.clone(), provider, config.supervisor_config());
    let supervisor_token = token.clone();
    let supervisor_handle = tokio::spawn(async move {
        if let Err(e) = supervisor.run(supervisor_token).await {
            error!("Pool supervisor error: {}", e);
        }
    });

    // 2. Spawn the introspect server
    let listen_addr = config.parsed_listen_addr()?;
    let server = IntrospectServer::new(listen_addr, pool.clone());
    let server_token = token.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run(server_token).await {
            error!("Introspect server error: {}", e);
        }
    });

    info!(
        "All components started. Introspect endpoint on {}, node id: {}",
        listen_addr, config.node_id
    );

    // Wait for shutdown signal (SIGINT or SIGTERM)
    let sig = shutdown_signal().await;
    info!("Received {}, shutting down gracefully...", sig);
    token.cancel();

    // Wait for all tasks to finish with a timeout
    let shutdown_timeout = std::time::Duration::from_secs(5);
    let _ = tokio::time::timeout(shutdown_timeout, async {
        let _ = tokio::join!(supervisor_handle, server_handle);
    })
    .await;

    info!("Shutdown complete");

    Ok(())
}
