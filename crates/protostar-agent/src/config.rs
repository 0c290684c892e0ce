use crate::error::{AgentError, Result};
use crate::supervisor::SupervisorConfig;
use protostar_core::WarmPoolConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Agent configuration, loadable from a YAML file.
///
/// Unset fields fall back to their defaults; unknown fields are rejected so
/// a typo never silently runs with defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Identifier this node presents to the provider
    pub node_id: String,
    /// Maximum number of addresses the node may hold
    pub capacity: usize,
    /// Target warm pool size
    pub desired_size: usize,
    /// Tolerated deviation from the target before reconciliation acts
    pub max_deviation: usize,
    /// Seconds a freed address stays quarantined
    pub cool_down_seconds: u64,
    /// Host addresses per provider prefix (16 for a /28)
    pub prefix_size: usize,
    /// Seconds between periodic reconcile passes
    pub reconcile_interval_seconds: u64,
    /// Bind address for the introspection endpoint
    pub listen_addr: String,
    /// Base block the mock provider carves prefixes from
    pub base_cidr: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            node_id: "protostar-node".to_string(),
            capacity: 64,
            desired_size: 16,
            max_deviation: 2,
            cool_down_seconds: 30,
            prefix_size: 16,
            reconcile_interval_seconds: 5,
            listen_addr: "127.0.0.1:7171".to_string(),
            base_cidr: "10.88.0.0/16".to_string(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| AgentError::ConfigIo {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self =
            serde_yaml::from_str(&contents).map_err(|e| AgentError::ConfigParse {
                path: path.display().to_string(),
                source: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.warm_pool_config().validate()?;

        if self.desired_size > self.capacity {
            return Err(AgentError::invalid_config(
                format!(
                    "desired_size {} exceeds capacity {}",
                    self.desired_size, self.capacity
                ),
                "Keep the warm target within the node's address capacity",
            ));
        }
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(AgentError::invalid_config(
                format!("listen_addr '{}' is not a socket address", self.listen_addr),
                "Use an address like '127.0.0.1:7171'",
            ));
        }
        Ok(())
    }

    /// The pool-level slice of this configuration
    pub fn warm_pool_config(&self) -> WarmPoolConfig {
        WarmPoolConfig {
            desired_size: self.desired_size,
            max_deviation: self.max_deviation,
            cool_down_period: Duration::from_secs(self.cool_down_seconds),
            prefix_size: self.prefix_size,
        }
    }

    /// The supervisor-level slice of this configuration
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            reconcile_interval: Duration::from_secs(self.reconcile_interval_seconds),
        }
    }

    /// The parsed introspection bind address. Call after `validate()`.
    pub fn parsed_listen_addr(&self) -> Result<SocketAddr> {
        self.listen_addr.parse().map_err(|_| {
            AgentError::invalid_config(
                format!("listen_addr '{}' is not a socket address", self.listen_addr),
                "Use an address like '127.0.0.1:7171'",
            )
        })
    }
}
