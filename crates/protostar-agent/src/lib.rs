//! Protostar Agent - node-side glue around the warm address pool
//!
//! The agent owns everything the pool itself deliberately does not:
//! - the provider client that creates and deletes prefixes upstream
//!   (a `MockProvider` stands in for development and tests)
//! - the asynchronous worker that executes pool jobs and feeds outcomes back
//! - the supervisor loop driving cooldown sweeps and reconcile passes
//! - the read-only introspection HTTP endpoint
//! - configuration loading

pub mod config;
pub mod error;
pub mod provider;
pub mod server;
pub mod supervisor;
pub mod worker;

// Re-export primary types
pub use config::AgentConfig;
pub use error::{AgentError, Result};
pub use provider::{AddressProvider, MockProvider};
pub use server::IntrospectServer;
pub use supervisor::{PoolSupervisor, SupervisorConfig};
pub use worker::JobWorker;
