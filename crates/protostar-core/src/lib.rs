//! Protostar Core - Fundamental types for the Protostar warm-pool IP manager
//!
//! This crate provides:
//! - The address record handed out to workloads
//! - Prefix arithmetic (expanding a CIDR block into its host addresses)
//! - Address-set difference used during upstream reconciliation
//! - Warm-pool configuration
//! - Error types with miette diagnostics

pub mod config;
pub mod error;
pub mod prefix;
pub mod types;

// Re-export commonly used types
pub use config::WarmPoolConfig;
pub use error::{CoreError, Result};
pub use prefix::{difference, expand_prefix};
pub use types::AddressRecord;
