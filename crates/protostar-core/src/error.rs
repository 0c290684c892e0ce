// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for Protostar operations
#[derive(Error, Debug, Diagnostic)]
pub enum CoreError {
    /// A CIDR block could not be expanded into pool addresses
    #[error("Invalid prefix '{prefix}': {reason}")]
    #[diagnostic(
        code(protostar::invalid_prefix),
        help("Prefixes must be IPv4 CIDR blocks like '10.0.1.0/28', aligned to their own mask and matching the configured prefix size")
    )]
    InvalidPrefix {
        #[allow(unused)]
        prefix: String,
        #[allow(unused)]
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(protostar::invalid_config), help("{suggestion}"))]
    InvalidConfig {
        #[allow(unused)]
        message: String,
        #[allow(unused)]
        suggestion: String,
    },
}

/// Result type alias for Protostar core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create an InvalidPrefix error
    pub fn invalid_prefix(prefix: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPrefix {
            prefix: prefix.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidConfig error
    pub fn invalid_config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }
}
