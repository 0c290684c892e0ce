// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Agent error type for provider and configuration operations
#[derive(Error, Debug, Diagnostic)]
pub enum AgentError {
    /// Provider call failed
    #[error("Provider operation failed: {message}")]
    #[diagnostic(
        code(protostar::agent::provider_error),
        help("The pool schedules a re-sync after a failed job; check provider connectivity and quotas")
    )]
    Provider {
        #[allow(unused)]
        message: String,
    },

    /// The provider ran out of address space to carve prefixes from
    #[error("No prefixes left in the provider block {base_cidr}")]
    #[diagnostic(
        code(protostar::agent::prefixes_exhausted),
        help("Lower the pool's desired size or configure a larger base block")
    )]
    PrefixesExhausted {
        #[allow(unused)]
        base_cidr: String,
    },

    /// Could not read a configuration file
    #[error("Failed to read config file '{path}'")]
    #[diagnostic(
        code(protostar::agent::config_io),
        help("Verify the path exists and is readable")
    )]
    ConfigIo {
        #[allow(unused)]
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Could not parse a configuration file
    #[error("Failed to parse config file '{path}'")]
    #[diagnostic(
        code(protostar::agent::config_parse),
        help("The file must be YAML with the agent's recognized fields")
    )]
    ConfigParse {
        #[allow(unused)]
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(protostar::agent::invalid_config), help("{suggestion}"))]
    InvalidConfig {
        #[allow(unused)]
        message: String,
        #[allow(unused)]
        suggestion: String,
    },

    /// Core library error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] protostar_core::CoreError),
}

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Create a Provider error
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    /// Create a PrefixesExhausted error
    pub fn prefixes_exhausted(base_cidr: impl Into<String>) -> Self {
        Self::PrefixesExhausted {
            base_cidr: base_cidr.into(),
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
