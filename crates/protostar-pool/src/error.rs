// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors surfaced to callers of the assignment API.
///
/// This is a closed set so the node agent can match exhaustively; `label()`
/// yields a stable identifier suitable for metric labels.
#[derive(Error, Debug, Diagnostic)]
pub enum PoolError {
    /// The requester already holds an address
    #[error("an address is already assigned to requester '{requester_id}'")]
    #[diagnostic(
        code(protostar::pool::already_assigned),
        help("Free the existing address before requesting a new one")
    )]
    AlreadyAssigned {
        #[allow(unused)]
        requester_id: String,
    },

    /// Every address the node can hold is assigned
    #[error("cannot assign any more addresses from the warm pool")]
    #[diagnostic(
        code(protostar::pool::at_max_capacity),
        help("The node is at capacity. Free an address or move the workload to another node")
    )]
    AtMaxCapacity,

    /// Capacity is consumed by addresses waiting out their cooldown
    #[error("cannot assign an address now, freed addresses are cooling down")]
    #[diagnostic(
        code(protostar::pool::cooling_down),
        help("Retry within the cool down period; quarantined addresses return to the warm pool on expiry")
    )]
    CoolingDown,

    /// Capacity is consumed by in-flight create/delete jobs
    #[error("cannot assign an address now, addresses are being created upstream")]
    #[diagnostic(
        code(protostar::pool::creating_resources),
        help("Retry after typical provider latency; an asynchronous job is already in flight")
    )]
    CreatingResources,

    /// The warm pool is empty but there is room to grow
    #[error("warm pool is empty")]
    #[diagnostic(
        code(protostar::pool::warm_pool_empty),
        help("Trigger a reconcile pass to request more addresses, then retry")
    )]
    WarmPoolEmpty,

    /// The requester holds nothing
    #[error("no address is assigned to requester '{requester_id}'")]
    #[diagnostic(
        code(protostar::pool::doesnt_exist),
        help("Verify the requester id; the address may have been freed already")
    )]
    DoesntExist {
        #[allow(unused)]
        requester_id: String,
    },

    /// The requester holds a different address than the one being freed
    #[error("address '{address}' does not belong to requester '{requester_id}'")]
    #[diagnostic(
        code(protostar::pool::incorrect_owner),
        help("Free the address actually assigned to this requester")
    )]
    IncorrectOwner {
        #[allow(unused)]
        requester_id: String,
        #[allow(unused)]
        address: Ipv4Addr,
    },
}

/// Result type alias for pool assignment operations
pub type Result<T> = std::result::Result<T, PoolError>;

impl PoolError {
    /// Create an AlreadyAssigned error
    pub fn already_assigned(requester_id: impl Into<String>) -> Self {
        Self::AlreadyAssigned {
            requester_id: requester_id.into(),
        }
    }

    /// Create a DoesntExist error
    pub fn doesnt_exist(requester_id: impl Into<String>) -> Self {
        Self::DoesntExist {
            requester_id: requester_id.into(),
        }
    }

    /// Create an IncorrectOwner error
    pub fn incorrect_owner(requester_id: impl Into<String>, address: Ipv4Addr) -> Self {
        Self::IncorrectOwner {
            requester_id: requester_id.into(),
            address,
        }
    }

    /// Stable identifier for this error kind, usable as a metric label
    pub fn label(&self) -> &'static str {
        match self {
            Self::AlreadyAssigned { .. } => "AlreadyAssigned",
            Self::AtMaxCapacity => "AtMaxCapacity",
            Self::CoolingDown => "CoolingDown",
            Self::CreatingResources => "CreatingResources",
            Self::WarmPoolEmpty => "WarmPoolEmpty",
            Self::DoesntExist { .. } => "DoesntExist",
            Self::IncorrectOwner { .. } => "IncorrectOwner",
        }
    }

    /// Whether the caller may retry the same request after a short wait
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CoolingDown | Self::CreatingResources | Self::WarmPoolEmpty
        )
    }

    /// Whether this failure should prompt the caller to run a reconcile pass
    pub fn triggers_reconcile(&self) -> bool {
        matches!(self, Self::WarmPoolEmpty)
    }
}
