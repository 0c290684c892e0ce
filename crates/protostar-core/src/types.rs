use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// An assignable IPv4 address together with the CIDR block it was carved from.
///
/// Identity for membership tests is the `address` field alone; `prefix_origin`
/// is bookkeeping that lets the pool release whole blocks back upstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressRecord {
    /// IPv4 address handed to workloads
    pub address: Ipv4Addr,
    /// CIDR block this address was expanded from (e.g. "10.0.1.0/28")
    pub prefix_origin: String,
}

impl AddressRecord {
    /// Create a new address record
    pub fn new(address: Ipv4Addr, prefix_origin: impl Into<String>) -> Self {
        Self {
            address,
            prefix_origin: prefix_origin.into(),
        }
    }
}

impl fmt::Display for AddressRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.address, self.prefix_origin)
    }
}
