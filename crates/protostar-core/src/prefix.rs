use crate::error::{CoreError, Result};
use crate::types::AddressRecord;
use std::collections::HashSet;
use std::net::Ipv4Addr;

/// Expand a CIDR block like "10.0.1.0/28" into its host addresses.
///
/// Enumeration is over the 32-bit integer representation of the base address,
/// so blocks that span an octet boundary (e.g. a /23) expand correctly. The
/// prefix length must match `prefix_size` exactly and the base address must be
/// the network address of its own block.
pub fn expand_prefix(cidr: &str, prefix_size: usize) -> Result<Vec<Ipv4Addr>> {
    let (addr_part, len_part) = cidr
        .split_once('/')
        .ok_or_else(|| CoreError::invalid_prefix(cidr, "missing '/<length>'"))?;

    let base: Ipv4Addr = addr_part
        .parse()
        .map_err(|_| CoreError::invalid_prefix(cidr, "base is not an IPv4 address"))?;

    let prefix_len: u8 = len_part
        .parse()
        .map_err(|_| CoreError::invalid_prefix(cidr, "prefix length is not a number"))?;
    if prefix_len > 32 {
        return Err(CoreError::invalid_prefix(
            cidr,
            "prefix length out of range (0-32)",
        ));
    }

    let block_size = 1u64 << (32 - prefix_len);
    if block_size != prefix_size as u64 {
        return Err(CoreError::invalid_prefix(
            cidr,
            format!(
                "/{} holds {} addresses, pool expects {} per prefix",
                prefix_len, block_size, prefix_size
            ),
        ));
    }

    let base_u32 = u32::from(base);
    let mask = if prefix_len == 0 {
        0
    } else {
        !((1u32 << (32 - prefix_len)) - 1)
    };
    if base_u32 & mask != base_u32 {
        return Err(CoreError::invalid_prefix(
            cidr,
            "base address is not aligned to the prefix length",
        ));
    }

    // Alignment guarantees the block cannot run past the end of the address
    // space, so plain addition is safe here.
    Ok((0..prefix_size as u32)
        .map(|i| Ipv4Addr::from(base_u32 + i))
        .collect())
}

/// Return the records of `a` whose address is not present in `b`.
///
/// Membership is decided by the address alone; the prefix origin is carried
/// through to the output untouched.
pub fn difference(a: &[AddressRecord], b: &[AddressRecord]) -> Vec<AddressRecord> {
    let present: HashSet<Ipv4Addr> = b.iter().map(|record| record.address).collect();
    a.iter()
        .filter(|record| !present.contains(&record.address))
        .cloned()
        .collect()
}
