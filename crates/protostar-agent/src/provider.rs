use crate::error::{AgentError, Result};
use async_trait::async_trait;
use protostar_core::{expand_prefix, AddressRecord};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use tokio::sync::Mutex;
use tracing::debug;

/// Client surface of the upstream address provider.
///
/// Implementations create and release whole CIDR prefixes on behalf of a
/// node and can report the authoritative list of addresses the node holds.
/// Every call may fail; the pool recovers from failed jobs through a
/// re-sync round, so implementations should report errors rather than retry
/// internally.
#[async_trait]
pub trait AddressProvider: Send + Sync {
    /// Allocate `prefix_count` new prefixes to the node
    async fn create_prefixes(&self, node_id: &str, prefix_count: usize) -> Result<Vec<String>>;

    /// Release the listed prefixes
    async fn delete_prefixes(&self, node_id: &str, prefixes: &[String]) -> Result<()>;

    /// The authoritative list of addresses currently allocated to the node
    async fn list_addresses(&self, node_id: &str) -> Result<Vec<AddressRecord>>;
}

/// In-memory provider for development and tests.
///
/// Carves sequential prefixes out of a base block and keeps their expansions
/// as the upstream truth. Failures can be injected per call to exercise the
/// pool's re-sync path.
pub struct MockProvider {
    base_cidr: String,
    base: u32,
    block_count: u32,
    prefix_size: usize,
    prefix_len: u8,
    state: Mutex<MockProviderState>,
}

#[derive(Default)]
struct MockProviderState {
    next_block: u32,
    allocated: BTreeMap<String, Vec<AddressRecord>>,
    fail_injections: usize,
}

impl MockProvider {
    /// Create a provider carving `prefix_size`-address prefixes out of
    /// `base_cidr` (e.g. "10.88.0.0/16")
    pub fn new(base_cidr: &str, prefix_size: usize) -> Result<Self> {
        if !prefix_size.is_power_of_two() || prefix_size.trailing_zeros() > 31 {
            return Err(AgentError::invalid_config(
                format!("prefix_size {prefix_size} is not a power of two"),
                "Use the number of host addresses per prefix, e.g. 16 for a /28",
            ));
        }

        let (addr_part, len_part) = base_cidr.split_once('/').ok_or_else(|| {
            AgentError::invalid_config(
                format!("base block '{base_cidr}' is missing its prefix length"),
                "Use CIDR notation like '10.88.0.0/16'",
            )
        })?;
        let base_addr: Ipv4Addr = addr_part.parse().map_err(|_| {
            AgentError::invalid_config(
                format!("base block '{base_cidr}' has an invalid address"),
                "Use CIDR notation like '10.88.0.0/16'",
            )
        })?;
        let base_len: u8 = len_part.parse().map_err(|_| {
            AgentError::invalid_config(
                format!("base block '{base_cidr}' has an invalid prefix length"),
                "Use CIDR notation like '10.88.0.0/16'",
            )
        })?;
        let prefix_len = 32 - prefix_size.trailing_zeros() as u8;
        if base_len > prefix_len {
            return Err(AgentError::invalid_config(
                format!("base block '{base_cidr}' is smaller than one prefix"),
                "The base block must hold at least one full prefix",
            ));
        }

        let span = 1u64 << (32 - base_len);
        Ok(Self {
            base_cidr: base_cidr.to_string(),
            base: u32::from(base_addr),
            block_count: (span / prefix_size as u64) as u32,
            prefix_size,
            prefix_len,
            state: Mutex::new(MockProviderState::default()),
        })
    }

    /// Make the next `count` provider calls fail
    pub async fn inject_failures(&self, count: usize) {
        self.state.lock().await.fail_injections += count;
    }

    /// Prefixes currently allocated, in address order
    pub async fn allocated_prefixes(&self) -> Vec<String> {
        self.state.lock().await.allocated.keys().cloned().collect()
    }

    fn take_injected_failure(state: &mut MockProviderState) -> Result<()> {
        if state.fail_injections > 0 {
            state.fail_injections -= 1;
            return Err(AgentError::provider("injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl AddressProvider for MockProvider {
    async fn create_prefixes(&self, node_id: &str, prefix_count: usize) -> Result<Vec<String>> {
        let mut state = self.state.lock().await;
        Self::take_injected_failure(&mut state)?;

        let mut prefixes = Vec::with_capacity(prefix_count);
        for _ in 0..prefix_count {
            if state.next_block == self.block_count {
                return Err(AgentError::prefixes_exhausted(&self.base_cidr));
            }
            let block_base = self.base + state.next_block * self.prefix_size as u32;
            state.next_block += 1;

            let prefix = format!("{}/{}", Ipv4Addr::from(block_base), self.prefix_len);
            let records = expand_prefix(&prefix, self.prefix_size)?
                .into_iter()
                .map(|address| AddressRecord::new(address, prefix.clone()))
                .collect();
            state.allocated.insert(prefix.clone(), records);
            prefixes.push(prefix);
        }

        debug!(node_id, ?prefixes, "allocated prefixes");
        Ok(prefixes)
    }

    async fn delete_prefixes(&self, node_id: &str, prefixes: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::take_injected_failure(&mut state)?;

        for prefix in prefixes {
            if state.allocated.remove(prefix).is_none() {
                return Err(AgentError::provider(format!(
                    "prefix '{prefix}' is not allocated to node '{node_id}'"
                )));
            }
        }

        debug!(node_id, ?prefixes, "released prefixes");
        Ok(())
    }

    async fn list_addresses(&self, _node_id: &str) -> Result<Vec<AddressRecord>> {
        let mut state = self.state.lock().await;
        Self::take_injected_failure(&mut state)?;

        Ok(state.allocated.values().flatten().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_allocates_sequential_blocks() {
        let provider = MockProvider::new("10.88.0.0/24", 16).unwrap();

        let first = provider.create_prefixes("node-1", 2).await.unwrap();
        assert_eq!(first, vec!["10.88.0.0/28", "10.88.0.16/28"]);

        let second = provider.create_prefixes("node-1", 1).await.unwrap();
        assert_eq!(second, vec!["10.88.0.32/28"]);
    }

    #[tokio::test]
    async fn test_list_returns_expansions() {
        let provider = MockProvider::new("10.88.0.0/24", 16).unwrap();
        provider.create_prefixes("node-1", 1).await.unwrap();

        let addresses = provider.list_addresses("node-1").await.unwrap();
        assert_eq!(addresses.len(), 16);
        assert_eq!(addresses[0].address, Ipv4Addr::new(10, 88, 0, 0));
        assert_eq!(addresses[15].address, Ipv4Addr::new(10, 88, 0, 15));
        assert!(addresses.iter().all(|r| r.prefix_origin == "10.88.0.0/28"));
    }

    #[tokio::test]
    async fn test_delete_removes_allocation() {
        let provider = MockProvider::new("10.88.0.0/24", 16).unwrap();
        let prefixes = provider.create_prefixes("node-1", 2).await.unwrap();

        provider
            .delete_prefixes("node-1", &prefixes[..1])
            .await
            .unwrap();
        assert_eq!(
            provider.allocated_prefixes().await,
            vec!["10.88.0.16/28".to_string()]
        );
    }

    #[tokio::test]
    async fn test_delete_unknown_prefix_fails() {
        let provider = MockProvider::new("10.88.0.0/24", 16).unwrap();
        let result = provider
            .delete_prefixes("node-1", &["10.99.0.0/28".to_string()])
            .await;
        assert!(matches!(result.unwrap_err(), AgentError::Provider { .. }));
    }

    #[tokio::test]
    async fn test_exhaustion() {
        // A /27 base holds exactly two /28 prefixes
        let provider = MockProvider::new("10.88.0.0/27", 16).unwrap();
        provider.create_prefixes("node-1", 2).await.unwrap();

        let result = provider.create_prefixes("node-1", 1).await;
        assert!(matches!(
            result.unwrap_err(),
            AgentError::PrefixesExhausted { .. }
        ));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let provider = MockProvider::new("10.88.0.0/24", 16).unwrap();
        provider.inject_failures(1).await;

        assert!(provider.create_prefixes("node-1", 1).await.is_err());
        assert!(provider.create_prefixes("node-1", 1).await.is_ok());
    }

    #[test]
    fn test_rejects_bad_base_block() {
        assert!(MockProvider::new("not-a-cidr", 16).is_err());
        assert!(MockProvider::new("10.88.0.0", 16).is_err());
        // A /30 base cannot hold a /28 prefix
        assert!(MockProvider::new("10.88.0.0/30", 16).is_err());
        assert!(MockProvider::new("10.88.0.0/24", 12).is_err());
    }
}
