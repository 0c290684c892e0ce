use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a warm address pool.
///
/// The cool down period is (de)serialized as whole seconds, so a config
/// file says `cool_down_period: 30` rather than spelling out a nested
/// duration struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmPoolConfig {
    /// Target number of addresses kept ready in the warm pool
    pub desired_size: usize,
    /// Tolerated deviation from `desired_size` before reconciliation acts
    pub max_deviation: usize,
    /// How long a freed address is quarantined before it may be handed out again
    #[serde(with = "duration_secs")]
    pub cool_down_period: Duration,
    /// Number of host addresses per upstream prefix (16 for a /28)
    pub prefix_size: usize,
}

/// (De)serialize a `Duration` as whole seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for WarmPoolConfig {
    fn default() -> Self {
        Self {
            desired_size: 16,
            max_deviation: 2,
            cool_down_period: Duration::from_secs(30),
            prefix_size: 16,
        }
    }
}

impl WarmPoolConfig {
    /// Validate the configuration.
    ///
    /// The prefix size must be a nonzero power of two so that it corresponds
    /// to an exact CIDR prefix length.
    pub fn validate(&self) -> Result<()> {
        if self.prefix_size == 0 {
            return Err(CoreError::invalid_config(
                "prefix_size must be greater than 0",
                "Use the number of host addresses per upstream block, e.g. 16 for a /28",
            ));
        }
        if !self.prefix_size.is_power_of_two() || self.prefix_size.trailing_zeros() > 31 {
            return Err(CoreError::invalid_config(
                format!(
                    "prefix_size {} does not correspond to a CIDR prefix length",
                    self.prefix_size
                ),
                "Use a power of two, e.g. 16 for a /28 or 32 for a /27",
            ));
        }
        Ok(())
    }

    /// The CIDR prefix length matching `prefix_size` (e.g. 28 for 16 addresses)
    pub fn prefix_len(&self) -> u8 {
        32 - self.prefix_size.trailing_zeros() as u8
    }
}
