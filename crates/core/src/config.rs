//! Immutable configuration handed to [crate::manager::NodeManager].
//!
//! Every struct deserializes from partial YAML; missing fields take the defaults in [crate::consts].

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::consts::*;
use crate::error::Error;
use crate::error::Result;

/// Settings of the ring protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DdllConfig {
    pub set_r_timeout_ms: u64,
    pub get_stat_timeout_ms: u64,
    pub find_nearest_timeout_ms: u64,
    pub grace_timeout_ms: u64,
    pub ping_period_ms: u64,
    pub min_fix_interval_ms: u64,
    pub retry_backoff_ms: u64,
    pub insert_max_retry: usize,
    pub delete_max_retry: usize,
    pub fix_max_retry: usize,
    pub find_max_hops: usize,
    pub neighbor_set_size: usize,
}

/// Settings of finger-table maintenance and routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuzakuConfig {
    /// `B` of the branching factor `K = 2^B`.
    pub branching_bits: u32,
    /// Maintain a backward finger table.
    pub use_bft: bool,
    /// Install the farthest entry of a batch only once a later round reached it.
    pub delayed_update: bool,
    /// Alternate forward and backward levels within one pass.
    pub zigzag_update: bool,
    /// Copy the predecessor's tables when insertion completes.
    pub copy_predecessor_table: bool,
    pub max_level: u32,
    pub update_delay_ms: u64,
    pub update_period_ms: u64,
    pub update_level_interval_ms: u64,
    pub rpc_timeout_ms: u64,
    pub lookup_hop_timeout_ms: u64,
    pub lookup_timeout_ms: u64,
    pub lookup_max_retry: usize,
    pub fill_threshold_ms: u64,
    pub entry_backups: usize,
}

/// Everything a node needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub ddll: DdllConfig,
    pub suzaku: SuzakuConfig,
}

impl Default for DdllConfig {
    fn default() -> Self {
        Self {
            set_r_timeout_ms: DEFAULT_SET_R_TIMEOUT_MS,
            get_stat_timeout_ms: DEFAULT_GET_STAT_TIMEOUT_MS,
            find_nearest_timeout_ms: DEFAULT_FIND_NEAREST_TIMEOUT_MS,
            grace_timeout_ms: DEFAULT_GRACE_TIMEOUT_MS,
            ping_period_ms: DEFAULT_PING_PERIOD_MS,
            min_fix_interval_ms: DEFAULT_MIN_FIX_INTERVAL_MS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            insert_max_retry: DEFAULT_INSERT_MAX_RETRY,
            delete_max_retry: DEFAULT_DELETE_MAX_RETRY,
            fix_max_retry: DEFAULT_FIX_MAX_RETRY,
            find_max_hops: DEFAULT_FIND_MAX_HOPS,
            neighbor_set_size: DEFAULT_NEIGHBOR_SET_SIZE,
        }
    }
}

impl Default for SuzakuConfig {
    fn default() -> Self {
        Self {
            branching_bits: DEFAULT_BRANCHING_BITS,
            use_bft: true,
            delayed_update: true,
            zigzag_update: true,
            copy_predecessor_table: true,
            max_level: DEFAULT_MAX_LEVEL,
            update_delay_ms: DEFAULT_UPDATE_DELAY_MS,
            update_period_ms: DEFAULT_UPDATE_PERIOD_MS,
            update_level_interval_ms: DEFAULT_UPDATE_LEVEL_INTERVAL_MS,
            rpc_timeout_ms: DEFAULT_RPC_TIMEOUT_MS,
            lookup_hop_timeout_ms: DEFAULT_LOOKUP_HOP_TIMEOUT_MS,
            lookup_timeout_ms: DEFAULT_LOOKUP_TIMEOUT_MS,
            lookup_max_retry: DEFAULT_LOOKUP_MAX_RETRY,
            fill_threshold_ms: DEFAULT_FILL_THRESHOLD_MS,
            entry_backups: DEFAULT_ENTRY_BACKUPS,
        }
    }
}

impl DdllConfig {
    pub fn set_r_timeout(&self) -> Duration {
        Duration::from_millis(self.set_r_timeout_ms)
    }

    pub fn get_stat_timeout(&self) -> Duration {
        Duration::from_millis(self.get_stat_timeout_ms)
    }

    pub fn find_nearest_timeout(&self) -> Duration {
        Duration::from_millis(self.find_nearest_timeout_ms)
    }

    pub fn grace_timeout(&self) -> Duration {
        Duration::from_millis(self.grace_timeout_ms)
    }

    pub fn ping_period(&self) -> Duration {
        Duration::from_millis(self.ping_period_ms)
    }

    /// Randomized backoff growing with the attempt number.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let factor = (attempt as u64).saturating_add(1);
        let ceiling = self.retry_backoff_ms.saturating_mul(factor);
        Duration::from_millis(rand::random::<u64>() % ceiling.saturating_add(1))
    }
}

impl SuzakuConfig {
    /// The branching factor `K`.
    pub fn branching_factor(&self) -> u64 {
        1 << self.branching_bits
    }

    pub fn update_delay(&self) -> Duration {
        Duration::from_millis(self.update_delay_ms)
    }

    pub fn update_period(&self) -> Duration {
        Duration::from_millis(self.update_period_ms)
    }

    pub fn update_level_interval(&self) -> Duration {
        Duration::from_millis(self.update_level_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn lookup_hop_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_hop_timeout_ms)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

impl NodeConfig {
    /// Reject settings the protocol cannot run with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.suzaku;
        if s.branching_bits == 0 || s.branching_bits > MAX_BRANCHING_BITS {
            return Err(Error::InvalidConfig(format!(
                "branching_bits must be within 1..={MAX_BRANCHING_BITS}, got {}",
                s.branching_bits
            )));
        }
        if s.max_level == 0 || s.max_level > 62 {
            return Err(Error::InvalidConfig(format!(
                "max_level must be within 1..=62, got {}",
                s.max_level
            )));
        }
        let d = &self.ddll;
        if d.neighbor_set_size == 0 {
            return Err(Error::InvalidConfig("neighbor_set_size must be positive".into()));
        }
        let timeouts = [
            ("set_r_timeout_ms", d.set_r_timeout_ms),
            ("get_stat_timeout_ms", d.get_stat_timeout_ms),
            ("find_nearest_timeout_ms", d.find_nearest_timeout_ms),
            ("grace_timeout_ms", d.grace_timeout_ms),
            ("ping_period_ms", d.ping_period_ms),
            ("rpc_timeout_ms", s.rpc_timeout_ms),
            ("lookup_hop_timeout_ms", s.lookup_hop_timeout_ms),
            ("lookup_timeout_ms", s.lookup_timeout_ms),
            ("update_period_ms", s.update_period_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, v)| *v == 0) {
            return Err(Error::InvalidConfig(format!("{name} must be positive")));
        }
        Ok(())
    }

    /// Parse a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_takes_defaults() {
        let yaml = r#"
ddll:
  neighbor_set_size: 6
suzaku:
  branching_bits: 1
  zigzag_update: false
"#;
        let cfg = NodeConfig::from_yaml(yaml).unwrap();
        assert_eq!(cfg.ddll.neighbor_set_size, 6);
        assert_eq!(cfg.ddll.set_r_timeout_ms, DEFAULT_SET_R_TIMEOUT_MS);
        assert_eq!(cfg.suzaku.branching_factor(), 2);
        assert!(!cfg.suzaku.zigzag_update);
        assert!(cfg.suzaku.use_bft);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = NodeConfig::default();
        assert!(cfg.validate().is_ok());

        cfg.suzaku.branching_bits = 0;
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));

        let mut cfg = NodeConfig::default();
        cfg.ddll.ping_period_ms = 0;
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_backoff_is_bounded() {
        let cfg = DdllConfig::default();
        for attempt in 0..5 {
            let d = cfg.backoff(attempt);
            assert!(d.as_millis() as u64 <= cfg.retry_backoff_ms * (attempt as u64 + 1));
        }
    }

    #[test]
    fn test_backoff_saturates_on_huge_settings() {
        let cfg = DdllConfig {
            retry_backoff_ms: u64::MAX,
            ..Default::default()
        };
        for attempt in [0, 1, usize::MAX] {
            let d = cfg.backoff(attempt);
            assert!(d.as_millis() <= u64::MAX as u128);
        }
    }
}
