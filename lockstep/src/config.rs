//! The external configuration surface: `localAddress`, `localPort`, `updates`, `lag`,
//! `timeoutSeconds`, loaded from a TOML file with an `.expect()`-on-failure loader —
//! a bad config file is not something this crate tries to recover from.

use serde_derive::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_PORT: u16 = 6660;
pub const DEFAULT_UPDATES: u32 = 5;
pub const DEFAULT_LAG: u32 = 10;
pub const DEFAULT_TIMEOUT_SECONDS: u32 = 45;
pub const DEFAULT_MAX_PEERS: usize = 8;
pub const BIND_RETRY_PORTS: u16 = 10;

#[derive(Serialize, Deserialize)]
pub struct Network {
    pub local_address: Option<String>,
    pub local_port: u16,
    pub updates: u32,
    pub lag: u32,
    pub timeout_seconds: u32,
    pub max_peers: usize,
}

#[derive(Serialize, Deserialize)]
pub struct EngineConfig {
    pub network: Network,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            network: Network {
                local_address: None,
                local_port: DEFAULT_PORT,
                updates: DEFAULT_UPDATES,
                lag: DEFAULT_LAG,
                timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
                max_peers: DEFAULT_MAX_PEERS,
            },
        }
    }
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> EngineConfig {
        let mut config: EngineConfig =
            serdeconv::from_toml_file(path).expect("Error loading engine configuration file");
        config.normalize();
        config
    }

    /// `lag` must be a multiple of `updates` (§4.E); re-rounds down rather than
    /// merely documenting the constraint.
    pub fn normalize(&mut self) {
        let updates = self.network.updates.max(1);
        self.network.lag = (self.network.lag / updates) * updates;
    }

    pub fn updates(&self) -> u32 {
        self.network.updates
    }

    pub fn lag(&self) -> u32 {
        self.network.lag
    }

    pub fn timeout_seconds(&self) -> u32 {
        self.network.timeout_seconds
    }

    pub fn max_peers(&self) -> usize {
        self.network.max_peers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lag_is_already_a_multiple_of_updates() {
        let config = EngineConfig::default();
        assert_eq!(config.network.lag % config.network.updates, 0);
    }

    #[test]
    fn normalize_rounds_lag_down_to_a_multiple_of_updates() {
        let mut config = EngineConfig::default();
        config.network.updates = 5;
        config.network.lag = 13;
        config.normalize();
        assert_eq!(config.network.lag, 10);
    }

    #[test]
    fn normalize_handles_zero_updates_without_dividing_by_zero() {
        let mut config = EngineConfig::default();
        config.network.updates = 0;
        config.network.lag = 13;
        config.normalize();
        assert_eq!(config.network.lag, 13);
    }
}
