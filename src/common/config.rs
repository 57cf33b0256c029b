use std::time::Duration;

use tracing::warn;

pub const DEFAULT_GOSSIP_INTERVAL_MS: u64 = 50;
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Runtime knobs for a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Anti-entropy tick.
    pub gossip_interval: Duration,
    /// How long a completion task waits for a gossip reply before dropping it.
    pub rpc_timeout: Duration,
    /// Filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            gossip_interval: Duration::from_millis(DEFAULT_GOSSIP_INTERVAL_MS),
            rpc_timeout: Duration::from_millis(DEFAULT_RPC_TIMEOUT_MS),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Config::default();
        if let Some(ms) = millis(&lookup, "GOSSIP_INTERVAL_MS") {
            config.gossip_interval = ms;
        }
        if let Some(ms) = millis(&lookup, "GOSSIP_RPC_TIMEOUT_MS") {
            config.rpc_timeout = ms;
        }
        if let Some(level) = lookup("GOSSIP_LOG") {
            config.log_level = level;
        }
        config
    }

    pub fn with_gossip_interval(mut self, interval: Duration) -> Self {
        self.gossip_interval = interval;
        self
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    match raw.parse::<u64>() {
        Ok(0) | Err(_) => {
            warn!(key, value = %raw, "ignoring invalid duration, using default");
            None
        }
        Ok(ms) => Some(Duration::from_millis(ms)),
    }
}
