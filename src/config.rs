//! Registry and router configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default lifetime of a stored subscription record (one day).
pub const DEFAULT_SUBSCRIPTION_TTL_SECS: u64 = 86_400;

/// Default period between orphan sweeps (twelve hours).
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 12 * 60 * 60;

/// Which registry implementation to wire up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Indexes live in this process.
    #[default]
    InMemory,
    /// Indexes live in a shared key-value store.
    Distributed,
}

/// Registry configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Storage backend.
    pub backend: BackendKind,

    /// Expiry of primary subscription records in the distributed backend,
    /// refreshed on every insert of the same subscription.
    /// Default: 86400
    pub subscription_ttl_secs: u64,

    /// Period of the orphan sweep.
    /// Default: 43200
    pub cleanup_interval_secs: u64,
}

impl RegistryConfig {
    pub fn subscription_ttl(&self) -> Duration {
        Duration::from_secs(self.subscription_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::InMemory,
            subscription_ttl_secs: DEFAULT_SUBSCRIPTION_TTL_SECS,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
        }
    }
}

/// Exchange names used when routing outbound messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Exchange carrying per-session traffic.
    pub session_exchange: String,

    /// Exchange the resource owners listen on for fresh-state requests.
    pub snapshot_requested_exchange: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            session_exchange: "session".to_string(),
            snapshot_requested_exchange: "snapshot-requested".to_string(),
        }
    }
}
