//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     SUMMIT_MAX_ATTEMPTS=12                                              │
//! │     SUMMIT_MAX_CONCURRENT_PUSH=2                                        │
//! │                                                                         │
//! │  2. TOML Config File                                                    │
//! │     ~/.config/summit/sync.toml (Linux)                                  │
//! │     ~/Library/Application Support/com.summit.app/sync.toml (macOS)      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [queue]
//! max_attempts = 8
//! base_backoff_ms = 500
//! backoff_cap_ms = 60000
//! aging_threshold_cycles = 5
//!
//! [drain]
//! pull_batch_size = 100
//! max_concurrent_push = 4
//! push_timeout_secs = 10
//! tick_interval_secs = 30
//!
//! [connectivity]
//! debounce_ms = 1500
//!
//! [policies]
//! evaluation = "user_arbitration"  # override the built-in default
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use summit_core::{ConflictPolicy, EntityType, PolicyTable};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Queue Settings
// =============================================================================

/// Retry and aging behavior of the operation queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Delivery attempts before an operation is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,

    /// Base backoff duration (milliseconds). Retry n waits
    /// `min(base * 2^n, cap) + jitter`.
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,

    /// Backoff cap (milliseconds).
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_ms: u64,

    /// Drain cycles an operation may sit due-but-undequeued before its
    /// effective priority is promoted one tier. 0 disables the boost.
    #[serde(default = "default_aging_threshold")]
    pub aging_threshold_cycles: i64,
}

fn default_max_attempts() -> i64 {
    8
}
fn default_base_backoff() -> u64 {
    500
}
fn default_backoff_cap() -> u64 {
    60_000
}
fn default_aging_threshold() -> i64 {
    5
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff(),
            backoff_cap_ms: default_backoff_cap(),
            aging_threshold_cycles: default_aging_threshold(),
        }
    }
}

// =============================================================================
// Drain Settings
// =============================================================================

/// Drain and pull behavior of the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainSettings {
    /// Operations fetched per drain round.
    #[serde(default = "default_drain_batch_size")]
    pub drain_batch_size: u32,

    /// Deltas requested per pull page.
    #[serde(default = "default_pull_batch_size")]
    pub pull_batch_size: u32,

    /// Entity-type lanes pushed concurrently. Operations within one lane
    /// stay strictly ordered.
    #[serde(default = "default_max_concurrent_push")]
    pub max_concurrent_push: usize,

    /// Deadline for a single push call (seconds); exceeding it counts as
    /// a transient failure.
    #[serde(default = "default_push_timeout")]
    pub push_timeout_secs: u64,

    /// Interval between periodic sync cycles while online (seconds).
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
}

fn default_drain_batch_size() -> u32 {
    50
}
fn default_pull_batch_size() -> u32 {
    100
}
fn default_max_concurrent_push() -> usize {
    4
}
fn default_push_timeout() -> u64 {
    10
}
fn default_tick_interval() -> u64 {
    30
}

impl Default for DrainSettings {
    fn default() -> Self {
        DrainSettings {
            drain_batch_size: default_drain_batch_size(),
            pull_batch_size: default_pull_batch_size(),
            max_concurrent_push: default_max_concurrent_push(),
            push_timeout_secs: default_push_timeout(),
            tick_interval_secs: default_tick_interval(),
        }
    }
}

// =============================================================================
// Connectivity Settings
// =============================================================================

/// Reachability debounce behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivitySettings {
    /// A reported reachability state must hold this long (milliseconds)
    /// before a transition is published to subscribers. Absorbs brief
    /// flaps that would otherwise trigger wasted drain cycles.
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
}

fn default_debounce() -> u64 {
    1_500
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        ConnectivitySettings {
            debounce_ms: default_debounce(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Queue retry/aging settings.
    #[serde(default)]
    pub queue: QueueSettings,

    /// Coordinator drain/pull settings.
    #[serde(default)]
    pub drain: DrainSettings,

    /// Connectivity monitor settings.
    #[serde(default)]
    pub connectivity: ConnectivitySettings,

    /// Per-entity-type conflict policy overrides; unlisted types use the
    /// built-in defaults.
    #[serde(default)]
    pub policies: HashMap<EntityType, ConflictPolicy>,
}

impl SyncConfig {
    /// Creates a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns defaults if the load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.queue.max_attempts <= 0 {
            return Err(SyncError::InvalidConfig(
                "max_attempts must be greater than 0".into(),
            ));
        }

        if self.queue.backoff_cap_ms < self.queue.base_backoff_ms {
            return Err(SyncError::InvalidConfig(
                "backoff_cap_ms must be >= base_backoff_ms".into(),
            ));
        }

        if self.drain.pull_batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "pull_batch_size must be greater than 0".into(),
            ));
        }

        if self.drain.drain_batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "drain_batch_size must be greater than 0".into(),
            ));
        }

        if self.drain.max_concurrent_push == 0 {
            return Err(SyncError::InvalidConfig(
                "max_concurrent_push must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SUMMIT_MAX_ATTEMPTS") {
            if let Ok(n) = v.parse::<i64>() {
                debug!(max_attempts = n, "Overriding max_attempts from environment");
                self.queue.max_attempts = n;
            }
        }

        if let Ok(v) = std::env::var("SUMMIT_BASE_BACKOFF_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.queue.base_backoff_ms = n;
            }
        }

        if let Ok(v) = std::env::var("SUMMIT_BACKOFF_CAP_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.queue.backoff_cap_ms = n;
            }
        }

        if let Ok(v) = std::env::var("SUMMIT_AGING_THRESHOLD_CYCLES") {
            if let Ok(n) = v.parse::<i64>() {
                self.queue.aging_threshold_cycles = n;
            }
        }

        if let Ok(v) = std::env::var("SUMMIT_PULL_BATCH_SIZE") {
            if let Ok(n) = v.parse::<u32>() {
                self.drain.pull_batch_size = n;
            }
        }

        if let Ok(v) = std::env::var("SUMMIT_MAX_CONCURRENT_PUSH") {
            if let Ok(n) = v.parse::<usize>() {
                debug!(
                    max_concurrent_push = n,
                    "Overriding max_concurrent_push from environment"
                );
                self.drain.max_concurrent_push = n;
            }
        }

        if let Ok(v) = std::env::var("SUMMIT_TICK_INTERVAL_SECS") {
            if let Ok(n) = v.parse::<u64>() {
                self.drain.tick_interval_secs = n;
            }
        }

        if let Ok(v) = std::env::var("SUMMIT_DEBOUNCE_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.connectivity.debounce_ms = n;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "summit", "app").map(|dirs| {
            let config_dir = dirs.config_dir();
            config_dir.join("sync.toml")
        })
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Builds the conflict policy table: built-in defaults plus the
    /// configured overrides.
    pub fn policy_table(&self) -> PolicyTable {
        let mut table = PolicyTable::new();
        for (entity_type, policy) in &self.policies {
            table = table.with_policy(*entity_type, *policy);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue.max_attempts, 8);
        assert_eq!(config.drain.max_concurrent_push, 4);
        assert_eq!(config.connectivity.debounce_ms, 1_500);
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.queue.max_attempts = 0;
        assert!(config.validate().is_err());

        config.queue.max_attempts = 8;
        config.queue.backoff_cap_ms = 100;
        config.queue.base_backoff_ms = 500;
        assert!(config.validate().is_err());

        config.queue.backoff_cap_ms = 60_000;
        config.drain.max_concurrent_push = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_with_policy_override() {
        let toml_str = r#"
            [queue]
            max_attempts = 12

            [policies]
            evaluation = "user_arbitration"
            media = "server_wins"
        "#;

        let config: SyncConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.queue.max_attempts, 12);
        // Unlisted sections fall back to defaults.
        assert_eq!(config.drain.pull_batch_size, 100);

        let table = config.policy_table();
        assert_eq!(
            table.policy_for(EntityType::Evaluation),
            ConflictPolicy::UserArbitration
        );
        assert_eq!(
            table.policy_for(EntityType::Media),
            ConflictPolicy::ServerWins
        );
        // Unlisted types keep the built-in default.
        assert_eq!(
            table.policy_for(EntityType::Certificate),
            ConflictPolicy::ServerWinsHard
        );
    }

    #[test]
    fn test_toml_serialization() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[queue]"));
        assert!(toml_str.contains("[drain]"));
    }
}
