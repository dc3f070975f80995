//! Configuration for the catalog sync coordinator.
//!
//! # Example
//!
//! ```
//! use catalog_sync::CatalogSyncConfig;
//! use std::time::Duration;
//!
//! // Minimal config (uses defaults)
//! let config = CatalogSyncConfig::default();
//! assert_eq!(config.dedup_max_entries, 1000);
//! assert_eq!(config.echo_window(), Duration::from_secs(5));
//!
//! // Tuned config
//! let config = CatalogSyncConfig {
//!     merchant_id: Some("MERCHANT_1".into()),
//!     echo_window_ms: 3_000,
//!     catch_up_interval_secs: Some(900),
//!     ..Default::default()
//! };
//! assert_eq!(config.catch_up_interval(), Some(Duration::from_secs(900)));
//! ```

use std::time::Duration;

use serde::Deserialize;

/// How the webhook deduplicator keeps its memory bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DedupEviction {
    /// Drop every remembered identifier once the bound is exceeded.
    BulkClear,
    /// Drop the oldest identifiers first and expire them after the retention period.
    #[default]
    Expiring,
}

/// Configuration for the catalog sync coordinator.
///
/// All fields have sensible defaults. Set `merchant_id` to have webhooks
/// addressed to other merchants ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSyncConfig {
    /// Merchant this client replicates; webhooks for other merchants are ignored
    #[serde(default)]
    pub merchant_id: Option<String>,

    /// Max remembered webhook event ids
    #[serde(default = "default_dedup_max_entries")]
    pub dedup_max_entries: usize,
    /// Minimum spacing between dedup cleanup passes
    #[serde(default = "default_dedup_cleanup_interval_secs")]
    pub dedup_cleanup_interval_secs: u64,
    /// How long an event id is remembered (expiring mode only)
    #[serde(default = "default_dedup_retention_secs")]
    pub dedup_retention_secs: u64,
    #[serde(default)]
    pub dedup_eviction: DedupEviction,

    /// Echo tolerance window around each local write
    #[serde(default = "default_echo_window_ms")]
    pub echo_window_ms: u64,

    /// Trigger queue depth in front of the coordinator
    #[serde(default = "default_command_queue_capacity")]
    pub command_queue_capacity: usize,
    /// Buffered outbound events per subscriber of `subscribe_events()`
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Periodic catch-up sync (None = disabled)
    #[serde(default)]
    pub catch_up_interval_secs: Option<u64>,

    /// Backend base URL for push-token registration
    #[serde(default)]
    pub push_base_url: Option<String>,
    #[serde(default = "default_push_platform")]
    pub push_platform: String,
    #[serde(default = "default_push_timeout_ms")]
    pub push_timeout_ms: u64,
}

fn default_dedup_max_entries() -> usize { 1000 }
fn default_dedup_cleanup_interval_secs() -> u64 { 3600 } // 1 hour
fn default_dedup_retention_secs() -> u64 { 24 * 3600 } // 1 day
fn default_echo_window_ms() -> u64 { 5_000 }
fn default_command_queue_capacity() -> usize { 256 }
fn default_event_channel_capacity() -> usize { 128 }
fn default_push_platform() -> String { "ios".to_string() }
fn default_push_timeout_ms() -> u64 { 10_000 }

impl Default for CatalogSyncConfig {
    fn default() -> Self {
        Self {
            merchant_id: None,
            dedup_max_entries: default_dedup_max_entries(),
            dedup_cleanup_interval_secs: default_dedup_cleanup_interval_secs(),
            dedup_retention_secs: default_dedup_retention_secs(),
            dedup_eviction: DedupEviction::default(),
            echo_window_ms: default_echo_window_ms(),
            command_queue_capacity: default_command_queue_capacity(),
            event_channel_capacity: default_event_channel_capacity(),
            catch_up_interval_secs: None,
            push_base_url: None,
            push_platform: default_push_platform(),
            push_timeout_ms: default_push_timeout_ms(),
        }
    }
}

impl CatalogSyncConfig {
    #[must_use]
    pub fn echo_window(&self) -> Duration {
        Duration::from_millis(self.echo_window_ms)
    }

    #[must_use]
    pub fn dedup_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.dedup_cleanup_interval_secs)
    }

    #[must_use]
    pub fn dedup_retention(&self) -> Duration {
        Duration::from_secs(self.dedup_retention_secs)
    }

    #[must_use]
    pub fn catch_up_interval(&self) -> Option<Duration> {
        self.catch_up_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    #[must_use]
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_uses_defaults() {
        let config: CatalogSyncConfig =
            serde_json::from_str(r#"{"merchant_id": "M1", "dedup_eviction": "bulk_clear"}"#).unwrap();
        assert_eq!(config.merchant_id.as_deref(), Some("M1"));
        assert_eq!(config.dedup_eviction, DedupEviction::BulkClear);
        assert_eq!(config.dedup_max_entries, 1000);
        assert_eq!(config.echo_window_ms, 5_000);
        assert_eq!(config.push_platform, "ios");
    }

    #[test]
    fn test_zero_catch_up_interval_disables() {
        let config = CatalogSyncConfig {
            catch_up_interval_secs: Some(0),
            ..Default::default()
        };
        assert_eq!(config.catch_up_interval(), None);
    }
}
