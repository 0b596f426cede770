//! Configuration subsections.
//!
//! All the `csl.*` and `wakeup.*` parameters: MAC request lead times, the
//! transmission attempt cap, coordinator table sizing and eviction, and
//! wake-up burst defaults.

use serde::{Deserialize, Serialize};

/// Enhanced CSL transmission (`csl.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CslConfig {
    /// How much ahead of a target slot MAC operations are requested, in
    /// microseconds (`csl.request_ahead_us`). Bus transfer time is added on
    /// top at startup.
    #[serde(default = "CslConfig::default_request_ahead_us")]
    pub request_ahead_us: u32,

    /// Transmission attempts per frame before a peer is considered out of
    /// sync (`csl.max_tx_attempts`). Peers may carry their own override.
    #[serde(default = "CslConfig::default_max_tx_attempts")]
    pub max_tx_attempts: u8,
}

impl Default for CslConfig {
    fn default() -> Self {
        Self {
            request_ahead_us: 2000,
            max_tx_attempts: 4,
        }
    }
}

impl CslConfig {
    fn default_request_ahead_us() -> u32 { 2000 }
    fn default_max_tx_attempts() -> u8 { 4 }
}

/// Wake-up sequence and coordinator table (`wakeup.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WakeupConfig {
    /// Capacity of the trusted coordinator table (`wakeup.max_coordinators`).
    #[serde(default = "WakeupConfig::default_max_coordinators")]
    pub max_coordinators: usize,

    /// Minimum entry age before eviction, in seconds
    /// (`wakeup.coordinator_evict_age_secs`).
    #[serde(default = "WakeupConfig::default_coordinator_evict_age_secs")]
    pub coordinator_evict_age_secs: u32,

    /// Connection IE retry interval, in wake-up frame intervals
    /// (`wakeup.connection_retry_interval`).
    #[serde(default = "WakeupConfig::default_connection_retry_interval")]
    pub connection_retry_interval: u8,

    /// Connection IE retry count (`wakeup.connection_retry_count`).
    #[serde(default = "WakeupConfig::default_connection_retry_count")]
    pub connection_retry_count: u8,

    /// Default interval between wake-up frames, in microseconds
    /// (`wakeup.interval_us`).
    #[serde(default = "WakeupConfig::default_interval_us")]
    pub interval_us: u16,

    /// Default wake-up sequence duration, in milliseconds
    /// (`wakeup.duration_ms`).
    #[serde(default = "WakeupConfig::default_duration_ms")]
    pub duration_ms: u16,
}

impl Default for WakeupConfig {
    fn default() -> Self {
        Self {
            max_coordinators: 8,
            coordinator_evict_age_secs: 600,
            connection_retry_interval: 4,
            connection_retry_count: 8,
            interval_us: 10_000,
            duration_ms: 1_000,
        }
    }
}

impl WakeupConfig {
    fn default_max_coordinators() -> usize { 8 }
    fn default_coordinator_evict_age_secs() -> u32 { 600 }
    fn default_connection_retry_interval() -> u8 { 4 }
    fn default_connection_retry_count() -> u8 { 8 }
    fn default_interval_us() -> u16 { 10_000 }
    fn default_duration_ms() -> u16 { 1_000 }
}
