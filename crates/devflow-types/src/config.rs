//! Engine configuration types for devflow.
//!
//! `EngineConfig` represents the top-level `config.toml` that controls retry
//! backoff, event channel sizing, and settings for the built-in executors.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the devflow engine.
///
/// Loaded from `~/.devflow/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Wait applied between retry attempts.
    #[serde(default)]
    pub retry_backoff: BackoffPolicy,

    /// Capacity of the broadcast channel carrying workflow events.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Root directory for file operation steps. Defaults to `<data_dir>/workspace`.
    #[serde(default)]
    pub workspace_dir: Option<PathBuf>,

    /// Request timeout for `api_call` steps, in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_event_capacity() -> usize {
    1024
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_backoff: BackoffPolicy::default(),
            event_capacity: default_event_capacity(),
            workspace_dir: None,
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

/// Delay schedule between retry attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Same delay before every retry.
    Fixed {
        #[serde(default = "default_fixed_delay_ms")]
        delay_ms: u64,
    },
    /// `initial_ms * multiplier^(attempt-1)`, capped at `max_ms`.
    Exponential {
        initial_ms: u64,
        #[serde(default = "default_multiplier")]
        multiplier: f64,
        max_ms: u64,
    },
    /// `base_ms` plus a uniformly random extra of up to `max_jitter_ms`.
    Jittered { base_ms: u64, max_jitter_ms: u64 },
}

fn default_fixed_delay_ms() -> u64 {
    5_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Fixed {
            delay_ms: default_fixed_delay_ms(),
        }
    }
}

impl BackoffPolicy {
    /// No wait at all. Useful for tests and dry runs.
    pub fn none() -> Self {
        BackoffPolicy::Fixed { delay_ms: 0 }
    }
}
