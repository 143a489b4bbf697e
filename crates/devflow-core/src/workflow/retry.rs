//! Error handling policy resolution and retry backoff.
//!
//! Stateless helpers used by the orchestrator when a step invocation fails:
//! which recovery path a policy selects, how long to wait before the next
//! retry, and how the parameters of a regeneration attempt are derived.

use std::time::Duration;

use devflow_types::config::BackoffPolicy;
use devflow_types::workflow::{ErrorHandlingPolicy, ErrorStrategy, FallbackAction};
use rand::Rng;
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

/// The recovery path selected for a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The failure is unhandled and the run fails.
    Stop,
    /// Re-invoke the step while its retry budget lasts.
    Retry,
    /// Record the step as skipped and continue.
    Skip,
    /// Run a fallback action; the step counts as handled.
    Fallback(FallbackAction),
}

// ---------------------------------------------------------------------------
// RetryHandler
// ---------------------------------------------------------------------------

/// Stateless retry handler for workflow step failures.
///
/// No internal state, all logic is in associated functions that take the
/// policy and configuration as parameters.
pub struct RetryHandler;

impl RetryHandler {
    /// Recovery path for the first failure of a step.
    ///
    /// `fallback` without an action behaves as `stop`.
    pub fn recovery_for(policy: &ErrorHandlingPolicy) -> Recovery {
        match policy.strategy {
            ErrorStrategy::Stop => Recovery::Stop,
            ErrorStrategy::Retry => Recovery::Retry,
            ErrorStrategy::Skip => Recovery::Skip,
            ErrorStrategy::Fallback => match policy.fallback_action {
                Some(action) => Recovery::Fallback(action),
                None => Recovery::Stop,
            },
        }
    }

    /// Recovery path once a step's retry budget is used up.
    pub fn after_exhaustion(policy: &ErrorHandlingPolicy) -> Recovery {
        match policy.fallback_action {
            Some(action) => Recovery::Fallback(action),
            None => Recovery::Stop,
        }
    }

    /// Whether another retry may be attempted.
    ///
    /// A stop request always wins over the remaining budget.
    pub fn should_retry(remaining: u32, stop_requested: bool) -> bool {
        remaining > 0 && !stop_requested
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff_delay(policy: &BackoffPolicy, retry: u32) -> Duration {
        match policy {
            BackoffPolicy::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            BackoffPolicy::Exponential {
                initial_ms,
                multiplier,
                max_ms,
            } => {
                let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
                let raw = *initial_ms as f64 * multiplier.powi(exponent);
                let capped = if raw.is_finite() {
                    raw.clamp(0.0, *max_ms as f64)
                } else {
                    *max_ms as f64
                };
                Duration::from_millis(capped as u64)
            }
            BackoffPolicy::Jittered {
                base_ms,
                max_jitter_ms,
            } => {
                let jitter = if *max_jitter_ms == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=*max_jitter_ms)
                };
                Duration::from_millis(base_ms.saturating_add(jitter))
            }
        }
    }

    /// Parameters for a regeneration attempt: the originals plus `retry: true`.
    pub fn regenerate_parameters(parameters: &Map<String, Value>) -> Map<String, Value> {
        let mut params = parameters.clone();
        params.insert("retry".to_string(), Value::Bool(true));
        params
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
