//! Engine, transport and batch configuration.

use std::time::Duration;

use crate::error::EngineError;
use crate::tools::registry::DEFAULT_TOOL_TIMEOUT;
use crate::tools::toolkit::DEFAULT_LOOKUP_TIMEOUT;

/// Retry behavior of the reasoning-service transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first (default: 3).
    pub max_attempts: u32,
    /// Base delay between attempts (default: 2s).
    pub base_delay: Duration,
    /// Deadline of a single attempt (default: 120s).
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            call_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Set the total number of attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the base delay between attempts.
    #[must_use]
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the per-attempt deadline.
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

/// Configuration of a single extraction run.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Maximum model turns per run (default: 10).
    pub max_turns: usize,
    /// Confidence at or above which a record is accepted (default: 0.65).
    pub acceptance_threshold: f64,
    /// Deadline of a tool execution (default: 30s).
    pub tool_timeout: Duration,
    /// Deadline of the record lookup tool (default: 10s).
    pub lookup_timeout: Duration,
    /// Whether accepted confidence is calibrated against the trace (default: true).
    pub calibrate_confidence: bool,
    /// Whether the source text is dropped from history after the first turn (default: false).
    pub compact_source_after_first_turn: bool,
    /// Past records shown to the model as examples (default: 2).
    pub few_shot_examples: usize,
    /// Whether finalize feedback repeats the record schema (default: true).
    pub include_schema_in_feedback: bool,
    /// Output token limit per model turn (default: 4096).
    pub max_output_tokens: u64,
    /// Transport retry behavior.
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            acceptance_threshold: 0.65,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            calibrate_confidence: true,
            compact_source_after_first_turn: false,
            few_shot_examples: 2,
            include_schema_in_feedback: true,
            max_output_tokens: 4096,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Set the turn budget.
    #[must_use]
    pub const fn with_max_turns(mut self, turns: usize) -> Self {
        self.max_turns = turns;
        self
    }

    /// Set the acceptance threshold.
    #[must_use]
    pub const fn with_acceptance_threshold(mut self, threshold: f64) -> Self {
        self.acceptance_threshold = threshold;
        self
    }

    /// Set the tool deadline.
    #[must_use]
    pub const fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Set the lookup tool deadline.
    #[must_use]
    pub const fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Enable or disable confidence calibration.
    #[must_use]
    pub const fn with_calibration(mut self, enabled: bool) -> Self {
        self.calibrate_confidence = enabled;
        self
    }

    /// Enable or disable source compaction.
    #[must_use]
    pub const fn with_source_compaction(mut self, enabled: bool) -> Self {
        self.compact_source_after_first_turn = enabled;
        self
    }

    /// Set how many past records are shown as examples.
    #[must_use]
    pub const fn with_few_shot_examples(mut self, count: usize) -> Self {
        self.few_shot_examples = count;
        self
    }

    /// Set whether finalize feedback repeats the schema.
    #[must_use]
    pub const fn with_schema_in_feedback(mut self, include: bool) -> Self {
        self.include_schema_in_feedback = include;
        self
    }

    /// Set the output token limit per model turn.
    #[must_use]
    pub const fn with_max_output_tokens(mut self, tokens: u64) -> Self {
        self.max_output_tokens = tokens;
        self
    }

    /// Set the transport retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Rejects values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] naming the first bad value.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_turns == 0 {
            return Err(EngineError::InvalidConfig("max_turns must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.acceptance_threshold) {
            return Err(EngineError::InvalidConfig(format!(
                "acceptance_threshold must be between 0 and 1, got {}",
                self.acceptance_threshold
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(EngineError::InvalidConfig("retry.max_attempts must be at least 1".into()));
        }
        if self.tool_timeout.is_zero()
            || self.lookup_timeout.is_zero()
            || self.retry.call_timeout.is_zero()
        {
            return Err(EngineError::InvalidConfig("timeouts must be non-zero".into()));
        }
        Ok(())
    }
}

/// Configuration of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Minimum interval between reasoning-service calls across the batch (default: 1s).
    pub min_interval: Duration,
    /// Items processed at once (default: 1).
    pub concurrency: usize,
    /// Whether accepted records are written to the record store (default: true).
    pub persist_accepted: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(1),
            concurrency: 1,
            persist_accepted: true,
        }
    }
}

impl BatchConfig {
    /// Set the minimum interval between calls.
    #[must_use]
    pub const fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Set the number of concurrent items. Zero is treated as one.
    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set whether accepted records are persisted.
    #[must_use]
    pub const fn with_persistence(mut self, persist: bool) -> Self {
        self.persist_accepted = persist;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_turns, 10);
        assert!((config.acceptance_threshold - 0.65).abs() < f64::EPSILON);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_secs(2));
        assert_eq!(config.lookup_timeout, Duration::from_secs(10));
        assert_eq!(BatchConfig::default().min_interval, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(EngineConfig::default().with_max_turns(0).validate().is_err());
        assert!(EngineConfig::default().with_acceptance_threshold(1.2).validate().is_err());
        assert!(EngineConfig::default().with_acceptance_threshold(f64::NAN).validate().is_err());
        assert!(
            EngineConfig::default()
                .with_retry(RetryPolicy::default().with_max_attempts(0))
                .validate()
                .is_err()
        );
    }
}
