//! Resource usage counters and token estimation.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Tokens and calls spent against the reasoning service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of completed service calls.
    pub calls: u64,
    /// Input tokens, as reported by the service (or estimated).
    pub input_tokens: u64,
    /// Output tokens, as reported by the service (or estimated).
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Usage of a single call.
    #[must_use]
    pub const fn single_call(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            calls: 1,
            input_tokens,
            output_tokens,
        }
    }

    /// Input plus output tokens.
    #[must_use]
    pub const fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.calls += rhs.calls;
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

/// Estimate token count from text using the standard 4-chars-per-token heuristic.
///
/// Uses `chars().count()` so CJK text is not over-counted by its byte length.
/// Returns ceiling division to avoid underestimation.
///
/// # Examples
///
/// ```
/// use bioforge_engine::metrics::estimate_tokens;
///
/// assert_eq!(estimate_tokens("hello"), 2);
/// assert_eq!(estimate_tokens("林炳尧同志"), 2);
/// ```
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    u64::try_from(text.chars().count().div_ceil(4)).unwrap_or(u64::MAX)
}
