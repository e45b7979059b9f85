//! Confidence calibration and accept/review routing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::conversation::{FailureKind, RunResult, ToolCall};
use crate::record::{Biography, COMPLETENESS_FIELDS};
use crate::tools::builtin::{VALIDATE_DATES, VERIFY_INFORMATION_PRESENT};

const DATES_VALIDATED_BONUS: f64 = 0.05;
const EVIDENCE_PROBED_BONUS: f64 = 0.03;
const REPORTED_WEIGHT: f64 = 0.7;
const COMPLETENESS_WEIGHT: f64 = 0.3;

/// Blends the model-reported confidence with what the trace shows.
///
/// +0.05 when a `validate_dates` call found the dates consistent, +0.03 when
/// any evidence probe ran (capped at 1.0), then 70/30 with the share of
/// [`COMPLETENESS_FIELDS`] present. Rounded to two decimals.
#[must_use]
pub fn calibrate(record: &Biography, trace: &[ToolCall]) -> f64 {
    let mut base = if record.confidence.is_finite() {
        record.confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };

    let dates_validated = trace.iter().any(|call| {
        call.tool_name == VALIDATE_DATES
            && call.success
            && call
                .result
                .as_ref()
                .and_then(|r| r.get("valid"))
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false)
    });
    if dates_validated {
        base = (base + DATES_VALIDATED_BONUS).min(1.0);
    }

    if trace.iter().any(|call| call.tool_name == VERIFY_INFORMATION_PRESENT) {
        base = (base + EVIDENCE_PROBED_BONUS).min(1.0);
    }

    #[allow(clippy::cast_precision_loss)]
    let completeness =
        record.populated_completeness_fields() as f64 / COMPLETENESS_FIELDS.len() as f64;

    (base.mul_add(REPORTED_WEIGHT, completeness * COMPLETENESS_WEIGHT) * 100.0).round() / 100.0
}

/// Why a result needs a human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ReviewReason {
    /// The run ended without a record.
    RunFailed {
        /// Failure classification.
        kind: FailureKind,
        /// Failure detail.
        message: String,
    },
    /// The record's confidence is below the threshold.
    LowConfidence {
        /// The record's confidence.
        confidence: f64,
        /// The threshold it missed.
        threshold: f64,
    },
    /// The record's confidence is NaN, infinite or outside [0, 1].
    InvalidConfidence {
        /// The offending value, rendered as text so non-finite values serialize.
        value: String,
    },
    /// The source could not be fetched, so no run took place.
    SourceUnavailable {
        /// Fetch error.
        message: String,
    },
}

impl fmt::Display for ReviewReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunFailed { kind, message } => write!(f, "{kind}: {message}"),
            Self::LowConfidence { .. } => f.write_str("low confidence"),
            Self::InvalidConfidence { .. } => f.write_str("invalid confidence"),
            Self::SourceUnavailable { .. } => f.write_str("source unavailable"),
        }
    }
}

/// Destination of a run result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum Route {
    /// The record goes to accepted output.
    Accepted,
    /// The result goes to the review queue.
    Review(ReviewReason),
}

impl Route {
    /// Whether this is [`Route::Accepted`].
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Routes run results by a fixed acceptance threshold.
///
/// Routing is a pure function of the result and the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceRouter {
    threshold: f64,
}

impl ConfidenceRouter {
    /// Creates a router accepting records with confidence ≥ `threshold`.
    #[must_use]
    pub const fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// The acceptance threshold.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Routes one run result.
    #[must_use]
    pub fn route(&self, result: &RunResult) -> Route {
        let Some(record) = result.record() else {
            let (kind, message) = result
                .failure()
                .map_or((FailureKind::Configuration, String::new()), |f| {
                    (f.kind, f.message.clone())
                });
            return Route::Review(ReviewReason::RunFailed { kind, message });
        };

        let confidence = record.confidence;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Route::Review(ReviewReason::InvalidConfidence {
                value: confidence.to_string(),
            });
        }
        if confidence < self.threshold {
            return Route::Review(ReviewReason::LowConfidence {
                confidence,
                threshold: self.threshold,
            });
        }
        Route::Accepted
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::conversation::{RunFailure, RunOutcome};
    use crate::metrics::TokenUsage;

    fn completed(confidence: f64) -> RunResult {
        RunResult {
            source_url: "https://www.news.cn/a.html".into(),
            outcome: RunOutcome::Completed {
                record: Biography {
                    confidence,
                    ..Biography::new("林炳尧", "https://www.news.cn/a.html")
                },
            },
            trace: Vec::new(),
            turns: 3,
            finalize_rejections: 0,
            usage: TokenUsage::default(),
            elapsed: Duration::ZERO,
        }
    }

    fn call(tool: &str, success: bool, result: serde_json::Value) -> ToolCall {
        ToolCall {
            invocation_id: "toolu_1".into(),
            tool_name: tool.into(),
            input: json!({}),
            success,
            error: None,
            error_kind: None,
            result: Some(result),
            timestamp: Utc::now(),
            duration_ms: 1,
        }
    }

    #[test]
    fn test_routing_by_threshold() {
        let router = ConfidenceRouter::new(0.7);
        let low = router.route(&completed(0.65));
        assert_eq!(
            low,
            Route::Review(ReviewReason::LowConfidence {
                confidence: 0.65,
                threshold: 0.7
            })
        );
        assert_eq!(low_reason(&low), "low confidence");
        assert_eq!(router.route(&completed(0.85)), Route::Accepted);
        assert_eq!(router.route(&completed(0.7)), Route::Accepted);
    }

    fn low_reason(route: &Route) -> String {
        match route {
            Route::Review(reason) => reason.to_string(),
            Route::Accepted => String::new(),
        }
    }

    #[test]
    fn test_invalid_confidence_goes_to_review() {
        let router = ConfidenceRouter::new(0.7);
        for value in [f64::NAN, f64::INFINITY, 1.5, -0.1] {
            let route = router.route(&completed(value));
            assert_eq!(low_reason(&route), "invalid confidence", "{value}");
        }
    }

    #[test]
    fn test_failed_runs_always_go_to_review() {
        let mut result = completed(0.99);
        result.outcome = RunOutcome::Failed {
            failure: RunFailure::new(FailureKind::BudgetExceeded, "Maximum turns (10) reached"),
        };
        let route = ConfidenceRouter::new(0.0).route(&result);
        assert_eq!(
            route,
            Route::Review(ReviewReason::RunFailed {
                kind: FailureKind::BudgetExceeded,
                message: "Maximum turns (10) reached".into()
            })
        );
    }

    #[test]
    fn test_calibrate_without_trace() {
        let record = Biography {
            confidence: 0.9,
            ..Biography::new("林炳尧", "https://www.news.cn/a.html")
        };
        // 0.9 * 0.7 + 0 * 0.3
        assert!((calibrate(&record, &[]) - 0.63).abs() < 1e-9);
    }

    #[test]
    fn test_calibrate_with_bonuses_and_completeness() {
        let record = Biography {
            confidence: 0.9,
            ..Biography::example()
        };
        let trace = vec![
            call(VERIFY_INFORMATION_PRESENT, true, json!({"found": false})),
            call(VALIDATE_DATES, true, json!({"valid": true})),
        ];
        // min(1, 0.9 + 0.05 + 0.03) = 0.98; 0.98 * 0.7 + 1.0 * 0.3 = 0.986
        assert!((calibrate(&record, &trace) - 0.99).abs() < 1e-9);
    }

    #[test]
    fn test_inconsistent_dates_earn_no_bonus() {
        let record = Biography {
            confidence: 0.5,
            ..Biography::new("林炳尧", "https://www.news.cn/a.html")
        };
        let trace = vec![call(VALIDATE_DATES, true, json!({"valid": false}))];
        assert!((calibrate(&record, &trace) - 0.35).abs() < 1e-9);
    }
}
