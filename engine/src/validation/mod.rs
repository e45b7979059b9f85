//! Record validation independent of the reasoning service.
//!
//! Two checks run against every finalize attempt:
//!
//! - [`schema`] - required fields, declared types, date shapes, confidence range
//! - [`chronology`] - ordering of the date-bearing fields
//!
//! Both collect every problem they find instead of stopping at the first one,
//! so a single tool result can carry the complete correction list.

pub mod chronology;
pub mod schema;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::record::Biography;

pub use chronology::{ChronologyInput, ChronologyReport, PromotionDate, check_chronology};
pub use schema::{SchemaValidator, sanitize_record_input};

/// One validation problem, keyed by the offending field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Dotted field path (`birth_date`, `promotions.1.date`, `(record)`).
    pub field: String,
    /// Human-readable reason, phrased for the model to act on.
    pub reason: String,
}

impl FieldError {
    /// Creates a new field error.
    #[must_use]
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Schema and chronology checks bundled for the finalize path.
pub struct ValidationEngine {
    schema: SchemaValidator,
}

impl ValidationEngine {
    /// Compiles the record schema.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Schema`] if the generated schema does not compile.
    pub fn new() -> Result<Self, EngineError> {
        Ok(Self {
            schema: SchemaValidator::new()?,
        })
    }

    /// Runs only the schema check over a raw (already sanitized) candidate.
    #[must_use]
    pub fn check_schema(&self, candidate: &Value) -> Vec<FieldError> {
        self.schema.check(candidate)
    }

    /// Sanitizes, schema-checks and chronology-checks a candidate record.
    ///
    /// Chronology is only checked once the schema passes, because date
    /// ordering is meaningless over malformed dates.
    ///
    /// # Errors
    ///
    /// Returns every [`FieldError`] found when the candidate is not acceptable.
    pub fn validate_record(&self, candidate: Value) -> Result<Biography, Vec<FieldError>> {
        let sanitized = sanitize_record_input(candidate);

        let errors = self.schema.check(&sanitized);
        if !errors.is_empty() {
            return Err(errors);
        }

        let mut record: Biography = serde_json::from_value(sanitized)
            .map_err(|e| vec![FieldError::new("(record)", e.to_string())])?;
        record.name = record.name.trim().to_string();
        record.source_url = record.source_url.trim().to_string();
        if let Some(promotions) = record.promotions.as_mut() {
            for promotion in promotions {
                promotion.rank = promotion.rank.trim().to_string();
            }
        }

        let report = check_chronology(&ChronologyInput::from(&record));
        if report.is_consistent() {
            Ok(record)
        } else {
            Err(report.errors)
        }
    }
}
