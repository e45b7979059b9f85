//! The tools registered for biography extraction.

use std::sync::Arc;

use async_trait::async_trait;
use rig::completion::ToolDefinition;
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ToolContext, ToolError, ToolExecutor, parse_input};
use crate::error::EvidenceError;
use crate::evidence::{EvidenceVerifier, SourceRef};
use crate::record::Biography;
use crate::store::RecordStore;
use crate::validation::{ChronologyInput, ValidationEngine, check_chronology};

/// Name of the finalize tool.
pub const SUBMIT_BIOGRAPHY: &str = "submit_biography";
/// Name of the dry-run validation tool.
pub const VALIDATE_BIOGRAPHY: &str = "validate_biography";
/// Name of the example tool.
pub const BIOGRAPHY_EXAMPLE: &str = "biography_example";
/// Name of the chronology tool.
pub const VALIDATE_DATES: &str = "validate_dates";
/// Name of the evidence probe tool.
pub const VERIFY_INFORMATION_PRESENT: &str = "verify_information_present";
/// Name of the record lookup tool.
pub const LOOKUP_EXISTING_RECORD: &str = "lookup_existing_record";

fn schema_of<T: JsonSchema>() -> Value {
    json!(schema_for!(T))
}

/// Fills `source_url` from the run when the candidate omits it.
fn with_run_source_url(mut candidate: Value, ctx: &ToolContext<'_>) -> Value {
    if let Some(fields) = candidate.as_object_mut() {
        let missing = fields
            .get("source_url")
            .and_then(Value::as_str)
            .is_none_or(|url| url.trim().is_empty());
        if missing && !ctx.source_url.is_empty() {
            fields.insert("source_url".to_string(), json!(ctx.source_url));
        }
    }
    candidate
}

/// Finalize tool: validates the complete record and hands it back normalized.
pub struct SubmitBiographyTool {
    pub(crate) name: String,
    pub(crate) description: String,
    validation: Arc<ValidationEngine>,
}

impl SubmitBiographyTool {
    /// Creates the tool with its default name and description.
    #[must_use]
    pub fn new(validation: Arc<ValidationEngine>) -> Self {
        Self {
            name: SUBMIT_BIOGRAPHY.to_string(),
            description: "Submit the final biography record. The record is checked against the \
                          schema and the date chronology; fix every reported error and resubmit."
                .to_string(),
            validation,
        }
    }
}

#[async_trait]
impl ToolExecutor for SubmitBiographyTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: Biography::json_schema(),
        }
    }

    fn validates_input(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
        let candidate = with_run_source_url(input, ctx);
        match self.validation.validate_record(candidate.clone()) {
            Ok(record) => Ok(json!({ "status": "accepted", "record": record })),
            Err(errors) => Err(ToolError::Validation {
                errors,
                submission: candidate,
            }),
        }
    }
}

/// Runs the finalize checks without finalizing.
pub struct ValidateBiographyTool {
    pub(crate) name: String,
    pub(crate) description: String,
    validation: Arc<ValidationEngine>,
}

impl ValidateBiographyTool {
    /// Creates the tool with its default name and description.
    #[must_use]
    pub fn new(validation: Arc<ValidationEngine>) -> Self {
        Self {
            name: VALIDATE_BIOGRAPHY.to_string(),
            description: "Check a biography record against the schema and date chronology \
                          without submitting it."
                .to_string(),
            validation,
        }
    }
}

#[async_trait]
impl ToolExecutor for ValidateBiographyTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "record": {
                        "type": "object",
                        "description": "The biography record to check"
                    }
                },
                "required": ["record"]
            }),
        }
    }

    async fn execute(&self, input: Value, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
        let candidate = input.get("record").cloned().unwrap_or(Value::Null);
        let candidate = with_run_source_url(candidate, ctx);
        Ok(match self.validation.validate_record(candidate) {
            Ok(_) => json!({
                "valid": true,
                "message": "Record is valid. You may now submit it."
            }),
            Err(errors) => json!({ "valid": false, "errors": errors }),
        })
    }
}

/// Returns a filled-in example record.
pub struct BiographyExampleTool {
    pub(crate) name: String,
    pub(crate) description: String,
}

impl Default for BiographyExampleTool {
    fn default() -> Self {
        Self {
            name: BIOGRAPHY_EXAMPLE.to_string(),
            description: "Get an example of a complete biography record.".to_string(),
        }
    }
}

#[async_trait]
impl ToolExecutor for BiographyExampleTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn execute(&self, _input: Value, _ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
        serde_json::to_value(Biography::example()).map_err(|e| ToolError::Execution(e.to_string()))
    }
}

/// Checks the ordering of a partial set of dates.
pub struct ValidateDatesTool;

#[async_trait]
impl ToolExecutor for ValidateDatesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: VALIDATE_DATES.to_string(),
            description: "Check that birth, enlistment, party membership, promotion, retirement \
                          and death dates are in a possible order. Pass only the dates you found."
                .to_string(),
            parameters: schema_of::<ChronologyInput>(),
        }
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
        let dates: ChronologyInput = parse_input(input)?;
        let report = check_chronology(&dates);
        Ok(json!({
            "valid": report.is_consistent(),
            "errors": report.errors,
            "warnings": report.warnings,
        }))
    }
}

/// Input of [`VerifyInformationTool`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct VerifyInformationArgs {
    /// Record field the evidence is for (e.g. `spouse_name`).
    pub field_name: String,
    /// Terms to look for in the source text.
    pub search_terms: Vec<String>,
    /// Source reference; defaults to the source of the current run.
    #[serde(default)]
    pub source_ref: Option<String>,
}

/// Evidence probe against the run's source text.
pub struct VerifyInformationTool;

#[async_trait]
impl ToolExecutor for VerifyInformationTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: VERIFY_INFORMATION_PRESENT.to_string(),
            description: "Check whether the source text mentions any of the given terms before \
                          filling an optional field. If nothing is found, leave the field absent."
                .to_string(),
            parameters: schema_of::<VerifyInformationArgs>(),
        }
    }

    async fn execute(&self, input: Value, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
        let args: VerifyInformationArgs = parse_input(input)?;

        if let Some(requested) = args.source_ref.as_deref() {
            if SourceRef::from(requested) != *ctx.source_ref {
                return Err(ToolError::ProtocolViolation(format!(
                    "source_ref '{requested}' does not belong to this run; use '{}' or omit it",
                    ctx.source_ref
                )));
            }
        }

        let outcome = EvidenceVerifier::new(ctx.evidence)
            .verify(&args.field_name, &args.search_terms, ctx.source_ref)
            .map_err(|e| match e {
                EvidenceError::NoProbeTerms => ToolError::InvalidInput(e.to_string()),
                EvidenceError::Unregistered(_) | EvidenceError::Released(_) => {
                    ToolError::Configuration(e.to_string())
                }
            })?;

        serde_json::to_value(outcome).map_err(|e| ToolError::Execution(e.to_string()))
    }
}

/// Input of [`LookupExistingRecordTool`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct LookupArgs {
    /// Name of the officer.
    pub name: String,
}

/// Looks up records already in the store.
pub struct LookupExistingRecordTool {
    store: Arc<dyn RecordStore>,
}

impl LookupExistingRecordTool {
    /// Creates the tool over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolExecutor for LookupExistingRecordTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: LOOKUP_EXISTING_RECORD.to_string(),
            description: "Look up records already stored for an officer by name.".to_string(),
            parameters: schema_of::<LookupArgs>(),
        }
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
        let args: LookupArgs = parse_input(input)?;
        let records = self
            .store
            .lookup(args.name.trim())
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;
        Ok(json!({
            "found": !records.is_empty(),
            "records": records,
        }))
    }
}
