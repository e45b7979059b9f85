//! Messages fed back to the model inside a run.

use serde_json::Value;

use crate::validation::FieldError;

/// Build the tool-result content for a rejected finalize call.
///
/// Includes:
/// - Attempt counter and remaining turn budget
/// - Every validation error with its field path
/// - The record schema, when requested
/// - The echoed submission, so the model can compare
///
/// # Examples
///
/// ```
/// use bioforge_engine::feedback::build_validation_feedback;
/// use bioforge_engine::validation::FieldError;
/// use serde_json::json;
///
/// let errors = vec![FieldError::new("birth_date", "Invalid date: 1943-02-30")];
/// let feedback = build_validation_feedback(&json!({"birth_date": "1943-02-30"}), &errors, 1, 4, 10, None);
/// assert!(feedback.contains("Attempt 1 (turn 4/10)"));
/// assert!(feedback.contains("birth_date: Invalid date"));
/// ```
#[must_use]
pub fn build_validation_feedback(
    submission: &Value,
    errors: &[FieldError],
    attempt: usize,
    turn: usize,
    max_turns: usize,
    schema: Option<&Value>,
) -> String {
    let mut feedback =
        format!("Attempt {attempt} (turn {turn}/{max_turns}): the record was not accepted.\n\n");

    feedback.push_str("Errors:\n");
    for error in errors {
        feedback.push_str("  - ");
        feedback.push_str(&error.to_string());
        feedback.push('\n');
    }

    if let Some(schema) = schema {
        feedback.push_str("\nExpected schema:\n");
        let schema_str =
            serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
        feedback.push_str(&schema_str);
        feedback.push('\n');
    }

    feedback.push_str("\nYour submission:\n");
    let submission_str =
        serde_json::to_string_pretty(submission).unwrap_or_else(|_| submission.to_string());
    feedback.push_str(&submission_str);

    feedback.push_str("\n\nPlease fix all errors and submit again.");
    feedback
}

/// User turn sent when the model answers with text only.
#[must_use]
pub fn build_continue_prompt(finalize_tool: &str, turn: usize, max_turns: usize) -> String {
    format!(
        "Turn {turn}/{max_turns} ended without a tool call. Continue with the tools; the task is \
         only complete once '{finalize_tool}' accepts the record."
    )
}

/// Error text for a finalize call after the record was already accepted.
#[must_use]
pub fn duplicate_finalize_message(finalize_tool: &str) -> String {
    format!(
        "'{finalize_tool}' was already accepted in this run. The first accepted record is final; \
         this submission was ignored."
    )
}
