//! Sanitation and schema conformance of candidate records.

use jsonschema::Validator;
use serde_json::{Map, Value};

use super::FieldError;
use crate::date::PartialDate;
use crate::error::EngineError;
use crate::record::{Biography, DATE_FIELDS, LIST_FIELDS};

const REQUIRED_FIELDS: [&str; 2] = ["name", "source_url"];
const URL_SCHEMES: [&str; 3] = ["http://", "https://", "file://"];
const PLACEHOLDER_HOSTS: [&str; 4] = ["example.com", "placeholder", "test.com", "localhost"];

/// Normalizes the loose shapes models tend to produce.
///
/// - `null`, blank strings and the strings `"null"` / `"none"` (any case) become absent
/// - a bare string given for a list field becomes a one-element list
///
/// Promotion entries are sanitized the same way. Non-object input is
/// returned unchanged and left to the schema check to reject.
#[must_use]
pub fn sanitize_record_input(input: Value) -> Value {
    let Value::Object(fields) = input else {
        return input;
    };

    let mut sanitized = Map::new();
    for (key, value) in fields {
        let Some(value) = sanitize_value(value) else {
            continue;
        };
        let value = match value {
            Value::String(s) if LIST_FIELDS.contains(&key.as_str()) && key != "promotions" => {
                Value::Array(vec![Value::String(s)])
            }
            Value::Array(items) if key == "promotions" => Value::Array(
                items
                    .into_iter()
                    .filter_map(sanitize_value)
                    .map(sanitize_record_input)
                    .collect(),
            ),
            Value::Array(items) => {
                Value::Array(items.into_iter().filter_map(sanitize_value).collect())
            }
            other => other,
        };
        sanitized.insert(key, value);
    }
    Value::Object(sanitized)
}

fn sanitize_value(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty()
                || trimmed.eq_ignore_ascii_case("null")
                || trimmed.eq_ignore_ascii_case("none")
            {
                None
            } else {
                Some(Value::String(s))
            }
        }
        other => Some(other),
    }
}

/// Compiled record schema plus the checks JSON Schema cannot express.
pub struct SchemaValidator {
    validator: Validator,
}

impl SchemaValidator {
    /// Compiles the [`Biography`] schema.
    ///
    /// Top-level `required` is handled by [`Self::check`] itself so missing
    /// identity fields are reported under their own names.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Schema`] if the schema fails to compile.
    pub fn new() -> Result<Self, EngineError> {
        let mut schema = Biography::json_schema();
        if let Some(object) = schema.as_object_mut() {
            object.remove("required");
        }
        let validator = Validator::new(&schema).map_err(|e| EngineError::Schema(e.to_string()))?;
        Ok(Self { validator })
    }

    /// Collects every schema problem in `candidate`.
    ///
    /// An empty result means the candidate can be deserialized into a
    /// [`Biography`] whose dates all parse.
    #[must_use]
    pub fn check(&self, candidate: &Value) -> Vec<FieldError> {
        let Some(fields) = candidate.as_object() else {
            return vec![FieldError::new("(record)", "record must be a JSON object")];
        };

        let mut errors: Vec<FieldError> = REQUIRED_FIELDS
            .iter()
            .filter(|field| !fields.contains_key(**field))
            .map(|field| FieldError::new(*field, "required field is missing"))
            .collect();

        errors.extend(self.validator.iter_errors(candidate).map(|error| {
            let path = error.instance_path.to_string();
            let field = path.trim_start_matches('/').replace('/', ".");
            let field = if field.is_empty() { "(record)".to_string() } else { field };
            FieldError::new(field, error.to_string())
        }));

        if let Some(url) = fields.get("source_url").and_then(Value::as_str) {
            if let Some(reason) = source_url_problem(url) {
                errors.push(FieldError::new("source_url", reason));
            }
        }

        for field in DATE_FIELDS {
            if let Some(raw) = fields.get(field).and_then(Value::as_str) {
                if let Err(e) = PartialDate::parse(raw.trim()) {
                    errors.push(FieldError::new(field, e.to_string()));
                }
            }
        }

        if let Some(promotions) = fields.get("promotions").and_then(Value::as_array) {
            for (index, promotion) in promotions.iter().enumerate() {
                if let Some(raw) = promotion.get("date").and_then(Value::as_str) {
                    if let Err(e) = PartialDate::parse(raw.trim()) {
                        errors.push(FieldError::new(
                            format!("promotions.{index}.date"),
                            e.to_string(),
                        ));
                    }
                }
            }
        }

        if let Some(confidence) = fields.get("confidence").and_then(Value::as_f64) {
            if !(0.0..=1.0).contains(&confidence) {
                errors.push(FieldError::new(
                    "confidence",
                    format!("confidence must be between 0 and 1, got {confidence}"),
                ));
            }
        }

        errors
    }
}

fn source_url_problem(url: &str) -> Option<String> {
    let url = url.trim();
    if !URL_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
        return Some(format!("source_url must start with http://, https:// or file://, got: {url}"));
    }
    let lowered = url.to_lowercase();
    PLACEHOLDER_HOSTS
        .iter()
        .find(|host| lowered.contains(**host))
        .map(|host| {
            format!("source_url looks like a placeholder ({host}); use the real source URL")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(candidate: &Value) -> Vec<FieldError> {
        SchemaValidator::new().unwrap().check(candidate)
    }

    fn fields(errors: &[FieldError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_sanitize_drops_null_like_values() {
        let sanitized = sanitize_record_input(json!({
            "name": "林炳尧",
            "spouse_name": "None",
            "hometown": "  ",
            "death_date": null,
            "notes": "NULL"
        }));
        assert_eq!(sanitized, json!({"name": "林炳尧"}));
    }

    #[test]
    fn test_sanitize_wraps_bare_list_strings() {
        let sanitized = sanitize_record_input(json!({
            "notable_positions": "原南京军区副司令员",
            "awards": ["一级红星功勋荣誉章", "null"]
        }));
        assert_eq!(sanitized["notable_positions"], json!(["原南京军区副司令员"]));
        assert_eq!(sanitized["awards"], json!(["一级红星功勋荣誉章"]));
    }

    #[test]
    fn test_sanitize_cleans_promotion_entries() {
        let sanitized = sanitize_record_input(json!({
            "promotions": [{"rank": "少将", "date": "null", "unit": ""}]
        }));
        assert_eq!(sanitized["promotions"], json!([{"rank": "少将"}]));
    }

    #[test]
    fn test_missing_identity_fields() {
        let errors = check(&json!({}));
        assert_eq!(fields(&errors), vec!["name", "source_url"]);
    }

    #[test]
    fn test_type_errors_carry_field_path() {
        let errors = check(&json!({
            "name": "林炳尧",
            "source_url": "https://www.news.cn/a.html",
            "awards": [1, 2],
            "confidence": "high"
        }));
        let found = fields(&errors);
        assert!(found.contains(&"awards.0"));
        assert!(found.contains(&"awards.1"));
        assert!(found.contains(&"confidence"));
    }

    #[test]
    fn test_date_shapes() {
        let errors = check(&json!({
            "name": "林炳尧",
            "source_url": "https://www.news.cn/a.html",
            "birth_date": "1943年",
            "death_date": "2025-02-30",
            "enlistment_date": "1961",
            "promotions": [{"rank": "少将", "date": "95"}]
        }));
        assert_eq!(fields(&errors), vec!["birth_date", "death_date", "promotions.0.date"]);
        assert!(errors[1].reason.contains("Invalid date"));
    }

    #[test]
    fn test_confidence_range() {
        let errors = check(&json!({
            "name": "林炳尧",
            "source_url": "https://www.news.cn/a.html",
            "confidence": 1.5
        }));
        assert_eq!(fields(&errors), vec!["confidence"]);
    }

    #[test]
    fn test_source_url_rules() {
        for url in ["www.news.cn/a.html", "https://example.com/bio", "http://localhost:8080/x"] {
            let errors = check(&json!({"name": "林炳尧", "source_url": url}));
            assert_eq!(fields(&errors), vec!["source_url"], "{url}");
        }
        let local = json!({"name": "林炳尧", "source_url": "file:///data/obit.txt"});
        assert!(check(&local).is_empty());
    }

    #[test]
    fn test_promotion_requires_rank() {
        let errors = check(&json!({
            "name": "林炳尧",
            "source_url": "https://www.news.cn/a.html",
            "promotions": [{"date": "1995"}]
        }));
        assert_eq!(fields(&errors), vec!["promotions.0"]);
    }
}
