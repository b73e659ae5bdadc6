//! Argument validation against a tool's declared input schema.

use jsonschema::error::ValidationErrorKind;
use jsonschema::{Draft, Validator};
use serde_json::{Map, Value};

use super::ToolError;

/// Validate `arguments` against `schema`.
///
/// Returns the deduplicated violations in the order they were reported:
/// `missing required key {k}` for absent required properties and
/// `field {pointer} is invalid` for anything else. An empty list means the
/// arguments are acceptable. A schema that does not compile is reported as
/// a configuration error.
pub fn validate(schema: &Value, arguments: &Map<String, Value>) -> Result<Vec<String>, ToolError> {
    let validator = compile(schema)?;
    let instance = Value::Object(arguments.clone());

    let mut violations: Vec<String> = Vec::new();
    for err in validator.iter_errors(&instance) {
        let violation = match err.kind() {
            ValidationErrorKind::Required { property } => {
                let key = property.as_str().map(str::to_string).unwrap_or_else(|| property.to_string());
                format!("missing required key {}", key)
            }
            _ => format!("field {} is invalid", pointer(&err.instance_path().to_string())),
        };
        if !violations.contains(&violation) {
            violations.push(violation);
        }
    }

    Ok(violations)
}

/// Validate and turn violations into a [`ToolError::Validation`].
pub fn ensure_valid(schema: &Value, arguments: &Map<String, Value>) -> Result<(), ToolError> {
    let violations = validate(schema, arguments)?;
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ToolError::Validation(violations))
    }
}

fn compile(schema: &Value) -> Result<Validator, ToolError> {
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|e| ToolError::configuration(format!("input schema does not compile: {}", e)))
}

/// Root-level violations report an empty location; show it as `/`.
fn pointer(location: &str) -> String {
    if location.is_empty() {
        "/".to_string()
    } else {
        location.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "per_page": { "type": "integer" }
            },
            "required": ["id"],
            "additionalProperties": false
        })
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_valid_arguments() {
        let violations = validate(&schema(), &args(json!({ "id": "42", "per_page": 20 }))).unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn test_missing_required_key() {
        let violations = validate(&schema(), &args(json!({ "per_page": 20 }))).unwrap();
        assert_eq!(violations, vec!["missing required key id".to_string()]);
    }

    #[test]
    fn test_wrong_type_reports_pointer() {
        let violations = validate(&schema(), &args(json!({ "id": "1", "per_page": "ten" }))).unwrap();
        assert_eq!(violations, vec!["field /per_page is invalid".to_string()]);
    }

    #[test]
    fn test_additional_property_reported_at_root() {
        let violations = validate(&schema(), &args(json!({ "id": "1", "extra": true }))).unwrap();
        assert_eq!(violations, vec!["field / is invalid".to_string()]);
    }

    #[test]
    fn test_violations_are_deduplicated() {
        let schema = json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        });
        let violations = validate(&schema, &args(json!({ "a": 1, "b": 2 }))).unwrap();
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_ensure_valid_error() {
        let err = ensure_valid(&schema(), &Map::new()).unwrap_err();
        assert_eq!(err, ToolError::Validation(vec!["missing required key id".to_string()]));
    }

    #[test]
    fn test_broken_schema_is_configuration_error() {
        let broken = json!({ "type": "hash" });
        let err = validate(&broken, &Map::new()).unwrap_err();
        assert!(matches!(err, ToolError::Configuration(_)));
    }
}
