//! Pipeline aggregator.
//!
//! `manage_pipeline` infers the intended operation from the flags and
//! fields present, forwards only the fields that operation accepts and
//! prefixes successful results with a status line.

use serde_json::{Map, Value, json};

use crate::domains::api::routes::PIPELINE_AGGREGATOR;
use crate::domains::tools::{CallResult, Selection, SelectionStrategy, ToolError};

/// The pipeline operations `manage_pipeline` can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOperation {
    List,
    Create,
    Update,
    Retry,
    Cancel,
    Delete,
}

impl PipelineOperation {
    /// First matching rule wins.
    pub fn infer(arguments: &Map<String, Value>) -> Option<Self> {
        let flag = |key: &str| arguments.get(key).and_then(Value::as_bool).unwrap_or(false);
        let present = |key: &str| arguments.get(key).is_some_and(|v| !v.is_null());

        if flag("list") {
            Some(Self::List)
        } else if flag("retry") {
            Some(Self::Retry)
        } else if flag("cancel") {
            Some(Self::Cancel)
        } else if present("name") && present("pipeline_id") {
            Some(Self::Update)
        } else if present("ref") {
            Some(Self::Create)
        } else if present("pipeline_id") {
            Some(Self::Delete)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::Retry => "retry",
            Self::Cancel => "cancel",
            Self::Delete => "delete",
        }
    }

    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::List => "list_pipelines",
            Self::Create => "create_pipeline",
            Self::Update => "update_pipeline_metadata",
            Self::Retry => "retry_pipeline",
            Self::Cancel => "cancel_pipeline",
            Self::Delete => "delete_pipeline",
        }
    }

    /// Fields forwarded to the underlying tool.
    pub fn allowed_fields(&self) -> &'static [&'static str] {
        match self {
            Self::List => &["id", "ref", "page", "per_page"],
            Self::Create => &["id", "ref", "variables"],
            Self::Update => &["id", "pipeline_id", "name"],
            Self::Retry | Self::Cancel | Self::Delete => &["id", "pipeline_id"],
        }
    }

    fn past_tense(&self) -> Option<&'static str> {
        match self {
            Self::List => None,
            Self::Create => Some("created"),
            Self::Update => Some("updated"),
            Self::Retry => Some("retried"),
            Self::Cancel => Some("canceled"),
            Self::Delete => Some("deleted"),
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        [Self::List, Self::Create, Self::Update, Self::Retry, Self::Cancel, Self::Delete]
            .into_iter()
            .find(|op| op.as_str() == name)
    }
}

const NO_OPERATION: &str = "Unable to determine the pipeline operation. Provide one of: \
    list: true (list pipelines), \
    retry: true with pipeline_id (retry a pipeline), \
    cancel: true with pipeline_id (cancel a pipeline), \
    name with pipeline_id (update pipeline metadata), \
    ref (create a pipeline), \
    pipeline_id alone (delete a pipeline)";

/// Operation-intent selection for `manage_pipeline`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineIntentStrategy;

impl SelectionStrategy for PipelineIntentStrategy {
    fn aggregator(&self) -> &str {
        PIPELINE_AGGREGATOR
    }

    fn description(&self) -> String {
        "Manage CI/CD pipelines of a project. Set list to list pipelines, retry or cancel with \
         pipeline_id to act on one, name with pipeline_id to rename it, ref to create one, or \
         pipeline_id alone to delete it."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "ID or URL-encoded path of the project" },
                "list": { "type": "boolean", "description": "List pipelines" },
                "retry": { "type": "boolean", "description": "Retry the pipeline given by pipeline_id" },
                "cancel": { "type": "boolean", "description": "Cancel the pipeline given by pipeline_id" },
                "pipeline_id": { "type": "integer", "description": "ID of the pipeline" },
                "name": { "type": "string", "description": "New pipeline name" },
                "ref": { "type": "string", "description": "Branch or tag to filter by or to run on" },
                "variables": {
                    "type": "array",
                    "items": { "type": "object" },
                    "description": "Variables for a new pipeline"
                },
                "page": { "type": "integer", "description": "Page number when listing" },
                "per_page": { "type": "integer", "description": "Items per page when listing" }
            },
            "additionalProperties": false
        })
    }

    fn transform_arguments(&self, arguments: Map<String, Value>) -> Result<Selection, ToolError> {
        let operation = PipelineOperation::infer(&arguments).ok_or_else(|| ToolError::selection(NO_OPERATION))?;

        let allowed = operation.allowed_fields();
        let forwarded: Map<String, Value> = arguments
            .into_iter()
            .filter(|(key, _)| allowed.contains(&key.as_str()))
            .collect();

        Ok(Selection::new(operation.tool_name(), forwarded).with_operation(operation.as_str()))
    }

    fn enhance(&self, selection: &Selection, result: CallResult) -> CallResult {
        let verb = selection
            .operation
            .as_deref()
            .and_then(PipelineOperation::from_name)
            .and_then(|op| op.past_tense());
        match verb {
            Some(verb) => result.with_status_line(format!("Pipeline {} successfully via {}", verb, PIPELINE_AGGREGATOR)),
            None => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn select(value: Value) -> Result<Selection, ToolError> {
        PipelineIntentStrategy.transform_arguments(args(value))
    }

    #[test]
    fn test_list_has_priority_over_retry() {
        let selection = select(json!({ "id": "1", "list": true, "pipeline_id": 5, "retry": true })).unwrap();
        assert_eq!(selection.tool_name, "list_pipelines");
        assert_eq!(selection.operation.as_deref(), Some("list"));
        assert_eq!(Value::Object(selection.arguments), json!({ "id": "1" }));
    }

    #[test]
    fn test_predicate_order() {
        let cases = [
            (json!({ "retry": true, "cancel": true, "pipeline_id": 1 }), "retry_pipeline"),
            (json!({ "cancel": true, "pipeline_id": 1, "name": "n" }), "cancel_pipeline"),
            (json!({ "name": "n", "pipeline_id": 1, "ref": "main" }), "update_pipeline_metadata"),
            (json!({ "name": "n", "ref": "main" }), "create_pipeline"),
            (json!({ "pipeline_id": 1 }), "delete_pipeline"),
            (json!({ "list": false, "pipeline_id": 1 }), "delete_pipeline"),
        ];
        for (arguments, expected) in cases {
            assert_eq!(select(arguments.clone()).unwrap().tool_name, expected, "{}", arguments);
        }
    }

    #[test]
    fn test_create_forwards_only_allowed_fields() {
        let selection = select(json!({
            "id": "1",
            "ref": "main",
            "variables": [{ "key": "A", "value": "1" }],
            "page": 3
        }))
        .unwrap();
        assert_eq!(
            Value::Object(selection.arguments),
            json!({ "id": "1", "ref": "main", "variables": [{ "key": "A", "value": "1" }] })
        );
    }

    #[test]
    fn test_no_match_lists_all_combinations() {
        let err = select(json!({ "id": "1", "name": "orphan" })).unwrap_err();
        let ToolError::Selection(message) = err else {
            panic!("expected a selection error");
        };
        for hint in ["list: true", "retry: true", "cancel: true", "name with pipeline_id", "ref", "pipeline_id alone"] {
            assert!(message.contains(hint), "missing {hint}");
        }
    }

    #[test]
    fn test_status_line() {
        let strategy = PipelineIntentStrategy;
        let created = Selection::new("create_pipeline", Map::new()).with_operation("create");
        let result = strategy.enhance(&created, CallResult::success(json!({ "id": 9 })));
        assert_eq!(result.text(), "Pipeline created successfully via manage_pipeline");
        assert_eq!(result.structured_content(), &json!({ "id": 9 }));
        assert!(!result.is_error());

        let listed = Selection::new("list_pipelines", Map::new()).with_operation("list");
        let result = strategy.enhance(&listed, CallResult::success(json!([])));
        assert_eq!(result.content().len(), 1);
    }
}
