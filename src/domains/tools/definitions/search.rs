//! Search aggregator.
//!
//! `gitlab_search` fronts the instance, group and project search routes and
//! picks one from the identifier present in the arguments.

use serde_json::{Map, Value, json};

use crate::domains::api::routes::SEARCH_AGGREGATOR;
use crate::domains::tools::{Selection, SelectionStrategy, ToolError};

/// Where a search runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Global,
    Group,
    Project,
}

impl SearchScope {
    /// Infer the scope from the identifier fields. A group wins over a
    /// project when both are given.
    pub fn infer(arguments: &Map<String, Value>) -> Self {
        let present = |key: &str| arguments.get(key).is_some_and(|v| !v.is_null());
        if present("group_id") {
            Self::Group
        } else if present("project_id") {
            Self::Project
        } else {
            Self::Global
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Group => "group",
            Self::Project => "project",
        }
    }

    /// The search route serving this scope.
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::Global => "search_in_instance",
            Self::Group => "search_in_group",
            Self::Project => "search_in_project",
        }
    }

    /// The argument carrying this scope's identifier.
    fn id_field(&self) -> Option<&'static str> {
        match self {
            Self::Global => None,
            Self::Group => Some("group_id"),
            Self::Project => Some("project_id"),
        }
    }
}

/// Context-scope selection for `gitlab_search`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchScopeStrategy;

impl SelectionStrategy for SearchScopeStrategy {
    fn aggregator(&self) -> &str {
        SEARCH_AGGREGATOR
    }

    fn description(&self) -> String {
        "Search issues or projects. Pass group_id to search within a group, project_id to search \
         within a project, or neither to search the whole instance."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "scope": {
                    "type": "string",
                    "description": "What to search for: issues or projects (projects is not available within a project)"
                },
                "search": { "type": "string", "description": "The search term" },
                "group_id": { "type": "string", "description": "ID or path of the group to search in" },
                "project_id": { "type": "string", "description": "ID or path of the project to search in" },
                "page": { "type": "integer", "description": "Page number (default: 1)" },
                "per_page": { "type": "integer", "description": "Items per page (default: 20, max: 100)" }
            },
            "required": ["scope", "search"],
            "additionalProperties": false
        })
    }

    fn transform_arguments(&self, mut arguments: Map<String, Value>) -> Result<Selection, ToolError> {
        let scope = SearchScope::infer(&arguments);
        let id = scope.id_field().and_then(|field| arguments.get(field).cloned());

        arguments.remove("group_id");
        arguments.remove("project_id");
        if let Some(id) = id {
            arguments.insert("id".to_string(), id);
        }

        Ok(Selection::new(scope.tool_name(), arguments).with_operation(scope.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(args: Value) -> Selection {
        SearchScopeStrategy
            .transform_arguments(args.as_object().cloned().unwrap())
            .unwrap()
    }

    #[test]
    fn test_group_scope_rewrites_id() {
        let selection = select(json!({ "scope": "issues", "search": "bug", "group_id": "42" }));
        assert_eq!(selection.tool_name, "search_in_group");
        assert_eq!(
            Value::Object(selection.arguments),
            json!({ "scope": "issues", "search": "bug", "id": "42" })
        );
        assert_eq!(selection.operation.as_deref(), Some("group"));
    }

    #[test]
    fn test_project_scope() {
        let selection = select(json!({ "scope": "issues", "search": "bug", "project_id": "gitlab-org/gitlab" }));
        assert_eq!(selection.tool_name, "search_in_project");
        assert_eq!(selection.arguments["id"], json!("gitlab-org/gitlab"));
        assert!(!selection.arguments.contains_key("project_id"));
    }

    #[test]
    fn test_global_scope_leaves_arguments_unchanged() {
        let args = json!({ "scope": "projects", "search": "runner", "page": 2 });
        let selection = select(args.clone());
        assert_eq!(selection.tool_name, "search_in_instance");
        assert_eq!(Value::Object(selection.arguments), args);
    }

    #[test]
    fn test_group_wins_and_both_identifiers_are_dropped() {
        let selection = select(json!({ "scope": "issues", "search": "x", "group_id": "42", "project_id": "7" }));
        assert_eq!(selection.tool_name, "search_in_group");
        assert_eq!(selection.arguments["id"], json!("42"));
        assert!(!selection.arguments.contains_key("project_id"));
    }

    #[test]
    fn test_null_identifier_is_absent() {
        let selection = select(json!({ "scope": "issues", "search": "x", "group_id": null }));
        assert_eq!(selection.tool_name, "search_in_instance");
        assert!(!selection.arguments.contains_key("group_id"));
    }
}
