//! Normalized tool-call results.
//!
//! Every tool returns a [`CallResult`], serialized on the wire as
//! `{content, structuredContent, isError}`. The constructors here are the
//! only way to build one, so `is_error` always matches the variant.

use rmcp::model::{CallToolResult, Content};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::warn;

use super::ToolError;

/// One unit of human-readable output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> &str {
        match self {
            Self::Text { text } => text,
        }
    }
}

/// Outcome of executing a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    content: Vec<ContentBlock>,
    structured_content: Value,
    is_error: bool,
}

impl CallResult {
    /// Success whose text is the data itself (strings) or its JSON encoding.
    pub fn success(data: Value) -> Self {
        let text = match &data {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self::success_with_text(text, data)
    }

    /// Success with an explicit text rendering of the data.
    pub fn success_with_text(text: impl Into<String>, data: Value) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            structured_content: structure(data, false),
            is_error: false,
        }
    }

    /// Success for one page of a list, flagging whether more pages exist.
    pub fn success_page(text: impl Into<String>, items: Vec<Value>, has_more: bool) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            structured_content: structure(Value::Array(items), has_more),
            is_error: false,
        }
    }

    /// Error carrying only a message; structured content is `{}`.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(message)],
            structured_content: Value::Object(Map::new()),
            is_error: true,
        }
    }

    /// Error with details exposed as `{"error": details}`.
    pub fn error_with_details(message: impl Into<String>, details: Value) -> Self {
        Self {
            content: vec![ContentBlock::text(message)],
            structured_content: json!({ "error": details }),
            is_error: true,
        }
    }

    /// Convert an execution error into an error result.
    pub fn from_error(err: &ToolError) -> Self {
        warn!("Tool call failed: {}", err);
        match err {
            ToolError::Validation(violations) => Self::error_with_details(
                err.to_string(),
                json!({ "violations": violations }),
            ),
            ToolError::VersionNotFound { available, .. } => Self::error_with_details(
                err.to_string(),
                json!({ "available_versions": available }),
            ),
            _ => Self::error(err.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    pub fn content(&self) -> &[ContentBlock] {
        &self.content
    }

    pub fn structured_content(&self) -> &Value {
        &self.structured_content
    }

    /// First text block, which for errors is the error message.
    pub fn text(&self) -> &str {
        self.content.first().map(ContentBlock::as_text).unwrap_or_default()
    }

    /// Prepend a status line without touching the flag or the payload.
    pub fn with_status_line(mut self, line: impl Into<String>) -> Self {
        self.content.insert(0, ContentBlock::text(line));
        self
    }

    /// Convert into the wire JSON shape.
    pub fn to_json(&self) -> Value {
        json!({
            "content": self.content,
            "structuredContent": self.structured_content,
            "isError": self.is_error,
        })
    }

    /// Convert into the rmcp result type used by the stdio transport.
    pub fn into_call_tool_result(self) -> CallToolResult {
        let content = self
            .content
            .into_iter()
            .map(|block| match block {
                ContentBlock::Text { text } => Content::text(text),
            })
            .collect();

        let mut result = if self.is_error {
            CallToolResult::error(content)
        } else {
            CallToolResult::success(content)
        };
        result.structured_content = Some(self.structured_content);
        result
    }
}

/// Shape the machine-readable payload: objects pass through, lists gain
/// count metadata, scalars collapse to `{}`.
fn structure(data: Value, has_more: bool) -> Value {
    match data {
        Value::Object(map) => Value::Object(map),
        Value::Array(items) => {
            let count = items.len();
            json!({
                "items": items,
                "metadata": { "count": count, "has_more": has_more },
            })
        }
        _ => Value::Object(Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_success_object_passes_through() {
        let result = CallResult::success(json!({ "id": 1, "title": "Bug" }));
        assert!(!result.is_error());
        assert_eq!(result.structured_content(), &json!({ "id": 1, "title": "Bug" }));
        assert_eq!(result.text(), r#"{"id":1,"title":"Bug"}"#);
    }

    #[test]
    fn test_success_scalar_has_empty_structure() {
        let result = CallResult::success(json!("done"));
        assert_eq!(result.text(), "done");
        assert_eq!(result.structured_content(), &json!({}));
    }

    #[test]
    fn test_success_list_has_metadata() {
        let result = CallResult::success(json!([1, 2, 3]));
        assert_eq!(
            result.structured_content(),
            &json!({ "items": [1, 2, 3], "metadata": { "count": 3, "has_more": false } })
        );
    }

    #[test]
    fn test_success_page_reports_has_more() {
        let result = CallResult::success_page("[{\"id\":1}]", vec![json!({ "id": 1 })], true);
        assert_eq!(result.text(), "[{\"id\":1}]");
        assert_eq!(
            result.structured_content()["metadata"],
            json!({ "count": 1, "has_more": true })
        );
    }

    #[test]
    fn test_error_shapes() {
        let plain = CallResult::error("boom");
        assert!(plain.is_error());
        assert_eq!(plain.structured_content(), &json!({}));

        let detailed = CallResult::error_with_details("Invalid JSON response", json!({ "message": "eof" }));
        assert_eq!(detailed.structured_content(), &json!({ "error": { "message": "eof" } }));
    }

    #[test]
    fn test_wire_format() {
        let wire = CallResult::error("nope").to_json();
        assert_eq!(
            wire,
            json!({
                "content": [{ "type": "text", "text": "nope" }],
                "structuredContent": {},
                "isError": true
            })
        );
    }

    #[test]
    fn test_status_line_keeps_payload() {
        let result = CallResult::success(json!({ "id": 7 })).with_status_line("Pipeline created");
        assert_eq!(result.content().len(), 2);
        assert_eq!(result.text(), "Pipeline created");
        assert!(!result.is_error());
        assert_eq!(result.structured_content(), &json!({ "id": 7 }));
    }

    #[test]
    fn test_into_call_tool_result() {
        let converted = CallResult::error("bad").into_call_tool_result();
        assert_eq!(converted.is_error, Some(true));
        assert_eq!(converted.structured_content, Some(json!({})));
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z]{0,8}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_success_is_never_error(data in arb_json()) {
            let result = CallResult::success(data.clone());
            prop_assert!(!result.is_error());
            if let Value::Array(items) = &data {
                prop_assert_eq!(
                    &result.structured_content()["metadata"]["count"],
                    &json!(items.len())
                );
            }
        }

        #[test]
        fn prop_error_is_always_error(message in ".{0,32}") {
            prop_assert!(CallResult::error(message).is_error());
        }
    }
}
