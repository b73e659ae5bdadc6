//! Tools backed by a web route.
//!
//! The input schema is derived from the route's parameter declarations and
//! execution calls the route handler in-process, skipping HTTP transport.

use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use super::route::{NEXT_PAGE_HEADER, Route, RouteParam, RouteResponse, ToolMetadata};
use super::schema::ensure_valid;
use super::tool::{CallContext, Tool, contain_result};
use super::version::{DEFAULT_VERSION, VersionMetadata, VersionRegistry};
use super::{CallResult, ToolError};

/// Type name the web layer uses for boolean flags.
pub const BOOLEAN_FLAG_TYPE: &str = "API::Boolean";

/// A tool wrapping one discovered route.
#[derive(Debug, Clone)]
pub struct RouteBackedTool {
    route: Route,
    metadata: ToolMetadata,
    versions: VersionRegistry,
}

impl RouteBackedTool {
    /// Wrap a route. Fails if the route has no tool metadata or declares an
    /// invalid version.
    pub fn new(route: Route) -> Result<Self, ToolError> {
        let metadata = route.tool.clone().ok_or_else(|| {
            ToolError::configuration(format!("route {} {} has no tool metadata", route.method, route.path))
        })?;

        let description = route
            .description
            .clone()
            .unwrap_or_else(|| metadata.tool_name.clone());
        let schema = input_schema_for(&route, &metadata);
        let version = metadata.version.as_deref().unwrap_or(DEFAULT_VERSION);
        let versions = VersionRegistry::single(version, VersionMetadata::new(description, schema))?;

        Ok(Self {
            route,
            metadata,
            versions,
        })
    }

    fn call_route(&self, ctx: &CallContext, arguments: Map<String, Value>) -> CallResult {
        let mut request = ctx.request.clone();
        for (key, value) in arguments {
            if self.metadata.params.contains(&key) {
                request.params.insert(key, value);
            }
        }
        request.method = self.route.method.clone();
        request.path = self.route.path.clone();

        debug!("Invoking {} {}", request.method, request.path);
        map_response(self.route.exec(request))
    }
}

impl Tool for RouteBackedTool {
    fn name(&self) -> &str {
        &self.metadata.tool_name
    }

    fn versions(&self) -> &VersionRegistry {
        &self.versions
    }

    #[instrument(skip_all, fields(route = %self.route.path))]
    fn execute(&self, ctx: &CallContext, version: &str, arguments: Map<String, Value>) -> CallResult {
        contain_result(|| {
            ensure_valid(&self.input_schema(version), &arguments)?;
            Ok(self.call_route(ctx, arguments))
        })
    }
}

/// Build `{type: object, properties, required, additionalProperties: false}`
/// from the route parameters named in the tool metadata.
pub fn input_schema_for(route: &Route, metadata: &ToolMetadata) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for name in &metadata.params {
        let Some(param) = route.params.get(name) else {
            continue;
        };
        properties.insert(name.clone(), property_schema(param));
        if param.required {
            required.push(Value::String(name.clone()));
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn property_schema(param: &RouteParam) -> Value {
    let mut property = Map::new();
    property.insert("type".to_string(), Value::String(json_schema_type(&param.param_type)));
    if let Some(description) = &param.description {
        property.insert("description".to_string(), Value::String(description.clone()));
    }
    Value::Object(property)
}

/// Map a declared route parameter type onto a JSON-schema primitive.
///
/// For `[A, B]` only `A` is kept.
pub fn json_schema_type(param_type: &str) -> String {
    let trimmed = param_type.trim();
    if let Some(inner) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        let first = inner.split(',').next().unwrap_or_default();
        return json_schema_type(first).to_lowercase();
    }
    if trimmed == BOOLEAN_FLAG_TYPE {
        return "boolean".to_string();
    }
    if trimmed.starts_with("Array") {
        return "array".to_string();
    }
    trimmed.to_lowercase()
}

/// Turn `(status, headers, body)` into a call result. A list body reports
/// `has_more` when the route announced a next page.
fn map_response(response: RouteResponse) -> CallResult {
    let parsed: Value = match serde_json::from_str(&response.body) {
        Ok(value) => value,
        Err(e) => {
            return CallResult::error_with_details(
                "Invalid JSON response",
                json!({ "message": e.to_string() }),
            );
        }
    };

    if response.status >= 400 {
        let message = ["error", "message"]
            .iter()
            .filter_map(|key| parsed.get(*key))
            .find(|value| !value.is_null())
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| format!("HTTP {}", response.status));
        return CallResult::error_with_details(message, parsed);
    }

    match parsed {
        Value::Array(items) => {
            let has_more = response.headers.contains_key(NEXT_PAGE_HEADER);
            CallResult::success_page(response.body, items, has_more)
        }
        other => CallResult::success_with_text(response.body, other),
    }
}
