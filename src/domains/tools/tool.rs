//! The unit of dispatch and the per-call context threaded through it.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use rmcp::model::Tool as McpTool;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, instrument};

use super::auth::{Actor, Authorizer, DenyAll};
use super::version::VersionRegistry;
use super::{CallResult, ToolError};

/// The web request a tool call runs inside.
///
/// Each call owns its copy; route-backed tools mutate that copy before
/// handing it to the route handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolRequest {
    pub method: String,
    pub path: String,
    /// Routing parameters, merged with tool arguments for route tools.
    pub params: Map<String, Value>,
    pub headers: BTreeMap<String, String>,
}

impl ToolRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }
}

/// Everything a tool needs for one call, passed explicitly to every helper.
#[derive(Clone)]
pub struct CallContext {
    pub request: ToolRequest,
    /// The bound identity, if any.
    pub actor: Option<Actor>,
    pub authorizer: Arc<dyn Authorizer>,
}

impl CallContext {
    pub fn new(request: ToolRequest, actor: Option<Actor>, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            request,
            actor,
            authorizer,
        }
    }

    /// Context with no identity and a deny-all policy.
    pub fn anonymous() -> Self {
        Self::new(ToolRequest::new("POST", "/mcp"), None, Arc::new(DenyAll))
    }
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("request", &self.request)
            .field("actor", &self.actor)
            .finish_non_exhaustive()
    }
}

/// A named, versioned, schema-described callable operation.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn versions(&self) -> &VersionRegistry;

    /// Description of `version`, evaluated on every call.
    fn description(&self, version: &str) -> String {
        self.versions().description(version).unwrap_or_default()
    }

    /// Input schema of `version`, evaluated on every call.
    fn input_schema(&self, version: &str) -> Value {
        self.versions()
            .input_schema(version)
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    /// Whether the tool should be offered to this caller.
    fn is_available(&self, _ctx: &CallContext) -> bool {
        true
    }

    /// Execute the tool. Implementations report every failure as an error
    /// result; they never return early with a panic or an `Err`.
    fn execute(&self, ctx: &CallContext, version: &str, arguments: Map<String, Value>) -> CallResult;
}

/// What a client sees when listing tools.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(skip)]
    pub version: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Convert into the rmcp tool model.
    pub fn to_mcp_tool(&self) -> McpTool {
        let input_schema = match &self.input_schema {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        McpTool {
            name: self.name.clone().into(),
            description: Some(self.description.clone().into()),
            input_schema: Arc::new(input_schema),
            annotations: None,
            output_schema: None,
            icons: None,
            meta: None,
            title: None,
        }
    }
}

/// A tool bound to one concrete version, as handed out by the registry.
#[derive(Clone)]
pub struct ResolvedTool {
    tool: Arc<dyn Tool>,
    version: String,
}

impl ResolvedTool {
    pub fn new(tool: Arc<dyn Tool>, version: String) -> Self {
        Self { tool, version }
    }

    pub fn name(&self) -> &str {
        self.tool.name()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn is_available(&self, ctx: &CallContext) -> bool {
        self.tool.is_available(ctx)
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.tool.name().to_string(),
            version: self.version.clone(),
            description: self.tool.description(&self.version),
            input_schema: self.tool.input_schema(&self.version),
        }
    }

    /// Execute the bound version. Always returns a result, even if the
    /// tool panics.
    #[instrument(skip_all, fields(tool = %self.tool.name(), version = %self.version))]
    pub fn execute(&self, ctx: &CallContext, arguments: Map<String, Value>) -> CallResult {
        info!("Executing tool");
        let result = contain(|| self.tool.execute(ctx, &self.version, arguments));
        info!(is_error = result.is_error(), "Tool finished");
        result
    }
}

impl std::fmt::Debug for ResolvedTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedTool")
            .field("name", &self.tool.name())
            .field("version", &self.version)
            .finish()
    }
}

/// Run `f`, turning a panic into an error result.
pub(crate) fn contain(f: impl FnOnce() -> CallResult) -> CallResult {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "tool panicked".to_string());
            error!("Tool panicked: {}", message);
            CallResult::from_error(&ToolError::delegate(message))
        }
    }
}

/// Run a fallible pipeline, turning `Err` and panics into error results.
pub(crate) fn contain_result(f: impl FnOnce() -> Result<CallResult, ToolError>) -> CallResult {
    contain(|| f().unwrap_or_else(|e| CallResult::from_error(&e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::version::VersionMetadata;
    use serde_json::json;

    struct PanickingTool {
        versions: VersionRegistry,
    }

    impl Tool for PanickingTool {
        fn name(&self) -> &str {
            "explode"
        }

        fn versions(&self) -> &VersionRegistry {
            &self.versions
        }

        fn execute(&self, _ctx: &CallContext, _version: &str, _arguments: Map<String, Value>) -> CallResult {
            panic!("delegate blew up");
        }
    }

    fn panicking() -> ResolvedTool {
        let versions = VersionRegistry::single("0.1.0", VersionMetadata::new("Explodes", json!({ "type": "object" })))
            .unwrap();
        ResolvedTool::new(Arc::new(PanickingTool { versions }), "0.1.0".to_string())
    }

    #[test]
    fn test_panic_is_contained() {
        let result = panicking().execute(&CallContext::anonymous(), Map::new());
        assert!(result.is_error());
        assert_eq!(result.text(), "delegate blew up");
    }

    #[test]
    fn test_descriptor_serialization() {
        let descriptor = panicking().descriptor();
        assert_eq!(
            serde_json::to_value(&descriptor).unwrap(),
            json!({ "name": "explode", "description": "Explodes", "inputSchema": { "type": "object" } })
        );
        let mcp = descriptor.to_mcp_tool();
        assert_eq!(mcp.name.as_ref(), "explode");
    }

    #[test]
    fn test_contain_result_maps_errors() {
        let result = contain_result(|| Err(ToolError::invalid_arguments("no project")));
        assert!(result.is_error());
        assert_eq!(result.text(), "Invalid arguments: no project");
    }
}
