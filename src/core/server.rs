//! MCP Server implementation and lifecycle management.
//!
//! This module contains the main server handler that implements the MCP
//! protocol on top of the tool registry.
//!
//! ## Tool Architecture
//!
//! Tools are discovered by `ToolRegistry` from the API route table and the
//! catalog in `domains/tools/catalog.rs`. The server only resolves a name
//! and version, binds the caller's identity and runs the call.
//! **Adding a new tool does NOT require modifying this file!**
//!
//! ## Versions
//!
//! A call may pin a tool version. Over stdio the version is read from the
//! request `_meta.version`; over HTTP from `params.version`. Without one, the
//! latest registered version is used.

use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler, model::*, service::RequestContext,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::config::Config;
use crate::domains::api::{ApiStore, TOKEN_HEADER};
use crate::domains::tools::{
    Actor, CallContext, CallResult, ToolDescriptor, ToolError, ToolRegistry, ToolRequest,
    build_tool_registry,
};

const INSTRUCTIONS: &str = "Tools for an issue tracker and CI pipelines. Tools are versioned; \
    pass a version to pin one, otherwise the latest version is used.";

/// The main MCP server handler.
///
/// Cloning is cheap; every clone shares the same registry and store.
#[derive(Clone)]
pub struct McpServer {
    /// Server configuration.
    config: Arc<Config>,

    /// Backing store for the API the tools act on.
    store: Arc<ApiStore>,

    /// Discovered tools, scanned once on first use.
    registry: Arc<ToolRegistry>,

    /// Identity bound from the configured access token.
    actor: Option<Actor>,
}

impl McpServer {
    /// Create a new MCP server over a freshly seeded store.
    pub fn new(config: Config) -> super::Result<Self> {
        Self::with_store(config, Arc::new(ApiStore::seeded()))
    }

    /// Create a new MCP server over `store`.
    pub fn with_store(config: Config, store: Arc<ApiStore>) -> super::Result<Self> {
        let registry = build_tool_registry(store.clone())?;

        let actor = match config.credentials.access_token.as_deref() {
            Some(token) => Some(
                store
                    .actor_for_token(token)
                    .ok_or_else(|| super::Error::config("MCP_ACCESS_TOKEN does not match any user"))?,
            ),
            None => None,
        };
        if let Some(actor) = &actor {
            info!("Acting as {}", actor.username);
        }

        Ok(Self {
            config: Arc::new(config),
            store,
            registry: Arc::new(registry),
            actor,
        })
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.server.name
    }

    /// Get the server version.
    pub fn version(&self) -> &str {
        &self.config.server.version
    }

    /// Get the server configuration.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// The per-call context. Each call gets its own request copy.
    fn call_context(&self) -> CallContext {
        let mut request = ToolRequest::new("POST", "/mcp");
        if let Some(token) = &self.config.credentials.access_token {
            request.headers.insert(TOKEN_HEADER.to_string(), token.clone());
        }
        CallContext::new(request, self.actor.clone(), self.store.clone())
    }

    /// Descriptors of the tools available to the bound identity.
    pub fn tool_descriptors(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        let ctx = self.call_context();
        Ok(self
            .registry
            .list_resolved()?
            .into_iter()
            .filter(|tool| tool.is_available(&ctx))
            .map(|tool| tool.descriptor())
            .collect())
    }

    /// Resolve and run a tool.
    ///
    /// Only lookup and discovery failures come back as `Err`; everything
    /// that goes wrong while executing is an error [`CallResult`].
    #[instrument(skip(self, arguments))]
    pub async fn dispatch(
        &self,
        name: &str,
        version: Option<&str>,
        arguments: Map<String, Value>,
    ) -> Result<CallResult, ToolError> {
        let tool = self.registry.get(name, version)?;
        let ctx = self.call_context();

        // Tools are synchronous and may block on the store.
        let result = tokio::task::spawn_blocking(move || tool.execute(&ctx, arguments)).await;
        Ok(result.unwrap_or_else(|e| {
            error!("Tool task failed: {}", e);
            CallResult::error(format!("Tool execution was interrupted: {}", e))
        }))
    }

    // ========================================================================
    // HTTP Transport Support Methods
    // ========================================================================

    /// List all available tools (for HTTP transport).
    pub fn list_tools_json(&self) -> Result<Vec<Value>, ToolError> {
        self.tool_descriptors()?
            .iter()
            .map(|d| serde_json::to_value(d).map_err(|e| ToolError::configuration(e.to_string())))
            .collect()
    }

    /// Call a tool by name (for HTTP transport).
    pub async fn call_tool_json(
        &self,
        name: &str,
        version: Option<&str>,
        arguments: Value,
    ) -> Result<Value, ToolError> {
        let arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(ToolError::invalid_arguments(format!(
                    "arguments must be an object, got {}",
                    other
                )));
            }
        };
        Ok(self.dispatch(name, version, arguments).await?.to_json())
    }
}

/// Map registry errors onto protocol errors.
fn to_mcp_error(err: ToolError) -> McpError {
    if err.is_lookup() {
        McpError::invalid_params(err.to_string(), None)
    } else {
        McpError::internal_error(err.to_string(), None)
    }
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    #[instrument(skip(self, _context))]
    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        info!("Listing tools");
        let tools = self
            .tool_descriptors()
            .map_err(to_mcp_error)?
            .iter()
            .map(ToolDescriptor::to_mcp_tool)
            .collect();
        Ok(ListToolsResult {
            tools,
            next_cursor: None,
            meta: None,
        })
    }

    #[instrument(skip(self, request, context), fields(tool = %request.name))]
    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let version = context
            .meta
            .get("version")
            .and_then(Value::as_str)
            .map(str::to_string);
        info!("Calling tool {} (version: {:?})", request.name, version);

        self.dispatch(
            &request.name,
            version.as_deref(),
            request.arguments.unwrap_or_default(),
        )
        .await
        .map(CallResult::into_call_tool_result)
        .map_err(to_mcp_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn server(token: Option<&str>) -> McpServer {
        let mut config = Config::default();
        config.credentials.access_token = token.map(str::to_string);
        McpServer::new(config).unwrap()
    }

    fn names(server: &McpServer) -> Vec<String> {
        server
            .list_tools_json()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_unknown_token_is_config_error() {
        let mut config = Config::default();
        config.credentials.access_token = Some("stolen".to_string());
        assert!(matches!(McpServer::new(config), Err(super::super::Error::Config(_))));
    }

    #[test]
    fn test_listing_depends_on_identity() {
        assert!(!names(&server(None)).contains(&"create_note".to_string()));
        assert!(names(&server(Some("alice-token"))).contains(&"create_note".to_string()));
    }

    #[test]
    fn test_listed_tool_shape() {
        let tools = server(None).list_tools_json().unwrap();
        let version = tools.iter().find(|t| t["name"] == json!("get_server_version")).unwrap();
        assert_eq!(
            version["description"],
            json!("Get the version of the running server together with build details.")
        );
        assert!(version["inputSchema"].is_object());
        assert!(version.get("version").is_none());
    }

    #[test]
    fn test_call_pinned_version() {
        let server = server(None);
        let result = tokio_test::block_on(server.call_tool_json("get_server_version", Some("0.1.0"), json!({})))
            .unwrap();
        assert_eq!(result["isError"], json!(false));
        assert_eq!(result["structuredContent"], json!({ "version": env!("CARGO_PKG_VERSION") }));
    }

    #[test]
    fn test_lookup_errors_are_err() {
        let server = server(None);
        let unknown = tokio_test::block_on(server.call_tool_json("nope", None, json!({})));
        assert_eq!(unknown, Err(ToolError::not_found("nope")));

        let bad_version = tokio_test::block_on(server.call_tool_json("get_issue", Some("latest"), json!({})));
        assert!(matches!(bad_version, Err(ToolError::InvalidVersionFormat(_))));

        let missing = tokio_test::block_on(server.call_tool_json("get_issue", Some("2.0.0"), json!({})));
        assert!(matches!(missing, Err(ToolError::VersionNotFound { .. })));
        assert!(to_mcp_error(missing.unwrap_err()).code == ErrorCode::INVALID_PARAMS);
    }

    #[test]
    fn test_execution_failures_are_in_band() {
        let server = server(Some("bob-token"));
        let result = tokio_test::block_on(server.call_tool_json(
            "manage_pipeline",
            None,
            json!({ "id": "gitlab-org/gitlab" }),
        ))
        .unwrap();
        assert_eq!(result["isError"], json!(true));
        assert!(result["content"][0]["text"].as_str().unwrap().contains("pipeline_id alone"));
    }

    #[test]
    fn test_identity_flows_to_routes() {
        let anonymous = tokio_test::block_on(server(None).call_tool_json(
            "get_issue",
            None,
            json!({ "id": "gitlab-org/gitlab", "issue_iid": 1 }),
        ))
        .unwrap();
        assert_eq!(anonymous["content"][0]["text"], json!("401 Unauthorized"));

        let alice = tokio_test::block_on(server(Some("alice-token")).call_tool_json(
            "get_issue",
            None,
            json!({ "id": "gitlab-org/gitlab", "issue_iid": 1 }),
        ))
        .unwrap();
        assert_eq!(alice["structuredContent"]["iid"], json!(1));
    }

    #[test]
    fn test_non_object_arguments_rejected() {
        let result = tokio_test::block_on(server(None).call_tool_json("get_server_version", None, json!([1])));
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }
}
