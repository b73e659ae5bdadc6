//! Tool catalog - assembles the registry served by the MCP server.
//!
//! Route-backed and aggregated tools come from the API route table; the
//! hand-written tools and selection strategies are registered here.

use std::sync::Arc;

use super::definitions::{CreateNoteTool, PipelineIntentStrategy, SearchScopeStrategy, ServerVersionTool};
use super::{ToolError, ToolRegistry};
use crate::domains::api::{ApiStore, route_table};

/// Build the registry over `store`. Discovery itself runs on first use.
pub fn build_tool_registry(store: Arc<ApiStore>) -> Result<ToolRegistry, ToolError> {
    let registry = ToolRegistry::builder(Arc::new(route_table(store.clone())))
        .tool(Arc::new(ServerVersionTool::build()?))
        .tool(Arc::new(CreateNoteTool::build(store)?))
        .strategy(Arc::new(SearchScopeStrategy))
        .strategy(Arc::new(PipelineIntentStrategy))
        .build();
    Ok(registry)
}
