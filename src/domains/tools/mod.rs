//! Tools domain module.
//!
//! Tools are named, versioned operations that MCP clients can call. They
//! come from three places:
//!
//! - hand-written [`DirectTool`]s registered in `catalog.rs`
//! - API routes carrying tool metadata, wrapped as [`RouteBackedTool`]s
//! - aggregators fronting several routes, driven by a [`SelectionStrategy`]
//!
//! ## Architecture
//!
//! - `tool.rs` - The `Tool` trait, call context and version-bound handle
//! - `version.rs` - Semantic versions and lazily evaluated metadata
//! - `schema.rs` - JSON Schema validation of call arguments
//! - `response.rs` - The call result envelope
//! - `registry.rs` - Discovery and lookup
//! - `definitions/` - Individual tools and selection strategies
//!
//! ## Adding a New Tool
//!
//! 1. Expose an API route with `ToolMetadata`; it is discovered automatically
//! 2. Or create a file in `definitions/` building a `DirectTool`
//! 3. Register it in `catalog.rs`

pub mod aggregated;
pub mod auth;
mod catalog;
pub mod definitions;
pub mod direct;
mod error;
pub mod registry;
mod response;
pub mod route;
pub mod route_tool;
pub mod schema;
pub mod tool;
pub mod version;

pub use aggregated::{AggregatedTool, Selection, SelectionStrategy};
pub use auth::{Actor, Authorizer, DenyAll, Target};
pub use catalog::build_tool_registry;
pub use direct::{DirectTool, HandlerInput};
pub use error::ToolError;
pub use registry::{ToolPlugin, ToolRegistry};
pub use response::{CallResult, ContentBlock};
pub use route::{NEXT_PAGE_HEADER, Route, RouteParam, RouteResponse, RouteTable, StaticRouteTable, ToolMetadata};
pub use route_tool::RouteBackedTool;
pub use tool::{CallContext, ResolvedTool, Tool, ToolDescriptor, ToolRequest};
pub use version::{DEFAULT_VERSION, LazyField, VersionMetadata, VersionRegistry};
