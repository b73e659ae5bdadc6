//! Versioned tool dispatch for MCP servers.
//!
//! This crate exposes an application's operations to MCP clients as
//! versioned tools. Tools are discovered once from an API route table and
//! a catalog of hand-written tools, validated against their JSON Schema and
//! dispatched with the caller's identity.
//!
//! # Architecture
//!
//! - **core**: Configuration, error handling, the MCP server and its transports
//! - **domains**: Business logic organized by bounded contexts
//!   - **tools**: Discovery, versioning, validation and dispatch of tools
//!   - **api**: The sample API the tools act on
//!
//! # Example
//!
//! ```rust,no_run
//! use tool_dispatch_server::{core::McpServer, core::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env();
//!     let server = McpServer::new(config)?;
//!     // Start the server...
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod domains;

// Re-export commonly used types for convenience
pub use core::{Config, Error, McpServer, Result};
