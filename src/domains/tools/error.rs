//! Tool-specific error types.

use thiserror::Error;

/// Errors that can occur while resolving, building or executing tools.
///
/// Only the three lookup kinds (`NotFound`, `VersionNotFound`,
/// `InvalidVersionFormat`) are allowed to leave the registry as errors.
/// Everything raised during execution is folded into an error
/// [`CallResult`](super::CallResult) before it reaches the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    /// The requested tool was not found.
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// The tool exists but does not expose the requested version.
    #[error(
        "Version {requested} not found for tool {name}. Available versions: {}",
        .available.join(", ")
    )]
    VersionNotFound {
        name: String,
        requested: String,
        available: Vec<String>,
    },

    /// The requested version is not a semantic version.
    #[error("Invalid semantic version format: {0}")]
    InvalidVersionFormat(String),

    /// The arguments do not satisfy the tool's input schema.
    #[error("Validation error: {}", .0.join(", "))]
    Validation(Vec<String>),

    /// Invalid arguments were provided to the tool.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The caller has no identity, or lacks the required ability.
    #[error("Access denied: {0}")]
    Authorization(String),

    /// An aggregated tool could not work out which tool to call.
    #[error("{0}")]
    Selection(String),

    /// The underlying operation failed.
    #[error("{0}")]
    Delegate(String),

    /// A tool or the registry was set up inconsistently.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Two discovery sources produced the same tool name.
    #[error("Tool '{name}' is registered by both {existing} and {incoming}")]
    DuplicateTool {
        name: String,
        existing: &'static str,
        incoming: &'static str,
    },
}

impl ToolError {
    /// Create a new "not found" error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Create a new "version not found" error.
    pub fn version_not_found(
        name: impl Into<String>,
        requested: impl Into<String>,
        available: Vec<String>,
    ) -> Self {
        Self::VersionNotFound {
            name: name.into(),
            requested: requested.into(),
            available,
        }
    }

    /// Create a new "invalid version format" error.
    pub fn invalid_version(version: impl Into<String>) -> Self {
        Self::InvalidVersionFormat(version.into())
    }

    /// Create a new "invalid arguments" error.
    pub fn invalid_arguments(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    /// Create a new "access denied" error.
    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    /// Create a new "selection" error.
    pub fn selection(msg: impl Into<String>) -> Self {
        Self::Selection(msg.into())
    }

    /// Create a new "delegate" error.
    pub fn delegate(msg: impl Into<String>) -> Self {
        Self::Delegate(msg.into())
    }

    /// Create a new "configuration" error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether this is one of the registry lookup errors that the transport
    /// maps to a protocol-level error code.
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::VersionNotFound { .. } | Self::InvalidVersionFormat(_)
        )
    }
}

impl From<anyhow::Error> for ToolError {
    fn from(err: anyhow::Error) -> Self {
        Self::Delegate(err.to_string())
    }
}
