//! Tools that front several underlying tools and pick one per call.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::schema::ensure_valid;
use super::tool::{CallContext, Tool, contain_result};
use super::version::{DEFAULT_VERSION, LazyField, VersionMetadata, VersionRegistry};
use super::{CallResult, ToolError};

/// The outcome of inspecting the raw arguments of an aggregated call.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Name of the underlying tool to call.
    pub tool_name: String,
    /// Arguments rewritten for that tool's schema.
    pub arguments: Map<String, Value>,
    /// The inferred operation, kept out of the forwarded arguments.
    pub operation: Option<String>,
}

impl Selection {
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            operation: None,
        }
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }
}

/// How an aggregator chooses its underlying tool.
///
/// Strategies are stateless: everything about one call travels in the
/// arguments and the returned [`Selection`].
pub trait SelectionStrategy: Send + Sync {
    /// Name of the aggregated tool this strategy drives.
    fn aggregator(&self) -> &str;

    fn description(&self) -> String;

    fn input_schema(&self) -> Value;

    fn version(&self) -> &str {
        DEFAULT_VERSION
    }

    /// Infer the target tool and rewrite the arguments for it.
    fn transform_arguments(&self, arguments: Map<String, Value>) -> Result<Selection, ToolError>;

    /// Decorate a successful result. The default leaves it untouched.
    fn enhance(&self, _selection: &Selection, result: CallResult) -> CallResult {
        result
    }
}

/// One client-facing tool delegating to one of several tools.
#[derive(Clone)]
pub struct AggregatedTool {
    strategy: Arc<dyn SelectionStrategy>,
    tools: Vec<Arc<dyn Tool>>,
    versions: VersionRegistry,
}

impl AggregatedTool {
    pub fn new(strategy: Arc<dyn SelectionStrategy>, tools: Vec<Arc<dyn Tool>>) -> Result<Self, ToolError> {
        let description = {
            let strategy = strategy.clone();
            LazyField::computed(move || strategy.description())
        };
        let input_schema = {
            let strategy = strategy.clone();
            LazyField::computed(move || strategy.input_schema())
        };
        let versions = VersionRegistry::single(
            strategy.version(),
            VersionMetadata::new(description, input_schema),
        )?;

        Ok(Self {
            strategy,
            tools,
            versions,
        })
    }

    /// Names of the underlying tools.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Find the underlying tool named by `selection`.
    pub fn select_tool(&self, selection: &Selection) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == selection.tool_name)
    }

    fn run(&self, ctx: &CallContext, version: &str, arguments: Map<String, Value>) -> Result<CallResult, ToolError> {
        ensure_valid(&self.input_schema(version), &arguments)?;

        let selection = self.strategy.transform_arguments(arguments)?;
        let tool = self
            .select_tool(&selection)
            .ok_or_else(|| ToolError::not_found(selection.tool_name.clone()))?;

        let tool_version = tool
            .versions()
            .latest()
            .ok_or_else(|| ToolError::configuration(format!("tool {} has no versions", tool.name())))?;

        debug!(
            selected = %selection.tool_name,
            operation = ?selection.operation,
            "Delegating aggregated call"
        );
        let result = tool.execute(ctx, &tool_version, selection.arguments.clone());

        if result.is_error() {
            Ok(result)
        } else {
            Ok(self.strategy.enhance(&selection, result))
        }
    }
}

impl Tool for AggregatedTool {
    fn name(&self) -> &str {
        self.strategy.aggregator()
    }

    fn versions(&self) -> &VersionRegistry {
        &self.versions
    }

    fn is_available(&self, ctx: &CallContext) -> bool {
        self.tools.iter().any(|t| t.is_available(ctx))
    }

    #[instrument(skip_all, fields(aggregator = %self.strategy.aggregator()))]
    fn execute(&self, ctx: &CallContext, version: &str, arguments: Map<String, Value>) -> CallResult {
        contain_result(|| self.run(ctx, version, arguments))
    }
}

impl std::fmt::Debug for AggregatedTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatedTool")
            .field("name", &self.strategy.aggregator())
            .field("tools", &self.tool_names())
            .finish()
    }
}
