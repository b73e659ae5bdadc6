//! Hand-written tools with optional authorization.
//!
//! A call runs `identity check -> validate -> authorize -> perform ->
//! normalize`. Handlers are looked up per version with a declared default,
//! and the table is checked when the tool is built.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::auth::{Actor, Target};
use super::schema::ensure_valid;
use super::tool::{CallContext, Tool, contain_result};
use super::version::{VersionMetadata, VersionRegistry};
use super::{CallResult, ToolError};

/// Input handed to a handler.
#[derive(Debug)]
pub struct HandlerInput<'a> {
    pub arguments: &'a Map<String, Value>,
    pub actor: Option<&'a Actor>,
    /// The authorized target, when the tool requires authorization.
    pub target: Option<&'a Target>,
    pub version: &'a str,
}

/// A domain delegate. Errors become error results.
pub type Handler = Arc<dyn Fn(&HandlerInput<'_>) -> anyhow::Result<Value> + Send + Sync>;

/// Resolves the authorization target from the call arguments.
pub type TargetResolver = Arc<dyn Fn(&Map<String, Value>) -> Option<Target> + Send + Sync>;

type Availability = Arc<dyn Fn(&CallContext) -> bool + Send + Sync>;

#[derive(Clone)]
struct Authorization {
    ability: String,
    resolve_target: TargetResolver,
}

/// A tool implemented by handler functions.
#[derive(Clone)]
pub struct DirectTool {
    name: String,
    versions: VersionRegistry,
    handlers: BTreeMap<String, Handler>,
    default_handler: Option<Handler>,
    requires_actor: bool,
    authorization: Option<Authorization>,
    availability: Option<Availability>,
}

impl DirectTool {
    pub fn builder(name: impl Into<String>) -> DirectToolBuilder {
        DirectToolBuilder {
            name: name.into(),
            versions: Vec::new(),
            handlers: BTreeMap::new(),
            default_handler: None,
            requires_actor: false,
            authorization: None,
            availability: None,
        }
    }

    /// Check the caller is allowed to act on the resolved target.
    fn authorize(&self, ctx: &CallContext, arguments: &Map<String, Value>) -> Result<Option<Target>, ToolError> {
        let Some(auth) = &self.authorization else {
            return Ok(None);
        };

        let target = (auth.resolve_target)(arguments).ok_or_else(|| {
            ToolError::invalid_arguments(format!("no target could be resolved for {}", self.name))
        })?;

        let actor = ctx
            .actor
            .as_ref()
            .ok_or_else(|| ToolError::authorization("an authenticated user is required"))?;

        if !ctx.authorizer.allowed(actor, &auth.ability, &target) {
            return Err(ToolError::authorization(format!(
                "{} is not allowed to {} on {} {}",
                actor.username, auth.ability, target.kind, target.id
            )));
        }

        Ok(Some(target))
    }

    /// Dispatch to the version's handler, else the default one.
    fn perform(&self, input: &HandlerInput<'_>) -> Result<Value, ToolError> {
        let handler = self
            .handlers
            .get(input.version)
            .or(self.default_handler.as_ref())
            .ok_or_else(|| {
                ToolError::configuration(format!("{} has no handler for version {}", self.name, input.version))
            })?;
        Ok(handler(input)?)
    }

    fn run(&self, ctx: &CallContext, version: &str, arguments: Map<String, Value>) -> Result<CallResult, ToolError> {
        if self.requires_actor && ctx.actor.is_none() {
            return Err(ToolError::authorization("an authenticated user is required"));
        }

        ensure_valid(&self.input_schema(version), &arguments)?;
        let target = self.authorize(ctx, &arguments)?;

        debug!("Performing {} v{}", self.name, version);
        let input = HandlerInput {
            arguments: &arguments,
            actor: ctx.actor.as_ref(),
            target: target.as_ref(),
            version,
        };
        Ok(CallResult::success(self.perform(&input)?))
    }
}

impl Tool for DirectTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn versions(&self) -> &VersionRegistry {
        &self.versions
    }

    fn is_available(&self, ctx: &CallContext) -> bool {
        self.availability.as_ref().is_none_or(|available| available(ctx))
    }

    #[instrument(skip_all, fields(tool = %self.name))]
    fn execute(&self, ctx: &CallContext, version: &str, arguments: Map<String, Value>) -> CallResult {
        contain_result(|| self.run(ctx, version, arguments))
    }
}

impl std::fmt::Debug for DirectTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectTool")
            .field("name", &self.name)
            .field("versions", &self.versions.available())
            .field("requires_actor", &self.requires_actor)
            .finish_non_exhaustive()
    }
}

/// Builder for [`DirectTool`].
pub struct DirectToolBuilder {
    name: String,
    versions: Vec<(String, VersionMetadata)>,
    handlers: BTreeMap<String, Handler>,
    default_handler: Option<Handler>,
    requires_actor: bool,
    authorization: Option<Authorization>,
    availability: Option<Availability>,
}

impl DirectToolBuilder {
    /// Register a version and its metadata.
    pub fn version(mut self, version: impl Into<String>, metadata: VersionMetadata) -> Self {
        self.versions.push((version.into(), metadata));
        self
    }

    /// Handler used for one specific version.
    pub fn handler_for(
        mut self,
        version: impl Into<String>,
        handler: impl Fn(&HandlerInput<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(version.into(), Arc::new(handler));
        self
    }

    /// Handler used when no version-specific one is registered.
    pub fn default_handler(
        mut self,
        handler: impl Fn(&HandlerInput<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.default_handler = Some(Arc::new(handler));
        self
    }

    /// Reject calls without a bound identity.
    pub fn requires_actor(mut self) -> Self {
        self.requires_actor = true;
        self
    }

    /// Require `ability` on the target resolved from the arguments.
    pub fn authorize(
        mut self,
        ability: impl Into<String>,
        resolve_target: impl Fn(&Map<String, Value>) -> Option<Target> + Send + Sync + 'static,
    ) -> Self {
        self.authorization = Some(Authorization {
            ability: ability.into(),
            resolve_target: Arc::new(resolve_target),
        });
        self
    }

    pub fn available_when(mut self, predicate: impl Fn(&CallContext) -> bool + Send + Sync + 'static) -> Self {
        self.availability = Some(Arc::new(predicate));
        self
    }

    /// Build the tool, checking every version can be dispatched.
    pub fn build(self) -> Result<DirectTool, ToolError> {
        let mut versions = VersionRegistry::new();
        for (version, metadata) in self.versions {
            versions.register(&version, metadata)?;
        }
        if versions.is_empty() {
            return Err(ToolError::configuration(format!("{} registers no versions", self.name)));
        }

        for version in self.handlers.keys() {
            if !versions.contains(version) {
                return Err(ToolError::configuration(format!(
                    "{} has a handler for unregistered version {}",
                    self.name, version
                )));
            }
        }

        if self.default_handler.is_none() {
            let missing: Vec<String> = versions
                .available()
                .into_iter()
                .filter(|v| !self.handlers.contains_key(v))
                .collect();
            if !missing.is_empty() {
                return Err(ToolError::configuration(format!(
                    "{} has no handler for version(s) {} and no default handler",
                    self.name,
                    missing.join(", ")
                )));
            }
        }

        Ok(DirectTool {
            name: self.name,
            versions,
            handlers: self.handlers,
            default_handler: self.default_handler,
            requires_actor: self.requires_actor,
            authorization: self.authorization,
            availability: self.availability,
        })
    }
}
