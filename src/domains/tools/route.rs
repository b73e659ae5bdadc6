//! The route table consumed by discovery.
//!
//! Routes come from the web layer. A route carrying [`ToolMetadata`] is
//! exposed as a tool, either on its own or as one of the tools behind an
//! aggregator.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::ToolRequest;

/// Tool metadata attached to a route.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolMetadata {
    pub tool_name: String,
    /// Route parameters exposed to the tool, in declaration order.
    pub params: Vec<String>,
    /// Aggregators this route belongs to. `None` means standalone.
    pub aggregators: Option<Vec<String>>,
    /// Version the tool is published under, [`DEFAULT_VERSION`] if absent.
    ///
    /// [`DEFAULT_VERSION`]: super::version::DEFAULT_VERSION
    pub version: Option<String>,
}

impl ToolMetadata {
    pub fn new<I, S>(tool_name: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tool_name: tool_name.into(),
            params: params.into_iter().map(Into::into).collect(),
            aggregators: None,
            version: None,
        }
    }

    pub fn aggregated_by(mut self, aggregator: impl Into<String>) -> Self {
        self.aggregators.get_or_insert_with(Vec::new).push(aggregator.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// Declaration of one route parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteParam {
    /// Type name as declared by the web layer, e.g. `String`, `[String, Integer]`.
    pub param_type: String,
    pub required: bool,
    pub description: Option<String>,
}

impl RouteParam {
    pub fn required(param_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            param_type: param_type.into(),
            required: true,
            description: Some(description.into()),
        }
    }

    pub fn optional(param_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            param_type: param_type.into(),
            required: false,
            description: Some(description.into()),
        }
    }
}

/// Response header a paginated route sets when another page follows.
pub const NEXT_PAGE_HEADER: &str = "x-next-page";

/// What a route handler returns.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl RouteResponse {
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Self {
            status,
            headers,
            body: body.to_string(),
        }
    }
}

pub type RouteHandler = Arc<dyn Fn(ToolRequest) -> RouteResponse + Send + Sync>;

/// One entry of the route table.
#[derive(Clone)]
pub struct Route {
    pub method: String,
    pub path: String,
    pub description: Option<String>,
    pub params: BTreeMap<String, RouteParam>,
    pub tool: Option<ToolMetadata>,
    handler: RouteHandler,
}

impl Route {
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        handler: impl Fn(ToolRequest) -> RouteResponse + Send + Sync + 'static,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            description: None,
            params: BTreeMap::new(),
            tool: None,
            handler: Arc::new(handler),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, param: RouteParam) -> Self {
        self.params.insert(name.into(), param);
        self
    }

    pub fn tool(mut self, metadata: ToolMetadata) -> Self {
        self.tool = Some(metadata);
        self
    }

    /// Invoke the handler in-process.
    pub fn exec(&self, request: ToolRequest) -> RouteResponse {
        (self.handler)(request)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("tool", &self.tool)
            .finish_non_exhaustive()
    }
}

/// Source of routes, scanned once per registry.
pub trait RouteTable: Send + Sync {
    fn routes(&self) -> Vec<Route>;
}

/// A fixed, in-memory route table.
#[derive(Debug, Clone, Default)]
pub struct StaticRouteTable {
    routes: Vec<Route>,
}

impl StaticRouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }
}

impl RouteTable for StaticRouteTable {
    fn routes(&self) -> Vec<Route> {
        self.routes.clone()
    }
}
