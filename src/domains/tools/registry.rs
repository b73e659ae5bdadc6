//! Tool Registry - discovery and lookup for all tools.
//!
//! This module provides:
//! - Discovery of static, route-backed and aggregated tools
//! - A snapshot built once per registry and shared by every call
//! - Version-aware lookup for the protocol server

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};

use tracing::{info, instrument, warn};

use super::aggregated::{AggregatedTool, SelectionStrategy};
use super::route::RouteTable;
use super::route_tool::RouteBackedTool;
use super::tool::{ResolvedTool, Tool, ToolDescriptor};
use super::version::parse_version;
use super::ToolError;

// ============================================================================
// Extension Point
// ============================================================================

/// Contributes tools and selection strategies at discovery time.
///
/// Editions and integrations extend the registry through plugins instead of
/// patching the built-in tool set.
pub trait ToolPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        Vec::new()
    }

    fn selection_strategies(&self) -> Vec<Arc<dyn SelectionStrategy>> {
        Vec::new()
    }
}

// ============================================================================
// Snapshot
// ============================================================================

const STATIC_SOURCE: &str = "static tools";
const ROUTE_SOURCE: &str = "route tools";
const AGGREGATED_SOURCE: &str = "aggregated tools";

/// All tools known to one registry. Immutable once built.
struct Snapshot {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Tool names in discovery order, for stable listing.
    order: Vec<String>,
}

impl Snapshot {
    fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Merge one source in. A name already claimed by an earlier source is
    /// a discovery error.
    fn merge(
        &mut self,
        sources: &mut HashMap<String, &'static str>,
        source: &'static str,
        tools: Vec<Arc<dyn Tool>>,
    ) -> Result<(), ToolError> {
        for tool in tools {
            let name = tool.name().to_string();
            if let Some(&existing) = sources.get(&name) {
                return Err(ToolError::DuplicateTool {
                    name,
                    existing,
                    incoming: source,
                });
            }
            sources.insert(name.clone(), source);
            self.order.push(name.clone());
            self.tools.insert(name, tool);
        }
        Ok(())
    }
}

// ============================================================================
// Tool Registry
// ============================================================================

/// Tool registry - the single entry point used by the protocol server.
///
/// Discovery runs lazily on first access and at most once, even when many
/// threads race on a fresh registry. Reads after that do not lock.
pub struct ToolRegistry {
    route_table: Arc<dyn RouteTable>,
    static_tools: Vec<Arc<dyn Tool>>,
    strategies: Vec<Arc<dyn SelectionStrategy>>,
    plugins: Vec<Arc<dyn ToolPlugin>>,
    snapshot: OnceLock<Result<Snapshot, ToolError>>,
}

impl ToolRegistry {
    pub fn builder(route_table: Arc<dyn RouteTable>) -> ToolRegistryBuilder {
        ToolRegistryBuilder {
            route_table,
            static_tools: Vec::new(),
            strategies: Vec::new(),
            plugins: Vec::new(),
        }
    }

    /// All known tools in discovery order.
    pub fn list(&self) -> Result<Vec<Arc<dyn Tool>>, ToolError> {
        let snapshot = self.snapshot()?;
        Ok(snapshot
            .order
            .iter()
            .filter_map(|name| snapshot.tools.get(name).cloned())
            .collect())
    }

    /// Every tool bound to its latest version.
    pub fn list_resolved(&self) -> Result<Vec<ResolvedTool>, ToolError> {
        self.list()?
            .into_iter()
            .map(|tool| {
                let version = tool.versions().resolve(tool.name(), None)?;
                Ok(ResolvedTool::new(tool, version))
            })
            .collect()
    }

    /// Descriptors of every tool at its latest version.
    pub fn descriptors(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        Ok(self.list_resolved()?.iter().map(ResolvedTool::descriptor).collect())
    }

    pub fn tool_names(&self) -> Result<Vec<String>, ToolError> {
        Ok(self.snapshot()?.order.clone())
    }

    /// Look up a tool bound to `version`, or to its latest version if none
    /// is given.
    ///
    /// The version format is checked before the name is looked up.
    #[instrument(skip(self))]
    pub fn get(&self, name: &str, version: Option<&str>) -> Result<ResolvedTool, ToolError> {
        if let Some(version) = version {
            parse_version(version)?;
        }

        let snapshot = self.snapshot()?;
        let tool = snapshot
            .tools
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::not_found(name))?;

        let resolved = tool.versions().resolve(name, version)?;
        Ok(ResolvedTool::new(tool, resolved))
    }

    fn snapshot(&self) -> Result<&Snapshot, ToolError> {
        self.snapshot
            .get_or_init(|| self.discover())
            .as_ref()
            .map_err(|e| e.clone())
    }

    /// Scan every source once and merge the results.
    #[instrument(skip_all)]
    fn discover(&self) -> Result<Snapshot, ToolError> {
        let mut static_tools = self.static_tools.clone();
        let mut strategies = self.strategies.clone();
        for plugin in &self.plugins {
            info!("Loading tool plugin {}", plugin.name());
            static_tools.extend(plugin.tools());
            strategies.extend(plugin.selection_strategies());
        }

        let mut route_tools: Vec<Arc<dyn Tool>> = Vec::new();
        // BTreeMap keeps aggregator construction order deterministic.
        let mut grouped: BTreeMap<String, Vec<Arc<dyn Tool>>> = BTreeMap::new();

        for route in self.route_table.routes() {
            let Some(metadata) = route.tool.clone() else {
                continue;
            };
            let tool: Arc<dyn Tool> = Arc::new(RouteBackedTool::new(route)?);
            match metadata.aggregators {
                None => route_tools.push(tool),
                Some(aggregators) => {
                    for aggregator in aggregators {
                        grouped.entry(aggregator).or_default().push(tool.clone());
                    }
                }
            }
        }

        let mut aggregated_tools: Vec<Arc<dyn Tool>> = Vec::new();
        for (aggregator, tools) in grouped {
            let strategy = strategies
                .iter()
                .find(|s| s.aggregator() == aggregator)
                .cloned()
                .ok_or_else(|| {
                    ToolError::configuration(format!("no selection strategy registered for aggregator {}", aggregator))
                })?;
            aggregated_tools.push(Arc::new(AggregatedTool::new(strategy, tools)?));
        }

        for strategy in &strategies {
            if !aggregated_tools.iter().any(|t| t.name() == strategy.aggregator()) {
                warn!("Selection strategy {} has no routes; skipping", strategy.aggregator());
            }
        }

        info!(
            static_tools = static_tools.len(),
            route_tools = route_tools.len(),
            aggregated_tools = aggregated_tools.len(),
            "Tool discovery complete"
        );

        let mut snapshot = Snapshot::new();
        let mut sources = HashMap::new();
        snapshot.merge(&mut sources, STATIC_SOURCE, static_tools)?;
        snapshot.merge(&mut sources, ROUTE_SOURCE, route_tools)?;
        snapshot.merge(&mut sources, AGGREGATED_SOURCE, aggregated_tools)?;
        Ok(snapshot)
    }
}

/// Builder for [`ToolRegistry`].
pub struct ToolRegistryBuilder {
    route_table: Arc<dyn RouteTable>,
    static_tools: Vec<Arc<dyn Tool>>,
    strategies: Vec<Arc<dyn SelectionStrategy>>,
    plugins: Vec<Arc<dyn ToolPlugin>>,
}

impl ToolRegistryBuilder {
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.static_tools.push(tool);
        self
    }

    pub fn strategy(mut self, strategy: Arc<dyn SelectionStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn plugin(mut self, plugin: Arc<dyn ToolPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Build the registry. Discovery is deferred until first use.
    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            route_table: self.route_table,
            static_tools: self.static_tools,
            strategies: self.strategies,
            plugins: self.plugins,
            snapshot: OnceLock::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::aggregated::Selection;
    use crate::domains::tools::direct::DirectTool;
    use crate::domains::tools::route::{Route, RouteParam, RouteResponse, StaticRouteTable, ToolMetadata};
    use crate::domains::tools::tool::CallContext;
    use crate::domains::tools::version::VersionMetadata;
    use serde_json::{Map, Value, json};
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Route table that counts how often it is scanned.
    struct CountingTable {
        inner: StaticRouteTable,
        scans: AtomicUsize,
    }

    impl RouteTable for CountingTable {
        fn routes(&self) -> Vec<Route> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            self.inner.routes()
        }
    }

    struct Always(&'static str, &'static str);

    impl SelectionStrategy for Always {
        fn aggregator(&self) -> &str {
            self.0
        }

        fn description(&self) -> String {
            format!("Always {}", self.1)
        }

        fn input_schema(&self) -> Value {
            json!({ "type": "object" })
        }

        fn transform_arguments(&self, arguments: Map<String, Value>) -> Result<Selection, ToolError> {
            Ok(Selection::new(self.1, arguments))
        }
    }

    fn route(name: &str, aggregator: Option<&str>) -> Route {
        let tool_name = name.to_string();
        let mut metadata = ToolMetadata::new(name, ["id"]);
        if let Some(aggregator) = aggregator {
            metadata = metadata.aggregated_by(aggregator);
        }
        Route::new("GET", format!("/{}", name), move |_| RouteResponse::json(200, &json!({ "tool": tool_name })))
            .param("id", RouteParam::optional("String", "ID"))
            .tool(metadata)
    }

    fn static_tool(name: &str) -> Arc<dyn Tool> {
        Arc::new(
            DirectTool::builder(name)
                .version("0.1.0", VersionMetadata::new("v0", json!({ "type": "object" })))
                .version("1.0.0", VersionMetadata::new("v1", json!({ "type": "object" })))
                .default_handler(|input| Ok(json!({ "version": input.version })))
                .build()
                .unwrap(),
        )
    }

    fn counting(routes: Vec<Route>) -> Arc<CountingTable> {
        Arc::new(CountingTable {
            inner: StaticRouteTable::new(routes),
            scans: AtomicUsize::new(0),
        })
    }

    fn registry(table: Arc<CountingTable>) -> ToolRegistry {
        ToolRegistry::builder(table)
            .tool(static_tool("get_server_version"))
            .strategy(Arc::new(Always("search", "search_in_instance")))
            .build()
    }

    fn default_routes() -> Vec<Route> {
        vec![
            route("get_issue", None),
            route("search_in_instance", Some("search")),
            route("search_in_group", Some("search")),
            Route::new("GET", "/health", |_| RouteResponse::json(200, &json!({}))),
        ]
    }

    #[test]
    fn test_registry_tool_names() {
        let registry = registry(counting(default_routes()));
        let names = registry.tool_names().unwrap();
        assert_eq!(names, vec!["get_server_version", "get_issue", "search"]);
    }

    #[test]
    fn test_discovery_runs_once() {
        let table = counting(default_routes());
        let registry = registry(table.clone());
        let first: Vec<_> = registry.descriptors().unwrap();
        let second: Vec<_> = registry.descriptors().unwrap();
        registry.get("get_issue", None).unwrap();
        assert_eq!(first, second);
        assert_eq!(table.scans.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_first_access_scans_once() {
        const THREADS: usize = 16;
        let table = counting(default_routes());
        let registry = registry(table.clone());
        let barrier = Barrier::new(THREADS);

        let results: Vec<Vec<String>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|i| {
                    let registry = &registry;
                    let barrier = &barrier;
                    scope.spawn(move || {
                        barrier.wait();
                        if i % 2 == 0 {
                            registry.get("search", None).unwrap();
                        }
                        registry.tool_names().unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(table.scans.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(results[0].len(), 3);
    }

    #[test]
    fn test_registry_get_unknown() {
        let registry = registry(counting(default_routes()));
        let err = registry.get("unknown", None).unwrap_err();
        assert_eq!(err, ToolError::not_found("unknown"));
    }

    #[test]
    fn test_invalid_version_checked_before_lookup() {
        let table = counting(default_routes());
        let registry = registry(table.clone());
        let err = registry.get("unknown", Some("not-a-version")).unwrap_err();
        assert_eq!(err, ToolError::invalid_version("not-a-version"));
        assert_eq!(table.scans.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_version_not_found_lists_available() {
        let registry = registry(counting(default_routes()));
        let err = registry.get("get_issue", Some("1.2.3")).unwrap_err();
        assert_eq!(err, ToolError::version_not_found("get_issue", "1.2.3", vec!["0.1.0".to_string()]));
    }

    #[test]
    fn test_version_binding() {
        let registry = registry(counting(default_routes()));
        let latest = registry.get("get_server_version", None).unwrap();
        assert_eq!(latest.version(), "1.0.0");
        assert_eq!(latest.descriptor().description, "v1");

        let pinned = registry.get("get_server_version", Some("0.1.0")).unwrap();
        let result = pinned.execute(&CallContext::anonymous(), Map::new());
        assert_eq!(result.structured_content(), &json!({ "version": "0.1.0" }));
    }

    #[test]
    fn test_aggregated_tool_dispatches_to_route() {
        let registry = registry(counting(default_routes()));
        let search = registry.get("search", None).unwrap();
        assert_eq!(search.descriptor().description, "Always search_in_instance");
        let result = search.execute(&CallContext::anonymous(), Map::new());
        assert!(!result.is_error());
        assert_eq!(result.structured_content(), &json!({ "tool": "search_in_instance" }));
    }

    #[test]
    fn test_duplicate_names_fail_discovery() {
        let table = counting(vec![route("get_server_version", None)]);
        let registry = registry(table.clone());
        let Err(err) = registry.list() else {
            panic!("expected a duplicate tool error");
        };
        assert_eq!(
            err,
            ToolError::DuplicateTool {
                name: "get_server_version".to_string(),
                existing: STATIC_SOURCE,
                incoming: ROUTE_SOURCE,
            }
        );
        // The failure is cached like a successful snapshot.
        assert!(registry.get("get_issue", None).is_err());
        assert_eq!(table.scans.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_aggregator_without_strategy_fails_discovery() {
        let registry = ToolRegistry::builder(counting(vec![route("list_things", Some("manage_things"))])).build();
        assert!(matches!(registry.list(), Err(ToolError::Configuration(_))));
    }

    struct ExtraTools;

    impl ToolPlugin for ExtraTools {
        fn name(&self) -> &str {
            "extra"
        }

        fn tools(&self) -> Vec<Arc<dyn Tool>> {
            vec![static_tool("plugin_tool")]
        }

        fn selection_strategies(&self) -> Vec<Arc<dyn SelectionStrategy>> {
            vec![Arc::new(Always("manage_things", "list_things"))]
        }
    }

    #[test]
    fn test_plugins_extend_discovery() {
        let registry = ToolRegistry::builder(counting(vec![route("list_things", Some("manage_things"))]))
            .plugin(Arc::new(ExtraTools))
            .build();
        let names = registry.tool_names().unwrap();
        assert_eq!(names, vec!["plugin_tool", "manage_things"]);
    }
}
