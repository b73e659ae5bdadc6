//! Semantic versions and per-tool version registries.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use semver::Version;
use serde_json::{Map, Value};

use super::ToolError;

/// Version given to tools that never declare one.
pub const DEFAULT_VERSION: &str = "0.1.0";

/// Parse a strict `MAJOR.MINOR.PATCH[-pre][+build]` version.
pub fn parse_version(version: &str) -> Result<Version, ToolError> {
    Version::parse(version).map_err(|_| ToolError::invalid_version(version))
}

/// Whether `version` is a valid semantic version.
pub fn is_valid_version(version: &str) -> bool {
    Version::parse(version).is_ok()
}

/// A value that is either fixed at registration or recomputed on every read.
#[derive(Clone)]
pub enum LazyField<T> {
    Static(T),
    Computed(Arc<dyn Fn() -> T + Send + Sync>),
}

impl<T: Clone> LazyField<T> {
    pub fn computed(f: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self::Computed(Arc::new(f))
    }

    pub fn resolve(&self) -> T {
        match self {
            Self::Static(value) => value.clone(),
            Self::Computed(f) => f(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for LazyField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<&str> for LazyField<String> {
    fn from(value: &str) -> Self {
        Self::Static(value.to_string())
    }
}

impl From<String> for LazyField<String> {
    fn from(value: String) -> Self {
        Self::Static(value)
    }
}

impl From<Value> for LazyField<Value> {
    fn from(value: Value) -> Self {
        Self::Static(value)
    }
}

/// Metadata registered for one version of a tool.
#[derive(Debug, Clone)]
pub struct VersionMetadata {
    pub description: LazyField<String>,
    pub input_schema: LazyField<Value>,
    pub extra: Map<String, Value>,
}

impl VersionMetadata {
    pub fn new(description: impl Into<LazyField<String>>, input_schema: impl Into<LazyField<Value>>) -> Self {
        Self {
            description: description.into(),
            input_schema: input_schema.into(),
            extra: Map::new(),
        }
    }

    /// Attach an arbitrary metadata entry.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// The versions a tool exposes, keyed by semantic version.
///
/// Populated while the tool is built and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct VersionRegistry {
    versions: BTreeMap<Version, VersionMetadata>,
}

impl VersionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a single version.
    pub fn single(version: &str, metadata: VersionMetadata) -> Result<Self, ToolError> {
        let mut registry = Self::new();
        registry.register(version, metadata)?;
        Ok(registry)
    }

    /// Register a version. Invalid version strings are a configuration error.
    pub fn register(&mut self, version: &str, metadata: VersionMetadata) -> Result<(), ToolError> {
        let parsed = Version::parse(version).map_err(|e| {
            ToolError::configuration(format!("'{}' is not a semantic version: {}", version, e))
        })?;
        self.versions.insert(parsed, metadata);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Registered versions in ascending precedence.
    pub fn available(&self) -> Vec<String> {
        self.versions.keys().map(Version::to_string).collect()
    }

    /// Highest registered version.
    pub fn latest(&self) -> Option<String> {
        self.versions.keys().next_back().map(Version::to_string)
    }

    pub fn contains(&self, version: &str) -> bool {
        Version::parse(version)
            .map(|v| self.versions.contains_key(&v))
            .unwrap_or(false)
    }

    pub fn metadata(&self, version: &str) -> Option<&VersionMetadata> {
        let parsed = Version::parse(version).ok()?;
        self.versions.get(&parsed)
    }

    /// Description for `version`, evaluated now.
    pub fn description(&self, version: &str) -> Option<String> {
        self.metadata(version).map(|m| m.description.resolve())
    }

    /// Input schema for `version`, evaluated now.
    pub fn input_schema(&self, version: &str) -> Option<Value> {
        self.metadata(version).map(|m| m.input_schema.resolve())
    }

    /// Resolve a requested version: `None` means latest, anything else must
    /// be registered exactly.
    pub fn resolve(&self, tool: &str, requested: Option<&str>) -> Result<String, ToolError> {
        match requested {
            None => self
                .latest()
                .ok_or_else(|| ToolError::configuration(format!("tool {} has no versions", tool))),
            Some(version) => {
                if self.contains(version) {
                    Ok(version.to_string())
                } else {
                    Err(ToolError::version_not_found(tool, version, self.available()))
                }
            }
        }
    }
}
