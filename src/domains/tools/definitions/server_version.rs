//! Server version tool definition.
//!
//! Reports the running server version. Version `1.0.0` of the tool adds
//! build details on top of the original payload.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use crate::domains::tools::{DirectTool, ToolError, VersionMetadata};

/// The tool takes no arguments.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ServerVersionParams {}

pub struct ServerVersionTool;

impl ServerVersionTool {
    /// Tool name as registered in MCP.
    pub const NAME: &'static str = "get_server_version";

    pub fn build() -> Result<DirectTool, ToolError> {
        let schema = || schemars::schema_for!(ServerVersionParams).to_value();

        DirectTool::builder(Self::NAME)
            .version(
                "0.1.0",
                VersionMetadata::new("Get the version of the running server.", schema()),
            )
            .version(
                "1.0.0",
                VersionMetadata::new(
                    "Get the version of the running server together with build details.",
                    schema(),
                ),
            )
            .default_handler(|_| Ok(json!({ "version": env!("CARGO_PKG_VERSION") })))
            .handler_for("1.0.0", |input| {
                Ok(json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "name": env!("CARGO_PKG_NAME"),
                    "tool_version": input.version,
                }))
            })
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::{CallContext, Tool};
    use serde_json::Map;

    #[test]
    fn test_versions_dispatch_to_their_handlers() {
        let tool = ServerVersionTool::build().unwrap();
        let ctx = CallContext::anonymous();

        let v0 = tool.execute(&ctx, "0.1.0", Map::new());
        assert_eq!(v0.structured_content(), &json!({ "version": env!("CARGO_PKG_VERSION") }));

        let v1 = tool.execute(&ctx, "1.0.0", Map::new());
        assert_eq!(v1.structured_content()["tool_version"], json!("1.0.0"));
        assert_eq!(tool.versions().latest().as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_rejects_unknown_arguments() {
        let tool = ServerVersionTool::build().unwrap();
        let mut args = Map::new();
        args.insert("verbose".to_string(), json!(true));
        assert!(tool.execute(&CallContext::anonymous(), "0.1.0", args).is_error());
    }
}
