//! Create note tool definition.
//!
//! Adds a comment to an issue on behalf of the authenticated user. The
//! caller needs the `create_note` ability on the issue's project.

use std::sync::Arc;

use anyhow::Context;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::domains::api::ApiStore;
use crate::domains::tools::{DirectTool, LazyField, Target, ToolError, VersionMetadata};

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for the create note tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateNoteParams {
    /// ID or URL-encoded path of the project.
    pub project_id: String,

    /// Internal ID of the issue within the project.
    pub issue_iid: u64,

    /// Note body, Markdown allowed.
    pub body: String,
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct CreateNoteTool;

impl CreateNoteTool {
    /// Tool name as registered in MCP.
    pub const NAME: &'static str = "create_note";

    pub fn build(store: Arc<ApiStore>) -> Result<DirectTool, ToolError> {
        let description = {
            let store = store.clone();
            LazyField::computed(move || {
                format!(
                    "Add a comment to an issue. Known projects: {}",
                    store.project_paths().join(", ")
                )
            })
        };
        let schema = schemars::schema_for!(CreateNoteParams).to_value();

        DirectTool::builder(Self::NAME)
            .version("0.1.0", VersionMetadata::new(description, schema))
            .requires_actor()
            .available_when(|ctx| ctx.actor.is_some())
            .authorize("create_note", project_target)
            .default_handler(move |input| {
                let params: CreateNoteParams = serde_json::from_value(Value::Object(input.arguments.clone()))?;
                let author = input.actor.context("an authenticated user is required")?;

                let mut data = store.write();
                let project_id = data
                    .project(&params.project_id)
                    .map(|p| p.id)
                    .with_context(|| format!("Project {} not found", params.project_id))?;
                let issue_id = data
                    .issue(project_id, params.issue_iid)
                    .map(|i| i.id)
                    .with_context(|| format!("Issue #{} not found", params.issue_iid))?;

                let note = data.add_note(issue_id, author.id, &params.body);
                info!("Note {} created on issue {} by {}", note.id, issue_id, author.username);
                Ok(serde_json::to_value(note)?)
            })
            .build()
    }
}

fn project_target(arguments: &Map<String, Value>) -> Option<Target> {
    arguments
        .get("project_id")
        .and_then(Value::as_str)
        .map(|id| Target::new("project", id))
}
