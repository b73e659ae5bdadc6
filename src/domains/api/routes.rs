//! Route table of the sample API.
//!
//! Each route authenticates the caller from the `private-token` header,
//! reads its routing parameters and answers with a JSON body. Routes that
//! carry tool metadata are picked up by tool discovery.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};

use super::store::{ApiStore, Issue, Project, StoreData, User};
use crate::domains::tools::{
    NEXT_PAGE_HEADER, Route, RouteParam, RouteResponse, StaticRouteTable, ToolMetadata, ToolRequest,
};

/// Header carrying the caller's access token.
pub const TOKEN_HEADER: &str = "private-token";

/// Aggregator fronting the three search routes.
pub const SEARCH_AGGREGATOR: &str = "gitlab_search";

/// Aggregator fronting the pipeline routes.
pub const PIPELINE_AGGREGATOR: &str = "manage_pipeline";

const DEFAULT_PER_PAGE: usize = 20;
const MAX_PER_PAGE: usize = 100;

type Action = fn(&ApiStore, &User, &ToolRequest) -> Result<RouteResponse, RouteResponse>;

/// Build the route table over `store`.
pub fn route_table(store: Arc<ApiStore>) -> StaticRouteTable {
    StaticRouteTable::new(routes(store))
}

pub fn routes(store: Arc<ApiStore>) -> Vec<Route> {
    vec![
        Route::new("GET", "/version", |_| {
            RouteResponse::json(200, &json!({ "version": env!("CARGO_PKG_VERSION") }))
        }),
        // Issues
        Route::new("GET", "/projects/:id/issues/:issue_iid", authenticated(&store, get_issue))
            .describe("Get a single project issue")
            .param("id", id_param())
            .param("issue_iid", RouteParam::required("Integer", "The internal ID of the issue"))
            .tool(ToolMetadata::new("get_issue", ["id", "issue_iid"])),
        Route::new("POST", "/projects/:id/issues", authenticated(&store, create_issue))
            .describe("Create a new project issue")
            .param("id", id_param())
            .param("title", RouteParam::required("String", "The title of the issue"))
            .param("description", RouteParam::optional("String", "The description of the issue"))
            .param("labels", RouteParam::optional("Array[String]", "Labels to apply"))
            .param("confidential", RouteParam::optional("API::Boolean", "Whether the issue is confidential"))
            .param("assignee_ids", RouteParam::optional("Array[Integer]", "Not exposed to tools"))
            .tool(
                ToolMetadata::new("create_issue", ["id", "title", "description", "labels", "confidential"])
                    .with_version("1.0.0"),
            ),
        // Search
        Route::new("GET", "/search", authenticated(&store, search_instance))
            .describe("Search the whole instance")
            .param("scope", scope_param())
            .param("search", search_param())
            .param("page", page_param())
            .param("per_page", per_page_param())
            .tool(
                ToolMetadata::new("search_in_instance", ["scope", "search", "page", "per_page"])
                    .aggregated_by(SEARCH_AGGREGATOR),
            ),
        Route::new("GET", "/groups/:id/search", authenticated(&store, search_group))
            .describe("Search within a group")
            .param("id", RouteParam::required("[String, Integer]", "The ID or path of the group"))
            .param("scope", scope_param())
            .param("search", search_param())
            .param("page", page_param())
            .param("per_page", per_page_param())
            .tool(
                ToolMetadata::new("search_in_group", ["id", "scope", "search", "page", "per_page"])
                    .aggregated_by(SEARCH_AGGREGATOR),
            ),
        Route::new("GET", "/projects/:id/search", authenticated(&store, search_project))
            .describe("Search within a project")
            .param("id", id_param())
            .param("scope", scope_param())
            .param("search", search_param())
            .param("page", page_param())
            .param("per_page", per_page_param())
            .tool(
                ToolMetadata::new("search_in_project", ["id", "scope", "search", "page", "per_page"])
                    .aggregated_by(SEARCH_AGGREGATOR),
            ),
        // Pipelines
        Route::new("GET", "/projects/:id/pipelines", authenticated(&store, list_pipelines))
            .describe("List project pipelines")
            .param("id", id_param())
            .param("ref", RouteParam::optional("String", "Only pipelines for this ref"))
            .param("page", page_param())
            .param("per_page", per_page_param())
            .tool(
                ToolMetadata::new("list_pipelines", ["id", "ref", "page", "per_page"])
                    .aggregated_by(PIPELINE_AGGREGATOR),
            ),
        Route::new("POST", "/projects/:id/pipeline", authenticated(&store, create_pipeline))
            .describe("Create a new pipeline")
            .param("id", id_param())
            .param("ref", RouteParam::required("String", "Branch or tag to run the pipeline for"))
            .param("variables", RouteParam::optional("Array[JSON]", "Variables available in the pipeline"))
            .tool(
                ToolMetadata::new("create_pipeline", ["id", "ref", "variables"])
                    .aggregated_by(PIPELINE_AGGREGATOR),
            ),
        Route::new(
            "PUT",
            "/projects/:id/pipelines/:pipeline_id/metadata",
            authenticated(&store, update_pipeline_metadata),
        )
        .describe("Update pipeline metadata")
        .param("id", id_param())
        .param("pipeline_id", pipeline_id_param())
        .param("name", RouteParam::required("String", "The new pipeline name"))
        .tool(
            ToolMetadata::new("update_pipeline_metadata", ["id", "pipeline_id", "name"])
                .aggregated_by(PIPELINE_AGGREGATOR),
        ),
        Route::new(
            "POST",
            "/projects/:id/pipelines/:pipeline_id/retry",
            authenticated(&store, retry_pipeline),
        )
        .describe("Retry failed jobs of a pipeline")
        .param("id", id_param())
        .param("pipeline_id", pipeline_id_param())
        .tool(ToolMetadata::new("retry_pipeline", ["id", "pipeline_id"]).aggregated_by(PIPELINE_AGGREGATOR)),
        Route::new(
            "POST",
            "/projects/:id/pipelines/:pipeline_id/cancel",
            authenticated(&store, cancel_pipeline),
        )
        .describe("Cancel a running pipeline")
        .param("id", id_param())
        .param("pipeline_id", pipeline_id_param())
        .tool(ToolMetadata::new("cancel_pipeline", ["id", "pipeline_id"]).aggregated_by(PIPELINE_AGGREGATOR)),
        Route::new(
            "DELETE",
            "/projects/:id/pipelines/:pipeline_id",
            authenticated(&store, delete_pipeline),
        )
        .describe("Delete a pipeline")
        .param("id", id_param())
        .param("pipeline_id", pipeline_id_param())
        .tool(ToolMetadata::new("delete_pipeline", ["id", "pipeline_id"]).aggregated_by(PIPELINE_AGGREGATOR)),
    ]
}

// ============================================================================
// Parameter Declarations
// ============================================================================

fn id_param() -> RouteParam {
    RouteParam::required("[String, Integer]", "The ID or URL-encoded path of the project")
}

fn pipeline_id_param() -> RouteParam {
    RouteParam::required("Integer", "The ID of the pipeline")
}

fn scope_param() -> RouteParam {
    RouteParam::required("String", "The scope to search in, e.g. issues or projects")
}

fn search_param() -> RouteParam {
    RouteParam::required("String", "The search term")
}

fn page_param() -> RouteParam {
    RouteParam::optional("Integer", "Page number (default: 1)")
}

fn per_page_param() -> RouteParam {
    RouteParam::optional("Integer", "Items per page (default: 20, max: 100)")
}

// ============================================================================
// Request Helpers
// ============================================================================

fn authenticated(store: &Arc<ApiStore>, action: Action) -> impl Fn(ToolRequest) -> RouteResponse + Send + Sync + 'static {
    let store = store.clone();
    move |request| {
        let token = request.headers.get(TOKEN_HEADER).cloned().unwrap_or_default();
        let user = store.read().user_by_token(&token).cloned();
        match user {
            Some(user) => action(&store, &user, &request).unwrap_or_else(|response| response),
            None => respond(401, &json!({ "message": "401 Unauthorized" })),
        }
    }
}

fn respond<T: Serialize>(status: u16, body: &T) -> RouteResponse {
    match serde_json::to_value(body) {
        Ok(value) => RouteResponse::json(status, &value),
        Err(e) => RouteResponse::json(500, &json!({ "error": e.to_string() })),
    }
}

fn bad_request(message: impl Into<String>) -> RouteResponse {
    respond(400, &json!({ "error": message.into() }))
}

fn not_found(what: &str) -> RouteResponse {
    respond(404, &json!({ "message": format!("404 {} Not Found", what) }))
}

fn forbidden() -> RouteResponse {
    respond(403, &json!({ "message": "403 Forbidden" }))
}

fn param_string(request: &ToolRequest, key: &str) -> Option<String> {
    match request.params.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn param_u64(request: &ToolRequest, key: &str) -> Option<u64> {
    match request.params.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn required_string(request: &ToolRequest, key: &str) -> Result<String, RouteResponse> {
    param_string(request, key).ok_or_else(|| bad_request(format!("{} is missing", key)))
}

fn required_u64(request: &ToolRequest, key: &str) -> Result<u64, RouteResponse> {
    param_u64(request, key).ok_or_else(|| bad_request(format!("{} is missing", key)))
}

/// Resolve the `id` project and check `ability` on it. Projects the user
/// cannot read are reported as missing.
fn load_project(data: &StoreData, user: &User, request: &ToolRequest, ability: &str) -> Result<Project, RouteResponse> {
    let id = required_string(request, "id")?;
    let project = data
        .project(&id)
        .filter(|p| data.can(user.id, "read_project", p.id))
        .ok_or_else(|| not_found("Project"))?;
    if !data.can(user.id, ability, project.id) {
        return Err(forbidden());
    }
    Ok(project.clone())
}

/// Slice one page out of `items` and set pagination headers.
fn paginated(request: &ToolRequest, items: Vec<Value>) -> RouteResponse {
    let page = usize::try_from(param_u64(request, "page").unwrap_or(1).max(1)).unwrap_or(usize::MAX);
    let per_page = param_u64(request, "per_page")
        .map(|n| n as usize)
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);

    let total = items.len();
    // Pages past the addressable range are empty.
    let offset = (page - 1).checked_mul(per_page).unwrap_or(usize::MAX);
    let page_items: Vec<Value> = items.into_iter().skip(offset).take(per_page).collect();

    let mut response = respond(200, &page_items);
    response.headers.insert("x-total".to_string(), total.to_string());
    if offset.saturating_add(per_page) < total {
        response.headers.insert(NEXT_PAGE_HEADER.to_string(), (page + 1).to_string());
    }
    response
}

// ============================================================================
// Issues
// ============================================================================

fn get_issue(store: &ApiStore, user: &User, request: &ToolRequest) -> Result<RouteResponse, RouteResponse> {
    let data = store.read();
    let project = load_project(&data, user, request, "read_project")?;
    let iid = required_u64(request, "issue_iid")?;
    let issue = data.issue(project.id, iid).ok_or_else(|| not_found("Issue"))?;
    Ok(respond(200, issue))
}

fn create_issue(store: &ApiStore, user: &User, request: &ToolRequest) -> Result<RouteResponse, RouteResponse> {
    let mut data = store.write();
    let project = load_project(&data, user, request, "create_issue")?;
    let title = required_string(request, "title")?;
    let description = param_string(request, "description").unwrap_or_default();

    let mut issue = data.add_issue(project.id, user.id, &title, &description);
    let labels: Vec<String> = request
        .params
        .get("labels")
        .and_then(Value::as_array)
        .map(|labels| labels.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let confidential = request.params.get("confidential").and_then(Value::as_bool).unwrap_or(false);

    if let Some(stored) = data.issues.iter_mut().find(|i| i.id == issue.id) {
        stored.labels = labels;
        stored.confidential = confidential;
        issue = stored.clone();
    }
    Ok(respond(201, &issue))
}

// ============================================================================
// Search
// ============================================================================

fn matches(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Run `scope` search for `term` over `projects`.
fn search_in(
    data: &StoreData,
    request: &ToolRequest,
    projects: &[&Project],
    allow_project_scope: bool,
) -> Result<RouteResponse, RouteResponse> {
    let scope = required_string(request, "scope")?;
    let term = required_string(request, "search")?;

    let results: Vec<Value> = match scope.as_str() {
        "issues" => data
            .issues
            .iter()
            .filter(|i| projects.iter().any(|p| p.id == i.project_id))
            .filter(|i| matches(&i.title, &term) || matches(&i.description, &term))
            .map(|i: &Issue| serde_json::to_value(i).unwrap_or(Value::Null))
            .collect(),
        "projects" if allow_project_scope => projects
            .iter()
            .filter(|p| matches(&p.path_with_namespace, &term) || matches(&p.description, &term))
            .map(|p| serde_json::to_value(p).unwrap_or(Value::Null))
            .collect(),
        _ => return Err(bad_request("scope does not have a valid value")),
    };

    Ok(paginated(request, results))
}

fn readable<'a>(data: &'a StoreData, user: &User) -> Vec<&'a Project> {
    data.projects
        .iter()
        .filter(|p| data.can(user.id, "read_project", p.id))
        .collect()
}

fn search_instance(store: &ApiStore, user: &User, request: &ToolRequest) -> Result<RouteResponse, RouteResponse> {
    let data = store.read();
    let projects = readable(&data, user);
    search_in(&data, request, &projects, true)
}

fn search_group(store: &ApiStore, user: &User, request: &ToolRequest) -> Result<RouteResponse, RouteResponse> {
    let data = store.read();
    let id = required_string(request, "id")?;
    let group = data.group(&id).ok_or_else(|| not_found("Group"))?;
    let projects: Vec<&Project> = readable(&data, user)
        .into_iter()
        .filter(|p| p.group_id == Some(group.id))
        .collect();
    search_in(&data, request, &projects, true)
}

fn search_project(store: &ApiStore, user: &User, request: &ToolRequest) -> Result<RouteResponse, RouteResponse> {
    let data = store.read();
    let project = load_project(&data, user, request, "read_project")?;
    search_in(&data, request, &[&project], false)
}

// ============================================================================
// Pipelines
// ============================================================================

fn list_pipelines(store: &ApiStore, user: &User, request: &ToolRequest) -> Result<RouteResponse, RouteResponse> {
    let data = store.read();
    let project = load_project(&data, user, request, "read_pipeline")?;
    let git_ref = param_string(request, "ref");

    let mut pipelines: Vec<_> = data
        .pipelines
        .iter()
        .filter(|p| p.project_id == project.id)
        .filter(|p| git_ref.as_ref().is_none_or(|r| &p.git_ref == r))
        .collect();
    pipelines.sort_by(|a, b| b.id.cmp(&a.id));

    let items = pipelines
        .into_iter()
        .map(|p| serde_json::to_value(p).unwrap_or(Value::Null))
        .collect();
    Ok(paginated(request, items))
}

fn create_pipeline(store: &ApiStore, user: &User, request: &ToolRequest) -> Result<RouteResponse, RouteResponse> {
    let mut data = store.write();
    let project = load_project(&data, user, request, "create_pipeline")?;
    let git_ref = required_string(request, "ref")?;
    let variables = request
        .params
        .get("variables")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let pipeline = data.add_pipeline(project.id, &git_ref, variables);
    Ok(respond(201, &pipeline))
}

fn update_pipeline_metadata(
    store: &ApiStore,
    user: &User,
    request: &ToolRequest,
) -> Result<RouteResponse, RouteResponse> {
    let mut data = store.write();
    let project = load_project(&data, user, request, "update_pipeline")?;
    let pipeline_id = required_u64(request, "pipeline_id")?;
    let name = required_string(request, "name")?;

    let pipeline = data
        .pipeline_mut(project.id, pipeline_id)
        .ok_or_else(|| not_found("Pipeline"))?;
    pipeline.name = Some(name);
    pipeline.updated_at = chrono::Utc::now();
    Ok(respond(200, &*pipeline))
}

fn retry_pipeline(store: &ApiStore, user: &User, request: &ToolRequest) -> Result<RouteResponse, RouteResponse> {
    let mut data = store.write();
    let project = load_project(&data, user, request, "update_pipeline")?;
    let pipeline_id = required_u64(request, "pipeline_id")?;

    let pipeline = data
        .pipeline_mut(project.id, pipeline_id)
        .ok_or_else(|| not_found("Pipeline"))?;
    if matches!(pipeline.status.as_str(), "created" | "pending" | "running") {
        return Err(bad_request("Pipeline is still active and cannot be retried"));
    }
    pipeline.status = "pending".to_string();
    pipeline.updated_at = chrono::Utc::now();
    Ok(respond(201, &*pipeline))
}

fn cancel_pipeline(store: &ApiStore, user: &User, request: &ToolRequest) -> Result<RouteResponse, RouteResponse> {
    let mut data = store.write();
    let project = load_project(&data, user, request, "cancel_pipeline")?;
    let pipeline_id = required_u64(request, "pipeline_id")?;

    let pipeline = data
        .pipeline_mut(project.id, pipeline_id)
        .ok_or_else(|| not_found("Pipeline"))?;
    if matches!(pipeline.status.as_str(), "created" | "pending" | "running") {
        pipeline.status = "canceled".to_string();
        pipeline.updated_at = chrono::Utc::now();
    }
    Ok(respond(200, &*pipeline))
}

fn delete_pipeline(store: &ApiStore, user: &User, request: &ToolRequest) -> Result<RouteResponse, RouteResponse> {
    let mut data = store.write();
    let project = load_project(&data, user, request, "delete_pipeline")?;
    let pipeline_id = required_u64(request, "pipeline_id")?;

    let before = data.pipelines.len();
    data.pipelines
        .retain(|p| !(p.project_id == project.id && p.id == pipeline_id));
    if data.pipelines.len() == before {
        return Err(not_found("Pipeline"));
    }
    Ok(respond(200, &json!({ "id": pipeline_id, "deleted": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(route_path: &str, method: &str, token: Option<&str>, params: Value) -> RouteResponse {
        let store = Arc::new(ApiStore::seeded());
        call_with(&store, route_path, method, token, params)
    }

    fn call_with(store: &Arc<ApiStore>, route_path: &str, method: &str, token: Option<&str>, params: Value) -> RouteResponse {
        let route = routes(store.clone())
            .into_iter()
            .find(|r| r.path == route_path && r.method == method)
            .unwrap();
        let mut request = ToolRequest::new(method, route_path);
        request.params = params.as_object().cloned().unwrap_or_default();
        if let Some(token) = token {
            request.headers.insert(TOKEN_HEADER.to_string(), token.to_string());
        }
        route.exec(request)
    }

    fn body(response: &RouteResponse) -> Value {
        serde_json::from_str(&response.body).unwrap()
    }

    #[test]
    fn test_requires_token() {
        let response = call("/projects/:id/issues/:issue_iid", "GET", None, json!({ "id": "1", "issue_iid": 1 }));
        assert_eq!(response.status, 401);
    }

    #[test]
    fn test_get_issue_by_path() {
        let response = call(
            "/projects/:id/issues/:issue_iid",
            "GET",
            Some("alice-token"),
            json!({ "id": "gitlab-org/gitlab", "issue_iid": 1 }),
        );
        assert_eq!(response.status, 200);
        assert_eq!(body(&response)["title"], json!("Login bug on Safari"));
    }

    #[test]
    fn test_hidden_project_is_not_found() {
        let response = call(
            "/projects/:id/pipelines",
            "GET",
            Some("bob-token"),
            json!({ "id": "alice/runner" }),
        );
        assert_eq!(response.status, 404);
        assert_eq!(body(&response)["message"], json!("404 Project Not Found"));
    }

    #[test]
    fn test_insufficient_access_is_forbidden() {
        let response = call(
            "/projects/:id/pipeline",
            "POST",
            Some("bob-token"),
            json!({ "id": "gitlab-org/gitlab", "ref": "main" }),
        );
        assert_eq!(response.status, 403);
    }

    #[test]
    fn test_group_search_only_covers_group_projects() {
        let response = call(
            "/groups/:id/search",
            "GET",
            Some("alice-token"),
            json!({ "id": "42", "scope": "issues", "search": "bug" }),
        );
        assert_eq!(response.status, 200);
        let items = body(&response);
        assert_eq!(items.as_array().unwrap().len(), 1);
        assert_eq!(items[0]["title"], json!("Login bug on Safari"));
    }

    #[test]
    fn test_search_pagination_headers() {
        let response = call(
            "/search",
            "GET",
            Some("alice-token"),
            json!({ "scope": "issues", "search": "bug", "per_page": 1 }),
        );
        assert_eq!(response.headers.get("x-total").map(String::as_str), Some("2"));
        assert_eq!(response.headers.get("x-next-page").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_page_past_addressable_range_is_empty() {
        let response = call(
            "/search",
            "GET",
            Some("alice-token"),
            json!({ "scope": "issues", "search": "bug", "page": i64::MAX, "per_page": 100 }),
        );
        assert_eq!(response.status, 200);
        assert_eq!(body(&response), json!([]));
        assert_eq!(response.headers.get("x-total").map(String::as_str), Some("2"));
        assert!(!response.headers.contains_key("x-next-page"));
    }

    #[test]
    fn test_project_scope_rejects_projects_search() {
        let response = call(
            "/projects/:id/search",
            "GET",
            Some("alice-token"),
            json!({ "id": "gitlab-org/gitlab", "scope": "projects", "search": "x" }),
        );
        assert_eq!(response.status, 400);
        assert_eq!(body(&response)["error"], json!("scope does not have a valid value"));
    }

    #[test]
    fn test_pipeline_lifecycle() {
        let store = Arc::new(ApiStore::seeded());
        let created = call_with(
            &store,
            "/projects/:id/pipeline",
            "POST",
            Some("alice-token"),
            json!({ "id": "gitlab-org/gitlab", "ref": "main" }),
        );
        assert_eq!(created.status, 201);
        let id = body(&created)["id"].as_u64().unwrap();

        let canceled = call_with(
            &store,
            "/projects/:id/pipelines/:pipeline_id/cancel",
            "POST",
            Some("alice-token"),
            json!({ "id": "gitlab-org/gitlab", "pipeline_id": id }),
        );
        assert_eq!(body(&canceled)["status"], json!("canceled"));

        let retried = call_with(
            &store,
            "/projects/:id/pipelines/:pipeline_id/retry",
            "POST",
            Some("alice-token"),
            json!({ "id": "gitlab-org/gitlab", "pipeline_id": id }),
        );
        assert_eq!(retried.status, 201);
        assert_eq!(body(&retried)["status"], json!("pending"));

        let deleted = call_with(
            &store,
            "/projects/:id/pipelines/:pipeline_id",
            "DELETE",
            Some("alice-token"),
            json!({ "id": "gitlab-org/gitlab", "pipeline_id": id }),
        );
        assert_eq!(body(&deleted), json!({ "id": id, "deleted": true }));

        let again = call_with(
            &store,
            "/projects/:id/pipelines/:pipeline_id",
            "DELETE",
            Some("alice-token"),
            json!({ "id": "gitlab-org/gitlab", "pipeline_id": id }),
        );
        assert_eq!(again.status, 404);
    }
}
