//! In-memory backing store for the sample API.
//!
//! Holds users, groups, projects, issues, notes and pipelines. All access
//! goes through an `RwLock`, so route handlers can run concurrently.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domains::tools::{Actor, Authorizer, Target};

/// Membership level of a user in a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Guest,
    Reporter,
    Developer,
    Maintainer,
}

impl AccessLevel {
    /// Minimum level granting `ability`, `None` for unknown abilities.
    pub fn required_for(ability: &str) -> Option<Self> {
        match ability {
            "read_project" | "create_issue" | "create_note" => Some(Self::Guest),
            "read_pipeline" => Some(Self::Reporter),
            "create_pipeline" | "update_pipeline" | "cancel_pipeline" => Some(Self::Developer),
            "delete_pipeline" => Some(Self::Maintainer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    #[serde(skip)]
    pub token: String,
}

impl User {
    pub fn actor(&self) -> Actor {
        Actor::new(self.id, self.username.clone())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Group {
    pub id: u64,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: u64,
    pub path_with_namespace: String,
    pub group_id: Option<u64>,
    pub description: String,
    #[serde(skip)]
    pub members: BTreeMap<u64, AccessLevel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub id: u64,
    pub iid: u64,
    pub project_id: u64,
    pub title: String,
    pub description: String,
    pub labels: Vec<String>,
    pub confidential: bool,
    pub state: String,
    pub author_id: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub id: u64,
    pub issue_id: u64,
    pub body: String,
    pub author_id: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pipeline {
    pub id: u64,
    pub project_id: u64,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub name: Option<String>,
    pub status: String,
    pub variables: Vec<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct StoreData {
    pub users: Vec<User>,
    pub groups: Vec<Group>,
    pub projects: Vec<Project>,
    pub issues: Vec<Issue>,
    pub notes: Vec<Note>,
    pub pipelines: Vec<Pipeline>,
    next_id: u64,
}

impl StoreData {
    pub fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn user_by_token(&self, token: &str) -> Option<&User> {
        self.users.iter().find(|u| u.token == token)
    }

    /// Find a project by numeric ID or by full path.
    pub fn project(&self, id_or_path: &str) -> Option<&Project> {
        match id_or_path.parse::<u64>() {
            Ok(id) => self.projects.iter().find(|p| p.id == id),
            Err(_) => self.projects.iter().find(|p| p.path_with_namespace == id_or_path),
        }
    }

    /// Find a group by numeric ID or by path.
    pub fn group(&self, id_or_path: &str) -> Option<&Group> {
        match id_or_path.parse::<u64>() {
            Ok(id) => self.groups.iter().find(|g| g.id == id),
            Err(_) => self.groups.iter().find(|g| g.path == id_or_path),
        }
    }

    pub fn issue(&self, project_id: u64, iid: u64) -> Option<&Issue> {
        self.issues.iter().find(|i| i.project_id == project_id && i.iid == iid)
    }

    pub fn pipeline_mut(&mut self, project_id: u64, pipeline_id: u64) -> Option<&mut Pipeline> {
        self.pipelines
            .iter_mut()
            .find(|p| p.project_id == project_id && p.id == pipeline_id)
    }

    /// Whether `user_id` holds `ability` on project `project_id`.
    pub fn can(&self, user_id: u64, ability: &str, project_id: u64) -> bool {
        let Some(required) = AccessLevel::required_for(ability) else {
            return false;
        };
        self.projects
            .iter()
            .find(|p| p.id == project_id)
            .and_then(|p| p.members.get(&user_id))
            .is_some_and(|level| *level >= required)
    }

    pub fn add_issue(&mut self, project_id: u64, author_id: u64, title: &str, description: &str) -> Issue {
        let iid = self.issues.iter().filter(|i| i.project_id == project_id).count() as u64 + 1;
        let issue = Issue {
            id: self.next_id(),
            iid,
            project_id,
            title: title.to_string(),
            description: description.to_string(),
            labels: Vec::new(),
            confidential: false,
            state: "opened".to_string(),
            author_id,
            created_at: Utc::now(),
        };
        self.issues.push(issue.clone());
        issue
    }

    pub fn add_note(&mut self, issue_id: u64, author_id: u64, body: &str) -> Note {
        let note = Note {
            id: self.next_id(),
            issue_id,
            body: body.to_string(),
            author_id,
            created_at: Utc::now(),
        };
        self.notes.push(note.clone());
        note
    }

    pub fn add_pipeline(&mut self, project_id: u64, git_ref: &str, variables: Vec<serde_json::Value>) -> Pipeline {
        let now = Utc::now();
        let pipeline = Pipeline {
            id: self.next_id(),
            project_id,
            git_ref: git_ref.to_string(),
            name: None,
            status: "created".to_string(),
            variables,
            created_at: now,
            updated_at: now,
        };
        self.pipelines.push(pipeline.clone());
        pipeline
    }
}

/// Thread-safe store shared by routes, tools and the authorizer.
#[derive(Debug, Default)]
pub struct ApiStore {
    data: RwLock<StoreData>,
}

impl ApiStore {
    pub fn new(data: StoreData) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// A store with a small fixed dataset.
    pub fn seeded() -> Self {
        let mut data = StoreData::default();

        let alice = data.next_id();
        data.users.push(User {
            id: alice,
            username: "alice".to_string(),
            token: "alice-token".to_string(),
        });
        let bob = data.next_id();
        data.users.push(User {
            id: bob,
            username: "bob".to_string(),
            token: "bob-token".to_string(),
        });

        data.groups.push(Group {
            id: 42,
            path: "gitlab-org".to_string(),
        });

        let gitlab = data.next_id();
        data.projects.push(Project {
            id: gitlab,
            path_with_namespace: "gitlab-org/gitlab".to_string(),
            group_id: Some(42),
            description: "The main application".to_string(),
            members: BTreeMap::from([(alice, AccessLevel::Maintainer), (bob, AccessLevel::Guest)]),
        });
        let runner = data.next_id();
        data.projects.push(Project {
            id: runner,
            path_with_namespace: "alice/runner".to_string(),
            group_id: None,
            description: "Build runner experiments".to_string(),
            members: BTreeMap::from([(alice, AccessLevel::Developer)]),
        });

        data.add_issue(gitlab, alice, "Login bug on Safari", "Users cannot log in with Safari 17.");
        data.add_issue(gitlab, bob, "Improve search speed", "Search takes several seconds.");
        data.add_issue(runner, alice, "Runner bug with caches", "Cache keys collide.");

        let main = data.add_pipeline(gitlab, "main", Vec::new());
        if let Some(pipeline) = data.pipeline_mut(gitlab, main.id) {
            pipeline.status = "success".to_string();
        }
        data.add_pipeline(gitlab, "feature/search", Vec::new());

        Self::new(data)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, StoreData> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, StoreData> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn actor_for_token(&self, token: &str) -> Option<Actor> {
        self.read().user_by_token(token).map(User::actor)
    }

    pub fn project_paths(&self) -> Vec<String> {
        self.read().projects.iter().map(|p| p.path_with_namespace.clone()).collect()
    }
}

/// Authorizer backed by project membership.
impl Authorizer for ApiStore {
    fn allowed(&self, actor: &Actor, ability: &str, target: &Target) -> bool {
        if target.kind != "project" {
            return false;
        }
        let data = self.read();
        data.project(&target.id)
            .is_some_and(|project| data.can(actor.id, ability, project.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_lookup() {
        let store = ApiStore::seeded();
        let data = store.read();
        let project = data.project("gitlab-org/gitlab").unwrap();
        assert_eq!(data.project(&project.id.to_string()).unwrap().id, project.id);
        assert!(data.group("42").is_some());
        assert!(data.issue(project.id, 1).is_some());
    }

    #[test]
    fn test_abilities_follow_access_level() {
        let store = ApiStore::seeded();
        let alice = store.actor_for_token("alice-token").unwrap();
        let bob = store.actor_for_token("bob-token").unwrap();
        let project = Target::new("project", "gitlab-org/gitlab");

        assert!(store.allowed(&alice, "delete_pipeline", &project));
        assert!(store.allowed(&bob, "create_note", &project));
        assert!(!store.allowed(&bob, "create_pipeline", &project));
        assert!(!store.allowed(&bob, "read_project", &Target::new("project", "alice/runner")));
        assert!(!store.allowed(&alice, "launch_rockets", &project));
        assert!(!store.allowed(&alice, "read_project", &Target::new("issue", "1")));
    }

    #[test]
    fn test_unknown_token() {
        assert!(ApiStore::seeded().actor_for_token("nope").is_none());
    }
}
