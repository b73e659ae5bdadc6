//! Identities and the authorization collaborator.

use serde::{Deserialize, Serialize};

/// The identity a call is made on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: u64,
    pub username: String,
}

impl Actor {
    pub fn new(id: u64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

/// The entity an ability is checked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Entity kind, e.g. `project` or `issue`.
    pub kind: String,
    pub id: String,
}

impl Target {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

/// Policy check consumed by tools that require authorization.
pub trait Authorizer: Send + Sync {
    /// Whether `actor` holds `ability` on `target`.
    fn allowed(&self, actor: &Actor, ability: &str, target: &Target) -> bool;
}

/// Authorizer that refuses everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl Authorizer for DenyAll {
    fn allowed(&self, _actor: &Actor, _ability: &str, _target: &Target) -> bool {
        false
    }
}
