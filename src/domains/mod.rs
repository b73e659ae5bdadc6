//! Domains module containing business logic organized by bounded contexts.
//!
//! - `api` is the application the tools act on
//! - `tools` discovers, versions and dispatches the tools themselves

pub mod api;
pub mod tools;
