//! Sample API the tools are served from.
//!
//! An in-memory store plus a route table in the shape a web layer would
//! expose. Route handlers run in-process when a route-backed tool is called.

pub mod routes;
pub mod store;

pub use routes::{TOKEN_HEADER, route_table};
pub use store::ApiStore;
