//! Tool definitions module.
//!
//! Hand-written tools and the selection strategies behind the aggregated
//! tools. Route-backed tools need no definition here; they are discovered
//! from the route table.

pub mod create_note;
pub mod pipeline;
pub mod search;
pub mod server_version;

pub use create_note::{CreateNoteParams, CreateNoteTool};
pub use pipeline::{PipelineIntentStrategy, PipelineOperation};
pub use search::{SearchScope, SearchScopeStrategy};
pub use server_version::ServerVersionTool;
