//! Document management module.
//!
//! - `state`: server-wide state wrapping the core document store
//! - `lifecycle`: didOpen/didChange/didClose handling

mod lifecycle;
mod state;

pub use lifecycle::{
    handle_document_change, handle_document_close, handle_document_open, to_text_change,
};
pub use state::ServerState;
