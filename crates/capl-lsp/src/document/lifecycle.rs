//! Document open/change/close handling.
//!
//! Converts LSP notifications into core store operations. Nothing here does
//! I/O; the outline is computed lazily when the client asks for it.

use super::state::ServerState;
use capl_core::{ChangeOutcome, DocumentId, Result, TextChange};
use tower_lsp_server::ls_types::{
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    TextDocumentContentChangeEvent,
};

/// Registers an opened document. Returns `true` if it replaced an open one.
pub fn handle_document_open(state: &ServerState, params: DidOpenTextDocumentParams) -> bool {
    let doc = params.text_document;
    tracing::info!(
        "opening {} (language {}, version {}, {} bytes)",
        doc.uri.as_str(),
        doc.language_id,
        doc.version,
        doc.text.len()
    );
    state
        .store
        .open(DocumentId::from(&doc.uri), doc.text, doc.version)
}

/// Applies every content change of a `didChange` notification, in order.
pub fn handle_document_change(
    state: &ServerState,
    params: DidChangeTextDocumentParams,
) -> Result<ChangeOutcome> {
    let id = DocumentId::from(&params.text_document.uri);
    let version = params.text_document.version;
    tracing::debug!(
        "{} change(s) for {} at version {}",
        params.content_changes.len(),
        id,
        version
    );

    state.store.apply_changes(
        &id,
        version,
        params.content_changes.into_iter().map(to_text_change),
    )
}

pub fn handle_document_close(
    state: &ServerState,
    params: DidCloseTextDocumentParams,
) -> Result<()> {
    let id = DocumentId::from(&params.text_document.uri);
    tracing::info!("closing {}", id);
    state.store.close(&id)
}

/// A change without `range` replaces the whole document.
pub fn to_text_change(event: TextDocumentContentChangeEvent) -> TextChange {
    match event.range {
        Some(range) => TextChange::RangeEdit {
            range,
            text: event.text,
        },
        None => TextChange::FullText(event.text),
    }
}
