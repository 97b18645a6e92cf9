use capl_core::DocumentStore;
use std::sync::atomic::{AtomicBool, Ordering};

/// State shared by every request handler.
///
/// Documents live in the core [`DocumentStore`], which serializes edits per
/// document. The client capability flags are written once during
/// `initialize`.
#[derive(Debug, Default)]
pub struct ServerState {
    /// Open documents by URI
    pub store: DocumentStore,
    /// Client accepts nested `DocumentSymbol` responses
    hierarchical_symbols: AtomicBool,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_hierarchical_symbols(&self, supported: bool) {
        self.hierarchical_symbols.store(supported, Ordering::Relaxed);
    }

    pub fn hierarchical_symbols(&self) -> bool {
        self.hierarchical_symbols.load(Ordering::Relaxed)
    }

    /// Number of open documents.
    pub fn document_count(&self) -> usize {
        self.store.len()
    }
}
