//! `textDocument/documentSymbol` handler.
//!
//! Clients that announce `hierarchicalDocumentSymbolSupport` get the nested
//! outline; others get a flat list where nesting survives only as
//! `containerName`.

use crate::config::SymbolsConfig;
use crate::document::ServerState;
use capl_core::{DocumentId, Result, Symbol, SymbolKind};
use tower_lsp_server::ls_types::{
    self, DocumentSymbol, DocumentSymbolResponse, Location, SymbolInformation, Uri,
};

/// Builds the outline of an open document.
///
/// Fails only for documents that are not open.
pub fn handle_document_symbol(
    state: &ServerState,
    uri: &Uri,
    config: &SymbolsConfig,
) -> Result<DocumentSymbolResponse> {
    let id = DocumentId::from(uri);
    let outline = state.store.symbols(&id, &config.extract_options())?;

    tracing::debug!(
        "outline of {} at version {}: {} top-level symbol(s)",
        id,
        outline.version,
        outline.symbols.len()
    );

    let max_depth = config.max_depth.max(1);
    if state.hierarchical_symbols() {
        let nested = outline
            .symbols
            .into_iter()
            .map(|symbol| to_document_symbol(symbol, 1, max_depth))
            .collect();
        Ok(DocumentSymbolResponse::Nested(nested))
    } else {
        let mut flat = Vec::new();
        flatten(outline.symbols, uri, None, 1, max_depth, &mut flat);
        Ok(DocumentSymbolResponse::Flat(flat))
    }
}

pub fn lsp_symbol_kind(kind: SymbolKind) -> ls_types::SymbolKind {
    match kind {
        SymbolKind::Function => ls_types::SymbolKind::FUNCTION,
        SymbolKind::Event => ls_types::SymbolKind::EVENT,
        SymbolKind::Variable => ls_types::SymbolKind::VARIABLE,
        SymbolKind::Namespace => ls_types::SymbolKind::NAMESPACE,
    }
}

/// Converts one symbol, dropping descendants nested below `max_depth`.
#[allow(deprecated)]
pub fn to_document_symbol(symbol: Symbol, depth: usize, max_depth: usize) -> DocumentSymbol {
    let children: Vec<_> = if depth < max_depth {
        symbol
            .children
            .into_iter()
            .map(|child| to_document_symbol(child, depth + 1, max_depth))
            .collect()
    } else {
        Vec::new()
    };

    DocumentSymbol {
        name: symbol.name,
        detail: symbol.detail,
        kind: lsp_symbol_kind(symbol.kind),
        tags: None,
        deprecated: None,
        range: symbol.range,
        selection_range: symbol.selection_range,
        children: (!children.is_empty()).then_some(children),
    }
}

/// Pre-order flattening with the parent name as `container_name`.
#[allow(deprecated)]
fn flatten(
    symbols: Vec<Symbol>,
    uri: &Uri,
    container: Option<&str>,
    depth: usize,
    max_depth: usize,
    out: &mut Vec<SymbolInformation>,
) {
    for symbol in symbols {
        out.push(SymbolInformation {
            name: symbol.name.clone(),
            kind: lsp_symbol_kind(symbol.kind),
            tags: None,
            deprecated: None,
            location: Location::new(uri.clone(), symbol.range),
            container_name: container.map(str::to_string),
        });
        if depth < max_depth {
            flatten(
                symbol.children,
                uri,
                Some(&symbol.name),
                depth + 1,
                max_depth,
                out,
            );
        }
    }
}
