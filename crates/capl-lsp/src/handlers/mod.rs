//! LSP protocol handlers.
//!
//! - [`document_symbol`]: document outline (`textDocument/documentSymbol`)
//!
//! Handlers are synchronous: the outline is computed from an in-memory
//! snapshot. Core errors are mapped to JSON-RPC errors with [`to_rpc_error`].

pub mod document_symbol;

use capl_core::CaplError;
use tower_lsp_server::jsonrpc;

/// Maps a core error to the JSON-RPC error returned to the client.
pub fn to_rpc_error(error: CaplError) -> jsonrpc::Error {
    match error {
        CaplError::UnknownDocument(_) => jsonrpc::Error::invalid_params(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capl_core::DocumentId;
    use tower_lsp_server::jsonrpc::ErrorCode;

    #[test]
    fn test_unknown_document_is_invalid_params() {
        let error = to_rpc_error(CaplError::UnknownDocument(DocumentId::from(
            "file:///missing.can",
        )));
        assert_eq!(error.code, ErrorCode::InvalidParams);
        assert!(error.message.contains("file:///missing.can"));
    }
}
