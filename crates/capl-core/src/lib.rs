//! Core of capl-lsp.
//!
//! This crate holds everything that does not depend on the LSP transport:
//!
//! - **Document store**: open documents keyed by URI, versioned, patched by
//!   full-text or range edits, one mutation in flight per document
//! - **Lexer**: a CAPL tokenizer that tracks LSP positions
//! - **Symbol extraction**: a linear state machine over the token stream that
//!   produces the hierarchical outline (event handlers, functions, variables,
//!   `variables`/`includes` blocks, structs and enums)
//!
//! # Examples
//!
//! ```
//! use capl_core::{DocumentId, DocumentStore, ExtractOptions, SymbolKind};
//!
//! let store = DocumentStore::new();
//! let id = DocumentId::from("file:///ecu/node.can");
//! store.open(id.clone(), "on start\n{\n  write(\"hello\");\n}\n".into(), 1);
//!
//! let outline = store.symbols(&id, &ExtractOptions::default()).unwrap();
//! assert_eq!(outline.version, 1);
//! assert_eq!(outline.symbols[0].name, "start");
//! assert_eq!(outline.symbols[0].kind, SymbolKind::Event);
//! ```

pub mod document;
pub mod error;
pub mod lexer;
pub mod symbols;
pub mod text;

pub use document::{
    ChangeOutcome, DocumentId, DocumentSnapshot, DocumentState, DocumentStore, DocumentVersion,
    TextChange,
};
pub use error::{CaplError, Result};
pub use symbols::{
    ExtractOptions, MAX_DETAIL_LEN, MAX_NESTING, Symbol, SymbolKind, UNNAMED, VersionedSymbols,
    extract_symbols,
};
