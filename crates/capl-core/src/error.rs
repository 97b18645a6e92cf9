use crate::document::DocumentId;
use thiserror::Error;

/// Core error types for capl-lsp.
///
/// Only invalid *operation sequencing* is an error. Malformed source text
/// never is: the scanner and the symbol extractor are total over all inputs,
/// and stale edits are reported as a [`ChangeOutcome`](crate::ChangeOutcome)
/// rather than a failure.
///
/// # Examples
///
/// ```
/// use capl_core::error::{CaplError, Result};
/// use capl_core::DocumentId;
///
/// fn require_open(open: bool, id: &DocumentId) -> Result<()> {
///     if !open {
///         return Err(CaplError::UnknownDocument(id.clone()));
///     }
///     Ok(())
/// }
///
/// let id = DocumentId::from("file:///node.can");
/// assert!(require_open(false, &id).is_err());
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaplError {
    #[error("unknown document: {0}")]
    UnknownDocument(DocumentId),
}

/// Convenience type alias for `Result<T, CaplError>`.
pub type Result<T> = std::result::Result<T, CaplError>;
