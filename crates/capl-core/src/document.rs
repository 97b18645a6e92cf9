//! Document store: the authoritative text of every open document.
//!
//! Each document is mutated only through [`DocumentStore::apply_changes`],
//! which holds the document's exclusive `DashMap` guard for the whole batch.
//! Readers take a [`DocumentSnapshot`] (an `Arc<str>` clone plus version), so
//! they never observe a half-applied edit and never block writers for longer
//! than a pointer copy.

use crate::error::{CaplError, Result};
use crate::symbols::{ExtractOptions, VersionedSymbols, extract_symbols};
use crate::text::LineOffsetTable;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tower_lsp_server::ls_types::{Range, Uri};

/// Version number assigned by the client on every change notification.
pub type DocumentVersion = i32;

/// Stable key of one open document (the document URI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(Arc<str>);

impl DocumentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(Arc::from(id))
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl From<&Uri> for DocumentId {
    fn from(uri: &Uri) -> Self {
        Self::from(uri.as_str())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One edit delivered by a change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextChange {
    /// Replace the whole document.
    FullText(String),
    /// Replace the text between `range.start` and `range.end`.
    RangeEdit { range: Range, text: String },
}

/// Result of applying a change batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// The batch was applied and the document is now at `version`.
    Applied { version: DocumentVersion },
    /// The batch was older than the stored text and was dropped.
    Stale {
        current: DocumentVersion,
        received: DocumentVersion,
    },
}

/// State for a single open document.
#[derive(Debug, Clone)]
pub struct DocumentState {
    pub id: DocumentId,
    pub version: DocumentVersion,
    text: Arc<str>,
    /// Number of change batches discarded because they were not newer.
    pub stale_edits: u64,
}

impl DocumentState {
    pub fn new(id: DocumentId, text: String, version: DocumentVersion) -> Self {
        Self {
            id,
            version,
            text: Arc::from(text),
            stale_edits: 0,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            text: Arc::clone(&self.text),
            version: self.version,
        }
    }

    /// Applies `changes` in order and moves the document to `version`.
    ///
    /// The caller must have checked that `version` is newer.
    fn apply(&mut self, version: DocumentVersion, changes: impl IntoIterator<Item = TextChange>) {
        let mut text = self.text.to_string();
        for change in changes {
            apply_to(&mut text, change);
        }
        self.text = Arc::from(text);
        self.version = version;
    }
}

fn apply_to(text: &mut String, change: TextChange) {
    match change {
        TextChange::FullText(new_text) => *text = new_text,
        TextChange::RangeEdit {
            range,
            text: new_text,
        } => {
            let table = LineOffsetTable::new(text);
            let mut start = table.position_to_byte_offset(text, range.start);
            let mut end = table.position_to_byte_offset(text, range.end);
            if start > end {
                tracing::debug!(?range, "inverted edit range, normalizing");
                std::mem::swap(&mut start, &mut end);
            }
            text.replace_range(start..end, &new_text);
        }
    }
}

/// Consistent `(text, version)` view of a document at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub text: Arc<str>,
    pub version: DocumentVersion,
}

/// All open documents, keyed by [`DocumentId`].
///
/// # Examples
///
/// ```
/// use capl_core::{DocumentId, DocumentStore, ExtractOptions, TextChange};
///
/// let store = DocumentStore::new();
/// let id = DocumentId::from("file:///node.can");
///
/// store.open(id.clone(), "on start\n{\n}\n".into(), 1);
/// store
///     .apply_changes(&id, 2, [TextChange::FullText("on stop\n{\n}\n".into())])
///     .unwrap();
///
/// let outline = store.symbols(&id, &ExtractOptions::default()).unwrap();
/// assert_eq!(outline.version, 2);
/// assert_eq!(outline.symbols[0].name, "stop");
/// ```
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: DashMap<DocumentId, DocumentState>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a document.
    ///
    /// Opening an id that is already open replaces the stored document and
    /// logs a warning. Returns `true` in that case.
    pub fn open(&self, id: DocumentId, text: String, version: DocumentVersion) -> bool {
        let state = DocumentState::new(id.clone(), text, version);
        let replaced = self.documents.insert(id.clone(), state);
        if let Some(old) = &replaced {
            tracing::warn!(
                "document {} opened twice (version {} replaced by {})",
                id,
                old.version,
                version
            );
        } else {
            tracing::debug!("opened {} at version {}", id, version);
        }
        replaced.is_some()
    }

    /// Applies a single change. See [`DocumentStore::apply_changes`].
    pub fn apply_change(
        &self,
        id: &DocumentId,
        version: DocumentVersion,
        change: TextChange,
    ) -> Result<ChangeOutcome> {
        self.apply_changes(id, version, [change])
    }

    /// Applies a batch of changes that together produce `version`.
    ///
    /// Every change is applied, in order, while the document is exclusively
    /// locked. A batch whose version is not newer than the stored one is
    /// dropped and counted in [`DocumentState::stale_edits`].
    pub fn apply_changes(
        &self,
        id: &DocumentId,
        version: DocumentVersion,
        changes: impl IntoIterator<Item = TextChange>,
    ) -> Result<ChangeOutcome> {
        let mut doc = self
            .documents
            .get_mut(id)
            .ok_or_else(|| CaplError::UnknownDocument(id.clone()))?;

        if version <= doc.version {
            doc.stale_edits += 1;
            tracing::warn!(
                "dropping stale edit for {} (received version {}, current {})",
                id,
                version,
                doc.version
            );
            return Ok(ChangeOutcome::Stale {
                current: doc.version,
                received: version,
            });
        }

        doc.apply(version, changes);
        tracing::debug!("{} now at version {} ({} bytes)", id, version, doc.text.len());
        Ok(ChangeOutcome::Applied { version })
    }

    /// Removes a document.
    pub fn close(&self, id: &DocumentId) -> Result<()> {
        self.documents
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CaplError::UnknownDocument(id.clone()))
    }

    /// Returns the current text and version of a document.
    pub fn snapshot(&self, id: &DocumentId) -> Result<DocumentSnapshot> {
        self.documents
            .get(id)
            .map(|doc| doc.snapshot())
            .ok_or_else(|| CaplError::UnknownDocument(id.clone()))
    }

    /// Extracts the outline of a document, tagged with the scanned version.
    ///
    /// The document lock is released before scanning starts; concurrent edits
    /// to the same document proceed and the result may be stale but valid.
    pub fn symbols(&self, id: &DocumentId, options: &ExtractOptions) -> Result<VersionedSymbols> {
        let snapshot = self.snapshot(id)?;
        let symbols = extract_symbols(&snapshot.text, options);
        Ok(VersionedSymbols {
            version: snapshot.version,
            symbols,
        })
    }

    /// Number of stale change batches dropped for a document.
    pub fn stale_edits(&self, id: &DocumentId) -> Result<u64> {
        self.documents
            .get(id)
            .map(|doc| doc.stale_edits)
            .ok_or_else(|| CaplError::UnknownDocument(id.clone()))
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.documents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp_server::ls_types::Position;

    fn id() -> DocumentId {
        DocumentId::from("file:///test/node.can")
    }

    fn edit(sl: u32, sc: u32, el: u32, ec: u32, text: &str) -> TextChange {
        TextChange::RangeEdit {
            range: Range::new(Position::new(sl, sc), Position::new(el, ec)),
            text: text.into(),
        }
    }

    #[test]
    fn test_open_and_snapshot() {
        let store = DocumentStore::new();
        assert!(!store.open(id(), "on start {}".into(), 1));

        let snap = store.snapshot(&id()).unwrap();
        assert_eq!(&*snap.text, "on start {}");
        assert_eq!(snap.version, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_duplicate_open_overwrites() {
        let store = DocumentStore::new();
        store.open(id(), "old".into(), 1);
        assert!(store.open(id(), "new".into(), 5));

        let snap = store.snapshot(&id()).unwrap();
        assert_eq!(&*snap.text, "new");
        assert_eq!(snap.version, 5);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_full_text_change() {
        let store = DocumentStore::new();
        store.open(id(), "on start\n{\n}\n".into(), 1);

        let outcome = store
            .apply_change(&id(), 2, TextChange::FullText("on stop\n{\n}\n".into()))
            .unwrap();

        assert_eq!(outcome, ChangeOutcome::Applied { version: 2 });
        assert_eq!(&*store.snapshot(&id()).unwrap().text, "on stop\n{\n}\n");
    }

    #[test]
    fn test_range_edit_single_line() {
        let store = DocumentStore::new();
        store.open(id(), "on start\n{\n}\n".into(), 1);

        // Replace "start" with "preStart"
        store.apply_change(&id(), 2, edit(0, 3, 0, 8, "preStart")).unwrap();

        assert_eq!(&*store.snapshot(&id()).unwrap().text, "on preStart\n{\n}\n");
    }

    #[test]
    fn test_range_edit_across_lines() {
        let store = DocumentStore::new();
        store.open(id(), "on start\n{\n  write(\"x\");\n}\n".into(), 1);

        store.apply_change(&id(), 2, edit(1, 1, 3, 0, "\n")).unwrap();

        assert_eq!(&*store.snapshot(&id()).unwrap().text, "on start\n{\n}\n");
    }

    #[test]
    fn test_range_edit_insert_and_delete() {
        let store = DocumentStore::new();
        store.open(id(), "int a;".into(), 1);

        store.apply_change(&id(), 2, edit(0, 6, 0, 6, "\nint b;")).unwrap();
        store.apply_change(&id(), 3, edit(0, 0, 1, 0, "")).unwrap();

        assert_eq!(&*store.snapshot(&id()).unwrap().text, "int b;");
    }

    #[test]
    fn test_range_edit_utf16_positions() {
        let store = DocumentStore::new();
        store.open(id(), "write(\"😀\"); int x;".into(), 1);

        // "write(\"" = 7 units, emoji = 2, "\"); " = 4 → "int" starts at 13
        store.apply_change(&id(), 2, edit(0, 13, 0, 16, "long")).unwrap();

        assert_eq!(
            &*store.snapshot(&id()).unwrap().text,
            "write(\"😀\"); long x;"
        );
    }

    #[test]
    fn test_range_edit_out_of_bounds_is_clamped() {
        let store = DocumentStore::new();
        store.open(id(), "int a;\n".into(), 1);

        store.apply_change(&id(), 2, edit(0, 50, 99, 0, " // end")).unwrap();

        assert_eq!(&*store.snapshot(&id()).unwrap().text, "int a; // end");
    }

    #[test]
    fn test_inverted_range_is_normalized() {
        let store = DocumentStore::new();
        store.open(id(), "abcdef".into(), 1);

        store.apply_change(&id(), 2, edit(0, 4, 0, 1, "X")).unwrap();

        assert_eq!(&*store.snapshot(&id()).unwrap().text, "aXef");
    }

    #[test]
    fn test_batch_applies_every_change_in_order() {
        let store = DocumentStore::new();
        store.open(id(), "on start\n{\n}\n".into(), 1);

        let outcome = store
            .apply_changes(
                &id(),
                2,
                [
                    edit(0, 3, 0, 8, "key"),
                    edit(0, 6, 0, 6, " 'a'"),
                    edit(2, 0, 2, 1, "}\non stop\n{\n}"),
                ],
            )
            .unwrap();

        assert_eq!(outcome, ChangeOutcome::Applied { version: 2 });
        assert_eq!(
            &*store.snapshot(&id()).unwrap().text,
            "on key 'a'\n{\n}\non stop\n{\n}\n"
        );
    }

    #[test]
    fn test_stale_edit_is_dropped_and_recorded() {
        let store = DocumentStore::new();
        store.open(id(), "on start\n{\n}\n".into(), 3);

        let outcome = store
            .apply_change(&id(), 3, TextChange::FullText("garbage".into()))
            .unwrap();
        assert_eq!(
            outcome,
            ChangeOutcome::Stale {
                current: 3,
                received: 3
            }
        );

        let outcome = store
            .apply_change(&id(), 1, TextChange::FullText("older".into()))
            .unwrap();
        assert!(matches!(outcome, ChangeOutcome::Stale { .. }));

        let snap = store.snapshot(&id()).unwrap();
        assert_eq!(&*snap.text, "on start\n{\n}\n");
        assert_eq!(snap.version, 3);
        assert_eq!(store.stale_edits(&id()).unwrap(), 2);
    }

    #[test]
    fn test_unknown_document() {
        let store = DocumentStore::new();
        let missing = DocumentId::from("file:///never/opened.can");

        assert_eq!(
            store.snapshot(&missing),
            Err(CaplError::UnknownDocument(missing.clone()))
        );
        assert!(store.symbols(&missing, &ExtractOptions::default()).is_err());
        assert!(
            store
                .apply_change(&missing, 2, TextChange::FullText(String::new()))
                .is_err()
        );
        assert!(store.close(&missing).is_err());
    }

    #[test]
    fn test_close_removes_document() {
        let store = DocumentStore::new();
        store.open(id(), "on start {}".into(), 1);

        store.close(&id()).unwrap();

        assert!(!store.contains(&id()));
        assert!(store.is_empty());
        assert!(matches!(
            store.snapshot(&id()),
            Err(CaplError::UnknownDocument(_))
        ));
    }

    #[test]
    fn test_replay_matches_full_text() {
        // Build a document from empty text with incremental edits and check
        // it equals the final text of a full-text replay.
        let store = DocumentStore::new();
        store.open(id(), String::new(), 0);

        let steps = [
            edit(0, 0, 0, 0, "variables\n{\n}\n"),
            edit(1, 1, 1, 1, "\n  int counter = 0;"),
            edit(3, 1, 3, 1, "\n\non start\n{\n  counter++;\n}\n"),
            edit(5, 3, 5, 8, "preStart"),
            edit(2, 6, 2, 13, "gCounter"),
        ];
        for (i, step) in steps.into_iter().enumerate() {
            store.apply_change(&id(), i as i32 + 1, step).unwrap();
        }

        let expected = "variables\n{\n  int gCounter = 0;\n}\n\non preStart\n{\n  counter++;\n}\n\n";
        let snap = store.snapshot(&id()).unwrap();
        assert_eq!(&*snap.text, expected);
        assert_eq!(snap.version, 5);
    }

    #[tokio::test]
    async fn test_concurrent_edits_to_different_documents() {
        let store = Arc::new(DocumentStore::new());
        let mut handles = vec![];

        for n in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let id = DocumentId::from(format!("file:///doc{n}.can"));
                store.open(id.clone(), String::new(), 0);
                for v in 1..=20 {
                    store
                        .apply_change(&id, v, edit(u32::MAX, 0, u32::MAX, 0, "x"))
                        .unwrap();
                }
                store.snapshot(&id).unwrap()
            }));
        }

        for handle in handles {
            let snap = handle.await.unwrap();
            assert_eq!(snap.version, 20);
            assert_eq!(snap.text.len(), 20);
        }
    }
}
