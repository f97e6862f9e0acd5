//! In-memory document store
//!
//! Holds the buffer set the hosting editor exposes to the backend: open
//! documents, the currently active document, and the last placed selection.
//! Edit application, activation, and selection placement are the suspension
//! points the snippet applier awaits between steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::lsp::types::{Position, TextEdit};

/// Errors from document-store operations
#[derive(Debug, Clone)]
pub enum DocumentError {
    /// No document with the given id is open
    NotFound(String),
}

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentError::NotFound(id) => write!(f, "Document not found: {}", id),
        }
    }
}

impl std::error::Error for DocumentError {}

/// A cursor selection to place after an edit group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub start: Position,
    pub end: Position,
}

impl Selection {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// A zero-width selection (caret placement)
    pub fn caret(position: Position) -> Self {
        Self {
            start: position,
            end: position,
        }
    }
}

/// An open document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub modified: bool,
}

/// The live buffer set
///
/// Externally owned by the hosting editor and single-writer during an edit
/// group; interior mutability only.
pub struct DocumentStore {
    documents: Mutex<HashMap<String, Document>>,
    active: Mutex<Option<String>>,
    selection: Mutex<Option<(String, Selection)>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            active: Mutex::new(None),
            selection: Mutex::new(None),
        }
    }

    /// Open (or replace) a document with the given content
    pub fn open(&self, id: &str, title: &str, content: &str) {
        let doc = Document {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            version: 1,
            created_at: Utc::now(),
            modified: false,
        };

        let mut docs = self.documents.lock().unwrap();
        docs.insert(id.to_string(), doc);
    }

    /// Close a document; clears active/selection state pointing at it
    pub fn close(&self, id: &str) -> bool {
        let removed = self.documents.lock().unwrap().remove(id).is_some();
        if removed {
            let mut active = self.active.lock().unwrap();
            if active.as_deref() == Some(id) {
                *active = None;
            }
            let mut selection = self.selection.lock().unwrap();
            if selection.as_ref().map(|(doc, _)| doc.as_str()) == Some(id) {
                *selection = None;
            }
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        self.documents.lock().unwrap().get(id).cloned()
    }

    pub fn content(&self, id: &str) -> Option<String> {
        self.documents
            .lock()
            .unwrap()
            .get(id)
            .map(|d| d.content.clone())
    }

    pub fn list(&self) -> Vec<Document> {
        self.documents.lock().unwrap().values().cloned().collect()
    }

    /// Replace a document's whole content (editor-side buffer update)
    pub fn update_content(&self, id: &str, content: &str) -> Result<i32, DocumentError> {
        let mut docs = self.documents.lock().unwrap();
        let doc = docs
            .get_mut(id)
            .ok_or_else(|| DocumentError::NotFound(id.to_string()))?;
        doc.content = content.to_string();
        doc.version += 1;
        doc.modified = true;
        Ok(doc.version)
    }

    /// The currently active (focused) document, if any
    pub async fn active_document(&self) -> Option<String> {
        self.active.lock().unwrap().clone()
    }

    /// Switch the active document
    pub async fn activate(&self, id: &str) -> Result<(), DocumentError> {
        if !self.documents.lock().unwrap().contains_key(id) {
            return Err(DocumentError::NotFound(id.to_string()));
        }
        *self.active.lock().unwrap() = Some(id.to_string());
        Ok(())
    }

    /// Apply a single text edit to a document, returning the new version
    ///
    /// Positions beyond the end of a line or of the document are clamped.
    pub async fn apply_edit(&self, id: &str, edit: &TextEdit) -> Result<i32, DocumentError> {
        let mut docs = self.documents.lock().unwrap();
        let doc = docs
            .get_mut(id)
            .ok_or_else(|| DocumentError::NotFound(id.to_string()))?;

        let start = byte_offset(&doc.content, edit.range.start);
        let end = byte_offset(&doc.content, edit.range.end).max(start);

        let mut new_content =
            String::with_capacity(doc.content.len() - (end - start) + edit.new_text.len());
        new_content.push_str(&doc.content[..start]);
        new_content.push_str(&edit.new_text);
        new_content.push_str(&doc.content[end..]);

        doc.content = new_content;
        doc.version += 1;
        doc.modified = true;
        Ok(doc.version)
    }

    /// Place a cursor selection in a document
    pub async fn set_selection(&self, id: &str, selection: Selection) -> Result<(), DocumentError> {
        if !self.documents.lock().unwrap().contains_key(id) {
            return Err(DocumentError::NotFound(id.to_string()));
        }
        *self.selection.lock().unwrap() = Some((id.to_string(), selection));
        Ok(())
    }

    /// The last placed selection, if any
    pub fn selection(&self) -> Option<(String, Selection)> {
        self.selection.lock().unwrap().clone()
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a (line, character) position to a byte offset into `content`
///
/// Character counts are Unicode scalar values. Out-of-range positions clamp
/// to the line end / document end.
fn byte_offset(content: &str, position: Position) -> usize {
    let mut offset = 0;
    let mut line = 0u32;

    for l in content.split_inclusive('\n') {
        if line == position.line {
            let body = l.strip_suffix('\n').unwrap_or(l);
            let mut column = 0u32;
            for (i, _) in body.char_indices() {
                if column == position.character {
                    return offset + i;
                }
                column += 1;
            }
            return offset + body.len();
        }
        offset += l.len();
        line += 1;
    }

    content.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsp::types::Range;

    fn edit(start: (u32, u32), end: (u32, u32), text: &str) -> TextEdit {
        TextEdit {
            range: Range::new(
                Position::new(start.0, start.1),
                Position::new(end.0, end.1),
            ),
            new_text: text.to_string(),
        }
    }

    #[test]
    fn test_byte_offset() {
        let content = "fn main() {\n    let x = 1;\n}\n";
        assert_eq!(byte_offset(content, Position::new(0, 0)), 0);
        assert_eq!(byte_offset(content, Position::new(0, 3)), 3);
        assert_eq!(byte_offset(content, Position::new(1, 4)), 16);
        // Past line end clamps to the line break
        assert_eq!(byte_offset(content, Position::new(0, 99)), 11);
        // Past document end clamps to the document length
        assert_eq!(byte_offset(content, Position::new(99, 0)), content.len());
    }

    #[test]
    fn test_byte_offset_multibyte() {
        let content = "héllo\nwörld\n";
        // 'é' is two bytes; column counts are characters
        assert_eq!(byte_offset(content, Position::new(0, 2)), 3);
        assert_eq!(byte_offset(content, Position::new(1, 1)), 8);
    }

    #[tokio::test]
    async fn test_apply_edit_insert() {
        let store = DocumentStore::new();
        store.open("file:///a.rs", "a.rs", "fn main() {}\n");

        let version = store
            .apply_edit("file:///a.rs", &edit((0, 11), (0, 11), "  todo!() "))
            .await
            .unwrap();

        assert_eq!(version, 2);
        assert_eq!(
            store.content("file:///a.rs").unwrap(),
            "fn main() {  todo!() }\n"
        );
        assert!(store.get("file:///a.rs").unwrap().modified);
    }

    #[tokio::test]
    async fn test_apply_edit_multiline_replace() {
        let store = DocumentStore::new();
        store.open("file:///a.rs", "a.rs", "one\ntwo\nthree\n");

        store
            .apply_edit("file:///a.rs", &edit((0, 3), (2, 0), " ")) // join first three lines
            .await
            .unwrap();

        assert_eq!(store.content("file:///a.rs").unwrap(), "one three\n");
    }

    #[tokio::test]
    async fn test_apply_edit_unknown_document() {
        let store = DocumentStore::new();
        let result = store
            .apply_edit("file:///missing.rs", &edit((0, 0), (0, 0), "x"))
            .await;
        assert!(matches!(result, Err(DocumentError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_activate_and_selection() {
        let store = DocumentStore::new();
        store.open("file:///a.rs", "a.rs", "");
        store.open("file:///b.rs", "b.rs", "");

        store.activate("file:///a.rs").await.unwrap();
        assert_eq!(
            store.active_document().await.as_deref(),
            Some("file:///a.rs")
        );

        assert!(store.activate("file:///missing.rs").await.is_err());

        let selection = Selection::caret(Position::new(1, 2));
        store
            .set_selection("file:///a.rs", selection)
            .await
            .unwrap();
        assert_eq!(
            store.selection(),
            Some(("file:///a.rs".to_string(), selection))
        );

        // Closing the document clears dependent state
        assert!(store.close("file:///a.rs"));
        assert!(store.active_document().await.is_none());
        assert!(store.selection().is_none());
    }
}
