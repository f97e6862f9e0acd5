//! Snippet-aware edit application
//!
//! The analysis server may embed a placeholder marker (`$0` or
//! `${0:default}`) in the replacement text of an edit to say "the cursor
//! should land here after insertion". This module splits such an edit into a
//! plain text edit plus a post-apply cursor selection, and applies grouped
//! edits sequentially while tracking line-number drift across edits to the
//! same document.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::documents::{DocumentError, DocumentStore, Selection};
use crate::lsp::types::{DocumentChange, Position, TextEdit, WorkspaceEdit};

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\$(0|\{0:([^}]*)\})").unwrap();
}

/// A placeholder marker resolved out of replacement text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSnippet {
    /// Replacement text with the marker substituted by its default content
    pub text: String,
    /// Byte offset of the default content within `text`
    pub offset: usize,
    /// Byte length of the default content
    pub len: usize,
}

/// Detect the first placeholder marker in replacement text
///
/// Returns `None` when the text carries no marker — a normal outcome for
/// edits with no cursor placement, not an error. Any further markers are left
/// in place.
pub fn parse_marker(new_text: &str) -> Option<ParsedSnippet> {
    let captures = PLACEHOLDER.captures(new_text)?;
    let marker = captures.get(0)?;
    let default = captures.get(2).map(|d| d.as_str()).unwrap_or("");

    let mut text = String::with_capacity(new_text.len());
    text.push_str(&new_text[..marker.start()]);
    text.push_str(default);
    text.push_str(&new_text[marker.end()..]);

    Some(ParsedSnippet {
        text,
        offset: marker.start(),
        len: default.len(),
    })
}

/// An ordered batch of edits against a single document
#[derive(Debug, Clone)]
pub struct GroupedEdit {
    pub document: String,
    pub edits: Vec<TextEdit>,
}

impl GroupedEdit {
    /// Capability test: is this workspace edit a same-document batch?
    ///
    /// A workspace edit is groupable iff it addresses exactly one document
    /// with ordered text edits and no resource operations. Anything else
    /// returns `None` and the caller treats the whole operation as a no-op.
    pub fn from_workspace_edit(edit: &WorkspaceEdit) -> Option<GroupedEdit> {
        if let Some(changes) = &edit.document_changes {
            if changes
                .iter()
                .any(|c| matches!(c, DocumentChange::ResourceOp(_)))
            {
                return None;
            }
            let mut groups = changes.iter().filter_map(|c| match c {
                DocumentChange::Edit(group) => Some(group),
                DocumentChange::ResourceOp(_) => None,
            });
            let first = groups.next()?;
            if groups.next().is_some() {
                return None;
            }
            return Some(GroupedEdit {
                document: first.text_document.uri.clone(),
                edits: first.edits.clone(),
            });
        }

        if let Some(changes) = &edit.changes {
            if changes.len() != 1 {
                return None;
            }
            let (uri, edits) = changes.iter().next()?;
            return Some(GroupedEdit {
                document: uri.clone(),
                edits: edits.clone(),
            });
        }

        None
    }
}

/// Apply a workspace edit, honoring an embedded placeholder marker
///
/// Workspace edits that are not a same-document batch are skipped entirely;
/// nothing surfaces to the caller.
pub async fn apply_workspace_edit(
    store: &DocumentStore,
    edit: &WorkspaceEdit,
) -> Result<(), DocumentError> {
    match GroupedEdit::from_workspace_edit(edit) {
        Some(group) => apply_grouped_edit(store, &group).await,
        None => {
            warn!("workspace edit is not a same-document batch, skipping");
            Ok(())
        }
    }
}

/// Apply a grouped edit and place the cursor at its placeholder marker
///
/// Edits are applied strictly in order, each awaited before the next, since
/// later line-number computations depend on the cumulative effect of earlier
/// applications. Only the first marker in the group is honored; edits after
/// it are applied verbatim. If the edited document was not the active one,
/// the store is switched to it and selection placement is abandoned.
pub async fn apply_grouped_edit(
    store: &DocumentStore,
    group: &GroupedEdit,
) -> Result<(), DocumentError> {
    let mut place_selection = true;
    match store.active_document().await {
        Some(active) if active == group.document => {}
        _ => {
            store.activate(&group.document).await?;
            place_selection = false;
        }
    }

    let mut selection: Option<Selection> = None;
    let mut line_drift: i64 = 0;

    for edit in &group.edits {
        if selection.is_none() {
            if let Some(snippet) = parse_marker(&edit.new_text) {
                selection = Some(marker_selection(edit, &snippet, line_drift));
                let resolved = TextEdit {
                    range: edit.range,
                    new_text: snippet.text,
                };
                store.apply_edit(&group.document, &resolved).await?;
                continue;
            }
            // Only edits preceding the marker shift its target line.
            line_drift += line_breaks(&edit.new_text) as i64
                - (edit.range.end.line as i64 - edit.range.start.line as i64);
        }
        store.apply_edit(&group.document, edit).await?;
    }

    if let Some(selection) = selection {
        if place_selection
            && store.active_document().await.as_deref() == Some(group.document.as_str())
        {
            debug!(document = %group.document, ?selection, "placing snippet selection");
            store.set_selection(&group.document, selection).await?;
        }
    }

    Ok(())
}

/// Compute the post-apply selection for a marker-bearing edit
fn marker_selection(edit: &TextEdit, snippet: &ParsedSnippet, line_drift: i64) -> Selection {
    let prefix = &snippet.text[..snippet.offset];
    let line = edit.range.start.line as i64 + line_drift + line_breaks(prefix) as i64;
    let line = line.max(0) as u32;

    let column = match prefix.rfind('\n') {
        // Marker on the first line of the insertion: offset from the edit start
        None => edit.range.start.character + char_len(prefix) as u32,
        // Marker on a later line: distance from the last line break
        Some(newline) => char_len(&prefix[newline + 1..]) as u32,
    };

    let placeholder = &snippet.text[snippet.offset..snippet.offset + snippet.len];
    Selection::new(
        Position::new(line, column),
        Position::new(line, column + char_len(placeholder) as u32),
    )
}

fn line_breaks(text: &str) -> usize {
    text.matches('\n').count()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
