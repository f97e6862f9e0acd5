//! Glint — an editor integration layer for external language-analysis
//! servers.
//!
//! Glint connects a text-editor host to an analysis server speaking the
//! Language Server Protocol and adds a small set of editor-specific commands:
//! macro expansion, syntax-tree display, structural search/replace, runnable
//! discovery, and snippet-aware edit application. Each command is a thin
//! request/response shim: the dispatcher forwards an editor action to the
//! server and renders the result into the document store the host exposes.
//!
//! The one piece of real logic lives in [`snippet`]: replacement text
//! returned by the server may embed a placeholder marker (`$0` or
//! `${0:default}`), and applying such an edit means splitting it into a
//! plain text edit plus a post-apply cursor selection, tracking line-number
//! drift across the edits of a group.

pub mod config;
pub mod dispatcher;
pub mod documents;
pub mod lsp;
pub mod protocol;
pub mod snippet;

pub use config::AnalysisServerConfig;
pub use dispatcher::CommandDispatcher;
pub use documents::{Document, DocumentError, DocumentStore, Selection};
pub use protocol::{
    CommandEnvelope, CommandError, EditorCommand, EditorEvent, EventEnvelope, Version,
};
pub use snippet::{apply_grouped_edit, apply_workspace_edit, parse_marker, GroupedEdit, ParsedSnippet};
