//! Analysis-protocol type definitions and conversions
//!
//! Provides error types, extension-capability tracking, and the wire types
//! shared between the client and the command layer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Error types for analysis-server operations
#[derive(Debug, Clone)]
pub enum ClientError {
    /// Failed to spawn the server process
    SpawnFailed(String),
    /// Server initialization failed
    InitializationFailed(String),
    /// JSON-RPC error from server
    RpcError { code: i32, message: String },
    /// Failed to parse response
    ParseError(String),
    /// Server shut down unexpectedly
    ServerShutdown,
    /// IO error during communication
    IoError(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::SpawnFailed(msg) => write!(f, "Failed to spawn analysis server: {}", msg),
            ClientError::InitializationFailed(msg) => {
                write!(f, "Analysis server initialization failed: {}", msg)
            }
            ClientError::RpcError { code, message } => {
                write!(f, "Analysis server RPC error {}: {}", code, message)
            }
            ClientError::ParseError(msg) => {
                write!(f, "Failed to parse analysis server response: {}", msg)
            }
            ClientError::ServerShutdown => write!(f, "Analysis server shut down unexpectedly"),
            ClientError::IoError(msg) => write!(f, "Analysis server IO error: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::ParseError(err.to_string())
    }
}

/// Tracked extension capabilities
///
/// We track which editor-specific extension requests the server advertised
/// during initialization to know which commands can be forwarded.
#[derive(Debug, Clone, Default)]
pub struct ExtensionCapabilities {
    /// Server supports experimental/expandMacro
    pub expand_macro: bool,
    /// Server supports experimental/syntaxTree
    pub syntax_tree: bool,
    /// Server supports experimental/ssr
    pub ssr: bool,
    /// Server supports experimental/runnables
    pub runnables: bool,
    /// Server supports experimental/joinLines
    pub join_lines: bool,
    /// Server supports experimental/serverVersion
    pub server_version: bool,
}

impl ExtensionCapabilities {
    /// Create capabilities from the InitializeResult `experimental` section
    pub fn from_initialize_result(result: &serde_json::Value) -> Self {
        let caps = result.get("capabilities").unwrap_or(result);
        let exp = match caps.get("experimental") {
            Some(exp) => exp,
            None => return Self::default(),
        };

        let advertised = |name: &str| exp.get(name).map(|v| !v.is_null()).unwrap_or(false);

        Self {
            expand_macro: advertised("expandMacro"),
            syntax_tree: advertised("syntaxTree"),
            ssr: advertised("ssr"),
            runnables: advertised("runnables"),
            join_lines: advertised("joinLines"),
            server_version: advertised("serverVersion"),
        }
    }
}

/// Position (0-indexed line and character)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Text range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// A single text replacement in a document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    pub range: Range,
    pub new_text: String,
}

/// Identifies the document a grouped edit targets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentIdentifier {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
}

/// An ordered batch of edits against a single document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentEdit {
    pub text_document: TextDocumentIdentifier,
    pub edits: Vec<TextEdit>,
}

/// One entry of a workspace edit's `documentChanges` list
///
/// Resource operations (create/rename/delete) are carried opaquely; the
/// applier's capability test rejects edits that contain them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentChange {
    Edit(TextDocumentEdit),
    ResourceOp(serde_json::Value),
}

/// Workspace edit as returned by the server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceEdit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<HashMap<String, Vec<TextEdit>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_changes: Option<Vec<DocumentChange>>,
}

/// Result of experimental/expandMacro
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandedMacro {
    pub name: String,
    pub expansion: String,
}

/// A runnable discovered by experimental/runnables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Runnable {
    pub label: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<serde_json::Value>,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_parsing() {
        let result = serde_json::json!({
            "capabilities": {
                "textDocumentSync": 1,
                "experimental": {
                    "expandMacro": true,
                    "ssr": true,
                    "runnables": { "kinds": ["cargo"] },
                    "joinLines": true
                }
            }
        });

        let caps = ExtensionCapabilities::from_initialize_result(&result);
        assert!(caps.expand_macro);
        assert!(caps.ssr);
        assert!(caps.runnables);
        assert!(caps.join_lines);
        assert!(!caps.syntax_tree);
        assert!(!caps.server_version);
    }

    #[test]
    fn test_capabilities_missing_experimental_section() {
        let result = serde_json::json!({
            "capabilities": { "textDocumentSync": 1 }
        });

        let caps = ExtensionCapabilities::from_initialize_result(&result);
        assert!(!caps.expand_macro);
        assert!(!caps.ssr);
    }

    #[test]
    fn test_position_serialization() {
        let pos = Position::new(10, 5);
        let json = serde_json::to_string(&pos).unwrap();
        assert_eq!(json, r#"{"line":10,"character":5}"#);
    }

    #[test]
    fn test_workspace_edit_document_changes_parsing() {
        let json = serde_json::json!({
            "documentChanges": [
                {
                    "textDocument": { "uri": "file:///a.rs", "version": 3 },
                    "edits": [
                        {
                            "range": {
                                "start": { "line": 0, "character": 0 },
                                "end": { "line": 0, "character": 4 }
                            },
                            "newText": "spawn"
                        }
                    ]
                },
                { "kind": "create", "uri": "file:///b.rs" }
            ]
        });

        let edit: WorkspaceEdit = serde_json::from_value(json).unwrap();
        let changes = edit.document_changes.unwrap();
        assert_eq!(changes.len(), 2);
        match &changes[0] {
            DocumentChange::Edit(group) => {
                assert_eq!(group.text_document.uri, "file:///a.rs");
                assert_eq!(group.edits[0].new_text, "spawn");
            }
            DocumentChange::ResourceOp(_) => panic!("first entry should be a text edit group"),
        }
        assert!(matches!(&changes[1], DocumentChange::ResourceOp(_)));
    }
}
