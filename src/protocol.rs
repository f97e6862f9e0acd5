//! Glint command protocol
//!
//! Defines the contract between the hosting editor and the backend: commands
//! flow in, events flow out, correlated by envelope id. Commands are the
//! editor-invoked actions the dispatcher forwards to the analysis server.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::documents::DocumentError;
use crate::lsp::types::{ClientError, Range, Runnable, WorkspaceEdit};

// ==============================================================================
// 0. Version
// ==============================================================================

/// Semantic version for protocol compatibility checking
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl Version {
    pub const CURRENT: Version = Version {
        major: 1,
        minor: 0,
        patch: 0,
    };

    /// Check if two versions are compatible (same major version)
    pub fn is_compatible(&self, other: &Version) -> bool {
        self.major == other.major
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// ==============================================================================
// 1. Envelopes
// ==============================================================================

/// The envelope for all editor -> backend commands
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CommandEnvelope {
    pub id: Uuid,          // Correlation ID
    pub timestamp: u64,    // Editor-side timestamp (ms since epoch)
    pub version: Version,  // Protocol version
    pub command: EditorCommand,
}

/// The envelope for all backend -> editor events
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EventEnvelope {
    pub id: Uuid,                  // Event ID
    pub timestamp: u64,            // Backend-side timestamp
    pub causality_id: Option<Uuid>, // ID of the command that caused this
    pub event: EditorEvent,
}

// ==============================================================================
// 2. Commands (editor-invoked actions)
// ==============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", content = "payload")]
pub enum EditorCommand {
    /// Expand the macro call under the cursor into a virtual buffer
    ExpandMacro {
        path: String,
        line: u32,
        character: u32,
    },
    /// Show the server's syntax-tree dump in a virtual buffer
    ViewSyntaxTree {
        path: String,
        #[serde(default)]
        range: Option<Range>,
    },
    /// Run a structural search/replace query and apply the resulting edit
    StructuralSearchReplace {
        query: String,
        #[serde(default)]
        parse_only: bool,
        path: String,
        line: u32,
        character: u32,
    },
    /// Discover runnables for a document
    DiscoverRunnables {
        path: String,
        #[serde(default)]
        line: Option<u32>,
        #[serde(default)]
        character: Option<u32>,
    },
    /// Join the lines covered by the given ranges
    JoinLines { path: String, ranges: Vec<Range> },
    /// Apply a workspace edit, honoring snippet placeholder markers
    ApplyWorkspaceEdit { edit: WorkspaceEdit },
    /// Report the analysis server's version
    ServerVersion,
    /// Open a document and sync it to the server
    OpenDocument { path: String, content: String },
    /// Replace a document's content and sync it to the server
    ChangeDocument { path: String, content: String },
    /// Close a document and sync the close to the server
    CloseDocument { path: String },
}

// ==============================================================================
// 3. Events
// ==============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", content = "payload")]
pub enum EditorEvent {
    CommandAccepted {
        command_id: Uuid,
    },
    CommandCompleted {
        command_id: Uuid,
    },
    CommandFailed {
        command_id: Uuid,
        error: CommandError,
    },
    /// A virtual buffer holding rendered server output was opened
    BufferOpened {
        id: String,
        title: String,
        content: String,
    },
    /// A grouped edit was applied to a document
    EditApplied {
        document: String,
    },
    RunnablesDiscovered {
        path: String,
        runnables: Vec<Runnable>,
    },
    /// A structural search/replace query parsed cleanly (parse-only mode)
    SsrValidated {
        query: String,
    },
    ServerVersion {
        version: String,
    },
}

// ==============================================================================
// 4. Error Model
// ==============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "code", content = "details")]
pub enum CommandError {
    VersionMismatch {
        expected: Version,
        received: Version,
    },
    ResourceNotFound {
        id: String,
    },
    DocumentFailure {
        message: String,
    },
    ServerFailure {
        message: String,
    },
    Internal {
        message: String,
    },
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::VersionMismatch { expected, received } => {
                write!(f, "Protocol version mismatch: expected {}, received {}", expected, received)
            }
            CommandError::ResourceNotFound { id } => write!(f, "Resource not found: {}", id),
            CommandError::DocumentFailure { message } => write!(f, "Document failure: {}", message),
            CommandError::ServerFailure { message } => write!(f, "Server failure: {}", message),
            CommandError::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<DocumentError> for CommandError {
    fn from(err: DocumentError) -> Self {
        CommandError::DocumentFailure {
            message: err.to_string(),
        }
    }
}

impl From<ClientError> for CommandError {
    fn from(err: ClientError) -> Self {
        CommandError::ServerFailure {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_envelope_serialization() {
        let id = Uuid::new_v4();
        let envelope = CommandEnvelope {
            id,
            timestamp: 1700000000,
            version: Version::CURRENT,
            command: EditorCommand::ExpandMacro {
                path: "src/lib.rs".to_string(),
                line: 12,
                character: 8,
            },
        };

        let json = serde_json::to_string(&envelope).expect("Failed to serialize command envelope");
        let deserialized: CommandEnvelope =
            serde_json::from_str(&json).expect("Failed to deserialize command envelope");

        assert_eq!(envelope.id, deserialized.id);
        assert_eq!(envelope.timestamp, deserialized.timestamp);

        if let EditorCommand::ExpandMacro { path, line, .. } = deserialized.command {
            assert_eq!(path, "src/lib.rs");
            assert_eq!(line, 12);
        } else {
            panic!("Deserialized command has wrong type");
        }
    }

    #[test]
    fn test_event_envelope_serialization() {
        let id = Uuid::new_v4();
        let causality_id = Uuid::new_v4();
        let envelope = EventEnvelope {
            id,
            timestamp: 1700000001,
            causality_id: Some(causality_id),
            event: EditorEvent::ServerVersion {
                version: "0.4.2".to_string(),
            },
        };

        let json = serde_json::to_string(&envelope).expect("Failed to serialize event envelope");
        let deserialized: EventEnvelope =
            serde_json::from_str(&json).expect("Failed to deserialize event envelope");

        assert_eq!(envelope.id, deserialized.id);
        assert_eq!(envelope.causality_id, deserialized.causality_id);

        if let EditorEvent::ServerVersion { version } = deserialized.event {
            assert_eq!(version, "0.4.2");
        } else {
            panic!("Deserialized event has wrong type");
        }
    }

    #[test]
    fn test_error_serialization() {
        let error = CommandError::ResourceNotFound {
            id: "view://macro-expansion".to_string(),
        };
        let json = serde_json::to_string(&error).expect("Failed to serialize error");

        // Verify structure: { "code": "ResourceNotFound", "details": { "id": ... } }
        let value: serde_json::Value =
            serde_json::from_str(&json).expect("Failed to parse error JSON");
        assert_eq!(value["code"], "ResourceNotFound");
        assert_eq!(value["details"]["id"], "view://macro-expansion");
    }

    #[test]
    fn test_version_compatibility() {
        let v1_5 = Version { major: 1, minor: 5, patch: 0 };
        let v2_0 = Version { major: 2, minor: 0, patch: 0 };
        assert!(Version::CURRENT.is_compatible(&v1_5));
        assert!(!Version::CURRENT.is_compatible(&v2_0));
        assert_eq!(v2_0.to_string(), "2.0.0");
    }
}
