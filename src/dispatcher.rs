//! Command dispatcher
//!
//! Routes editor command envelopes to analysis-server requests and renders
//! the responses: virtual buffers for read-only output, snippet-aware edit
//! application for returned workspace edits, and events for everything the
//! editor draws itself.

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AnalysisServerConfig;
use crate::documents::DocumentStore;
use crate::lsp::types::{ClientError, WorkspaceEdit};
use crate::lsp::AnalysisClient;
use crate::protocol::{
    CommandEnvelope, CommandError, EditorCommand, EditorEvent, EventEnvelope, Version,
};
use crate::snippet::{self, GroupedEdit};

/// Routes editor commands to the analysis server and the document store
///
/// The analysis client is started lazily on the first command that needs it;
/// document-sync notifications to a not-yet-started server are dropped.
pub struct CommandDispatcher {
    config: AnalysisServerConfig,
    workspace_root: String,
    client: Mutex<Option<AnalysisClient>>,
    documents: Arc<DocumentStore>,
    events: UnboundedSender<EventEnvelope>,
}

impl CommandDispatcher {
    pub fn new(
        config: AnalysisServerConfig,
        workspace_root: &str,
        documents: Arc<DocumentStore>,
        events: UnboundedSender<EventEnvelope>,
    ) -> Self {
        Self {
            config,
            workspace_root: workspace_root.to_string(),
            client: Mutex::new(None),
            documents,
            events,
        }
    }

    /// Dispatch one command envelope
    ///
    /// Pipeline: version check, accept ack, route, completion/failure event.
    /// Routing errors are both emitted as events and returned to the caller.
    pub async fn dispatch(&self, envelope: CommandEnvelope) -> Result<(), CommandError> {
        if !Version::CURRENT.is_compatible(&envelope.version) {
            let error = CommandError::VersionMismatch {
                expected: Version::CURRENT,
                received: envelope.version,
            };
            self.emit(
                Some(envelope.id),
                EditorEvent::CommandFailed {
                    command_id: envelope.id,
                    error: error.clone(),
                },
            );
            return Err(error);
        }

        let command_id = envelope.id;
        self.emit(
            Some(command_id),
            EditorEvent::CommandAccepted { command_id },
        );

        let result = self.route(command_id, envelope.command).await;

        match &result {
            Ok(()) => self.emit(
                Some(command_id),
                EditorEvent::CommandCompleted { command_id },
            ),
            Err(error) => self.emit(
                Some(command_id),
                EditorEvent::CommandFailed {
                    command_id,
                    error: error.clone(),
                },
            ),
        }

        result
    }

    async fn route(&self, command_id: Uuid, command: EditorCommand) -> Result<(), CommandError> {
        debug!(%command_id, ?command, "routing command");

        match command {
            EditorCommand::ExpandMacro {
                path,
                line,
                character,
            } => {
                let uri = path_to_uri(&path);
                let expansion =
                    self.with_client(|client| client.expand_macro(&uri, line, character))?;
                let Some(expansion) = expansion else {
                    return Err(CommandError::ResourceNotFound {
                        id: format!("no macro expansion at {}:{}:{}", path, line, character),
                    });
                };

                let id = format!("view://macro-expansion/{}", expansion.name);
                let title = format!("Expansion of {}", expansion.name);
                self.documents.open(&id, &title, &expansion.expansion);
                self.emit(
                    Some(command_id),
                    EditorEvent::BufferOpened {
                        id,
                        title,
                        content: expansion.expansion,
                    },
                );
                Ok(())
            }

            EditorCommand::ViewSyntaxTree { path, range } => {
                let uri = path_to_uri(&path);
                let tree = self.with_client(|client| client.syntax_tree(&uri, range))?;

                let id = "view://syntax-tree".to_string();
                let title = "Syntax Tree".to_string();
                self.documents.open(&id, &title, &tree);
                self.emit(
                    Some(command_id),
                    EditorEvent::BufferOpened {
                        id,
                        title,
                        content: tree,
                    },
                );
                Ok(())
            }

            EditorCommand::StructuralSearchReplace {
                query,
                parse_only,
                path,
                line,
                character,
            } => {
                let uri = path_to_uri(&path);
                let edit = self
                    .with_client(|client| client.ssr(&query, parse_only, &uri, line, character))?;

                if parse_only {
                    self.emit(Some(command_id), EditorEvent::SsrValidated { query });
                    return Ok(());
                }

                self.apply_edit_with_snippets(command_id, &edit).await
            }

            EditorCommand::DiscoverRunnables {
                path,
                line,
                character,
            } => {
                let uri = path_to_uri(&path);
                let runnables =
                    self.with_client(|client| client.runnables(&uri, line, character))?;
                self.emit(
                    Some(command_id),
                    EditorEvent::RunnablesDiscovered { path, runnables },
                );
                Ok(())
            }

            EditorCommand::JoinLines { path, ranges } => {
                let uri = path_to_uri(&path);
                let edits = self.with_client(|client| client.join_lines(&uri, &ranges))?;
                if edits.is_empty() {
                    return Ok(());
                }

                let group = GroupedEdit {
                    document: uri,
                    edits,
                };
                snippet::apply_grouped_edit(&self.documents, &group).await?;
                self.emit(
                    Some(command_id),
                    EditorEvent::EditApplied {
                        document: group.document,
                    },
                );
                Ok(())
            }

            EditorCommand::ApplyWorkspaceEdit { edit } => {
                self.apply_edit_with_snippets(command_id, &edit).await
            }

            EditorCommand::ServerVersion => {
                let version = self.with_client(|client| client.server_version())?;
                self.emit(Some(command_id), EditorEvent::ServerVersion { version });
                Ok(())
            }

            EditorCommand::OpenDocument { path, content } => {
                let uri = path_to_uri(&path);
                let title = path
                    .rsplit('/')
                    .next()
                    .unwrap_or(path.as_str())
                    .to_string();
                self.documents.open(&uri, &title, &content);
                self.with_client(|client| client.did_open(&uri, &content))?;
                Ok(())
            }

            EditorCommand::ChangeDocument { path, content } => {
                let uri = path_to_uri(&path);
                let version = self.documents.update_content(&uri, &content)?;
                self.with_running_client(|client| client.did_change(&uri, version, &content))?;
                Ok(())
            }

            EditorCommand::CloseDocument { path } => {
                let uri = path_to_uri(&path);
                self.documents.close(&uri);
                self.with_running_client(|client| client.did_close(&uri))?;
                Ok(())
            }
        }
    }

    /// Apply a server-returned workspace edit through the snippet applier
    ///
    /// Non-groupable edits are a silent no-op: no `EditApplied` event, no
    /// error.
    async fn apply_edit_with_snippets(
        &self,
        command_id: Uuid,
        edit: &WorkspaceEdit,
    ) -> Result<(), CommandError> {
        match GroupedEdit::from_workspace_edit(edit) {
            Some(group) => {
                snippet::apply_grouped_edit(&self.documents, &group).await?;
                self.emit(
                    Some(command_id),
                    EditorEvent::EditApplied {
                        document: group.document,
                    },
                );
                Ok(())
            }
            None => {
                warn!(%command_id, "workspace edit is not a same-document batch, skipping");
                Ok(())
            }
        }
    }

    /// Run a closure against the analysis client, starting it if needed
    fn with_client<T>(
        &self,
        f: impl FnOnce(&mut AnalysisClient) -> Result<T, ClientError>,
    ) -> Result<T, CommandError> {
        let mut guard = self.client.lock().unwrap();
        if guard.is_none() {
            let args: Vec<&str> = self.config.args.iter().map(|s| s.as_str()).collect();
            let root_uri = path_to_uri(&self.workspace_root);
            let mut client = AnalysisClient::new(
                &self.config.command,
                &args,
                &root_uri,
                &self.config.language_id,
            )?;
            client.initialize()?;
            *guard = Some(client);
        }
        f(guard.as_mut().unwrap()).map_err(CommandError::from)
    }

    /// Run a closure against the client only if it is already started
    fn with_running_client(
        &self,
        f: impl FnOnce(&AnalysisClient) -> Result<(), ClientError>,
    ) -> Result<(), CommandError> {
        let guard = self.client.lock().unwrap();
        match guard.as_ref() {
            Some(client) => f(client).map_err(CommandError::from),
            None => Ok(()),
        }
    }

    fn emit(&self, causality_id: Option<Uuid>, event: EditorEvent) {
        let envelope = EventEnvelope {
            id: Uuid::new_v4(),
            timestamp: now_millis(),
            causality_id,
            event,
        };
        // The host may have dropped its receiver during shutdown
        let _ = self.events.send(envelope);
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Convert a file path to a file:// URI
fn path_to_uri(path: &str) -> String {
    if path.starts_with("file://") || path.starts_with("view://") {
        path.to_string()
    } else {
        format!("file://{}", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsp::types::{Position, Range, TextEdit, WorkspaceEdit};
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    fn dispatcher() -> (
        CommandDispatcher,
        Arc<DocumentStore>,
        mpsc::UnboundedReceiver<EventEnvelope>,
    ) {
        let documents = Arc::new(DocumentStore::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = CommandDispatcher::new(
            AnalysisServerConfig::default(),
            "/tmp/workspace",
            Arc::clone(&documents),
            tx,
        );
        (dispatcher, documents, rx)
    }

    fn envelope(version: Version, command: EditorCommand) -> CommandEnvelope {
        CommandEnvelope {
            id: Uuid::new_v4(),
            timestamp: 0,
            version,
            command,
        }
    }

    #[tokio::test]
    async fn test_version_mismatch_rejected_before_routing() {
        let (dispatcher, _documents, mut rx) = dispatcher();

        let incompatible = Version {
            major: 99,
            minor: 0,
            patch: 0,
        };
        let result = dispatcher
            .dispatch(envelope(incompatible, EditorCommand::ServerVersion))
            .await;

        assert!(matches!(
            result,
            Err(CommandError::VersionMismatch { .. })
        ));
        let first = rx.recv().await.unwrap();
        assert!(matches!(first.event, EditorEvent::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_apply_workspace_edit_command() {
        let (dispatcher, documents, mut rx) = dispatcher();
        documents.open("file:///a.rs", "a.rs", "old\n");
        documents.activate("file:///a.rs").await.unwrap();

        let mut changes = HashMap::new();
        changes.insert(
            "file:///a.rs".to_string(),
            vec![TextEdit {
                range: Range::new(Position::new(0, 0), Position::new(0, 3)),
                new_text: "new".to_string(),
            }],
        );
        let edit = WorkspaceEdit {
            changes: Some(changes),
            document_changes: None,
        };

        dispatcher
            .dispatch(envelope(
                Version::CURRENT,
                EditorCommand::ApplyWorkspaceEdit { edit },
            ))
            .await
            .unwrap();

        assert_eq!(documents.content("file:///a.rs").unwrap(), "new\n");

        let accepted = rx.recv().await.unwrap();
        assert!(matches!(
            accepted.event,
            EditorEvent::CommandAccepted { .. }
        ));
        let applied = rx.recv().await.unwrap();
        match applied.event {
            EditorEvent::EditApplied { document } => assert_eq!(document, "file:///a.rs"),
            other => panic!("expected EditApplied, got {:?}", other),
        }
        let completed = rx.recv().await.unwrap();
        assert!(matches!(
            completed.event,
            EditorEvent::CommandCompleted { .. }
        ));
    }

    #[tokio::test]
    async fn test_apply_workspace_edit_not_groupable_is_silent() {
        let (dispatcher, documents, mut rx) = dispatcher();
        documents.open("file:///a.rs", "a.rs", "old\n");
        documents.activate("file:///a.rs").await.unwrap();

        let mut changes = HashMap::new();
        for uri in ["file:///a.rs", "file:///b.rs"] {
            changes.insert(
                uri.to_string(),
                vec![TextEdit {
                    range: Range::new(Position::new(0, 0), Position::new(0, 3)),
                    new_text: "new".to_string(),
                }],
            );
        }
        let edit = WorkspaceEdit {
            changes: Some(changes),
            document_changes: None,
        };

        dispatcher
            .dispatch(envelope(
                Version::CURRENT,
                EditorCommand::ApplyWorkspaceEdit { edit },
            ))
            .await
            .unwrap();

        // Nothing applied, no EditApplied event between accept and complete
        assert_eq!(documents.content("file:///a.rs").unwrap(), "old\n");
        let accepted = rx.recv().await.unwrap();
        assert!(matches!(
            accepted.event,
            EditorEvent::CommandAccepted { .. }
        ));
        let completed = rx.recv().await.unwrap();
        assert!(matches!(
            completed.event,
            EditorEvent::CommandCompleted { .. }
        ));
    }

    #[tokio::test]
    async fn test_change_document_without_server_updates_store() {
        let (dispatcher, documents, _rx) = dispatcher();
        documents.open("file:///a.rs", "a.rs", "old\n");

        dispatcher
            .dispatch(envelope(
                Version::CURRENT,
                EditorCommand::ChangeDocument {
                    path: "/a.rs".to_string(),
                    content: "new\n".to_string(),
                },
            ))
            .await
            .unwrap();

        assert_eq!(documents.content("file:///a.rs").unwrap(), "new\n");
        assert_eq!(documents.get("file:///a.rs").unwrap().version, 2);
    }

    #[test]
    fn test_path_to_uri() {
        assert_eq!(
            path_to_uri("/home/user/project/main.rs"),
            "file:///home/user/project/main.rs"
        );
        assert_eq!(path_to_uri("file:///already/uri"), "file:///already/uri");
        assert_eq!(path_to_uri("view://syntax-tree"), "view://syntax-tree");
    }
}
