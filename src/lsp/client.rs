//! Analysis-server JSON-RPC client
//!
//! Handles low-level JSON-RPC 2.0 communication with the external
//! language-analysis server via stdin/stdout pipes, including the
//! editor-specific extension requests.

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

use super::types::{
    ClientError, ExpandedMacro, ExtensionCapabilities, Range, Runnable, TextEdit, WorkspaceEdit,
};

/// JSON-RPC request ID type
pub type RequestId = i64;

/// Client for communicating with a language-analysis server
pub struct AnalysisClient {
    /// Server process
    process: Child,
    /// Stdin for sending requests
    stdin: Mutex<ChildStdin>,
    /// Buffered stdout for reading responses
    stdout: Mutex<BufReader<ChildStdout>>,
    /// Extension capabilities after initialization
    pub capabilities: ExtensionCapabilities,
    /// Next request ID
    next_id: AtomicI64,
    /// Root URI of the workspace
    root_uri: String,
    /// Language ID (e.g., "rust")
    language_id: String,
}

impl AnalysisClient {
    /// Create a new client by spawning the analysis server
    pub fn new(
        command: &str,
        args: &[&str],
        root_uri: &str,
        language_id: &str,
    ) -> Result<Self, ClientError> {
        let mut process = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ClientError::SpawnFailed(format!("{}: {}", command, e)))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| ClientError::SpawnFailed("Failed to open stdin".to_string()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| ClientError::SpawnFailed("Failed to open stdout".to_string()))?;

        info!(command, root_uri, "spawned analysis server");

        Ok(Self {
            process,
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            capabilities: ExtensionCapabilities::default(),
            next_id: AtomicI64::new(1),
            root_uri: root_uri.to_string(),
            language_id: language_id.to_string(),
        })
    }

    /// Initialize the server (must be called before any other requests)
    ///
    /// Advertises snippet-aware workspace edits so the server may embed
    /// placeholder markers in replacement text.
    pub fn initialize(&mut self) -> Result<(), ClientError> {
        let params = json!({
            "processId": std::process::id(),
            "rootUri": self.root_uri,
            "capabilities": {
                "textDocument": {
                    "synchronization": {
                        "didSave": true,
                        "didOpen": true,
                        "didClose": true
                    }
                },
                "workspace": {
                    "workspaceEdit": {
                        "documentChanges": true
                    },
                    "workspaceFolders": true
                },
                "experimental": {
                    "snippetTextEdit": true
                }
            },
            "workspaceFolders": [{
                "uri": self.root_uri,
                "name": "workspace"
            }]
        });

        let response = self.send_request_sync("initialize", params)?;
        self.capabilities = ExtensionCapabilities::from_initialize_result(&response);

        // Send initialized notification
        self.send_notification("initialized", json!({}))?;

        info!(capabilities = ?self.capabilities, "analysis server initialized");
        Ok(())
    }

    /// Send a request and wait for response (synchronous)
    pub fn send_request_sync(&mut self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });

        self.write_message(&request)?;
        self.read_response_sync(id)
    }

    /// Send a notification (no response expected)
    pub fn send_notification(&self, method: &str, params: Value) -> Result<(), ClientError> {
        let notification = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });

        self.write_message(&notification)
    }

    /// Open a text document
    pub fn did_open(&self, uri: &str, content: &str) -> Result<(), ClientError> {
        self.send_notification(
            "textDocument/didOpen",
            json!({
                "textDocument": {
                    "uri": uri,
                    "languageId": self.language_id,
                    "version": 1,
                    "text": content
                }
            }),
        )
    }

    /// Notify of document changes
    pub fn did_change(&self, uri: &str, version: i32, content: &str) -> Result<(), ClientError> {
        self.send_notification(
            "textDocument/didChange",
            json!({
                "textDocument": {
                    "uri": uri,
                    "version": version
                },
                "contentChanges": [{
                    "text": content
                }]
            }),
        )
    }

    /// Close a text document
    pub fn did_close(&self, uri: &str) -> Result<(), ClientError> {
        self.send_notification(
            "textDocument/didClose",
            json!({
                "textDocument": {
                    "uri": uri
                }
            }),
        )
    }

    /// Expand the macro call under the given position
    pub fn expand_macro(
        &mut self,
        uri: &str,
        line: u32,
        character: u32,
    ) -> Result<Option<ExpandedMacro>, ClientError> {
        if !self.capabilities.expand_macro {
            return Ok(None);
        }

        let params = json!({
            "textDocument": { "uri": uri },
            "position": { "line": line, "character": character }
        });

        let response = self.send_request_sync("experimental/expandMacro", params)?;

        if response.is_null() {
            return Ok(None);
        }

        serde_json::from_value(response).map_err(ClientError::from)
    }

    /// Fetch the syntax-tree dump for a document (optionally a sub-range)
    pub fn syntax_tree(&mut self, uri: &str, range: Option<Range>) -> Result<String, ClientError> {
        if !self.capabilities.syntax_tree {
            return Ok(String::new());
        }

        let params = json!({
            "textDocument": { "uri": uri },
            "range": range
        });

        let response = self.send_request_sync("experimental/syntaxTree", params)?;

        Ok(response.as_str().unwrap_or_default().to_string())
    }

    /// Run a structural search/replace query
    ///
    /// With `parse_only` the server validates the query and returns an empty
    /// edit.
    pub fn ssr(
        &mut self,
        query: &str,
        parse_only: bool,
        uri: &str,
        line: u32,
        character: u32,
    ) -> Result<WorkspaceEdit, ClientError> {
        if !self.capabilities.ssr {
            return Ok(WorkspaceEdit::default());
        }

        let params = json!({
            "query": query,
            "parseOnly": parse_only,
            "textDocument": { "uri": uri },
            "position": { "line": line, "character": character },
            "selections": []
        });

        let response = self.send_request_sync("experimental/ssr", params)?;

        if response.is_null() {
            return Ok(WorkspaceEdit::default());
        }

        serde_json::from_value(response).map_err(ClientError::from)
    }

    /// Discover runnables for a document
    pub fn runnables(
        &mut self,
        uri: &str,
        line: Option<u32>,
        character: Option<u32>,
    ) -> Result<Vec<Runnable>, ClientError> {
        if !self.capabilities.runnables {
            return Ok(vec![]);
        }

        let position = match (line, character) {
            (Some(line), Some(character)) => json!({ "line": line, "character": character }),
            _ => Value::Null,
        };
        let params = json!({
            "textDocument": { "uri": uri },
            "position": position
        });

        let response = self.send_request_sync("experimental/runnables", params)?;

        if response.is_null() {
            return Ok(vec![]);
        }

        serde_json::from_value(response).map_err(ClientError::from)
    }

    /// Join the lines covered by the given ranges
    ///
    /// Returned edits may carry placeholder markers in their replacement
    /// text.
    pub fn join_lines(&mut self, uri: &str, ranges: &[Range]) -> Result<Vec<TextEdit>, ClientError> {
        if !self.capabilities.join_lines {
            return Ok(vec![]);
        }

        let params = json!({
            "textDocument": { "uri": uri },
            "ranges": ranges
        });

        let response = self.send_request_sync("experimental/joinLines", params)?;

        if response.is_null() {
            return Ok(vec![]);
        }

        serde_json::from_value(response).map_err(ClientError::from)
    }

    /// Fetch the server's version string
    pub fn server_version(&mut self) -> Result<String, ClientError> {
        if !self.capabilities.server_version {
            return Ok(String::new());
        }

        let response = self.send_request_sync("experimental/serverVersion", json!(null))?;
        Ok(response.as_str().unwrap_or_default().to_string())
    }

    /// Shutdown the server gracefully
    pub fn shutdown(&mut self) -> Result<(), ClientError> {
        // Send shutdown request
        let _ = self.send_request_sync("shutdown", json!(null));

        // Send exit notification
        let _ = self.send_notification("exit", json!(null));

        // Wait for process to exit
        let _ = self.process.wait();

        Ok(())
    }

    /// Write a JSON-RPC message to the server
    fn write_message(&self, message: &Value) -> Result<(), ClientError> {
        let content = serde_json::to_string(message)?;
        let header = format!("Content-Length: {}\r\n\r\n", content.len());

        let mut stdin = self.stdin.lock().unwrap();
        stdin.write_all(header.as_bytes())?;
        stdin.write_all(content.as_bytes())?;
        stdin.flush()?;

        Ok(())
    }

    /// Read a response synchronously (blocking)
    ///
    /// Server-initiated notifications that arrive before the response are
    /// logged and skipped.
    fn read_response_sync(&mut self, expected_id: RequestId) -> Result<Value, ClientError> {
        let mut reader = self.stdout.lock().unwrap();

        loop {
            // Read headers
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line)? == 0 {
                    return Err(ClientError::ServerShutdown);
                }
                let line = line.trim();

                if line.is_empty() {
                    break;
                }

                if let Some(len_str) = line.strip_prefix("Content-Length: ") {
                    content_length = len_str
                        .parse()
                        .map_err(|_| ClientError::ParseError("Invalid Content-Length".to_string()))?;
                }
            }

            if content_length == 0 {
                return Err(ClientError::ParseError("Missing Content-Length".to_string()));
            }

            // Read content
            let mut content = vec![0u8; content_length];
            std::io::Read::read_exact(&mut *reader, &mut content)?;

            let message: Value = serde_json::from_slice(&content)?;

            // Check if this is a response to our request
            if let Some(id) = message.get("id").and_then(|v| v.as_i64()) {
                if id == expected_id {
                    if let Some(error) = message.get("error") {
                        let code = error.get("code").and_then(|v| v.as_i64()).unwrap_or(-1) as i32;
                        let msg = error
                            .get("message")
                            .and_then(|v| v.as_str())
                            .unwrap_or("Unknown error")
                            .to_string();
                        return Err(ClientError::RpcError { code, message: msg });
                    }

                    return Ok(message.get("result").cloned().unwrap_or(Value::Null));
                }
            }

            if message.get("id").is_none() {
                if let Some(method) = message.get("method").and_then(|v| v.as_str()) {
                    debug!(method, "skipping server notification");
                }
            }
        }
    }
}

impl Drop for AnalysisClient {
    fn drop(&mut self) {
        // Try to shutdown gracefully
        let _ = self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_format() {
        let message = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {}
        });

        let content = serde_json::to_string(&message).unwrap();
        let header = format!("Content-Length: {}\r\n\r\n", content.len());

        assert!(header.starts_with("Content-Length: "));
        assert!(header.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_ssr_params_shape() {
        let params = json!({
            "query": "foo($a) ==>> bar($a)",
            "parseOnly": true,
            "textDocument": { "uri": "file:///src/lib.rs" },
            "position": { "line": 0, "character": 0 },
            "selections": []
        });

        assert_eq!(params["parseOnly"], true);
        assert_eq!(params["textDocument"]["uri"], "file:///src/lib.rs");
    }
}
