//! Analysis-server integration for Glint
//!
//! This module provides the native Rust client for communicating with the
//! external language-analysis server. All protocol traffic happens in-process
//! via direct stdin/stdout IPC; the command layer builds on the typed request
//! methods exposed here.

mod client;
pub mod types;

pub use client::AnalysisClient;
pub use types::{
    ClientError, DocumentChange, ExpandedMacro, ExtensionCapabilities, Position, Range, Runnable,
    TextDocumentEdit, TextDocumentIdentifier, TextEdit, WorkspaceEdit,
};
