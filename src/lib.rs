//! Plancanvas - graph-document persistence and versioning for planning canvases.
//!
//! This library provides the core functionality for the `pc` CLI tool:
//! the in-memory block graph, debounced autosave against a remote store,
//! a local ring of backup versions, server-side save slots, an audit trail
//! of semantic edits, and the owner/editor/viewer permission gate.

pub mod audit;
pub mod autosave;
pub mod backup;
pub mod cli;
pub mod commands;
pub mod config;
pub mod exchange;
pub mod models;
pub mod permissions;
pub mod session;
pub mod slots;
pub mod storage;


/// Library-level error type for Plancanvas operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Not authenticated: a user session is required")]
    Auth,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the editing session can keep going after this error.
    ///
    /// Only a missing session is fatal; everything else leaves the
    /// in-memory document authoritative and editable.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Auth)
    }
}

/// Result type alias for Plancanvas operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_is_not_recoverable() {
        assert!(!Error::Auth.is_recoverable());
        assert!(Error::Persistence("offline".to_string()).is_recoverable());
        assert!(Error::Permission("view".to_string()).is_recoverable());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::NotFound("canvas c-1".to_string());
        assert_eq!(err.to_string(), "Not found: canvas c-1");

        let err = Error::Validation("edges must be an array".to_string());
        assert_eq!(err.to_string(), "Invalid input: edges must be an array");
    }
}
