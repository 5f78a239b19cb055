//! Error types for the exporter.
//!
//! Transient conditions (filesystem, network, ingress rejections) are retried
//! by the continuous collector; everything else ends the run.

use crate::auth::AuthError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExportError>;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to walk data directory: {0}")]
    Walk(#[from] ignore::Error),

    #[error("Data upload failed with response code: {status} and text: {body}")]
    Upload { status: u16, body: String },

    #[error("Unexpected ingress response ({status}): {reason}, body: {body}")]
    InvalidResponse {
        status: u16,
        body: String,
        reason: String,
    },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to build archive: {0}")]
    Archive(#[source] io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ExportError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ExportError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the continuous collector should retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExportError::Io { .. }
                | ExportError::Walk(_)
                | ExportError::Upload { .. }
                | ExportError::InvalidResponse { .. }
                | ExportError::Http(_)
                | ExportError::Archive(_)
        )
    }

    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ExportError::Upload { status, .. } | ExportError::InvalidResponse { status, .. } => {
                Some(*status)
            }
            ExportError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
