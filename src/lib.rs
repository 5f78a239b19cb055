//! Periodic exporter for locally collected JSON artifacts.
//!
//! Scans a data directory for feedback and transcript records, packs them
//! into size-bounded gzip tarballs and uploads each one to an ingress
//! service.
//!
//! ```text
//! CollectorLoop -> FileCatalog::collect -> chunker::group
//!              -> { archive::build -> Uploader::send -> delete chunk } per chunk
//!              -> FileCatalog::ensure_size_limit
//! ```

pub mod archive;
pub mod auth;
pub mod catalog;
pub mod chunker;
pub mod collector;
pub mod config;
pub mod error;
pub mod ingress;
pub mod shutdown;

pub use archive::Archive;
pub use auth::{CredentialProvider, Credentials};
pub use catalog::{CollectedFile, FileCatalog};
pub use collector::{CollectorLoop, CycleReport, StopReason};
pub use config::ServiceConfig;
pub use error::{ExportError, Result};
pub use ingress::{IngressClient, Uploader};
pub use shutdown::{ShutdownKind, ShutdownSignal};
