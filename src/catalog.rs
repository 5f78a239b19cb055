//! Discovery of exportable files in the data directory.
//!
//! Only regular `.json` files are eligible. Symbolic links are never
//! reported so the export cannot reach outside the data directory.

use crate::config::ServiceConfig;
use crate::error::{ExportError, Result};
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

const EXPORT_EXTENSION: &str = "json";

/// A file found during a scan, with its size at scan time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedFile {
    pub path: PathBuf,
    pub size: u64,
}

impl CollectedFile {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileCatalog {
    root: PathBuf,
    allowed_subdirs: HashSet<String>,
    max_payload_size: u64,
    max_data_dir_size: u64,
}

impl FileCatalog {
    pub fn new(
        root: impl Into<PathBuf>,
        allowed_subdirs: impl IntoIterator<Item = String>,
        max_payload_size: u64,
        max_data_dir_size: u64,
    ) -> Self {
        Self {
            root: root.into(),
            allowed_subdirs: allowed_subdirs.into_iter().collect(),
            max_payload_size,
            max_data_dir_size,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            config.data_dir.clone(),
            config.allowed_subdirs.iter().cloned(),
            config.max_payload_size,
            config.max_data_dir_size,
        )
    }

    /// Scan the data directory.
    ///
    /// A missing root yields an empty list. Files bigger than the payload
    /// limit can never be sent, so they are removed from disk here.
    pub fn collect(&self) -> Result<Vec<CollectedFile>> {
        if !self.root.exists() {
            tracing::warn!("Data directory {} does not exist", self.root.display());
            return Ok(Vec::new());
        }

        let candidates = self.scan_candidates();
        let candidates = self.filter_allowed(candidates);
        tracing::debug!(
            "Collected {} files from {}",
            candidates.len(),
            self.root.display()
        );

        let mut collected = Vec::with_capacity(candidates.len());
        for path in candidates {
            let size = fs::symlink_metadata(&path)
                .map_err(|e| ExportError::io(&path, e))?
                .len();

            if size > self.max_payload_size {
                tracing::warn!(
                    "File '{}' (size: {} bytes) is too big for export and was removed. Maximum allowed size: {} bytes",
                    path.display(),
                    size,
                    self.max_payload_size
                );
                match fs::remove_file(&path) {
                    Ok(()) => tracing::info!("Removed oversized file: {}", path.display()),
                    Err(e) => tracing::error!(
                        "Failed to remove oversized file '{}': {}",
                        path.display(),
                        e
                    ),
                }
                continue;
            }

            collected.push(CollectedFile { path, size });
        }

        Ok(collected)
    }

    /// Every non-symlink `.json` file below the root, in walk order.
    fn scan_candidates(&self) -> Vec<PathBuf> {
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry in {}: {}", self.root.display(), e);
                    continue;
                }
            };

            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXPORT_EXTENSION) {
                continue;
            }
            if entry.path_is_symlink() {
                tracing::warn!("Skipping symlink '{}' for security reasons", path.display());
                continue;
            }
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            files.push(entry.into_path());
        }
        files
    }

    /// Keep files whose first directory below the root is allow-listed.
    /// Files directly in the root have no such directory and are dropped.
    fn filter_allowed(&self, files: Vec<PathBuf>) -> Vec<PathBuf> {
        if self.allowed_subdirs.is_empty() {
            return files;
        }

        let total = files.len();
        let kept: Vec<PathBuf> = files
            .into_iter()
            .filter(|path| self.is_allowed(path))
            .collect();

        let unknown = total - kept.len();
        if unknown > 0 {
            tracing::warn!("Found {} unknown files", unknown);
        }
        kept
    }

    fn is_allowed(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        let mut components = relative.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(first)), Some(_)) => first
                .to_str()
                .is_some_and(|name| self.allowed_subdirs.contains(name)),
            _ => false,
        }
    }

    /// Keep the data directory under its size limit.
    ///
    /// When the listed files together exceed the limit, they are removed in
    /// the given order until the remaining size is below the limit. Returns
    /// the number of files removed.
    pub fn ensure_size_limit(&self, files: &[CollectedFile]) -> usize {
        let total: u64 = files.iter().map(|f| f.size).sum();
        if total <= self.max_data_dir_size {
            return 0;
        }

        tracing::error!(
            "Data folder size is bigger than the maximum allowed size: {} > {}",
            total,
            self.max_data_dir_size
        );
        tracing::info!("Removing files to fit the data into the limit...");

        let mut remaining = total;
        let mut removed = 0;
        for file in files {
            delete_files(&[&file.path]);
            remaining -= file.size;
            removed += 1;
            if remaining < self.max_data_dir_size {
                break;
            }
        }
        removed
    }
}

/// Best-effort removal; failures are logged, never returned.
pub fn delete_files<P: AsRef<Path>>(paths: &[P]) {
    for path in paths {
        let path = path.as_ref();
        tracing::debug!("Removing '{}'", path.display());
        match fs::remove_file(path) {
            Ok(()) => {
                if fs::symlink_metadata(path).is_ok() {
                    tracing::error!("Failed to remove '{}'", path.display());
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("File '{}' already deleted or does not exist", path.display());
            }
            Err(e) => tracing::error!("Failed to remove '{}': {}", path.display(), e),
        }
    }
}
