//! Gzip-compressed tar archives of one chunk.

use crate::error::{ExportError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// An archive held in memory until it is uploaded.
///
/// Uploading consumes the value, so the buffer is freed once the attempt
/// finishes whatever its outcome.
#[derive(Debug)]
pub struct Archive {
    data: Vec<u8>,
    entries: usize,
}

impl Archive {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of files packed into the archive.
    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Pack `paths` into a `.tar.gz`, naming each entry relative to `strip_prefix`.
///
/// Symbolic links are skipped even though the catalog already excludes them.
pub fn build<P: AsRef<Path>>(paths: &[P], strip_prefix: &Path) -> Result<Archive> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let mut entries = 0;

    for path in paths {
        let path = path.as_ref();
        let meta = fs::symlink_metadata(path).map_err(|e| ExportError::io(path, e))?;
        if meta.file_type().is_symlink() {
            tracing::warn!("Skipping symlink '{}' for security reasons", path.display());
            continue;
        }

        let name = entry_name(path, strip_prefix);
        builder
            .append_path_with_name(path, &name)
            .map_err(|e| ExportError::io(path, e))?;
        entries += 1;
    }

    let encoder = builder.into_inner().map_err(ExportError::Archive)?;
    let data = encoder.finish().map_err(ExportError::Archive)?;
    Ok(Archive { data, entries })
}

/// Archive-relative name: the path below `strip_prefix`, or its normal
/// components when it lies elsewhere.
fn entry_name(path: &Path, strip_prefix: &Path) -> PathBuf {
    match path.strip_prefix(strip_prefix) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
        _ => path
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect(),
    }
}
