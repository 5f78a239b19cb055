//! Grouping of collected files into upload-sized chunks.

use crate::catalog::CollectedFile;
use std::path::PathBuf;

pub type Chunk = Vec<PathBuf>;

/// Greedy, order-preserving packing.
///
/// Files are appended to the current chunk while the running size stays
/// within `max_chunk_size`. A file that is bigger than the limit on its own
/// still gets a chunk of its own rather than being dropped.
pub fn group(files: &[CollectedFile], max_chunk_size: u64) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current: Chunk = Vec::new();
    let mut current_size = 0u64;

    for file in files {
        if !current.is_empty() && current_size.saturating_add(file.size) > max_chunk_size {
            chunks.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current.push(file.path.clone());
        current_size = current_size.saturating_add(file.size);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
