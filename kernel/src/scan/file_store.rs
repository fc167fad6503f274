//! Append-only storage for discovered files.

use std::sync::Arc;

use crate::utils::{require, CaseInsensitiveMap};
use crate::{DeltaResult, Error, Version};

/// Everything the scan needs to know about one file beyond its path.
#[derive(Debug, Clone, PartialEq)]
pub struct FileMetadata {
    /// Ordinal of the file in discovery order
    pub file_number: usize,
    /// Version of the snapshot the file was discovered in
    pub snapshot_version: Version,
    /// Row count from the file's statistics, when the log carries them
    pub cardinality: Option<u64>,
    /// Keep-mask decoded from the file's deletion vector: `false` marks a deleted row ordinal.
    /// Ordinals past the end of the mask are kept.
    pub selection_vector: Option<Vec<bool>>,
    /// Partition values of the bound partition columns. `None` is a null partition value.
    pub partition_map: CaseInsensitiveMap<Option<String>>,
}

impl FileMetadata {
    /// Whether the file has rows removed by a deletion vector.
    pub fn has_deletions(&self) -> bool {
        self.selection_vector
            .as_ref()
            .is_some_and(|mask| mask.iter().any(|keep| !keep))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    /// Resolved, decoded path of the data file
    pub path: String,
    pub metadata: Arc<FileMetadata>,
}

/// Files in discovery order. Entry `i` always has `file_number == i`.
#[derive(Debug, Default)]
pub struct FileEntryStore {
    entries: Vec<FileEntry>,
}

impl FileEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FileEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &FileEntry> {
        self.entries.iter()
    }

    /// Append a whole discovery batch. The batch must continue the ordinal sequence exactly;
    /// otherwise nothing is appended.
    pub(crate) fn append_batch(&mut self, batch: Vec<FileEntry>) -> DeltaResult<()> {
        let start = self.entries.len();
        for (offset, entry) in batch.iter().enumerate() {
            require!(
                entry.metadata.file_number == start + offset,
                Error::internal_error(format!(
                    "File {} was assigned ordinal {} but the next free ordinal is {}",
                    entry.path,
                    entry.metadata.file_number,
                    start + offset
                ))
            );
        }
        self.entries.extend(batch);
        Ok(())
    }
}
