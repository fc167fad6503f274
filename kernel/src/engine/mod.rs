//! The log-replay capability the scan kernel is built on.
//!
//! The kernel never reads the Delta log itself. An [`Engine`] opens a [`TableSnapshot`] for a
//! table root and version; the snapshot exposes the table schema and hands out the live files
//! through a pull-based [`ScanFileIterator`]. Each call to `next()` on that iterator is one
//! discovery pull and may yield any number of files, including none.

use std::fmt::Debug;
use std::ops::Range;
use std::sync::Arc;

use bytes::Bytes;
use url::Url;

use crate::expressions::PredicateRef;
use crate::scan::state::ScanFile;
use crate::schema::SchemaRef;
use crate::{DeltaResult, Version};

pub mod local;
pub mod memory;

/// A url and an optional byte range within it
pub type FileSlice = (Url, Option<Range<u64>>);

/// Batches of live files, in log-replay order. `None` signals that every file has been produced.
pub type ScanFileIterator = Box<dyn Iterator<Item = DeltaResult<Vec<ScanFile>>> + Send>;

/// Provides raw byte access to files referenced by the log, such as deletion vectors.
pub trait StorageHandler: Send + Sync {
    /// Read the given slices, yielding their contents in the same order.
    fn read_files(
        &self,
        files: Vec<FileSlice>,
    ) -> DeltaResult<Box<dyn Iterator<Item = DeltaResult<Bytes>>>>;
}

/// An opened, immutable view of a table at one version.
pub trait TableSnapshot: Send + Sync + Debug {
    /// Directory URL of the table, always ending in `/`
    fn table_root(&self) -> &Url;

    fn version(&self) -> Version;

    /// The logical schema of the table, including partition columns.
    fn schema(&self) -> SchemaRef;

    fn partition_columns(&self) -> &[String];

    /// Start a fresh enumeration of the live files. The engine may use `predicate` to skip files
    /// that cannot match, but is not required to filter exactly.
    fn scan_files(&self, predicate: Option<PredicateRef>) -> DeltaResult<ScanFileIterator>;
}

/// Entry point of the log-replay engine.
pub trait Engine: Send + Sync {
    /// Replay the log of the table at `table_root` up to `version` (latest when `None`).
    fn open_snapshot(
        &self,
        table_root: &Url,
        version: Option<Version>,
    ) -> DeltaResult<Arc<dyn TableSnapshot>>;

    /// Get the connector provided [`StorageHandler`].
    fn storage_handler(&self) -> Arc<dyn StorageHandler>;
}
