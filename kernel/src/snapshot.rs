//! In-memory representation of snapshots of tables (snapshot is a table at given point in time, it
//! has schema etc.)

use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::engine::{ScanFileIterator, TableSnapshot};
use crate::expressions::PredicateRef;
use crate::schema::SchemaRef;
use crate::{DeltaResult, Engine, StorageHandler, Version};

mod builder;
pub use builder::SnapshotBuilder;

pub type SnapshotRef = Arc<Snapshot>;

/// A view of a Delta table at one version, as replayed by an [`Engine`].
///
/// A snapshot never changes version once opened. File lists share it through [`SnapshotRef`], so
/// forking a list under a new predicate does not replay the log again.
pub struct Snapshot {
    inner: Arc<dyn TableSnapshot>,
    engine: Arc<dyn Engine>,
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        debug!("Dropping snapshot");
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("path", &self.table_root().as_str())
            .field("version", &self.version())
            .finish()
    }
}

impl Snapshot {
    /// Create a new [`SnapshotBuilder`] to build a [`Snapshot`] for a given table root.
    pub fn builder_for(table_root: Url) -> SnapshotBuilder {
        SnapshotBuilder::new_for(table_root)
    }

    pub(crate) fn new(inner: Arc<dyn TableSnapshot>, engine: Arc<dyn Engine>) -> Self {
        Self { inner, engine }
    }

    /// Directory URL of the table, ending in `/`.
    pub fn table_root(&self) -> &Url {
        self.inner.table_root()
    }

    /// Version of this `Snapshot` in the table.
    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// Table [`crate::schema::StructType`] at this `Snapshot`'s version.
    pub fn schema(&self) -> SchemaRef {
        self.inner.schema()
    }

    pub fn partition_columns(&self) -> &[String] {
        self.inner.partition_columns()
    }

    pub(crate) fn engine(&self) -> Arc<dyn Engine> {
        self.engine.clone()
    }

    pub fn storage_handler(&self) -> Arc<dyn StorageHandler> {
        self.engine.storage_handler()
    }

    /// Start a new enumeration of this snapshot's files.
    pub(crate) fn scan_files(
        &self,
        predicate: Option<PredicateRef>,
    ) -> DeltaResult<ScanFileIterator> {
        self.inner.scan_files(predicate)
    }
}
