//! Builder for creating [`Snapshot`] instances.
use std::sync::Arc;

use tracing::info;
use url::Url;

use crate::snapshot::SnapshotRef;
use crate::{DeltaResult, Engine, Snapshot, Version};

/// Builder for creating [`Snapshot`] instances.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use delta_scan_kernel::{Snapshot, Engine};
/// # use url::Url;
/// # fn example(engine: Arc<dyn Engine>) -> delta_scan_kernel::DeltaResult<()> {
/// let table_root = Url::parse("file:///path/to/table/").unwrap();
///
/// let snapshot = Snapshot::builder_for(table_root)
///     .at_version(5) // Optional: pin a version (default is latest version)
///     .build(engine)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SnapshotBuilder {
    table_root: Url,
    version: Option<Version>,
}

impl SnapshotBuilder {
    pub(crate) fn new_for(table_root: Url) -> Self {
        Self {
            table_root,
            version: None,
        }
    }

    /// Set the target version of the [`Snapshot`]. When omitted, the Snapshot is created at the
    /// latest version of the table.
    pub fn at_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Optionally set the target version.
    pub fn at_version_opt(mut self, version: Option<Version>) -> Self {
        self.version = version;
        self
    }

    /// Replay the log through `engine` and return the opened snapshot.
    pub fn build(self, engine: Arc<dyn Engine>) -> DeltaResult<SnapshotRef> {
        let inner = engine.open_snapshot(&self.table_root, self.version)?;
        info!(
            "Opened snapshot of {} at version {}",
            inner.table_root(),
            inner.version()
        );
        Ok(Arc::new(Snapshot::new(inner, engine)))
    }
}
