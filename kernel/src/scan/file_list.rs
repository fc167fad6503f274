//! The lazy, memoizing list of files visible in a snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use itertools::Itertools;
use tracing::{debug, info};
use url::Url;

use crate::engine::ScanFileIterator;
use crate::expressions::PredicateRef;
use crate::metrics::{MetricEvent, MetricId, MetricsReporter};
use crate::path::{resolve_data_file_path, table_root_from_path};
use crate::scan::file_store::{FileEntry, FileEntryStore, FileMetadata};
use crate::scan::state::ScanFile;
use crate::schema::SchemaRef;
use crate::snapshot::{Snapshot, SnapshotRef};
use crate::utils::CaseInsensitiveMap;
use crate::{DeltaResult, Engine, Error, Version};

/// Row count of a scan. Row counts in the log are exact, so both values are always equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cardinality {
    pub estimated: u64,
    pub exact: u64,
}

enum DiscoveryCursor {
    NotStarted,
    Active(ScanFileIterator),
    Exhausted,
    /// A pull failed. The engine iterator is gone, so no more files can be discovered.
    Failed { path: String, message: String },
}

struct FileListState {
    snapshot: Option<SnapshotRef>,
    schema: Option<SchemaRef>,
    cursor: DiscoveryCursor,
    store: FileEntryStore,
}

/// Builder for [`SnapshotFileList`].
pub struct FileListBuilder {
    engine: Arc<dyn Engine>,
    table_root: Url,
    version: Option<Version>,
    snapshot: Option<SnapshotRef>,
    predicate: Option<PredicateRef>,
    reporter: Option<Arc<dyn MetricsReporter>>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl FileListBuilder {
    /// Pin the table version. The latest version is used when this is not set.
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_predicate(mut self, predicate: PredicateRef) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_metrics_reporter(mut self, reporter: Arc<dyn MetricsReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Flag checked before every discovery pull. Setting it makes the next pull fail with
    /// [`Error::Interrupted`].
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    pub fn build(self) -> SnapshotFileList {
        SnapshotFileList {
            engine: self.engine,
            table_root: self.table_root,
            version: self.version,
            predicate: self.predicate,
            reporter: self.reporter,
            interrupt: self.interrupt,
            operation_id: MetricId::new(),
            state: Mutex::new(FileListState {
                snapshot: self.snapshot,
                schema: None,
                cursor: DiscoveryCursor::NotStarted,
                store: FileEntryStore::new(),
            }),
        }
    }
}

/// The files of one table snapshot as a lazily expanded, index-addressable sequence.
///
/// Files are pulled from the engine only when an ordinal past the materialized prefix is asked
/// for, and each file is materialized exactly once. All state sits behind a single lock, so at
/// most one discovery pull is in flight per list and readers of already-known ordinals only pay
/// for acquiring the lock.
pub struct SnapshotFileList {
    engine: Arc<dyn Engine>,
    table_root: Url,
    version: Option<Version>,
    predicate: Option<PredicateRef>,
    reporter: Option<Arc<dyn MetricsReporter>>,
    interrupt: Option<Arc<AtomicBool>>,
    operation_id: MetricId,
    state: Mutex<FileListState>,
}

impl std::fmt::Debug for SnapshotFileList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotFileList")
            .field("table_root", &self.table_root.as_str())
            .field("version", &self.version)
            .field("predicate", &self.predicate)
            .field("operation_id", &self.operation_id)
            .finish()
    }
}

impl SnapshotFileList {
    /// Start building a list for the table at `path`, which may be a URL or a local path.
    pub fn builder(engine: Arc<dyn Engine>, path: &str) -> DeltaResult<FileListBuilder> {
        Ok(FileListBuilder {
            engine,
            table_root: table_root_from_path(path)?,
            version: None,
            snapshot: None,
            predicate: None,
            reporter: None,
            interrupt: None,
        })
    }

    /// Start building a list over an already opened snapshot.
    pub fn builder_for_snapshot(snapshot: SnapshotRef) -> FileListBuilder {
        FileListBuilder {
            engine: snapshot.engine(),
            table_root: snapshot.table_root().clone(),
            version: Some(snapshot.version()),
            snapshot: Some(snapshot),
            predicate: None,
            reporter: None,
            interrupt: None,
        }
    }

    pub fn try_new(engine: Arc<dyn Engine>, path: &str) -> DeltaResult<Self> {
        Ok(Self::builder(engine, path)?.build())
    }

    fn lock(&self) -> DeltaResult<MutexGuard<'_, FileListState>> {
        self.state
            .lock()
            .map_err(|_| Error::generic("poisoned snapshot file list mutex"))
    }

    pub fn table_root(&self) -> &Url {
        &self.table_root
    }

    pub fn predicate(&self) -> Option<PredicateRef> {
        self.predicate.clone()
    }

    pub fn operation_id(&self) -> MetricId {
        self.operation_id
    }

    pub(crate) fn reporter(&self) -> Option<&Arc<dyn MetricsReporter>> {
        self.reporter.as_ref()
    }

    fn report(&self, event: impl FnOnce() -> MetricEvent) {
        if let Some(reporter) = &self.reporter {
            reporter.report(event());
        }
    }

    /// The snapshot, if it has been opened.
    pub fn snapshot(&self) -> DeltaResult<Option<SnapshotRef>> {
        Ok(self.lock()?.snapshot.clone())
    }

    fn ensure_snapshot(&self, state: &mut FileListState) -> DeltaResult<SnapshotRef> {
        if let Some(snapshot) = &state.snapshot {
            return Ok(snapshot.clone());
        }
        let start = Instant::now();
        let result = Snapshot::builder_for(self.table_root.clone())
            .at_version_opt(self.version)
            .build(self.engine.clone());
        match result {
            Ok(snapshot) => {
                self.report(|| MetricEvent::SnapshotOpened {
                    operation_id: self.operation_id,
                    version: snapshot.version(),
                    duration: start.elapsed(),
                });
                state.snapshot = Some(snapshot.clone());
                Ok(snapshot)
            }
            Err(err) => {
                self.report(|| MetricEvent::SnapshotFailed {
                    operation_id: self.operation_id,
                    duration: start.elapsed(),
                });
                Err(err)
            }
        }
    }

    /// Open the snapshot if needed and return the table schema. Later calls return the cached
    /// schema.
    pub fn bind(&self) -> DeltaResult<SchemaRef> {
        let mut state = self.lock()?;
        self.bind_locked(&mut state)
    }

    fn bind_locked(&self, state: &mut FileListState) -> DeltaResult<SchemaRef> {
        if let Some(schema) = &state.schema {
            return Ok(schema.clone());
        }
        let schema = self.ensure_snapshot(state)?.schema();
        state.schema = Some(schema.clone());
        Ok(schema)
    }

    /// Path of the file at ordinal `index`, or `None` once `index` is past the end of the table.
    pub fn get_file(&self, index: usize) -> DeltaResult<Option<String>> {
        let mut state = self.lock()?;
        self.expand_to(&mut state, index)?;
        Ok(state.store.get(index).map(|entry| entry.path.clone()))
    }

    /// Pull until `index` is materialized or the engine runs out of files.
    fn expand_to(&self, state: &mut FileListState, index: usize) -> DeltaResult<()> {
        while index >= state.store.len() {
            if !self.pull_next(state)? {
                break;
            }
        }
        Ok(())
    }

    /// Perform one discovery pull. Returns `false` once the file set is known to be complete.
    fn pull_next(&self, state: &mut FileListState) -> DeltaResult<bool> {
        let snapshot = match &state.cursor {
            DiscoveryCursor::Exhausted => return Ok(false),
            DiscoveryCursor::Failed { path, message } => {
                return Err(Error::discovery(
                    path,
                    Error::generic(format!("file discovery failed earlier: {message}")),
                ))
            }
            DiscoveryCursor::NotStarted | DiscoveryCursor::Active(_) => {
                self.ensure_snapshot(state)?
            }
        };
        if self
            .interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
        {
            return Err(Error::Interrupted);
        }
        if matches!(state.cursor, DiscoveryCursor::NotStarted) {
            debug!(
                "Starting file discovery for {} with predicate {:?}",
                self.table_root, self.predicate
            );
            let iter = snapshot
                .scan_files(self.predicate.clone())
                .map_err(|err| Error::discovery(&self.table_root, err))?;
            state.cursor = DiscoveryCursor::Active(iter);
        }

        let start = Instant::now();
        let DiscoveryCursor::Active(iter) = &mut state.cursor else {
            return Err(Error::internal_error("file discovery cursor is not active"));
        };
        let pulled = iter.next();
        match pulled {
            None => {
                state.cursor = DiscoveryCursor::Exhausted;
                let total_files = state.store.len();
                debug!(
                    "File discovery for {} exhausted after {total_files} files",
                    self.table_root
                );
                self.report(|| MetricEvent::FileListExhausted {
                    operation_id: self.operation_id,
                    total_files: total_files as u64,
                });
                Ok(false)
            }
            Some(batch) => {
                let appended = batch
                    .map_err(|err| Error::discovery(&self.table_root, err))
                    .and_then(|batch| self.materialize_batch(state, &snapshot, batch))
                    .and_then(|entries| {
                        let num_files = entries.len();
                        state.store.append_batch(entries).map(|_| num_files)
                    });
                let num_files = match appended {
                    Ok(num_files) => num_files,
                    Err(err) => {
                        state.cursor = DiscoveryCursor::Failed {
                            path: discovery_path(&err)
                                .unwrap_or_else(|| self.table_root.to_string()),
                            message: err.to_string(),
                        };
                        return Err(err);
                    }
                };
                let total_files = state.store.len();
                debug!(
                    "Discovered {num_files} files ({total_files} total) in {}",
                    self.table_root
                );
                self.report(|| MetricEvent::FilesDiscovered {
                    operation_id: self.operation_id,
                    num_files: num_files as u64,
                    total_files: total_files as u64,
                    duration: start.elapsed(),
                });
                Ok(true)
            }
        }
    }

    /// Turn one engine batch into file entries, numbering them after the current prefix.
    fn materialize_batch(
        &self,
        state: &mut FileListState,
        snapshot: &SnapshotRef,
        batch: Vec<ScanFile>,
    ) -> DeltaResult<Vec<FileEntry>> {
        let schema = self.bind_locked(state)?;
        let first_ordinal = state.store.len();
        let storage = snapshot.storage_handler();
        batch
            .into_iter()
            .enumerate()
            .map(|(offset, file)| {
                let path = resolve_data_file_path(snapshot.table_root(), &file.path)
                    .map_err(|err| Error::discovery(&file.path, err))?;
                let selection_vector = file
                    .dv_info
                    .deletion_vector
                    .as_ref()
                    .map(|dv| dv.keep_mask(storage.clone(), snapshot.table_root()))
                    .transpose()
                    .map_err(|err| Error::discovery(&path, err))?;
                let partition_map: CaseInsensitiveMap<Option<String>> = file
                    .partition_values
                    .into_iter()
                    .filter_map(|(name, value)| {
                        let field = schema.field(&name)?;
                        Some((field.name().clone(), value))
                    })
                    .collect();
                let metadata = FileMetadata {
                    file_number: first_ordinal + offset,
                    snapshot_version: snapshot.version(),
                    cardinality: file.stats.map(|stats| stats.num_records),
                    selection_vector,
                    partition_map,
                };
                Ok(FileEntry {
                    path,
                    metadata: Arc::new(metadata),
                })
            })
            .try_collect()
    }

    fn expand_all(&self, state: &mut FileListState) -> DeltaResult<()> {
        while self.pull_next(state)? {}
        Ok(())
    }

    /// Materialize every file. This replays the whole log.
    pub fn get_total_file_count(&self) -> DeltaResult<usize> {
        let mut state = self.lock()?;
        self.expand_all(&mut state)?;
        Ok(state.store.len())
    }

    /// Paths of every file, in discovery order.
    pub fn get_all_files(&self) -> DeltaResult<Vec<String>> {
        let mut state = self.lock()?;
        self.expand_all(&mut state)?;
        Ok(state.store.iter().map(|entry| entry.path.clone()).collect())
    }

    /// Total row count, from per-file statistics. `None` if no file carries a row count.
    pub fn get_cardinality(&self) -> DeltaResult<Option<Cardinality>> {
        let mut state = self.lock()?;
        self.expand_all(&mut state)?;
        if state.store.is_empty() {
            return Ok(Some(Cardinality {
                estimated: 0,
                exact: 0,
            }));
        }
        let counts = state
            .store
            .iter()
            .filter_map(|entry| entry.metadata.cardinality)
            .collect_vec();
        if counts.is_empty() {
            return Ok(None);
        }
        let total = counts.into_iter().sum();
        info!("Cardinality of {} is {total} rows", self.table_root);
        Ok(Some(Cardinality {
            estimated: total,
            exact: total,
        }))
    }

    /// Version of the snapshot, once it has been opened by [`Self::bind`] or a file lookup.
    pub fn get_version(&self) -> DeltaResult<Option<Version>> {
        Ok(self.lock()?.snapshot.as_ref().map(|s| s.version()))
    }

    /// Metadata of a file that has already been materialized by [`Self::get_file`].
    pub fn get_metadata(&self, index: usize) -> DeltaResult<Arc<FileMetadata>> {
        let state = self.lock()?;
        state
            .store
            .get(index)
            .map(|entry| entry.metadata.clone())
            .ok_or_else(|| {
                Error::internal_error(format!(
                    "Metadata requested for file {index} but only {} files are materialized",
                    state.store.len()
                ))
            })
    }

    /// Number of files materialized so far.
    pub fn materialized_count(&self) -> DeltaResult<usize> {
        Ok(self.lock()?.store.len())
    }

    /// Whether the engine has reported that no more files exist.
    pub fn is_exhausted(&self) -> DeltaResult<bool> {
        Ok(matches!(self.lock()?.cursor, DiscoveryCursor::Exhausted))
    }

    /// Open the snapshot if necessary and return it, for sharing with a fork.
    pub(crate) fn shared_snapshot(&self) -> DeltaResult<SnapshotRef> {
        let mut state = self.lock()?;
        self.ensure_snapshot(&mut state)
    }

    /// A new list over the same snapshot with its own discovery cursor.
    pub(crate) fn fork(&self, predicate: PredicateRef) -> DeltaResult<Self> {
        let snapshot = self.shared_snapshot()?;
        let mut builder = Self::builder_for_snapshot(snapshot).with_predicate(predicate);
        builder.reporter = self.reporter.clone();
        builder.interrupt = self.interrupt.clone();
        Ok(builder.build())
    }
}

fn discovery_path(err: &Error) -> Option<String> {
    match err {
        Error::Discovery { path, .. } => Some(path.clone()),
        Error::Backtraced { source, .. } => discovery_path(source),
        _ => None,
    }
}
