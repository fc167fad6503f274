//! An in-memory log-replay engine.
//!
//! Tables are registered up front with the live files of each version. Enumeration hands files
//! out in fixed-size pulls and prunes files whose partition values cannot satisfy the scan
//! predicate, so a pull may well come back empty. The engine counts snapshot opens and discovery
//! pulls, which makes it useful for checking how much work a scan actually triggered.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;
use url::Url;

use crate::engine::local::LocalStorageHandler;
use crate::engine::{Engine, ScanFileIterator, StorageHandler, TableSnapshot};
use crate::expressions::scalars::parse_partition_value;
use crate::expressions::{PredicateRef, Scalar};
use crate::kernel_predicates::can_skip;
use crate::scan::state::ScanFile;
use crate::schema::SchemaRef;
use crate::utils::{require, CaseInsensitiveMap};
use crate::{DeltaResult, Error, Version};

/// Highest reader protocol version this engine can replay
pub const MAX_READER_VERSION: u32 = 3;

const DEFAULT_BATCH_SIZE: usize = 1024;

/// A file entry that fails to replay, standing in for a malformed log record.
#[derive(Debug, Clone)]
enum LogEntry {
    Live(ScanFile),
    Corrupt { path: String, reason: String },
}

/// The registered content of one table.
#[derive(Debug, Clone)]
pub struct InMemoryTable {
    schema: SchemaRef,
    partition_columns: Vec<String>,
    reader_version: u32,
    versions: BTreeMap<Version, Vec<LogEntry>>,
}

impl InMemoryTable {
    pub fn new(schema: SchemaRef) -> Self {
        Self {
            schema,
            partition_columns: vec![],
            reader_version: 1,
            versions: BTreeMap::new(),
        }
    }

    pub fn with_partition_columns<S: Into<String>>(
        mut self,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        self.partition_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_reader_version(mut self, reader_version: u32) -> Self {
        self.reader_version = reader_version;
        self
    }

    /// Set the live files of `version`.
    pub fn with_version(
        mut self,
        version: Version,
        files: impl IntoIterator<Item = ScanFile>,
    ) -> Self {
        self.versions
            .insert(version, files.into_iter().map(LogEntry::Live).collect());
        self
    }

    /// Append a record to `version` that fails to replay when enumeration reaches it.
    pub fn with_corrupt_entry(
        mut self,
        version: Version,
        path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        self.versions.entry(version).or_default().push(LogEntry::Corrupt {
            path: path.into(),
            reason: reason.into(),
        });
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    snapshot_opens: AtomicUsize,
    discovery_pulls: AtomicUsize,
}

/// A log-replay [`Engine`] over tables held in memory.
pub struct InMemoryEngine {
    tables: RwLock<HashMap<Url, InMemoryTable>>,
    storage: Arc<dyn StorageHandler>,
    batch_size: usize,
    counters: Arc<Counters>,
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            storage: Arc::new(LocalStorageHandler),
            batch_size: DEFAULT_BATCH_SIZE,
            counters: Arc::default(),
        }
    }

    /// Number of log entries examined per discovery pull. Must be at least one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn register_table(&self, table_root: Url, table: InMemoryTable) -> DeltaResult<()> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| Error::generic("poisoned in-memory table registry"))?;
        tables.insert(table_root, table);
        Ok(())
    }

    /// How many snapshots have been opened so far.
    pub fn snapshot_opens(&self) -> usize {
        self.counters.snapshot_opens.load(Ordering::SeqCst)
    }

    /// How many times any scan iterator of this engine has been advanced.
    pub fn discovery_pulls(&self) -> usize {
        self.counters.discovery_pulls.load(Ordering::SeqCst)
    }
}

impl Engine for InMemoryEngine {
    fn open_snapshot(
        &self,
        table_root: &Url,
        version: Option<Version>,
    ) -> DeltaResult<Arc<dyn TableSnapshot>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| Error::generic("poisoned in-memory table registry"))?;
        let table = tables.get(table_root).ok_or_else(|| {
            Error::invalid_table_location(format!("No table found at {table_root}"))
        })?;
        require!(
            table.reader_version <= MAX_READER_VERSION,
            Error::unsupported(format!(
                "Unsupported minimum reader version {} for table at {table_root}",
                table.reader_version
            ))
        );
        let (version, entries) = match version {
            Some(v) => table
                .versions
                .get_key_value(&v)
                .ok_or(Error::MissingVersion(v))?,
            None => table.versions.last_key_value().ok_or_else(|| {
                Error::invalid_table_location(format!("Table at {table_root} has no commits"))
            })?,
        };
        self.counters.snapshot_opens.fetch_add(1, Ordering::SeqCst);
        debug!("Opened in-memory snapshot of {table_root} at version {version}");
        Ok(Arc::new(InMemorySnapshot {
            table_root: table_root.clone(),
            version: *version,
            schema: table.schema.clone(),
            partition_columns: table.partition_columns.clone(),
            entries: entries.clone().into(),
            batch_size: self.batch_size,
            counters: self.counters.clone(),
        }))
    }

    fn storage_handler(&self) -> Arc<dyn StorageHandler> {
        self.storage.clone()
    }
}

#[derive(Debug)]
struct InMemorySnapshot {
    table_root: Url,
    version: Version,
    schema: SchemaRef,
    partition_columns: Vec<String>,
    entries: Arc<[LogEntry]>,
    batch_size: usize,
    counters: Arc<Counters>,
}

impl InMemorySnapshot {
    /// Typed partition values of `file`, for predicate evaluation. A value that does not parse
    /// as its column's type is left out, so predicates on it evaluate as unknown and the file is
    /// kept.
    fn partition_scalars(&self, file: &ScanFile) -> CaseInsensitiveMap<Scalar> {
        let values: CaseInsensitiveMap<Option<&str>> = file
            .partition_values
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref()))
            .collect();
        self.partition_columns
            .iter()
            .filter_map(|name| {
                let field = self.schema.field(name)?;
                let raw = values.get(name).copied().flatten();
                match parse_partition_value(raw, field.data_type()) {
                    Ok(value) => Some((name.clone(), value)),
                    Err(err) => {
                        debug!(
                            "Not pruning on partition column '{name}' of {}: {err}",
                            file.path
                        );
                        None
                    }
                }
            })
            .collect()
    }
}

impl TableSnapshot for InMemorySnapshot {
    fn table_root(&self) -> &Url {
        &self.table_root
    }

    fn version(&self) -> Version {
        self.version
    }

    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn partition_columns(&self) -> &[String] {
        &self.partition_columns
    }

    fn scan_files(&self, predicate: Option<PredicateRef>) -> DeltaResult<ScanFileIterator> {
        let keep = self
            .entries
            .iter()
            .map(|entry| match (entry, &predicate) {
                (LogEntry::Live(file), Some(pred)) => {
                    !can_skip(pred, &self.partition_scalars(file))
                }
                _ => true,
            })
            .collect();
        Ok(Box::new(InMemoryScanIter {
            entries: self.entries.clone(),
            keep,
            position: 0,
            batch_size: self.batch_size,
            counters: self.counters.clone(),
        }))
    }
}

struct InMemoryScanIter {
    entries: Arc<[LogEntry]>,
    keep: Vec<bool>,
    position: usize,
    batch_size: usize,
    counters: Arc<Counters>,
}

impl Iterator for InMemoryScanIter {
    type Item = DeltaResult<Vec<ScanFile>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.counters.discovery_pulls.fetch_add(1, Ordering::SeqCst);
        if self.position >= self.entries.len() {
            return None;
        }
        let end = (self.position + self.batch_size).min(self.entries.len());
        let mut batch = Vec::with_capacity(end - self.position);
        for idx in self.position..end {
            match &self.entries[idx] {
                LogEntry::Live(file) if self.keep[idx] => batch.push(file.clone()),
                LogEntry::Live(_) => {}
                LogEntry::Corrupt { path, reason } => {
                    // leave the cursor on the broken record so the failure is sticky
                    self.position = idx;
                    return Some(Err(Error::discovery(
                        path,
                        Error::generic(format!("Malformed log entry: {reason}")),
                    )));
                }
            }
        }
        self.position = end;
        Some(Ok(batch))
    }
}
