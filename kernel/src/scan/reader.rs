//! The entry point a host multi-file scan uses to read a Delta table.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::info;

use crate::metrics::MetricsReporter;
use crate::scan::column_mapping::ScanGlobalState;
use crate::scan::file_list::SnapshotFileList;
use crate::scan::options::{ScanOptions, FILE_NUMBER_COLUMN, FILE_ROW_NUMBER_COLUMN};
use crate::schema::{DataType, SchemaRef, StructField};
use crate::utils::require;
use crate::{DeltaResult, Engine, Error};

/// Result of binding a scan: the schema the host exposes to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct BindData {
    /// Table columns followed by any synthetic columns enabled in [`ScanOptions`]
    pub schema: SchemaRef,
    /// Position of `file_row_number` in `schema`, when it is exposed
    pub file_row_number_idx: Option<usize>,
}

/// Creates file lists and per-scan state for `delta_scan`.
pub struct DeltaMultiFileReader {
    engine: Arc<dyn Engine>,
    file_list: Option<Arc<SnapshotFileList>>,
    reporter: Option<Arc<dyn MetricsReporter>>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl std::fmt::Debug for DeltaMultiFileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaMultiFileReader")
            .field("file_list", &self.file_list)
            .field("reporter", &self.reporter)
            .finish()
    }
}

impl DeltaMultiFileReader {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            file_list: None,
            reporter: None,
            interrupt: None,
        }
    }

    /// Read through an existing file list, for example one over an attached table's snapshot,
    /// instead of opening a new one.
    pub fn with_file_list(mut self, file_list: Arc<SnapshotFileList>) -> Self {
        self.file_list = Some(file_list);
        self
    }

    pub fn with_metrics_reporter(mut self, reporter: Arc<dyn MetricsReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// The file list of the table at `paths`, which must name exactly one table.
    pub fn create_file_list(&self, paths: &[String]) -> DeltaResult<Arc<SnapshotFileList>> {
        let [path] = paths else {
            return Err(Error::invalid_argument(
                "'delta_scan' only supports single path as input",
            ));
        };
        if let Some(file_list) = &self.file_list {
            return Ok(file_list.clone());
        }
        let mut builder = SnapshotFileList::builder(self.engine.clone(), path)?;
        if let Some(reporter) = &self.reporter {
            builder = builder.with_metrics_reporter(reporter.clone());
        }
        if let Some(interrupt) = &self.interrupt {
            builder = builder.with_interrupt(interrupt.clone());
        }
        Ok(Arc::new(builder.build()))
    }

    /// Bind `file_list` and add the synthetic columns `options` asks for.
    pub fn bind(
        &self,
        options: &ScanOptions,
        file_list: &SnapshotFileList,
    ) -> DeltaResult<BindData> {
        let table_schema = file_list.bind()?;
        let mut schema = table_schema.as_ref().clone();
        let mut file_row_number_idx = None;
        if options.file_row_number {
            require!(
                schema.field(FILE_ROW_NUMBER_COLUMN).is_none(),
                Error::schema(format!(
                    "Table already has a column named '{FILE_ROW_NUMBER_COLUMN}'"
                ))
            );
            file_row_number_idx = Some(schema.num_fields());
            schema =
                schema.with_field(StructField::nullable(FILE_ROW_NUMBER_COLUMN, DataType::LONG))?;
        }
        if options.file_number {
            schema =
                schema.with_field(StructField::nullable(FILE_NUMBER_COLUMN, DataType::LONG))?;
        }
        info!(
            "Bound delta_scan of {} with schema {schema}",
            file_list.table_root()
        );
        Ok(BindData {
            schema: Arc::new(schema),
            file_row_number_idx,
        })
    }

    /// Create the per-scan state for a query that projects `global_column_ids` of the bound
    /// schema.
    pub fn initialize_global_state(
        &self,
        options: &ScanOptions,
        file_list: Arc<SnapshotFileList>,
        bind_data: &BindData,
        global_column_ids: Vec<usize>,
    ) -> DeltaResult<ScanGlobalState> {
        let global_columns = bind_data.schema.fields().cloned().collect();
        ScanGlobalState::try_new(options, file_list, global_columns, global_column_ids)
    }
}
