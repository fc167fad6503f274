//! Forking a file list under pushed-down filters.

use std::sync::Arc;

use itertools::Itertools;
use tracing::{debug, info};

use crate::expressions::{Predicate, PredicateRef};
use crate::metrics::MetricEvent;
use crate::scan::column_mapping::SyntheticColumn;
use crate::scan::file_list::SnapshotFileList;
use crate::scan::options::ScanOptions;
use crate::utils::require;
use crate::{DeltaResult, Error};

/// File counts recorded for one scan node across pushdown calls, shown by `EXPLAIN ANALYZE`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushdownExtraInfo {
    /// Files in the list the filters were pushed into
    pub total_files: Option<usize>,
    /// Files left after the filters were applied
    pub filtered_files: Option<usize>,
    /// The applied filters, one per line, set when they removed any file
    pub file_filters: Option<String>,
}

/// Pushdown bookkeeping owned by the host's scan node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushdownInfo {
    pub extra_info: PushdownExtraInfo,
}

impl SnapshotFileList {
    /// Fork this list under `filters`, or return `None` if no filter can prune files.
    ///
    /// Filters on the synthetic columns the reader adds (`file_row_number`, `delta_file_number`)
    /// are left to the host, since no file can be ruled out by them. The fork shares this list's
    /// snapshot, opening it first if needed, and enumerates files with the conjunction of this
    /// list's predicate and the remaining filters. When `profiling_enabled` is set and
    /// [`ScanOptions::explain_files_filtered`] is on, both lists are fully expanded and the counts
    /// are recorded in `info`. Counts that contradict what `info` already holds are reported as
    /// internal errors.
    pub fn complex_filter_pushdown(
        &self,
        options: &ScanOptions,
        profiling_enabled: bool,
        info: &mut PushdownInfo,
        filters: &[PredicateRef],
    ) -> DeltaResult<Option<SnapshotFileList>> {
        if filters.is_empty() {
            return Ok(None);
        }

        let schema = self.bind()?;
        let mut pushed = Vec::with_capacity(filters.len());
        for filter in filters {
            let mut on_synthetic = false;
            for name in filter.references() {
                if schema.field(name).is_some() {
                    continue;
                }
                if SyntheticColumn::try_from_name(name).is_err() {
                    return Err(Error::missing_column(format!(
                        "Filter '{filter}' references column '{name}' which is not in the table schema {schema}"
                    )));
                }
                on_synthetic = true;
            }
            if on_synthetic {
                debug!("Filter '{filter}' is on a synthetic column and can't prune files");
            } else {
                pushed.push(filter.clone());
            }
        }
        if pushed.is_empty() {
            return Ok(None);
        }

        let combined = self
            .predicate()
            .into_iter()
            .chain(pushed.iter().cloned())
            .map(Arc::unwrap_or_clone)
            .collect_vec();
        let predicate = match <[Predicate; 1]>::try_from(combined) {
            Ok([single]) => single,
            Err(preds) => Predicate::and_from(preds),
        };
        let fork = self.fork(Arc::new(predicate))?;
        info!(
            "Pushed {} filters into file list of {}",
            pushed.len(),
            self.table_root()
        );
        if let Some(reporter) = self.reporter() {
            reporter.report(MetricEvent::FilesFiltered {
                operation_id: fork.operation_id(),
                parent_id: self.operation_id(),
                num_filters: pushed.len() as u64,
            });
        }

        if profiling_enabled && options.explain_files_filtered {
            self.explain_files_filtered(&fork, info, &pushed)?;
        }
        Ok(Some(fork))
    }

    /// Expand this list and `fork` completely and record their sizes.
    fn explain_files_filtered(
        &self,
        fork: &SnapshotFileList,
        info: &mut PushdownInfo,
        filters: &[PredicateRef],
    ) -> DeltaResult<()> {
        let old_total = self.get_total_file_count()?;
        let new_total = fork.get_total_file_count()?;
        debug!("Filter pushdown kept {new_total} of {old_total} files");
        require!(
            new_total <= old_total,
            Error::internal_error(format!(
                "Filter pushdown grew the file list from {old_total} to {new_total} files"
            ))
        );

        let extra = &mut info.extra_info;
        if old_total != new_total {
            extra.file_filters = Some(filters.iter().map(|f| f.to_string()).join("\n"));
        }

        match extra.total_files {
            None => extra.total_files = Some(old_total),
            Some(recorded) if recorded < old_total => {
                return Err(Error::internal_error(
                    "Error encountered when analyzing filtered out files for delta scan: total_files inconsistent!",
                ))
            }
            Some(_) => {}
        }

        match extra.filtered_files {
            Some(recorded) if recorded < new_total => Err(Error::internal_error(
                "Error encountered when analyzing filtered out files for delta scan: filtered_files inconsistent!",
            )),
            _ => {
                extra.filtered_files = Some(new_total);
                Ok(())
            }
        }
    }
}
