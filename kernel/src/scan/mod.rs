//! Functionality to expose a snapshot of a delta table as a multi-file scan.
//!
//! A scan goes through these steps:
//!
//! 1. [`DeltaMultiFileReader::create_file_list`] creates a [`SnapshotFileList`] for the table and
//!    [`DeltaMultiFileReader::bind`] opens the snapshot to get its schema.
//! 2. The host may push filters into the list with
//!    [`SnapshotFileList::complex_filter_pushdown`], which forks a list sharing the snapshot.
//! 3. [`DeltaMultiFileReader::initialize_global_state`] builds the [`ScanGlobalState`] of the
//!    query's projection.
//! 4. Workers ask the list for files by ordinal with [`SnapshotFileList::get_file`], prepare a
//!    [`ReaderData`] for each file, and pass every physical batch they read through
//!    [`ScanGlobalState::finalize_chunk`].

pub mod column_mapping;
pub mod file_list;
pub mod file_store;
mod materialize;
pub mod options;
pub mod pushdown;
pub mod reader;
pub mod selection;
pub mod state;

#[cfg(test)]
pub(crate) mod test_utils;

pub use column_mapping::{
    ColumnResolution, ConstantEntry, ConstantSource, ReaderData, ScanGlobalState, SyntheticColumn,
};
pub use file_list::{Cardinality, FileListBuilder, SnapshotFileList};
pub use file_store::{FileEntry, FileEntryStore, FileMetadata};
pub use options::{ScanOptions, FILE_NUMBER_COLUMN, FILE_ROW_NUMBER_COLUMN};
pub use pushdown::{PushdownExtraInfo, PushdownInfo};
pub use reader::{BindData, DeltaMultiFileReader};
pub use selection::{build_selection_vector, SelectionVector};
pub use state::{DvInfo, ScanFile, Stats};
