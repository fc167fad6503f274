//! Per-file rows produced by the log-replay engine during discovery.

use std::collections::HashMap;

use crate::actions::deletion_vector::DeletionVectorDescriptor;

/// File-level statistics from an `add` action. Only the row count is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub num_records: u64,
}

/// Deletion vector information attached to a file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DvInfo {
    pub deletion_vector: Option<DeletionVectorDescriptor>,
}

/// One live file of a snapshot, as handed out by [`crate::TableSnapshot::scan_files`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScanFile {
    /// Relative (percent-encoded) or absolute path of the data file
    pub path: String,
    pub size: i64,
    pub stats: Option<Stats>,
    pub dv_info: DvInfo,
    /// Partition column name to serialized value. `None` is a null partition value.
    pub partition_values: HashMap<String, Option<String>>,
}

impl ScanFile {
    pub fn new(path: impl Into<String>, size: i64) -> Self {
        Self {
            path: path.into(),
            size,
            stats: None,
            dv_info: DvInfo::default(),
            partition_values: HashMap::new(),
        }
    }

    pub fn with_num_records(mut self, num_records: u64) -> Self {
        self.stats = Some(Stats { num_records });
        self
    }

    pub fn with_partition_value(
        mut self,
        column: impl Into<String>,
        value: Option<impl Into<String>>,
    ) -> Self {
        self.partition_values
            .insert(column.into(), value.map(Into::into));
        self
    }

    pub fn with_deletion_vector(mut self, descriptor: DeletionVectorDescriptor) -> Self {
        self.dv_info.deletion_vector = Some(descriptor);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_fill_every_field() {
        let file = ScanFile::new("region=us/part-00000.parquet", 1024)
            .with_num_records(10)
            .with_partition_value("region", Some("us"))
            .with_partition_value("day", None::<String>);
        assert_eq!(file.path, "region=us/part-00000.parquet");
        assert_eq!(file.size, 1024);
        assert_eq!(file.stats, Some(Stats { num_records: 10 }));
        assert_eq!(file.partition_values["region"].as_deref(), Some("us"));
        assert_eq!(file.partition_values["day"], None);
        assert_eq!(file.dv_info, DvInfo::default());
    }
}
