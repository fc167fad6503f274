//! Metric event types and utilities.

use std::fmt;
use std::time::Duration;

use uuid::Uuid;

use crate::Version;

/// Unique identifier of one file list, used to correlate its events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(Uuid);

impl MetricId {
    /// Generate a new unique MetricId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MetricId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricEvent {
    /// A file list opened its snapshot.
    SnapshotOpened {
        operation_id: MetricId,
        version: Version,
        duration: Duration,
    },

    /// Opening the snapshot failed.
    SnapshotFailed {
        operation_id: MetricId,
        duration: Duration,
    },

    /// One discovery pull completed.
    FilesDiscovered {
        operation_id: MetricId,
        /// Files produced by this pull, possibly zero
        num_files: u64,
        /// Files materialized so far, including this pull
        total_files: u64,
        duration: Duration,
    },

    /// The engine reported that no more files exist.
    FileListExhausted {
        operation_id: MetricId,
        total_files: u64,
    },

    /// Filter pushdown forked a new list from `parent_id`.
    FilesFiltered {
        operation_id: MetricId,
        parent_id: MetricId,
        num_filters: u64,
    },
}

impl fmt::Display for MetricEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricEvent::SnapshotOpened {
                operation_id,
                version,
                duration,
            } => write!(
                f,
                "SnapshotOpened(id={operation_id}, version={version}, duration={duration:?})"
            ),
            MetricEvent::SnapshotFailed {
                operation_id,
                duration,
            } => write!(
                f,
                "SnapshotFailed(id={operation_id}, duration={duration:?})"
            ),
            MetricEvent::FilesDiscovered {
                operation_id,
                num_files,
                total_files,
                duration,
            } => write!(
                f,
                "FilesDiscovered(id={operation_id}, files={num_files}, total={total_files}, duration={duration:?})"
            ),
            MetricEvent::FileListExhausted {
                operation_id,
                total_files,
            } => write!(
                f,
                "FileListExhausted(id={operation_id}, total={total_files})"
            ),
            MetricEvent::FilesFiltered {
                operation_id,
                parent_id,
                num_filters,
            } => write!(
                f,
                "FilesFiltered(id={operation_id}, parent={parent_id}, filters={num_filters})"
            ),
        }
    }
}
