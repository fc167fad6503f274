//! Metrics for file discovery.
//!
//! Every [`crate::scan::SnapshotFileList`] is assigned a [`MetricId`] when it is created, and
//! each event it emits through a [`MetricsReporter`] carries that id. Forks created by filter
//! pushdown get their own id, and report the id of the list they were forked from.
//!
//! # Example: Implementing a Custom MetricsReporter
//!
//! ```
//! use delta_scan_kernel::metrics::{MetricEvent, MetricsReporter};
//!
//! #[derive(Debug)]
//! struct PrintReporter;
//!
//! impl MetricsReporter for PrintReporter {
//!     fn report(&self, event: MetricEvent) {
//!         if let MetricEvent::FileListExhausted { total_files, .. } = event {
//!             println!("discovered {total_files} files");
//!         }
//!     }
//! }
//! ```

mod events;
mod reporter;

pub use events::{MetricEvent, MetricId};
pub use reporter::{MetricsReporter, TracingReporter};
