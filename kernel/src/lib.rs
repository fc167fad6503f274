//! Delta Scan Kernel bridges a Delta table's transaction log into a generic, index-addressable
//! multi-file scan.
//!
//! The crate sits between a log-replay engine (anything implementing [`Engine`]) and a host query
//! engine that knows how to read physical columnar files but nothing about Delta. It provides:
//!
//! - [`scan::SnapshotFileList`]: a lazy, thread-safe, memoizing list of the data files visible in
//!   a table snapshot. Files are discovered on demand, one engine pull at a time, and every file
//!   is materialized at most once.
//! - Filter pushdown ([`scan::SnapshotFileList::complex_filter_pushdown`]): forks a file list
//!   under a refined predicate while sharing the already-opened [`Snapshot`].
//! - Column reconciliation ([`scan::ScanGlobalState`]): maps the query's projected columns onto
//!   each physical file as physical reads, casts, partition constants, null defaults, or
//!   synthetic row/file ordinals.
//! - Selection vectors ([`scan::build_selection_vector`]): masks rows removed by deletion
//!   vectors at read time.
//!
//! # Engine
//!
//! The kernel never parses the transaction log itself. Log replay is delegated to an
//! [`Engine`], which opens a [`TableSnapshot`] and hands back file entries in batches through a
//! pull-based iterator. [`engine::memory::InMemoryEngine`] is a reference implementation used
//! throughout the tests.

#![warn(
    unreachable_pub,
    trivial_numeric_casts,
    unused_extern_crates,
    rust_2018_idioms,
    rust_2021_compatibility,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

pub mod actions;
pub mod engine;
pub mod error;
pub mod expressions;
pub mod kernel_predicates;
pub mod metrics;
pub mod path;
pub mod scan;
pub mod schema;
pub mod snapshot;

pub(crate) mod utils;

pub use arrow;

pub use engine::{Engine, ScanFileIterator, StorageHandler, TableSnapshot};
pub use error::{DeltaResult, Error};
pub use expressions::{Expression, ExpressionRef, Predicate, PredicateRef};
pub use snapshot::{Snapshot, SnapshotRef};
pub use utils::CaseInsensitiveMap;

/// Delta table version is 8 byte unsigned int
pub type Version = u64;
