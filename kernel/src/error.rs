//! Definitions of errors that the delta scan kernel can encounter

use std::backtrace::{Backtrace, BacktraceStatus};

use crate::schema::DataType;
use crate::Version;

/// A [`std::result::Result`] that has the kernel [`Error`] as the error variant
pub type DeltaResult<T, E = Error> = std::result::Result<T, E>;

/// All the types of errors that the kernel can run into
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// This is an error that includes a backtrace. To have a particular type of error include such
    /// backtrace (when RUST_BACKTRACE is set), use [`Error::with_backtrace`].
    #[error("{source}\n{backtrace}")]
    Backtraced {
        source: Box<Self>,
        backtrace: Box<Backtrace>,
    },

    /// An error performing operations on arrow data
    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    /// An [`std::io::Error`] was encountered
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// An error parsing JSON
    #[error("Invalid json: {0}")]
    MalformedJson(#[from] serde_json::Error),

    /// A generic error with a message
    #[error("Generic delta scan kernel error: {0}")]
    Generic(String),

    /// An internal invariant was violated. This indicates a bug in the kernel rather than bad
    /// input.
    #[error("Internal error {0}. This is a kernel bug, please report.")]
    InternalError(String),

    /// The table location could not be resolved or opened
    #[error("Invalid table location: {0}.")]
    InvalidTableLocation(String),

    /// An argument passed by the host was not acceptable
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A requested table version does not exist
    #[error("Version {0} does not exist in the table log")]
    MissingVersion(Version),

    /// The table uses a feature or protocol this kernel cannot read
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A column referenced by the query does not exist
    #[error("Column not found: {0}")]
    MissingColumn(String),

    /// The scan requested a synthetic column this kernel does not know how to produce
    #[error("Unknown synthetic column: {0}")]
    UnknownSyntheticColumn(String),

    /// Data that was expected to be present is missing
    #[error("Missing data: {0}")]
    MissingData(String),

    /// An error reading or decoding a deletion vector
    #[error("Deletion Vector error: {0}")]
    DeletionVector(String),

    /// A schema could not be built or is inconsistent
    #[error("Schema error: {0}")]
    Schema(String),

    /// A string value could not be parsed as the declared type
    #[error("Failed to parse value '{value}' as '{data_type}'")]
    ParseError { value: String, data_type: DataType },

    /// Discovering the file set failed. `path` names the offending file or table.
    #[error("Failed to discover files at '{path}': {source}")]
    Discovery { path: String, source: Box<Self> },

    /// The host signalled cancellation before a discovery pull could start
    #[error("Scan was interrupted")]
    Interrupted,
}

// Convenience constructors for Error types that take a String argument
impl Error {
    pub fn generic(msg: impl ToString) -> Self {
        Self::Generic(msg.to_string())
    }

    pub fn internal_error(msg: impl ToString) -> Self {
        Self::InternalError(msg.to_string()).with_backtrace()
    }

    pub fn invalid_table_location(location: impl ToString) -> Self {
        Self::InvalidTableLocation(location.to_string())
    }

    pub fn invalid_argument(msg: impl ToString) -> Self {
        Self::InvalidArgument(msg.to_string())
    }

    pub fn unsupported(msg: impl ToString) -> Self {
        Self::Unsupported(msg.to_string())
    }

    pub fn missing_column(name: impl ToString) -> Self {
        Self::MissingColumn(name.to_string())
    }

    pub fn unknown_synthetic_column(name: impl ToString) -> Self {
        Self::UnknownSyntheticColumn(name.to_string())
    }

    pub fn missing_data(msg: impl ToString) -> Self {
        Self::MissingData(msg.to_string())
    }

    pub fn deletion_vector(msg: impl ToString) -> Self {
        Self::DeletionVector(msg.to_string())
    }

    pub fn schema(msg: impl ToString) -> Self {
        Self::Schema(msg.to_string())
    }

    pub fn parse_error(value: impl ToString, data_type: DataType) -> Self {
        Self::ParseError {
            value: value.to_string(),
            data_type,
        }
    }

    /// Wrap `source` as a discovery failure for `path`. Errors that are already annotated are
    /// returned unchanged so the innermost path wins.
    pub fn discovery(path: impl ToString, source: Self) -> Self {
        match source {
            err @ Self::Discovery { .. } | err @ Self::Interrupted => err,
            source => Self::Discovery {
                path: path.to_string(),
                source: Box::new(source),
            },
        }
    }

    /// Capture a backtrace for this error if backtraces are enabled in the environment
    pub fn with_backtrace(self) -> Self {
        let backtrace = Backtrace::capture();
        match backtrace.status() {
            BacktraceStatus::Captured => Self::Backtraced {
                source: Box::new(self),
                backtrace: Box::new(backtrace),
            },
            _ => self,
        }
    }

    /// Whether this error reports a broken kernel invariant rather than a user or data problem.
    pub fn is_internal(&self) -> bool {
        match self {
            Self::InternalError(_) => true,
            Self::Backtraced { source, .. } | Self::Discovery { source, .. } => {
                source.is_internal()
            }
            _ => false,
        }
    }

    /// Whether this error was raised while enumerating the file set.
    pub fn is_discovery(&self) -> bool {
        match self {
            Self::Discovery { .. } => true,
            Self::Backtraced { source, .. } => source.is_discovery(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_keeps_innermost_path() {
        let inner = Error::discovery("file:///t/a.parquet", Error::generic("bad entry"));
        let outer = Error::discovery("file:///t/", inner);
        match outer {
            Error::Discovery { path, .. } => assert_eq!(path, "file:///t/a.parquet"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn internal_errors_are_classified() {
        assert!(Error::internal_error("total_files inconsistent").is_internal());
        assert!(!Error::generic("nope").is_internal());
        let wrapped = Error::discovery("x", Error::internal_error("boom"));
        assert!(wrapped.is_internal());
        assert!(wrapped.is_discovery());
    }

    #[test]
    fn interrupted_is_not_wrapped() {
        let err = Error::discovery("file:///t/", Error::Interrupted);
        assert!(matches!(err, Error::Interrupted));
    }
}
