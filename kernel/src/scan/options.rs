//! Scan-time configuration.

use crate::{DeltaResult, Error};

/// Name of the synthetic column holding each row's ordinal within its data file
pub const FILE_ROW_NUMBER_COLUMN: &str = "file_row_number";
/// Name of the synthetic column holding the ordinal of the file a row was read from
pub const FILE_NUMBER_COLUMN: &str = "delta_file_number";
/// Option key enabling the pushdown file-count diagnostics
pub const EXPLAIN_FILES_FILTERED_OPTION: &str = "delta_scan_explain_files_filtered";

/// Options of one `delta_scan`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Expose the row ordinal column as a regular column of the bound schema
    pub file_row_number: bool,
    /// Add the file ordinal column to the bound schema
    pub file_number: bool,
    /// Record file counts before and after filter pushdown when the query is profiled
    pub explain_files_filtered: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            file_row_number: false,
            file_number: false,
            explain_files_filtered: true,
        }
    }
}

impl ScanOptions {
    pub fn with_file_row_number(mut self, enabled: bool) -> Self {
        self.file_row_number = enabled;
        self
    }

    pub fn with_file_number(mut self, enabled: bool) -> Self {
        self.file_number = enabled;
        self
    }

    pub fn with_explain_files_filtered(mut self, enabled: bool) -> Self {
        self.explain_files_filtered = enabled;
        self
    }

    /// Apply a `key = value` option. Keys are matched case-insensitively. Returns `Ok(false)` if
    /// the key is not a scan option, so the caller can hand it to someone else.
    pub fn parse_option(&mut self, key: &str, value: &str) -> DeltaResult<bool> {
        let target = match key.to_ascii_lowercase().as_str() {
            FILE_ROW_NUMBER_COLUMN => &mut self.file_row_number,
            FILE_NUMBER_COLUMN => &mut self.file_number,
            EXPLAIN_FILES_FILTERED_OPTION => &mut self.explain_files_filtered,
            _ => return Ok(false),
        };
        *target = parse_bool(key, value)?;
        Ok(true)
    }
}

fn parse_bool(key: &str, value: &str) -> DeltaResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(Error::invalid_argument(format!(
            "Invalid value '{value}' for option '{key}', expected a boolean"
        ))),
    }
}
