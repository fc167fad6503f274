//! Utilities to make working with table roots and data file paths easier

use std::path::Path;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::{DeltaResult, Error};

const FILE_SCHEME_PREFIX: &str = "file://";

/// Turn a user supplied table location into a directory URL (always ending in `/`).
///
/// Anything that parses as a URL with a scheme longer than one character is kept as is, so that
/// Windows drive letters (`C:\...`) fall through to the local path branch. Local paths are made
/// absolute against the current working directory.
pub fn table_root_from_path(location: &str) -> DeltaResult<Url> {
    if location.trim().is_empty() {
        return Err(Error::invalid_table_location("empty table path"));
    }
    match Url::parse(location) {
        Ok(url) if url.scheme().len() > 1 => Ok(ensure_trailing_slash(url)),
        _ => {
            let absolute = std::path::absolute(Path::new(location))
                .map_err(|err| Error::invalid_table_location(format!("{location}: {err}")))?;
            Url::from_directory_path(&absolute)
                .map_err(|_| Error::invalid_table_location(absolute.display()))
        }
    }
}

fn ensure_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Resolve a data file path from an `add` action against the table root.
///
/// Relative paths in the log are percent-encoded and are appended to the root; absolute URIs are
/// used unchanged. The result is percent-decoded, and local files lose their `file://` prefix so
/// that the host's file reader can open them directly.
pub fn resolve_data_file_path(table_root: &Url, path: &str) -> DeltaResult<String> {
    let joined = if is_absolute_uri(path) {
        path.to_string()
    } else {
        format!("{}/{}", table_root.as_str().trim_end_matches('/'), path)
    };
    let decoded = percent_decode_str(&joined)
        .decode_utf8()
        .map_err(|err| Error::generic(format!("Invalid UTF-8 in file path '{path}': {err}")))?;
    Ok(decoded
        .strip_prefix(FILE_SCHEME_PREFIX)
        .map(str::to_string)
        .unwrap_or_else(|| decoded.into_owned()))
}

fn is_absolute_uri(path: &str) -> bool {
    matches!(Url::parse(path), Ok(url) if url.scheme().len() > 1)
}
