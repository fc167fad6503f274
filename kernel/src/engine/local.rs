//! A [`StorageHandler`] backed by the local filesystem.

use bytes::Bytes;
use tracing::debug;

use crate::engine::{FileSlice, StorageHandler};
use crate::{DeltaResult, Error};

/// Reads `file://` urls with blocking std I/O.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStorageHandler;

fn read_slice((url, range): FileSlice) -> DeltaResult<Bytes> {
    if url.scheme() != "file" {
        return Err(Error::unsupported(format!(
            "Local storage cannot read url with scheme '{}': {url}",
            url.scheme()
        )));
    }
    let path = url
        .to_file_path()
        .map_err(|_| Error::invalid_table_location(format!("Invalid file URL: {url}")))?;
    debug!("Reading {}", path.display());
    let bytes = Bytes::from(std::fs::read(&path)?);
    match range {
        None => Ok(bytes),
        Some(range) => {
            let start = usize::try_from(range.start)
                .map_err(|_| Error::generic(format!("Range start out of bounds for {url}")))?;
            let end = usize::try_from(range.end)
                .map_err(|_| Error::generic(format!("Range end out of bounds for {url}")))?;
            if start > end || end > bytes.len() {
                return Err(Error::generic(format!(
                    "Range {start}..{end} out of bounds for {url} of length {}",
                    bytes.len()
                )));
            }
            Ok(bytes.slice(start..end))
        }
    }
}

impl StorageHandler for LocalStorageHandler {
    fn read_files(
        &self,
        files: Vec<FileSlice>,
    ) -> DeltaResult<Box<dyn Iterator<Item = DeltaResult<Bytes>>>> {
        Ok(Box::new(files.into_iter().map(read_slice)))
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;

    #[test]
    fn test_read_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"hello world").unwrap();
        let url = Url::from_file_path(&path).unwrap();

        let results: Vec<_> = LocalStorageHandler
            .read_files(vec![(url.clone(), None), (url.clone(), Some(6..11))])
            .unwrap()
            .collect::<DeltaResult<_>>()
            .unwrap();
        assert_eq!(results, vec![Bytes::from("hello world"), Bytes::from("world")]);

        let mut iter = LocalStorageHandler
            .read_files(vec![(url, Some(6..100))])
            .unwrap();
        assert!(iter.next().unwrap().is_err());
    }

    #[test]
    fn test_rejects_remote_urls() {
        let url = Url::parse("s3://bucket/file").unwrap();
        let mut iter = LocalStorageHandler.read_files(vec![(url, None)]).unwrap();
        assert!(matches!(iter.next().unwrap(), Err(Error::Unsupported(_))));
    }
}
