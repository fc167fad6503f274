//! Code relating to parsing and using deletion vectors

use std::io::{Cursor, Read};
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use crc::{Crc, CRC_32_ISO_HDLC};
use roaring::RoaringTreemap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::utils::require;
use crate::{DeltaResult, Error, StorageHandler};

/// Magic number that prefixes a portable `RoaringBitmapArray`
const PORTABLE_MAGIC: u32 = 1681511377;
/// Magic number of the native serialization, which this kernel does not read
const NATIVE_MAGIC: u32 = 1681511376;
/// Length of a z85 encoded uuid
const ENCODED_UUID_LEN: usize = 20;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum DeletionVectorStorageType {
    #[serde(rename = "u")]
    PersistedRelative,
    #[serde(rename = "i")]
    Inline,
    #[serde(rename = "p")]
    PersistedAbsolute,
}

impl FromStr for DeletionVectorStorageType {
    type Err = Error;

    fn from_str(s: &str) -> DeltaResult<Self> {
        match s {
            "u" => Ok(Self::PersistedRelative),
            "i" => Ok(Self::Inline),
            "p" => Ok(Self::PersistedAbsolute),
            _ => Err(Error::deletion_vector(format!(
                "Unsupported deletion vector format option: {s}"
            ))),
        }
    }
}

impl std::fmt::Display for DeletionVectorStorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeletionVectorStorageType::PersistedRelative => write!(f, "u"),
            DeletionVectorStorageType::Inline => write!(f, "i"),
            DeletionVectorStorageType::PersistedAbsolute => write!(f, "p"),
        }
    }
}

/// The `deletionVector` field of an `add` action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionVectorDescriptor {
    /// A single character to indicate how to access the DV. Legal options are: ['u', 'i', 'p'].
    pub storage_type: DeletionVectorStorageType,

    /// - `u`: `<random prefix - optional><base85 encoded uuid>`, a file relative to the table root
    ///   whose name is rebuilt from the uuid.
    /// - `i`: `<base85 encoded bytes>`, the bitmap stored inline in the log.
    /// - `p`: `<absolute path>` of the file holding the bitmap.
    pub path_or_inline_dv: String,

    /// Start of the data for this DV in number of bytes from the beginning of the file it is
    /// stored in.
    /// Always None (absent in JSON) when `storageType = 'i'`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i32>,

    /// Size of the serialized DV in bytes (raw data size, i.e. before base85 encoding, if inline).
    pub size_in_bytes: i32,

    /// Number of rows the given DV logically removes from the file.
    pub cardinality: i64,
}

fn relative_path(prefix: &str, uuid: &uuid::Uuid) -> String {
    if !prefix.is_empty() {
        format!("{prefix}/deletion_vector_{uuid}.bin")
    } else {
        format!("deletion_vector_{uuid}.bin")
    }
}

impl DeletionVectorDescriptor {
    /// Identifies the DV independently of the file it belongs to.
    pub fn unique_id(&self) -> String {
        match self.offset {
            Some(offset) => format!("{}{}@{offset}", self.storage_type, self.path_or_inline_dv),
            None => format!("{}{}", self.storage_type, self.path_or_inline_dv),
        }
    }

    /// Location of the DV file, or `None` for inline DVs.
    pub fn absolute_path(&self, parent: &Url) -> DeltaResult<Option<Url>> {
        match self.storage_type {
            DeletionVectorStorageType::PersistedRelative => {
                let path_len = self.path_or_inline_dv.len();
                require!(
                    path_len >= ENCODED_UUID_LEN,
                    Error::deletion_vector(format!(
                        "Invalid length {path_len}, must be >= {ENCODED_UUID_LEN}"
                    ))
                );
                let prefix_len = path_len - ENCODED_UUID_LEN;
                let decoded = z85::decode(&self.path_or_inline_dv[prefix_len..])
                    .map_err(|_| Error::deletion_vector("Failed to decode DV uuid"))?;
                let uuid = uuid::Uuid::from_slice(&decoded)
                    .map_err(|err| Error::deletion_vector(err.to_string()))?;
                let dv_suffix = relative_path(&self.path_or_inline_dv[..prefix_len], &uuid);
                let dv_path = parent
                    .join(&dv_suffix)
                    .map_err(|_| Error::deletion_vector(format!("invalid path: {dv_suffix}")))?;
                Ok(Some(dv_path))
            }
            DeletionVectorStorageType::PersistedAbsolute => {
                Ok(Some(Url::parse(&self.path_or_inline_dv).map_err(|_| {
                    Error::deletion_vector(format!("invalid path: {}", self.path_or_inline_dv))
                })?))
            }
            DeletionVectorStorageType::Inline => Ok(None),
        }
    }

    /// Read a dv in stored form into a [`RoaringTreemap`]
    // dvs write integers in BOTH big and little endian format. The magic and dv itself are
    // little, while the version, size, and checksum are big
    pub fn read(
        &self,
        storage: Arc<dyn StorageHandler>,
        parent: &Url,
    ) -> DeltaResult<RoaringTreemap> {
        let Some(path) = self.absolute_path(parent)? else {
            return self.read_inline();
        };

        let size_in_bytes: u32 = self.size_in_bytes.try_into().map_err(|_| {
            Error::deletion_vector(format!("size_in_bytes doesn't fit in u32 for {path}"))
        })?;

        let dv_data = storage
            .read_files(vec![(path.clone(), None)])?
            .next()
            .ok_or_else(|| Error::missing_data(format!("No deletion vector data for {path}")))??;
        let dv_data_len = dv_data.len();

        let mut cursor = Cursor::new(dv_data);
        let mut version_buf = [0; 1];
        cursor.read_exact(&mut version_buf).map_err(|err| {
            Error::deletion_vector(format!("Failed to read version from {path}: {err}"))
        })?;
        let version = u8::from_be_bytes(version_buf);
        require!(
            version == 1,
            Error::deletion_vector(format!("Invalid version {version} for {path}"))
        );

        // Deletion vector file format:
        // +---------------+-----------------+
        // |  num bytes    |  value          |
        // +===============+=================+
        // | 1 byte        |  version        |
        // +---------------+-----------------+
        // | offset-1      |  other dvs...   |
        // +---------------+-----------------+ <- this_dv_start
        // | 4 bytes       |  dv_size        |
        // +---------------+-----------------+
        // | 4 bytes       |  magic value    |
        // +---------------+-----------------+ <- bitmap_start
        // | dv_size - 4   |  bitmap         |
        // +---------------+-----------------+ <- crc_start
        // | 4 bytes       |  CRC            |
        // +---------------+-----------------+

        let this_dv_start: usize = self.offset.unwrap_or(1).try_into().map_err(|_| {
            Error::deletion_vector(format!(
                "Offset {:?} doesn't fit in usize for {path}",
                self.offset
            ))
        })?;
        let magic_start = this_dv_start + 4;
        let bitmap_start = this_dv_start + 8;
        let crc_start = this_dv_start + 4 + (size_in_bytes as usize);
        require!(
            this_dv_start < dv_data_len,
            Error::deletion_vector(format!(
                "This DV start is out of bounds for {path} (Offset: {this_dv_start} >= Size: {dv_data_len})"
            ))
        );

        cursor.set_position(this_dv_start as u64);
        let dv_size = read_u32(&mut cursor, Endian::Big)?;
        require!(
            dv_size == size_in_bytes,
            Error::deletion_vector(format!(
                "DV size mismatch for {path}. Log indicates {size_in_bytes}, file says: {dv_size}"
            ))
        );
        let magic = read_u32(&mut cursor, Endian::Little)?;
        require!(
            magic == PORTABLE_MAGIC,
            Error::deletion_vector(format!("Invalid magic {magic} for {path}"))
        );

        let bytes = cursor.into_inner();
        require!(
            bytes.len() >= crc_start + 4,
            Error::deletion_vector(format!(
                "Can't read deletion vector for {path} as there are not enough bytes. Expected {}, but got {}",
                crc_start + 4,
                bytes.len()
            ))
        );

        let mut crc_cursor = Cursor::new(bytes.slice(crc_start..crc_start + 4));
        let crc = read_u32(&mut crc_cursor, Endian::Big)?;
        // CRC covers the magic field through the end of the bitmap
        let expected_crc = create_dv_crc32().checksum(&bytes.slice(magic_start..crc_start));
        require!(
            crc == expected_crc,
            Error::deletion_vector(format!(
                "CRC32 checksum mismatch for {path}. Got: {crc}, expected: {expected_crc}"
            ))
        );
        let dv_bytes = bytes.slice(bitmap_start..crc_start);
        RoaringTreemap::deserialize_from(Cursor::new(dv_bytes)).map_err(|err| {
            Error::deletion_vector(format!(
                "Failed to deserialize deletion vector for {path}: {err}"
            ))
        })
    }

    fn read_inline(&self) -> DeltaResult<RoaringTreemap> {
        let byte_slice = z85::decode(&self.path_or_inline_dv)
            .map_err(|_| Error::deletion_vector("Failed to decode DV"))?;
        require!(
            byte_slice.len() >= 4,
            Error::deletion_vector("Inline DV is too short to carry a magic number")
        );
        let magic = slice_to_u32(&byte_slice[0..4], Endian::Little)?;
        match magic {
            PORTABLE_MAGIC => RoaringTreemap::deserialize_from(&byte_slice[4..])
                .map_err(|err| Error::deletion_vector(err.to_string())),
            NATIVE_MAGIC => Err(Error::unsupported(
                "natively serialized inline deletion vectors",
            )),
            _ => Err(Error::deletion_vector(format!("Invalid magic {magic}"))),
        }
    }

    /// Read the DV and turn it into a keep-mask: `mask[i]` is `false` iff row `i` is deleted.
    /// The mask is one longer than the largest deleted row ordinal.
    pub fn keep_mask(
        &self,
        storage: Arc<dyn StorageHandler>,
        parent: &Url,
    ) -> DeltaResult<Vec<bool>> {
        let treemap = self.read(storage, parent)?;
        if let Some(max) = treemap.max() {
            require!(
                usize::try_from(max).is_ok_and(|max| max < usize::MAX),
                Error::deletion_vector(format!("Deleted row ordinal {max} exceeds usize"))
            );
        }
        Ok(deletion_treemap_to_bools(treemap))
    }
}

enum Endian {
    Big,
    Little,
}

/// CRC-32 (ISO HDLC) as used by the deletion vector file format.
pub(crate) fn create_dv_crc32() -> Crc<u32> {
    Crc::<u32>::new(&CRC_32_ISO_HDLC)
}

/// small helper to read a big or little endian u32 from a cursor
fn read_u32(cursor: &mut Cursor<Bytes>, endian: Endian) -> DeltaResult<u32> {
    let mut buf = [0; 4];
    cursor
        .read_exact(&mut buf)
        .map_err(|err| Error::deletion_vector(err.to_string()))?;
    match endian {
        Endian::Big => Ok(u32::from_be_bytes(buf)),
        Endian::Little => Ok(u32::from_le_bytes(buf)),
    }
}

/// decode a slice into a u32
fn slice_to_u32(buf: &[u8], endian: Endian) -> DeltaResult<u32> {
    let array = buf
        .try_into()
        .map_err(|_| Error::generic("Must have a 4 byte slice to decode to u32"))?;
    match endian {
        Endian::Big => Ok(u32::from_be_bytes(array)),
        Endian::Little => Ok(u32::from_le_bytes(array)),
    }
}

/// Convert a treemap into a boolean vector where, for index i, if the bit is set the vector will
/// be false, and otherwise true. An empty treemap gives an empty vector.
pub(crate) fn deletion_treemap_to_bools(treemap: RoaringTreemap) -> Vec<bool> {
    fn combine(high_bits: u32, low_bits: u32) -> usize {
        ((u64::from(high_bits) << 32) | u64::from(low_bits)) as usize
    }

    match treemap.max() {
        Some(max) => {
            let mut result = vec![true; max as usize + 1];
            for (index, bitmap) in treemap.bitmaps() {
                for bit in bitmap.iter() {
                    result[combine(index, bit)] = false;
                }
            }
            result
        }
        None => vec![],
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use roaring::RoaringTreemap;

    use super::*;
    use crate::engine::local::LocalStorageHandler;

    /// Serialize `deleted` in the on-disk DV file format, at offset 1.
    pub(crate) fn dv_file_bytes(deleted: &[u64]) -> Vec<u8> {
        let treemap: RoaringTreemap = deleted.iter().copied().collect();
        let mut bitmap = Vec::new();
        treemap.serialize_into(&mut bitmap).unwrap();

        let mut magic_and_bitmap = PORTABLE_MAGIC.to_le_bytes().to_vec();
        magic_and_bitmap.extend_from_slice(&bitmap);
        let crc = create_dv_crc32().checksum(&magic_and_bitmap);

        let mut out = vec![1u8];
        out.extend_from_slice(&(magic_and_bitmap.len() as u32).to_be_bytes());
        out.extend_from_slice(&magic_and_bitmap);
        out.extend_from_slice(&crc.to_be_bytes());
        out
    }

    pub(crate) fn write_dv_file(
        dir: &std::path::Path,
        deleted: &[u64],
    ) -> DeletionVectorDescriptor {
        let bytes = dv_file_bytes(deleted);
        let path = dir.join("deletion_vector_test.bin");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&bytes).unwrap();
        DeletionVectorDescriptor {
            storage_type: DeletionVectorStorageType::PersistedAbsolute,
            path_or_inline_dv: Url::from_file_path(&path).unwrap().to_string(),
            offset: Some(1),
            size_in_bytes: (bytes.len() - 9) as i32,
            cardinality: deleted.len() as i64,
        }
    }

    fn dv_relative() -> DeletionVectorDescriptor {
        DeletionVectorDescriptor {
            storage_type: DeletionVectorStorageType::PersistedRelative,
            path_or_inline_dv: "ab^-aqEH.-t@S}K{vb[*k^".to_string(),
            offset: Some(4),
            size_in_bytes: 40,
            cardinality: 6,
        }
    }

    fn dv_inline() -> DeletionVectorDescriptor {
        DeletionVectorDescriptor {
            storage_type: DeletionVectorStorageType::Inline,
            path_or_inline_dv: "^Bg9^0rr910000000000iXQKl0rr91000f55c8Xg0@@D72lkbi5=-{L"
                .to_string(),
            offset: None,
            size_in_bytes: 44,
            cardinality: 6,
        }
    }

    fn storage() -> Arc<dyn StorageHandler> {
        Arc::new(LocalStorageHandler)
    }

    #[test]
    fn test_deletion_vector_absolute_path() {
        let parent = Url::parse("s3://mytable/").unwrap();

        let expected =
            Url::parse("s3://mytable/ab/deletion_vector_d2c639aa-8816-431a-aaf6-d3fe2512ff61.bin")
                .unwrap();
        assert_eq!(
            expected,
            dv_relative().absolute_path(&parent).unwrap().unwrap()
        );
        assert_eq!(None, dv_inline().absolute_path(&parent).unwrap());
    }

    #[test]
    fn test_inline_read() {
        let parent = Url::parse("http://not.used").unwrap();
        let tree_map = dv_inline().read(storage(), &parent).unwrap();
        assert_eq!(tree_map.len(), 6);
        for i in [3, 4, 7, 11, 18, 29] {
            assert!(tree_map.contains(i));
        }
        for i in [1, 2, 8, 17, 55, 200] {
            assert!(!tree_map.contains(i));
        }
    }

    #[test]
    fn test_inline_keep_mask() {
        let parent = Url::parse("http://not.used").unwrap();
        let mask = dv_inline().keep_mask(storage(), &parent).unwrap();
        assert_eq!(mask.len(), 30);
        let deleted: Vec<usize> = (0..mask.len()).filter(|&i| !mask[i]).collect();
        assert_eq!(deleted, vec![3, 4, 7, 11, 18, 29]);
    }

    #[test]
    fn test_file_read() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = write_dv_file(dir.path(), &[2, 5]);
        let parent = Url::from_directory_path(dir.path()).unwrap();
        let mask = descriptor.keep_mask(storage(), &parent).unwrap();
        assert_eq!(mask, vec![true, true, false, true, true, false]);
    }

    #[test]
    fn test_file_read_rejects_bad_crc() {
        let dir = tempfile::tempdir().unwrap();
        let mut descriptor = write_dv_file(dir.path(), &[1]);
        let path = dir.path().join("deletion_vector_test.bin");
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();
        let parent = Url::from_directory_path(dir.path()).unwrap();
        let err = descriptor.read(storage(), &parent).unwrap_err();
        assert!(err.to_string().contains("CRC32 checksum mismatch"));

        descriptor.size_in_bytes += 1;
        let err = descriptor.read(storage(), &parent).unwrap_err();
        assert!(err.to_string().contains("DV size mismatch"));
    }

    #[test]
    fn test_dv_to_bools() {
        let rb: RoaringTreemap = [0, 2, 7].into_iter().collect();
        let bools = deletion_treemap_to_bools(rb);
        assert_eq!(bools, vec![false, true, false, true, true, true, true, false]);
        assert!(deletion_treemap_to_bools(RoaringTreemap::new()).is_empty());
    }

    #[test]
    fn test_descriptor_from_json() {
        let descriptor: DeletionVectorDescriptor = serde_json::from_str(
            r#"{"storageType":"i","pathOrInlineDv":"abc","sizeInBytes":44,"cardinality":6}"#,
        )
        .unwrap();
        assert_eq!(descriptor.storage_type, DeletionVectorStorageType::Inline);
        assert_eq!(descriptor.offset, None);
        assert_eq!(descriptor.unique_id(), "iabc");
    }

    #[test]
    fn test_deletion_vector_storage_type_from_str() {
        let cases = [
            ("u", Some(DeletionVectorStorageType::PersistedRelative)),
            ("i", Some(DeletionVectorStorageType::Inline)),
            ("p", Some(DeletionVectorStorageType::PersistedAbsolute)),
            ("U", None),
            ("", None),
            ("Inline", None),
        ];
        for (input, expected) in cases {
            assert_eq!(input.parse::<DeletionVectorStorageType>().ok(), expected);
        }
        let err = "invalid".parse::<DeletionVectorStorageType>().unwrap_err();
        assert!(err
            .to_string()
            .contains("Unsupported deletion vector format option: invalid"));
    }
}
