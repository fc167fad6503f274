//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use crc::{Crc, CRC_32_ISO_HDLC};
use delta_scan_kernel::actions::{DeletionVectorDescriptor, DeletionVectorStorageType};
use delta_scan_kernel::arrow::array::{ArrayRef, Int64Array, RecordBatch};
use delta_scan_kernel::arrow::datatypes::{DataType as ArrowDataType, Field, Schema};
use delta_scan_kernel::engine::memory::{InMemoryEngine, InMemoryTable};
use delta_scan_kernel::scan::{ScanFile, FILE_ROW_NUMBER_COLUMN};
use delta_scan_kernel::schema::{DataType, SchemaRef, StructField, StructType};
use roaring::RoaringTreemap;
use url::Url;

pub const TABLE_ROOT: &str = "file:///warehouse/events/";

pub fn table_url() -> Url {
    Url::parse(TABLE_ROOT).unwrap()
}

pub fn schema(fields: impl IntoIterator<Item = StructField>) -> SchemaRef {
    Arc::new(StructType::try_new(fields).unwrap())
}

/// Register `table` at [`TABLE_ROOT`] in a new engine pulling `batch_size` entries at a time.
pub fn engine_with(batch_size: usize, table: InMemoryTable) -> Arc<InMemoryEngine> {
    let engine = InMemoryEngine::new().with_batch_size(batch_size);
    engine.register_table(table_url(), table).unwrap();
    Arc::new(engine)
}

/// `n` unpartitioned files; file `i` has `10 * (i + 1)` rows.
pub fn numbered_files(n: usize) -> Vec<ScanFile> {
    (0..n)
        .map(|i| {
            ScanFile::new(format!("part-{i:05}.parquet"), 1024)
                .with_num_records(10 * (i as u64 + 1))
        })
        .collect()
}

/// Write a deletion vector file deleting `deleted` into `dir` and describe it.
pub fn write_deletion_vector(dir: &Path, deleted: &[u64]) -> DeletionVectorDescriptor {
    let treemap: RoaringTreemap = deleted.iter().copied().collect();
    let mut payload = 1681511377u32.to_le_bytes().to_vec();
    treemap.serialize_into(&mut payload).unwrap();
    let crc = Crc::<u32>::new(&CRC_32_ISO_HDLC).checksum(&payload);

    let mut bytes = vec![1u8];
    bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&payload);
    bytes.extend_from_slice(&crc.to_be_bytes());
    let path = dir.join("deletion_vector_integration.bin");
    std::fs::write(&path, &bytes).unwrap();

    DeletionVectorDescriptor {
        storage_type: DeletionVectorStorageType::PersistedAbsolute,
        path_or_inline_dv: Url::from_file_path(&path).unwrap().to_string(),
        offset: Some(1),
        size_in_bytes: payload.len() as i32,
        cardinality: deleted.len() as i64,
    }
}

/// A physical batch of `columns` plus the row ordinals `row_numbers`.
pub fn physical_batch(columns: Vec<(&str, ArrayRef)>, row_numbers: Vec<i64>) -> RecordBatch {
    let mut fields = vec![];
    let mut arrays = vec![];
    for (name, array) in columns {
        fields.push(Field::new(name, array.data_type().clone(), true));
        arrays.push(array);
    }
    fields.push(Field::new(FILE_ROW_NUMBER_COLUMN, ArrowDataType::Int64, true));
    arrays.push(Arc::new(Int64Array::from(row_numbers)) as ArrayRef);
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap()
}

pub fn row_number_field() -> StructField {
    StructField::nullable(FILE_ROW_NUMBER_COLUMN, DataType::LONG)
}
