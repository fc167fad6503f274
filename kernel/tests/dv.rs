//! Read a small table with/without deletion vectors.
use std::sync::Arc;

use delta_scan_kernel::arrow::array::{ArrayRef, AsArray, Int64Array};
use delta_scan_kernel::arrow::datatypes::Int64Type;
use delta_scan_kernel::engine::memory::InMemoryTable;
use delta_scan_kernel::scan::{DeltaMultiFileReader, ScanFile, ScanOptions};
use delta_scan_kernel::schema::{DataType, StructField};
use delta_scan_kernel::DeltaResult;

use test_log::test;

mod common;
use common::*;

/// Read ten rows with ordinals 0..10 from the single file of the table through a scan that
/// projects `id`, and return the ids that survive.
fn scan_single_file(file: ScanFile, options: ScanOptions) -> DeltaResult<Vec<i64>> {
    let table = InMemoryTable::new(schema([StructField::nullable("id", DataType::LONG)]))
        .with_version(0, [file]);
    let reader = DeltaMultiFileReader::new(engine_with(10, table));
    let list = reader.create_file_list(&[TABLE_ROOT.to_string()])?;
    let bind_data = reader.bind(&options, &list)?;
    let state = reader.initialize_global_state(&options, list.clone(), &bind_data, vec![0])?;

    assert!(list.get_file(0)?.is_some());
    let reader_data =
        state.prepare_file(0, &[StructField::nullable("id", DataType::LONG), row_number_field()])?;
    let ids: ArrayRef = Arc::new(Int64Array::from_iter_values(100..110));
    let batch = physical_batch(vec![("id", ids)], (0..10).collect());
    let out = state.finalize_chunk(&reader_data, &batch)?;
    Ok(out.column(0).as_primitive::<Int64Type>().values().to_vec())
}

#[test]
fn dv_table() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let dv = write_deletion_vector(dir.path(), &[2, 5]);
    let file = ScanFile::new("part-00000.parquet", 1024)
        .with_num_records(10)
        .with_deletion_vector(dv);

    let ids = scan_single_file(file, ScanOptions::default())?;
    assert_eq!(ids.len(), 8);
    assert_eq!(ids, vec![100, 101, 103, 104, 106, 107, 108, 109]);
    Ok(())
}

#[test]
fn non_dv_table() -> Result<(), Box<dyn std::error::Error>> {
    let file = ScanFile::new("part-00000.parquet", 1024).with_num_records(10);
    let ids = scan_single_file(file, ScanOptions::default())?;
    assert_eq!(ids, (100..110).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn dv_with_file_number() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let dv = write_deletion_vector(dir.path(), &[0, 9]);
    let file = ScanFile::new("part-00000.parquet", 1024).with_deletion_vector(dv);
    let ids = scan_single_file(file, ScanOptions::default().with_file_number(true))?;
    assert_eq!(ids, (101..109).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn broken_dv_fails_discovery() {
    let dir = tempfile::tempdir().unwrap();
    let mut dv = write_deletion_vector(dir.path(), &[1]);
    dv.path_or_inline_dv = url::Url::from_file_path(dir.path().join("missing.bin"))
        .unwrap()
        .to_string();
    let file = ScanFile::new("part-00000.parquet", 1024).with_deletion_vector(dv);
    let err = scan_single_file(file, ScanOptions::default()).unwrap_err();
    assert!(err.is_discovery());
    assert!(err.to_string().contains("part-00000.parquet"), "{err}");
}
