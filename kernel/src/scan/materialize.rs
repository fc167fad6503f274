//! Turning physical batches into output batches.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, UInt64Array};
use arrow::compute::{cast, take};
use arrow::datatypes::{
    DataType as ArrowDataType, Field as ArrowField, Int64Type, Schema as ArrowSchema,
};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use itertools::Itertools;
use tracing::debug;

use crate::scan::column_mapping::{ReaderData, ScanGlobalState};
use crate::scan::selection::build_selection_vector;
use crate::utils::require;
use crate::{DeltaResult, Error};

impl ScanGlobalState {
    /// Build the output batch of one physical batch read from file `reader_data.file_list_idx`.
    ///
    /// `batch` must hold the file columns listed in [`ReaderData::column_ids`], in that order.
    /// Read columns are cast where needed, constants are broadcast, rows removed by the file's
    /// deletion vector are dropped, and only the projected columns are returned.
    pub fn finalize_chunk(
        &self,
        reader_data: &ReaderData,
        batch: &RecordBatch,
    ) -> DeltaResult<RecordBatch> {
        require!(
            batch.num_columns() == reader_data.column_ids.len(),
            Error::internal_error(format!(
                "Physical batch has {} columns but {} were requested from the file",
                batch.num_columns(),
                reader_data.column_ids.len()
            ))
        );
        let num_rows = batch.num_rows();

        let mut columns: Vec<Option<ArrayRef>> = vec![None; self.output_width()];
        for (k, (&column_id, local_id)) in reader_data
            .column_mapping
            .iter()
            .zip(&reader_data.column_ids)
            .enumerate()
        {
            let mut column = batch.column(k).clone();
            if let Some(target) = reader_data.cast_map.get(local_id) {
                column = cast(&column, &ArrowDataType::try_from(target)?)?;
            }
            *output_slot(&mut columns, column_id)? = Some(column);
        }
        for constant in &reader_data.constant_map {
            *output_slot(&mut columns, constant.column_id)? =
                Some(constant.value.to_array(num_rows)?);
        }
        let mut columns: Vec<ArrayRef> = columns
            .into_iter()
            .enumerate()
            .map(|(column_id, column)| {
                column.ok_or_else(|| {
                    Error::internal_error(format!(
                        "Output column {column_id} of file {} was never filled",
                        reader_data.file_list_idx
                    ))
                })
            })
            .try_collect()?;

        let metadata = self.file_list.get_metadata(reader_data.file_list_idx)?;
        let mut num_rows = num_rows;
        let apply_deletions = num_rows > 0 && metadata.has_deletions();
        if let (Some(keep_mask), true) = (&metadata.selection_vector, apply_deletions) {
            let row_number_idx = self.file_row_number_idx.ok_or_else(|| {
                Error::internal_error("Deletion vector present but no file_row_number column")
            })?;
            let row_numbers = cast(&columns[row_number_idx], &ArrowDataType::Int64)?;
            let row_numbers = row_numbers.as_primitive::<Int64Type>();
            let ordinals = (0..row_numbers.len())
                .map(|i| {
                    if row_numbers.is_null(i) {
                        -1
                    } else {
                        row_numbers.value(i)
                    }
                })
                .collect_vec();
            let selection = build_selection_vector(keep_mask, &ordinals);
            debug!(
                "Deletion vector of file {} keeps {} of {num_rows} rows",
                reader_data.file_list_idx,
                selection.count()
            );
            if selection.count() != num_rows {
                let indices = UInt64Array::from_iter_values(
                    selection.positions.iter().map(|&position| position as u64),
                );
                columns = columns
                    .iter()
                    .map(|column| take(column.as_ref(), &indices, None))
                    .try_collect()?;
                num_rows = selection.count();
            }
        }

        columns.truncate(self.projected_width());
        let fields: Vec<ArrowField> = (0..self.projected_width())
            .map(|position| -> DeltaResult<_> {
                let field = self.projected_field(position)?;
                Ok(ArrowField::new(
                    field.name(),
                    ArrowDataType::try_from(field.data_type())?,
                    true,
                ))
            })
            .try_collect()?;
        let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
        Ok(RecordBatch::try_new_with_options(
            Arc::new(ArrowSchema::new(fields)),
            columns,
            &options,
        )?)
    }
}

fn output_slot(
    columns: &mut [Option<ArrayRef>],
    column_id: usize,
) -> DeltaResult<&mut Option<ArrayRef>> {
    let width = columns.len();
    columns.get_mut(column_id).ok_or_else(|| {
        Error::internal_error(format!(
            "Output column {column_id} is out of range for {width} columns"
        ))
    })
}

#[cfg(test)]
mod tests {
    use arrow::array::{Int32Array, Int64Array, StringArray};
    use url::Url;

    use super::*;
    use crate::actions::deletion_vector::tests::write_dv_file;
    use crate::engine::memory::{InMemoryEngine, InMemoryTable};
    use crate::scan::file_list::SnapshotFileList;
    use crate::scan::options::{ScanOptions, FILE_ROW_NUMBER_COLUMN};
    use crate::scan::state::ScanFile;
    use crate::scan::test_utils::{region_schema, region_table, simple_schema};
    use crate::schema::{DataType, StructField};

    fn physical_batch(ids: Vec<i32>, row_numbers: Vec<i64>) -> RecordBatch {
        let schema = ArrowSchema::new(vec![
            ArrowField::new("id", ArrowDataType::Int32, true),
            ArrowField::new(FILE_ROW_NUMBER_COLUMN, ArrowDataType::Int64, true),
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int32Array::from(ids)),
                Arc::new(Int64Array::from(row_numbers)),
            ],
        )
        .unwrap()
    }

    fn local_columns() -> Vec<StructField> {
        vec![
            StructField::nullable("id", DataType::INTEGER),
            StructField::nullable(FILE_ROW_NUMBER_COLUMN, DataType::LONG),
        ]
    }

    #[test]
    fn partition_constants_null_defaults_and_casts() {
        let (engine, table) = region_table(10);
        let list = Arc::new(SnapshotFileList::try_new(engine, table.as_str()).unwrap());
        list.get_all_files().unwrap();
        let columns = region_schema().fields().cloned().collect();
        // id, extra, region
        let state =
            ScanGlobalState::try_new(&ScanOptions::default(), list, columns, vec![0, 1, 2])
                .unwrap();
        let reader_data = state.prepare_file(1, &local_columns()).unwrap();

        let out = state
            .finalize_chunk(&reader_data, &physical_batch(vec![1, 2], vec![0, 1]))
            .unwrap();
        assert_eq!(out.num_columns(), 3);
        assert_eq!(out.schema().field(0).data_type(), &ArrowDataType::Int64);
        assert_eq!(
            out.column(0).as_primitive::<Int64Type>().values().to_vec(),
            vec![1i64, 2]
        );
        assert_eq!(out.column(1).null_count(), 2);
        let region = out.column(2).as_string::<i32>();
        assert_eq!(region, &StringArray::from(vec!["eu", "eu"]));
    }

    #[test]
    fn deleted_rows_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let dv = write_dv_file(dir.path(), &[2, 5]);
        let root = Url::parse("memory:///dv/").unwrap();
        let engine = InMemoryEngine::new();
        let table = InMemoryTable::new(simple_schema()).with_version(
            0,
            [ScanFile::new("part-0.parquet", 100)
                .with_num_records(10)
                .with_deletion_vector(dv)],
        );
        engine.register_table(root.clone(), table).unwrap();
        let list = Arc::new(SnapshotFileList::try_new(Arc::new(engine), root.as_str()).unwrap());
        list.get_file(0).unwrap();

        let columns = simple_schema().fields().cloned().collect();
        let state =
            ScanGlobalState::try_new(&ScanOptions::default(), list, columns, vec![0]).unwrap();
        let reader_data = state.prepare_file(0, &local_columns()).unwrap();
        let out = state
            .finalize_chunk(
                &reader_data,
                &physical_batch((0..10).collect(), (0..10).collect()),
            )
            .unwrap();
        assert_eq!(out.num_rows(), 8);
        assert_eq!(out.num_columns(), 1);
        assert_eq!(
            out.column(0).as_primitive::<Int64Type>().values().to_vec(),
            vec![0i64, 1, 3, 4, 6, 7, 8, 9]
        );

        let empty = state
            .finalize_chunk(&reader_data, &physical_batch(vec![], vec![]))
            .unwrap();
        assert_eq!(empty.num_rows(), 0);
    }

    #[test]
    fn empty_deletion_vector_keeps_every_row() {
        let dir = tempfile::tempdir().unwrap();
        let dv = write_dv_file(dir.path(), &[]);
        let root = Url::parse("memory:///empty_dv/").unwrap();
        let engine = InMemoryEngine::new();
        let table = InMemoryTable::new(simple_schema()).with_version(
            0,
            [ScanFile::new("part-0.parquet", 100).with_deletion_vector(dv)],
        );
        engine.register_table(root.clone(), table).unwrap();
        let list = Arc::new(SnapshotFileList::try_new(Arc::new(engine), root.as_str()).unwrap());
        list.get_file(0).unwrap();
        let metadata = list.get_metadata(0).unwrap();
        assert!(metadata.selection_vector.is_some());
        assert!(!metadata.has_deletions());

        let columns = simple_schema().fields().cloned().collect();
        let state =
            ScanGlobalState::try_new(&ScanOptions::default(), list, columns, vec![0]).unwrap();
        let reader_data = state.prepare_file(0, &local_columns()).unwrap();
        let out = state
            .finalize_chunk(&reader_data, &physical_batch(vec![7, 8, 9], vec![0, 1, 2]))
            .unwrap();
        assert_eq!(
            out.column(0).as_primitive::<Int64Type>().values().to_vec(),
            vec![7i64, 8, 9]
        );
    }

    #[test]
    fn wrong_column_count() {
        let (engine, table) = region_table(10);
        let list = Arc::new(SnapshotFileList::try_new(engine, table.as_str()).unwrap());
        list.get_all_files().unwrap();
        let columns = region_schema().fields().cloned().collect();
        let state =
            ScanGlobalState::try_new(&ScanOptions::default(), list, columns, vec![1]).unwrap();
        let reader_data = state.prepare_file(0, &local_columns()).unwrap();
        let err = state
            .finalize_chunk(&reader_data, &physical_batch(vec![1], vec![0]))
            .unwrap_err();
        assert!(err.is_internal());
    }
}
