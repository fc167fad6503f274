//! Reconciling the query's projected columns with the columns of each physical file.
//!
//! Resolution happens in two phases. [`ScanGlobalState::try_new`] runs once per scan and decides
//! where the synthetic columns live in the output: a synthetic column the query already projects
//! keeps its position, any other one is appended after the projection as an extra column. Then,
//! for every file, [`ScanGlobalState::finalize_bind`] records the constants that come from file
//! metadata and [`ScanGlobalState::create_column_mapping`] maps the remaining columns onto the
//! file's own columns by case-insensitive name.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::expressions::scalars::parse_partition_value;
use crate::expressions::Scalar;
use crate::scan::file_list::SnapshotFileList;
use crate::scan::options::{ScanOptions, FILE_NUMBER_COLUMN, FILE_ROW_NUMBER_COLUMN};
use crate::schema::{DataType, StructField};
use crate::utils::{require, CaseInsensitiveMap};
use crate::{DeltaResult, Error};

/// A column computed from file or row metadata rather than read from the file's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntheticColumn {
    /// Ordinal of the row within its file, produced by the physical reader. Needed to apply
    /// deletion vectors.
    RowNumber,
    /// Ordinal of the file within the file list, constant per file
    FileNumber,
}

impl SyntheticColumn {
    pub fn try_from_name(name: &str) -> DeltaResult<Self> {
        if name.eq_ignore_ascii_case(FILE_ROW_NUMBER_COLUMN) {
            Ok(Self::RowNumber)
        } else if name.eq_ignore_ascii_case(FILE_NUMBER_COLUMN) {
            Ok(Self::FileNumber)
        } else {
            Err(Error::unknown_synthetic_column(format!(
                "Unknown column '{name}' found as required by the delta multi-file reader"
            )))
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RowNumber => FILE_ROW_NUMBER_COLUMN,
            Self::FileNumber => FILE_NUMBER_COLUMN,
        }
    }

    pub fn data_type(&self) -> DataType {
        DataType::LONG
    }
}

/// Where a constant column's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantSource {
    PartitionValue,
    /// The file lacks the column, so every row reads as null
    MissingColumn,
    FileNumber,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantEntry {
    /// Output column the constant fills
    pub column_id: usize,
    pub value: Scalar,
    pub source: ConstantSource,
}

/// How one output column is produced for one file.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnResolution {
    Physical { local_id: usize },
    Cast { local_id: usize, target: DataType },
    PartitionConstant(Scalar),
    NullDefault(DataType),
    Synthetic(SyntheticColumn),
}

/// Per-file mapping state, filled by [`ScanGlobalState::finalize_bind`] and
/// [`ScanGlobalState::create_column_mapping`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderData {
    /// Ordinal of the file in the file list
    pub file_list_idx: usize,
    pub constant_map: Vec<ConstantEntry>,
    /// File column index to the type it must be cast to
    pub cast_map: HashMap<usize, DataType>,
    /// Output position of each column read from the file, parallel to `column_ids`
    pub column_mapping: Vec<usize>,
    /// File column indexes to read, in the order the physical batch carries them
    pub column_ids: Vec<usize>,
    /// Nothing needs to be read from the file
    pub empty_columns: bool,
}

impl ReaderData {
    pub fn new(file_list_idx: usize) -> Self {
        Self {
            file_list_idx,
            constant_map: vec![],
            cast_map: HashMap::new(),
            column_mapping: vec![],
            column_ids: vec![],
            empty_columns: true,
        }
    }

    fn constant(&self, column_id: usize) -> Option<&ConstantEntry> {
        self.constant_map.iter().find(|c| c.column_id == column_id)
    }

    fn is_constant(&self, column_id: usize) -> bool {
        self.constant(column_id).is_some()
    }

    /// How each output column of `state` is produced for this file, in output order.
    pub fn resolutions(&self, state: &ScanGlobalState) -> DeltaResult<Vec<ColumnResolution>> {
        (0..state.output_width())
            .map(|column_id| {
                let constant = self.constant(column_id);
                let read = self
                    .column_mapping
                    .iter()
                    .position(|&out| out == column_id)
                    .and_then(|k| self.column_ids.get(k).copied());
                match (constant, read) {
                    (Some(_), Some(_)) => Err(Error::internal_error(format!(
                        "Output column {column_id} is both constant and read from the file"
                    ))),
                    (Some(constant), None) => Ok(match constant.source {
                        ConstantSource::PartitionValue => {
                            ColumnResolution::PartitionConstant(constant.value.clone())
                        }
                        ConstantSource::MissingColumn => {
                            ColumnResolution::NullDefault(constant.value.data_type())
                        }
                        ConstantSource::FileNumber => {
                            ColumnResolution::Synthetic(SyntheticColumn::FileNumber)
                        }
                    }),
                    (None, Some(_)) if state.file_row_number_idx == Some(column_id) => {
                        Ok(ColumnResolution::Synthetic(SyntheticColumn::RowNumber))
                    }
                    (None, Some(local_id)) => Ok(match self.cast_map.get(&local_id) {
                        Some(target) => ColumnResolution::Cast {
                            local_id,
                            target: target.clone(),
                        },
                        None => ColumnResolution::Physical { local_id },
                    }),
                    (None, None) => Err(Error::internal_error(format!(
                        "Output column {column_id} of file {} is unresolved",
                        self.file_list_idx
                    ))),
                }
            })
            .collect()
    }
}

/// Per-scan state shared by every file of the scan.
#[derive(Debug)]
pub struct ScanGlobalState {
    pub(crate) file_list: Arc<SnapshotFileList>,
    pub(crate) global_columns: Vec<StructField>,
    /// Projection: index into `global_columns` of each output column
    pub(crate) global_column_ids: Vec<usize>,
    /// Synthetic columns appended after the projection
    pub(crate) extra_columns: Vec<StructField>,
    pub(crate) file_row_number_idx: Option<usize>,
    pub(crate) file_number_idx: Option<usize>,
    /// Output position of each projected column, by name
    selected_columns: CaseInsensitiveMap<usize>,
}

impl ScanGlobalState {
    /// Decide the output position of every synthetic column the scan needs. The row number is
    /// always needed; the file number only if `options.file_number` is set.
    pub fn try_new(
        options: &ScanOptions,
        file_list: Arc<SnapshotFileList>,
        global_columns: Vec<StructField>,
        global_column_ids: Vec<usize>,
    ) -> DeltaResult<Self> {
        let mut selected_columns = CaseInsensitiveMap::new();
        for (position, &global_id) in global_column_ids.iter().enumerate() {
            let field = global_columns.get(global_id).ok_or_else(|| {
                Error::invalid_argument(format!(
                    "Projected column {global_id} is out of range for {} columns",
                    global_columns.len()
                ))
            })?;
            selected_columns.insert(field.name().clone(), position);
        }

        let mut state = Self {
            file_list,
            global_columns,
            global_column_ids,
            extra_columns: vec![],
            file_row_number_idx: None,
            file_number_idx: None,
            selected_columns,
        };
        state.map_required_column(FILE_ROW_NUMBER_COLUMN)?;
        if options.file_number {
            state.map_required_column(FILE_NUMBER_COLUMN)?;
        }
        debug!(
            "Synthetic columns: file_row_number at {:?}, delta_file_number at {:?}, {} extra columns",
            state.file_row_number_idx,
            state.file_number_idx,
            state.extra_columns.len()
        );
        Ok(state)
    }

    /// Give the synthetic column `name` an output position: its projected position if the query
    /// selects it, otherwise the next position after the projection and earlier extra columns.
    pub fn map_required_column(&mut self, name: &str) -> DeltaResult<usize> {
        let column = SyntheticColumn::try_from_name(name)?;
        let position = match self.selected_columns.get(name) {
            Some(&position) => position,
            None => {
                let position = self.global_column_ids.len() + self.extra_columns.len();
                self.extra_columns
                    .push(StructField::nullable(column.name(), column.data_type()));
                position
            }
        };
        match column {
            SyntheticColumn::RowNumber => self.file_row_number_idx = Some(position),
            SyntheticColumn::FileNumber => self.file_number_idx = Some(position),
        }
        Ok(position)
    }

    pub fn file_list(&self) -> &Arc<SnapshotFileList> {
        &self.file_list
    }

    pub fn extra_columns(&self) -> &[StructField] {
        &self.extra_columns
    }

    pub fn file_row_number_idx(&self) -> Option<usize> {
        self.file_row_number_idx
    }

    pub fn file_number_idx(&self) -> Option<usize> {
        self.file_number_idx
    }

    /// Number of projected columns
    pub fn projected_width(&self) -> usize {
        self.global_column_ids.len()
    }

    /// Projected plus extra columns
    pub fn output_width(&self) -> usize {
        self.global_column_ids.len() + self.extra_columns.len()
    }

    /// Global field of projected output column `position`.
    pub(crate) fn projected_field(&self, position: usize) -> DeltaResult<&StructField> {
        self.global_column_ids
            .get(position)
            .and_then(|&global_id| self.global_columns.get(global_id))
            .ok_or_else(|| {
                Error::internal_error(format!("No projected column at position {position}"))
            })
    }

    /// Record the constants of this file: its ordinal, and the partition values of projected
    /// partition columns. The file must already be materialized in the file list.
    pub fn finalize_bind(&self, reader_data: &mut ReaderData) -> DeltaResult<()> {
        if let Some(column_id) = self.file_number_idx {
            let file_number = i64::try_from(reader_data.file_list_idx).map_err(|_| {
                Error::internal_error(format!(
                    "File ordinal {} does not fit a LONG",
                    reader_data.file_list_idx
                ))
            })?;
            reader_data.constant_map.push(ConstantEntry {
                column_id,
                value: Scalar::Long(file_number),
                source: ConstantSource::FileNumber,
            });
        }

        let metadata = self.file_list.get_metadata(reader_data.file_list_idx)?;
        if metadata.partition_map.is_empty() {
            return Ok(());
        }
        for column_id in 0..self.projected_width() {
            if reader_data.is_constant(column_id) {
                continue;
            }
            let field = self.projected_field(column_id)?;
            let Some(raw) = metadata.partition_map.get(field.name()) else {
                continue;
            };
            let value = parse_partition_value(raw.as_deref(), field.data_type())?;
            reader_data.constant_map.push(ConstantEntry {
                column_id,
                value,
                source: ConstantSource::PartitionValue,
            });
        }
        Ok(())
    }

    /// Map the non-constant output columns onto `local_columns`, the columns of the physical
    /// file. Columns the file lacks become null constants; columns whose type differs from the
    /// table's are cast. The row number column must be present in the file.
    pub fn create_column_mapping(
        &self,
        local_columns: &[StructField],
        reader_data: &mut ReaderData,
    ) -> DeltaResult<()> {
        let name_map: CaseInsensitiveMap<usize> = local_columns
            .iter()
            .enumerate()
            .map(|(local_id, field)| (field.name().clone(), local_id))
            .collect();

        for column_id in 0..self.projected_width() {
            if reader_data.is_constant(column_id) {
                continue;
            }
            let field = self.projected_field(column_id)?;
            let Some(&local_id) = name_map.get(field.name()) else {
                require!(
                    self.file_row_number_idx != Some(column_id),
                    Error::missing_column("Failed to find the file_row_number column")
                );
                debug!(
                    "File {} lacks column '{}', reading it as null",
                    reader_data.file_list_idx,
                    field.name()
                );
                reader_data.constant_map.push(ConstantEntry {
                    column_id,
                    value: Scalar::Null(field.data_type().clone()),
                    source: ConstantSource::MissingColumn,
                });
                continue;
            };
            let local_type = local_columns[local_id].data_type();
            if local_type != field.data_type() {
                reader_data
                    .cast_map
                    .insert(local_id, field.data_type().clone());
            }
            reader_data.column_mapping.push(column_id);
            reader_data.column_ids.push(local_id);
        }

        if let Some(column_id) = self
            .file_row_number_idx
            .filter(|&idx| idx >= self.projected_width())
        {
            let local_id = name_map
                .get(FILE_ROW_NUMBER_COLUMN)
                .copied()
                .ok_or_else(|| Error::missing_column("Failed to find the file_row_number column"))?;
            reader_data.column_ids.push(local_id);
            reader_data.column_mapping.push(column_id);
        }

        reader_data.empty_columns = reader_data.column_ids.is_empty();
        Ok(())
    }

    /// Both per-file phases, for a file that is already materialized in the file list.
    pub fn prepare_file(
        &self,
        file_list_idx: usize,
        local_columns: &[StructField],
    ) -> DeltaResult<ReaderData> {
        let mut reader_data = ReaderData::new(file_list_idx);
        self.finalize_bind(&mut reader_data)?;
        self.create_column_mapping(local_columns, &mut reader_data)?;
        Ok(reader_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::test_utils::{region_schema, region_table};

    fn region_state(options: &ScanOptions, projection: Vec<usize>) -> ScanGlobalState {
        let (engine, table) = region_table(10);
        let list = Arc::new(SnapshotFileList::try_new(engine, table.as_str()).unwrap());
        list.get_all_files().unwrap();
        let columns = region_schema().fields().cloned().collect();
        ScanGlobalState::try_new(options, list, columns, projection).unwrap()
    }

    fn row_number() -> StructField {
        StructField::nullable(FILE_ROW_NUMBER_COLUMN, DataType::LONG)
    }

    #[test]
    fn synthetic_names() {
        assert_eq!(
            SyntheticColumn::try_from_name("FILE_ROW_NUMBER").unwrap(),
            SyntheticColumn::RowNumber
        );
        assert_eq!(
            SyntheticColumn::try_from_name("delta_file_number").unwrap(),
            SyntheticColumn::FileNumber
        );
        assert!(matches!(
            SyntheticColumn::try_from_name("row_id"),
            Err(Error::UnknownSyntheticColumn(_))
        ));
    }

    #[test]
    fn unprojected_synthetics_are_appended_in_order() {
        let options = ScanOptions::default().with_file_number(true);
        let state = region_state(&options, vec![2, 0]);
        assert_eq!(state.file_row_number_idx(), Some(2));
        assert_eq!(state.file_number_idx(), Some(3));
        assert_eq!(
            state
                .extra_columns()
                .iter()
                .map(|f| f.name().as_str())
                .collect::<Vec<_>>(),
            vec![FILE_ROW_NUMBER_COLUMN, FILE_NUMBER_COLUMN]
        );
        assert_eq!(state.output_width(), 4);
    }

    #[test]
    fn projected_synthetic_keeps_its_position() {
        let (engine, table) = region_table(10);
        let list = Arc::new(SnapshotFileList::try_new(engine, table.as_str()).unwrap());
        let columns = vec![
            StructField::nullable("id", DataType::LONG),
            StructField::nullable("File_Row_Number", DataType::LONG),
        ];
        let state =
            ScanGlobalState::try_new(&ScanOptions::default(), list, columns, vec![1, 0]).unwrap();
        assert_eq!(state.file_row_number_idx(), Some(0));
        assert!(state.extra_columns().is_empty());
    }

    #[test]
    fn unknown_required_column() {
        let mut state = region_state(&ScanOptions::default(), vec![0]);
        assert!(matches!(
            state.map_required_column("row_id"),
            Err(Error::UnknownSyntheticColumn(_))
        ));
    }

    #[test]
    fn out_of_range_projection() {
        let (engine, table) = region_table(10);
        let list = Arc::new(SnapshotFileList::try_new(engine, table.as_str()).unwrap());
        let columns = region_schema().fields().cloned().collect();
        let result = ScanGlobalState::try_new(&ScanOptions::default(), list, columns, vec![7]);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn every_column_resolves_exactly_once() {
        let options = ScanOptions::default().with_file_number(true);
        // region, extra, id
        let state = region_state(&options, vec![2, 1, 0]);
        let local = [
            StructField::nullable("ID", DataType::INTEGER),
            row_number(),
        ];
        let reader_data = state.prepare_file(0, &local).unwrap();
        assert_eq!(
            reader_data.resolutions(&state).unwrap(),
            vec![
                ColumnResolution::PartitionConstant(Scalar::String("us".into())),
                ColumnResolution::NullDefault(DataType::STRING),
                ColumnResolution::Cast {
                    local_id: 0,
                    target: DataType::LONG
                },
                ColumnResolution::Synthetic(SyntheticColumn::RowNumber),
                ColumnResolution::Synthetic(SyntheticColumn::FileNumber),
            ]
        );
        assert_eq!(reader_data.column_ids, vec![0, 1]);
        assert_eq!(reader_data.column_mapping, vec![2, 3]);
        assert!(!reader_data.empty_columns);

        let reader_data = state.prepare_file(1, &local).unwrap();
        let resolutions = reader_data.resolutions(&state).unwrap();
        assert_eq!(
            resolutions[0],
            ColumnResolution::PartitionConstant(Scalar::String("eu".into()))
        );
        assert!(reader_data.constant_map.contains(&ConstantEntry {
            column_id: 4,
            value: Scalar::Long(1),
            source: ConstantSource::FileNumber,
        }));
    }

    #[test]
    fn missing_row_number_is_an_error() {
        let state = region_state(&ScanOptions::default(), vec![0]);
        let local = [StructField::nullable("id", DataType::LONG)];
        let err = state.prepare_file(0, &local).unwrap_err();
        assert!(err.to_string().contains("file_row_number"));
    }

    #[test]
    fn metadata_of_undiscovered_file_is_internal_error() {
        let (engine, table) = region_table(10);
        let list = Arc::new(SnapshotFileList::try_new(engine, table.as_str()).unwrap());
        let columns = region_schema().fields().cloned().collect();
        let state =
            ScanGlobalState::try_new(&ScanOptions::default(), list, columns, vec![0]).unwrap();
        let err = state.prepare_file(0, &[row_number()]).unwrap_err();
        assert!(err.is_internal());
    }
}
