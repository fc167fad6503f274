use std::sync::{Arc, Mutex};

use url::Url;

use crate::engine::memory::{InMemoryEngine, InMemoryTable};
use crate::metrics::{MetricEvent, MetricsReporter};
use crate::scan::state::ScanFile;
use crate::schema::{DataType, SchemaRef, StructField, StructType};

pub(crate) const TEST_ROOT: &str = "file:///data/t/";

pub(crate) fn simple_schema() -> SchemaRef {
    Arc::new(
        StructType::try_new([
            StructField::nullable("id", DataType::LONG),
            StructField::nullable("value", DataType::STRING),
        ])
        .unwrap(),
    )
}

/// `n` files named `file-{i}.parquet`, ten rows each.
pub(crate) fn files(n: usize) -> Vec<ScanFile> {
    (0..n)
        .map(|i| ScanFile::new(format!("file-{i}.parquet"), 100).with_num_records(10))
        .collect()
}

/// A single-version table at [`TEST_ROOT`].
pub(crate) fn engine_with(
    batch_size: usize,
    schema: SchemaRef,
    files: Vec<ScanFile>,
) -> (Arc<InMemoryEngine>, Url) {
    let root = Url::parse(TEST_ROOT).unwrap();
    let engine = InMemoryEngine::new().with_batch_size(batch_size);
    engine
        .register_table(root.clone(), InMemoryTable::new(schema).with_version(0, files))
        .unwrap();
    (Arc::new(engine), root)
}

/// Schema of [`region_table`]: `id`, `extra` and the partition column `region`.
pub(crate) fn region_schema() -> SchemaRef {
    Arc::new(
        StructType::try_new([
            StructField::nullable("id", DataType::LONG),
            StructField::nullable("extra", DataType::STRING),
            StructField::nullable("region", DataType::STRING),
        ])
        .unwrap(),
    )
}

/// A table partitioned by `region` with one `us` file and one `eu` file. The `us` file also
/// carries a partition value for a column the schema does not know.
pub(crate) fn region_table(batch_size: usize) -> (Arc<InMemoryEngine>, Url) {
    let root = Url::parse(TEST_ROOT).unwrap();
    let engine = InMemoryEngine::new().with_batch_size(batch_size);
    let table = InMemoryTable::new(region_schema())
        .with_partition_columns(["region"])
        .with_version(
            0,
            [
                ScanFile::new("region=us/part-0.parquet", 100)
                    .with_num_records(3)
                    .with_partition_value("Region", Some("us"))
                    .with_partition_value("dropped", Some("x")),
                ScanFile::new("region=eu/part-1.parquet", 100)
                    .with_num_records(2)
                    .with_partition_value("region", Some("eu")),
            ],
        );
    engine.register_table(root.clone(), table).unwrap();
    (Arc::new(engine), root)
}

/// Keeps every reported event for inspection.
#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    events: Mutex<Vec<MetricEvent>>,
}

impl RecordingReporter {
    pub(crate) fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl MetricsReporter for RecordingReporter {
    fn report(&self, event: MetricEvent) {
        self.events.lock().unwrap().push(event);
    }
}
