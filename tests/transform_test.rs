//! End-to-end transform tests over local temp storage.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

use datafusion::arrow::array::{
    Array, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray,
};
use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::parquet::arrow::ArrowWriter;
use datafusion::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use medallion::config::{ColumnsConfig, LayoutConfig};
use medallion::storage::{StorageProvider, StorageProviderRef};
use medallion::transform::{FileOutcome, ProcessFile, TransformEngine};

fn trip_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("store_and_fwd_flag", DataType::Utf8, true),
        Field::new("trip_distance", DataType::Float64, true),
        Field::new("total_amount", DataType::Float64, true),
        Field::new("passenger_count", DataType::Int64, true),
        Field::new(
            "tpep_pickup_datetime",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            true,
        ),
        Field::new("payment_type", DataType::Int64, true),
        Field::new("DOLocationID", DataType::Int64, true),
        Field::new("tip_amount", DataType::Float64, true),
    ]))
}

/// Microseconds since epoch for a day offset plus seconds within the day.
fn micros(days: i64, secs: i64) -> i64 {
    (days * 86_400 + secs) * 1_000_000
}

// Day offsets from the unix epoch
const JAN_15_2025: i64 = 20103;
const FEB_15_2025: i64 = 20134;

#[allow(clippy::too_many_arguments)]
fn trip_batch(
    flags: Vec<Option<&str>>,
    distances: Vec<f64>,
    totals: Vec<f64>,
    passengers: Vec<i64>,
    pickups: Vec<Option<i64>>,
    payments: Vec<i64>,
    zones: Vec<i64>,
    tips: Vec<f64>,
) -> RecordBatch {
    RecordBatch::try_new(
        trip_schema(),
        vec![
            Arc::new(StringArray::from(flags)),
            Arc::new(Float64Array::from(distances)),
            Arc::new(Float64Array::from(totals)),
            Arc::new(Int64Array::from(passengers)),
            Arc::new(TimestampMicrosecondArray::from(pickups)),
            Arc::new(Int64Array::from(payments)),
            Arc::new(Int64Array::from(zones)),
            Arc::new(Float64Array::from(tips)),
        ],
    )
    .unwrap()
}

fn to_parquet(batch: &RecordBatch) -> Bytes {
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), None).unwrap();
    writer.write(batch).unwrap();
    writer.close().unwrap();
    Bytes::from(buffer)
}

fn read_parquet(bytes: Bytes) -> Vec<RecordBatch> {
    ParquetRecordBatchReaderBuilder::try_new(bytes)
        .unwrap()
        .build()
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

async fn temp_storage(temp_dir: &TempDir) -> StorageProviderRef {
    Arc::new(
        StorageProvider::for_url_with_options(temp_dir.path().to_str().unwrap(), HashMap::new())
            .await
            .unwrap(),
    )
}

fn engine(storage: &StorageProviderRef) -> TransformEngine {
    TransformEngine::new(
        storage.clone(),
        LayoutConfig::default(),
        ColumnsConfig::default(),
    )
    .unwrap()
}

/// One valid January file: two good rows plus one row failing each
/// validity predicate.
fn january_fixture() -> RecordBatch {
    trip_batch(
        vec![Some(" y "), Some("N"), Some("n"), Some("Y"), Some("N")],
        vec![2.5, 1.0, 3.0, -3.0, 4.0],
        vec![15.0, 8.0, 12.0, 10.0, -1.0],
        vec![1, 2, 0, 1, 1],
        vec![
            Some(micros(JAN_15_2025, 43_200)),
            Some(micros(JAN_15_2025, 50_000)),
            Some(micros(JAN_15_2025, 1_000)),
            Some(micros(JAN_15_2025, 2_000)),
            Some(micros(JAN_15_2025, 3_000)),
        ],
        vec![1, 2, 1, 1, 2],
        vec![100, 100, 200, 200, 200],
        vec![2.0, 1.0, 0.5, 0.5, 0.5],
    )
}

#[tokio::test]
async fn test_clean_filters_normalizes_and_partitions() {
    let temp_dir = TempDir::new().unwrap();
    let storage = temp_storage(&temp_dir).await;

    let key = "raw/2025/01/yellow_tripdata_2025-01.parquet";
    storage.put(key, to_parquet(&january_fixture())).await.unwrap();

    let engine = engine(&storage);
    let outcome = engine.process(key).await.unwrap();
    assert_eq!(
        outcome,
        FileOutcome::Cleaned {
            rows: 2,
            partitions: 1
        }
    );

    // Exactly one cleaned object, under the derived year/month partition
    let cleaned_keys = storage.list_keys("cleaned/").await.unwrap();
    assert_eq!(cleaned_keys.len(), 1);
    assert!(cleaned_keys[0].starts_with("cleaned/year=2025/month=1/"));
    assert!(cleaned_keys[0].ends_with(".parquet"));

    let batches = read_parquet(storage.get(&cleaned_keys[0]).await.unwrap());
    let total_rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    assert_eq!(total_rows, 2);

    // Partition attributes live in the path, not the data
    let schema = batches[0].schema();
    assert!(schema.field_with_name("year").is_err());
    assert!(schema.field_with_name("month").is_err());

    // Flag values are trimmed and uppercased
    let flag_idx = schema.index_of("store_and_fwd_flag").unwrap();
    let mut flags: Vec<String> = Vec::new();
    for batch in &batches {
        let column = batch
            .column(flag_idx)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        for i in 0..column.len() {
            flags.push(column.value(i).to_string());
        }
    }
    flags.sort();
    assert_eq!(flags, vec!["N".to_string(), "Y".to_string()]);
}

#[tokio::test]
async fn test_curated_tables_reflect_cleaned_union() {
    let temp_dir = TempDir::new().unwrap();
    let storage = temp_storage(&temp_dir).await;
    let engine = engine(&storage);

    let january = "raw/2025/01/yellow_tripdata_2025-01.parquet";
    storage
        .put(january, to_parquet(&january_fixture()))
        .await
        .unwrap();
    engine.process(january).await.unwrap();

    // Revenue by payment type after the first file
    let revenue = read_parquet(
        storage
            .get("curated/revenue_by_payment_type.parquet")
            .await
            .unwrap(),
    );
    assert_eq!(revenue[0].num_rows(), 2);
    let payments = revenue[0]
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    let sums = revenue[0]
        .column(1)
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    assert_eq!(payments.value(0), 1);
    assert_eq!(sums.value(0), 15.0);
    assert_eq!(payments.value(1), 2);
    assert_eq!(sums.value(1), 8.0);

    // Average tip by zone: both valid rows are zone 100, tips 2.0 and 1.0
    let tips = read_parquet(
        storage
            .get("curated/avg_tip_by_zone.parquet")
            .await
            .unwrap(),
    );
    assert_eq!(tips[0].num_rows(), 1);
    let zones = tips[0]
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    let averages = tips[0]
        .column(1)
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    assert_eq!(zones.value(0), 100);
    assert_eq!(averages.value(0), 1.5);

    // A February file lands in its own partition; the aggregates are
    // recomputed over the union of both months
    let february = "raw/2025/02/yellow_tripdata_2025-02.parquet";
    let batch = trip_batch(
        vec![Some("N")],
        vec![5.0],
        vec![20.0],
        vec![1],
        vec![Some(micros(FEB_15_2025, 7_200))],
        vec![1],
        vec![300],
        vec![4.0],
    );
    storage.put(february, to_parquet(&batch)).await.unwrap();
    let outcome = engine.process(february).await.unwrap();
    assert_eq!(
        outcome,
        FileOutcome::Cleaned {
            rows: 1,
            partitions: 1
        }
    );

    let cleaned_keys = storage.list_keys("cleaned/").await.unwrap();
    assert_eq!(cleaned_keys.len(), 2);
    assert!(
        cleaned_keys
            .iter()
            .any(|k| k.starts_with("cleaned/year=2025/month=2/"))
    );

    let revenue = read_parquet(
        storage
            .get("curated/revenue_by_payment_type.parquet")
            .await
            .unwrap(),
    );
    let payments = revenue[0]
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    let sums = revenue[0]
        .column(1)
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    assert_eq!(payments.value(0), 1);
    assert_eq!(sums.value(0), 35.0);

    let trips = read_parquet(
        storage
            .get("curated/total_trips_by_month.parquet")
            .await
            .unwrap(),
    );
    assert_eq!(trips[0].num_rows(), 2);
    let counts = trips[0]
        .column(2)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    assert_eq!(counts.value(0), 2);
    assert_eq!(counts.value(1), 1);
}

#[tokio::test]
async fn test_fully_filtered_file_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let storage = temp_storage(&temp_dir).await;
    let engine = engine(&storage);

    let january = "raw/2025/01/yellow_tripdata_2025-01.parquet";
    storage
        .put(january, to_parquet(&january_fixture()))
        .await
        .unwrap();
    engine.process(january).await.unwrap();

    let revenue_before = storage
        .get("curated/revenue_by_payment_type.parquet")
        .await
        .unwrap();
    let cleaned_before = storage.list_keys("cleaned/").await.unwrap();

    // Every row in this file fails a validity predicate
    let bad = trip_batch(
        vec![Some("N"), Some("Y"), Some("N")],
        vec![-1.0, 2.0, 2.0],
        vec![10.0, -5.0, 10.0],
        vec![1, 1, 0],
        vec![
            Some(micros(JAN_15_2025, 100)),
            Some(micros(JAN_15_2025, 200)),
            Some(micros(JAN_15_2025, 300)),
        ],
        vec![1, 1, 1],
        vec![100, 100, 100],
        vec![0.0, 0.0, 0.0],
    );
    let key = "raw/2025/01/bad.parquet";
    storage.put(key, to_parquet(&bad)).await.unwrap();

    let outcome = engine.process(key).await.unwrap();
    assert_eq!(outcome, FileOutcome::AllRowsFiltered);

    // No cleaned writes, and the curated tables are untouched
    assert_eq!(storage.list_keys("cleaned/").await.unwrap(), cleaned_before);
    let revenue_after = storage
        .get("curated/revenue_by_payment_type.parquet")
        .await
        .unwrap();
    assert_eq!(revenue_before, revenue_after);
}

#[tokio::test]
async fn test_missing_source_object_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let storage = temp_storage(&temp_dir).await;
    let engine = engine(&storage);

    let result = engine.process("raw/2025/01/missing.parquet").await;
    assert!(result.is_err());
}
