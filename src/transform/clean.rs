//! Per-file cleaning: normalization, validity filtering, and the
//! partitioned append to the cleaned table.

use datafusion::arrow::array::{Array, Int32Array};
use datafusion::arrow::datatypes::DataType;
use datafusion::functions::expr_fn::{btrim, date_part, upper};
use datafusion::prelude::{ParquetReadOptions, cast, col, lit};
use snafu::prelude::*;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::emit;
use crate::error::{CleanedWriteSnafu, QuerySnafu, TransformError};
use crate::metrics::events::{RowsCleaned, RowsFiltered};

use super::{FileOutcome, TransformEngine, encode};

impl TransformEngine {
    /// Clean one source file and append the surviving rows to the cleaned
    /// table, one parquet object per (year, month) partition.
    ///
    /// Appending means writing a new uniquely named object; existing
    /// partition objects are never touched, so re-running a file cannot
    /// corrupt previously committed data.
    pub(super) async fn clean_file(&self, key: &str) -> Result<FileOutcome, TransformError> {
        let columns = &self.columns;
        let df = self
            .read_parquet(key, ParquetReadOptions::default())
            .await?;

        let initial = df.clone().count().await.context(QuerySnafu { path: key })?;
        debug!("{}: {} rows before filtering", key, initial);

        // Normalize the flag column, then drop rows failing the validity
        // predicates. Rows without a pickup timestamp cannot be assigned a
        // partition and are dropped with the invalid rows.
        let filtered = df
            .with_column(&columns.flag, upper(btrim(vec![col(columns.flag.as_str())])))
            .context(QuerySnafu { path: key })?
            .filter(
                col(columns.distance.as_str())
                    .gt_eq(lit(0.0))
                    .and(col(columns.total_amount.as_str()).gt_eq(lit(0.0)))
                    .and(col(columns.passenger_count.as_str()).gt(lit(0)))
                    .and(col(columns.pickup_timestamp.as_str()).is_not_null()),
            )
            .context(QuerySnafu { path: key })?;

        let kept = filtered
            .clone()
            .count()
            .await
            .context(QuerySnafu { path: key })?;
        let dropped = initial.saturating_sub(kept);
        emit!(RowsFiltered {
            count: dropped as u64
        });

        if kept == 0 {
            warn!("{}: all {} rows were filtered out", key, initial);
            return Ok(FileOutcome::AllRowsFiltered);
        }
        debug!("{}: {} rows after filtering", key, kept);

        // Derive the temporal partition attributes.
        let partitioned = filtered
            .with_column(
                "year",
                cast(
                    date_part(lit("year"), col(columns.pickup_timestamp.as_str())),
                    DataType::Int32,
                ),
            )
            .context(QuerySnafu { path: key })?
            .with_column(
                "month",
                cast(
                    date_part(lit("month"), col(columns.pickup_timestamp.as_str())),
                    DataType::Int32,
                ),
            )
            .context(QuerySnafu { path: key })?;

        let partitions = self.partition_values(&partitioned, key).await?;

        for &(year, month) in &partitions {
            let slice = partitioned
                .clone()
                .filter(col("year").eq(lit(year)).and(col("month").eq(lit(month))))
                .context(QuerySnafu { path: key })?
                // Partition attributes live in the object path, not the data.
                .drop_columns(&["year", "month"])
                .context(QuerySnafu { path: key })?;

            let schema = std::sync::Arc::new(datafusion::arrow::datatypes::Schema::from(
                slice.schema(),
            ));
            let batches = slice.collect().await.context(QuerySnafu { path: key })?;
            let body = encode::to_parquet_bytes(schema, &batches)?;

            let object_key = format!(
                "{}year={}/month={}/part-{}.parquet",
                self.layout.cleaned_prefix,
                year,
                month,
                Uuid::new_v4()
            );
            self.storage
                .put(&object_key, body)
                .await
                .context(CleanedWriteSnafu {
                    key: object_key.clone(),
                })?;
            debug!("{}: wrote cleaned partition {}", key, object_key);
        }

        emit!(RowsCleaned { count: kept as u64 });
        info!(
            "{}: cleaned {} rows into {} partition(s)",
            key,
            kept,
            partitions.len()
        );

        Ok(FileOutcome::Cleaned {
            rows: kept,
            partitions: partitions.len(),
        })
    }

    /// Distinct (year, month) pairs present in the cleaned rows.
    async fn partition_values(
        &self,
        df: &datafusion::prelude::DataFrame,
        key: &str,
    ) -> Result<Vec<(i32, i32)>, TransformError> {
        let batches = df
            .clone()
            .select(vec![col("year"), col("month")])
            .context(QuerySnafu { path: key })?
            .distinct()
            .context(QuerySnafu { path: key })?
            .collect()
            .await
            .context(QuerySnafu { path: key })?;

        let mut pairs = Vec::new();
        for batch in &batches {
            let years = batch
                .column(0)
                .as_any()
                .downcast_ref::<Int32Array>()
                .expect("year column must be Int32");
            let months = batch
                .column(1)
                .as_any()
                .downcast_ref::<Int32Array>()
                .expect("month column must be Int32");
            for i in 0..batch.num_rows() {
                if years.is_valid(i) && months.is_valid(i) {
                    pairs.push((years.value(i), months.value(i)));
                }
            }
        }
        pairs.sort_unstable();
        Ok(pairs)
    }
}
