//! Curated aggregate tables, recomputed from the full cleaned dataset.
//!
//! Each aggregate is a full groupBy over everything cleaned so far, written
//! as a single-object overwrite. Their relative write order is irrelevant;
//! each is an independent destination.

use datafusion::arrow::datatypes::{DataType, Schema};
use datafusion::functions_aggregate::expr_fn::{avg, count, sum};
use datafusion::prelude::{DataFrame, ParquetReadOptions, col, lit};
use snafu::prelude::*;
use std::sync::Arc;
use tracing::debug;

use crate::error::{CuratedWriteSnafu, QuerySnafu, TransformError};

use super::{TransformEngine, encode};

impl TransformEngine {
    /// Recompute and overwrite the three curated tables.
    pub(super) async fn refresh_curated(&self) -> Result<(), TransformError> {
        let columns = &self.columns;
        let cleaned = self.read_cleaned().await?;

        let revenue = cleaned
            .clone()
            .aggregate(
                vec![col(columns.payment_type.as_str())],
                vec![sum(col(columns.total_amount.as_str())).alias("total_revenue")],
            )
            .context(QuerySnafu {
                path: &self.layout.cleaned_prefix,
            })?
            .sort(vec![col(columns.payment_type.as_str()).sort(true, true)])
            .context(QuerySnafu {
                path: &self.layout.cleaned_prefix,
            })?;
        self.overwrite_curated(revenue, &self.layout.revenue_by_payment_key())
            .await?;

        let avg_tip = cleaned
            .clone()
            .aggregate(
                vec![col(columns.dropoff_zone.as_str())],
                vec![avg(col(columns.tip_amount.as_str())).alias("avg_tip")],
            )
            .context(QuerySnafu {
                path: &self.layout.cleaned_prefix,
            })?
            .sort(vec![col(columns.dropoff_zone.as_str()).sort(true, true)])
            .context(QuerySnafu {
                path: &self.layout.cleaned_prefix,
            })?;
        self.overwrite_curated(avg_tip, &self.layout.avg_tip_by_zone_key())
            .await?;

        let trips = cleaned
            .aggregate(
                vec![col("year"), col("month")],
                vec![count(lit(1)).alias("trip_count")],
            )
            .context(QuerySnafu {
                path: &self.layout.cleaned_prefix,
            })?
            .sort(vec![
                col("year").sort(true, true),
                col("month").sort(true, true),
            ])
            .context(QuerySnafu {
                path: &self.layout.cleaned_prefix,
            })?;
        self.overwrite_curated(trips, &self.layout.trips_by_month_key())
            .await?;

        Ok(())
    }

    /// Read the whole cleaned table, resolving year/month from the
    /// hive-style partition paths.
    async fn read_cleaned(&self) -> Result<DataFrame, TransformError> {
        let options = ParquetReadOptions::default().table_partition_cols(vec![
            ("year".to_string(), DataType::Int32),
            ("month".to_string(), DataType::Int32),
        ]);
        self.read_parquet(&self.layout.cleaned_prefix, options)
            .await
    }

    /// Collect an aggregate and overwrite its curated object in one PUT.
    async fn overwrite_curated(&self, df: DataFrame, key: &str) -> Result<(), TransformError> {
        let schema = Arc::new(Schema::from(df.schema()));
        let batches = df.collect().await.context(QuerySnafu { path: key })?;
        let body = encode::to_parquet_bytes(schema, &batches)?;

        self.storage
            .put(key, body)
            .await
            .context(CuratedWriteSnafu { key })?;
        debug!("Refreshed curated table {}", key);
        Ok(())
    }
}
