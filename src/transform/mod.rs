//! Table transform engine.
//!
//! Wraps a DataFusion session over the storage gateway. Each source file is
//! cleaned and appended to the partitioned cleaned table, after which the
//! curated aggregate tables are recomputed from the full cleaned dataset and
//! overwritten.
//!
//! The transform is deterministic and independent of prior invocations:
//! re-running a file that previously failed mid-way only re-appends that
//! file's partitions and re-derives the curated outputs.

mod clean;
mod curated;
mod encode;

use async_trait::async_trait;
use datafusion::prelude::{ParquetReadOptions, SessionContext};
use snafu::prelude::*;
use url::Url;

use crate::config::{ColumnsConfig, LayoutConfig};
use crate::error::{QuerySnafu, TableUrlSnafu, TransformError};
use crate::storage::StorageProviderRef;

/// Result of transforming a single source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Rows were cleaned and appended; curated tables were refreshed.
    Cleaned { rows: usize, partitions: usize },
    /// Every row failed the validity predicates; nothing was written.
    AllRowsFiltered,
}

/// Per-file processing seam between the orchestrator and the engine.
#[async_trait]
pub trait ProcessFile: Send + Sync {
    /// Transform one source file, identified by its storage key.
    async fn process(&self, key: &str) -> Result<FileOutcome, TransformError>;
}

/// DataFusion-backed transform engine.
pub struct TransformEngine {
    ctx: SessionContext,
    storage: StorageProviderRef,
    layout: LayoutConfig,
    columns: ColumnsConfig,
}

impl TransformEngine {
    /// Create an engine over the given container.
    pub fn new(
        storage: StorageProviderRef,
        layout: LayoutConfig,
        columns: ColumnsConfig,
    ) -> Result<Self, TransformError> {
        let ctx = SessionContext::new();

        let base = Url::parse(&storage.base_url()).context(TableUrlSnafu)?;
        ctx.register_object_store(&base, storage.object_store());

        Ok(Self {
            ctx,
            storage,
            layout,
            columns,
        })
    }

    /// Read a parquet object or prefix into a DataFrame.
    pub(crate) async fn read_parquet(
        &self,
        key: &str,
        options: ParquetReadOptions<'_>,
    ) -> Result<datafusion::prelude::DataFrame, TransformError> {
        let url = self.storage.table_url(key);
        self.ctx
            .read_parquet(url, options)
            .await
            .context(QuerySnafu { path: key })
    }
}

#[async_trait]
impl ProcessFile for TransformEngine {
    async fn process(&self, key: &str) -> Result<FileOutcome, TransformError> {
        let outcome = self.clean_file(key).await?;

        if let FileOutcome::Cleaned { .. } = outcome {
            self.refresh_curated().await?;
        }

        Ok(outcome)
    }
}
