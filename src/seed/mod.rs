//! Bulk upload of a local directory into the raw zone.
//!
//! Files carrying a `YYYY-MM` token in their name are routed into a
//! year/month-segmented namespace under the source prefix; anything else
//! lands directly under the prefix with its original name. Uploads are
//! idempotent: objects that already exist are skipped.

use bytes::Bytes;
use regex::Regex;
use snafu::prelude::*;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{info, warn};

use crate::error::{ReadDirSnafu, ReadLocalSnafu, SeedError, UploadSnafu};
use crate::storage::StorageProviderRef;

static YEAR_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})-(\d{2})").expect("Invalid year-month pattern"));

/// Counters for a seed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedStats {
    pub uploaded: usize,
    pub skipped: usize,
}

/// Compute the raw-zone key for a local file name.
///
/// `yellow_tripdata_2025-01.parquet` maps to
/// `raw/2025/01/yellow_tripdata_2025-01.parquet`; names without the
/// `YYYY-MM` token fall back to `raw/<name>`.
pub fn route_key(raw_prefix: &str, file_name: &str) -> String {
    match YEAR_MONTH.captures(file_name) {
        Some(captures) => {
            let year = captures.get(1).unwrap().as_str();
            let month = captures.get(2).unwrap().as_str();
            format!("{raw_prefix}{year}/{month}/{file_name}")
        }
        None => format!("{raw_prefix}{file_name}"),
    }
}

/// Upload every parquet file under `data_dir` into the raw zone.
pub async fn seed_raw_zone(
    storage: &StorageProviderRef,
    raw_prefix: &str,
    data_dir: &Path,
    suffix: &str,
) -> Result<SeedStats, SeedError> {
    let dir_display = data_dir.display().to_string();
    let mut entries = tokio::fs::read_dir(data_dir).await.context(ReadDirSnafu {
        path: dir_display.clone(),
    })?;

    let mut stats = SeedStats::default();

    while let Some(entry) = entries.next_entry().await.context(ReadDirSnafu {
        path: dir_display.clone(),
    })? {
        let file_name = entry.file_name().to_string_lossy().to_string();
        if !file_name.ends_with(suffix) {
            continue;
        }
        let file_type = entry.file_type().await.context(ReadDirSnafu {
            path: dir_display.clone(),
        })?;
        if !file_type.is_file() {
            continue;
        }

        let key = route_key(raw_prefix, &file_name);

        let exists = storage
            .exists(&key)
            .await
            .context(UploadSnafu { key: key.clone() })?;
        if exists {
            info!("Skipping {} - already exists at {}", file_name, key);
            stats.skipped += 1;
            continue;
        }

        let body = tokio::fs::read(entry.path()).await.context(ReadLocalSnafu {
            path: entry.path().display().to_string(),
        })?;

        info!("Uploading {} to {}", file_name, key);
        storage
            .put(&key, Bytes::from(body))
            .await
            .context(UploadSnafu { key: key.clone() })?;
        stats.uploaded += 1;
    }

    if stats.uploaded == 0 && stats.skipped == 0 {
        warn!("No {} files found under {}", suffix, dir_display);
    }
    info!(
        "Seed complete: {} uploaded, {} skipped",
        stats.uploaded, stats.skipped
    );

    Ok(stats)
}
