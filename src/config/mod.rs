//! Configuration loading and validation.
//!
//! Configuration comes from a YAML file with environment-variable
//! interpolation, or directly from the environment for the minimal
//! bucket/credentials/interval surface. It is loaded once at startup and
//! never mutated afterwards.

mod vars;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{
    ConfigError, EmptyStorageUrlSnafu, EnvInterpolationSnafu, InvalidEnvIntSnafu, MissingEnvSnafu,
    ReadFileSnafu, YamlParseSnafu, ZeroPollIntervalSnafu,
};

/// Main configuration structure for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub columns: ColumnsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Storage backend location and options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Bucket or directory URL, e.g. "s3://trip-data" or "/var/lib/medallion".
    pub url: String,

    /// Storage options (credentials, region, endpoint, etc.)
    #[serde(default)]
    pub options: HashMap<String, String>,
}

/// Source zone configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Prefix under which raw files arrive.
    #[serde(default = "default_raw_prefix")]
    pub prefix: String,

    /// File suffix that identifies processable objects.
    #[serde(default = "default_suffix")]
    pub suffix: String,

    /// Interval in seconds between polls for new files (default: 60).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            prefix: default_raw_prefix(),
            suffix: default_suffix(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_raw_prefix() -> String {
    "raw/".to_string()
}

fn default_suffix() -> String {
    ".parquet".to_string()
}

fn default_poll_interval_secs() -> u64 {
    60
}

/// Ledger (processed-file marker) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Key of the marker object holding the processed-file set.
    #[serde(default = "default_marker_key")]
    pub marker_key: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            marker_key: default_marker_key(),
        }
    }
}

fn default_marker_key() -> String {
    "metadata/processed_files.json".to_string()
}

/// Destination layout for cleaned and curated zones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Prefix of the partitioned cleaned table.
    #[serde(default = "default_cleaned_prefix")]
    pub cleaned_prefix: String,

    /// Prefix under which curated aggregate objects are written.
    #[serde(default = "default_curated_prefix")]
    pub curated_prefix: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            cleaned_prefix: default_cleaned_prefix(),
            curated_prefix: default_curated_prefix(),
        }
    }
}

fn default_cleaned_prefix() -> String {
    "cleaned/".to_string()
}

fn default_curated_prefix() -> String {
    "curated/".to_string()
}

impl LayoutConfig {
    /// Key of the revenue-by-payment-type curated object.
    pub fn revenue_by_payment_key(&self) -> String {
        format!("{}revenue_by_payment_type.parquet", self.curated_prefix)
    }

    /// Key of the average-tip-by-zone curated object.
    pub fn avg_tip_by_zone_key(&self) -> String {
        format!("{}avg_tip_by_zone.parquet", self.curated_prefix)
    }

    /// Key of the trip-count-by-month curated object.
    pub fn trips_by_month_key(&self) -> String {
        format!("{}total_trips_by_month.parquet", self.curated_prefix)
    }
}

/// Column names in the trip-record schema.
///
/// Defaults match the NYC TLC yellow-taxi layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnsConfig {
    #[serde(default = "default_flag_column")]
    pub flag: String,
    #[serde(default = "default_distance_column")]
    pub distance: String,
    #[serde(default = "default_total_amount_column")]
    pub total_amount: String,
    #[serde(default = "default_passenger_count_column")]
    pub passenger_count: String,
    #[serde(default = "default_pickup_column")]
    pub pickup_timestamp: String,
    #[serde(default = "default_payment_type_column")]
    pub payment_type: String,
    #[serde(default = "default_dropoff_zone_column")]
    pub dropoff_zone: String,
    #[serde(default = "default_tip_amount_column")]
    pub tip_amount: String,
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        Self {
            flag: default_flag_column(),
            distance: default_distance_column(),
            total_amount: default_total_amount_column(),
            passenger_count: default_passenger_count_column(),
            pickup_timestamp: default_pickup_column(),
            payment_type: default_payment_type_column(),
            dropoff_zone: default_dropoff_zone_column(),
            tip_amount: default_tip_amount_column(),
        }
    }
}

fn default_flag_column() -> String {
    "store_and_fwd_flag".to_string()
}

fn default_distance_column() -> String {
    "trip_distance".to_string()
}

fn default_total_amount_column() -> String {
    "total_amount".to_string()
}

fn default_passenger_count_column() -> String {
    "passenger_count".to_string()
}

fn default_pickup_column() -> String {
    "tpep_pickup_datetime".to_string()
}

fn default_payment_type_column() -> String {
    "payment_type".to_string()
}

fn default_dropoff_zone_column() -> String {
    "DOLocationID".to_string()
}

fn default_tip_amount_column() -> String {
    "tip_amount".to_string()
}

/// Metrics configuration for the Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

impl Config {
    /// Load configuration from a YAML file with env interpolation.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;

        let result = vars::interpolate(&content);
        if !result.is_ok() {
            let message = result.errors.join("\n");
            return EnvInterpolationSnafu { message }.fail();
        }

        let config: Config = serde_yaml::from_str(&result.text).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from the environment alone.
    ///
    /// Covers the minimal deployment surface: `BUCKET_NAME` (required),
    /// `ACCESS_KEY` / `SECRET_KEY` (optional, otherwise the ambient AWS
    /// credential chain applies), `POLL_INTERVAL_SECONDS` (default 60).
    pub fn from_env() -> Result<Self, ConfigError> {
        let bucket = std::env::var("BUCKET_NAME").ok().context(MissingEnvSnafu {
            name: "BUCKET_NAME",
        })?;

        let mut options = HashMap::new();
        if let Ok(access_key) = std::env::var("ACCESS_KEY") {
            options.insert("aws_access_key_id".to_string(), access_key);
        }
        if let Ok(secret_key) = std::env::var("SECRET_KEY") {
            options.insert("aws_secret_access_key".to_string(), secret_key);
        }

        let poll_interval_secs = match std::env::var("POLL_INTERVAL_SECONDS") {
            Ok(raw) => raw.parse::<u64>().context(InvalidEnvIntSnafu {
                name: "POLL_INTERVAL_SECONDS",
            })?,
            Err(_) => default_poll_interval_secs(),
        };

        let config = Config {
            storage: StorageConfig {
                url: format!("s3://{bucket}"),
                options,
            },
            source: SourceConfig {
                poll_interval_secs,
                ..SourceConfig::default()
            },
            ledger: LedgerConfig::default(),
            layout: LayoutConfig::default(),
            columns: ColumnsConfig::default(),
            metrics: MetricsConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.storage.url.is_empty(), EmptyStorageUrlSnafu);
        ensure!(self.source.poll_interval_secs > 0, ZeroPollIntervalSnafu);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_yaml_parsing() {
        let yaml = r#"
storage:
  url: "s3://trip-data"

source:
  prefix: "incoming/"
  poll_interval_secs: 30
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.storage.url, "s3://trip-data");
        assert_eq!(config.source.prefix, "incoming/");
        assert_eq!(config.source.poll_interval_secs, 30);
        // Untouched sections fall back to defaults
        assert_eq!(config.ledger.marker_key, "metadata/processed_files.json");
        assert_eq!(config.layout.cleaned_prefix, "cleaned/");
        assert_eq!(config.columns.flag, "store_and_fwd_flag");
    }

    #[test]
    fn test_config_defaults() {
        let yaml = r#"
storage:
  url: "/var/lib/medallion"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.source.prefix, "raw/");
        assert_eq!(config.source.suffix, ".parquet");
        assert_eq!(config.source.poll_interval_secs, 60);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_curated_keys() {
        let layout = LayoutConfig::default();
        assert_eq!(
            layout.revenue_by_payment_key(),
            "curated/revenue_by_payment_type.parquet"
        );
        assert_eq!(layout.avg_tip_by_zone_key(), "curated/avg_tip_by_zone.parquet");
        assert_eq!(
            layout.trips_by_month_key(),
            "curated/total_trips_by_month.parquet"
        );
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let yaml = r#"
storage:
  url: "s3://trip-data"
source:
  poll_interval_secs: 0
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }
}
