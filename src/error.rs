//! Error types for medallion using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error"))]
    S3Config { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    ///
    /// Callers use this to distinguish the expected bootstrap case (no marker
    /// object yet) from transient storage outages, which must never be
    /// collapsed into "nothing there".
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Storage URL is empty.
    #[snafu(display("Storage URL cannot be empty"))]
    EmptyStorageUrl,

    /// Poll interval must be positive.
    #[snafu(display("Poll interval must be at least 1 second"))]
    ZeroPollInterval,

    /// Required environment variable is missing.
    #[snafu(display("Required environment variable '{name}' is not set"))]
    MissingEnv { name: String },

    /// Environment variable holds a value that does not parse.
    #[snafu(display("Environment variable '{name}' is not a valid integer"))]
    InvalidEnvInt {
        name: String,
        source: std::num::ParseIntError,
    },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

// ============ Ledger Errors ============

/// Errors that can occur while loading or persisting the processed-file ledger.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LedgerError {
    /// Failed to fetch the marker object (not the bootstrap "missing" case,
    /// which is handled by the ledger itself).
    #[snafu(display("Failed to load ledger marker"))]
    Load { source: StorageError },

    /// Failed to persist the marker object.
    #[snafu(display("Failed to save ledger marker"))]
    Save { source: StorageError },

    /// Marker content is not a valid JSON array of strings.
    #[snafu(display("Ledger marker is corrupt"))]
    Deserialize { source: serde_json::Error },

    /// Failed to serialize the processed set.
    #[snafu(display("Failed to serialize ledger"))]
    Serialize { source: serde_json::Error },
}

// ============ Transform Errors ============

/// Errors that can occur while cleaning a file or refreshing curated tables.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransformError {
    /// The query engine failed to plan or execute.
    #[snafu(display("Query engine failure for {path}"))]
    Query {
        path: String,
        source: datafusion::error::DataFusionError,
    },

    /// Failed to encode record batches as parquet.
    #[snafu(display("Parquet encoding failed"))]
    ParquetEncode {
        source: datafusion::parquet::errors::ParquetError,
    },

    /// Failed to write a cleaned partition object.
    #[snafu(display("Failed to write cleaned partition {key}"))]
    CleanedWrite { key: String, source: StorageError },

    /// Failed to overwrite a curated aggregate object.
    #[snafu(display("Failed to write curated table {key}"))]
    CuratedWrite { key: String, source: StorageError },

    /// Could not build a table URL for the engine.
    #[snafu(display("Invalid table URL"))]
    TableUrl { source: url::ParseError },
}

// ============ Seed Errors ============

/// Errors that can occur during the bulk raw-zone upload.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SeedError {
    /// Failed to read the local data directory.
    #[snafu(display("Failed to read data directory {path}"))]
    ReadDir {
        path: String,
        source: std::io::Error,
    },

    /// Failed to read a local file.
    #[snafu(display("Failed to read local file {path}"))]
    ReadLocal {
        path: String,
        source: std::io::Error,
    },

    /// Existence check or upload failed.
    #[snafu(display("Failed to upload {key}"))]
    Upload { key: String, source: StorageError },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Pipeline Error (top-level) ============

/// Top-level errors that aggregate all error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Storage error.
    #[snafu(display("Storage error"))]
    PipelineStorage { source: StorageError },

    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Ledger error.
    #[snafu(display("Ledger error"))]
    Ledger { source: LedgerError },

    /// Transform error.
    #[snafu(display("Transform engine error"))]
    Transform { source: TransformError },

    /// Seed error.
    #[snafu(display("Seed error"))]
    Seed { source: SeedError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },

    /// Address parsing error.
    #[snafu(display("Failed to parse address"))]
    AddressParse { source: std::net::AddrParseError },
}

impl PipelineError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            PipelineError::PipelineStorage { source } => source.is_not_found(),
            _ => false,
        }
    }
}
