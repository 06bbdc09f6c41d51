//! medallion: incremental trip-record ETL over an object store.
//!
//! This library provides the pieces of a raw→cleaned→curated pipeline:
//! a processed-file ledger, a polling orchestrator that drives the
//! transform engine once per newly arrived file, and a bulk uploader for
//! seeding the raw zone.
//!
//! # Example
//!
//! ```ignore
//! use medallion::{Config, Watcher};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), medallion::error::PipelineError> {
//!     let config = Config::from_env()?;
//!     let watcher = Watcher::connect(&config).await?;
//!     watcher.run(CancellationToken::new()).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod seed;
pub mod storage;
pub mod transform;
pub mod watcher;

// Re-export main types
pub use config::Config;
pub use ledger::{ProcessedLedger, ProcessedSet};
pub use storage::{StorageProvider, StorageProviderRef};
pub use transform::{FileOutcome, ProcessFile, TransformEngine};
pub use watcher::{CycleOutcome, CycleStats, Watcher, compute_delta};
