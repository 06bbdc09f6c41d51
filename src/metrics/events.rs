//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the pipeline.
//! Events implement the `InternalEvent` trait which emits the corresponding
//! Prometheus metric.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Outcome of processing one source file.
#[derive(Debug, Clone, Copy)]
pub enum FileStatus {
    Success,
    Filtered,
    Failed,
}

impl FileStatus {
    fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Success => "success",
            FileStatus::Filtered => "filtered",
            FileStatus::Failed => "failed",
        }
    }
}

/// Event emitted when a source file finishes processing.
pub struct FileProcessed {
    pub status: FileStatus,
}

impl InternalEvent for FileProcessed {
    fn emit(self) {
        trace!(status = self.status.as_str(), "File processed");
        counter!("medallion_files_processed_total", "status" => self.status.as_str()).increment(1);
    }
}

/// Event emitted when a discovery listing completes.
pub struct FilesDiscovered {
    pub total: usize,
    pub pending: usize,
}

impl InternalEvent for FilesDiscovered {
    fn emit(self) {
        trace!(
            total = self.total,
            pending = self.pending,
            "Files discovered"
        );
        gauge!("medallion_files_discovered").set(self.total as f64);
        gauge!("medallion_files_pending").set(self.pending as f64);
    }
}

/// Event emitted when cleaned rows are written.
pub struct RowsCleaned {
    pub count: u64,
}

impl InternalEvent for RowsCleaned {
    fn emit(self) {
        trace!(count = self.count, "Rows cleaned");
        counter!("medallion_rows_cleaned_total").increment(self.count);
    }
}

/// Event emitted when invalid rows are dropped by the validity filter.
pub struct RowsFiltered {
    pub count: u64,
}

impl InternalEvent for RowsFiltered {
    fn emit(self) {
        trace!(count = self.count, "Rows filtered");
        counter!("medallion_rows_filtered_total").increment(self.count);
    }
}

/// Event emitted when the ledger is persisted.
pub struct LedgerSaved {
    pub entries: usize,
}

impl InternalEvent for LedgerSaved {
    fn emit(self) {
        trace!(entries = self.entries, "Ledger saved");
        counter!("medallion_ledger_saves_total").increment(1);
        gauge!("medallion_ledger_entries").set(self.entries as f64);
    }
}

/// Result classification for a completed polling cycle.
#[derive(Debug, Clone, Copy)]
pub enum CycleResultType {
    Processed,
    NoNewFiles,
    Error,
}

impl CycleResultType {
    fn as_str(&self) -> &'static str {
        match self {
            CycleResultType::Processed => "processed",
            CycleResultType::NoNewFiles => "no_new_files",
            CycleResultType::Error => "error",
        }
    }
}

/// Event emitted when a polling cycle completes.
pub struct CycleCompleted {
    pub result: CycleResultType,
}

impl InternalEvent for CycleCompleted {
    fn emit(self) {
        trace!(result = self.result.as_str(), "Cycle completed");
        counter!("medallion_cycles_total", "result" => self.result.as_str()).increment(1);
    }
}

/// Event emitted with the wall-clock duration of a polling cycle.
pub struct CycleDuration {
    pub duration: Duration,
}

impl InternalEvent for CycleDuration {
    fn emit(self) {
        trace!(duration_ms = self.duration.as_millis(), "Cycle duration");
        histogram!("medallion_cycle_duration_seconds").record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Storage operation events
// ============================================================================

/// Storage operation types.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    Put,
    Head,
    List,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
            StorageOperation::Head => "head",
            StorageOperation::List => "list",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted when a storage request completes.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            "Storage request"
        );
        counter!(
            "medallion_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when a storage request completes with duration.
pub struct StorageRequestDuration {
    pub operation: StorageOperation,
    pub duration: Duration,
}

impl InternalEvent for StorageRequestDuration {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            duration_ms = self.duration.as_millis(),
            "Storage request duration"
        );
        histogram!(
            "medallion_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}
