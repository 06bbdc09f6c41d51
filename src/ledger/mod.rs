//! Durable record of which source files have completed processing.
//!
//! The ledger is a single marker object holding a JSON array of source keys
//! in completion order. It is read in full at the start of each cycle and
//! rewritten in full after every successfully processed file, so a crash
//! between a transform and the following save re-processes at most one file
//! on restart (at-least-once, never lost).
//!
//! The save is a plain overwrite PUT with no compare-and-swap, which is only
//! safe under the single-running-instance assumption; concurrent writers
//! would lose each other's updates.

use bytes::Bytes;
use snafu::prelude::*;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::emit;
use crate::error::{DeserializeSnafu, LedgerError, LoadSnafu, SaveSnafu, SerializeSnafu};
use crate::metrics::events::LedgerSaved;
use crate::storage::StorageProviderRef;

/// An insertion-ordered, duplicate-free set of processed source keys.
///
/// Order is historical completion order and is preserved across
/// serialization round trips.
#[derive(Debug, Clone, Default)]
pub struct ProcessedSet {
    keys: Vec<String>,
    index: HashSet<String>,
}

impl ProcessedSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from keys in order, dropping duplicates.
    pub fn from_keys(keys: Vec<String>) -> Self {
        let mut set = Self::new();
        for key in keys {
            set.insert(key);
        }
        set
    }

    /// Record a key as processed. Returns false if it was already present.
    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        let key = key.into();
        if self.index.contains(&key) {
            return false;
        }
        self.index.insert(key.clone());
        self.keys.push(key);
        true
    }

    /// Whether a key has been processed.
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    /// Number of processed keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys in completion order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Serialize as a human-inspectable JSON array.
    ///
    /// Identical sets always produce byte-identical output.
    pub fn to_json(&self) -> Result<Vec<u8>, LedgerError> {
        serde_json::to_vec_pretty(&self.keys).context(SerializeSnafu)
    }

    /// Parse the marker object content.
    pub fn from_json(bytes: &[u8]) -> Result<Self, LedgerError> {
        let keys: Vec<String> = serde_json::from_slice(bytes).context(DeserializeSnafu)?;
        Ok(Self::from_keys(keys))
    }
}

/// Loads and persists the processed-file set through the storage gateway.
pub struct ProcessedLedger {
    storage: StorageProviderRef,
    marker_key: String,
}

impl ProcessedLedger {
    /// Create a ledger bound to a marker key.
    pub fn new(storage: StorageProviderRef, marker_key: impl Into<String>) -> Self {
        Self {
            storage,
            marker_key: marker_key.into(),
        }
    }

    /// The marker object key this ledger reads and writes.
    pub fn marker_key(&self) -> &str {
        &self.marker_key
    }

    /// Fetch the processed set.
    ///
    /// A missing marker is the expected bootstrap state and yields an empty
    /// set. Every other retrieval failure propagates: a transient outage
    /// must not be mistaken for "nothing processed yet", which would
    /// re-process the entire source zone.
    pub async fn load(&self) -> Result<ProcessedSet, LedgerError> {
        match self.storage.get(&self.marker_key).await {
            Ok(bytes) => {
                let set = ProcessedSet::from_json(&bytes)?;
                debug!("Loaded ledger with {} processed files", set.len());
                Ok(set)
            }
            Err(e) if e.is_not_found() => {
                info!(
                    "No ledger marker at {}, starting with empty processed set",
                    self.marker_key
                );
                Ok(ProcessedSet::new())
            }
            Err(e) => Err(e).context(LoadSnafu),
        }
    }

    /// Overwrite the marker object with the full set.
    ///
    /// A single PUT, so readers never observe a partially written marker.
    pub async fn save(&self, set: &ProcessedSet) -> Result<(), LedgerError> {
        let body = set.to_json()?;
        self.storage
            .put(&self.marker_key, Bytes::from(body))
            .await
            .context(SaveSnafu)?;

        emit!(LedgerSaved { entries: set.len() });
        debug!("Saved ledger with {} processed files", set.len());
        Ok(())
    }
}
