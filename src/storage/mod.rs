//! Object storage gateway.
//!
//! Provides a unified interface over S3 and the local filesystem. The rest
//! of the pipeline only ever lists by prefix, gets, puts, and checks
//! existence of whole objects; nothing here knows about parquet or JSON.

mod local;
mod s3;

use bytes::Bytes;
use futures::StreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use regex::Regex;
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::emit;
use crate::error::{InvalidUrlSnafu, ObjectStoreSnafu, StorageError};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};

pub use local::LocalConfig;
pub use s3::S3Config;

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Storage provider that abstracts over the supported backends.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
    pub(crate) storage_options: HashMap<String, String>,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

// URL patterns for the supported backends
const S3_URL: &str = r"^[sS]3[aA]?://(?P<bucket>[a-z0-9\-\.]+)/?$";
const S3_PATH: &str = r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)/?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?<protocol>https?)://(?P<endpoint>[^:/]+):(?<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)/?$";

const FILE_URI: &str = r"^file://(?P<path>/.*)$";
const FILE_PATH: &str = r"^(?P<path>/.*)$";

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
enum Backend {
    S3,
    Local,
}

fn matchers() -> &'static Vec<(Backend, Regex)> {
    static MATCHERS: OnceLock<Vec<(Backend, Regex)>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        vec![
            (Backend::S3, Regex::new(S3_URL).unwrap()),
            (Backend::S3, Regex::new(S3_PATH).unwrap()),
            (Backend::S3, Regex::new(S3_ENDPOINT_URL).unwrap()),
            (Backend::Local, Regex::new(FILE_URI).unwrap()),
            (Backend::Local, Regex::new(FILE_PATH).unwrap()),
        ]
    })
}

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Local(LocalConfig),
}

impl BackendConfig {
    /// Parse a container URL into a backend configuration.
    ///
    /// The URL identifies the container (bucket or base directory) only;
    /// the pipeline's zones are prefixes within it.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        for (backend, regex) in matchers() {
            if let Some(captures) = regex.captures(url) {
                return match backend {
                    Backend::S3 => Ok(Self::parse_s3(captures)),
                    Backend::Local => Ok(Self::parse_local(captures)),
                };
            }
        }

        InvalidUrlSnafu {
            url: url.to_string(),
        }
        .fail()
    }

    fn parse_s3(matches: regex::Captures) -> Self {
        let bucket = matches
            .name("bucket")
            .expect("bucket should always be available")
            .as_str()
            .to_string();

        let region = std::env::var("AWS_DEFAULT_REGION")
            .ok()
            .or_else(|| matches.name("region").map(|m| m.as_str().to_string()));

        let endpoint = std::env::var("AWS_ENDPOINT").ok().or_else(|| {
            matches.name("endpoint").map(|endpoint| {
                let port = matches
                    .name("port")
                    .and_then(|p| p.as_str().parse::<u16>().ok())
                    .unwrap_or(443);
                let protocol = matches
                    .name("protocol")
                    .map(|p| p.as_str())
                    .unwrap_or("https");
                format!("{}://{}:{}", protocol, endpoint.as_str(), port)
            })
        });

        BackendConfig::S3(S3Config {
            endpoint,
            region,
            bucket,
        })
    }

    fn parse_local(matches: regex::Captures) -> Self {
        let path = matches
            .name("path")
            .expect("path regex must contain a path group")
            .as_str()
            .to_string();

        BackendConfig::Local(LocalConfig { path })
    }
}

impl StorageProvider {
    /// Create a storage provider for the given container URL.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let config = BackendConfig::parse_url(url)?;

        match config {
            BackendConfig::S3(config) => Self::construct_s3(config, options).await,
            BackendConfig::Local(config) => Self::construct_local(config).await,
        }
    }

    /// List all object keys under a prefix, in lexical key order.
    ///
    /// Paging is handled by the underlying store; callers see one flat,
    /// complete listing regardless of size.
    pub async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let start = Instant::now();
        let prefix_path = Path::from(prefix);
        let mut stream = self.object_store.list(Some(&prefix_path));

        let mut keys = Vec::new();
        let mut status = RequestStatus::Success;
        let mut failure = None;
        while let Some(result) = stream.next().await {
            match result {
                Ok(meta) => keys.push(meta.location.to_string()),
                Err(e) => {
                    status = RequestStatus::Error;
                    failure = Some(e);
                    break;
                }
            }
        }

        emit!(StorageRequest {
            operation: StorageOperation::List,
            status,
        });
        emit!(StorageRequestDuration {
            operation: StorageOperation::List,
            duration: start.elapsed(),
        });

        if let Some(e) = failure {
            return Err(e).context(ObjectStoreSnafu);
        }

        // Local listings are not ordered; sort for a stable processing order.
        keys.sort();
        Ok(keys)
    }

    /// Get the contents of an object.
    pub async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = Path::from(key);
        let start = Instant::now();
        let result = self.object_store.get(&path).await;

        self.emit_request(StorageOperation::Get, result.is_ok(), start);

        let bytes = result
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)?;
        Ok(bytes)
    }

    /// Put bytes to an object key, overwriting any existing object.
    pub async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        let path = Path::from(key);
        let start = Instant::now();
        let result = self.object_store.put(&path, PutPayload::from(bytes)).await;

        self.emit_request(StorageOperation::Put, result.is_ok(), start);

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Check whether an object exists.
    pub async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = Path::from(key);
        let start = Instant::now();
        let result = self.object_store.head(&path).await;

        self.emit_request(StorageOperation::Head, result.is_ok(), start);

        match result {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e).context(ObjectStoreSnafu),
        }
    }

    fn emit_request(&self, operation: StorageOperation, ok: bool, start: Instant) {
        let status = if ok {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        };
        emit!(StorageRequest { operation, status });
        emit!(StorageRequestDuration {
            operation,
            duration: start.elapsed(),
        });
    }

    /// The raw object store, for registration with the query engine.
    pub fn object_store(&self) -> Arc<dyn ObjectStore> {
        self.object_store.clone()
    }

    /// Base URL under which the query engine resolves this container.
    ///
    /// Always ends with a slash so keys can be appended directly. For the
    /// local backend the container root maps to the URL root, matching the
    /// prefixed object store registered with the engine.
    pub fn base_url(&self) -> String {
        match &self.config {
            BackendConfig::S3(s3) => format!("s3://{}/", s3.bucket),
            BackendConfig::Local(_) => "file:///".to_string(),
        }
    }

    /// Query-engine URL for an object or prefix within this container.
    pub fn table_url(&self, key: &str) -> String {
        format!("{}{}", self.base_url(), key)
    }

    /// Get the storage options the provider was constructed with.
    pub fn storage_options(&self) -> &HashMap<String, String> {
        &self.storage_options
    }

    /// Get the backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }
}
