//! The object-storage collaborator seen by the gateway.
//!
//! `ObjectBackend` is the narrow surface the handlers need from a bucket:
//! prefix listing with cursor pagination, put/get through local files, and
//! single or bulk deletes. The bucket itself is bound into each
//! implementation when it is constructed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{io, path::Path};
use thiserror::Error;

/// Objects at or above this size are transferred in segments.
pub const MULTIPART_THRESHOLD: u64 = 8 * 1024 * 1024;
/// Size of each transferred segment.
pub const MULTIPART_CHUNK_SIZE: u64 = 8 * 1024 * 1024;
/// Upper bound on segments in flight for a single transfer.
pub const MAX_TRANSFER_CONCURRENCY: usize = 10;
/// Most keys a single bulk delete call accepts.
pub const DELETE_BATCH_LIMIT: usize = 1000;

/// Tuning for segmented uploads and downloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferOptions {
    pub multipart_threshold: u64,
    pub chunk_size: u64,
    pub max_concurrency: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            multipart_threshold: MULTIPART_THRESHOLD,
            chunk_size: MULTIPART_CHUNK_SIZE,
            max_concurrency: MAX_TRANSFER_CONCURRENCY,
        }
    }
}

impl TransferOptions {
    pub fn is_segmented(&self, size: u64) -> bool {
        size >= self.multipart_threshold && self.chunk_size > 0
    }

    /// Inclusive byte ranges covering `size` bytes in `chunk_size` steps.
    pub fn segments(&self, size: u64) -> Vec<(u64, u64)> {
        let step = self.chunk_size.max(1);
        (0..size)
            .step_by(step as usize)
            .map(|start| (start, (start + step).min(size) - 1))
            .collect()
    }
}

/// One object returned by a listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// One page of a prefix listing.
#[derive(Clone, Debug, Default)]
pub struct ListPage {
    pub common_prefixes: Vec<String>,
    pub objects: Vec<ObjectSummary>,
    /// Cursor for the next page, `None` once the listing is exhausted.
    pub next_token: Option<String>,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0}")]
    Service(String),
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("failed to delete {failed} object(s): {message}")]
    PartialDelete { failed: usize, message: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BackendResult<T> = Result<T, BackendError>;

#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// List one page under `prefix`. With a delimiter, keys are grouped into
    /// common prefixes one level below `prefix`.
    async fn list_prefixed(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        continuation_token: Option<String>,
    ) -> BackendResult<ListPage>;

    /// Store the contents of the local file `source` under `key`, replacing
    /// any existing object.
    async fn put_object(
        &self,
        key: &str,
        source: &Path,
        transfer: &TransferOptions,
    ) -> BackendResult<()>;

    /// Materialize `key` into the local file `destination`.
    async fn get_object(
        &self,
        key: &str,
        destination: &Path,
        transfer: &TransferOptions,
    ) -> BackendResult<()>;

    /// Delete one key. Deleting a missing key succeeds.
    async fn delete_object(&self, key: &str) -> BackendResult<()>;

    /// Delete a batch of at most [`DELETE_BATCH_LIMIT`] keys.
    async fn delete_objects(&self, keys: &[String]) -> BackendResult<()>;
}
