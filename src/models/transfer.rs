//! Request and response payloads for uploads, downloads and deletes.

use crate::services::staging::StagingFile;
use serde::Serialize;

/// An uploaded file spooled to local disk, waiting to be stored.
#[derive(Debug)]
pub struct UploadRequest {
    /// Spooled file content. Removed once the request is dropped.
    pub content: StagingFile,

    /// Destination folder, may be empty for the bucket root.
    pub prefix: String,

    /// Filename exactly as the client sent it.
    pub filename: String,
}

/// An object materialized locally for a download response.
#[derive(Debug)]
pub struct StagedDownload {
    pub content: StagingFile,

    /// Filename offered to the client, the last segment of the key.
    pub filename: String,
}

#[derive(Serialize, Debug)]
pub struct UploadResponse {
    pub message: String,
    pub path: String,
}

#[derive(Serialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}
