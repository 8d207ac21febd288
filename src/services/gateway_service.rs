//! GatewayService — the four bucket operations behind the HTTP API.
//!
//! Each method validates its input, calls the injected `ObjectBackend`, and
//! projects the result into the gateway's models. No state is kept between
//! calls; the service is cheap to clone and shared as router state.

use crate::{
    errors::{GatewayError, GatewayResult},
    models::{
        listing::{FileEntry, FolderEntry, Listing},
        transfer::{StagedDownload, UploadRequest},
    },
    services::{
        backend::{DELETE_BATCH_LIMIT, ObjectBackend, TransferOptions},
        staging::StagingFile,
    },
};
use std::{path::PathBuf, sync::Arc};
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

const DELIMITER: &str = "/";

#[derive(Clone)]
pub struct GatewayService {
    /// Shared backend client bound to a single bucket.
    pub backend: Arc<dyn ObjectBackend>,

    /// Directory where uploads are spooled and downloads are staged.
    pub staging_dir: PathBuf,

    pub transfer: TransferOptions,
}

impl GatewayService {
    pub fn new(backend: Arc<dyn ObjectBackend>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            staging_dir: staging_dir.into(),
            transfer: TransferOptions::default(),
        }
    }

    #[cfg(test)]
    pub fn with_transfer(mut self, transfer: TransferOptions) -> Self {
        self.transfer = transfer;
        self
    }

    /// Allocate a staging file in the service's staging directory.
    pub fn staging_file(&self) -> GatewayResult<StagingFile> {
        Ok(StagingFile::create_in(&self.staging_dir)?)
    }

    /// List the folders and files directly below `prefix`.
    ///
    /// Follows continuation tokens until the backend reports no more pages.
    /// Keys ending in `/` are folder markers and never appear as files.
    pub async fn list(&self, prefix: Option<&str>) -> GatewayResult<Listing> {
        let prefix = prefix.unwrap_or_default();

        let mut listing = Listing::default();
        let mut token = None;
        loop {
            let page = self
                .backend
                .list_prefixed(prefix, Some(DELIMITER), token)
                .await
                .map_err(GatewayError::backend("Failed to load directory: "))?;

            listing.folders.extend(
                page.common_prefixes
                    .iter()
                    .map(|p| FolderEntry::from_prefix(p)),
            );
            listing
                .files
                .extend(page.objects.into_iter().filter_map(FileEntry::from_summary));

            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        debug!(
            "listed `{}`: {} folders, {} files",
            prefix,
            listing.folders.len(),
            listing.files.len()
        );
        Ok(listing)
    }

    /// Store an uploaded file under `prefix`, overwriting any existing object.
    ///
    /// Returns the key the file was written to.
    pub async fn upload(&self, request: Option<UploadRequest>) -> GatewayResult<String> {
        let request = request.ok_or_else(|| GatewayError::validation("No file provided"))?;
        if request.filename.is_empty() {
            return Err(GatewayError::validation("No file selected"));
        }

        let filename = secure_filename(&request.filename);
        if filename.is_empty() {
            return Err(GatewayError::validation("Invalid filename"));
        }
        let key = join_key(&request.prefix, &filename);

        self.backend
            .put_object(&key, request.content.path(), &self.transfer)
            .await
            .map_err(GatewayError::backend("Failed to upload file: "))?;

        debug!("uploaded `{}`", key);
        Ok(key)
    }

    /// Materialize `path` into a staging file for streaming back to the client.
    ///
    /// The staging file is removed on every error path here; on success its
    /// lifetime passes to the returned value.
    pub async fn download(&self, path: Option<&str>) -> GatewayResult<StagedDownload> {
        let key = path
            .filter(|p| !p.is_empty())
            .ok_or_else(|| GatewayError::validation("No file path provided"))?;

        let content = self.staging_file()?;
        self.backend
            .get_object(key, content.path(), &self.transfer)
            .await?;

        let filename = key.rsplit('/').next().unwrap_or(key).to_string();
        debug!("staged `{}` at {}", key, content.path().display());
        Ok(StagedDownload { content, filename })
    }

    /// Delete a single object, or every object under a folder path.
    ///
    /// Folder deletes list the whole prefix before deleting, in batches of at
    /// most `DELETE_BATCH_LIMIT` keys. Batches run in order and the first
    /// failing batch aborts the delete.
    pub async fn delete(&self, path: Option<&str>) -> GatewayResult<()> {
        let path = path
            .filter(|p| !p.is_empty())
            .ok_or_else(|| GatewayError::validation("No path provided"))?;

        if !path.ends_with('/') {
            self.backend.delete_object(path).await?;
            debug!("deleted `{}`", path);
            return Ok(());
        }

        let mut keys = Vec::new();
        let mut token = None;
        loop {
            let page = self.backend.list_prefixed(path, None, token).await?;
            keys.extend(page.objects.into_iter().map(|o| o.key));
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        for batch in keys.chunks(DELETE_BATCH_LIMIT) {
            self.backend.delete_objects(batch).await?;
        }

        debug!("deleted folder `{}` ({} objects)", path, keys.len());
        Ok(())
    }
}

/// Join a destination prefix and a filename the way a path join does.
pub fn join_key(prefix: &str, filename: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        format!("{}{}", prefix, filename)
    } else {
        format!("{}/{}", prefix, filename)
    }
}

/// Reduce a client-supplied filename to a safe single path segment.
///
/// The name is NFKD-normalized so accented letters keep their base letter,
/// then non-ASCII is dropped. The host's path separators become spaces, only
/// ASCII letters, digits, `_`, `.` and `-` survive, runs of whitespace
/// collapse into `_`, and leading or trailing dots and underscores are
/// stripped. On Windows, device names get a `_` prefix. The result may be
/// empty.
pub fn secure_filename(filename: &str) -> String {
    let spaced: String = filename
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if is_path_separator(c) { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(*c, '_' | '.' | '-'))
        .collect();
    let trimmed = kept.trim_matches(|c: char| c == '.' || c == '_');

    if cfg!(windows) && is_windows_device_name(trimmed) {
        format!("_{}", trimmed)
    } else {
        trimmed.to_string()
    }
}

fn is_path_separator(c: char) -> bool {
    c == '/' || (cfg!(windows) && c == '\\')
}

fn is_windows_device_name(name: &str) -> bool {
    const DEVICES: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
        "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    let stem = name.split('.').next().unwrap_or(name);
    DEVICES.iter().any(|d| d.eq_ignore_ascii_case(stem))
}
