//! `ObjectBackend` over an S3 bucket using the AWS SDK.
//!
//! Uploads and downloads go through local files. Payloads at or above the
//! transfer threshold are moved in segments: multipart uploads for puts, and
//! concurrent ranged reads pinned to one ETag for gets.

use crate::services::backend::{
    BackendError, BackendResult, DELETE_BATCH_LIMIT, ListPage, ObjectBackend, ObjectSummary,
    TransferOptions,
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region},
    error::{DisplayErrorContext, SdkError},
    operation::head_object::HeadObjectError,
    primitives::{ByteStream, Length},
    types::{CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier},
};
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use std::{fmt, io::SeekFrom, path::Path};
use tokio::{
    fs::{self, File, OpenOptions},
    io::{self, AsyncSeekExt, AsyncWriteExt},
};
use tracing::{debug, warn};

/// Connection settings for the bucket.
#[derive(Clone)]
pub struct S3Settings {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub bucket: String,
    /// Custom endpoint for S3-compatible stores. Enables path-style requests.
    pub endpoint_url: Option<String>,
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("endpoint_url", &self.endpoint_url)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct S3Backend {
    client: Client,
    bucket: String,
}

impl<E, R> From<SdkError<E, R>> for BackendError
where
    E: std::error::Error + 'static,
    R: fmt::Debug,
{
    fn from(err: SdkError<E, R>) -> Self {
        BackendError::Service(DisplayErrorContext(&err).to_string())
    }
}

fn service_err(err: impl std::error::Error) -> BackendError {
    BackendError::Service(err.to_string())
}

impl S3Backend {
    /// Build a client from static credentials. No network I/O happens here.
    pub fn new(settings: &S3Settings) -> Self {
        let credentials = Credentials::new(
            &settings.access_key,
            &settings.secret_key,
            None,
            None,
            "gateway-config",
        );
        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint) = &settings.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: settings.bucket.clone(),
        }
    }

    #[cfg(test)]
    fn with_client(client: Client, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
        }
    }

    async fn put_single(&self, key: &str, source: &Path) -> BackendResult<()> {
        let body = ByteStream::from_path(source).await.map_err(service_err)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await?;
        Ok(())
    }

    async fn put_multipart(
        &self,
        key: &str,
        source: &Path,
        size: u64,
        transfer: &TransferOptions,
    ) -> BackendResult<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| BackendError::Service("multipart upload id missing".into()))?
            .to_string();

        match self
            .upload_parts(key, &upload_id, source, size, transfer)
            .await
        {
            Ok(parts) => {
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await?;
                Ok(())
            }
            Err(err) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(
                        "failed to abort multipart upload {} for `{}`: {}",
                        upload_id,
                        key,
                        DisplayErrorContext(&abort_err)
                    );
                }
                Err(err)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        source: &Path,
        size: u64,
        transfer: &TransferOptions,
    ) -> BackendResult<Vec<CompletedPart>> {
        let segments = transfer.segments(size).into_iter().enumerate();
        let mut parts: Vec<CompletedPart> = stream::iter(segments)
            .map(|(index, (start, end))| async move {
                let part_number = index as i32 + 1;
                let body = ByteStream::read_from()
                    .path(source)
                    .offset(start)
                    .length(Length::Exact(end - start + 1))
                    .build()
                    .await
                    .map_err(service_err)?;
                let uploaded = self
                    .client
                    .upload_part()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .body(body)
                    .send()
                    .await?;
                Ok::<_, BackendError>(
                    CompletedPart::builder()
                        .set_e_tag(uploaded.e_tag().map(str::to_string))
                        .part_number(part_number)
                        .build(),
                )
            })
            .buffer_unordered(transfer.max_concurrency.max(1))
            .try_collect()
            .await?;

        parts.sort_by_key(|part| part.part_number());
        Ok(parts)
    }

    async fn get_single(&self, key: &str, destination: &Path) -> BackendResult<()> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        let reader = resp.body.into_async_read();
        tokio::pin!(reader);
        let mut file = File::create(destination).await?;
        io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        Ok(())
    }

    async fn get_range(
        &self,
        key: &str,
        etag: Option<&str>,
        destination: &Path,
        (start, end): (u64, u64),
    ) -> BackendResult<()> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(format!("bytes={}-{}", start, end))
            .set_if_match(etag.map(str::to_string))
            .send()
            .await?;
        let reader = resp.body.into_async_read();
        tokio::pin!(reader);
        let mut file = OpenOptions::new().write(true).open(destination).await?;
        file.seek(SeekFrom::Start(start)).await?;
        io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectBackend for S3Backend {
    async fn list_prefixed(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        continuation_token: Option<String>,
    ) -> BackendResult<ListPage> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_delimiter(delimiter.map(str::to_string))
            .set_continuation_token(continuation_token)
            .send()
            .await?;

        let common_prefixes = resp
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();
        let objects = resp
            .contents()
            .iter()
            .filter_map(|obj| {
                let key = obj.key()?.to_string();
                let last_modified = obj
                    .last_modified()
                    .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
                    .unwrap_or_default();
                Some(ObjectSummary {
                    key,
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    last_modified,
                })
            })
            .collect();
        let next_token = if resp.is_truncated().unwrap_or(false) {
            resp.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            common_prefixes,
            objects,
            next_token,
        })
    }

    async fn put_object(
        &self,
        key: &str,
        source: &Path,
        transfer: &TransferOptions,
    ) -> BackendResult<()> {
        let size = fs::metadata(source).await?.len();
        if transfer.is_segmented(size) {
            debug!("multipart upload of `{}` ({} bytes)", key, size);
            self.put_multipart(key, source, size, transfer).await
        } else {
            self.put_single(key, source).await
        }
    }

    async fn get_object(
        &self,
        key: &str,
        destination: &Path,
        transfer: &TransferOptions,
    ) -> BackendResult<()> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| match err {
                SdkError::ServiceError(ref ctx)
                    if matches!(ctx.err(), HeadObjectError::NotFound(_)) =>
                {
                    BackendError::NotFound(key.to_string())
                }
                other => BackendError::from(other),
            })?;
        let size = head.content_length().unwrap_or(0).max(0) as u64;

        if !transfer.is_segmented(size) {
            return self.get_single(key, destination).await;
        }

        debug!("ranged download of `{}` ({} bytes)", key, size);
        OpenOptions::new()
            .write(true)
            .open(destination)
            .await?
            .set_len(size)
            .await?;
        let etag = head.e_tag();
        stream::iter(transfer.segments(size))
            .map(|range| self.get_range(key, etag, destination, range))
            .buffer_unordered(transfer.max_concurrency.max(1))
            .try_collect::<Vec<()>>()
            .await?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> BackendResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> BackendResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        if keys.len() > DELETE_BATCH_LIMIT {
            return Err(BackendError::Service(format!(
                "bulk delete accepts at most {} keys, got {}",
                DELETE_BATCH_LIMIT,
                keys.len()
            )));
        }

        let identifiers = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(service_err)?;
        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(true)
            .build()
            .map_err(service_err)?;

        let resp = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await?;

        let errors = resp.errors();
        if let Some(first) = errors.first() {
            return Err(BackendError::PartialDelete {
                failed: errors.len(),
                message: format!(
                    "{}: {}",
                    first.key().unwrap_or("<unknown>"),
                    first.message().or(first.code()).unwrap_or("unknown error")
                ),
            });
        }
        Ok(())
    }
}
