//! HTTP handlers for the bucket browser API.
//! Uploads are spooled to a staging file before they are stored; downloads
//! are staged locally and streamed back with range and conditional support.

use crate::{
    errors::{AppError, GatewayError},
    models::{
        listing::Listing,
        transfer::{MessageResponse, UploadRequest, UploadResponse},
    },
    services::{gateway_service::GatewayService, staging::StagingFile},
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Query, Request, State},
    http::{HeaderValue, header},
    response::Response,
};
use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};
use serde::Deserialize;
use std::{
    pin::Pin,
    task::{Context, Poll},
};
use tokio::{fs::File, io::AsyncWriteExt};
use tower::ServiceExt;
use tower_http::services::ServeFile;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub path: Option<String>,
}

/// `GET /api/list?prefix=` — folders and files one level below `prefix`.
pub async fn list_objects(
    State(service): State<GatewayService>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Listing>, AppError> {
    let listing = service.list(q.prefix.as_deref()).await?;
    Ok(Json(listing))
}

/// `POST /api/upload` — multipart form with a `file` part and optional `prefix`.
pub async fn upload_object(
    State(service): State<GatewayService>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut prefix = String::new();
    let mut upload: Option<(StagingFile, String)> = None;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "prefix" => prefix = field.text().await?,
            "file" if upload.is_none() => {
                // A part without a filename parameter is a plain form field.
                let Some(filename) = field.file_name().map(str::to_string) else {
                    continue;
                };
                let content = service.staging_file()?;
                let mut file = File::create(content.path())
                    .await
                    .map_err(GatewayError::from)?;
                while let Some(chunk) = field.chunk().await? {
                    file.write_all(&chunk).await.map_err(GatewayError::from)?;
                }
                file.flush().await.map_err(GatewayError::from)?;
                upload = Some((content, filename));
            }
            _ => {}
        }
    }

    let request = upload.map(|(content, filename)| UploadRequest {
        content,
        prefix,
        filename,
    });
    let path = service.upload(request).await?;

    Ok(Json(UploadResponse {
        message: "File uploaded successfully".into(),
        path,
    }))
}

/// `GET /api/download?path=` — the object as an attachment.
///
/// The staged file is owned by the response body and removed once the body
/// is finished or dropped, including when the client disconnects.
pub async fn download_object(
    State(service): State<GatewayService>,
    Query(q): Query<PathQuery>,
    request: Request,
) -> Result<Response, AppError> {
    let staged = service.download(q.path.as_deref()).await?;

    let Ok(served) = ServeFile::new(staged.content.path())
        .oneshot(request)
        .await;
    let (mut parts, body) = served.into_parts();

    if parts.status.is_success() {
        parts.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
    }
    parts.headers.insert(
        header::CONTENT_DISPOSITION,
        attachment_disposition(&staged.filename),
    );
    parts
        .headers
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    let body = Body::new(StagedBody {
        inner: Body::new(body),
        _staging: staged.content,
    });
    Ok(Response::from_parts(parts, body))
}

/// `DELETE /api/delete?path=` — one object, or a whole folder for paths ending in `/`.
pub async fn delete_object(
    State(service): State<GatewayService>,
    Query(q): Query<PathQuery>,
) -> Result<Json<MessageResponse>, AppError> {
    service.delete(q.path.as_deref()).await?;
    Ok(Json(MessageResponse {
        message: "Deleted successfully".into(),
    }))
}

/// Response body that keeps its staging file alive until it is dropped.
struct StagedBody {
    inner: Body,
    _staging: StagingFile,
}

impl HttpBody for StagedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

fn attachment_disposition(filename: &str) -> HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let value = if fallback == filename {
        format!("attachment; filename=\"{}\"", filename)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            urlencoding::encode(filename)
        )
    };
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
