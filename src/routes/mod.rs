//! Defines the routes served by the gateway.
//!
//! ## Structure
//! - `GET    /`              — static browser client
//! - `GET    /api/list`      — folders and files under `?prefix=`
//! - `POST   /api/upload`    — multipart upload (`file`, `prefix`)
//! - `GET    /api/download`  — object at `?path=` as an attachment
//! - `DELETE /api/delete`    — object or folder at `?path=`
//! - `GET    /healthz`, `GET /readyz` — probes

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::{delete_object, download_object, list_objects, upload_object},
    },
    services::gateway_service::GatewayService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use std::path::Path;
use tower_http::services::ServeFile;

/// Build the router. `static_dir` must contain the client's `index.html`.
///
/// Upload bodies are unbounded; any size limit is left to the backend.
pub fn routes(static_dir: &Path) -> Router<GatewayService> {
    Router::new()
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        // health endpoints
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // bucket API
        .route("/api/list", get(list_objects))
        .route(
            "/api/upload",
            post(upload_object).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/download", get(download_object))
        .route("/api/delete", delete(delete_object))
}
