//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks the bucket and the staging directory

use crate::services::gateway_service::GatewayService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::{collections::HashMap, path::Path};
use tokio::fs;
use uuid::Uuid;

const PROBE: &[u8] = b"readyz";

/// `GET /healthz`
///
/// Very small liveness probe — always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that:
/// 1. Lists the bucket root through the backend.
/// 2. Performs a best-effort write/read/delete in the staging directory.
///
/// Returns JSON describing each check. HTTP 200 when all checks pass,
/// HTTP 503 when any check fails.
pub async fn readyz(State(service): State<GatewayService>) -> impl IntoResponse {
    let mut checks = HashMap::new();
    checks.insert("bucket", check_bucket(&service).await);
    checks.insert("staging", check_staging_dir(&service.staging_dir).await);

    let ready = checks.values().all(|c| c.ok);
    let body = ReadyResponse {
        status: if ready { "ok" } else { "error" }.into(),
        checks,
    };
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

async fn check_bucket(service: &GatewayService) -> CheckStatus {
    match service.backend.list_prefixed("", Some("/"), None).await {
        Ok(_) => CheckStatus::passed(),
        Err(e) => CheckStatus::failed(format!("error: {}", e)),
    }
}

/// Write, read back, and remove a probe file. Removal failures are reported
/// but do not fail the check.
async fn check_staging_dir(dir: &Path) -> CheckStatus {
    let probe = dir.join(format!(".readyz-{}", Uuid::new_v4()));
    if let Err(e) = fs::write(&probe, PROBE).await {
        return CheckStatus::failed(format!("could not write probe file: {}", e));
    }

    let status = match fs::read(&probe).await {
        Ok(bytes) if bytes == PROBE => CheckStatus::passed(),
        Ok(_) => CheckStatus::failed("probe content mismatch".into()),
        Err(e) => CheckStatus::failed(format!("could not read probe file: {}", e)),
    };
    match fs::remove_file(&probe).await {
        Err(e) if status.ok => CheckStatus {
            ok: true,
            error: Some(format!("could not remove probe file: {}", e)),
        },
        _ => status,
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn passed() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}
