//! Health & readiness handlers.
//!
//! - GET /_ah/health -> liveness ("ok"), no auth
//! - GET /_ah/ready  -> readiness: store round-trip plus upstream presence

use crate::{services::object_store::StoreRead, state::AppState};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use bytes::Bytes;
use futures::TryStreamExt;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

const CHECK_BODY: &[u8] = b"ready";

/// `GET /_ah/health`
///
/// Liveness check. Never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// `GET /_ah/ready`
///
/// 1. Writes, reads back and deletes a scratch object in the store.
/// 2. Reports whether an upstream is configured (informational only; a proxy
///    without an upstream still serves its cache).
///
/// HTTP 200 when the store check passes, HTTP 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.resolver.store();
    let check_key = format!(".ready-{}", Uuid::new_v4());

    let store_check = match round_trip_store(&state, &check_key).await {
        Ok(()) => CheckStatus {
            ok: true,
            error: None,
        },
        Err(e) => CheckStatus {
            ok: false,
            error: Some(e),
        },
    };
    if let Err(e) = store.delete(&check_key).await {
        tracing::debug!(key = %check_key, error = %e, "could not remove readiness object");
    }

    let origin = state.resolver.origin();
    let upstream_check = CheckStatus {
        ok: origin.is_configured(),
        error: if origin.is_configured() {
            None
        } else {
            Some("no upstream configured, cache-only".to_string())
        },
    };

    let overall_ok = store_check.ok;
    let mut checks = HashMap::new();
    checks.insert(store.kind(), store_check);
    checks.insert("upstream", upstream_check);

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

async fn round_trip_store(state: &AppState, key: &str) -> Result<(), String> {
    let store = state.resolver.store();

    let mut writer = store
        .write(key)
        .await
        .map_err(|e| format!("could not open scratch object: {}", e))?;
    writer
        .write_all(CHECK_BODY)
        .await
        .map_err(|e| format!("could not write scratch object: {}", e))?;
    writer
        .commit()
        .await
        .map_err(|e| format!("could not commit scratch object: {}", e))?;

    match store.read(key).await {
        StoreRead::Found(stream) => {
            let chunks: Vec<Bytes> = stream
                .try_collect()
                .await
                .map_err(|e| format!("could not read scratch object: {}", e))?;
            if chunks.concat() == CHECK_BODY {
                Ok(())
            } else {
                Err("scratch object content mismatch".to_string())
            }
        }
        StoreRead::NotFound => Err("scratch object vanished after commit".to_string()),
        StoreRead::Failed(e) => Err(format!("could not read scratch object: {}", e)),
    }
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
