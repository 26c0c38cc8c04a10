//! Basic-Auth middleware guarding the object route.

use crate::{
    errors::AppError,
    services::auth_gate::Verdict,
    state::AppState,
};
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

/// Reject the request with a 401 challenge unless the gate allows it.
/// Requests that fail here never reach the resolver.
pub async fn require_basic_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match state.gate.authenticate(authorization) {
        Verdict::Allowed => Ok(next.run(request).await),
        Verdict::Denied => {
            tracing::warn!(uri = %request.uri(), "authentication failed");
            Err(AppError::unauthorized())
        }
    }
}
