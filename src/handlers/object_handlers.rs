//! HTTP handler for proxied objects.
//! Cache hits are streamed straight from the store; origin fills are sent
//! from the buffer that was just written back.

use crate::{
    errors::AppError,
    models::request_context::RequestContext,
    services::resolver::{Resolved, ResolvedBody},
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use futures::TryStreamExt;
use tracing::{debug, warn};

/// `GET /{*path}` — resolve through cache and origin.
///
/// The request context lives for the duration of this call; dropping it on
/// return cancels the request token on every path.
pub async fn get_object(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    if path.is_empty() {
        return Err(AppError::not_found("Not found: empty path"));
    }

    let ctx = RequestContext::new(path, &state.shutdown);
    debug!(path = %ctx.path(), "object requested");

    let resolved = state.resolver.resolve(&ctx).await?;
    Ok(object_response(ctx.path(), resolved))
}

fn object_response(path: &str, resolved: Resolved) -> Response {
    let body = match resolved.body {
        ResolvedBody::Buffered(bytes) => Body::from(bytes),
        ResolvedBody::Streamed(stream) => {
            // Headers are committed by the time this fires; log only.
            let path = path.to_string();
            Body::from_stream(stream.inspect_err(move |err| {
                warn!(%path, error = %err, "streaming object failed mid-response");
            }))
        }
    };

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(
        HeaderName::from_static("x-cache"),
        HeaderValue::from_static(resolved.cache.as_str()),
    );
    response
}
