//! Defines the proxy's routes.
//!
//! ## Structure
//! - **Health checks** (no auth)
//!   - `GET /_ah/health` — liveness
//!   - `GET /_ah/ready`  — readiness
//!
//! - **Objects** (Basic-Auth when credentials are configured)
//!   - `GET /{*path}` — resolve through cache and upstream
//!
//! The wildcard `*path` allows nested keys like `com/acme/lib/1.0/lib-1.0.jar`.
//! Static health routes take precedence over the wildcard.

use crate::{
    handlers::{
        auth_handlers::require_basic_auth,
        health_handlers::{healthz, readyz},
        object_handlers::get_object,
    },
    state::AppState,
};
use axum::{Router, middleware, routing::get};

/// Build the router. The auth layer is attached with `route_layer` before the
/// health routes are added, so it only wraps the object route.
pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/{*path}", get(get_object))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_basic_auth,
        ))
        .route("/_ah/health", get(healthz))
        .route("/_ah/ready", get(readyz))
}
