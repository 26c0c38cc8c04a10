//! Read-through caching proxy for package artifacts.
//!
//! Requests are authenticated, looked up in an object store and, on a miss,
//! fetched once from the upstream and written back before being served.
//! Snapshot metadata is always fetched from upstream and never cached.

use axum::Router;

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use state::AppState;

/// The fully wired application router.
pub fn app(state: AppState) -> Router {
    routes::routes::routes(&state).with_state(state)
}
