//! Shared, read-only state handed to every request.

use crate::services::{auth_gate::AuthGate, resolver::Resolver};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub resolver: Resolver,
    pub gate: Arc<AuthGate>,
    /// Root of every request token; cancelled on shutdown.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(resolver: Resolver, gate: AuthGate, shutdown: CancellationToken) -> Self {
        Self {
            resolver,
            gate: Arc::new(gate),
            shutdown,
        }
    }
}
