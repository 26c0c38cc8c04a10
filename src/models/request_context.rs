//! Per-request state handed from the dispatcher to the resolver.

use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Resolved object path plus the request's cancellation token.
///
/// The token is a child of the server's shutdown token. It is cancelled on
/// every terminal branch, and unconditionally when the context is dropped,
/// so nothing outlives the handler that created it. Cancelling only marks
/// the request as finished; in-flight store I/O is not interrupted.
#[derive(Debug)]
pub struct RequestContext {
    path: String,
    token: CancellationToken,
}

impl RequestContext {
    pub fn new(path: impl Into<String>, parent: &CancellationToken) -> Self {
        Self {
            path: path.into(),
            token: parent.child_token(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Mark the request as successfully finished.
    pub fn done(&self) {
        trace!(path = %self.path, "request done");
        self.token.cancel();
    }

    /// Mark the request as failed.
    pub fn cancel(&self) {
        trace!(path = %self.path, "request cancelled");
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
