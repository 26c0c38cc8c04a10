//! Plain data carried through the proxy: the Basic-Auth user table and the
//! per-request context.

pub mod credentials;
pub mod request_context;
