//! Proxy services: the object store seam and its backends, the upstream
//! fetcher, the Basic-Auth gate and the resolver that ties them together.

pub mod auth_gate;
pub mod bucket_store;
pub mod disk_store;
pub mod memory_store;
pub mod object_store;
pub mod origin_fetcher;
pub mod resolver;
