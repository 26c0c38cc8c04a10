//! src/services/resolver.rs
//!
//! The read-through pipeline: snapshot metadata is fetched from the origin
//! first, everything else is served from the store when present, and misses
//! are filled from the origin and written back before being returned.

use crate::{
    models::request_context::RequestContext,
    services::{
        object_store::{ByteStream, ObjectStore, StorageError, StoreRead},
        origin_fetcher::{FetchError, OriginFetcher},
    },
};
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Paths ending with this marker are mutable snapshot descriptors. They are
/// always fetched from the origin and never written to the store.
pub const SNAPSHOT_METADATA_SUFFIX: &str = "-SNAPSHOT/maven-metadata.xml";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Not found: {path}: {source}")]
    ObjectNotFound { path: String, source: FetchError },
    #[error("Not found: {path}: {source}")]
    UpstreamUnavailable { path: String, source: FetchError },
    #[error("Caching object {path}: {source}")]
    CachePersistFailure { path: String, source: StorageError },
}

/// Where the returned bytes came from. Exposed as the `x-cache` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from the store.
    Hit,
    /// Fetched from the origin and written back.
    Miss,
    /// Snapshot metadata fetched from the origin, not cached.
    Bypass,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Bypass => "BYPASS",
        }
    }
}

pub enum ResolvedBody {
    Buffered(Bytes),
    Streamed(ByteStream),
}

pub struct Resolved {
    pub cache: CacheStatus,
    pub body: ResolvedBody,
}

/// What to do when the store fails with something other than "not found".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorPolicy {
    /// Log it and continue down the miss path (origin fallback).
    TreatAsMiss,
}

enum Lookup {
    Hit(ByteStream),
    Miss,
}

#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn ObjectStore>,
    origin: OriginFetcher,
    store_error_policy: StoreErrorPolicy,
}

pub fn is_force_refresh(path: &str) -> bool {
    path.ends_with(SNAPSHOT_METADATA_SUFFIX)
}

impl Resolver {
    pub fn new(store: Arc<dyn ObjectStore>, origin: OriginFetcher) -> Self {
        Self {
            store,
            origin,
            store_error_policy: StoreErrorPolicy::TreatAsMiss,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn origin(&self) -> &OriginFetcher {
        &self.origin
    }

    pub async fn resolve(&self, ctx: &RequestContext) -> Result<Resolved, ResolveError> {
        let path = ctx.path();

        if is_force_refresh(path) {
            match self.origin.fetch(path, ctx.token()).await {
                Ok(body) => {
                    debug!(%path, bytes = body.len(), "served snapshot metadata from upstream");
                    ctx.done();
                    return Ok(Resolved {
                        cache: CacheStatus::Bypass,
                        body: ResolvedBody::Buffered(body),
                    });
                }
                Err(err) => debug!(%path, error = %err, "snapshot refresh failed, trying cache"),
            }
        }

        match self.lookup(path).await {
            Lookup::Hit(stream) => {
                debug!(%path, "cache hit");
                ctx.done();
                return Ok(Resolved {
                    cache: CacheStatus::Hit,
                    body: ResolvedBody::Streamed(stream),
                });
            }
            Lookup::Miss => {}
        }

        let body = match self.origin.fetch(path, ctx.token()).await {
            Ok(body) => body,
            Err(source) => {
                ctx.cancel();
                let path = path.to_string();
                return Err(if source.is_not_found() {
                    ResolveError::ObjectNotFound { path, source }
                } else {
                    ResolveError::UpstreamUnavailable { path, source }
                });
            }
        };

        if let Err(source) = self.write_back(path, &body).await {
            ctx.cancel();
            return Err(ResolveError::CachePersistFailure {
                path: path.to_string(),
                source,
            });
        }

        info!(%path, bytes = body.len(), "cached object from upstream");
        ctx.done();
        Ok(Resolved {
            cache: CacheStatus::Miss,
            body: ResolvedBody::Buffered(body),
        })
    }

    async fn lookup(&self, path: &str) -> Lookup {
        match self.store.read(path).await {
            StoreRead::Found(stream) => Lookup::Hit(stream),
            StoreRead::NotFound => {
                debug!(%path, "cache miss");
                Lookup::Miss
            }
            StoreRead::Failed(err) => match self.store_error_policy {
                StoreErrorPolicy::TreatAsMiss => {
                    warn!(%path, error = %err, "store read failed, treating as miss");
                    Lookup::Miss
                }
            },
        }
    }

    async fn write_back(&self, path: &str, body: &[u8]) -> Result<(), StorageError> {
        let mut writer = self.store.write(path).await?;
        writer.write_all(body).await?;
        writer.commit().await
    }
}
