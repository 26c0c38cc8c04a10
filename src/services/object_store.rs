//! The object store seam used by the resolver.
//!
//! Reads return a tagged [`StoreRead`] so callers can tell "absent" apart
//! from every other failure. Writes go through an [`ObjectWriter`] that only
//! publishes the object on [`ObjectWriter::commit`].

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::{borrow::Cow, fmt::Write as _, io};
use thiserror::Error;

/// Object body as a stream of chunks.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error("writer for `{0}` already committed")]
    AlreadyCommitted(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Remote(#[from] ::object_store::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome of a store lookup.
pub enum StoreRead {
    Found(ByteStream),
    NotFound,
    Failed(StorageError),
}

impl std::fmt::Debug for StoreRead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreRead::Found(_) => f.write_str("Found(..)"),
            StoreRead::NotFound => f.write_str("NotFound"),
            StoreRead::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open the object at `path` for streaming.
    async fn read(&self, path: &str) -> StoreRead;

    /// Open a writer for `path`. Nothing becomes visible until `commit`.
    async fn write(&self, path: &str) -> StorageResult<Box<dyn ObjectWriter>>;

    /// Remove the object at `path`. Removing an absent object is not an error.
    async fn delete(&self, path: &str) -> StorageResult<()>;

    /// Short backend name for logs and readiness output.
    fn kind(&self) -> &'static str;
}

#[async_trait]
pub trait ObjectWriter: Send {
    async fn write_all(&mut self, chunk: &[u8]) -> StorageResult<()>;

    /// Flush and publish the object. Any flush or rename error surfaces here.
    async fn commit(self: Box<Self>) -> StorageResult<()>;
}

/// Stored name of an empty key segment (`a//b`, or the leaf of `dir/`).
/// Escaping always turns a literal `%` into `%25`, so a lone `%` never
/// names a real segment.
const EMPTY_SEGMENT: &str = "%";

/// Map one `/`-separated key segment onto a name both the filesystem and
/// bucket backends accept. The mapping is injective and leaves ordinary
/// artifact names untouched; only empty segments, a leading `.`, `%`, `\`
/// and control characters are escaped.
pub fn storage_segment(segment: &str) -> Cow<'_, str> {
    if segment.is_empty() {
        return Cow::Borrowed(EMPTY_SEGMENT);
    }
    let plain = !segment.starts_with('.')
        && !segment
            .chars()
            .any(|c| c == '%' || c == '\\' || c.is_ascii_control());
    if plain {
        return Cow::Borrowed(segment);
    }

    let mut escaped = String::with_capacity(segment.len() + 6);
    for (index, c) in segment.char_indices() {
        match c {
            '.' if index == 0 => escaped.push_str("%2E"),
            '%' | '\\' => {
                let _ = write!(escaped, "%{:02X}", c as u32);
            }
            c if c.is_ascii_control() => {
                let _ = write!(escaped, "%{:02X}", c as u32);
            }
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// The stored name of `key`, segment by segment.
pub fn storage_name(key: &str) -> String {
    key.split('/')
        .map(storage_segment)
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinary_keys_keep_their_names() {
        assert_eq!(storage_name("com/acme/lib/1.0/lib-1.0.jar"), "com/acme/lib/1.0/lib-1.0.jar");
        assert_eq!(storage_name("a?v=1"), "a?v=1");
    }

    #[test]
    fn awkward_segments_are_escaped() {
        assert_eq!(storage_name("com/acme/"), "com/acme/%");
        assert_eq!(storage_name("."), "%2E");
        assert_eq!(storage_name("x/.."), "x/%2E.");
        assert_eq!(storage_name("a//b"), "a/%/b");
        assert_eq!(storage_name(".hidden"), "%2Ehidden");
        assert_eq!(storage_name("50%"), "50%25");
        assert_eq!(storage_name("win\\path"), "win%5Cpath");
        assert_eq!(storage_name("tab\there"), "tab%09here");
    }

    #[test]
    fn escaping_never_merges_distinct_keys() {
        let keys = ["dir", "dir/", "dir/%", "dir/%25", ".", "%2E", "..", "a//b", "a/b"];
        let names: std::collections::HashSet<_> = keys.iter().map(|k| storage_name(k)).collect();
        assert_eq!(names.len(), keys.len());
    }
}
