//! Cloud bucket backend. Objects live in a remote bucket under their escaped
//! key name (see [`storage_name`]); the remote side is any
//! `object_store` implementation, Google Cloud Storage in production.

use crate::config::StoreCredentials;
use crate::services::object_store::{
    ObjectStore, ObjectWriter, StorageError, StorageResult, StoreRead, storage_name,
};
use ::object_store::{
    self as remote, PutPayload, gcp::GoogleCloudStorageBuilder, path::Path as RemotePath,
};
use async_trait::async_trait;
use bytes::BytesMut;
use futures::{StreamExt, TryStreamExt};
use std::{io, sync::Arc};
use tracing::debug;

#[derive(Clone, Debug)]
pub struct BucketStore {
    remote: Arc<dyn remote::ObjectStore>,
    kind: &'static str,
}

impl BucketStore {
    pub fn new(remote: Arc<dyn remote::ObjectStore>, kind: &'static str) -> Self {
        Self { remote, kind }
    }

    /// Connect to a Google Cloud Storage bucket. Without a credential
    /// payload the client uses the host's application default credentials.
    pub fn gcs(bucket: &str, credentials: Option<&StoreCredentials>) -> StorageResult<Self> {
        let mut builder = GoogleCloudStorageBuilder::new().with_bucket_name(bucket);
        if let Some(credentials) = credentials {
            builder = builder.with_service_account_key(credentials.expose());
        }
        let gcs = builder.build()?;
        Ok(Self::new(Arc::new(gcs), "gcs"))
    }

    fn location(key: &str) -> StorageResult<RemotePath> {
        if key.is_empty() {
            return Err(StorageError::InvalidObjectKey(key.to_string()));
        }
        RemotePath::parse(storage_name(key))
            .map_err(|_| StorageError::InvalidObjectKey(key.to_string()))
    }
}

#[async_trait]
impl ObjectStore for BucketStore {
    async fn read(&self, key: &str) -> StoreRead {
        let location = match Self::location(key) {
            Ok(location) => location,
            Err(err) => return StoreRead::Failed(err),
        };

        match self.remote.get(&location).await {
            Ok(result) => StoreRead::Found(result.into_stream().map_err(io::Error::other).boxed()),
            Err(remote::Error::NotFound { .. }) => StoreRead::NotFound,
            Err(err) => StoreRead::Failed(StorageError::Remote(err)),
        }
    }

    /// The body is buffered and uploaded in one request on `commit`; an
    /// abandoned writer never touches the bucket.
    async fn write(&self, key: &str) -> StorageResult<Box<dyn ObjectWriter>> {
        Ok(Box::new(BucketWriter {
            key: key.to_string(),
            location: Self::location(key)?,
            buffer: Some(BytesMut::new()),
            remote: Arc::clone(&self.remote),
        }))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let location = Self::location(key)?;
        match self.remote.delete(&location).await {
            Ok(()) | Err(remote::Error::NotFound { .. }) => Ok(()),
            Err(err) => Err(StorageError::Remote(err)),
        }
    }

    fn kind(&self) -> &'static str {
        self.kind
    }
}

struct BucketWriter {
    key: String,
    location: RemotePath,
    buffer: Option<BytesMut>,
    remote: Arc<dyn remote::ObjectStore>,
}

#[async_trait]
impl ObjectWriter for BucketWriter {
    async fn write_all(&mut self, chunk: &[u8]) -> StorageResult<()> {
        let buffer = self
            .buffer
            .as_mut()
            .ok_or_else(|| StorageError::AlreadyCommitted(self.key.clone()))?;
        buffer.extend_from_slice(chunk);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let BucketWriter {
            key,
            location,
            buffer,
            remote,
        } = *self;
        let buffer = buffer.ok_or_else(|| StorageError::AlreadyCommitted(key.clone()))?;
        remote
            .put(&location, PutPayload::from(buffer.freeze()))
            .await?;
        debug!(%key, %location, "object uploaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::object_store::memory::InMemory;
    use ::object_store::ObjectStore as _;
    use bytes::Bytes;

    fn bucket() -> (BucketStore, Arc<InMemory>) {
        let remote = Arc::new(InMemory::new());
        (BucketStore::new(remote.clone(), "memory-bucket"), remote)
    }

    async fn read_all(store: &BucketStore, key: &str) -> Option<Vec<u8>> {
        match store.read(key).await {
            StoreRead::Found(stream) => {
                let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
                Some(chunks.concat())
            }
            StoreRead::NotFound => None,
            StoreRead::Failed(err) => panic!("unexpected store error: {err}"),
        }
    }

    async fn put(store: &BucketStore, key: &str, body: &[u8]) {
        let mut writer = store.write(key).await.unwrap();
        writer.write_all(body).await.unwrap();
        writer.commit().await.unwrap();
    }

    #[tokio::test]
    async fn missing_object_maps_to_not_found() {
        let (store, _) = bucket();
        assert!(matches!(store.read("a/b.jar").await, StoreRead::NotFound));
    }

    #[tokio::test]
    async fn committed_object_lands_under_its_key() {
        let (store, remote) = bucket();
        let mut writer = store.write("com/acme/lib-1.0.jar").await.unwrap();
        writer.write_all(b"PK").await.unwrap();
        assert!(matches!(store.read("com/acme/lib-1.0.jar").await, StoreRead::NotFound));

        writer.write_all(b"\x03\x04").await.unwrap();
        writer.commit().await.unwrap();

        let stored = remote
            .get(&RemotePath::from("com/acme/lib-1.0.jar"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(stored, Bytes::from_static(b"PK\x03\x04"));
        assert_eq!(read_all(&store, "com/acme/lib-1.0.jar").await.unwrap(), b"PK\x03\x04");
    }

    #[tokio::test]
    async fn awkward_keys_do_not_collide() {
        let (store, _) = bucket();
        put(&store, "com/acme/", b"listing").await;
        put(&store, "com/acme", b"plain").await;
        put(&store, "x/.", b"dot").await;

        assert_eq!(read_all(&store, "com/acme/").await.unwrap(), b"listing");
        assert_eq!(read_all(&store, "com/acme").await.unwrap(), b"plain");
        assert_eq!(read_all(&store, "x/.").await.unwrap(), b"dot");
        assert!(read_all(&store, "x").await.is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (store, _) = bucket();
        put(&store, "k", b"v").await;
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert!(read_all(&store, "k").await.is_none());
    }
}
