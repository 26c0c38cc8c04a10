//! Process-local object store. Nothing survives a restart; useful for local
//! runs and as the backing store in tests.

use crate::services::object_store::{
    ObjectStore, ObjectWriter, StorageError, StorageResult, StoreRead,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, stream};
use std::{collections::HashMap, io, sync::Arc};
use tokio::sync::RwLock;

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: impl Into<String>, body: impl Into<Bytes>) {
        self.objects.write().await.insert(key.into(), body.into());
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn read(&self, key: &str) -> StoreRead {
        match self.get(key).await {
            Some(body) => {
                StoreRead::Found(stream::once(async move { Ok::<_, io::Error>(body) }).boxed())
            }
            None => StoreRead::NotFound,
        }
    }

    async fn write(&self, key: &str) -> StorageResult<Box<dyn ObjectWriter>> {
        Ok(Box::new(MemoryWriter {
            key: key.to_string(),
            buffer: Some(BytesMut::new()),
            objects: Arc::clone(&self.objects),
        }))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

struct MemoryWriter {
    key: String,
    buffer: Option<BytesMut>,
    objects: Arc<RwLock<HashMap<String, Bytes>>>,
}

#[async_trait]
impl ObjectWriter for MemoryWriter {
    async fn write_all(&mut self, chunk: &[u8]) -> StorageResult<()> {
        let buffer = self
            .buffer
            .as_mut()
            .ok_or_else(|| StorageError::AlreadyCommitted(self.key.clone()))?;
        buffer.extend_from_slice(chunk);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let MemoryWriter {
            key,
            buffer,
            objects,
        } = *self;
        let buffer = buffer.ok_or_else(|| StorageError::AlreadyCommitted(key.clone()))?;
        objects.write().await.insert(key, buffer.freeze());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn writes_become_visible_only_on_commit() {
        let store = MemoryStore::new();
        let mut writer = store.write("a/b.jar").await.unwrap();
        writer.write_all(b"abc").await.unwrap();
        assert!(matches!(store.read("a/b.jar").await, StoreRead::NotFound));

        writer.commit().await.unwrap();
        match store.read("a/b.jar").await {
            StoreRead::Found(stream) => {
                let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
                assert_eq!(chunks.concat(), b"abc");
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        store.insert("k", "v").await;
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.len().await, 0);
    }
}
