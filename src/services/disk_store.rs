//! src/services/disk_store.rs
//!
//! DiskStore, the durable cache backend. Each object is a plain file holding
//! the raw bytes, sharded beneath `base_path/{bucket}/{shard}/{shard}/{name}`
//! where `name` is the key with awkward segments escaped.
//! There is no metadata: existence of the file is the only thing tracked.

use crate::services::object_store::{
    ObjectStore, ObjectWriter, StorageError, StorageResult, StoreRead, storage_name,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;

#[derive(Clone, Debug)]
pub struct DiskStore {
    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    /// Bucket directory name beneath `base_path`.
    pub bucket: String,
}

impl DiskStore {
    pub fn new(base_path: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            bucket: bucket.into(),
        }
    }

    /// Create the bucket directory if it does not exist yet.
    pub async fn ensure_root(&self) -> StorageResult<()> {
        fs::create_dir_all(self.bucket_root()).await?;
        Ok(())
    }

    /// Reject keys that cannot be mapped onto a file beneath the bucket root.
    ///
    /// Every other key is placed through [`storage_name`], which escapes
    /// empty and dot segments, so a key never climbs out of its shard.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StorageError::InvalidObjectKey(key.to_string()));
        }
        Ok(())
    }

    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(&self.bucket)
    }

    /// Two-level shard identifiers: the first two bytes of MD5(bucket/key)
    /// as lowercase hex. Keeps directory fan-out bounded.
    fn object_shards(bucket: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(&self.bucket, key);
        let mut path = self.bucket_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(storage_name(key));
        path
    }

    /// Recursively remove empty directories up to the bucket root.
    async fn prune_empty_dirs(&self, start: &Path) {
        let stop = self.bucket_root();
        let mut current = start.to_path_buf();
        while current.starts_with(&stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for DiskStore {
    async fn read(&self, key: &str) -> StoreRead {
        if let Err(err) = self.ensure_key_safe(key) {
            return StoreRead::Failed(err);
        }

        let file_path = self.object_path(key);
        match File::open(&file_path).await {
            Ok(file) => StoreRead::Found(ReaderStream::new(file).boxed()),
            Err(err) if err.kind() == ErrorKind::NotFound => StoreRead::NotFound,
            Err(err) => StoreRead::Failed(StorageError::Io(err)),
        }
    }

    /// Writes land in a temporary sibling file; `commit` fsyncs and renames
    /// it into place, so readers never observe a partial object.
    async fn write(&self, key: &str) -> StorageResult<Box<dyn ObjectWriter>> {
        self.ensure_key_safe(key)?;

        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let file = File::create(&tmp_path).await?;

        Ok(Box::new(DiskWriter {
            key: key.to_string(),
            file: Some(file),
            tmp_path,
            final_path: file_path,
        }))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.ensure_key_safe(key)?;

        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "disk"
    }
}

struct DiskWriter {
    key: String,
    /// `None` once committed.
    file: Option<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
}

impl DiskWriter {
    async fn discard(&mut self) {
        self.file = None;
        let _ = fs::remove_file(&self.tmp_path).await;
    }
}

#[async_trait]
impl ObjectWriter for DiskWriter {
    async fn write_all(&mut self, chunk: &[u8]) -> StorageResult<()> {
        let result = match self.file.as_mut() {
            Some(file) => file.write_all(chunk).await,
            None => return Err(StorageError::AlreadyCommitted(self.key.clone())),
        };
        if let Err(err) = result {
            self.discard().await;
            return Err(StorageError::Io(err));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let mut this = self;
        let mut file = this
            .file
            .take()
            .ok_or_else(|| StorageError::AlreadyCommitted(this.key.clone()))?;

        if let Err(err) = file.flush().await {
            this.discard().await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            this.discard().await;
            return Err(StorageError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(&this.tmp_path, &this.final_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                let replaced = match fs::remove_file(&this.final_path).await {
                    Ok(()) => fs::rename(&this.tmp_path, &this.final_path).await,
                    Err(err) => Err(err),
                };
                if let Err(err) = replaced {
                    this.discard().await;
                    return Err(StorageError::Io(err));
                }
            } else {
                this.discard().await;
                return Err(StorageError::Io(err));
            }
        }

        debug!(key = %this.key, path = %this.final_path.display(), "object committed");
        Ok(())
    }
}

impl Drop for DiskWriter {
    fn drop(&mut self) {
        // Abandoned before commit: the temp file must not linger.
        if self.file.take().is_none() {
            return;
        }
        let tmp_path = std::mem::take(&mut self.tmp_path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = fs::remove_file(&tmp_path).await {
                        warn!("failed to remove abandoned {}: {}", tmp_path.display(), err);
                    }
                });
            }
            Err(_) => {
                let _ = std::fs::remove_file(&tmp_path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::TryStreamExt;
    use std::time::Duration;

    /// Abandoned temp files are removed on a spawned task.
    async fn entries_eventually(dir: &Path, expected: usize) -> usize {
        let mut count = usize::MAX;
        for _ in 0..100 {
            count = std::fs::read_dir(dir).unwrap().count();
            if count == expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        count
    }

    async fn put(store: &DiskStore, key: &str, body: &[u8]) {
        let mut writer = store.write(key).await.unwrap();
        writer.write_all(body).await.unwrap();
        writer.commit().await.unwrap();
    }

    async fn read_all(store: &DiskStore, key: &str) -> Option<Vec<u8>> {
        match store.read(key).await {
            StoreRead::Found(stream) => {
                let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
                Some(chunks.concat())
            }
            StoreRead::NotFound => None,
            StoreRead::Failed(err) => panic!("unexpected store error: {err}"),
        }
    }

    #[tokio::test]
    async fn committed_object_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path(), "artifacts");

        let mut writer = store.write("a/b.jar").await.unwrap();
        writer.write_all(b"jar").await.unwrap();
        writer.write_all(b" bytes").await.unwrap();
        writer.commit().await.unwrap();

        assert_eq!(read_all(&store, "a/b.jar").await.unwrap(), b"jar bytes");
    }

    #[tokio::test]
    async fn missing_object_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path(), "artifacts");
        assert!(matches!(store.read("nope.txt").await, StoreRead::NotFound));
    }

    #[tokio::test]
    async fn uncommitted_writer_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path(), "artifacts");

        let mut writer = store.write("a/b.jar").await.unwrap();
        writer.write_all(b"partial").await.unwrap();
        drop(writer);

        assert!(read_all(&store, "a/b.jar").await.is_none());
        let parent = store.object_path("a/b.jar").parent().unwrap().to_path_buf();
        assert_eq!(entries_eventually(&parent, 0).await, 0);
    }

    #[tokio::test]
    async fn rewrite_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path(), "artifacts");

        for body in [&b"first"[..], &b"second"[..]] {
            let mut writer = store.write("x.txt").await.unwrap();
            writer.write_all(body).await.unwrap();
            writer.commit().await.unwrap();
        }

        assert_eq!(read_all(&store, "x.txt").await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn dot_segments_stay_inside_the_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path(), "artifacts");

        put(&store, "a/../../etc/passwd", b"not really").await;
        assert_eq!(read_all(&store, "a/../../etc/passwd").await.unwrap(), b"not really");
        assert!(read_all(&store, "etc/passwd").await.is_none());
        assert!(!dir.path().join("etc").exists());

        let placed = store.object_path("/abs");
        assert!(placed.starts_with(store.bucket_root()));
    }

    #[tokio::test]
    async fn empty_and_oversized_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path(), "artifacts");

        assert!(matches!(
            store.read("").await,
            StoreRead::Failed(StorageError::InvalidObjectKey(_))
        ));
        assert!(store.write(&"k".repeat(MAX_OBJECT_KEY_LEN + 1)).await.is_err());
    }

    #[tokio::test]
    async fn trailing_slash_key_is_its_own_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path(), "artifacts");

        put(&store, "com/acme/", b"listing").await;
        put(&store, "com/acme", b"plain").await;

        assert_eq!(read_all(&store, "com/acme/").await.unwrap(), b"listing");
        assert_eq!(read_all(&store, "com/acme").await.unwrap(), b"plain");
        assert!(read_all(&store, "com/acme//").await.is_none());
    }

    #[tokio::test]
    async fn dot_keys_are_files_not_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path(), "artifacts");

        // nothing written yet: the shard directory must not be opened
        assert!(read_all(&store, ".").await.is_none());
        assert!(read_all(&store, "x/.").await.is_none());

        put(&store, ".", b"dot").await;
        put(&store, "x/.", b"x-dot").await;
        assert_eq!(read_all(&store, ".").await.unwrap(), b"dot");
        assert_eq!(read_all(&store, "x/.").await.unwrap(), b"x-dot");
        assert!(store.object_path(".").is_file());
    }

    #[tokio::test]
    async fn failed_commit_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path(), "artifacts");

        // a non-empty directory where the object file belongs cannot be
        // renamed over
        let target = store.object_path("blocked.jar");
        std::fs::create_dir_all(target.join("inner")).unwrap();

        let mut writer = store.write("blocked.jar").await.unwrap();
        writer.write_all(b"bytes").await.unwrap();
        assert!(writer.commit().await.is_err());

        let parent = target.parent().unwrap();
        assert_eq!(entries_eventually(parent, 1).await, 1);
    }

    #[tokio::test]
    async fn delete_removes_object_and_prunes_shards() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path(), "artifacts");
        store.ensure_root().await.unwrap();

        put(&store, "deep/nested/file.pom", b"<project/>").await;

        store.delete("deep/nested/file.pom").await.unwrap();
        assert!(read_all(&store, "deep/nested/file.pom").await.is_none());
        assert!(store.bucket_root().exists());
        assert_eq!(std::fs::read_dir(store.bucket_root()).unwrap().count(), 0);

        // second delete is a no-op
        store.delete("deep/nested/file.pom").await.unwrap();
    }
}
