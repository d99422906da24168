//! src/services/storage_service.rs
//!
//! LocalStorage — bucket/key object storage on the local filesystem, laid out
//! as `base_path/{bucket}/{key}` with the raw bytes and nothing else. No
//! checksum is persisted: saves compute it while writing, verified reads
//! recompute it from the file every time.

use crate::{
    models::object::ObjectInfo,
    services::checksum::{Checksum, Sha256Checksum},
};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{SinkExt, channel::mpsc};
use std::{
    future::Future,
    io::{self, ErrorKind, SeekFrom},
    path::PathBuf,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt},
};
use tokio_util::io::StreamReader;
use tracing::debug;

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
pub const DEFAULT_PIPE_DEPTH: usize = 8;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid checksum: got {got}, expected {expected}")]
    InvalidChecksum { got: String, expected: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Operations the command layer needs from a store.
///
/// Callers hold an explicit handle instead of a process-wide instance, which
/// also lets tests hand in an in-memory double.
pub trait ObjectStorage: Send + Sync {
    /// Stream returned by a successful [`ObjectStorage::get`].
    type Reader: AsyncRead + Unpin + Send;

    /// Persist `reader` under `bucket/key`, replacing any existing object.
    fn save<R>(
        &self,
        bucket: &str,
        key: &str,
        reader: R,
    ) -> impl Future<Output = StorageResult<ObjectInfo>> + Send
    where
        R: AsyncRead + Unpin + Send;

    /// Open `bucket/key` only if its content digests to `expected_checksum`.
    fn get(
        &self,
        bucket: &str,
        key: &str,
        expected_checksum: &str,
    ) -> impl Future<Output = StorageResult<(Self::Reader, ObjectInfo)>> + Send;

    fn delete(&self, bucket: &str, key: &str) -> impl Future<Output = StorageResult<()>> + Send;

    /// `Ok(false)` when absent; other stat failures are errors.
    fn exists(&self, bucket: &str, key: &str) -> impl Future<Output = StorageResult<bool>> + Send;

    fn list_objects(
        &self,
        bucket: &str,
    ) -> impl Future<Output = StorageResult<Vec<ObjectInfo>>> + Send;
}

/// Tuning for the save pipeline.
///
/// At most `chunk_size * (pipe_depth + 2)` bytes of one save are in memory at
/// any time, whatever the object size: `pipe_depth` chunks queued for the
/// digest task, plus the chunk it is hashing and the one being written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageOptions {
    /// Bytes read from the input per copy-loop iteration.
    pub chunk_size: usize,
    /// Chunks the digest task may lag behind the file write before the copy loop blocks.
    pub pipe_depth: usize,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            pipe_depth: DEFAULT_PIPE_DEPTH,
        }
    }
}

/// Filesystem-backed [`ObjectStorage`].
///
/// Holds no locks: concurrent saves or deletes of the same key race at the
/// filesystem level and serializing them is up to the caller. A failed save
/// can leave a truncated file behind; nothing is staged or renamed.
#[derive(Clone, Debug)]
pub struct LocalStorage<C = Sha256Checksum> {
    /// Base directory on disk; buckets are its immediate subdirectories.
    pub base_path: PathBuf,

    checksum: C,
    options: StorageOptions,
}

/// Why the copy loop stopped early.
enum CopyError {
    /// Reading the input or writing the file failed.
    Io(io::Error),
    /// The digest task dropped its end of the channel.
    DigestGone,
}

impl LocalStorage<Sha256Checksum> {
    /// SHA-256 storage rooted at `base_path` with default tuning.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self::with_checksum(base_path, Sha256Checksum::new())
    }
}

impl<C: Checksum> LocalStorage<C> {
    pub fn with_checksum(base_path: impl Into<PathBuf>, checksum: C) -> Self {
        Self {
            base_path: base_path.into(),
            checksum,
            options: StorageOptions::default(),
        }
    }

    /// Override the save pipeline tuning. Zero values are raised to 1.
    pub fn with_options(mut self, options: StorageOptions) -> Self {
        self.options = StorageOptions {
            chunk_size: options.chunk_size.max(1),
            pipe_depth: options.pipe_depth.max(1),
        };
        self
    }

    pub fn options(&self) -> StorageOptions {
        self.options
    }

    fn bucket_root(&self, bucket: &str) -> PathBuf {
        self.base_path.join(bucket)
    }

    /// `base_path/bucket/key`. Keys are joined as given, without normalization.
    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.bucket_root(bucket).join(key)
    }

    fn not_found_or_io(err: io::Error, bucket: &str, key: &str) -> StorageError {
        if err.kind() == ErrorKind::NotFound {
            StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }
        } else {
            StorageError::Io(err)
        }
    }

    /// Write `reader` to `bucket/key` while a spawned task digests the same bytes.
    ///
    /// - Each chunk read from the input is written to the file, then handed to
    ///   the digest task over a bounded channel. The chunk is shared, not copied.
    /// - A full channel blocks the copy loop until the digest catches up.
    /// - Returns only after the file is synced and the digest task has joined.
    ///
    /// If the copy loop fails, its error is returned and the digest task is
    /// aborted, even when the digest side failed too. If the digest task fails,
    /// its error is returned even though the file write succeeded.
    pub async fn save<R>(&self, bucket: &str, key: &str, mut reader: R) -> StorageResult<ObjectInfo>
    where
        R: AsyncRead + Unpin + Send,
    {
        let created_at = Utc::now();

        let bucket_root = self.bucket_root(bucket);
        fs::create_dir_all(&bucket_root).await?;
        let file_path = self.object_path(bucket, key);
        let mut file = File::create(&file_path).await?;

        let (mut tx, rx) = digest_channel(self.options.pipe_depth);
        let checksum = self.checksum.clone();
        let digest_task =
            tokio::spawn(async move { checksum.generate(StreamReader::new(rx)).await });

        let copied = copy_and_fork(&mut reader, &mut file, &mut tx, self.options.chunk_size).await;
        // Closing the sender is the digest task's end-of-stream.
        drop(tx);

        let copied = match copied {
            Ok(size) => match sync_file(&mut file).await {
                Ok(()) => Ok(size),
                Err(err) => Err(CopyError::Io(err)),
            },
            Err(err) => Err(err),
        };

        let size = match copied {
            Ok(size) => Some(size),
            Err(CopyError::Io(err)) => {
                digest_task.abort();
                debug!("save of {}/{} failed during copy: {}", bucket, key, err);
                return Err(StorageError::Io(err));
            }
            Err(CopyError::DigestGone) => None,
        };

        let checksum = match digest_task.await {
            Ok(Ok(checksum)) => checksum,
            Ok(Err(err)) => {
                debug!("save of {}/{} failed during digest: {}", bucket, key, err);
                return Err(StorageError::Io(err));
            }
            Err(join_err) => return Err(StorageError::Io(io::Error::other(join_err))),
        };

        let Some(size) = size else {
            return Err(StorageError::Io(io::Error::other(
                "digest task stopped before the end of the stream",
            )));
        };

        debug!(
            "saved {}/{} ({} bytes, checksum {})",
            bucket, key, size, checksum
        );

        Ok(ObjectInfo {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size,
            checksum,
            created_at,
            path: file_path,
        })
    }

    /// Open an object after verifying its full content against `expected_checksum`.
    ///
    /// The whole file is read to recompute the digest, then rewound. On a
    /// mismatch the file is closed and nothing readable is returned.
    pub async fn get(
        &self,
        bucket: &str,
        key: &str,
        expected_checksum: &str,
    ) -> StorageResult<(File, ObjectInfo)> {
        let file_path = self.object_path(bucket, key);
        let mut file = File::open(&file_path)
            .await
            .map_err(|err| Self::not_found_or_io(err, bucket, key))?;
        let meta = file.metadata().await?;

        let (matches, actual) = self.checksum.verify(&mut file, expected_checksum).await?;
        if !matches {
            debug!(
                "checksum mismatch for {}/{}: got {}, expected {}",
                bucket, key, actual, expected_checksum
            );
            return Err(StorageError::InvalidChecksum {
                got: actual,
                expected: expected_checksum.to_string(),
            });
        }

        file.seek(SeekFrom::Start(0)).await?;

        let info = ObjectInfo {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: meta.len(),
            checksum: actual,
            created_at: DateTime::<Utc>::from(meta.modified()?),
            path: file_path,
        };
        Ok((file, info))
    }

    pub async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let file_path = self.object_path(bucket, key);
        fs::remove_file(&file_path)
            .await
            .map_err(|err| Self::not_found_or_io(err, bucket, key))?;
        debug!("removed physical file {}", file_path.display());
        Ok(())
    }

    /// `false` when the path is absent; any other stat failure is an error.
    pub async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        match fs::metadata(self.object_path(bucket, key)).await {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    /// List the regular entries directly under a bucket, sorted by key.
    ///
    /// Sizes and times come from filesystem metadata; checksums are left
    /// empty since listing never reads object bodies.
    pub async fn list_objects(&self, bucket: &str) -> StorageResult<Vec<ObjectInfo>> {
        let bucket_root = self.bucket_root(bucket);
        let mut entries = fs::read_dir(&bucket_root).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::BucketNotFound(bucket.to_string())
            } else {
                StorageError::Io(err)
            }
        })?;

        let mut objects = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                continue;
            }
            let Ok(key) = entry.file_name().into_string() else {
                debug!("skipping non UTF-8 entry {}", entry.path().display());
                continue;
            };
            objects.push(ObjectInfo {
                bucket: bucket.to_string(),
                key,
                size: meta.len(),
                checksum: String::new(),
                created_at: DateTime::<Utc>::from(meta.modified()?),
                path: entry.path(),
            });
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));

        debug!("listed {} objects in bucket {}", objects.len(), bucket);
        Ok(objects)
    }
}

impl<C: Checksum> ObjectStorage for LocalStorage<C> {
    type Reader = File;

    async fn save<R>(&self, bucket: &str, key: &str, reader: R) -> StorageResult<ObjectInfo>
    where
        R: AsyncRead + Unpin + Send,
    {
        LocalStorage::save(self, bucket, key, reader).await
    }

    async fn get(
        &self,
        bucket: &str,
        key: &str,
        expected_checksum: &str,
    ) -> StorageResult<(File, ObjectInfo)> {
        LocalStorage::get(self, bucket, key, expected_checksum).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        LocalStorage::delete(self, bucket, key).await
    }

    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        LocalStorage::exists(self, bucket, key).await
    }

    async fn list_objects(&self, bucket: &str) -> StorageResult<Vec<ObjectInfo>> {
        LocalStorage::list_objects(self, bucket).await
    }
}

/// Bounded channel holding exactly `pipe_depth` chunks.
///
/// `mpsc::channel(n)` buffers `n` items plus one slot per sender, and there is
/// a single sender.
fn digest_channel(
    pipe_depth: usize,
) -> (
    mpsc::Sender<io::Result<Bytes>>,
    mpsc::Receiver<io::Result<Bytes>>,
) {
    mpsc::channel(pipe_depth.max(1) - 1)
}

/// Copy `reader` into `file`, forwarding every written chunk to `digest_tx`
/// in write order. Returns the number of bytes copied.
async fn copy_and_fork<R, W>(
    reader: &mut R,
    file: &mut W,
    digest_tx: &mut mpsc::Sender<io::Result<Bytes>>,
    chunk_size: usize,
) -> Result<u64, CopyError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut size: u64 = 0;
    loop {
        let mut buf = BytesMut::with_capacity(chunk_size);
        let n = reader.read_buf(&mut buf).await.map_err(CopyError::Io)?;
        if n == 0 {
            return Ok(size);
        }
        let chunk = buf.freeze();
        file.write_all(&chunk).await.map_err(CopyError::Io)?;
        digest_tx
            .send(Ok(chunk))
            .await
            .map_err(|_| CopyError::DigestGone)?;
        size += n as u64;
    }
}

async fn sync_file(file: &mut File) -> io::Result<()> {
    file.flush().await?;
    file.sync_all().await
}
