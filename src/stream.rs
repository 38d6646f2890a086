//! Buffered object stream / 缓冲对象流
//!
//! A readable/writable/seekable stream bound to a single object. All reads
//! and writes hit an in-memory buffer; the object is only uploaded on
//! [`ObjectStream::flush`] or [`ObjectStream::close`]. Not safe for use by
//! more than one logical owner at a time.

use std::io::SeekFrom;
use std::sync::Arc;

use bytes::Bytes;

use crate::backend::ObjectBackend;
use crate::codec;
use crate::config::ConsistencyConfig;
use crate::consistency::wait_for_bucket;
use crate::error::{Result, StorageError};

/// Open mode / 打开模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Seed from existing content, seek to end, forbid seeking back past it
    Append,
    /// Start empty; any existing object is overwritten on flush
    Create,
    /// Start empty; fails if the object already exists
    CreateNew,
    /// Seed from existing content; fails if the object does not exist
    Open,
    /// Seed from existing content if present, else start empty
    OpenOrCreate,
    /// Discard existing content; fails if the object does not exist
    Truncate,
}

/// Access requested on the stream / 流访问方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAccess {
    Read,
    Write,
    ReadWrite,
}

/// In-memory buffered stream over one object / 单对象内存缓冲流
pub struct ObjectStream {
    backend: Arc<dyn ObjectBackend>,
    bucket: String,
    key: String,
    access: StreamAccess,
    buffer: Vec<u8>,
    position: usize,
    /// Minimum seekable position (append history floor) / 最小可寻址位置
    floor: usize,
    write_count: u64,
    flushed_count: u64,
    /// Bucket was absent when the stream was opened / 打开时桶不存在
    bucket_missing: bool,
    closed: bool,
    consistency: ConsistencyConfig,
}

impl ObjectStream {
    /// Open a stream on `(bucket, key)` / 打开对象流
    pub async fn open(
        backend: Arc<dyn ObjectBackend>,
        bucket: &str,
        key: &str,
        mode: OpenMode,
        access: StreamAccess,
        consistency: ConsistencyConfig,
    ) -> Result<Self> {
        if codec::is_directory_key(key) {
            return Err(StorageError::InvalidArgument(format!(
                "'{}' is a directory key, streams require a file key",
                key
            )));
        }

        let writable = matches!(access, StreamAccess::Write | StreamAccess::ReadWrite);
        if matches!(mode, OpenMode::Append | OpenMode::Create | OpenMode::Truncate) && !writable {
            return Err(StorageError::InvalidArgument(format!(
                "{:?} mode requires write access",
                mode
            )));
        }

        let bucket_missing = !backend.bucket_exists(bucket).await?;
        let exists = if bucket_missing {
            false
        } else {
            backend.head_object(bucket, key).await?.is_some()
        };

        let mut stream = Self {
            backend,
            bucket: bucket.to_string(),
            key: key.to_string(),
            access,
            buffer: Vec::new(),
            position: 0,
            floor: 0,
            write_count: 0,
            flushed_count: 0,
            bucket_missing,
            closed: false,
            consistency,
        };

        match mode {
            OpenMode::Append => {
                if exists {
                    stream.buffer = stream.download().await?;
                }
                stream.position = stream.buffer.len();
                stream.floor = stream.buffer.len();
            }
            OpenMode::Create => {}
            OpenMode::CreateNew => {
                if exists {
                    return Err(StorageError::AlreadyExists(format!(
                        "{}:{}",
                        stream.bucket, stream.key
                    )));
                }
            }
            OpenMode::Open => {
                if !exists {
                    return Err(StorageError::NotFound(format!(
                        "{}:{}",
                        stream.bucket, stream.key
                    )));
                }
                stream.buffer = stream.download().await?;
            }
            OpenMode::OpenOrCreate => {
                if exists {
                    if !writable {
                        return Err(StorageError::InvalidArgument(
                            "OpenOrCreate on an existing object requires write access".to_string(),
                        ));
                    }
                    stream.buffer = stream.download().await?;
                }
            }
            OpenMode::Truncate => {
                if !exists {
                    return Err(StorageError::NotFound(format!(
                        "{}:{}",
                        stream.bucket, stream.key
                    )));
                }
            }
        }

        Ok(stream)
    }

    async fn download(&self) -> Result<Vec<u8>> {
        Ok(self
            .backend
            .get_object(&self.bucket, &self.key)
            .await?
            .to_vec())
    }

    fn writable(&self) -> bool {
        matches!(self.access, StreamAccess::Write | StreamAccess::ReadWrite)
    }

    fn readable(&self) -> bool {
        matches!(self.access, StreamAccess::Read | StreamAccess::ReadWrite)
    }

    /// Buffer length / 缓冲区长度
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Current cursor position / 当前游标位置
    pub fn position(&self) -> u64 {
        self.position as u64
    }

    /// Unflushed writes pending? / 是否有未落盘的写入
    pub fn is_dirty(&self) -> bool {
        self.write_count != self.flushed_count
    }

    /// Read from the buffer at the cursor / 从游标处读取
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.readable() {
            return Err(StorageError::InvalidArgument(
                "stream was not opened for reading".to_string(),
            ));
        }
        let available = self.buffer.len().saturating_sub(self.position);
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&self.buffer[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }

    /// Read everything from the cursor to the end / 读取游标到结尾的全部内容
    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        if !self.readable() {
            return Err(StorageError::InvalidArgument(
                "stream was not opened for reading".to_string(),
            ));
        }
        let rest = self.buffer[self.position..].to_vec();
        self.position = self.buffer.len();
        Ok(rest)
    }

    /// Write at the cursor, overwriting then extending / 在游标处写入
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        if !self.writable() {
            return Err(StorageError::InvalidArgument(
                "stream was not opened for writing".to_string(),
            ));
        }
        let end = self.position + data.len();
        if end > self.buffer.len() {
            self.buffer.resize(end, 0);
        }
        self.buffer[self.position..end].copy_from_slice(data);
        self.position = end;
        self.write_count += 1;
        Ok(data.len())
    }

    /// Move the cursor; positions below the mode floor are rejected
    /// 移动游标，低于模式下限的位置被拒绝
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target: i64 = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::End(delta) => self.buffer.len() as i64 + delta,
            SeekFrom::Current(delta) => self.position as i64 + delta,
        };

        if target < self.floor as i64 {
            return Err(StorageError::InvalidArgument(format!(
                "seek to {} is below the minimum position {} established by the open mode",
                target, self.floor
            )));
        }

        self.position = target as usize;
        Ok(self.position as u64)
    }

    /// Recreate the bucket and the marker chain above the key
    /// 重建桶以及键上方的目录占位对象链
    async fn restore_bucket(&self) -> Result<()> {
        self.backend.create_bucket(&self.bucket).await?;
        wait_for_bucket(self.backend.as_ref(), &self.bucket, true, &self.consistency).await;

        let mut prefix = codec::parent_key(&self.key);
        while !prefix.is_empty() {
            self.backend
                .put_object(&self.bucket, &prefix, Bytes::new())
                .await?;
            prefix = codec::parent_key(&prefix);
        }
        Ok(())
    }

    /// Upload the buffer if anything changed since the last flush
    /// 若自上次落盘后有写入则上传缓冲区
    ///
    /// The upload always streams the whole buffer from position 0; the
    /// read/write cursor is untouched.
    pub async fn flush(&mut self) -> Result<()> {
        if !self.is_dirty() || !self.writable() {
            return Ok(());
        }

        if self.bucket_missing {
            self.restore_bucket().await?;
            self.bucket_missing = false;
        }

        let data = Bytes::copy_from_slice(&self.buffer);
        if let Err(e) = self
            .backend
            .put_object(&self.bucket, &self.key, data.clone())
            .await
        {
            // The bucket may have been deleted concurrently; recreate it and
            // retry exactly once / 桶可能被并发删除，重建后重试一次
            if !self.backend.bucket_exists(&self.bucket).await? {
                tracing::warn!(
                    "bucket {} vanished during flush of {}, recreating",
                    self.bucket,
                    self.key
                );
                self.restore_bucket().await?;
                self.backend
                    .put_object(&self.bucket, &self.key, data)
                    .await?;
            } else {
                return Err(e);
            }
        }

        self.flushed_count = self.write_count;
        Ok(())
    }

    /// Final flush and release / 最终落盘并释放
    pub async fn close(mut self) -> Result<()> {
        self.flush().await?;
        self.closed = true;
        Ok(())
    }
}

impl Drop for ObjectStream {
    fn drop(&mut self) {
        if !self.closed && self.is_dirty() {
            tracing::warn!(
                "stream for {}:{} dropped with unflushed writes, data lost",
                self.bucket,
                self.key
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn fast_wait() -> ConsistencyConfig {
        ConsistencyConfig {
            poll_interval_ms: 1,
            stable_count: 2,
            max_wait_ms: 200,
        }
    }

    async fn backend_with_bucket() -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new());
        backend.create_bucket("b").await.unwrap();
        backend
    }

    async fn open(
        backend: &Arc<MemoryBackend>,
        key: &str,
        mode: OpenMode,
        access: StreamAccess,
    ) -> Result<ObjectStream> {
        ObjectStream::open(
            backend.clone() as Arc<dyn ObjectBackend>,
            "b",
            key,
            mode,
            access,
            fast_wait(),
        )
        .await
    }

    #[tokio::test]
    async fn write_close_read_roundtrip() {
        let backend = backend_with_bucket().await;

        let mut w = open(&backend, "dir/a.bin", OpenMode::Create, StreamAccess::ReadWrite)
            .await
            .unwrap();
        w.write(b"hello world").unwrap();
        w.close().await.unwrap();

        let mut r = open(&backend, "dir/a.bin", OpenMode::Open, StreamAccess::Read)
            .await
            .unwrap();
        assert_eq!(r.read_to_end().unwrap(), b"hello world");
        r.close().await.unwrap();
    }

    #[tokio::test]
    async fn directory_key_is_rejected() {
        let backend = backend_with_bucket().await;
        assert!(matches!(
            open(&backend, "dir/", OpenMode::Create, StreamAccess::Write).await,
            Err(StorageError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn create_new_fails_when_object_exists() {
        let backend = backend_with_bucket().await;
        backend
            .put_object("b", "a.txt", Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert!(matches!(
            open(&backend, "a.txt", OpenMode::CreateNew, StreamAccess::Write).await,
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn open_and_truncate_require_existing_object() {
        let backend = backend_with_bucket().await;
        assert!(matches!(
            open(&backend, "missing", OpenMode::Open, StreamAccess::Read).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            open(&backend, "missing", OpenMode::Truncate, StreamAccess::Write).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn write_modes_require_write_access() {
        let backend = backend_with_bucket().await;
        for mode in [OpenMode::Append, OpenMode::Create, OpenMode::Truncate] {
            assert!(matches!(
                open(&backend, "a.txt", mode, StreamAccess::Read).await,
                Err(StorageError::InvalidArgument(_))
            ));
        }
    }

    #[tokio::test]
    async fn append_floor_blocks_rewriting_history() {
        let backend = backend_with_bucket().await;
        backend
            .put_object("b", "log.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let mut s = open(&backend, "log.txt", OpenMode::Append, StreamAccess::Write)
            .await
            .unwrap();
        assert_eq!(s.position(), 5);

        assert!(matches!(
            s.seek(SeekFrom::Start(2)),
            Err(StorageError::InvalidArgument(_))
        ));
        assert!(matches!(
            s.seek(SeekFrom::End(-1)),
            Err(StorageError::InvalidArgument(_))
        ));
        assert_eq!(s.seek(SeekFrom::Start(5)).unwrap(), 5);

        s.write(b" world").unwrap();
        s.close().await.unwrap();
        assert_eq!(
            backend.get_object("b", "log.txt").await.unwrap().as_ref(),
            b"hello world"
        );
    }

    #[tokio::test]
    async fn truncate_discards_existing_content() {
        let backend = backend_with_bucket().await;
        backend
            .put_object("b", "a.txt", Bytes::from_static(b"old content"))
            .await
            .unwrap();

        let mut s = open(&backend, "a.txt", OpenMode::Truncate, StreamAccess::Write)
            .await
            .unwrap();
        assert_eq!(s.len(), 0);
        s.write(b"new").unwrap();
        s.close().await.unwrap();
        assert_eq!(backend.get_object("b", "a.txt").await.unwrap().as_ref(), b"new");
    }

    #[tokio::test]
    async fn flush_is_noop_without_writes() {
        let backend = backend_with_bucket().await;
        let mut s = open(&backend, "a.txt", OpenMode::Create, StreamAccess::Write)
            .await
            .unwrap();
        s.flush().await.unwrap();
        // Nothing written since open, so nothing uploaded / 未写入则不上传
        assert!(backend.head_object("b", "a.txt").await.unwrap().is_none());

        s.write(b"data").unwrap();
        s.flush().await.unwrap();
        assert!(backend.head_object("b", "a.txt").await.unwrap().is_some());

        // Counter unchanged: the backend copy is left alone / 计数未变则不再上传
        backend.delete_object("b", "a.txt").await.unwrap();
        s.flush().await.unwrap();
        assert!(backend.head_object("b", "a.txt").await.unwrap().is_none());
        s.close().await.unwrap();
    }

    #[tokio::test]
    async fn flush_lazily_creates_missing_bucket() {
        let backend = Arc::new(MemoryBackend::new());
        let mut s = ObjectStream::open(
            backend.clone() as Arc<dyn ObjectBackend>,
            "fresh",
            "dir/sub/a.txt",
            OpenMode::Create,
            StreamAccess::Write,
            fast_wait(),
        )
        .await
        .unwrap();
        s.write(b"payload").unwrap();
        s.close().await.unwrap();

        assert!(backend.bucket_exists("fresh").await.unwrap());
        assert_eq!(
            backend.get_object("fresh", "dir/sub/a.txt").await.unwrap().as_ref(),
            b"payload"
        );
        // Marker chain keeps the ancestors listable / 占位对象链保持祖先目录可见
        assert!(backend.head_object("fresh", "dir/").await.unwrap().is_some());
        assert!(backend.head_object("fresh", "dir/sub/").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn flush_retries_once_after_concurrent_bucket_delete() {
        let backend = backend_with_bucket().await;
        let mut s = open(&backend, "dir/a.txt", OpenMode::Create, StreamAccess::Write)
            .await
            .unwrap();
        s.write(b"survives").unwrap();

        backend.delete_bucket("b").await.unwrap();

        s.close().await.unwrap();
        assert!(backend.bucket_exists("b").await.unwrap());
        assert_eq!(
            backend.get_object("b", "dir/a.txt").await.unwrap().as_ref(),
            b"survives"
        );
        assert!(backend.head_object("b", "dir/").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn read_only_stream_rejects_writes() {
        let backend = backend_with_bucket().await;
        backend
            .put_object("b", "a.txt", Bytes::from_static(b"x"))
            .await
            .unwrap();
        let mut s = open(&backend, "a.txt", OpenMode::Open, StreamAccess::Read)
            .await
            .unwrap();
        assert!(matches!(
            s.write(b"nope"),
            Err(StorageError::InvalidArgument(_))
        ));
        s.close().await.unwrap();
    }
}
