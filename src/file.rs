//! Virtual file handle / 虚拟文件句柄
//!
//! A stateless view of one object as a file. Nothing is cached: existence
//! and metadata are live queries, and the handle holds no lifecycle of its
//! own. Moves are copy-then-delete and therefore not atomic; a failure
//! between the two phases leaves both copies present.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::backend::ObjectBackend;
use crate::codec;
use crate::config::ConsistencyConfig;
use crate::directory::VirtualDirectory;
use crate::error::{Result, StorageError};
use crate::stream::{ObjectStream, OpenMode, StreamAccess};

/// Live file attributes / 文件属性
///
/// Zero-value defaults stand in for a missing object so callers can probe
/// without branching on errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileMetadata {
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One object viewed as a file / 将单个对象视为文件
#[derive(Clone)]
pub struct VirtualFile {
    backend: Arc<dyn ObjectBackend>,
    bucket: String,
    key: String,
    consistency: ConsistencyConfig,
}

impl std::fmt::Debug for VirtualFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualFile")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .finish()
    }
}

impl VirtualFile {
    /// Create a handle; directory-shaped paths are rejected / 创建句柄
    pub fn new(backend: Arc<dyn ObjectBackend>, bucket: &str, path: &str) -> Result<Self> {
        let key = codec::file_key(path)?;
        Ok(Self {
            backend,
            bucket: bucket.to_string(),
            key,
            consistency: ConsistencyConfig::default(),
        })
    }

    pub fn with_consistency(mut self, consistency: ConsistencyConfig) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Unqualified file name / 文件名
    pub fn name(&self) -> &str {
        codec::leaf_name(&self.key)
    }

    /// Directory containing this file / 所在目录
    pub fn parent_directory(&self) -> VirtualDirectory {
        VirtualDirectory::from_prefix(
            self.backend.clone(),
            Some(self.bucket.clone()),
            codec::parent_key(&self.key),
        )
        .with_consistency(self.consistency.clone())
    }

    /// Existence probe; "not found" is `false`, never an error / 存在性探测
    pub async fn exists(&self) -> Result<bool> {
        Ok(self
            .backend
            .head_object(&self.bucket, &self.key)
            .await?
            .is_some())
    }

    /// Existence of the file and of its bucket, distinguished
    /// 区分文件与桶的存在性
    pub async fn exists_checked(&self) -> Result<(bool, bool)> {
        if !self.backend.bucket_exists(&self.bucket).await? {
            return Ok((false, false));
        }
        Ok((self.exists().await?, true))
    }

    /// Live metadata; zero-value defaults when absent / 实时元数据
    pub async fn metadata(&self) -> Result<FileMetadata> {
        Ok(self
            .backend
            .head_object(&self.bucket, &self.key)
            .await?
            .map(|info| FileMetadata {
                size: info.size,
                last_modified: info.last_modified,
            })
            .unwrap_or_default())
    }

    /// Copy to `(target_bucket, target_key)` on the same backend
    /// 复制到同后端的目标位置
    ///
    /// A directory-style target key (empty or `/`-terminated) receives this
    /// file's own name appended.
    pub async fn copy_to(
        &self,
        target_bucket: &str,
        target_key: &str,
        overwrite: bool,
    ) -> Result<VirtualFile> {
        if codec::is_directory_key(target_key) {
            let into_dir = format!("{}{}", target_key, self.name());
            return Box::pin(self.copy_to(target_bucket, &into_dir, overwrite)).await;
        }

        let target = VirtualFile {
            backend: self.backend.clone(),
            bucket: target_bucket.to_string(),
            key: target_key.to_string(),
            consistency: self.consistency.clone(),
        };
        self.copy_to_file(&target, overwrite).await?;
        Ok(target)
    }

    /// Copy to another handle, possibly on a different backend instance
    /// 复制到可能位于不同后端实例的句柄
    ///
    /// Same backend instance: server-side copy. Different instances: the
    /// content is streamed through this process.
    pub async fn copy_to_file(&self, target: &VirtualFile, overwrite: bool) -> Result<()> {
        if !overwrite && target.exists().await? {
            return Err(StorageError::AlreadyExists(format!(
                "{}:{}",
                target.bucket, target.key
            )));
        }

        if Arc::ptr_eq(&self.backend, &target.backend) {
            tracing::debug!(
                "server-side copy {}:{} -> {}:{}",
                self.bucket,
                self.key,
                target.bucket,
                target.key
            );
            self.backend
                .copy_object(&self.bucket, &self.key, &target.bucket, &target.key)
                .await
        } else {
            tracing::debug!(
                "streamed copy {}:{} -> {}:{}",
                self.bucket,
                self.key,
                target.bucket,
                target.key
            );
            let data = self.backend.get_object(&self.bucket, &self.key).await?;
            target
                .backend
                .put_object(&target.bucket, &target.key, data)
                .await
        }
    }

    /// Copy the object to a local file / 复制到本地文件
    pub async fn copy_to_local(&self, path: &Path, overwrite: bool) -> Result<()> {
        if !overwrite && tokio::fs::try_exists(path).await? {
            return Err(StorageError::AlreadyExists(path.display().to_string()));
        }
        let data = self.backend.get_object(&self.bucket, &self.key).await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &data).await?;
        Ok(())
    }

    /// Upload a local file into this object / 从本地文件上传
    ///
    /// Goes through the buffered stream so a missing bucket is created
    /// lazily on flush.
    pub async fn copy_from_local(&self, path: &Path, overwrite: bool) -> Result<()> {
        if !tokio::fs::try_exists(path).await? {
            return Err(StorageError::NotFound(path.display().to_string()));
        }
        if !overwrite && self.exists().await? {
            return Err(StorageError::AlreadyExists(format!(
                "{}:{}",
                self.bucket, self.key
            )));
        }

        let data = tokio::fs::read(path).await?;
        let mut stream = self.create().await?;
        stream.write(&data)?;
        stream.close().await
    }

    /// Copy then delete the source; NOT atomic / 先复制后删除源，非原子
    pub async fn move_to(
        &self,
        target_bucket: &str,
        target_key: &str,
        overwrite: bool,
    ) -> Result<VirtualFile> {
        let target = self.copy_to(target_bucket, target_key, overwrite).await?;
        self.delete().await?;
        Ok(target)
    }

    /// Upload then delete the local source; NOT atomic / 上传后删除本地源，非原子
    pub async fn move_from_local(&self, path: &Path, overwrite: bool) -> Result<()> {
        self.copy_from_local(path, overwrite).await?;
        tokio::fs::remove_file(path).await?;
        Ok(())
    }

    /// Replace `destination` with this file's content / 以本文件内容替换目标
    ///
    /// With a backup target, the destination's current content is copied
    /// there first. The final source delete makes this copy-then-delete,
    /// with the same partial-failure window as [`VirtualFile::move_to`].
    pub async fn replace(
        &self,
        destination: &VirtualFile,
        backup: Option<&VirtualFile>,
    ) -> Result<()> {
        if self.bucket == destination.bucket && self.key == destination.key {
            return Err(StorageError::InvalidArgument(
                "replace destination equals source".to_string(),
            ));
        }

        if let Some(backup) = backup {
            destination.copy_to_file(backup, true).await?;
        }
        self.copy_to_file(destination, true).await?;
        self.delete().await
    }

    /// Delete the object; absent objects are a no-op / 删除对象
    ///
    /// The parent's marker is re-created afterwards so deleting the last
    /// file of a directory does not delete the directory itself.
    pub async fn delete(&self) -> Result<()> {
        if !self.exists().await? {
            return Ok(());
        }

        self.backend.delete_object(&self.bucket, &self.key).await?;

        let parent = codec::parent_key(&self.key);
        if !parent.is_empty() {
            self.backend
                .put_object(&self.bucket, &parent, bytes::Bytes::new())
                .await?;
        }
        Ok(())
    }

    /// Open for reading / 打开读取流
    pub async fn open_read(&self) -> Result<ObjectStream> {
        self.open_stream(OpenMode::Open, StreamAccess::Read).await
    }

    /// Open for writing, creating the object if needed / 打开写入流
    pub async fn open_write(&self) -> Result<ObjectStream> {
        self.open_stream(OpenMode::OpenOrCreate, StreamAccess::Write)
            .await
    }

    /// Create (or overwrite on flush) / 创建流
    pub async fn create(&self) -> Result<ObjectStream> {
        self.open_stream(OpenMode::Create, StreamAccess::ReadWrite)
            .await
    }

    /// Open with an explicit mode and access / 以指定模式与访问方式打开
    pub async fn open_stream(&self, mode: OpenMode, access: StreamAccess) -> Result<ObjectStream> {
        ObjectStream::open(
            self.backend.clone(),
            &self.bucket,
            &self.key,
            mode,
            access,
            self.consistency.clone(),
        )
        .await
    }
}
