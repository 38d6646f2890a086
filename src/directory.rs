//! Virtual directory handle / 虚拟目录句柄
//!
//! Directories do not exist in the backend; they are synthesized from key
//! prefixes plus optional empty marker objects, and recomputed from prefix
//! listings on demand. A handle is a stateless view: `(bucket, prefix)`
//! where the prefix is empty (bucket root) or `/`-terminated. A handle with
//! no bucket is the true storage root.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::backend::{ObjectBackend, MAX_DELETE_BATCH};
use crate::codec;
use crate::config::ConsistencyConfig;
use crate::consistency::wait_for_bucket;
use crate::error::{Result, StorageError};
use crate::file::VirtualFile;
use crate::utils;

/// Child entry produced by enumeration / 枚举产生的子项
#[derive(Debug, Clone, PartialEq)]
pub struct FsEntry {
    /// Decoded leaf name / 解码后的名称
    pub name: String,
    /// Raw backend key (directory entries end in `/`) / 原始对象键
    pub key: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Enumeration depth / 枚举深度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// Immediate children only / 仅直接子项
    TopLevel,
    /// Every descendant, depth-first / 所有层级（深度优先）
    Recursive,
}

/// A key prefix viewed as a directory / 将键前缀视为目录
#[derive(Clone)]
pub struct VirtualDirectory {
    backend: Arc<dyn ObjectBackend>,
    bucket: Option<String>,
    prefix: String,
    consistency: ConsistencyConfig,
}

type BoxedResult<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

impl VirtualDirectory {
    /// Create a handle / 创建句柄
    ///
    /// `bucket=None` with a non-empty path is rejected: only the true root
    /// lives outside a bucket.
    pub fn new(backend: Arc<dyn ObjectBackend>, bucket: Option<&str>, path: &str) -> Result<Self> {
        let prefix = codec::directory_key(path);
        if bucket.is_none() && !prefix.is_empty() {
            return Err(StorageError::InvalidArgument(format!(
                "a bucket is required for the non-root directory '{}'",
                path
            )));
        }
        Ok(Self {
            backend,
            bucket: bucket.map(|b| b.to_string()),
            prefix,
            consistency: ConsistencyConfig::default(),
        })
    }

    /// Build from an already-encoded prefix / 由已编码的前缀构建
    pub(crate) fn from_prefix(
        backend: Arc<dyn ObjectBackend>,
        bucket: Option<String>,
        prefix: String,
    ) -> Self {
        Self {
            backend,
            bucket,
            prefix,
            consistency: ConsistencyConfig::default(),
        }
    }

    pub fn with_consistency(mut self, consistency: ConsistencyConfig) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Directory name (bucket name at bucket root, empty at true root)
    /// 目录名称
    pub fn name(&self) -> &str {
        if self.prefix.is_empty() {
            self.bucket.as_deref().unwrap_or("")
        } else {
            codec::leaf_name(&self.prefix)
        }
    }

    fn require_bucket(&self) -> Result<&str> {
        self.bucket.as_deref().ok_or_else(|| {
            StorageError::InvalidArgument("operation requires a bucket".to_string())
        })
    }

    /// Existence probe / 存在性探测
    ///
    /// The true root always exists; a bucket root exists when the bucket
    /// does; a sub-directory exists when at least one object carries the
    /// prefix.
    pub async fn exists(&self) -> Result<bool> {
        let bucket = match self.bucket.as_deref() {
            None => return Ok(true),
            Some(b) => b,
        };
        if !self.backend.bucket_exists(bucket).await? {
            return Ok(false);
        }
        if self.prefix.is_empty() {
            return Ok(true);
        }

        let page = self
            .backend
            .list_objects(bucket, &self.prefix, None, None, Some(1))
            .await?;
        Ok(!page.objects.is_empty())
    }

    /// Create the directory; idempotent / 创建目录（幂等）
    ///
    /// A missing bucket is created first and waited on for consistency; a
    /// non-root prefix also gets its empty marker object.
    pub async fn create(&self) -> Result<()> {
        let bucket = match self.bucket.as_deref() {
            None => return Ok(()), // true root always exists / 真根目录恒存在
            Some(b) => b,
        };

        if !self.backend.bucket_exists(bucket).await? {
            tracing::debug!("creating bucket {}", bucket);
            self.backend.create_bucket(bucket).await?;
            wait_for_bucket(self.backend.as_ref(), bucket, true, &self.consistency).await;
        }

        if !self.prefix.is_empty() {
            self.backend
                .put_object(bucket, &self.prefix, Bytes::new())
                .await?;
        }
        Ok(())
    }

    /// Delete the directory / 删除目录
    ///
    /// `recursive=false` on a non-empty directory fails with
    /// `InvalidArgument`. Deleting a bucket root removes the bucket itself
    /// (with a consistency wait); deleting a sub-directory removes its
    /// marker and re-creates the parent's marker so the parent stays
    /// listable.
    pub async fn delete(&self, recursive: bool) -> Result<()> {
        let bucket = self.require_bucket()?;
        if !self.backend.bucket_exists(bucket).await? {
            return Ok(());
        }

        if recursive {
            self.delete_contents(bucket).await?;
        } else if !self.is_empty_of_children(bucket).await? {
            return Err(StorageError::InvalidArgument(format!(
                "directory '{}' is not empty, use recursive delete",
                self.prefix
            )));
        }

        if self.prefix.is_empty() {
            tracing::debug!("deleting bucket {}", bucket);
            self.backend.delete_bucket(bucket).await?;
            wait_for_bucket(self.backend.as_ref(), bucket, false, &self.consistency).await;
        } else {
            self.backend.delete_object(bucket, &self.prefix).await?;
            let parent = codec::parent_key(&self.prefix);
            if !parent.is_empty() {
                self.backend.put_object(bucket, &parent, Bytes::new()).await?;
            }
        }
        Ok(())
    }

    /// Paginate and batch-delete everything under the prefix
    /// 分页批量删除前缀下的全部对象
    async fn delete_contents(&self, bucket: &str) -> Result<()> {
        let mut token: Option<String> = None;
        loop {
            let page = self
                .backend
                .list_objects(
                    bucket,
                    &self.prefix,
                    None,
                    token.as_deref(),
                    Some(MAX_DELETE_BATCH),
                )
                .await?;

            let keys: Vec<String> = page.objects.into_iter().map(|o| o.key).collect();
            if !keys.is_empty() {
                tracing::debug!("batch deleting {} objects under {}", keys.len(), self.prefix);
                self.backend.delete_objects(bucket, &keys).await?;
            }

            if !page.truncated {
                return Ok(());
            }
            token = page.next_token;
        }
    }

    /// Any child besides the own marker? / 除自身占位对象外是否还有子项
    async fn is_empty_of_children(&self, bucket: &str) -> Result<bool> {
        let page = self
            .backend
            .list_objects(bucket, &self.prefix, Some("/"), None, Some(2))
            .await?;
        let has_child = !page.common_prefixes.is_empty()
            || page.objects.iter().any(|o| o.key != self.prefix);
        Ok(!has_child)
    }

    /// Enumerate children matching a glob pattern / 按通配符枚举子项
    ///
    /// Directories and files come from one delimiter listing; the
    /// directory's own marker object is excluded. `Depth::Recursive`
    /// descends every child directory regardless of the pattern; the
    /// pattern only filters what is returned.
    pub async fn entries(&self, pattern: Option<&str>, depth: Depth) -> Result<Vec<FsEntry>> {
        let matcher = pattern.map(utils::glob_to_regex).transpose()?;
        let all = self.collect_entries(depth).await?;
        Ok(all
            .into_iter()
            .filter(|e| utils::matches_pattern(&e.name, matcher.as_ref()))
            .collect())
    }

    /// Files only / 仅文件
    pub async fn files(&self, pattern: Option<&str>, depth: Depth) -> Result<Vec<FsEntry>> {
        Ok(self
            .entries(pattern, depth)
            .await?
            .into_iter()
            .filter(|e| !e.is_dir)
            .collect())
    }

    /// Directories only / 仅目录
    pub async fn directories(&self, pattern: Option<&str>, depth: Depth) -> Result<Vec<FsEntry>> {
        Ok(self
            .entries(pattern, depth)
            .await?
            .into_iter()
            .filter(|e| e.is_dir)
            .collect())
    }

    async fn collect_entries(&self, depth: Depth) -> Result<Vec<FsEntry>> {
        match self.bucket.as_deref() {
            // True root: buckets are the child directories / 真根目录的子项是桶
            None => {
                let mut entries = Vec::new();
                for bucket in self.backend.list_buckets().await? {
                    entries.push(bucket_entry(&bucket));
                    if depth == Depth::Recursive {
                        entries.extend(self.walk(&bucket, String::new(), depth).await?);
                    }
                }
                Ok(entries)
            }
            Some(bucket) => self.walk(bucket, self.prefix.clone(), depth).await,
        }
    }

    fn walk<'a>(
        &'a self,
        bucket: &'a str,
        prefix: String,
        depth: Depth,
    ) -> BoxedResult<'a, Vec<FsEntry>> {
        Box::pin(async move {
            let mut entries = Vec::new();
            let mut child_dirs = Vec::new();
            let mut token: Option<String> = None;

            loop {
                let page = self
                    .backend
                    .list_objects(bucket, &prefix, Some("/"), token.as_deref(), None)
                    .await?;

                for common in page.common_prefixes {
                    child_dirs.push(common.clone());
                    entries.push(FsEntry {
                        name: decoded_leaf(&common),
                        key: common,
                        is_dir: true,
                        size: 0,
                        modified: None,
                    });
                }
                for obj in page.objects {
                    // Skip the directory's own marker / 跳过目录自身的占位对象
                    if obj.key == prefix || obj.key.ends_with('/') {
                        continue;
                    }
                    entries.push(FsEntry {
                        name: decoded_leaf(&obj.key),
                        key: obj.key,
                        is_dir: false,
                        size: obj.size,
                        modified: obj.last_modified,
                    });
                }

                if !page.truncated {
                    break;
                }
                token = page.next_token;
            }

            if depth == Depth::Recursive {
                for child in child_dirs {
                    entries.extend(self.walk(bucket, child, depth).await?);
                }
            }
            Ok(entries)
        })
    }

    /// File handle for a direct child; pure path construction, no I/O
    /// 构造子文件句柄（纯路径运算，无IO）
    pub fn get_file(&self, name: &str) -> Result<VirtualFile> {
        if self.bucket.is_none() {
            return Err(StorageError::NotSupported(
                "files cannot exist at the storage root".to_string(),
            ));
        }
        let name = validate_child_name(name)?;
        let path = format!("{}{}", decoded_prefix(&self.prefix), name);
        VirtualFile::new(
            self.backend.clone(),
            self.bucket.as_deref().unwrap_or_default(),
            &path,
        )
        .map(|f| f.with_consistency(self.consistency.clone()))
    }

    /// Directory handle for a direct child / 构造子目录句柄
    ///
    /// At the true root the child is a bucket root.
    pub fn get_directory(&self, name: &str) -> Result<VirtualDirectory> {
        let name = validate_child_name(name)?;
        match self.bucket.as_deref() {
            None => Ok(Self::from_prefix(
                self.backend.clone(),
                Some(name.to_string()),
                String::new(),
            )
            .with_consistency(self.consistency.clone())),
            Some(bucket) => {
                let prefix = format!("{}{}/", self.prefix, codec::encode_key(name));
                Ok(Self::from_prefix(
                    self.backend.clone(),
                    Some(bucket.to_string()),
                    prefix,
                )
                .with_consistency(self.consistency.clone()))
            }
        }
    }

    /// Newest last-modified under the prefix / 前缀下最新的修改时间
    pub async fn latest_write_time(&self) -> Result<Option<DateTime<Utc>>> {
        let bucket = self.require_bucket()?;
        if !self.backend.bucket_exists(bucket).await? {
            return Ok(None);
        }

        let mut latest: Option<DateTime<Utc>> = None;
        let mut token: Option<String> = None;
        loop {
            let page = self
                .backend
                .list_objects(bucket, &self.prefix, None, token.as_deref(), None)
                .await?;
            for obj in &page.objects {
                if obj.last_modified > latest {
                    latest = obj.last_modified;
                }
            }
            if !page.truncated {
                return Ok(latest);
            }
            token = page.next_token;
        }
    }

    /// Copy the subtree into `target` / 将子树复制到目标目录
    ///
    /// With `changed_since`, the whole subtree is skipped when nothing in it
    /// was written after the threshold, and individual files are copied only
    /// when newer. The first file failure aborts; already-copied files stay.
    pub fn copy_to<'a>(
        &'a self,
        target: &'a VirtualDirectory,
        changed_since: Option<DateTime<Utc>>,
    ) -> BoxedResult<'a, ()> {
        Box::pin(async move {
            if let Some(threshold) = changed_since {
                match self.latest_write_time().await? {
                    Some(latest) if latest > threshold => {}
                    _ => {
                        tracing::debug!(
                            "skipping copy of {}: no writes after threshold",
                            self.prefix
                        );
                        return Ok(());
                    }
                }
            }

            target.create().await?;

            for entry in self.collect_entries(Depth::TopLevel).await? {
                if entry.is_dir {
                    let src = self.get_directory(&entry.name)?;
                    let dst = target.get_directory(&entry.name)?;
                    src.copy_to(&dst, changed_since).await?;
                } else {
                    if let Some(threshold) = changed_since {
                        if entry.modified.map(|m| m <= threshold).unwrap_or(true) {
                            continue;
                        }
                    }
                    let src = self.get_file(&entry.name)?;
                    let dst = target.get_file(&entry.name)?;
                    src.copy_to_file(&dst, true).await?;
                }
            }
            Ok(())
        })
    }

    /// Copy the subtree to a local directory / 将子树复制到本地目录
    ///
    /// Every computed child path must stay under `dest`; names that would
    /// escape it are rejected before any write.
    pub fn copy_to_local<'a>(&'a self, dest: &'a Path) -> BoxedResult<'a, ()> {
        Box::pin(async move {
            tokio::fs::create_dir_all(dest).await?;

            for entry in self.collect_entries(Depth::TopLevel).await? {
                let local_child = safe_local_child(dest, &entry.name)?;
                if entry.is_dir {
                    self.get_directory(&entry.name)?
                        .copy_to_local(&local_child)
                        .await?;
                } else {
                    self.get_file(&entry.name)?
                        .copy_to_local(&local_child, true)
                        .await?;
                }
            }
            Ok(())
        })
    }

    /// Upload a local directory tree into this directory / 上传本地目录树
    pub fn copy_from_local<'a>(&'a self, src: &'a Path) -> BoxedResult<'a, ()> {
        Box::pin(async move {
            if !tokio::fs::try_exists(src).await? {
                return Err(StorageError::NotFound(src.display().to_string()));
            }
            self.create().await?;

            let mut dir = tokio::fs::read_dir(src).await?;
            while let Some(item) = dir.next_entry().await? {
                let name = item.file_name().to_string_lossy().into_owned();
                let file_type = item.file_type().await?;
                if file_type.is_dir() {
                    self.get_directory(&name)?
                        .copy_from_local(&item.path())
                        .await?;
                } else if file_type.is_file() {
                    self.get_file(&name)?
                        .copy_from_local(&item.path(), true)
                        .await?;
                }
            }
            Ok(())
        })
    }

    /// Copy then recursively delete the source; NOT atomic
    /// 先复制后递归删除源，非原子
    pub async fn move_to(&self, target: &VirtualDirectory) -> Result<()> {
        self.copy_to(target, None).await?;
        self.delete(true).await
    }

    /// Upload then delete the local source tree / 上传后删除本地源目录
    pub async fn move_from_local(&self, src: &Path) -> Result<()> {
        self.copy_from_local(src).await?;
        tokio::fs::remove_dir_all(src).await?;
        Ok(())
    }

    /// Download then recursively delete this directory / 下载后递归删除本目录
    pub async fn move_to_local(&self, dest: &Path) -> Result<()> {
        self.copy_to_local(dest).await?;
        self.delete(true).await
    }
}

fn bucket_entry(bucket: &str) -> FsEntry {
    FsEntry {
        name: bucket.to_string(),
        key: String::new(),
        is_dir: true,
        size: 0,
        modified: None,
    }
}

fn decoded_leaf(key: &str) -> String {
    let leaf = codec::leaf_name(key);
    codec::decode_key(leaf).unwrap_or_else(|_| leaf.to_string())
}

fn decoded_prefix(prefix: &str) -> String {
    codec::decode_key(prefix).unwrap_or_else(|_| prefix.to_string())
}

/// Reject child names that would traverse outside the parent / 拒绝越界的子项名称
fn validate_child_name(name: &str) -> Result<&str> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(StorageError::InvalidArgument(format!(
            "invalid child name '{}'",
            name
        )));
    }
    Ok(name)
}

/// Join a child name under a local root, rejecting escapes / 拼接并校验本地子路径
fn safe_local_child(root: &Path, name: &str) -> Result<PathBuf> {
    validate_child_name(name)?;
    let child = root.join(name);
    if !child.starts_with(root) {
        return Err(StorageError::PathEscapesRoot(child.display().to_string()));
    }
    Ok(child)
}
