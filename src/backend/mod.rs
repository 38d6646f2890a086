//! Object storage backend interface (provides only primitive operations)
//! 对象存储后端接口（只提供原语操作）
//!
//! Everything above this trait synthesizes filesystem semantics; everything
//! below it is a flat key-value store addressed by (bucket, key). Listing
//! returns keys in lexicographic order so the continuation token is a stable
//! pagination cursor.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::Result;

pub mod memory;
pub mod s3;

pub use memory::MemoryBackend;
pub use s3::S3Backend;

/// Maximum object count per batch delete request / 批量删除单次请求上限
pub const MAX_DELETE_BATCH: usize = 1000;

/// Metadata of a stored object / 对象元数据
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of a prefix listing / 前缀列举的一页
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Objects under the prefix, sorted by key / 前缀下的对象（按键排序）
    pub objects: Vec<ObjectInfo>,
    /// Immediate child directories when a delimiter is given / 公共前缀
    pub common_prefixes: Vec<String>,
    /// Cursor for the next page / 下一页游标
    pub next_token: Option<String>,
    pub truncated: bool,
}

/// Object store client / 对象存储客户端
///
/// All operations are addressed by `(bucket, key)`. "Not found" on probes is
/// a value, not an error; transport failures surface as
/// [`StorageError::Backend`](crate::StorageError::Backend).
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Backend name / 后端名称
    fn name(&self) -> &str;

    /// Fetch an object's content / 获取对象内容
    /// Returns `NotFound` when the object is absent.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes>;

    /// Metadata probe; `Ok(None)` when the object is absent / 元数据探测
    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectInfo>>;

    /// Store an object / 写入对象
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<()>;

    /// Delete an object; deleting an absent object is not an error / 删除对象
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// Batch delete; callers cap batches at [`MAX_DELETE_BATCH`] / 批量删除
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()> {
        for key in keys {
            self.delete_object(bucket, key).await?;
        }
        Ok(())
    }

    /// Prefix listing with optional delimiter and pagination cursor
    /// 前缀列举（可选分隔符与分页游标）
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        token: Option<&str>,
        max_keys: Option<usize>,
    ) -> Result<ListPage>;

    /// Server-side copy / 服务端复制
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()>;

    /// Create a bucket; creating an existing bucket is a no-op / 创建存储桶
    async fn create_bucket(&self, bucket: &str) -> Result<()>;

    /// Delete a bucket / 删除存储桶
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;

    /// List bucket names / 列出存储桶
    async fn list_buckets(&self) -> Result<Vec<String>>;

    /// Bucket existence probe / 存储桶存在性探测
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.list_buckets().await?.iter().any(|b| b == bucket))
    }
}
