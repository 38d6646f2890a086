//! In-memory object storage backend / 内存对象存储后端
//!
//! Buckets are `BTreeMap`s so keys come back in lexicographic order and the
//! continuation token stays a stable cursor. Backs every test in the crate
//! and works as an embedded backend for small workloads.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;

use super::{ListPage, ObjectBackend, ObjectInfo};
use crate::error::{Result, StorageError};

struct StoredObject {
    data: Bytes,
    last_modified: chrono::DateTime<Utc>,
}

/// In-memory backend / 内存后端
#[derive(Default)]
pub struct MemoryBackend {
    buckets: RwLock<BTreeMap<String, BTreeMap<String, StoredObject>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects in a bucket (test helper) / 桶内对象数量
    pub fn object_count(&self, bucket: &str) -> usize {
        self.buckets
            .read()
            .get(bucket)
            .map(|b| b.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.buckets
            .read()
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::NotFound(format!("{}:{}", bucket, key)))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectInfo>> {
        Ok(self.buckets.read().get(bucket).and_then(|b| {
            b.get(key).map(|o| ObjectInfo {
                key: key.to_string(),
                size: o.data.len() as u64,
                last_modified: Some(o.last_modified),
            })
        }))
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        let mut store = self.buckets.write();
        let bucket_map = store
            .get_mut(bucket)
            .ok_or_else(|| StorageError::NotFound(format!("bucket {}", bucket)))?;
        bucket_map.insert(
            key.to_string(),
            StoredObject {
                data,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        // Deleting an absent object or bucket is a no-op / 删除不存在的对象为空操作
        if let Some(bucket_map) = self.buckets.write().get_mut(bucket) {
            bucket_map.remove(key);
        }
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        token: Option<&str>,
        max_keys: Option<usize>,
    ) -> Result<ListPage> {
        let store = self.buckets.read();
        let bucket_map = store
            .get(bucket)
            .ok_or_else(|| StorageError::NotFound(format!("bucket {}", bucket)))?;

        let mut page = ListPage::default();
        let mut count = 0usize;
        // Cursor is the last raw key consumed into this page / 游标为本页最后消费的原始键
        let mut last_key: Option<String> = None;
        let limit = max_keys.unwrap_or(usize::MAX);

        let mut iter = bucket_map
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .filter(|(k, _)| token.map(|t| k.as_str() > t).unwrap_or(true))
            .peekable();

        while let Some((key, obj)) = iter.peek().map(|(k, o)| (*k, *o)) {
            if count >= limit {
                page.truncated = true;
                page.next_token = last_key;
                return Ok(page);
            }
            iter.next();

            let rest = &key[prefix.len()..];
            match delimiter.and_then(|d| rest.find(d).map(|i| (d, i))) {
                Some((d, idx)) => {
                    // Consume the whole group so a page boundary never splits
                    // a common prefix / 整组消费，避免分页拆裂公共前缀
                    let common = format!("{}{}", prefix, &rest[..idx + d.len()]);
                    last_key = Some(key.clone());
                    while let Some((k, _)) = iter.peek() {
                        if !k.starts_with(&common) {
                            break;
                        }
                        last_key = Some((*k).clone());
                        iter.next();
                    }
                    page.common_prefixes.push(common);
                }
                None => {
                    last_key = Some(key.clone());
                    page.objects.push(ObjectInfo {
                        key: key.clone(),
                        size: obj.data.len() as u64,
                        last_modified: Some(obj.last_modified),
                    });
                }
            }
            count += 1;
        }

        Ok(page)
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()> {
        let data = self.get_object(src_bucket, src_key).await?;
        self.put_object(dst_bucket, dst_key, data).await
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.buckets
            .write()
            .entry(bucket.to_string())
            .or_default();
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.buckets.write().remove(bucket);
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        Ok(self.buckets.read().keys().cloned().collect())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.buckets.read().contains_key(bucket))
    }
}
