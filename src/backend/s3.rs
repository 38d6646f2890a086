//! S3 object storage backend / S3对象存储后端
//!
//! Thin mapping from [`ObjectBackend`] onto rust-s3. Bucket handles are
//! cheap and cached per bucket name; region/credentials come from
//! [`S3BackendConfig`].
//!
//! rust-s3 has no multi-object delete request, so `delete_objects` issues
//! sequential single deletes, and `copy_object_internal` only copies within
//! one bucket, so cross-bucket copies fall back to download-then-upload.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::Region;

use super::{ListPage, ObjectBackend, ObjectInfo};
use crate::config::S3BackendConfig;
use crate::error::{Result, StorageError};

/// S3 backend / S3后端
pub struct S3Backend {
    config: S3BackendConfig,
    handles: Mutex<HashMap<String, Box<Bucket>>>,
}

impl S3Backend {
    pub fn new(config: S3BackendConfig) -> Self {
        Self {
            config,
            handles: Mutex::new(HashMap::new()),
        }
    }

    fn credentials(&self) -> Result<Credentials> {
        Credentials::new(
            Some(&self.config.access_key_id),
            Some(&self.config.secret_access_key),
            if self.config.session_token.is_empty() {
                None
            } else {
                Some(&self.config.session_token)
            },
            None,
            None,
        )
        .map_err(|e| StorageError::Backend(format!("failed to build S3 credentials: {}", e)))
    }

    fn region(&self) -> Region {
        if self.config.endpoint.is_empty() {
            Region::Custom {
                region: self.config.region.clone(),
                endpoint: format!("https://s3.{}.amazonaws.com", self.config.region),
            }
        } else {
            Region::Custom {
                region: self.config.region.clone(),
                endpoint: self.config.endpoint.clone(),
            }
        }
    }

    /// Get (or build and cache) the handle for a bucket / 获取桶句柄
    fn handle(&self, bucket: &str) -> Result<Box<Bucket>> {
        if let Some(handle) = self.handles.lock().get(bucket) {
            return Ok(handle.clone());
        }

        let handle = Bucket::new(bucket, self.region(), self.credentials()?)
            .map_err(|e| StorageError::Backend(format!("failed to open bucket {}: {}", bucket, e)))?;
        let handle = if self.config.force_path_style {
            handle.with_path_style()
        } else {
            handle
        };

        self.handles
            .lock()
            .insert(bucket.to_string(), handle.clone());
        Ok(handle)
    }

    fn map_error(context: &str, e: S3Error) -> StorageError {
        match e {
            S3Error::HttpFailWithBody(404, _) => StorageError::NotFound(context.to_string()),
            other => StorageError::Backend(format!("{}: {}", context, other)),
        }
    }
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[async_trait]
impl ObjectBackend for S3Backend {
    fn name(&self) -> &str {
        "s3"
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let handle = self.handle(bucket)?;
        let response = handle
            .get_object(key)
            .await
            .map_err(|e| Self::map_error(&format!("{}:{}", bucket, key), e))?;
        Ok(Bytes::from(response.to_vec()))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectInfo>> {
        let handle = self.handle(bucket)?;
        match handle.head_object(key).await {
            Ok((head, 200)) => Ok(Some(ObjectInfo {
                key: key.to_string(),
                size: head.content_length.unwrap_or(0).max(0) as u64,
                last_modified: head.last_modified.as_deref().and_then(parse_http_date),
            })),
            Ok((_, 404)) => Ok(None),
            Ok((_, code)) => Err(StorageError::Backend(format!(
                "head {}:{} returned status {}",
                bucket, key, code
            ))),
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(None),
            Err(e) => Err(StorageError::Backend(format!(
                "head {}:{} failed: {}",
                bucket, key, e
            ))),
        }
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        let handle = self.handle(bucket)?;
        handle
            .put_object(key, &data)
            .await
            .map_err(|e| Self::map_error(&format!("{}:{}", bucket, key), e))?;
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let handle = self.handle(bucket)?;
        match handle.delete_object(key).await {
            Ok(_) => Ok(()),
            // S3 delete is idempotent; a 404 here means already gone
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(()),
            Err(e) => Err(StorageError::Backend(format!(
                "delete {}:{} failed: {}",
                bucket, key, e
            ))),
        }
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        token: Option<&str>,
        max_keys: Option<usize>,
    ) -> Result<ListPage> {
        let handle = self.handle(bucket)?;
        let (result, _code) = handle
            .list_page(
                prefix.to_string(),
                delimiter.map(|d| d.to_string()),
                token.map(|t| t.to_string()),
                None,
                max_keys,
            )
            .await
            .map_err(|e| Self::map_error(&format!("list {}:{}", bucket, prefix), e))?;

        let objects = result
            .contents
            .into_iter()
            .map(|obj| ObjectInfo {
                size: obj.size as u64,
                last_modified: parse_http_date(&obj.last_modified),
                key: obj.key,
            })
            .collect();

        let common_prefixes = result
            .common_prefixes
            .unwrap_or_default()
            .into_iter()
            .map(|cp| cp.prefix)
            .collect();

        Ok(ListPage {
            objects,
            common_prefixes,
            next_token: result.next_continuation_token,
            truncated: result.is_truncated,
        })
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()> {
        if src_bucket == dst_bucket {
            let handle = self.handle(src_bucket)?;
            // Source key must be URL-encoded (non-ASCII names)
            // 源键需URL编码（中文等非ASCII字符）
            let encoded_src = urlencoding::encode(src_key);
            handle
                .copy_object_internal(encoded_src.as_ref(), dst_key)
                .await
                .map_err(|e| Self::map_error(&format!("{}:{}", src_bucket, src_key), e))?;

            // Verify the copy landed / 验证复制结果
            let (_, code) = self
                .handle(dst_bucket)?
                .head_object(dst_key)
                .await
                .map_err(|e| {
                    StorageError::Backend(format!("verify copy to {} failed: {}", dst_key, e))
                })?;
            if code != 200 {
                return Err(StorageError::Backend(format!(
                    "copy to {}:{} not visible, head returned {}",
                    dst_bucket, dst_key, code
                )));
            }
            return Ok(());
        }

        tracing::debug!(
            "cross-bucket copy {}:{} -> {}:{} via download",
            src_bucket,
            src_key,
            dst_bucket,
            dst_key
        );
        let data = self.get_object(src_bucket, src_key).await?;
        self.put_object(dst_bucket, dst_key, data).await
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let result = if self.config.force_path_style {
            Bucket::create_with_path_style(
                bucket,
                self.region(),
                self.credentials()?,
                s3::BucketConfiguration::default(),
            )
            .await
        } else {
            Bucket::create(
                bucket,
                self.region(),
                self.credentials()?,
                s3::BucketConfiguration::default(),
            )
            .await
        };

        match result {
            Ok(_) => Ok(()),
            // Already owned by us: treat creation as idempotent / 已存在视为幂等
            Err(S3Error::HttpFailWithBody(409, _)) => Ok(()),
            Err(e) => Err(StorageError::Backend(format!(
                "create bucket {} failed: {}",
                bucket, e
            ))),
        }
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let handle = self.handle(bucket)?;
        match handle.delete().await {
            Ok(_) => {
                self.handles.lock().remove(bucket);
                Ok(())
            }
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(()),
            Err(e) => Err(StorageError::Backend(format!(
                "delete bucket {} failed: {}",
                bucket, e
            ))),
        }
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let response = Bucket::list_buckets(self.region(), self.credentials()?)
            .await
            .map_err(|e| StorageError::Backend(format!("list buckets failed: {}", e)))?;
        Ok(response.bucket_names().collect())
    }
}
