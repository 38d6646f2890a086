//! Storage configuration / 存储配置
//!
//! Plain serde structs; callers load them from whatever config source the
//! embedding application uses (the service only consumes the typed values).

use serde::{Deserialize, Serialize};

/// Virtual filesystem configuration / 虚拟文件系统配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Source bucket name / 源存储桶名称
    pub bucket: String,
    /// Target bucket for cross-bucket copy/move (empty = same as bucket)
    /// 跨桶复制/移动的目标桶（为空则与源桶相同）
    #[serde(default)]
    pub target_bucket: String,
    /// Workspace root path; all facade paths must resolve under it
    /// 工作区根路径，所有门面路径必须落在其下
    #[serde(default = "default_root")]
    pub root_path: String,
    /// Consistency wait tuning / 一致性等待参数
    #[serde(default)]
    pub consistency: ConsistencyConfig,
}

fn default_root() -> String {
    "/".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            target_bucket: String::new(),
            root_path: default_root(),
            consistency: ConsistencyConfig::default(),
        }
    }
}

impl StorageConfig {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            ..Default::default()
        }
    }

    /// Effective target bucket / 实际目标桶
    pub fn target_bucket(&self) -> &str {
        if self.target_bucket.is_empty() {
            &self.bucket
        } else {
            &self.target_bucket
        }
    }
}

/// Bounded polling parameters for post-mutation convergence waits
/// 结构性变更后的有界轮询参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyConfig {
    /// Poll interval (milliseconds) / 轮询间隔（毫秒）
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Consecutive consistent observations required / 所需连续一致观察次数
    #[serde(default = "default_stable_count")]
    pub stable_count: u32,
    /// Maximum total wait before giving up silently (milliseconds)
    /// 静默放弃前的最大总等待（毫秒）
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_stable_count() -> u32 {
    3
}

fn default_max_wait_ms() -> u64 {
    30_000
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            stable_count: default_stable_count(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

/// S3 backend configuration / S3后端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3BackendConfig {
    /// S3端点地址
    /// AWS: https://s3.{region}.amazonaws.com
    /// MinIO: http://localhost:9000
    pub endpoint: String,
    /// 区域
    #[serde(default = "default_region")]
    pub region: String,
    /// Access Key ID
    pub access_key_id: String,
    /// Secret Access Key
    pub secret_access_key: String,
    /// Session Token（用于临时凭证）
    #[serde(default)]
    pub session_token: String,
    /// 强制使用路径风格（而非虚拟主机风格）
    /// MinIO等需要设置为true
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for S3BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: default_region(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            session_token: String::new(),
            force_path_style: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_minimal_json() {
        let cfg: StorageConfig = serde_json::from_str(r#"{"bucket":"data"}"#).unwrap();
        assert_eq!(cfg.bucket, "data");
        assert_eq!(cfg.target_bucket(), "data");
        assert_eq!(cfg.root_path, "/");
        assert_eq!(cfg.consistency.stable_count, 3);
    }

    #[test]
    fn target_bucket_override() {
        let mut cfg = StorageConfig::new("src");
        cfg.target_bucket = "dst".to_string();
        assert_eq!(cfg.target_bucket(), "dst");
    }
}
