//! Unified storage error types / 统一存储错误类型
//!
//! Existence probes never raise for "not found" — they return a boolean.
//! Everything else propagates up and is wrapped exactly once at the
//! service facade boundary.

use thiserror::Error;

/// Result alias used throughout the crate / 本crate统一Result别名
pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage error kinds / 存储错误类型
#[derive(Debug, Error)]
pub enum StorageError {
    /// Probed resource absent / 资源不存在
    #[error("not found: {0}")]
    NotFound(String),

    /// Destination exists and overwrite was not requested / 目标已存在且未允许覆盖
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Malformed key or path (directory key where a file is required, etc.)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Computed path escapes the workspace or target root / 路径越出根目录
    #[error("path escapes root: {0}")]
    PathEscapesRoot(String),

    /// Operation not available in this position (e.g. file at storage root)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Backend transport or protocol failure / 后端传输错误
    #[error("backend error: {0}")]
    Backend(String),

    /// Local filesystem I/O failure / 本地文件系统IO错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Uniform wrapper applied at the facade boundary / 门面层统一包装
    #[error("{message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    /// True when this error denotes a missing resource / 是否为"不存在"错误
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::NotFound(_) => true,
            StorageError::OperationFailed { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Wrap into the uniform facade error, keeping the cause / 包装为门面错误
    pub(crate) fn into_operation_failed(self, message: impl Into<String>) -> StorageError {
        StorageError::OperationFailed {
            message: message.into(),
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_keeps_cause() {
        let inner = StorageError::NotFound("a.txt".to_string());
        let wrapped = inner.into_operation_failed("read failed: a.txt");
        assert_eq!(format!("{}", wrapped), "read failed: a.txt");
        assert!(wrapped.is_not_found());
        let source = std::error::Error::source(&wrapped).unwrap();
        assert_eq!(format!("{}", source), "not found: a.txt");
    }
}
