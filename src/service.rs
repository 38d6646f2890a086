//! Storage service facade / 存储服务门面
//!
//! Application-facing API over the file and directory handles. Paths are
//! workspace-relative: relative arguments are joined to the configured root,
//! absolute arguments must already resolve under it, and either way the
//! check happens before any backend I/O. Every handle-level error is
//! wrapped exactly once into [`StorageError::OperationFailed`] here.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::backend::ObjectBackend;
use crate::config::StorageConfig;
use crate::directory::{Depth, VirtualDirectory};
use crate::error::{Result, StorageError};
use crate::file::VirtualFile;
use crate::utils;

/// Facade over one source bucket (and an optional target bucket)
/// 针对单个源桶（及可选目标桶）的门面
pub struct StorageService {
    backend: Arc<dyn ObjectBackend>,
    config: StorageConfig,
}

impl StorageService {
    pub fn new(backend: Arc<dyn ObjectBackend>, config: StorageConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Resolve a caller path against the workspace root / 解析为工作区内路径
    ///
    /// Rejects anything that normalizes outside the root, including `..`
    /// traversal smuggled into a relative argument.
    fn resolve(&self, path: &str) -> Result<String> {
        let root = utils::fix_and_clean_path(&self.config.root_path);
        let normalized = path.replace('\\', "/");
        let full = if normalized.starts_with('/') {
            utils::fix_and_clean_path(&normalized)
        } else {
            utils::fix_and_clean_path(&format!("{}/{}", root, normalized))
        };

        if !utils::is_sub_path(&root, &full) {
            return Err(StorageError::PathEscapesRoot(path.to_string()));
        }
        Ok(full)
    }

    fn file(&self, path: &str) -> Result<VirtualFile> {
        self.file_in(&self.config.bucket, path)
    }

    fn file_in(&self, bucket: &str, path: &str) -> Result<VirtualFile> {
        let resolved = self.resolve(path)?;
        Ok(VirtualFile::new(self.backend.clone(), bucket, &resolved)?
            .with_consistency(self.config.consistency.clone()))
    }

    fn directory(&self, path: &str) -> Result<VirtualDirectory> {
        let resolved = self.resolve(path)?;
        Ok(
            VirtualDirectory::new(self.backend.clone(), Some(&self.config.bucket), &resolved)?
                .with_consistency(self.config.consistency.clone()),
        )
    }

    /// Create a directory / 创建目录
    ///
    /// `silent=true` swallows the failure after logging it.
    pub async fn create_directory(&self, path: &str, silent: bool) -> Result<()> {
        let result = async {
            self.directory(path)?
                .create()
                .await
                .map_err(|e| e.into_operation_failed(format!("failed to create directory '{}'", path)))
        }
        .await;
        swallow_if_silent(result, silent)
    }

    /// Delete a directory / 删除目录
    pub async fn delete_directory(&self, path: &str, recursive: bool, silent: bool) -> Result<()> {
        let result = async {
            self.directory(path)?
                .delete(recursive)
                .await
                .map_err(|e| e.into_operation_failed(format!("failed to delete directory '{}'", path)))
        }
        .await;
        swallow_if_silent(result, silent)
    }

    /// Delete one file; absent files are a no-op / 删除文件
    pub async fn delete_file(&self, path: &str) -> Result<()> {
        self.file(path)?
            .delete()
            .await
            .map_err(|e| e.into_operation_failed(format!("failed to delete file '{}'", path)))
    }

    /// Delete the immediate files under `dir` matching a glob / 按通配符删除文件
    pub async fn delete_files(&self, dir: &str, pattern: &str) -> Result<()> {
        let directory = self.directory(dir)?;
        let result = async {
            for entry in directory.files(Some(pattern), Depth::TopLevel).await? {
                directory.get_file(&entry.name)?.delete().await?;
            }
            Ok(())
        }
        .await;
        result.map_err(|e: StorageError| {
            e.into_operation_failed(format!("failed to delete files '{}' in '{}'", pattern, dir))
        })
    }

    /// Remove everything inside a directory but keep the directory itself
    /// 清空目录但保留目录本身
    pub async fn empty_directory(&self, path: &str) -> Result<()> {
        let directory = self.directory(path)?;
        let result = async {
            if !directory.exists().await? {
                return Ok(());
            }
            for entry in directory.entries(None, Depth::TopLevel).await? {
                if entry.is_dir {
                    directory.get_directory(&entry.name)?.delete(true).await?;
                } else {
                    directory.get_file(&entry.name)?.delete().await?;
                }
            }
            Ok(())
        }
        .await;
        result.map_err(|e: StorageError| {
            e.into_operation_failed(format!("failed to empty directory '{}'", path))
        })
    }

    pub async fn directory_exists(&self, path: &str) -> Result<bool> {
        self.directory(path)?
            .exists()
            .await
            .map_err(|e| e.into_operation_failed(format!("failed to probe directory '{}'", path)))
    }

    pub async fn file_exists(&self, path: &str) -> Result<bool> {
        self.file(path)?
            .exists()
            .await
            .map_err(|e| e.into_operation_failed(format!("failed to probe file '{}'", path)))
    }

    /// SHA-256 of a file, hex encoded / 文件的SHA-256（十六进制）
    ///
    /// The object is copied to a local temporary file and hashed from there;
    /// the temp file is removed afterwards.
    pub async fn file_hash(&self, path: &str) -> Result<String> {
        let file = self.file(path)?;
        let result = async {
            let tmp = tempfile::NamedTempFile::new()?;
            let tmp_path = tmp.path().to_path_buf();
            file.copy_to_local(&tmp_path, true).await?;
            let data = tokio::fs::read(&tmp_path).await?;
            Ok(hex::encode(Sha256::digest(&data)))
        }
        .await;
        result.map_err(|e: StorageError| {
            e.into_operation_failed(format!("failed to hash file '{}'", path))
        })
    }

    /// Names of the immediate files under `dir` matching a glob
    /// 目录下匹配通配符的文件名
    pub async fn find_files(&self, dir: &str, pattern: &str) -> Result<Vec<String>> {
        let result = async {
            let directory = self.directory(dir)?;
            if !directory.exists().await? {
                return Ok(Vec::new());
            }
            Ok(directory
                .files(Some(pattern), Depth::TopLevel)
                .await?
                .into_iter()
                .map(|e| e.name)
                .collect())
        }
        .await;
        result.map_err(|e: StorageError| {
            e.into_operation_failed(format!("failed to find files '{}' in '{}'", pattern, dir))
        })
    }

    /// Copy a file from the source bucket into the target bucket
    /// 从源桶复制文件到目标桶
    ///
    /// With no target bucket configured this is a same-bucket copy.
    pub async fn copy_file(&self, src: &str, dst: &str, overwrite: bool) -> Result<()> {
        let source = self.file(src)?;
        let target = self.file_in(self.config.target_bucket(), dst)?;
        source.copy_to_file(&target, overwrite).await.map_err(|e| {
            e.into_operation_failed(format!("failed to copy '{}' to '{}'", src, dst))
        })
    }

    /// Move a file into the target bucket; NOT atomic / 移动文件（非原子）
    pub async fn move_file(&self, src: &str, dst: &str, overwrite: bool) -> Result<()> {
        let source = self.file(src)?;
        let target = self.file_in(self.config.target_bucket(), dst)?;
        let result = async {
            source.copy_to_file(&target, overwrite).await?;
            source.delete().await
        }
        .await;
        result.map_err(|e| e.into_operation_failed(format!("failed to move '{}' to '{}'", src, dst)))
    }

    /// Read a file's bytes / 读取文件字节
    pub async fn read_binary_file(&self, path: &str) -> Result<Vec<u8>> {
        let file = self.file(path)?;
        let result = async {
            let mut stream = file.open_read().await?;
            stream.read_to_end()
        }
        .await;
        result.map_err(|e: StorageError| {
            e.into_operation_failed(format!("failed to read file '{}'", path))
        })
    }

    /// Read a file as UTF-8 text / 读取UTF-8文本文件
    pub async fn read_text_file(&self, path: &str) -> Result<String> {
        let data = self.read_binary_file(path).await?;
        String::from_utf8(data).map_err(|_| {
            StorageError::InvalidArgument(format!("file '{}' is not valid UTF-8", path))
        })
    }

    /// Write bytes, replacing any existing content / 写入字节（覆盖已有内容）
    pub async fn write_binary_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let file = self.file(path)?;
        let result = async {
            let mut stream = file.create().await?;
            stream.write(data)?;
            stream.close().await
        }
        .await;
        result.map_err(|e: StorageError| {
            e.into_operation_failed(format!("failed to write file '{}'", path))
        })
    }

    /// Write UTF-8 text / 写入UTF-8文本
    pub async fn write_text_file(&self, path: &str, text: &str) -> Result<()> {
        self.write_binary_file(path, text.as_bytes()).await
    }
}

fn swallow_if_silent(result: Result<()>, silent: bool) -> Result<()> {
    match result {
        Err(e) if silent => {
            tracing::debug!("suppressed storage error: {}", e);
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::ConsistencyConfig;
    use bytes::Bytes;

    fn fast_wait() -> ConsistencyConfig {
        ConsistencyConfig {
            poll_interval_ms: 1,
            stable_count: 2,
            max_wait_ms: 200,
        }
    }

    async fn service_with_root(root: &str) -> (Arc<MemoryBackend>, StorageService) {
        let backend = Arc::new(MemoryBackend::new());
        backend.create_bucket("work").await.unwrap();
        let mut config = StorageConfig::new("work");
        config.root_path = root.to_string();
        config.consistency = fast_wait();
        let service = StorageService::new(backend.clone() as Arc<dyn ObjectBackend>, config);
        (backend, service)
    }

    async fn service() -> (Arc<MemoryBackend>, StorageService) {
        service_with_root("/").await
    }

    #[tokio::test]
    async fn write_read_roundtrip() {
        let (_, svc) = service().await;
        svc.write_text_file("dir/a.txt", "hello").await.unwrap();
        assert_eq!(svc.read_text_file("dir/a.txt").await.unwrap(), "hello");
        assert_eq!(
            svc.read_binary_file("dir/a.txt").await.unwrap(),
            b"hello".to_vec()
        );
    }

    #[tokio::test]
    async fn scenario_find_read_delete() {
        let (_, svc) = service().await;
        svc.write_text_file("dir/a.txt", "hello").await.unwrap();

        assert_eq!(svc.find_files("dir", "*").await.unwrap(), vec!["a.txt"]);
        assert_eq!(svc.read_text_file("dir/a.txt").await.unwrap(), "hello");

        svc.delete_file("dir/a.txt").await.unwrap();
        assert!(svc.find_files("dir", "*").await.unwrap().is_empty());
        // Marker keeps the directory alive / 占位对象保持目录存在
        assert!(svc.directory_exists("dir").await.unwrap());
    }

    #[tokio::test]
    async fn rooted_workspace_containment() {
        let (backend, svc) = service_with_root("/ws").await;
        svc.write_text_file("notes.txt", "n").await.unwrap();
        // Relative paths land under the root / 相对路径落在根目录下
        assert!(backend.head_object("work", "ws/notes.txt").await.unwrap().is_some());

        // Absolute path inside the root is accepted / 根目录内的绝对路径可用
        assert_eq!(svc.read_text_file("/ws/notes.txt").await.unwrap(), "n");

        assert!(matches!(
            svc.read_text_file("/etc/passwd").await,
            Err(StorageError::PathEscapesRoot(_))
        ));
        assert!(matches!(
            svc.write_text_file("../outside.txt", "x").await,
            Err(StorageError::PathEscapesRoot(_))
        ));
    }

    #[tokio::test]
    async fn errors_are_wrapped_once_with_cause() {
        let (_, svc) = service().await;
        let err = svc.read_binary_file("missing.txt").await.unwrap_err();
        match err {
            StorageError::OperationFailed { ref source, .. } => {
                assert!(source.is_not_found());
            }
            other => panic!("expected OperationFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn silent_flag_swallows_failures() {
        let (_, svc) = service().await;
        svc.write_text_file("full/a.txt", "x").await.unwrap();

        // Non-recursive delete of a non-empty directory fails loudly
        // 非递归删除非空目录会报错
        assert!(svc.delete_directory("full", false, false).await.is_err());
        svc.delete_directory("full", false, true).await.unwrap();
        assert!(svc.directory_exists("full").await.unwrap());
    }

    #[tokio::test]
    async fn create_and_empty_directory() {
        let (_, svc) = service().await;
        svc.create_directory("inbox", false).await.unwrap();
        assert!(svc.directory_exists("inbox").await.unwrap());

        svc.write_text_file("inbox/a.txt", "a").await.unwrap();
        svc.write_text_file("inbox/sub/b.txt", "b").await.unwrap();
        svc.empty_directory("inbox").await.unwrap();

        assert!(svc.directory_exists("inbox").await.unwrap());
        assert!(!svc.file_exists("inbox/a.txt").await.unwrap());
        assert!(!svc.directory_exists("inbox/sub").await.unwrap());
    }

    #[tokio::test]
    async fn delete_files_by_pattern() {
        let (_, svc) = service().await;
        svc.write_text_file("logs/a.log", "a").await.unwrap();
        svc.write_text_file("logs/b.log", "b").await.unwrap();
        svc.write_text_file("logs/keep.txt", "k").await.unwrap();

        svc.delete_files("logs", "*.log").await.unwrap();
        assert_eq!(svc.find_files("logs", "*").await.unwrap(), vec!["keep.txt"]);
    }

    #[tokio::test]
    async fn cross_bucket_copy_and_move() {
        let backend = Arc::new(MemoryBackend::new());
        backend.create_bucket("work").await.unwrap();
        backend.create_bucket("archive").await.unwrap();
        let mut config = StorageConfig::new("work");
        config.target_bucket = "archive".to_string();
        config.consistency = fast_wait();
        let svc = StorageService::new(backend.clone() as Arc<dyn ObjectBackend>, config);

        svc.write_text_file("a.txt", "payload").await.unwrap();
        svc.copy_file("a.txt", "copied.txt", false).await.unwrap();
        assert_eq!(
            backend.get_object("archive", "copied.txt").await.unwrap().as_ref(),
            b"payload"
        );
        assert!(svc.file_exists("a.txt").await.unwrap());

        svc.move_file("a.txt", "moved.txt", false).await.unwrap();
        assert!(!svc.file_exists("a.txt").await.unwrap());
        assert_eq!(
            backend.get_object("archive", "moved.txt").await.unwrap().as_ref(),
            b"payload"
        );
    }

    #[tokio::test]
    async fn copy_without_overwrite_collides() {
        let (backend, svc) = service().await;
        svc.write_text_file("a.txt", "new").await.unwrap();
        backend
            .put_object("work", "b.txt", Bytes::from_static(b"old"))
            .await
            .unwrap();

        let err = svc.copy_file("a.txt", "b.txt", false).await.unwrap_err();
        match err {
            StorageError::OperationFailed { source, .. } => {
                assert!(matches!(*source, StorageError::AlreadyExists(_)));
            }
            other => panic!("expected OperationFailed, got {:?}", other),
        }

        svc.copy_file("a.txt", "b.txt", true).await.unwrap();
        assert_eq!(svc.read_text_file("b.txt").await.unwrap(), "new");
    }

    #[tokio::test]
    async fn file_hash_matches_content_digest() {
        let (_, svc) = service().await;
        svc.write_binary_file("h.bin", b"hash me").await.unwrap();

        let expected = hex::encode(Sha256::digest(b"hash me"));
        assert_eq!(svc.file_hash("h.bin").await.unwrap(), expected);
    }

    #[tokio::test]
    async fn read_text_rejects_invalid_utf8() {
        let (_, svc) = service().await;
        svc.write_binary_file("bad.bin", &[0xff, 0xfe, 0x00])
            .await
            .unwrap();
        assert!(matches!(
            svc.read_text_file("bad.bin").await,
            Err(StorageError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn find_files_on_missing_directory_is_empty() {
        let (_, svc) = service().await;
        assert!(svc.find_files("nowhere", "*").await.unwrap().is_empty());
    }
}
