//! Virtual filesystem over flat object storage / 基于扁平对象存储的虚拟文件系统
//!
//! Presents file and directory semantics on top of a bucket/key object
//! store. Directories are key prefixes plus empty marker objects; handles
//! are stateless views recomputed from prefix listings. Backends plug in
//! through the [`backend::ObjectBackend`] trait (S3 and an in-memory
//! implementation ship here).

pub mod backend;
pub mod codec;
pub mod config;
pub mod consistency;
pub mod directory;
pub mod error;
pub mod file;
pub mod service;
pub mod stream;
pub mod utils;

pub use backend::{MemoryBackend, ObjectBackend, S3Backend};
pub use config::{ConsistencyConfig, S3BackendConfig, StorageConfig};
pub use directory::{Depth, FsEntry, VirtualDirectory};
pub use error::{Result, StorageError};
pub use file::{FileMetadata, VirtualFile};
pub use service::StorageService;
pub use stream::{ObjectStream, OpenMode, StreamAccess};

/// Crate version / 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build timestamp (set by build.rs) / 构建时间（由build.rs写入）
pub const BUILD_TIME: &str = env!("BUILD_TIME");
