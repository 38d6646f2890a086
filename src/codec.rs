//! Path/Key codec / 路径与对象键编解码
//!
//! Filesystem-style paths use `/` (backslashes are normalized) and may carry
//! characters that are awkward in object keys; backend keys are `/`-joined
//! percent-encoded segments. Encoding is pure and deterministic, and
//! `decode_key(encode_key(p)) == p` for every normalized relative path.
//!
//! Key shape rules / 键形状规则:
//! - directory keys are `""` (bucket root) or end with `/`
//! - file keys are non-empty and never end with `/`

use crate::error::{Result, StorageError};

/// Encode a filesystem-style path into a backend object key / 编码为对象键
///
/// Backslashes become `/`, a leading separator is dropped, and each segment
/// is percent-encoded on its own so the separator survives.
pub fn encode_key(path: &str) -> String {
    let path = path.replace('\\', "/");
    let trimmed = path.trim_start_matches('/');

    trimmed
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Decode a backend object key back into a path / 对象键解码回路径
pub fn decode_key(key: &str) -> Result<String> {
    let mut segments = Vec::new();
    for segment in key.split('/') {
        let decoded = urlencoding::decode(segment)
            .map_err(|e| StorageError::InvalidArgument(format!("bad key '{}': {}", key, e)))?;
        segments.push(decoded.into_owned());
    }
    Ok(segments.join("/"))
}

/// True when the key denotes a directory / 是否为目录键
pub fn is_directory_key(key: &str) -> bool {
    key.is_empty() || key.ends_with('/')
}

/// Encode a path as a directory key (trailing `/`, empty for root)
/// 编码为目录键（以 / 结尾，根目录为空串）
pub fn directory_key(path: &str) -> String {
    let key = encode_key(path);
    let key = key.trim_end_matches('/');
    if key.is_empty() {
        String::new()
    } else {
        format!("{}/", key)
    }
}

/// Encode a path as a file key; directory-shaped input is rejected
/// 编码为文件键，目录形状的输入被拒绝
pub fn file_key(path: &str) -> Result<String> {
    let key = encode_key(path);
    if is_directory_key(&key) {
        return Err(StorageError::InvalidArgument(format!(
            "'{}' is a directory reference, a file key is required",
            path
        )));
    }
    Ok(key)
}

/// Parent directory key of a key (`""` for top-level keys) / 父目录键
pub fn parent_key(key: &str) -> String {
    let trimmed = key.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(pos) => key[..pos + 1].to_string(),
        None => String::new(),
    }
}

/// Unqualified leaf name of a key / 键的末级名称
pub fn leaf_name(key: &str) -> &str {
    key.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        for path in [
            "a.txt",
            "dir/sub/a.txt",
            "with space/file name.txt",
            "中文目录/文件.txt",
            "odd%name/100%.txt",
            "dir/",
        ] {
            let key = encode_key(path);
            assert_eq!(decode_key(&key).unwrap(), path, "path: {}", path);
        }
    }

    #[test]
    fn encode_normalizes_separators() {
        assert_eq!(encode_key("a\\b\\c.txt"), "a/b/c.txt");
        assert_eq!(encode_key("/a/b"), "a/b");
    }

    #[test]
    fn encode_is_pure() {
        assert_eq!(encode_key("dir/a b.txt"), encode_key("dir/a b.txt"));
        assert_eq!(encode_key("dir/a b.txt"), "dir/a%20b.txt");
    }

    #[test]
    fn directory_and_file_keys() {
        assert_eq!(directory_key(""), "");
        assert_eq!(directory_key("/"), "");
        assert_eq!(directory_key("dir"), "dir/");
        assert_eq!(directory_key("dir/sub/"), "dir/sub/");

        assert_eq!(file_key("dir/a.txt").unwrap(), "dir/a.txt");
        assert!(file_key("dir/").is_err());
        assert!(file_key("").is_err());
        assert!(file_key("/").is_err());
    }

    #[test]
    fn parents_and_leaves() {
        assert_eq!(parent_key("dir/sub/a.txt"), "dir/sub/");
        assert_eq!(parent_key("a.txt"), "");
        assert_eq!(parent_key("dir/sub/"), "dir/");
        assert_eq!(parent_key("dir/"), "");

        assert_eq!(leaf_name("dir/sub/a.txt"), "a.txt");
        assert_eq!(leaf_name("dir/sub/"), "sub");
        assert_eq!(leaf_name("a.txt"), "a.txt");
    }
}
