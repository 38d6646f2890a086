//! Path processing utility functions / 路径处理工具函数

use crate::error::{Result, StorageError};

/// Clean and normalize path / 清理和规范化路径
/// 1. Replace backslashes with forward slashes / 将反斜杠替换为正斜杠
/// 2. Ensure path starts with / / 确保路径以 / 开头
/// 3. Clean . and .. in path / 清理路径中的 . 和 ..
pub fn fix_and_clean_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let path = if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    };

    clean_path(&path)
}

/// Clean path, handle ., .. and duplicate / / 清理路径，处理 . 和 .. 和重复的 /
fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }

    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Check if paths are equal / 判断路径是否相等
pub fn path_equal(path1: &str, path2: &str) -> bool {
    fix_and_clean_path(path1) == fix_and_clean_path(path2)
}

/// Check if sub_path is a subpath of path / 判断 sub_path 是否是 path 的子路径
pub fn is_sub_path(path: &str, sub_path: &str) -> bool {
    let path = fix_and_clean_path(path);
    let sub_path = fix_and_clean_path(sub_path);

    if path == sub_path {
        return true;
    }

    let path_with_sep = if path.ends_with('/') {
        path
    } else {
        format!("{}/", path)
    };

    sub_path.starts_with(&path_with_sep)
}

/// Translate a glob pattern (`*` any run, `?` single char) into a
/// case-insensitive regex anchored to the whole name
/// 将通配符模式转换为大小写不敏感的正则
pub fn glob_to_regex(pattern: &str) -> Result<regex::Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            _ => expr.push_str(&regex::escape(ch.encode_utf8(&mut [0u8; 4]))),
        }
    }
    expr.push('$');

    regex::RegexBuilder::new(&expr)
        .case_insensitive(true)
        .build()
        .map_err(|e| StorageError::InvalidArgument(format!("bad pattern '{}': {}", pattern, e)))
}

/// Match a leaf name against an optional glob pattern / 按通配符匹配文件名
/// `None` matches everything.
pub fn matches_pattern(name: &str, pattern: Option<&regex::Regex>) -> bool {
    match pattern {
        Some(re) => re.is_match(name),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_and_clean_path() {
        assert_eq!(fix_and_clean_path(""), "/");
        assert_eq!(fix_and_clean_path("."), "/");
        assert_eq!(fix_and_clean_path(".."), "/");
        assert_eq!(fix_and_clean_path("../.."), "/");
        assert_eq!(fix_and_clean_path("a/b/c"), "/a/b/c");
        assert_eq!(fix_and_clean_path("/a/b/c"), "/a/b/c");
        assert_eq!(fix_and_clean_path("a\\b\\c"), "/a/b/c");
        assert_eq!(fix_and_clean_path("/a//b///c"), "/a/b/c");
        assert_eq!(fix_and_clean_path("/a/./b/../c"), "/a/c");
    }

    #[test]
    fn test_is_sub_path() {
        assert!(is_sub_path("/ws", "/ws/documents"));
        assert!(is_sub_path("/ws", "/ws"));
        assert!(is_sub_path("/", "/anything"));
        assert!(!is_sub_path("/ws", "/wsx"));
        assert!(!is_sub_path("/ws", "/other"));
        // .. collapses before the check / 检查前先折叠 ..
        assert!(!is_sub_path("/ws", "/ws/../etc"));
    }

    #[test]
    fn test_path_equal() {
        assert!(path_equal("a/b", "/a/b"));
        assert!(path_equal("/a/./b", "/a/b"));
        assert!(!path_equal("/a/b", "/a/c"));
    }

    #[test]
    fn test_glob_to_regex() {
        let re = glob_to_regex("*.txt").unwrap();
        assert!(re.is_match("a.txt"));
        assert!(re.is_match("A.TXT"));
        assert!(!re.is_match("a.txt.bak"));

        let re = glob_to_regex("data-?.csv").unwrap();
        assert!(re.is_match("data-1.csv"));
        assert!(!re.is_match("data-12.csv"));

        // Regex metacharacters in the name are literal / 元字符按字面匹配
        let re = glob_to_regex("a+b.txt").unwrap();
        assert!(re.is_match("a+b.txt"));
        assert!(!re.is_match("aab.txt"));
    }

    #[test]
    fn test_matches_pattern_none() {
        assert!(matches_pattern("anything", None));
    }
}
