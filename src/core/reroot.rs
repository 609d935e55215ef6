//! 路径换根 - 把源根下的路径映射到目标根下

use crate::error::{Result, SyncError};
use crate::storage::PathStyle;

/// 拆出 Windows 盘符（仅本机风格且在 Windows 上）
fn split_volume(path: &str, style: PathStyle) -> (&str, &str) {
    if style == PathStyle::Native && cfg!(windows) {
        let bytes = path.as_bytes();
        if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
            return path.split_at(2);
        }
    }
    ("", path)
}

struct Parsed<'a> {
    volume: &'a str,
    absolute: bool,
    parts: Vec<&'a str>,
}

/// 词法解析路径：合并分隔符，去掉 `.`，消解 `..`
fn parse(path: &str, style: PathStyle) -> Parsed<'_> {
    let (volume, rest) = split_volume(path, style);
    let absolute = rest.starts_with(|c: char| style.is_separator(c));

    let mut parts: Vec<&str> = Vec::new();
    for part in rest.split(|c: char| style.is_separator(c)) {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !absolute {
                    // 相对路径保留无法消解的 `..`
                    parts.push("..");
                }
            }
            _ => parts.push(part),
        }
    }

    Parsed {
        volume,
        absolute,
        parts,
    }
}

fn render(volume: &str, absolute: bool, parts: &[&str], style: PathStyle) -> String {
    let sep = style.separator();
    let mut out = String::from(volume);
    if absolute {
        out.push(sep);
    }
    out.push_str(&parts.join(&sep.to_string()));
    if out.is_empty() {
        out.push('.');
    }
    out
}

/// 词法规范化路径
pub fn clean(path: &str, style: PathStyle) -> String {
    let parsed = parse(path, style);
    render(parsed.volume, parsed.absolute, &parsed.parts, style)
}

/// 计算 `target` 相对 `base` 的路径分量，两者同为绝对或同为相对路径
pub fn relative<'a>(base: &'a str, target: &'a str, style: PathStyle) -> Result<Vec<&'a str>> {
    let b = parse(base, style);
    let t = parse(target, style);

    let relation_error = || SyncError::PathRelation {
        root: base.to_string(),
        path: target.to_string(),
    };

    let same_volume = if cfg!(windows) {
        b.volume.eq_ignore_ascii_case(t.volume)
    } else {
        b.volume == t.volume
    };
    if !same_volume || b.absolute != t.absolute {
        return Err(relation_error());
    }

    let common = b
        .parts
        .iter()
        .zip(t.parts.iter())
        .take_while(|(x, y)| x == y)
        .count();

    // base 剩余部分里的 `..` 无法反推
    if b.parts[common..].contains(&"..") {
        return Err(relation_error());
    }

    let mut rel = vec![".."; b.parts.len() - common];
    rel.extend_from_slice(&t.parts[common..]);
    Ok(rel)
}

/// 将 `path`（位于 `source_root` 之下）换到 `dest_root` 之下，并按目标端分隔符重新编码
pub fn reroot(
    source_root: &str,
    source_style: PathStyle,
    dest_root: &str,
    dest_style: PathStyle,
    path: &str,
) -> Result<String> {
    let rel = relative(source_root, path, source_style)?;

    let mut joined = dest_root.to_string();
    for part in rel {
        joined.push(dest_style.separator());
        joined.push_str(part);
    }
    Ok(clean(&joined, dest_style))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean() {
        let p = PathStyle::Posix;
        assert_eq!(clean("/a//b/./c/", p), "/a/b/c");
        assert_eq!(clean("/a/b/../c", p), "/a/c");
        assert_eq!(clean("/../a", p), "/a");
        assert_eq!(clean("a/../../b", p), "../b");
        assert_eq!(clean("", p), ".");
        assert_eq!(clean("./", p), ".");
        assert_eq!(clean("/", p), "/");
    }

    #[test]
    fn test_relative() {
        let p = PathStyle::Posix;
        assert_eq!(relative("/src/", "/src/sub/b.txt", p).unwrap(), vec!["sub", "b.txt"]);
        assert!(relative("/src", "/src", p).unwrap().is_empty());
        assert_eq!(relative("/src/x", "/src/y", p).unwrap(), vec!["..", "y"]);
        assert_eq!(relative("./dst", "dst/a", p).unwrap(), vec!["a"]);
    }

    #[test]
    fn test_relative_mixed_roots_fails() {
        let err = relative("/src", "src/a", PathStyle::Posix).unwrap_err();
        assert!(matches!(err, SyncError::PathRelation { .. }));

        let err = relative("../x", "a", PathStyle::Posix).unwrap_err();
        assert!(matches!(err, SyncError::PathRelation { .. }));
    }

    #[test]
    fn test_reroot_remote_to_local() {
        let local = reroot(
            "/src",
            PathStyle::Posix,
            "./dst",
            PathStyle::Native,
            "/src/sub/b.txt",
        )
        .unwrap();
        let sep = std::path::MAIN_SEPARATOR;
        assert_eq!(local, format!("dst{sep}sub{sep}b.txt"));

        let root = reroot("/src", PathStyle::Posix, "./dst", PathStyle::Native, "/src").unwrap();
        assert_eq!(root, "dst");
    }

    #[test]
    fn test_reroot_local_to_remote_uses_slashes() {
        let sep = std::path::MAIN_SEPARATOR;
        let local_root = format!("{sep}home{sep}me{sep}photos");
        let local_file = format!("{local_root}{sep}2024{sep}a.jpg");
        let remote = reroot(
            &local_root,
            PathStyle::Native,
            "/backup/photos",
            PathStyle::Posix,
            &local_file,
        )
        .unwrap();
        assert_eq!(remote, "/backup/photos/2024/a.jpg");
    }

    #[test]
    fn test_reroot_round_trip() {
        let p = PathStyle::Posix;
        for path in ["/a/b", "/a/b/c", "/a/b/c/d.txt"] {
            let there = reroot("/a/b", p, "/x/y/z", p, path).unwrap();
            let back = reroot("/x/y/z", p, "/a/b", p, &there).unwrap();
            assert_eq!(back, path);
        }
    }
}
