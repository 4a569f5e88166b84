//! Segment-wise helpers for slash separated index paths.
//!
//! Index paths are compared segment by segment, never as raw substrings, so
//! `files/groupA` does not contain `files/groupAB/x.pdf`.

use std::path::Path;

/// Split a path into its non-empty segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// True if `path` equals `root` or lies below it.
pub fn is_within(path: &str, root: &str) -> bool {
    strip_root(path, root).is_some()
}

/// Segments of `path` that follow `root`, or `None` if `path` is not within `root`.
pub fn strip_root<'a>(path: &'a str, root: &str) -> Option<Vec<&'a str>> {
    let path_segments = segments(path);
    let root_segments = segments(root);
    if root_segments.len() > path_segments.len() {
        return None;
    }
    if path_segments[..root_segments.len()] != root_segments[..] {
        return None;
    }
    Some(path_segments[root_segments.len()..].to_vec())
}

/// Position just after the first contiguous run of `needle` segments inside
/// `haystack`.
pub fn find_segment_run(haystack: &[&str], needle: &[&str]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|start| start + needle.len())
}

/// A path names a file if its last segment has an extension, i.e. a `.` after
/// the first character. Bare directory entries and dotfiles do not qualify.
pub fn has_extension(path: &str) -> bool {
    segments(path)
        .last()
        .and_then(|name| name.char_indices().skip(1).find(|(_, c)| *c == '.'))
        .is_some()
}

/// Join a filesystem path to an index path with forward slashes.
pub fn to_index_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Validate and normalize an index path.
///
/// A single trailing slash is dropped; a leading slash is kept as written.
pub fn normalize(path: &str) -> Result<String, String> {
    let trimmed = if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    };
    if segments(trimmed).is_empty() {
        return Err(format!("empty path '{}'", path));
    }
    let body = trimmed.strip_prefix('/').unwrap_or(trimmed);
    for segment in body.split('/') {
        match segment {
            "" => return Err(format!("empty segment in '{}'", path)),
            "." | ".." => return Err(format!("relative segment in '{}'", path)),
            _ => {}
        }
    }
    Ok(trimmed.to_string())
}
