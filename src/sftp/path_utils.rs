//! Remote path helpers
//!
//! Remote SFTP paths always use `/` regardless of the local or remote OS.

/// Check if a remote SFTP path is absolute.
pub fn is_absolute_remote_path(path: &str) -> bool {
    path.starts_with('/')
}

/// Join remote SFTP path components using `/` separator.
pub fn join_remote_path(base: &str, component: &str) -> String {
    if base.is_empty() {
        component.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, component)
    } else {
        format!("{}/{}", base, component)
    }
}

/// Directory paths carry a trailing slash so consumers can tell branches apart.
pub fn ensure_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

/// Drop a trailing slash (except for the root itself).
pub fn trim_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

/// Last path component, ignoring a trailing slash.
pub fn file_name(path: &str) -> &str {
    let trimmed = trim_trailing_slash(path);
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// The directory a path lives in, with trailing slash.
///
/// A path that already ends in `/` is its own directory.
pub fn directory_of(path: &str) -> String {
    if path.ends_with('/') {
        return path.to_string();
    }
    match path.rfind('/') {
        Some(idx) => path[..=idx].to_string(),
        None => "./".to_string(),
    }
}

/// One level up from a directory path, with trailing slash.
///
/// The parent of `/` is `/`.
pub fn parent_directory(path: &str) -> String {
    let trimmed = trim_trailing_slash(path);
    if trimmed == "/" || trimmed.is_empty() {
        return "/".to_string();
    }
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => format!("{}/", &trimmed[..idx]),
        None => "./".to_string(),
    }
}

/// Collapse `.` and `..` segments of an absolute path.
pub fn normalize_remote_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }

    if is_absolute_remote_path(path) {
        format!("/{}", parts.join("/"))
    } else {
        parts.join("/")
    }
}

/// Where a symlink in `dir` pointing at `target` leads.
pub fn resolve_link_target(dir: &str, target: &str) -> String {
    if is_absolute_remote_path(target) {
        normalize_remote_path(target)
    } else {
        normalize_remote_path(&join_remote_path(dir, target))
    }
}
