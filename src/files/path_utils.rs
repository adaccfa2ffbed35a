//! Remote path utilities
//!
//! Remote paths always use `/` as separator regardless of the local OS.

/// Check if a remote path is absolute.
pub fn is_absolute_remote_path(path: &str) -> bool {
    path.starts_with('/')
}

/// Resolve `segments` against `/` and normalize the result.
///
/// Later absolute segments reset the path, `.` is dropped and `..` pops one
/// component (never above the root).
///
/// ```ignore
/// assert_eq!(resolve_remote_path(&["/media", "../etc", "hosts"]), "/etc/hosts");
/// ```
pub fn resolve_remote_path(segments: &[&str]) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in segments {
        if is_absolute_remote_path(segment) {
            parts.clear();
        }
        for part in segment.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                other => parts.push(other),
            }
        }
    }
    format!("/{}", parts.join("/"))
}

/// Join remote path components and normalize the result.
pub fn join_remote_path(base: &str, component: &str) -> String {
    resolve_remote_path(&[base, component])
}

/// Last path component, or the empty string for `/`
pub fn remote_basename(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// Quote `arg` for a POSIX shell command line.
///
/// Single quotes inside are closed, escaped and reopened: `'` becomes `'\''`.
pub fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}
