//! Lexical path normalization shared by every containment check.

use std::path::{Component, Path, PathBuf};

/// Whether path comparison on this platform ignores ASCII case.
pub const CASE_INSENSITIVE: bool = cfg!(any(windows, target_os = "macos"));

/// Normalize a path into a comparable string.
///
/// - separators become `/`
/// - `.` segments are dropped, `..` pops the previous segment
/// - trailing separators are removed
/// - ASCII case is folded on case-insensitive platforms
///
/// The same function must be applied to both sides of a comparison.
#[must_use]
pub fn normalize(path: &Path) -> String {
    normalize_with(path, CASE_INSENSITIVE)
}

/// [`normalize`] with explicit case handling.
#[must_use]
pub fn normalize_with(path: &Path, fold_case: bool) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let mut prefix = String::new();
    let mut rest = raw.as_str();

    // Drive letters and UNC roots survive untouched.
    if rest.len() >= 2 && rest.as_bytes()[1] == b':' {
        prefix.push_str(&rest[..2]);
        rest = &rest[2..];
    } else if let Some(stripped) = rest.strip_prefix("//") {
        prefix.push('/');
        rest = stripped;
    }

    let absolute = rest.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let mut out = prefix;
    if absolute {
        out.push('/');
    }
    out.push_str(&parts.join("/"));
    if out.is_empty() {
        out.push('.');
    }
    if fold_case {
        out.make_ascii_lowercase();
    }
    out
}

/// Whether normalized `candidate` equals or is nested under normalized `root`.
#[must_use]
pub fn is_inside(candidate: &str, root: &str) -> bool {
    if candidate == root {
        return true;
    }
    if root.ends_with('/') {
        return candidate.starts_with(root);
    }
    candidate.len() > root.len()
        && candidate.starts_with(root)
        && candidate.as_bytes()[root.len()] == b'/'
}

/// Whether any component of `path` is a package dependency directory.
#[must_use]
pub fn in_dependency_dir(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::Normal(name) if name == "node_modules"))
}

/// Lexical path from `base` (a directory) to `target`, without touching
/// the filesystem. Both paths should be absolute.
#[must_use]
pub fn relative_to(target: &Path, base: &Path) -> PathBuf {
    let target: Vec<Component<'_>> = target.components().collect();
    let base: Vec<Component<'_>> = base.components().collect();
    let common = target
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for component in &base[common..] {
        if matches!(component, Component::Normal(_)) {
            out.push("..");
        }
    }
    for component in &target[common..] {
        out.push(component.as_os_str());
    }
    out
}
