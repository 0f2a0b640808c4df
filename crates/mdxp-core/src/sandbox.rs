//! Workspace sandbox for module paths.
//!
//! A preview may only load files under the permitted root that encloses
//! its entry directory. Roots and candidates are canonicalized when they
//! exist, then compared with [`mdxp_util::path::normalize`] on both sides.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use mdxp_util::fs::canonicalize_or_keep;
use mdxp_util::path::{is_inside, normalize};

/// Outcome of a containment check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxDecision {
    pub allowed: bool,
    /// The permitted root the entry directory belongs to.
    pub root_used: Option<PathBuf>,
}

impl SandboxDecision {
    fn deny(root_used: Option<PathBuf>) -> Self {
        Self {
            allowed: false,
            root_used,
        }
    }
}

#[derive(Debug, Clone)]
struct Root {
    path: PathBuf,
    normalized: String,
}

#[derive(Debug, Default)]
struct State {
    roots: Vec<Root>,
    /// Normalized entry directory -> index into `roots`.
    cache: HashMap<String, Option<usize>>,
}

/// Permitted workspace roots plus the per-entry-directory root cache.
///
/// Shared by every session of the process.
#[derive(Debug, Default)]
pub struct Sandbox {
    state: RwLock<State>,
}

impl Sandbox {
    #[must_use]
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let sandbox = Self::default();
        sandbox.set_roots(roots);
        sandbox
    }

    /// Replace the permitted roots and clear the root cache.
    pub fn set_roots<I, P>(&self, roots: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let roots: Vec<Root> = roots
            .into_iter()
            .map(|root| {
                let path = canonicalize_or_keep(root.as_ref());
                let normalized = normalize(&path);
                Root { path, normalized }
            })
            .collect();
        tracing::debug!(roots = roots.len(), "sandbox roots changed");

        let mut state = self.state.write().unwrap();
        state.roots = roots;
        state.cache.clear();
    }

    /// Currently permitted roots (canonical).
    #[must_use]
    pub fn roots(&self) -> Vec<PathBuf> {
        let state = self.state.read().unwrap();
        state.roots.iter().map(|r| r.path.clone()).collect()
    }

    /// The longest permitted root enclosing `entry_dir`.
    #[must_use]
    pub fn root_for(&self, entry_dir: &Path) -> Option<PathBuf> {
        let key = normalize(&canonicalize_or_keep(entry_dir));
        {
            let state = self.state.read().unwrap();
            if let Some(hit) = state.cache.get(&key) {
                return hit.map(|i| state.roots[i].path.clone());
            }
        }

        // Computed under the write lock so a concurrent `set_roots` cannot
        // leave an entry for a root that is gone.
        let mut state = self.state.write().unwrap();
        let found = state
            .roots
            .iter()
            .enumerate()
            .filter(|(_, root)| is_inside(&key, &root.normalized))
            .max_by_key(|(_, root)| root.normalized.len())
            .map(|(i, _)| i);
        state.cache.insert(key, found);
        found.map(|i| state.roots[i].path.clone())
    }

    /// Whether `candidate` may be loaded by a preview rooted at `entry_dir`.
    #[must_use]
    pub fn check(&self, entry_dir: &Path, candidate: &Path) -> SandboxDecision {
        let Some(root) = self.root_for(entry_dir) else {
            tracing::debug!(entry_dir = %entry_dir.display(), "no permitted root for entry directory");
            return SandboxDecision::deny(None);
        };

        let candidate = canonicalize_or_keep(candidate);
        let allowed = is_inside(&normalize(&candidate), &normalize(&root));
        if !allowed {
            tracing::debug!(
                path = %candidate.display(),
                root = %root.display(),
                "path outside permitted root"
            );
            return SandboxDecision::deny(Some(root));
        }
        SandboxDecision {
            allowed,
            root_used: Some(root),
        }
    }

    #[must_use]
    pub fn is_allowed(&self, entry_dir: &Path, candidate: &Path) -> bool {
        self.check(entry_dir, candidate).allowed
    }

    #[cfg(test)]
    fn cached_entries(&self) -> usize {
        self.state.read().unwrap().cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_inside_and_outside() {
        let dir = tempdir().unwrap();
        let ws = dir.path().join("ws");
        let docs = ws.join("docs");
        fs::create_dir_all(&docs).unwrap();
        fs::write(ws.join("a.js"), "").unwrap();
        fs::write(dir.path().join("secret.js"), "").unwrap();

        let sandbox = Sandbox::new([&ws]);
        assert!(sandbox.is_allowed(&docs, &ws.join("a.js")));
        assert!(sandbox.is_allowed(&docs, &ws));
        assert!(!sandbox.is_allowed(&docs, &dir.path().join("secret.js")));
        assert!(!sandbox.is_allowed(&docs, &docs.join("../../secret.js")));
    }

    #[test]
    fn test_sibling_prefix_is_not_inside() {
        let dir = tempdir().unwrap();
        let ws = dir.path().join("ws");
        let evil = dir.path().join("ws-evil");
        fs::create_dir_all(&ws).unwrap();
        fs::create_dir_all(&evil).unwrap();
        fs::write(evil.join("x.js"), "").unwrap();

        let sandbox = Sandbox::new([&ws]);
        assert!(!sandbox.is_allowed(&ws, &evil.join("x.js")));
    }

    #[test]
    fn test_no_roots_denies_everything() {
        let dir = tempdir().unwrap();
        let sandbox = Sandbox::new(Vec::<PathBuf>::new());
        let decision = sandbox.check(dir.path(), &dir.path().join("a.js"));
        assert_eq!(decision, SandboxDecision::deny(None));
    }

    #[test]
    fn test_longest_root_wins_and_cache_clears() {
        let dir = tempdir().unwrap();
        let outer = dir.path().join("outer");
        let inner = outer.join("inner");
        fs::create_dir_all(&inner).unwrap();
        fs::write(outer.join("shared.js"), "").unwrap();

        let sandbox = Sandbox::new([&outer, &inner]);
        assert_eq!(
            sandbox.root_for(&inner),
            Some(canonicalize_or_keep(&inner))
        );
        assert!(!sandbox.is_allowed(&inner, &outer.join("shared.js")));
        assert_eq!(sandbox.cached_entries(), 1);

        sandbox.set_roots([&outer]);
        assert_eq!(sandbox.cached_entries(), 0);
        assert!(sandbox.is_allowed(&inner, &outer.join("shared.js")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_denied() {
        let dir = tempdir().unwrap();
        let ws = dir.path().join("ws");
        let outside = dir.path().join("outside");
        fs::create_dir_all(&ws).unwrap();
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("secret.js"), "").unwrap();
        std::os::unix::fs::symlink(&outside, ws.join("link")).unwrap();

        let sandbox = Sandbox::new([&ws]);
        assert!(!sandbox.is_allowed(&ws, &ws.join("link/secret.js")));
    }
}
