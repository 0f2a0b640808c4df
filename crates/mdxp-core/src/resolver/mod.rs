//! Module resolution for preview dependencies.
//!
//! - Plain resolution: exact file, extension probing, directory
//!   `package.json` `main` and `index.*`.
//! - Bare specifiers: `node_modules` walk from the requester, then from the
//!   entry directory.
//! - TypeScript projects: `paths`/`baseUrl` aliases and TypeScript's file
//!   probing order, falling back to plain resolution.
//!
//! Results are canonical paths. Access control is not done here; callers
//! pass every result through the sandbox.

mod manifest;
mod node;
pub mod tsconfig;
mod typescript;

use std::path::{Path, PathBuf};

pub use manifest::{
    ManifestCache, ManifestStamp, NoManifestCache, PackageManifest, SharedManifestCache,
};
pub use tsconfig::{discover_tsconfig, load_tsconfig, TsConfig, TsConfigError};

/// Extensions probed by plain resolution, in order.
pub const PLAIN_EXTENSIONS: &[&str] = &[
    ".js", ".jsx", ".ts", ".tsx", ".mjs", ".cjs", ".json", ".mdx", ".md",
];

/// Extensions probed by TypeScript resolution, in order.
pub const TYPESCRIPT_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".d.ts", ".js", ".jsx"];

/// Maximum number of tried paths to record.
const MAX_TRIED_PATHS: usize = 32;

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Extensions for plain resolution.
    pub extensions: &'static [&'static str],
    /// Extensions for TypeScript resolution.
    pub typescript_extensions: &'static [&'static str],
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            extensions: PLAIN_EXTENSIONS,
            typescript_extensions: TYPESCRIPT_EXTENSIONS,
        }
    }
}

/// Context for one resolution.
#[derive(Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Directory containing the requesting file.
    pub parent: &'a Path,
    /// Directory of the previewed document; bare lookups also walk up from here.
    pub entry_dir: Option<&'a Path>,
    /// Active TypeScript project, if any.
    pub tsconfig: Option<&'a TsConfig>,
    pub config: &'a ResolverConfig,
    pub manifests: &'a dyn ManifestCache,
}

impl std::fmt::Debug for ResolveContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolveContext")
            .field("parent", &self.parent)
            .field("entry_dir", &self.entry_dir)
            .field("tsconfig", &self.tsconfig.map(|t| &t.path))
            .finish_non_exhaustive()
    }
}

/// Resolution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStatus {
    Resolved,
    Unresolved,
}

/// Reason codes for unresolved specifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveReasonCode {
    SpecifierInvalid,
    NotFound,
    IsDirectory,
    NodeModulesNotFound,
    PackageNotFound,
    PackageMainNotFound,
}

impl std::fmt::Display for ResolveReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SpecifierInvalid => "SPECIFIER_INVALID",
            Self::NotFound => "NOT_FOUND",
            Self::IsDirectory => "IS_DIRECTORY",
            Self::NodeModulesNotFound => "NODE_MODULES_NOT_FOUND",
            Self::PackageNotFound => "PACKAGE_NOT_FOUND",
            Self::PackageMainNotFound => "PACKAGE_MAIN_NOT_FOUND",
        };
        write!(f, "{s}")
    }
}

/// Resolution result.
#[derive(Debug, Clone)]
pub struct ResolveResult {
    /// Canonical path (if resolved).
    pub resolved: Option<PathBuf>,
    pub status: ResolveStatus,
    /// Reason code if unresolved.
    pub reason: Option<ResolveReasonCode>,
    /// Candidate paths tried (capped).
    pub tried: Vec<PathBuf>,
}

impl ResolveResult {
    fn resolved(path: &Path, tried: &[PathBuf]) -> Self {
        Self {
            resolved: Some(mdxp_util::fs::canonicalize_or_keep(path)),
            status: ResolveStatus::Resolved,
            reason: None,
            tried: tried.to_vec(),
        }
    }

    fn unresolved(reason: ResolveReasonCode, tried: &[PathBuf]) -> Self {
        Self {
            resolved: None,
            status: ResolveStatus::Unresolved,
            reason: Some(reason),
            tried: tried.to_vec(),
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.status == ResolveStatus::Resolved
    }
}

/// Resolve `spec` requested from a file in `ctx.parent`.
///
/// `is_bare` selects `node_modules` lookup; otherwise `spec` is a path
/// relative to the requester (or absolute).
#[must_use]
pub fn resolve(ctx: &ResolveContext<'_>, spec: &str, is_bare: bool) -> ResolveResult {
    let mut tried = Vec::new();
    if spec.is_empty() || spec.contains('\0') {
        return ResolveResult::unresolved(ResolveReasonCode::SpecifierInvalid, &tried);
    }

    // Packages never see the project's TypeScript settings.
    let tsconfig = ctx
        .tsconfig
        .filter(|_| !mdxp_util::path::in_dependency_dir(ctx.parent));

    if is_bare {
        if let Some(tsconfig) = tsconfig {
            if let Some(result) = typescript::resolve_alias(ctx, tsconfig, spec, &mut tried) {
                tracing::trace!(spec, path = ?result.resolved, "resolved through tsconfig paths");
                return result;
            }
        }
        return node::resolve_bare(ctx, spec, &mut tried);
    }

    let base = if Path::new(spec).is_absolute() {
        PathBuf::from(spec)
    } else {
        ctx.parent.join(spec)
    };

    if tsconfig.is_some() {
        let result = typescript::resolve_file(ctx, &base, &mut tried);
        if result.is_resolved() {
            return result;
        }
        tracing::trace!(spec, "typescript resolution failed, falling back to plain");
    }
    node::resolve_path(ctx, &base, &mut tried)
}

/// Split a bare specifier into package name and optional subpath.
///
/// `lodash/fp` -> (`lodash`, `fp`), `@scope/pkg/sub` -> (`@scope/pkg`, `sub`).
#[must_use]
pub fn parse_bare_specifier(spec: &str) -> (&str, Option<&str>) {
    let name_segments = if spec.starts_with('@') { 2 } else { 1 };
    let mut slashes = 0;
    for (i, c) in spec.char_indices() {
        if c == '/' {
            slashes += 1;
            if slashes == name_segments {
                let sub = &spec[i + 1..];
                return (&spec[..i], (!sub.is_empty()).then_some(sub));
            }
        }
    }
    (spec, None)
}

/// Package name of a bare specifier (`fs/promises` -> `fs`).
#[must_use]
pub fn package_name(spec: &str) -> &str {
    parse_bare_specifier(spec).0
}

/// `path` with `ext` appended (`a.config` + `.js` -> `a.config.js`).
fn with_suffix(path: &Path, ext: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(ext);
    PathBuf::from(os)
}

/// Add a path to the tried list (with cap).
fn add_tried(tried: &mut Vec<PathBuf>, path: &Path) {
    if tried.len() < MAX_TRIED_PATHS {
        tried.push(path.to_path_buf());
    }
}
