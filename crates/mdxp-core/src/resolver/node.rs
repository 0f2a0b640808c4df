//! Plain (Node-style) resolution: files, directories and `node_modules`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{
    add_tried, parse_bare_specifier, with_suffix, ResolveContext, ResolveReasonCode,
    ResolveResult,
};

/// Resolve a file or directory path with extension probing.
pub(super) fn resolve_path(
    ctx: &ResolveContext<'_>,
    base: &Path,
    tried: &mut Vec<PathBuf>,
) -> ResolveResult {
    add_tried(tried, base);
    if base.is_file() {
        return ResolveResult::resolved(base, tried);
    }

    for ext in ctx.config.extensions {
        let candidate = with_suffix(base, ext);
        add_tried(tried, &candidate);
        if candidate.is_file() {
            return ResolveResult::resolved(&candidate, tried);
        }
    }

    if base.is_dir() {
        return resolve_directory(ctx, base, tried);
    }

    ResolveResult::unresolved(ResolveReasonCode::NotFound, tried)
}

/// Resolve a directory: `package.json` `main`, then `index.*`.
fn resolve_directory(
    ctx: &ResolveContext<'_>,
    dir: &Path,
    tried: &mut Vec<PathBuf>,
) -> ResolveResult {
    let manifest_path = dir.join("package.json");
    let mut main_missing = false;

    if manifest_path.is_file() {
        add_tried(tried, &manifest_path);
        let main = ctx
            .manifests
            .manifest(&manifest_path)
            .and_then(|m| m.main.clone());
        if let Some(main) = main {
            let main_path = dir.join(&main);
            if let Some(found) = probe_file(ctx, &main_path, tried) {
                return ResolveResult::resolved(&found, tried);
            }
            if main_path.is_dir() {
                if let Some(found) = probe_index(ctx, &main_path, tried) {
                    return ResolveResult::resolved(&found, tried);
                }
            }
            main_missing = true;
        }
    }

    if let Some(found) = probe_index(ctx, dir, tried) {
        return ResolveResult::resolved(&found, tried);
    }

    let reason = if main_missing {
        ResolveReasonCode::PackageMainNotFound
    } else {
        ResolveReasonCode::IsDirectory
    };
    ResolveResult::unresolved(reason, tried)
}

/// `path` itself or `path` plus one of the configured extensions.
fn probe_file(ctx: &ResolveContext<'_>, path: &Path, tried: &mut Vec<PathBuf>) -> Option<PathBuf> {
    add_tried(tried, path);
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    ctx.config.extensions.iter().find_map(|ext| {
        let candidate = with_suffix(path, ext);
        add_tried(tried, &candidate);
        candidate.is_file().then_some(candidate)
    })
}

fn probe_index(ctx: &ResolveContext<'_>, dir: &Path, tried: &mut Vec<PathBuf>) -> Option<PathBuf> {
    ctx.config.extensions.iter().find_map(|ext| {
        let candidate = dir.join(format!("index{ext}"));
        add_tried(tried, &candidate);
        candidate.is_file().then_some(candidate)
    })
}

/// Resolve a bare specifier through `node_modules`.
///
/// Walks up from the requester's directory, then from the entry directory,
/// so packages installed next to the previewed document are found for
/// modules that live elsewhere in the workspace.
pub(super) fn resolve_bare(
    ctx: &ResolveContext<'_>,
    spec: &str,
    tried: &mut Vec<PathBuf>,
) -> ResolveResult {
    let (pkg_name, subpath) = parse_bare_specifier(spec);
    if pkg_name.is_empty() || pkg_name.starts_with('.') {
        return ResolveResult::unresolved(ResolveReasonCode::SpecifierInvalid, tried);
    }

    let mut visited: HashSet<PathBuf> = HashSet::new();
    let mut found_node_modules = false;
    let mut found_package = false;
    let mut specific_error = None;

    let starts = std::iter::once(ctx.parent).chain(ctx.entry_dir);
    for start in starts {
        for dir in start.ancestors() {
            if !visited.insert(dir.to_path_buf()) {
                continue;
            }
            let node_modules = dir.join("node_modules");
            if !node_modules.is_dir() {
                continue;
            }
            found_node_modules = true;

            let pkg_dir = node_modules.join(pkg_name);
            add_tried(tried, &pkg_dir);
            if !pkg_dir.is_dir() {
                continue;
            }
            found_package = true;

            let target = match subpath {
                Some(sub) => pkg_dir.join(sub),
                None => pkg_dir,
            };
            let result = resolve_path(ctx, &target, tried);
            if result.is_resolved() {
                return result;
            }
            if result.reason == Some(ResolveReasonCode::PackageMainNotFound) {
                specific_error = result.reason;
            }
        }
    }

    if let Some(reason) = specific_error {
        return ResolveResult::unresolved(reason, tried);
    }
    let reason = match (found_node_modules, found_package) {
        (false, _) => ResolveReasonCode::NodeModulesNotFound,
        (true, false) => ResolveReasonCode::PackageNotFound,
        (true, true) => ResolveReasonCode::NotFound,
    };
    ResolveResult::unresolved(reason, tried)
}

#[cfg(test)]
mod tests {
    use super::super::{resolve, NoManifestCache, ResolveStatus, ResolverConfig};
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn ctx<'a>(
        parent: &'a Path,
        entry_dir: Option<&'a Path>,
        config: &'a ResolverConfig,
    ) -> ResolveContext<'a> {
        ResolveContext {
            parent,
            entry_dir,
            tsconfig: None,
            config,
            manifests: &NoManifestCache,
        }
    }

    fn package(root: &Path, name: &str, manifest: &str, files: &[(&str, &str)]) -> PathBuf {
        let dir = root.join("node_modules").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("package.json"), manifest).unwrap();
        for (file, contents) in files {
            let path = dir.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
        dir
    }

    #[test]
    fn test_directory_index() {
        let dir = tempdir().unwrap();
        let utils = dir.path().join("utils");
        fs::create_dir(&utils).unwrap();
        fs::write(utils.join("index.mdx"), "# utils").unwrap();

        let config = ResolverConfig::default();
        let result = resolve(&ctx(dir.path(), None, &config), "./utils", false);
        assert!(result.resolved.unwrap().ends_with("utils/index.mdx"));
    }

    #[test]
    fn test_directory_package_json_main() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("my-pkg");
        fs::create_dir_all(pkg.join("lib")).unwrap();
        fs::write(pkg.join("package.json"), r#"{"main": "lib/entry"}"#).unwrap();
        fs::write(pkg.join("lib/entry.js"), "").unwrap();

        let config = ResolverConfig::default();
        let result = resolve(&ctx(dir.path(), None, &config), "./my-pkg", false);
        assert!(result.resolved.unwrap().ends_with("lib/entry.js"));
    }

    #[test]
    fn test_bare_package_main_and_subpath() {
        let dir = tempdir().unwrap();
        package(
            dir.path(),
            "lodash",
            r#"{"name": "lodash", "main": "lodash.js"}"#,
            &[("lodash.js", ""), ("fp.js", "")],
        );
        package(dir.path(), "@scope/ui", "{}", &[("index.js", ""), ("button/index.jsx", "")]);
        let src = dir.path().join("src");
        fs::create_dir(&src).unwrap();

        let config = ResolverConfig::default();
        let c = ctx(&src, None, &config);
        assert!(resolve(&c, "lodash", true).resolved.unwrap().ends_with("lodash/lodash.js"));
        assert!(resolve(&c, "lodash/fp", true).resolved.unwrap().ends_with("lodash/fp.js"));
        assert!(resolve(&c, "@scope/ui", true).resolved.unwrap().ends_with("ui/index.js"));
        assert!(resolve(&c, "@scope/ui/button", true)
            .resolved
            .unwrap()
            .ends_with("button/index.jsx"));
    }

    #[test]
    fn test_bare_falls_back_to_entry_directory() {
        let workspace = tempdir().unwrap();
        let docs = workspace.path().join("docs");
        let shared = workspace.path().join("shared");
        fs::create_dir_all(&docs).unwrap();
        fs::create_dir_all(&shared).unwrap();
        package(&docs, "chart", r#"{"main": "chart.js"}"#, &[("chart.js", "")]);

        let config = ResolverConfig::default();
        let without_entry = resolve(&ctx(&shared, None, &config), "chart", true);
        assert_eq!(without_entry.status, ResolveStatus::Unresolved);

        let with_entry = resolve(&ctx(&shared, Some(&docs), &config), "chart", true);
        assert!(with_entry.resolved.unwrap().ends_with("chart/chart.js"));
    }

    #[test]
    fn test_bare_reason_codes() {
        let dir = tempdir().unwrap();
        let config = ResolverConfig::default();

        let result = resolve(&ctx(dir.path(), None, &config), "react", true);
        // Some ancestor of the temp dir may have a node_modules of its own.
        assert!(matches!(
            result.reason,
            Some(ResolveReasonCode::NodeModulesNotFound | ResolveReasonCode::PackageNotFound)
        ));

        package(dir.path(), "broken", r#"{"main": "missing.js"}"#, &[]);
        let result = resolve(&ctx(dir.path(), None, &config), "broken", true);
        assert_eq!(result.reason, Some(ResolveReasonCode::PackageMainNotFound));
    }
}
