//! TypeScript-style resolution for modules inside a TypeScript project.
//!
//! Declaration files are never selected: when only `foo.d.ts` exists the
//! search moves on to the implementation file.

use std::path::{Path, PathBuf};

use super::tsconfig::TsConfig;
use super::{add_tried, with_suffix, ResolveContext, ResolveReasonCode, ResolveResult};

/// Extensions TypeScript maps an emitted `.js`-style import back from.
const JS_TO_TS: &[(&str, &[&str])] = &[
    (".js", &[".ts", ".tsx"]),
    (".jsx", &[".tsx"]),
    (".mjs", &[".mts"]),
    (".cjs", &[".cts"]),
];

fn is_declaration(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".d.ts")
}

/// Resolve a path the way TypeScript's module resolution would.
pub(super) fn resolve_file(
    ctx: &ResolveContext<'_>,
    base: &Path,
    tried: &mut Vec<PathBuf>,
) -> ResolveResult {
    if let Some(found) = probe(ctx, base, tried) {
        return ResolveResult::resolved(&found, tried);
    }
    if base.is_dir() {
        if let Some(found) = probe_directory(ctx, base, tried) {
            return ResolveResult::resolved(&found, tried);
        }
    }
    ResolveResult::unresolved(ResolveReasonCode::NotFound, tried)
}

/// File candidates for `base`: `.js` to `.ts` rewrite, extension probing,
/// then the path as written.
fn probe(ctx: &ResolveContext<'_>, base: &Path, tried: &mut Vec<PathBuf>) -> Option<PathBuf> {
    let text = base.to_string_lossy();
    for (js_ext, ts_exts) in JS_TO_TS {
        if let Some(stem) = text.strip_suffix(js_ext) {
            for ts_ext in *ts_exts {
                let candidate = PathBuf::from(format!("{stem}{ts_ext}"));
                add_tried(tried, &candidate);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
    }

    for ext in ctx.config.typescript_extensions {
        let candidate = with_suffix(base, ext);
        add_tried(tried, &candidate);
        if candidate.is_file() && !is_declaration(&candidate) {
            return Some(candidate);
        }
    }

    add_tried(tried, base);
    (base.is_file() && !is_declaration(base)).then(|| base.to_path_buf())
}

/// Directory: `package.json` `types`/`typings`/`main`, then `index.*`.
fn probe_directory(
    ctx: &ResolveContext<'_>,
    dir: &Path,
    tried: &mut Vec<PathBuf>,
) -> Option<PathBuf> {
    let manifest_path = dir.join("package.json");
    if manifest_path.is_file() {
        add_tried(tried, &manifest_path);
        if let Some(manifest) = ctx.manifests.manifest(&manifest_path) {
            let entries = [manifest.types_entry(), manifest.main.as_deref()];
            for entry in entries.into_iter().flatten() {
                let target = dir.join(entry);
                // `types` usually names a declaration; look for its source.
                let source = target.to_string_lossy().strip_suffix(".d.ts").map(PathBuf::from);
                let target = source.unwrap_or(target);
                if let Some(found) = probe(ctx, &target, tried) {
                    return Some(found);
                }
            }
        }
    }

    ctx.config.typescript_extensions.iter().find_map(|ext| {
        let candidate = dir.join(format!("index{ext}"));
        add_tried(tried, &candidate);
        (candidate.is_file() && !is_declaration(&candidate)).then_some(candidate)
    })
}

/// Resolve a bare specifier through `compilerOptions.paths`, then `baseUrl`.
///
/// `None` when no alias applies or no alias target exists.
pub(super) fn resolve_alias(
    ctx: &ResolveContext<'_>,
    tsconfig: &TsConfig,
    spec: &str,
    tried: &mut Vec<PathBuf>,
) -> Option<ResolveResult> {
    if let Some((pattern, wildcard)) = best_match(tsconfig, spec) {
        for target in &tsconfig.paths[pattern] {
            let substituted = target.replacen('*', wildcard, 1);
            let candidate = tsconfig.paths_base.join(substituted);
            let result = resolve_file(ctx, &candidate, tried);
            if result.is_resolved() {
                return Some(result);
            }
        }
    }

    let base_url = tsconfig.base_url.as_ref()?;
    let result = resolve_file(ctx, &base_url.join(spec), tried);
    result.is_resolved().then_some(result)
}

/// The `paths` pattern matching `spec` with the longest prefix, and the
/// text the `*` matched.
fn best_match<'a, 's>(tsconfig: &'a TsConfig, spec: &'s str) -> Option<(&'a str, &'s str)> {
    let mut best: Option<(&str, &str, usize)> = None;
    for pattern in tsconfig.paths.keys() {
        let matched = match pattern.split_once('*') {
            None => (pattern == spec).then_some(("", usize::MAX)),
            Some((prefix, suffix)) => {
                let fits = spec.len() >= prefix.len() + suffix.len()
                    && spec.starts_with(prefix)
                    && spec.ends_with(suffix);
                fits.then(|| (&spec[prefix.len()..spec.len() - suffix.len()], prefix.len()))
            }
        };
        if let Some((wildcard, rank)) = matched {
            if best.map_or(true, |(_, _, r)| rank > r) {
                best = Some((pattern.as_str(), wildcard, rank));
            }
        }
    }
    best.map(|(pattern, wildcard, _)| (pattern, wildcard))
}

#[cfg(test)]
mod tests {
    use super::super::{resolve, NoManifestCache, ResolverConfig};
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::tempdir;

    fn project(root: &Path, paths: &[(&str, &[&str])], base_url: Option<&str>) -> TsConfig {
        let paths: BTreeMap<String, Vec<String>> = paths
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.iter().map(|s| (*s).to_string()).collect()))
            .collect();
        let base_url = base_url.map(|b| root.join(b));
        TsConfig {
            path: root.join("tsconfig.json"),
            paths_base: base_url.clone().unwrap_or_else(|| root.to_path_buf()),
            base_url,
            paths,
        }
    }

    fn ctx<'a>(
        parent: &'a Path,
        tsconfig: &'a TsConfig,
        config: &'a ResolverConfig,
    ) -> ResolveContext<'a> {
        ResolveContext {
            parent,
            entry_dir: None,
            tsconfig: Some(tsconfig),
            config,
            manifests: &NoManifestCache,
        }
    }

    #[test]
    fn test_js_import_maps_to_ts_source() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("util.ts"), "export {}").unwrap();
        let ts = project(dir.path(), &[], None);
        let config = ResolverConfig::default();

        let result = resolve(&ctx(dir.path(), &ts, &config), "./util.js", false);
        assert!(result.resolved.unwrap().ends_with("util.ts"));
    }

    #[test]
    fn test_declaration_files_are_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("api.d.ts"), "export declare const x: number;").unwrap();
        fs::write(dir.path().join("api.js"), "exports.x = 1;").unwrap();
        let ts = project(dir.path(), &[], None);
        let config = ResolverConfig::default();

        let result = resolve(&ctx(dir.path(), &ts, &config), "./api", false);
        assert!(result.resolved.unwrap().ends_with("api.js"));
    }

    #[test]
    fn test_typescript_order_prefers_ts() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("dep.ts"), "").unwrap();
        fs::write(dir.path().join("dep.jsx"), "").unwrap();
        let ts = project(dir.path(), &[], None);
        let config = ResolverConfig::default();

        let result = resolve(&ctx(dir.path(), &ts, &config), "./dep", false);
        assert!(result.resolved.unwrap().ends_with("dep.ts"));
    }

    #[test]
    fn test_falls_back_to_plain_resolution() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("readme.mdx"), "# hi").unwrap();
        let ts = project(dir.path(), &[], None);
        let config = ResolverConfig::default();

        let result = resolve(&ctx(dir.path(), &ts, &config), "./readme", false);
        assert!(result.resolved.unwrap().ends_with("readme.mdx"));
    }

    #[test]
    fn test_paths_alias_longest_prefix() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/components/button")).unwrap();
        fs::write(dir.path().join("src/components/button/index.tsx"), "").unwrap();
        fs::write(dir.path().join("src/special.ts"), "").unwrap();
        let ts = project(
            dir.path(),
            &[("@/*", &["src/*"]), ("@/special/*", &["src/special.ts"])],
            None,
        );
        let config = ResolverConfig::default();
        let c = ctx(dir.path(), &ts, &config);

        let button = resolve(&c, "@/components/button", true);
        assert!(button.resolved.unwrap().ends_with("button/index.tsx"));
        let special = resolve(&c, "@/special/anything", true);
        assert!(special.resolved.unwrap().ends_with("src/special.ts"));
    }

    #[test]
    fn test_base_url_and_node_modules_fallback() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/lib")).unwrap();
        fs::write(dir.path().join("src/lib/math.ts"), "").unwrap();
        let pkg = dir.path().join("node_modules/react");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("index.js"), "").unwrap();
        let ts = project(dir.path(), &[], Some("src"));
        let config = ResolverConfig::default();
        let c = ctx(dir.path(), &ts, &config);

        assert!(resolve(&c, "lib/math", true).resolved.unwrap().ends_with("lib/math.ts"));
        assert!(resolve(&c, "react", true).resolved.unwrap().ends_with("react/index.js"));
    }

    #[test]
    fn test_requester_in_node_modules_ignores_project() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("node_modules/lib");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("a.ts"), "").unwrap();
        fs::write(pkg.join("a.js"), "").unwrap();
        let ts = project(dir.path(), &[], None);
        let config = ResolverConfig::default();

        let result = resolve(&ctx(&pkg, &ts, &config), "./a", false);
        assert!(result.resolved.unwrap().ends_with("a.js"));
    }
}
