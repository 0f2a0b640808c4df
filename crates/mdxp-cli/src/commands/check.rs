//! `mdxp check` command implementation.
//!
//! Builds the entry document, then fetches its module graph level by level
//! the way the execution environment would, collecting every failure.

use super::{open_host, ConfigArgs};
use futures::future::join_all;
use mdxp_core::{
    CollectingSink, DependencySpecifier, EntryBuild, Fetcher, NoLiveBuffers, PayloadKind, Session,
};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CheckAction {
    pub file: PathBuf,
    pub workspaces: Vec<PathBuf>,
    pub cwd: PathBuf,
    pub overrides: ConfigArgs,
}

/// One module that could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckFailure {
    pub specifier: String,
    pub requester: PathBuf,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    pub entry: PathBuf,
    pub generation: u64,
    /// Modules loaded from disk, sorted.
    pub modules: Vec<PathBuf>,
    /// Core modules and other stand-ins.
    pub shims: Vec<String>,
    pub failures: Vec<CheckFailure>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Pending {
    specifier: String,
    is_bare: bool,
    requester: PathBuf,
}

impl Pending {
    fn key(&self) -> (String, PathBuf) {
        let dir = self.requester.parent().unwrap_or(&self.requester);
        (self.specifier.clone(), dir.to_path_buf())
    }
}

fn pending_from(dependencies: &[DependencySpecifier], requester: &Path) -> Vec<Pending> {
    dependencies
        .iter()
        .map(|dep| match dep {
            DependencySpecifier::Package(_) => Pending {
                specifier: dep.to_string(),
                is_bare: true,
                requester: requester.to_path_buf(),
            },
            DependencySpecifier::Path(path) => Pending {
                specifier: path.clone(),
                is_bare: false,
                requester: requester.to_path_buf(),
            },
        })
        .collect()
}

/// Fetch everything reachable from `build`.
pub async fn walk(fetcher: &Fetcher, session: &Session, build: &EntryBuild) -> CheckReport {
    let mut report = CheckReport {
        entry: build.entry_file_path.clone(),
        generation: build.generation,
        ..CheckReport::default()
    };
    let mut seen: HashSet<(String, PathBuf)> = HashSet::new();
    let mut loaded: BTreeSet<PathBuf> = BTreeSet::new();
    let mut shims: BTreeSet<String> = BTreeSet::new();

    let mut frontier: Vec<Pending> = pending_from(&build.dependencies, &build.entry_file_path)
        .into_iter()
        .filter(|p| seen.insert(p.key()))
        .collect();

    while !frontier.is_empty() {
        tracing::debug!(pending = frontier.len(), "fetching graph level");
        let results = join_all(frontier.iter().map(|p| {
            fetcher.fetch_raw(session, &p.specifier, p.is_bare, p.requester.clone())
        }))
        .await;

        let mut next = Vec::new();
        for (pending, result) in frontier.into_iter().zip(results) {
            match result {
                Ok(module) if module.kind == PayloadKind::NoopShim => {
                    shims.insert(module.fs_path.display().to_string());
                }
                Ok(module) => {
                    if !loaded.insert(module.fs_path.clone()) {
                        continue;
                    }
                    next.extend(
                        pending_from(&module.dependencies, &module.fs_path)
                            .into_iter()
                            .filter(|p| seen.insert(p.key())),
                    );
                }
                Err(err) => report.failures.push(CheckFailure {
                    specifier: pending.specifier,
                    requester: pending.requester,
                    code: err.code().to_string(),
                    message: err.to_string(),
                }),
            }
        }
        frontier = next;
    }

    report.modules = loaded.into_iter().collect();
    report.shims = shims.into_iter().collect();
    report
}

pub async fn run(action: CheckAction, json: bool) -> Result<()> {
    let sink = Arc::new(CollectingSink::new());
    let host = open_host(
        &action.cwd,
        &action.file,
        &action.workspaces,
        &action.overrides,
        Arc::new(NoLiveBuffers),
        sink,
    )?;

    let report = match host.fetcher.build_entry(&host.session).await {
        Ok(build) => walk(&host.fetcher, &host.session, &build).await,
        Err(err) => CheckReport {
            entry: host.document_path.clone(),
            generation: host.session.generation(),
            failures: vec![CheckFailure {
                specifier: host.document_path.display().to_string(),
                requester: host.document_path.clone(),
                code: err.code().to_string(),
                message: err.to_string(),
            }],
            ..CheckReport::default()
        },
    };

    if json {
        println!("{}", serde_json::to_string(&report).into_diagnostic()?);
    } else {
        print_human(&report);
    }

    if report.is_ok() {
        Ok(())
    } else {
        Err(miette::miette!(
            "{} module(s) failed to load for {}",
            report.failures.len(),
            report.entry.display()
        ))
    }
}

fn print_human(report: &CheckReport) {
    println!("  {}", report.entry.display());
    println!(
        "  {} module(s) loaded, {} shimmed",
        report.modules.len(),
        report.shims.len()
    );
    for failure in &report.failures {
        println!(
            "  ✗ {} (from {})\n      {} [{}]",
            failure.specifier,
            failure.requester.display(),
            failure.message,
            failure.code
        );
    }
    if report.is_ok() {
        println!("  ✓ all modules load");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdxp_core::{Document, PreviewConfig, Sandbox};
    use std::fs;

    #[tokio::test]
    async fn test_walk_collects_graph_and_failures() {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let root = mdxp_util::fs::canonicalize_or_keep(&root);
        fs::write(root.join("a.js"), "import b from './b';\nimport './missing';\nexport default b;").unwrap();
        fs::write(root.join("b.js"), "import a from './a';\nimport fs from 'fs';\nexport default 1;").unwrap();
        let entry = root.join("entry.js");
        fs::write(&entry, "import a from './a';\nconsole.log(a);").unwrap();

        let session = Session::new(
            Document::from_path(&entry, fs::read_to_string(&entry).unwrap()).unwrap(),
            PreviewConfig::default(),
            None,
        );
        let fetcher = Fetcher::new(
            Arc::new(Sandbox::new([&root])),
            Arc::new(NoLiveBuffers),
            Arc::new(CollectingSink::new()),
        );

        let build = fetcher.build_entry(&session).await.unwrap();
        let report = walk(&fetcher, &session, &build).await;

        assert_eq!(report.modules, vec![root.join("a.js"), root.join("b.js")]);
        assert_eq!(report.shims, vec!["/externalModules/fs".to_string()]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].specifier, "./missing");
        assert_eq!(report.failures[0].code, "RESOLUTION_FAILURE");
    }
}
