//! `mdxp fetch` command implementation.
//!
//! Runs one module request through the fetcher and prints the payload the
//! execution environment would receive.

use super::{absolute, open_host, ConfigArgs};
use crate::bridge::module_payload;
use mdxp_core::{CollectingSink, NoLiveBuffers};
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FetchAction {
    pub specifier: String,
    /// File the import appears in; also the previewed document.
    pub from: PathBuf,
    pub bare: bool,
    pub workspaces: Vec<PathBuf>,
    pub cwd: PathBuf,
    pub overrides: ConfigArgs,
}

pub async fn run(action: FetchAction, json: bool) -> Result<()> {
    let sink = Arc::new(CollectingSink::new());
    let host = open_host(
        &action.cwd,
        &action.from,
        &action.workspaces,
        &action.overrides,
        Arc::new(NoLiveBuffers),
        sink,
    )?;
    let requester = absolute(&action.cwd, &action.from);

    match host
        .fetcher
        .fetch_raw(&host.session, &action.specifier, action.bare, requester)
        .await
    {
        Ok(module) => {
            let output = serde_json::json!({
                "kind": module.kind.as_str(),
                "generation": module.generation,
                "module": module_payload(&module),
            });
            let text = if json {
                serde_json::to_string(&output)
            } else {
                serde_json::to_string_pretty(&output)
            }
            .into_diagnostic()?;
            println!("{text}");
            Ok(())
        }
        Err(err) => {
            if json {
                let output = serde_json::json!({
                    "error": { "code": err.code(), "message": err.to_string() },
                });
                println!("{output}");
            }
            Err(miette::miette!("{err} ({})", err.code()))
        }
    }
}
