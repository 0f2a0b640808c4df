#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

mod bridge;
mod commands;
mod logging;

use clap::Parser;
use commands::ConfigArgs;
use mdxp_core::Config;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mdxp")]
#[command(author, version, about = "Live preview host for MDX documents", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Serve a live preview of a document over the bridge protocol
    Preview {
        /// Document to preview
        file: PathBuf,

        /// Workspace folder modules may be loaded from (repeatable; defaults to the cwd)
        #[arg(long = "workspace", value_name = "DIR")]
        workspaces: Vec<PathBuf>,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(long, default_value_t = 4747)]
        port: u16,

        /// Do not watch the workspace for changes
        #[arg(long)]
        no_watch: bool,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Fetch one module the way the preview would and print it
    Fetch {
        /// Module specifier (relative path, absolute path, package or npm://package)
        specifier: String,

        /// File the import appears in
        #[arg(long, value_name = "FILE")]
        from: PathBuf,

        /// Treat the specifier as a package name
        #[arg(long)]
        bare: bool,

        /// Workspace folder modules may be loaded from (repeatable; defaults to the cwd)
        #[arg(long = "workspace", value_name = "DIR")]
        workspaces: Vec<PathBuf>,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Build a document and fetch its whole module graph, reporting failures
    Check {
        /// Document to check
        file: PathBuf,

        /// Workspace folder modules may be loaded from (repeatable; defaults to the cwd)
        #[arg(long = "workspace", value_name = "DIR")]
        workspaces: Vec<PathBuf>,

        #[command(flatten)]
        config: ConfigArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = match &cli.cwd {
        Some(path) => path.clone(),
        None => std::env::current_dir().into_diagnostic()?,
    };
    let config = Config::new(cwd.clone())
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    logging::init(config.verbosity, config.json_logs);

    let Some(command) = cli.command else {
        return commands::version::run();
    };

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;

    match command {
        Commands::Version => commands::version::run(),
        Commands::Preview {
            file,
            workspaces,
            host,
            port,
            no_watch,
            config: overrides,
        } => {
            let span = tracing::info_span!("preview", cmd = "preview", cwd = %cwd.display());
            let _guard = span.enter();
            let action = commands::preview::PreviewAction {
                file,
                workspaces,
                cwd,
                host,
                port,
                watch: !no_watch,
                overrides,
            };
            runtime.block_on(commands::preview::run(action))
        }
        Commands::Fetch {
            specifier,
            from,
            bare,
            workspaces,
            config: overrides,
        } => {
            let action = commands::fetch::FetchAction {
                specifier,
                from,
                bare,
                workspaces,
                cwd,
                overrides,
            };
            runtime.block_on(commands::fetch::run(action, cli.json))
        }
        Commands::Check {
            file,
            workspaces,
            config: overrides,
        } => {
            let action = commands::check::CheckAction {
                file,
                workspaces,
                cwd,
                overrides,
            };
            runtime.block_on(commands::check::run(action, cli.json))
        }
    }
}
