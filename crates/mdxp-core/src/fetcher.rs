//! On-demand module fetcher.
//!
//! Turns a module request from the preview evaluator into a
//! [`ResolvedModule`]: resolve, sandbox, read, classify, transform and
//! extract dependencies. Every fetch works on one session snapshot and
//! its result carries that snapshot's generation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Serialize, Serializer};
use tracing::{debug, error, trace};

use crate::classify::{classify, PayloadKind};
use crate::compiler::TranspileChain;
use crate::host::{LiveBuffers, PreviewError, PreviewSink};
use crate::imports::{DependencyExtractor, ExtractedDependency, ScanExtractor};
use crate::pipeline::{transform_dependency, transform_entry};
use crate::resolver::{
    package_name, resolve, ResolveContext, ResolverConfig, SharedManifestCache,
};
use crate::sandbox::Sandbox;
use crate::session::{Session, SessionSnapshot};

/// Module with no behavior, used for shims and previews without an entry.
pub const NOOP_MODULE: &str = "Object.defineProperty(exports, '__esModule', { value: true });
  function noop() {}
  exports.default = noop;";

/// Prefix of shimmed core module paths.
pub const EXTERNAL_MODULES_PREFIX: &str = "/externalModules/";

/// Scheme marking a specifier as a package request.
pub const PACKAGE_SCHEME: &str = "npm://";

/// Core modules that are always shimmed.
pub const UNSHIMMABLE_CORE_MODULES: &[&str] = &[
    "dns",
    "dgram",
    "child_process",
    "cluster",
    "module",
    "net",
    "readline",
    "repl",
    "tls",
    "crypto",
    "exports",
];

/// Core modules shimmed only when they cannot be resolved or are denied.
pub const SHIMMABLE_CORE_MODULES: &[&str] = &[
    "process",
    "events",
    "util",
    "os",
    "fs",
    "path",
    "buffer",
    "url",
    "string_decoder",
    "punycode",
    "querystring",
    "stream",
    "http",
    "https",
    "assert",
    "constants",
    "timers",
    "console",
    "vm",
    "zlib",
    "tty",
    "domain",
];

/// Stable error codes.
pub mod codes {
    pub const PATH_ACCESS_DENIED: &str = "PATH_ACCESS_DENIED";
    pub const RESOLUTION_FAILURE: &str = "RESOLUTION_FAILURE";
    pub const TRANSFORM_FAILURE: &str = "TRANSFORM_FAILURE";
    pub const READ_FAILURE: &str = "READ_FAILURE";
    pub const PROTOCOL_FAILURE: &str = "PROTOCOL_FAILURE";
}

/// Fetch failures.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Accessing {} denied. This path is outside of your workspace folders. Please make sure you have all dependencies inside your workspace.", path.display())]
    PathAccessDenied { path: PathBuf },

    #[error("Cannot find module '{specifier}' from '{}'", requester.display())]
    ResolutionFailure { specifier: String, requester: PathBuf },

    #[error("Failed to transform {}: {message}", path.display())]
    TransformFailure { path: PathBuf, message: String },

    #[error("Failed to read {}: {source}", path.display())]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid module request '{specifier}': {detail}")]
    ProtocolFailure { specifier: String, detail: String },
}

impl FetchError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::PathAccessDenied { .. } => codes::PATH_ACCESS_DENIED,
            Self::ResolutionFailure { .. } => codes::RESOLUTION_FAILURE,
            Self::TransformFailure { .. } => codes::TRANSFORM_FAILURE,
            Self::ReadFailure { .. } => codes::READ_FAILURE,
            Self::ProtocolFailure { .. } => codes::PROTOCOL_FAILURE,
        }
    }
}

/// A validated module request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRequest {
    pub specifier: String,
    pub is_bare: bool,
    pub requesting_file: PathBuf,
}

impl ModuleRequest {
    /// Validate a raw request. An `npm://` prefix is stripped and forces a
    /// bare lookup; any other `scheme://` is rejected.
    pub fn parse(
        specifier: &str,
        is_bare: bool,
        requesting_file: impl Into<PathBuf>,
    ) -> Result<Self, FetchError> {
        let failure = |detail: &str| FetchError::ProtocolFailure {
            specifier: specifier.to_string(),
            detail: detail.to_string(),
        };

        if specifier.contains('\0') {
            return Err(failure("specifier contains a NUL byte"));
        }
        let (spec, is_bare) = match specifier.strip_prefix(PACKAGE_SCHEME) {
            Some(rest) => (rest, true),
            None => (specifier, is_bare),
        };
        if let Some((scheme, _)) = spec.split_once("://") {
            let is_scheme = !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
            if is_scheme {
                return Err(failure(&format!("unsupported scheme `{scheme}`")));
            }
        }
        if spec.is_empty() {
            return Err(failure("empty specifier"));
        }

        Ok(Self {
            specifier: spec.to_string(),
            is_bare,
            requesting_file: requesting_file.into(),
        })
    }
}

/// A dependency of a fetched module, as reported to the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencySpecifier {
    /// Resolved from `node_modules`; rendered as `npm://<spec>`.
    Package(String),
    /// Relative or absolute path, resolved against the declaring module.
    Path(String),
}

impl DependencySpecifier {
    /// Classify an extracted specifier.
    #[must_use]
    pub fn from_specifier(spec: &str) -> Self {
        let is_path = spec == "."
            || spec.starts_with('/')
            || spec.starts_with("./")
            || spec.starts_with("../");
        if is_path {
            Self::Path(spec.to_string())
        } else {
            Self::Package(spec.to_string())
        }
    }
}

impl fmt::Display for DependencySpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Package(name) => write!(f, "{PACKAGE_SCHEME}{name}"),
            Self::Path(path) => f.write_str(path),
        }
    }
}

impl Serialize for DependencySpecifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A fetched module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedModule {
    pub fs_path: PathBuf,
    pub kind: PayloadKind,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    pub dependencies: Vec<DependencySpecifier>,
    pub generation: u64,
}

impl ResolvedModule {
    fn shim(fs_path: String, generation: u64) -> Self {
        Self {
            fs_path: PathBuf::from(fs_path),
            kind: PayloadKind::NoopShim,
            code: NOOP_MODULE.to_string(),
            css: None,
            dependencies: Vec::new(),
            generation,
        }
    }

    fn core_shim(name: &str, generation: u64) -> Self {
        Self::shim(format!("{EXTERNAL_MODULES_PREFIX}{name}"), generation)
    }
}

/// The transformed entry document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryBuild {
    pub code: String,
    pub entry_file_path: PathBuf,
    pub dependencies: Vec<DependencySpecifier>,
    pub generation: u64,
}

/// Resolution pipeline states, logged at trace level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ResolveBare,
    ResolveRelative,
    Sandbox,
    Classify,
    ReadOrGetLiveText,
    Transform,
    ExtractDeps,
    Done,
    Failed,
}

fn enter(state: State, specifier: &str) {
    trace!(state = ?state, specifier, "fetch state");
}

/// Module fetcher shared by every session of a host.
#[derive(Clone)]
pub struct Fetcher {
    sandbox: Arc<Sandbox>,
    buffers: Arc<dyn LiveBuffers>,
    sink: Arc<dyn PreviewSink>,
    chain: Arc<TranspileChain>,
    extractor: Arc<dyn DependencyExtractor>,
    manifests: Arc<SharedManifestCache>,
    resolver_config: Arc<ResolverConfig>,
}

impl fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("roots", &self.sandbox.roots())
            .field("strategies", &self.chain.strategy_names())
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    #[must_use]
    pub fn new(
        sandbox: Arc<Sandbox>,
        buffers: Arc<dyn LiveBuffers>,
        sink: Arc<dyn PreviewSink>,
    ) -> Self {
        Self {
            sandbox,
            buffers,
            sink,
            chain: Arc::new(TranspileChain::standard()),
            extractor: Arc::new(ScanExtractor),
            manifests: Arc::new(SharedManifestCache::new()),
            resolver_config: Arc::new(ResolverConfig::default()),
        }
    }

    #[must_use]
    pub fn with_chain(mut self, chain: TranspileChain) -> Self {
        self.chain = Arc::new(chain);
        self
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: impl DependencyExtractor + 'static) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    #[must_use]
    pub fn sandbox(&self) -> &Arc<Sandbox> {
        &self.sandbox
    }

    #[must_use]
    pub fn sink(&self) -> &Arc<dyn PreviewSink> {
        &self.sink
    }

    /// Validate and fetch a raw request.
    ///
    /// A malformed request is returned as `ProtocolFailure` without
    /// notifying the preview; every other failure is also pushed to the
    /// preview-error sink.
    pub async fn fetch_raw(
        &self,
        session: &Session,
        specifier: &str,
        is_bare: bool,
        requesting_file: impl Into<PathBuf>,
    ) -> Result<ResolvedModule, FetchError> {
        let request = ModuleRequest::parse(specifier, is_bare, requesting_file)?;
        self.fetch(session, &request).await
    }

    /// Fetch one module for the session's current snapshot.
    pub async fn fetch(
        &self,
        session: &Session,
        request: &ModuleRequest,
    ) -> Result<ResolvedModule, FetchError> {
        let snapshot = session.snapshot();
        match self.fetch_in(session, &snapshot, request).await {
            Ok(module) => {
                enter(State::Done, &request.specifier);
                Ok(module)
            }
            Err(err) => {
                enter(State::Failed, &request.specifier);
                error!(
                    specifier = %request.specifier,
                    requester = %request.requesting_file.display(),
                    code = err.code(),
                    error = %err,
                    "module fetch failed"
                );
                if !matches!(err, FetchError::ProtocolFailure { .. }) {
                    self.sink.show_preview_error(PreviewError::new(err.to_string()));
                }
                Err(err)
            }
        }
    }

    async fn fetch_in(
        &self,
        session: &Session,
        snapshot: &SessionSnapshot,
        request: &ModuleRequest,
    ) -> Result<ResolvedModule, FetchError> {
        let generation = snapshot.generation;
        let Some(entry_dir) = snapshot.entry_dir.as_deref() else {
            debug!(specifier = %request.specifier, "no entry directory, serving no-op module");
            return Ok(ResolvedModule::shim(request.specifier.clone(), generation));
        };

        let core_name = request
            .is_bare
            .then(|| package_name(&request.specifier))
            .filter(|name| {
                UNSHIMMABLE_CORE_MODULES.contains(name) || SHIMMABLE_CORE_MODULES.contains(name)
            });
        if let Some(name) = core_name.filter(|n| UNSHIMMABLE_CORE_MODULES.contains(n)) {
            return Ok(ResolvedModule::core_shim(name, generation));
        }

        let fs_path = match self.resolve_path(snapshot, entry_dir, request) {
            Ok(path) => path,
            Err(err) => {
                if let Some(name) = core_name {
                    debug!(name, "core module not installed, shimming");
                    return Ok(ResolvedModule::core_shim(name, generation));
                }
                return Err(err);
            }
        };

        enter(State::Sandbox, &request.specifier);
        if !self.sandbox.is_allowed(entry_dir, &fs_path) {
            if let Some(name) = core_name {
                return Ok(ResolvedModule::core_shim(name, generation));
            }
            return Err(FetchError::PathAccessDenied { path: fs_path });
        }

        session.record_dependent(&fs_path);

        enter(State::ReadOrGetLiveText, &request.specifier);
        let text = self
            .acquire_text(&fs_path, snapshot.config.preview_on_change)
            .await?;

        enter(State::Classify, &request.specifier);
        let classification = classify(&fs_path);
        let mut module = ResolvedModule {
            fs_path,
            kind: classification.kind,
            code: String::new(),
            css: None,
            dependencies: Vec::new(),
            generation,
        };
        match classification.kind {
            PayloadKind::Json => {
                module.code = format!("module.exports = {text}");
                return Ok(module);
            }
            PayloadKind::Css => {
                module.css = Some(text);
                return Ok(module);
            }
            PayloadKind::Binary => {
                module.code = format!(
                    "module.exports = \"vscode-resource://{}\"",
                    module.fs_path.display()
                );
                return Ok(module);
            }
            PayloadKind::Script | PayloadKind::NoopShim => {}
        }

        enter(State::Transform, &request.specifier);
        let chain = Arc::clone(&self.chain);
        let path = module.fs_path.clone();
        let layout = snapshot.layout_options();
        let markup = classification.markup;
        let transformed = tokio::task::spawn_blocking(move || {
            transform_dependency(&chain, &path, &text, markup, &layout).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())
        .and_then(|r| r);
        module.code = transformed.map_err(|message| FetchError::TransformFailure {
            path: module.fs_path.clone(),
            message,
        })?;

        enter(State::ExtractDeps, &request.specifier);
        module.dependencies = self.dependencies(&module.code, &module.fs_path);
        Ok(module)
    }

    fn resolve_path(
        &self,
        snapshot: &SessionSnapshot,
        entry_dir: &Path,
        request: &ModuleRequest,
    ) -> Result<PathBuf, FetchError> {
        let state = if request.is_bare {
            State::ResolveBare
        } else {
            State::ResolveRelative
        };
        enter(state, &request.specifier);

        let parent = request
            .requesting_file
            .parent()
            .unwrap_or(entry_dir)
            .to_path_buf();
        let ctx = ResolveContext {
            parent: &parent,
            entry_dir: Some(entry_dir),
            tsconfig: snapshot.tsconfig.as_deref(),
            config: &self.resolver_config,
            manifests: self.manifests.as_ref(),
        };
        let result = resolve(&ctx, &request.specifier, request.is_bare);
        match result.resolved {
            Some(path) => Ok(path),
            None => {
                debug!(
                    specifier = %request.specifier,
                    reason = ?result.reason,
                    tried = result.tried.len(),
                    "unresolved"
                );
                Err(FetchError::ResolutionFailure {
                    specifier: request.specifier.clone(),
                    requester: request.requesting_file.clone(),
                })
            }
        }
    }

    /// Live buffer when enabled and present, otherwise the file on disk.
    async fn acquire_text(&self, path: &Path, live: bool) -> Result<String, FetchError> {
        if live {
            if let Some(text) = self.buffers.live_text(path) {
                trace!(path = %path.display(), "using live buffer");
                return Ok(text);
            }
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| FetchError::ReadFailure {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Extract and classify the dependencies of transformed code.
    fn dependencies(&self, code: &str, path: &Path) -> Vec<DependencySpecifier> {
        self.extractor
            .extract(code)
            .into_iter()
            .filter_map(|dep| match dep {
                ExtractedDependency::Static(spec) => Some(DependencySpecifier::from_specifier(&spec)),
                ExtractedDependency::Unknown => {
                    debug!(path = %path.display(), "skipping dynamic dependency");
                    None
                }
            })
            .collect()
    }

    /// Build the entry document and deliver it to the sink.
    ///
    /// Failures are reported to the sink as preview errors.
    pub async fn build_entry(&self, session: &Session) -> Result<EntryBuild, FetchError> {
        let snapshot = session.snapshot();
        match self.build_entry_in(&snapshot).await {
            Ok(build) => {
                self.sink.update_preview(build.clone());
                Ok(build)
            }
            Err(err) => {
                error!(uri = %snapshot.document.uri, code = err.code(), error = %err, "entry build failed");
                self.sink.show_preview_error(PreviewError::new(err.to_string()));
                Err(err)
            }
        }
    }

    async fn build_entry_in(&self, snapshot: &SessionSnapshot) -> Result<EntryBuild, FetchError> {
        let document = &snapshot.document;
        let (text, entry_file_path) = match &snapshot.document_path {
            Some(path) => {
                let text = if snapshot.config.preview_on_change {
                    match self.buffers.live_text(path) {
                        Some(text) => text,
                        None => document.text.clone(),
                    }
                } else {
                    self.acquire_text(path, false).await?
                };
                let real = tokio::fs::canonicalize(path)
                    .await
                    .map(|p| dunce::simplified(&p).to_path_buf())
                    .map_err(|source| FetchError::ReadFailure {
                        path: path.clone(),
                        source,
                    })?;
                (text, real)
            }
            None => {
                let entry = snapshot
                    .entry_dir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(document.uri.path()));
                (document.text.clone(), entry)
            }
        };

        let chain = Arc::clone(&self.chain);
        let doc = Arc::clone(document);
        let layout = snapshot.layout_options();
        let code = tokio::task::spawn_blocking(move || {
            transform_entry(&chain, &doc, &text, &layout).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())
        .and_then(|r| r)
        .map_err(|message| FetchError::TransformFailure {
            path: entry_file_path.clone(),
            message,
        })?;

        let dependencies = self.dependencies(&code, &entry_file_path);
        debug!(
            path = %entry_file_path.display(),
            generation = snapshot.generation,
            dependencies = dependencies.len(),
            "entry built"
        );
        Ok(EntryBuild {
            code,
            entry_file_path,
            dependencies,
            generation: snapshot.generation,
        })
    }

    /// Tell the preview that `path` changed, if the session depends on it.
    ///
    /// Returns whether an invalidation was sent.
    pub fn invalidate(&self, session: &Session, path: &Path) -> bool {
        let path = mdxp_util::fs::canonicalize_or_keep(path);
        if !session.is_dependent(&path) {
            return false;
        }
        debug!(path = %path.display(), "invalidating dependency");
        self.sink.invalidate(&path);
        true
    }
}
