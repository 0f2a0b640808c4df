//! Per-preview session state.
//!
//! Fetches never see a half-updated session: they work on an immutable
//! [`SessionSnapshot`] that is swapped wholesale when the document, its
//! text or the settings change. Each swap bumps the generation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use url::Url;

use crate::config::PreviewConfig;
use crate::error::Error;
use crate::markup::LayoutOptions;
use crate::resolver::{discover_tsconfig, TsConfig};

/// Document language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Markdown,
    Mdx,
    JavaScript,
    TypeScript,
    Other,
}

impl Language {
    /// Language by file extension (ASCII case-insensitive).
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("md" | "markdown") => Self::Markdown,
            Some("mdx") => Self::Mdx,
            Some("js" | "jsx" | "mjs" | "cjs") => Self::JavaScript,
            Some("ts" | "tsx" | "mts" | "cts") => Self::TypeScript,
            _ => Self::Other,
        }
    }

    /// Language by editor language id.
    #[must_use]
    pub fn from_id(id: &str) -> Self {
        match id {
            "markdown" => Self::Markdown,
            "mdx" => Self::Mdx,
            "javascript" | "javascriptreact" => Self::JavaScript,
            "typescript" | "typescriptreact" => Self::TypeScript,
            _ => Self::Other,
        }
    }

    #[must_use]
    pub fn is_markup(self) -> bool {
        matches!(self, Self::Markdown | Self::Mdx)
    }
}

/// The previewed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub uri: Url,
    pub language: Language,
    pub text: String,
}

impl Document {
    /// A document; the language comes from the URI path when not given.
    pub fn new(uri: Url, language: Option<Language>, text: impl Into<String>) -> Result<Self, Error> {
        if !matches!(uri.scheme(), "file" | "untitled") {
            return Err(Error::InvalidDocument {
                uri: uri.to_string(),
                reason: format!("unsupported scheme `{}`", uri.scheme()),
            });
        }
        let language = language.unwrap_or_else(|| Language::from_path(Path::new(uri.path())));
        Ok(Self {
            uri,
            language,
            text: text.into(),
        })
    }

    /// A saved document at `path`.
    pub fn from_path(path: &Path, text: impl Into<String>) -> Result<Self, Error> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        let uri = Url::from_file_path(&absolute).map_err(|()| Error::InvalidDocument {
            uri: absolute.display().to_string(),
            reason: "not a valid file path".to_string(),
        })?;
        Self::new(uri, None, text)
    }

    /// An unsaved buffer. Untitled buffers are always treated as markup.
    pub fn untitled(name: &str, text: impl Into<String>) -> Result<Self, Error> {
        let uri = Url::parse(&format!("untitled:{name}")).map_err(|err| Error::InvalidDocument {
            uri: name.to_string(),
            reason: err.to_string(),
        })?;
        Self::new(uri, Some(Language::Mdx), text)
    }

    #[must_use]
    pub fn is_untitled(&self) -> bool {
        self.uri.scheme() == "untitled"
    }

    /// Filesystem path of a saved document.
    #[must_use]
    pub fn file_path(&self) -> Option<PathBuf> {
        if self.uri.scheme() == "file" {
            self.uri.to_file_path().ok()
        } else {
            None
        }
    }

    /// Whether the entry transform runs the markup compiler.
    #[must_use]
    pub fn needs_markup(&self) -> bool {
        self.language.is_markup() || self.is_untitled()
    }
}

/// Immutable view of a session, shared by in-flight fetches.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub document: Arc<Document>,
    /// Canonical path of a saved document.
    pub document_path: Option<PathBuf>,
    /// Base directory for resolution and the sandbox. `None` disables
    /// fetching (untitled document without a workspace).
    pub entry_dir: Option<PathBuf>,
    pub tsconfig: Option<Arc<TsConfig>>,
    pub config: Arc<PreviewConfig>,
    pub generation: u64,
}

impl SessionSnapshot {
    /// Layout inputs for markup compiled under this snapshot.
    #[must_use]
    pub fn layout_options(&self) -> LayoutOptions {
        let document_dir = self.document_path.as_deref().and_then(Path::parent);
        LayoutOptions::from_config(&self.config, document_dir)
    }
}

/// State of one open preview.
#[derive(Debug)]
pub struct Session {
    snapshot: RwLock<Arc<SessionSnapshot>>,
    dependents: Mutex<BTreeSet<PathBuf>>,
    /// Directory untitled documents resolve from.
    workspace_root: Option<PathBuf>,
}

impl Session {
    /// Start a session for `document`.
    ///
    /// `workspace_root` is the entry directory of untitled documents.
    #[must_use]
    pub fn new(document: Document, config: PreviewConfig, workspace_root: Option<PathBuf>) -> Self {
        let snapshot = derive_snapshot(document, Arc::new(config), workspace_root.as_deref(), 1);
        let dependents = initial_dependents(&snapshot);
        Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            dependents: Mutex::new(dependents),
            workspace_root,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap())
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.snapshot.read().unwrap().generation
    }

    /// Switch to another document. Resets the dependent paths and
    /// re-derives the TypeScript project. Returns the new generation.
    pub fn set_document(&self, document: Document) -> u64 {
        let mut guard = self.snapshot.write().unwrap();
        let next = derive_snapshot(
            document,
            Arc::clone(&guard.config),
            self.workspace_root.as_deref(),
            guard.generation + 1,
        );
        *self.dependents.lock().unwrap() = initial_dependents(&next);
        tracing::debug!(
            uri = %next.document.uri,
            generation = next.generation,
            tsconfig = ?next.tsconfig.as_ref().map(|t| &t.path),
            "preview document changed"
        );
        let generation = next.generation;
        *guard = Arc::new(next);
        generation
    }

    /// New text for the current document. Dependents are kept.
    pub fn update_text(&self, text: impl Into<String>) -> u64 {
        let mut guard = self.snapshot.write().unwrap();
        let mut next = SessionSnapshot::clone(&guard);
        let mut document = Document::clone(&next.document);
        document.text = text.into();
        next.document = Arc::new(document);
        next.generation += 1;
        let generation = next.generation;
        *guard = Arc::new(next);
        generation
    }

    /// Replace the settings. Returns the new generation.
    pub fn set_config(&self, config: PreviewConfig) -> u64 {
        let mut guard = self.snapshot.write().unwrap();
        let mut next = SessionSnapshot::clone(&guard);
        next.config = Arc::new(config);
        next.generation += 1;
        let generation = next.generation;
        *guard = Arc::new(next);
        generation
    }

    /// Record a path the preview depends on.
    pub fn record_dependent(&self, path: &Path) {
        self.dependents.lock().unwrap().insert(path.to_path_buf());
    }

    #[must_use]
    pub fn is_dependent(&self, path: &Path) -> bool {
        self.dependents.lock().unwrap().contains(path)
    }

    #[must_use]
    pub fn dependent_paths(&self) -> Vec<PathBuf> {
        self.dependents.lock().unwrap().iter().cloned().collect()
    }
}

fn derive_snapshot(
    document: Document,
    config: Arc<PreviewConfig>,
    workspace_root: Option<&Path>,
    generation: u64,
) -> SessionSnapshot {
    let document_path = document
        .file_path()
        .map(|p| mdxp_util::fs::canonicalize_or_keep(&p));
    let entry_dir = match &document_path {
        Some(path) => path.parent().map(Path::to_path_buf),
        None => workspace_root.map(mdxp_util::fs::canonicalize_or_keep),
    };
    let tsconfig = entry_dir
        .as_deref()
        .and_then(discover_tsconfig)
        .map(Arc::new);
    SessionSnapshot {
        document: Arc::new(document),
        document_path,
        entry_dir,
        tsconfig,
        config,
        generation,
    }
}

fn initial_dependents(snapshot: &SessionSnapshot) -> BTreeSet<PathBuf> {
    snapshot.document_path.iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_language_detection() {
        assert_eq!(Language::from_path(Path::new("a.MDX")), Language::Mdx);
        assert_eq!(Language::from_path(Path::new("a.md")), Language::Markdown);
        assert_eq!(Language::from_path(Path::new("a.tsx")), Language::TypeScript);
        assert_eq!(Language::from_path(Path::new("a.txt")), Language::Other);
        assert_eq!(Language::from_id("javascriptreact"), Language::JavaScript);
    }

    #[test]
    fn test_document_schemes() {
        let untitled = Document::untitled("Untitled-1", "# hi").unwrap();
        assert!(untitled.is_untitled());
        assert!(untitled.needs_markup());
        assert!(untitled.file_path().is_none());

        let http = Url::parse("https://example.com/a.mdx").unwrap();
        assert!(matches!(
            Document::new(http, None, ""),
            Err(Error::InvalidDocument { .. })
        ));
    }

    #[test]
    fn test_entry_dir_and_tsconfig() {
        let dir = tempdir().unwrap();
        let docs = dir.path().join("docs");
        fs::create_dir(&docs).unwrap();
        fs::write(dir.path().join("tsconfig.json"), "{}").unwrap();
        let file = docs.join("a.mdx");
        fs::write(&file, "# a").unwrap();

        let session = Session::new(
            Document::from_path(&file, "# a").unwrap(),
            PreviewConfig::default(),
            None,
        );
        let snap = session.snapshot();
        assert_eq!(snap.entry_dir, Some(mdxp_util::fs::canonicalize_or_keep(&docs)));
        assert!(snap.tsconfig.is_some());
        assert_eq!(snap.generation, 1);
        assert_eq!(session.dependent_paths(), vec![snap.document_path.clone().unwrap()]);
    }

    #[test]
    fn test_untitled_uses_workspace_root() {
        let dir = tempdir().unwrap();
        let doc = Document::untitled("Untitled-1", "").unwrap();

        let without = Session::new(doc.clone(), PreviewConfig::default(), None);
        assert!(without.snapshot().entry_dir.is_none());

        let with = Session::new(doc, PreviewConfig::default(), Some(dir.path().to_path_buf()));
        assert!(with.snapshot().entry_dir.is_some());
        assert!(with.dependent_paths().is_empty());
    }

    #[test]
    fn test_document_change_resets_dependents() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.mdx");
        let b = dir.path().join("b.mdx");
        fs::write(&a, "").unwrap();
        fs::write(&b, "").unwrap();

        let session = Session::new(
            Document::from_path(&a, "").unwrap(),
            PreviewConfig::default(),
            None,
        );
        let old = session.snapshot();
        session.record_dependent(&dir.path().join("dep.js"));
        assert_eq!(session.update_text("# edited"), 2);
        assert_eq!(session.dependent_paths().len(), 2);

        assert_eq!(session.set_document(Document::from_path(&b, "").unwrap()), 3);
        let paths = session.dependent_paths();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("b.mdx"));
        // In-flight work keeps its own view.
        assert_eq!(old.generation, 1);
        assert_eq!(old.document.text, "");
    }

    #[test]
    fn test_set_config_bumps_generation() {
        let doc = Document::untitled("u", "").unwrap();
        let session = Session::new(doc, PreviewConfig::default(), None);
        let config = PreviewConfig {
            preview_on_change: false,
            ..PreviewConfig::default()
        };
        assert_eq!(session.set_config(config), 2);
        assert!(!session.snapshot().config.preview_on_change);
    }
}
