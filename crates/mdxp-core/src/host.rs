//! Collaborators the preview host provides.
//!
//! The core never talks to an editor directly: unsaved buffers come in
//! through [`LiveBuffers`] and results go out through [`PreviewSink`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use crate::fetcher::EntryBuild;

/// Access to unsaved editor buffers.
pub trait LiveBuffers: Send + Sync {
    /// Text of the open buffer for `path`, if there is one.
    fn live_text(&self, path: &Path) -> Option<String>;
}

/// No editor: every read goes to disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLiveBuffers;

impl LiveBuffers for NoLiveBuffers {
    fn live_text(&self, _path: &Path) -> Option<String> {
        None
    }
}

/// In-memory buffers keyed by canonical path.
#[derive(Debug, Default)]
pub struct MemoryBuffers {
    buffers: RwLock<HashMap<PathBuf, String>>,
}

impl MemoryBuffers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, path: &Path, text: impl Into<String>) {
        let key = mdxp_util::fs::canonicalize_or_keep(path);
        self.buffers.write().unwrap().insert(key, text.into());
    }

    /// Drop a buffer (closed or saved). Returns whether one existed.
    pub fn remove(&self, path: &Path) -> bool {
        let key = mdxp_util::fs::canonicalize_or_keep(path);
        self.buffers.write().unwrap().remove(&key).is_some()
    }
}

impl LiveBuffers for MemoryBuffers {
    fn live_text(&self, path: &Path) -> Option<String> {
        let buffers = self.buffers.read().unwrap();
        buffers
            .get(path)
            .or_else(|| buffers.get(&mdxp_util::fs::canonicalize_or_keep(path)))
            .cloned()
    }
}

/// An error shown in place of the preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewError {
    pub message: String,
}

impl PreviewError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Where preview results are delivered.
pub trait PreviewSink: Send + Sync {
    fn update_preview(&self, build: EntryBuild);
    fn show_preview_error(&self, error: PreviewError);
    /// A dependency changed on disk; the evaluator must drop its copy.
    fn invalidate(&self, path: &Path);
}

/// Everything a [`CollectingSink`] received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    UpdatePreview(EntryBuild),
    PreviewError(PreviewError),
    Invalidate(PathBuf),
}

/// Sink that records events in order, for one-shot commands and tests.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl CollectingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Preview errors received so far.
    #[must_use]
    pub fn errors(&self) -> Vec<PreviewError> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::PreviewError(err) => Some(err.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: SinkEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl PreviewSink for CollectingSink {
    fn update_preview(&self, build: EntryBuild) {
        self.push(SinkEvent::UpdatePreview(build));
    }

    fn show_preview_error(&self, error: PreviewError) {
        self.push(SinkEvent::PreviewError(error));
    }

    fn invalidate(&self, path: &Path) {
        self.push(SinkEvent::Invalidate(path.to_path_buf()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_buffers() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("doc.mdx");
        std::fs::write(&file, "on disk").unwrap();

        let buffers = MemoryBuffers::new();
        assert_eq!(buffers.live_text(&file), None);
        buffers.set(&file, "unsaved");
        assert_eq!(buffers.live_text(&file).as_deref(), Some("unsaved"));
        assert!(buffers.remove(&file));
        assert!(!buffers.remove(&file));
        assert_eq!(NoLiveBuffers.live_text(&file), None);
    }

    #[test]
    fn test_collecting_sink_keeps_order() {
        let sink = CollectingSink::new();
        sink.invalidate(Path::new("/w/a.js"));
        sink.show_preview_error(PreviewError::new("boom"));

        assert_eq!(
            sink.events(),
            vec![
                SinkEvent::Invalidate(PathBuf::from("/w/a.js")),
                SinkEvent::PreviewError(PreviewError::new("boom")),
            ]
        );
        assert_eq!(sink.errors(), vec![PreviewError::new("boom")]);
    }
}
