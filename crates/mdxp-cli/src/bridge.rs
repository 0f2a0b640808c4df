//! Conversions between fetcher results and bridge protocol messages.

use mdxp_core::{EntryBuild, FetchError, PreviewError, PreviewSink, ResolvedModule};
use mdxp_proto::{ModulePayload, ServerMessage};
use std::path::Path;
use tokio::sync::broadcast;

/// Wire form of a fetched module.
pub fn module_payload(module: &ResolvedModule) -> ModulePayload {
    ModulePayload {
        fs_path: module.fs_path.display().to_string(),
        code: module.code.clone(),
        dependencies: module.dependencies.iter().map(ToString::to_string).collect(),
        css: module.css.clone(),
    }
}

pub fn fetch_result(id: u64, module: &ResolvedModule) -> ServerMessage {
    ServerMessage::FetchResult {
        id,
        generation: module.generation,
        module: module_payload(module),
    }
}

pub fn fetch_error(id: u64, err: &FetchError) -> ServerMessage {
    ServerMessage::FetchError {
        id,
        code: err.code().to_string(),
        message: err.to_string(),
    }
}

pub fn update_preview(build: &EntryBuild) -> ServerMessage {
    ServerMessage::UpdatePreview {
        generation: build.generation,
        code: build.code.clone(),
        entry_file_path: build.entry_file_path.display().to_string(),
        entry_file_dependencies: build.dependencies.iter().map(ToString::to_string).collect(),
    }
}

/// Sink that broadcasts to every connected execution environment.
#[derive(Debug, Clone)]
pub struct BridgeSink {
    tx: broadcast::Sender<ServerMessage>,
}

impl BridgeSink {
    pub fn new(tx: broadcast::Sender<ServerMessage>) -> Self {
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.tx.subscribe()
    }

    fn send(&self, message: ServerMessage) {
        // No receivers just means no preview is connected yet.
        if self.tx.send(message).is_err() {
            tracing::trace!("no bridge clients connected");
        }
    }
}

impl PreviewSink for BridgeSink {
    fn update_preview(&self, build: EntryBuild) {
        self.send(update_preview(&build));
    }

    fn show_preview_error(&self, error: PreviewError) {
        self.send(ServerMessage::ShowPreviewError {
            message: error.message,
        });
    }

    fn invalidate(&self, path: &Path) {
        self.send(ServerMessage::Invalidate {
            fs_path: path.display().to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdxp_core::{DependencySpecifier, PayloadKind};
    use std::path::PathBuf;

    #[test]
    fn test_module_payload() {
        let module = ResolvedModule {
            fs_path: PathBuf::from("/w/a.js"),
            kind: PayloadKind::Script,
            code: "require('react')".into(),
            css: None,
            dependencies: vec![
                DependencySpecifier::Package("react".into()),
                DependencySpecifier::Path("./b".into()),
            ],
            generation: 3,
        };
        let ServerMessage::FetchResult { id, generation, module: payload } = fetch_result(9, &module)
        else {
            panic!("expected fetch_result");
        };
        assert_eq!((id, generation), (9, 3));
        assert_eq!(payload.fs_path, "/w/a.js");
        assert_eq!(payload.dependencies, vec!["npm://react", "./b"]);
        assert!(payload.css.is_none());
    }

    #[tokio::test]
    async fn test_sink_broadcasts() {
        let (tx, _) = broadcast::channel(8);
        let sink = BridgeSink::new(tx);
        sink.invalidate(Path::new("/w/gone.js"));

        let mut rx = sink.subscribe();
        sink.show_preview_error(PreviewError::new("boom"));
        sink.invalidate(Path::new("/w/a.js"));

        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMessage::ShowPreviewError {
                message: "boom".into()
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMessage::Invalidate {
                fs_path: "/w/a.js".into()
            }
        );
    }
}
