//! `mdxp preview` command implementation.
//!
//! Serves one document to an execution environment over the bridge
//! protocol:
//!
//! ```text
//! environment ──handshake──▶ handshake_ack, update_preview
//! environment ──fetch──────▶ fetch_result | fetch_error
//! file watcher ────────────▶ invalidate (dependency) | update_preview (document)
//! ```
//!
//! Every connected environment receives preview updates; fetch answers go
//! only to the connection that asked.

use super::{open_host, preview_config, ConfigArgs};
use crate::bridge::{fetch_error, fetch_result, BridgeSink};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use mdxp_core::config::CONFIG_FILE_NAMES;
use mdxp_core::{Fetcher, NoLiveBuffers, Session, VERSION};
use mdxp_proto::{codes, ClientMessage, ServerMessage, PROTO_SCHEMA_VERSION};
use mdxp_util::fingerprint::Fingerprints;
use miette::{IntoDiagnostic, Result};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::{Any, CorsLayer};

/// Window in which file events are coalesced into one batch.
const COALESCE_WINDOW: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct PreviewAction {
    pub file: PathBuf,
    pub workspaces: Vec<PathBuf>,
    pub cwd: PathBuf,
    pub host: String,
    pub port: u16,
    pub watch: bool,
    pub overrides: ConfigArgs,
}

/// Shared server state.
pub struct PreviewState {
    session: Arc<Session>,
    fetcher: Fetcher,
    document_path: PathBuf,
    sink: BridgeSink,
    overrides: ConfigArgs,
}

impl PreviewState {
    /// Open the document with a broadcasting sink.
    pub fn open(
        cwd: &Path,
        file: &Path,
        workspaces: &[PathBuf],
        overrides: ConfigArgs,
    ) -> Result<Self> {
        let (tx, _) = broadcast::channel(64);
        let sink = BridgeSink::new(tx);
        let host = open_host(
            cwd,
            file,
            workspaces,
            &overrides,
            Arc::new(NoLiveBuffers),
            Arc::new(sink.clone()),
        )?;
        Ok(Self {
            session: host.session,
            fetcher: host.fetcher,
            document_path: host.document_path,
            sink,
            overrides,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.sink.subscribe()
    }

    /// Rebuild the entry; the result reaches clients through the sink.
    async fn rebuild(&self) {
        if let Err(err) = self.fetcher.build_entry(&self.session).await {
            tracing::debug!(code = err.code(), "entry rebuild failed");
        }
    }
}

/// Run the preview server.
pub async fn run(action: PreviewAction) -> Result<()> {
    let state = Arc::new(PreviewState::open(
        &action.cwd,
        &action.file,
        &action.workspaces,
        action.overrides.clone(),
    )?);

    if action.watch {
        let mut roots = state.fetcher.sandbox().roots();
        if let Some(dir) = state.document_path.parent() {
            if !roots.iter().any(|root| dir.starts_with(root)) {
                roots.push(dir.to_path_buf());
            }
        }

        let (change_tx, mut change_rx) = mpsc::channel::<Vec<PathBuf>>(16);
        std::thread::spawn(move || {
            if let Err(e) = watch_files(&roots, change_tx) {
                tracing::error!(error = %e, "file watcher stopped");
            }
        });

        let change_state = Arc::clone(&state);
        tokio::spawn(async move {
            let mut fingerprints = Fingerprints::new();
            fingerprints.changed(&change_state.document_path);
            while let Some(changed) = change_rx.recv().await {
                handle_changes(&change_state, &mut fingerprints, changed).await;
            }
        });
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = Router::new()
        .route("/bridge", get(bridge_websocket))
        .layer(cors)
        .with_state(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", action.host, action.port)
        .parse()
        .into_diagnostic()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    let local = listener.local_addr().into_diagnostic()?;

    println!();
    println!("  Previewing {}", state.document_path.display());
    println!("  Bridge listening at ws://{local}/bridge");
    println!();
    println!("  Press Ctrl+C to stop");
    println!();

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .into_diagnostic()?;

    Ok(())
}

// ============================================================================
// WebSocket bridge
// ============================================================================

async fn bridge_websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<PreviewState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_bridge_socket(socket, state))
}

async fn send(socket: &mut WebSocket, message: &ServerMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(json) => socket.send(Message::Text(json)).await.is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode bridge message");
            true
        }
    }
}

async fn handle_bridge_socket(mut socket: WebSocket, state: Arc<PreviewState>) {
    tracing::info!("execution environment connected");
    let mut events = state.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ServerMessage>();

    loop {
        tokio::select! {
            biased;
            Some(reply) = reply_rx.recv() => {
                if !send(&mut socket, &reply).await {
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(message) => {
                    if !send(&mut socket, &message).await {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "bridge client fell behind, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => handle_message(&state, &text, &reply_tx),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "bridge socket error");
                    break;
                }
            },
        }
    }
    tracing::info!("execution environment disconnected");
}

/// Handle one message from an execution environment.
///
/// Direct answers go to `reply`; fetches run as separate tasks so a slow
/// module never blocks the connection.
pub fn handle_message(
    state: &Arc<PreviewState>,
    text: &str,
    reply: &mpsc::UnboundedSender<ServerMessage>,
) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            let _ = reply.send(ServerMessage::error(
                codes::INVALID_REQUEST,
                format!("invalid bridge message: {e}"),
            ));
            return;
        }
    };

    match message {
        ClientMessage::Handshake {
            proto_schema_version,
            client_version,
        } => {
            if proto_schema_version != PROTO_SCHEMA_VERSION {
                let _ = reply.send(ServerMessage::error(
                    codes::PROTO_VERSION_MISMATCH,
                    format!(
                        "client speaks protocol {proto_schema_version}, server speaks {PROTO_SCHEMA_VERSION}"
                    ),
                ));
                return;
            }
            tracing::debug!(client_version = %client_version, "handshake");
            let snapshot = state.session.snapshot();
            let _ = reply.send(ServerMessage::HandshakeAck {
                proto_schema_version: PROTO_SCHEMA_VERSION,
                server_version: VERSION.to_string(),
                generation: snapshot.generation,
                content_security_policy: snapshot.config.content_security_policy().to_string(),
            });
            let state = Arc::clone(state);
            tokio::spawn(async move { state.rebuild().await });
        }
        ClientMessage::Fetch {
            id,
            specifier,
            is_bare,
            requesting_file,
        } => {
            let state = Arc::clone(state);
            let reply = reply.clone();
            tokio::spawn(async move {
                let message = match state
                    .fetcher
                    .fetch_raw(&state.session, &specifier, is_bare, requesting_file)
                    .await
                {
                    Ok(module) => fetch_result(id, &module),
                    Err(err) => fetch_error(id, &err),
                };
                let _ = reply.send(message);
            });
        }
        ClientMessage::ReportPerformance { duration_ms } => {
            tracing::info!(duration_ms, "preview evaluated");
        }
    }
}

// ============================================================================
// File watching
// ============================================================================

/// Paths under version control metadata or build output are never relevant.
fn should_ignore(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(name) => name == ".git" || name == "target",
        _ => false,
    })
}

/// Watch `roots` and send batches of changed paths.
///
/// Events are coalesced until the watcher has been quiet for
/// [`COALESCE_WINDOW`].
fn watch_files(roots: &[PathBuf], change_tx: mpsc::Sender<Vec<PathBuf>>) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();

    let mut watcher = RecommendedWatcher::new(tx, Config::default()).into_diagnostic()?;
    for root in roots {
        watcher
            .watch(root, RecursiveMode::Recursive)
            .into_diagnostic()?;
        tracing::debug!(root = %root.display(), "watching");
    }

    let mut pending: HashSet<PathBuf> = HashSet::new();
    loop {
        match rx.recv_timeout(COALESCE_WINDOW) {
            Ok(Ok(event)) => {
                pending.extend(event.paths.into_iter().filter(|p| !should_ignore(p)));
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "watch error");
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                if pending.is_empty() {
                    continue;
                }
                let batch: Vec<PathBuf> = pending.drain().collect();
                if change_tx.blocking_send(batch).is_err() {
                    break;
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}

/// React to a batch of changed paths.
///
/// The document itself and settings files trigger a rebuild; other
/// dependent paths are invalidated in the execution environment. Paths
/// whose contents did not actually change are skipped.
pub async fn handle_changes(
    state: &PreviewState,
    fingerprints: &mut Fingerprints,
    changed: Vec<PathBuf>,
) {
    let mut rebuild = false;

    for path in changed {
        let path = mdxp_util::fs::canonicalize_or_keep(&path);
        let is_settings = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| CONFIG_FILE_NAMES.contains(&n));

        if path == state.document_path {
            if !fingerprints.changed(&path) {
                continue;
            }
            match mdxp_util::fs::read_to_string_lossy(&path) {
                Ok(text) => {
                    let generation = state.session.update_text(text);
                    tracing::info!(generation, "document changed");
                    rebuild = true;
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "cannot reread document"),
            }
        } else if is_settings {
            if !fingerprints.changed(&path) {
                continue;
            }
            match preview_config(&state.document_path, &state.overrides) {
                Ok(config) => {
                    let generation = state.session.set_config(config);
                    tracing::info!(generation, path = %path.display(), "settings changed");
                    rebuild = true;
                }
                Err(e) => tracing::warn!(error = %e, "ignoring invalid settings"),
            }
        } else if state.session.is_dependent(&path) && fingerprints.changed(&path) {
            state.fetcher.invalidate(&state.session, &path);
        }
    }

    if rebuild {
        state.rebuild().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        state: Arc<PreviewState>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = mdxp_util::fs::canonicalize_or_keep(dir.path());
        fs::write(root.join("doc.js"), "import a from './a';\nconsole.log(a);").unwrap();
        fs::write(root.join("a.js"), "module.exports = 1;").unwrap();
        let state = PreviewState::open(
            &root,
            Path::new("doc.js"),
            &[],
            ConfigArgs::default(),
        )
        .unwrap();
        Fixture {
            _dir: dir,
            root,
            state: Arc::new(state),
        }
    }

    #[tokio::test]
    async fn test_handshake_acks_then_updates() {
        let fx = fixture();
        let mut events = fx.state.subscribe();
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle_message(&fx.state, r#"{"type":"handshake","client_version":"test"}"#, &tx);
        let ServerMessage::HandshakeAck {
            generation,
            content_security_policy,
            ..
        } = rx.recv().await.unwrap()
        else {
            panic!("expected handshake_ack");
        };
        assert_eq!(generation, 1);
        assert!(content_security_policy.starts_with("default-src 'none'"));

        let ServerMessage::UpdatePreview {
            entry_file_dependencies,
            ..
        } = events.recv().await.unwrap()
        else {
            panic!("expected update_preview");
        };
        assert_eq!(entry_file_dependencies, vec!["./a"]);
    }

    #[tokio::test]
    async fn test_fetch_and_errors_answer_the_caller() {
        let fx = fixture();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let requester = fx.root.join("doc.js").display().to_string();

        let fetch = serde_json::json!({
            "type": "fetch",
            "id": 1,
            "specifier": "./a",
            "is_bare": false,
            "requesting_file": requester,
        });
        handle_message(&fx.state, &fetch.to_string(), &tx);
        let ServerMessage::FetchResult { id, module, .. } = rx.recv().await.unwrap() else {
            panic!("expected fetch_result");
        };
        assert_eq!(id, 1);
        assert_eq!(module.fs_path, fx.root.join("a.js").display().to_string());

        let missing = serde_json::json!({
            "type": "fetch",
            "id": 2,
            "specifier": "./nope",
            "is_bare": false,
            "requesting_file": requester,
        });
        handle_message(&fx.state, &missing.to_string(), &tx);
        let ServerMessage::FetchError { id, code, .. } = rx.recv().await.unwrap() else {
            panic!("expected fetch_error");
        };
        assert_eq!((id, code.as_str()), (2, "RESOLUTION_FAILURE"));

        handle_message(&fx.state, "not json", &tx);
        let ServerMessage::Error { code, .. } = rx.recv().await.unwrap() else {
            panic!("expected error");
        };
        assert_eq!(code, codes::INVALID_REQUEST);

        handle_message(&fx.state, r#"{"type":"handshake","proto_schema_version":99}"#, &tx);
        let ServerMessage::Error { code, .. } = rx.recv().await.unwrap() else {
            panic!("expected error");
        };
        assert_eq!(code, codes::PROTO_VERSION_MISMATCH);
    }

    #[tokio::test]
    async fn test_changes_invalidate_and_rebuild() {
        let fx = fixture();
        let dep = fx.root.join("a.js");
        fx.state
            .fetcher
            .fetch_raw(&fx.state.session, "./a", false, fx.root.join("doc.js"))
            .await
            .unwrap();

        let mut fingerprints = Fingerprints::new();
        fingerprints.changed(&dep);
        fingerprints.changed(&fx.state.document_path);
        let mut events = fx.state.subscribe();

        // Unchanged contents are ignored.
        handle_changes(&fx.state, &mut fingerprints, vec![dep.clone()]).await;
        fs::write(&dep, "module.exports = 2;").unwrap();
        fs::write(fx.root.join("unrelated.js"), "x").unwrap();
        handle_changes(
            &fx.state,
            &mut fingerprints,
            vec![dep.clone(), fx.root.join("unrelated.js")],
        )
        .await;
        assert_eq!(
            events.recv().await.unwrap(),
            ServerMessage::Invalidate {
                fs_path: dep.display().to_string()
            }
        );

        fs::write(&fx.state.document_path, "console.log('edited');").unwrap();
        handle_changes(&fx.state, &mut fingerprints, vec![fx.state.document_path.clone()]).await;
        let message = events.recv().await.unwrap();
        assert_eq!(message.generation(), Some(2));
        let ServerMessage::UpdatePreview { code, .. } = message else {
            panic!("expected update_preview");
        };
        assert!(code.contains("edited"));
    }

    #[test]
    fn test_should_ignore() {
        assert!(should_ignore(Path::new("/w/.git/index")));
        assert!(should_ignore(Path::new("/w/target/debug/x")));
        assert!(!should_ignore(Path::new("/w/docs/a.mdx")));
    }
}
