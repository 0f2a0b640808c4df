#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Bridge protocol between the preview host and the execution environment.
//!
//! The execution environment evaluates the previewed document and asks the
//! host for every module it imports; the host answers with transformed
//! code and pushes preview updates, errors and invalidations.
//!
//! ## Wire format
//! One JSON message per WebSocket text frame, tagged by `type`.

use serde::{Deserialize, Serialize};

/// Protocol schema version. Bump when changing message format.
pub const PROTO_SCHEMA_VERSION: u32 = 1;

/// Error codes for protocol-level failures.
///
/// Fetch failures carry the fetcher's own codes in `fetch_error`.
pub mod codes {
    pub const PROTO_VERSION_MISMATCH: &str = "PROTO_VERSION_MISMATCH";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// A message from the execution environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Sent once when the environment is ready.
    Handshake {
        #[serde(default = "default_schema_version")]
        proto_schema_version: u32,
        #[serde(default)]
        client_version: String,
    },

    /// Request one module.
    Fetch {
        /// Echoed in the answer.
        id: u64,
        specifier: String,
        is_bare: bool,
        /// Absolute path of the importing module.
        requesting_file: String,
    },

    /// Time the environment spent evaluating the last entry build.
    ReportPerformance { duration_ms: f64 },
}

fn default_schema_version() -> u32 {
    PROTO_SCHEMA_VERSION
}

impl ClientMessage {
    #[must_use]
    pub fn handshake(client_version: impl Into<String>) -> Self {
        Self::Handshake {
            proto_schema_version: PROTO_SCHEMA_VERSION,
            client_version: client_version.into(),
        }
    }
}

/// A fetched module as seen by the execution environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModulePayload {
    pub fs_path: String,
    pub code: String,
    /// Dependency specifiers; packages carry the `npm://` prefix.
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
}

/// A message to the execution environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    HandshakeAck {
        proto_schema_version: u32,
        server_version: String,
        generation: u64,
        /// Empty when the policy is disabled.
        content_security_policy: String,
    },

    FetchResult {
        id: u64,
        generation: u64,
        module: ModulePayload,
    },

    FetchError {
        id: u64,
        code: String,
        message: String,
    },

    /// New entry code to evaluate.
    UpdatePreview {
        generation: u64,
        code: String,
        entry_file_path: String,
        entry_file_dependencies: Vec<String>,
    },

    ShowPreviewError { message: String },

    /// Drop the cached module at `fs_path`.
    Invalidate { fs_path: String },

    /// The message could not be handled at all.
    Error { code: String, message: String },
}

impl ServerMessage {
    #[must_use]
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Generation the message belongs to, if it carries one.
    #[must_use]
    pub fn generation(&self) -> Option<u64> {
        match self {
            Self::HandshakeAck { generation, .. }
            | Self::FetchResult { generation, .. }
            | Self::UpdatePreview { generation, .. } => Some(*generation),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proto_schema_version_is_stable() {
        assert_eq!(PROTO_SCHEMA_VERSION, 1);
    }

    #[test]
    fn test_client_messages_from_json() {
        let fetch: ClientMessage = serde_json::from_str(
            r#"{"type":"fetch","id":7,"specifier":"./a","is_bare":false,"requesting_file":"/w/doc.mdx"}"#,
        )
        .unwrap();
        assert_eq!(
            fetch,
            ClientMessage::Fetch {
                id: 7,
                specifier: "./a".into(),
                is_bare: false,
                requesting_file: "/w/doc.mdx".into(),
            }
        );

        let hello: ClientMessage = serde_json::from_str(r#"{"type":"handshake"}"#).unwrap();
        assert_eq!(
            hello,
            ClientMessage::Handshake {
                proto_schema_version: PROTO_SCHEMA_VERSION,
                client_version: String::new(),
            }
        );

        let perf: ClientMessage =
            serde_json::from_str(r#"{"type":"report_performance","duration_ms":12.5}"#).unwrap();
        assert_eq!(perf, ClientMessage::ReportPerformance { duration_ms: 12.5 });
    }

    #[test]
    fn test_module_payload_wire_shape() {
        let payload = ModulePayload {
            fs_path: "/w/a.js".into(),
            code: "module.exports = 1".into(),
            dependencies: vec!["npm://react".into()],
            css: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "fsPath": "/w/a.js",
                "code": "module.exports = 1",
                "dependencies": ["npm://react"],
            })
        );

        let styled = ModulePayload {
            css: Some("a{}".into()),
            ..payload
        };
        assert_eq!(serde_json::to_value(&styled).unwrap()["css"], "a{}");
    }

    #[test]
    fn test_server_message_tags() {
        let msg = ServerMessage::FetchError {
            id: 3,
            code: "RESOLUTION_FAILURE".into(),
            message: "Cannot find module".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "fetch_error");
        assert_eq!(json["id"], 3);

        let invalidate = serde_json::to_value(ServerMessage::Invalidate {
            fs_path: "/w/a.js".into(),
        })
        .unwrap();
        assert_eq!(invalidate, serde_json::json!({"type": "invalidate", "fs_path": "/w/a.js"}));
        assert_eq!(msg.generation(), None);
    }

    #[test]
    fn test_update_preview_survives_the_wire() {
        let msg = ServerMessage::UpdatePreview {
            generation: 4,
            code: "ReactDOM.render()".into(),
            entry_file_path: "/w/doc.mdx".into(),
            entry_file_dependencies: vec!["npm://react".into()],
        };
        let text = serde_json::to_string(&msg).unwrap();
        let decoded: ServerMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded.generation(), Some(4));
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_unknown_message_type_fails() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"shutdown"}"#).is_err());
    }

    #[test]
    fn test_error_codes_are_uppercase() {
        for code in [
            codes::PROTO_VERSION_MISMATCH,
            codes::INVALID_REQUEST,
            codes::INTERNAL_ERROR,
        ] {
            assert_eq!(code, code.to_uppercase());
        }
    }
}
