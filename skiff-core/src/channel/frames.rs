//! Wire frames for the realtime channel
//!
//! Inbound frames are JSON objects tagged by a `type` field:
//!
//! ```json
//! {"type": "status", "content": "thinking"}
//! {"type": "message", "content": "...", "sources": [...]}
//! {"type": "error", "content": "..."}
//! ```
//!
//! Outbound frames carry the user turn: `{"message": "...", "include_web": true}`.
//!
//! Parsing is strict: anything that does not match one of the known shapes
//! is a [`MalformedFrame`](crate::error::Error::MalformedFrame). The channel
//! layer logs and drops such frames; they never reach the transcript.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Source;

/// Frame sent to the backend for each realtime turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientFrame {
    /// User turn text
    pub message: String,
    /// Whether retrieval should include web content
    pub include_web: bool,
}

/// Frame received from the backend over the realtime channel.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Progress signal; `"thinking"` means a reply is being generated
    Status { content: String },
    /// Assistant reply with optional citations
    Message {
        content: String,
        #[serde(default)]
        sources: Vec<Source>,
    },
    /// Backend-reported failure, surfaced to the transcript
    Error { content: String },
}

impl ServerFrame {
    /// Returns true for the `thinking` progress signal.
    pub fn is_thinking(&self) -> bool {
        matches!(self, ServerFrame::Status { content } if content == "thinking")
    }
}

/// Parse one inbound text payload into a [`ServerFrame`].
pub fn parse_frame(text: &str) -> Result<ServerFrame> {
    serde_json::from_str(text).map_err(|e| Error::MalformedFrame(format!("{}: {}", e, text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageRef;

    #[test]
    fn test_parse_status_frame() {
        let frame = parse_frame(r#"{"type":"status","content":"thinking"}"#).unwrap();
        assert!(frame.is_thinking());
    }

    #[test]
    fn test_parse_message_frame_with_sources() {
        let frame = parse_frame(
            r#"{
                "type": "message",
                "content": "Restart the router.",
                "sources": [{
                    "content": "To restart the router...",
                    "metadata": {"source": "manual.pdf", "page": 12, "source_type": "pdf"},
                    "similarity": 0.87
                }]
            }"#,
        )
        .unwrap();

        match frame {
            ServerFrame::Message { content, sources } => {
                assert_eq!(content, "Restart the router.");
                assert_eq!(sources.len(), 1);
                assert_eq!(sources[0].metadata.page, Some(PageRef::Number(12)));
            }
            other => panic!("expected message frame, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_message_frame_without_sources() {
        let frame = parse_frame(r#"{"type":"message","content":"Hello"}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Message {
                content: "Hello".to_string(),
                sources: vec![]
            }
        );
    }

    #[test]
    fn test_parse_error_frame() {
        let frame = parse_frame(r#"{"type":"error","content":"model overloaded"}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Error {
                content: "model overloaded".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_frames_are_rejected() {
        for payload in [
            "not json",
            "{}",
            r#"{"type":"surprise","content":"?"}"#,
            r#"{"type":"status"}"#,
            r#"{"type":"message","body":"wrong field"}"#,
            "[1,2,3]",
        ] {
            let err = parse_frame(payload).unwrap_err();
            assert!(
                matches!(err, Error::MalformedFrame(_)),
                "payload {:?} produced {:?}",
                payload,
                err
            );
        }
    }

    #[test]
    fn test_client_frame_wire_shape() {
        let frame = ClientFrame {
            message: "How do I reset my password?".to_string(),
            include_web: true,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["message"], "How do I reset my password?");
        assert_eq!(json["include_web"], true);
    }
}
