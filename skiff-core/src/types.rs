//! Core domain types for skiff
//!
//! These types model the chat session state that the engine keeps in memory
//! and mirrors to the local state store.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | One independent, named conversation thread with its own history |
//! | **Message** | A single turn in a session, authored by user, assistant, or system |
//! | **Source** | A citation/excerpt attached to an assistant reply, with a relevance score |
//! | **ChatState** | The process-wide session map plus the current-session pointer |
//! | **ChannelStatus** | Lifecycle state of one realtime channel instance (never persisted) |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================
// Messages
// ============================================

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Returns the identifier used on the wire and in storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single message within a session.
///
/// Immutable once appended, except through the registry's explicit
/// edit/delete operations. `id` is unique within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Who authored the message
    pub role: Role,
    /// Message text
    pub content: String,
    /// When the message was appended
    pub created_at: DateTime<Utc>,
    /// Citations attached to assistant replies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
}

impl Message {
    /// Create a new message with a fresh id and the current timestamp.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            sources: None,
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message, optionally carrying sources.
    pub fn assistant(content: impl Into<String>, sources: Option<Vec<Source>>) -> Self {
        let mut msg = Self::new(Role::Assistant, content);
        msg.sources = sources;
        msg
    }
}

// ============================================
// Sources (citations)
// ============================================

/// Page reference within a source document.
///
/// PDF pages arrive as numbers; web sources may carry a section label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageRef {
    Number(i64),
    Label(String),
}

/// Metadata describing where a source excerpt came from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Source document name or URL
    #[serde(default)]
    pub source: String,
    /// Page number or label, if applicable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<PageRef>,
    /// Index of the chunk within the source document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
    /// Source kind (pdf, docx, web, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
}

/// A citation attached to an assistant reply. Purely descriptive; never mutated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Excerpt text
    #[serde(default)]
    pub content: String,
    /// Where the excerpt came from
    #[serde(default)]
    pub metadata: SourceMetadata,
    /// Relevance score in [0, 1]
    #[serde(default)]
    pub similarity: f64,
}

// ============================================
// Sessions
// ============================================

/// One conversation thread with its own message history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Human-friendly name
    pub name: String,
    /// Messages in append order (= chronological order)
    pub messages: Vec<Message>,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// Refreshed on every structural mutation
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// Create a new, empty session.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ============================================
// Process-wide chat state
// ============================================

/// Process-wide session state.
///
/// Only `sessions` and `current_session_id` are persisted; `is_loading` and
/// `error` are per-process UI signals and reset on every load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatState {
    /// All known sessions, keyed by session id
    #[serde(default)]
    pub sessions: HashMap<String, ChatSession>,
    /// The session new turns go to, if any. Must key `sessions` when set.
    #[serde(default)]
    pub current_session_id: Option<String>,
    /// A turn is in flight
    #[serde(skip)]
    pub is_loading: bool,
    /// Last surfaced error banner text
    #[serde(skip)]
    pub error: Option<String>,
}

impl ChatState {
    /// Returns the current session, if the pointer is set and valid.
    pub fn current_session(&self) -> Option<&ChatSession> {
        self.current_session_id
            .as_deref()
            .and_then(|id| self.sessions.get(id))
    }
}

// ============================================
// Channel status
// ============================================

/// Lifecycle state of one realtime channel instance.
///
/// Scoped to a single channel; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

impl ChannelStatus {
    /// Returns a display label for status lines
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Connecting => "connecting",
            ChannelStatus::Connected => "connected",
            ChannelStatus::Disconnected => "disconnected",
            ChannelStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
