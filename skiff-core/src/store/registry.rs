//! Session registry: the single owner of chat state
//!
//! All mutations of [`ChatState`] go through this type. Each mutation runs
//! synchronously on the in-memory state and is followed by a fire-and-forget
//! mirror to the [`StateStore`]; storage failures never block or fail the
//! mutation. Reads and writes are refused until [`SessionRegistry::hydrate`]
//! has installed the persisted state (invariant: hydration strictly precedes
//! any session resolution).

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{ChatSession, ChatState, Message};

use super::hydration::HydrationGate;
use super::state_store::StateStore;

/// In-memory mapping of session ids to sessions, mirrored to durable storage.
pub struct SessionRegistry {
    state: ChatState,
    store: Arc<dyn StateStore>,
    gate: HydrationGate,
}

impl SessionRegistry {
    /// Create a registry over the given store. The registry starts in the
    /// pending state; call [`hydrate`](Self::hydrate) before use.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            state: ChatState::default(),
            store,
            gate: HydrationGate::new(),
        }
    }

    // ============================================
    // Hydration
    // ============================================

    /// Load persisted state on the blocking pool and install it.
    ///
    /// Completes the gate regardless of load outcome: a failed or empty load
    /// degrades to an empty state rather than blocking the process forever.
    /// Idempotent; a second call does not re-read the store.
    pub async fn hydrate(&mut self) {
        if self.gate.is_hydrated() {
            return;
        }

        let store = self.store.clone();
        let loaded = tokio::task::spawn_blocking(move || store.load())
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "State load task failed, starting empty");
                ChatState::default()
            });

        self.install(loaded);
    }

    /// Synchronous hydration for callers without an async context.
    pub fn hydrate_now(&mut self) {
        if self.gate.is_hydrated() {
            return;
        }
        let loaded = self.store.load();
        self.install(loaded);
    }

    fn install(&mut self, mut loaded: ChatState) {
        // Repair a dangling current pointer from an older record.
        if let Some(id) = &loaded.current_session_id {
            if !loaded.sessions.contains_key(id) {
                tracing::warn!(session_id = %id, "Persisted current session no longer exists");
                loaded.current_session_id = None;
            }
        }

        tracing::info!(sessions = loaded.sessions.len(), "Session state hydrated");
        self.state = loaded;
        self.gate.mark_hydrated();
    }

    /// The hydration gate, for callers that want to await readiness.
    pub fn gate(&self) -> &HydrationGate {
        &self.gate
    }

    /// Returns true once hydration has completed.
    pub fn is_hydrated(&self) -> bool {
        self.gate.is_hydrated()
    }

    fn ensure_hydrated(&self) -> Result<()> {
        if self.gate.is_hydrated() {
            Ok(())
        } else {
            Err(Error::NotHydrated)
        }
    }

    /// Guard for the no-op-style operations: logs and refuses work while
    /// pending instead of returning an error.
    fn hydrated_or_skip(&self, op: &str) -> bool {
        if self.gate.is_hydrated() {
            true
        } else {
            tracing::warn!(op, "Mutation attempted before hydration, ignoring");
            false
        }
    }

    // ============================================
    // Session operations
    // ============================================

    /// Allocate a new empty session, make it current, and return its id.
    pub fn create_session(&mut self) -> Result<String> {
        self.ensure_hydrated()?;

        let name = format!("Conversation {}", self.state.sessions.len() + 1);
        let session = ChatSession::new(name);
        let id = session.id.clone();

        tracing::info!(session_id = %id, "Created session");
        self.state.sessions.insert(id.clone(), session);
        self.state.current_session_id = Some(id.clone());
        self.persist();
        Ok(id)
    }

    /// Make the given session current. No-op if the id is unknown.
    pub fn switch_session(&mut self, id: &str) {
        if !self.hydrated_or_skip("switch_session") {
            return;
        }
        if !self.state.sessions.contains_key(id) {
            tracing::warn!(session_id = %id, "Cannot switch to unknown session");
            return;
        }
        self.state.current_session_id = Some(id.to_string());
        self.persist();
    }

    /// Rename a session. No-op if the id is unknown.
    pub fn rename_session(&mut self, id: &str, name: &str) {
        if !self.hydrated_or_skip("rename_session") {
            return;
        }
        if let Some(session) = self.state.sessions.get_mut(id) {
            session.name = name.to_string();
            session.touch();
            self.persist();
        }
    }

    /// Remove all messages from a session (explicit id, else current).
    /// No-op if the target does not exist.
    pub fn clear_messages(&mut self, id: Option<&str>) {
        if !self.hydrated_or_skip("clear_messages") {
            return;
        }
        let target = match id {
            Some(id) => Some(id.to_string()),
            None => self.state.current_session_id.clone(),
        };
        let Some(target) = target else { return };

        if let Some(session) = self.state.sessions.get_mut(&target) {
            session.messages.clear();
            session.touch();
            self.persist();
        }
    }

    /// Delete one message from a session. No-op if either id is unknown.
    pub fn delete_message(&mut self, id: &str, message_id: &str) {
        if !self.hydrated_or_skip("delete_message") {
            return;
        }
        if let Some(session) = self.state.sessions.get_mut(id) {
            let before = session.messages.len();
            session.messages.retain(|m| m.id != message_id);
            if session.messages.len() != before {
                session.touch();
                self.persist();
            }
        }
    }

    /// Replace the content of one message. No-op if either id is unknown.
    pub fn update_message(&mut self, id: &str, message_id: &str, content: &str) {
        if !self.hydrated_or_skip("update_message") {
            return;
        }
        if let Some(session) = self.state.sessions.get_mut(id) {
            if let Some(message) = session.messages.iter_mut().find(|m| m.id == message_id) {
                message.content = content.to_string();
                session.touch();
                self.persist();
            }
        }
    }

    /// Delete a session. If it was current, the pointer moves to an arbitrary
    /// remaining session, or to none; it is never left dangling.
    pub fn delete_session(&mut self, id: &str) {
        if !self.hydrated_or_skip("delete_session") {
            return;
        }
        if self.state.sessions.remove(id).is_none() {
            return;
        }

        if self.state.current_session_id.as_deref() == Some(id) {
            self.state.current_session_id = self.state.sessions.keys().next().cloned();
        }

        tracing::info!(session_id = %id, "Deleted session");
        self.persist();
    }

    /// Append a message to the target session (explicit id, else current).
    ///
    /// Never creates a session implicitly: with an unknown explicit id this
    /// fails with [`Error::SessionNotFound`], and with no resolvable current
    /// session it fails with [`Error::NoActiveSession`].
    pub fn add_message(&mut self, message: Message, session_id: Option<&str>) -> Result<()> {
        self.ensure_hydrated()?;

        let target = match session_id {
            Some(id) => {
                if !self.state.sessions.contains_key(id) {
                    return Err(Error::SessionNotFound(id.to_string()));
                }
                id.to_string()
            }
            None => self
                .state
                .current_session_id
                .clone()
                .ok_or(Error::NoActiveSession)?,
        };

        let session = self
            .state
            .sessions
            .get_mut(&target)
            .ok_or(Error::NoActiveSession)?;
        session.messages.push(message);
        session.touch();
        self.persist();
        Ok(())
    }

    // ============================================
    // Transient flags (not persisted)
    // ============================================

    /// Set the in-flight indicator.
    pub fn set_loading(&mut self, loading: bool) {
        self.state.is_loading = loading;
    }

    /// Set or clear the error banner text.
    pub fn set_error(&mut self, error: Option<String>) {
        self.state.error = error;
    }

    // ============================================
    // Read accessors
    // ============================================

    /// The full state. Reads nothing durable; valid only after hydration.
    pub fn state(&self) -> &ChatState {
        &self.state
    }

    /// Look up a session by id.
    pub fn session(&self, id: &str) -> Option<&ChatSession> {
        self.state.sessions.get(id)
    }

    /// The current session, if any.
    pub fn current_session(&self) -> Option<&ChatSession> {
        self.state.current_session()
    }

    /// The current session id, if any.
    pub fn current_session_id(&self) -> Option<&str> {
        self.state.current_session_id.as_deref()
    }

    /// Sessions sorted most-recently-updated first, for listing.
    pub fn sessions_by_recency(&self) -> Vec<&ChatSession> {
        let mut sessions: Vec<&ChatSession> = self.state.sessions.values().collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    fn persist(&self) {
        self.store.save(&self.state);
    }
}
