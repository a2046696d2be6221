//! Message dispatcher: optimistic turn delivery over two channels
//!
//! Per outgoing turn the dispatcher:
//!
//! 1. rejects empty/whitespace-only text and a second in-flight turn,
//!    with no side effects
//! 2. appends the optimistic user message (never rolled back)
//! 3. sets the loading flag
//! 4. routes over the realtime channel when it is `Connected`, otherwise
//!    issues one fallback request
//! 5. reconciles the reply: one appended assistant message on success, one
//!    appended user-visible error message on failure, so the transcript
//!    stays a complete record of what the user saw
//!
//! Realtime `status` frames only toggle the loading flag; they never append
//! messages. The granular steps (`begin_turn` / `complete_turn` /
//! `fail_turn` / `handle_frame`) are public so event-driven frontends can
//! reconcile replies as they arrive instead of awaiting `send_turn`.

use crate::backend::{BackendClient, SendMessageRequest};
use crate::channel::{ChannelManager, ClientFrame, ServerFrame};
use crate::error::{Error, Result};
use crate::store::SessionRegistry;
use crate::types::{ChannelStatus, Message, Source};

/// Error text appended to the transcript when delivery fails.
///
/// Raw transport errors go to the log, never to the user.
pub const TURN_FAILED_TEXT: &str =
    "Sorry, something went wrong while answering. Please try again.";

/// Per-turn options.
#[derive(Debug, Clone, Default)]
pub struct TurnOptions {
    /// Explicit target session; defaults to the current session
    pub session_id: Option<String>,
    /// Whether retrieval should include web content
    pub include_web: bool,
}

/// Routes turns between the realtime and fallback channels and reconciles
/// replies into the session registry.
pub struct MessageDispatcher {
    client: BackendClient,
}

impl MessageDispatcher {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    /// The fallback client, for callers that deliver off-thread.
    pub fn client(&self) -> &BackendClient {
        &self.client
    }

    /// Validate a turn and append the optimistic user message.
    ///
    /// Returns the resolved target session id. On any rejection
    /// (`EmptyTurn`, `TurnInFlight`, `NotHydrated`, missing session) the
    /// state is left untouched.
    pub fn begin_turn(
        &self,
        registry: &mut SessionRegistry,
        text: &str,
        session_id: Option<&str>,
    ) -> Result<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(Error::EmptyTurn);
        }
        if !registry.is_hydrated() {
            return Err(Error::NotHydrated);
        }
        if registry.state().is_loading {
            return Err(Error::TurnInFlight);
        }

        let target = match session_id {
            Some(id) => {
                if registry.session(id).is_none() {
                    return Err(Error::SessionNotFound(id.to_string()));
                }
                id.to_string()
            }
            None => registry
                .current_session_id()
                .ok_or(Error::NoActiveSession)?
                .to_string(),
        };

        registry.add_message(Message::user(trimmed), Some(&target))?;
        registry.set_loading(true);
        registry.set_error(None);
        Ok(target)
    }

    /// Append the assistant reply and clear the loading flag.
    pub fn complete_turn(
        &self,
        registry: &mut SessionRegistry,
        session_id: &str,
        content: &str,
        sources: Vec<Source>,
    ) {
        let sources = if sources.is_empty() {
            None
        } else {
            Some(sources)
        };
        if let Err(e) = registry.add_message(Message::assistant(content, sources), Some(session_id))
        {
            // Session deleted while the turn was in flight; the reply has
            // nowhere to land.
            tracing::warn!(session_id = %session_id, error = %e, "Dropping reply for missing session");
        }
        registry.set_loading(false);
    }

    /// Append a user-visible error message, set the error banner, and clear
    /// the loading flag.
    pub fn fail_turn(&self, registry: &mut SessionRegistry, session_id: &str, user_visible: &str) {
        if let Err(e) =
            registry.add_message(Message::assistant(user_visible, None), Some(session_id))
        {
            tracing::warn!(session_id = %session_id, error = %e, "Dropping error reply for missing session");
        }
        registry.set_error(Some(user_visible.to_string()));
        registry.set_loading(false);
    }

    /// Reconcile one inbound realtime frame for a session.
    pub fn handle_frame(
        &self,
        registry: &mut SessionRegistry,
        session_id: &str,
        frame: ServerFrame,
    ) {
        match frame {
            // Out-of-band progress: toggles loading, never appends.
            ServerFrame::Status { content } => {
                if content == "thinking" {
                    registry.set_loading(true);
                }
            }
            ServerFrame::Message { content, sources } => {
                self.complete_turn(registry, session_id, &content, sources);
            }
            ServerFrame::Error { content } => {
                self.fail_turn(registry, session_id, &content);
            }
        }
    }

    /// Reconcile the loss of the realtime channel.
    ///
    /// A reply for a turn sent over a channel that has since disconnected
    /// (or been replaced) can never arrive, so the turn is failed like any
    /// other delivery error; otherwise the loading flag stays latched and
    /// every later submission is rejected as in-flight. No-op when nothing
    /// is pending.
    pub fn handle_channel_loss(&self, registry: &mut SessionRegistry, session_id: &str) {
        if !registry.state().is_loading {
            return;
        }
        tracing::warn!(session_id = %session_id, "Realtime channel lost with a turn in flight");
        self.fail_turn(registry, session_id, TURN_FAILED_TEXT);
    }

    /// Deliver one turn end to end.
    ///
    /// Realtime path: the frame is pushed and the reply reconciles later via
    /// [`handle_frame`](Self::handle_frame) when the caller pumps the
    /// channel. Fallback path: the request is awaited and reconciled before
    /// returning. Returns the target session id.
    pub async fn send_turn(
        &self,
        registry: &mut SessionRegistry,
        channel: Option<&ChannelManager>,
        text: &str,
        options: &TurnOptions,
    ) -> Result<String> {
        let session_id = self.begin_turn(registry, text, options.session_id.as_deref())?;
        let trimmed = text.trim();

        // Realtime only while Connected; a refused send (status raced to
        // disconnected) degrades to the fallback like any other outage.
        let realtime = match channel {
            Some(channel) if channel.status() == ChannelStatus::Connected => channel
                .send(ClientFrame {
                    message: trimmed.to_string(),
                    include_web: options.include_web,
                })
                .is_ok(),
            _ => false,
        };

        if !realtime {
            let request = SendMessageRequest {
                message: trimmed,
                session_id: Some(&session_id),
                include_web: options.include_web,
            };
            match self.client.send_message(&request).await {
                Ok(reply) => {
                    self.complete_turn(registry, &session_id, &reply.message, reply.sources);
                }
                Err(e) => {
                    tracing::error!(session_id = %session_id, error = %e, "Fallback delivery failed");
                    self.fail_turn(registry, &session_id, TURN_FAILED_TEXT);
                }
            }
        }

        Ok(session_id)
    }
}
