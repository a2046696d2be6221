//! Application state for the TUI.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use skiff_core::config::ServerConfig;
use skiff_core::{
    ChannelManager, ChannelStatus, ChatReply, Error, MessageDispatcher, SendMessageRequest,
    SessionRegistry, TURN_FAILED_TEXT,
};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

/// What the input line is editing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Composing the next turn
    #[default]
    Compose,
    /// Renaming the current conversation
    Rename,
}

/// Result of one spawned fallback request
pub struct FallbackOutcome {
    session_id: String,
    result: Result<ChatReply, Error>,
}

/// Ticks between reconnect attempts while the channel is down (~5s).
const RECONNECT_TICKS: u32 = 50;

/// Main application state.
pub struct App {
    /// Session state engine
    pub registry: SessionRegistry,
    /// Turn router
    dispatcher: MessageDispatcher,
    /// Backend endpoints
    server: ServerConfig,
    /// Realtime channel for the current session, if any
    channel: Option<(String, ChannelManager)>,
    /// Session with a realtime turn awaiting its reply, if any
    realtime_turn: Option<String>,
    /// Tokio runtime handle for channel tasks and fallback requests
    runtime: Handle,
    /// Latest health probe outcome
    health_rx: watch::Receiver<bool>,
    /// Completed fallback requests, reported by spawned tasks
    fallback_tx: mpsc::UnboundedSender<FallbackOutcome>,
    fallback_rx: mpsc::UnboundedReceiver<FallbackOutcome>,
    /// Input line buffer
    pub input: String,
    /// Rename buffer (InputMode::Rename)
    pub rename_buffer: String,
    /// Current input mode
    pub input_mode: InputMode,
    /// Transcript scroll offset, in lines back from the bottom
    pub scroll_offset: usize,
    /// Whether turns ask the backend to consult web content
    pub include_web: bool,
    /// Ticks since the last reconnect attempt
    reconnect_counter: u32,
    /// Whether the app should exit
    pub should_quit: bool,
}

impl App {
    pub fn new(
        registry: SessionRegistry,
        dispatcher: MessageDispatcher,
        server: ServerConfig,
        include_web: bool,
        runtime: Handle,
        health_rx: watch::Receiver<bool>,
    ) -> Self {
        let (fallback_tx, fallback_rx) = mpsc::unbounded_channel();
        let mut app = Self {
            registry,
            dispatcher,
            server,
            channel: None,
            realtime_turn: None,
            runtime,
            health_rx,
            fallback_tx,
            fallback_rx,
            input: String::new(),
            rename_buffer: String::new(),
            input_mode: InputMode::default(),
            scroll_offset: 0,
            include_web,
            reconnect_counter: 0,
            should_quit: false,
        };
        app.ensure_channel();
        app
    }

    /// Channel status for the header line.
    pub fn channel_status(&self) -> ChannelStatus {
        match &self.channel {
            Some((_, channel)) => channel.status(),
            None => ChannelStatus::Disconnected,
        }
    }

    /// Latest health probe outcome.
    pub fn backend_healthy(&self) -> bool {
        *self.health_rx.borrow()
    }

    // ============================================
    // Per-tick work
    // ============================================

    /// Drain inbound frames and fallback outcomes; retry the channel.
    pub fn on_tick(&mut self) {
        self.pump_channel();
        self.pump_fallback();

        // Periodically retry a dead channel for the current session.
        self.reconnect_counter += 1;
        if self.reconnect_counter >= RECONNECT_TICKS {
            self.reconnect_counter = 0;
            let dead = matches!(
                self.channel_status(),
                ChannelStatus::Disconnected | ChannelStatus::Failed
            );
            if dead && self.registry.current_session_id().is_some() {
                self.drop_channel();
                self.ensure_channel();
            }
        }
    }

    fn pump_channel(&mut self) {
        let Some((session_id, channel)) = &mut self.channel else {
            return;
        };
        let session_id = session_id.clone();
        while let Some(frame) = channel.try_recv() {
            self.dispatcher
                .handle_frame(&mut self.registry, &session_id, frame);
            self.scroll_offset = 0;
        }
        if !self.registry.state().is_loading {
            self.realtime_turn = None;
        }

        // A dead channel can never deliver the pending reply.
        let dead = matches!(
            channel.status(),
            ChannelStatus::Disconnected | ChannelStatus::Failed
        );
        if dead {
            if let Some(pending) = self.realtime_turn.take() {
                self.dispatcher
                    .handle_channel_loss(&mut self.registry, &pending);
                self.scroll_offset = 0;
            }
        }
    }

    fn pump_fallback(&mut self) {
        while let Ok(outcome) = self.fallback_rx.try_recv() {
            match outcome.result {
                Ok(reply) => self.dispatcher.complete_turn(
                    &mut self.registry,
                    &outcome.session_id,
                    &reply.message,
                    reply.sources,
                ),
                Err(e) => {
                    tracing::error!(session_id = %outcome.session_id, error = %e, "Fallback delivery failed");
                    self.dispatcher
                        .fail_turn(&mut self.registry, &outcome.session_id, TURN_FAILED_TEXT);
                }
            }
            self.scroll_offset = 0;
        }
    }

    /// Keep exactly one channel open, bound to the current session.
    fn ensure_channel(&mut self) {
        let Some(session_id) = self.registry.current_session_id() else {
            self.drop_channel();
            return;
        };
        let session_id = session_id.to_string();

        if let Some((bound, _)) = &self.channel {
            if *bound == session_id {
                return;
            }
        }

        // Dropping the old handle closes its socket.
        self.drop_channel();
        let _guard = self.runtime.enter();
        let channel = ChannelManager::open(&self.server.ws_base(), &session_id);
        self.channel = Some((session_id, channel));
        self.reconnect_counter = 0;
    }

    /// Discard the channel handle. A realtime turn still awaiting its reply
    /// on it can never be reconciled, so fail it first.
    fn drop_channel(&mut self) {
        self.channel = None;
        if let Some(pending) = self.realtime_turn.take() {
            self.dispatcher
                .handle_channel_loss(&mut self.registry, &pending);
        }
    }

    // ============================================
    // Key handling
    // ============================================

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('q') | KeyCode::Char('c') => self.should_quit = true,
                KeyCode::Char('n') => self.new_conversation(),
                KeyCode::Char('x') => self.delete_current(),
                KeyCode::Char('l') => self.registry.clear_messages(None),
                KeyCode::Char('r') => self.start_rename(),
                KeyCode::Char('w') => self.include_web = !self.include_web,
                _ => {}
            }
            return;
        }

        match self.input_mode {
            InputMode::Compose => match key.code {
                KeyCode::Enter => self.submit(),
                KeyCode::Char(c) => self.input.push(c),
                KeyCode::Backspace => {
                    self.input.pop();
                }
                KeyCode::Tab => self.cycle_session(1),
                KeyCode::BackTab => self.cycle_session(-1),
                KeyCode::PageUp => self.scroll_offset = self.scroll_offset.saturating_add(5),
                KeyCode::PageDown => self.scroll_offset = self.scroll_offset.saturating_sub(5),
                KeyCode::Esc => self.should_quit = true,
                _ => {}
            },
            InputMode::Rename => match key.code {
                KeyCode::Enter => self.commit_rename(),
                KeyCode::Esc => {
                    self.rename_buffer.clear();
                    self.input_mode = InputMode::Compose;
                }
                KeyCode::Char(c) => self.rename_buffer.push(c),
                KeyCode::Backspace => {
                    self.rename_buffer.pop();
                }
                _ => {}
            },
        }
    }

    // ============================================
    // Actions
    // ============================================

    /// Submit the composed turn to the current session.
    fn submit(&mut self) {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return;
        }

        // Session creation is explicit: make one before the first turn.
        if self.registry.current_session_id().is_none() {
            if let Err(e) = self.registry.create_session() {
                tracing::error!(error = %e, "Failed to create session");
                return;
            }
            self.ensure_channel();
        }

        let session_id = match self.dispatcher.begin_turn(&mut self.registry, &text, None) {
            Ok(session_id) => session_id,
            Err(Error::TurnInFlight) => {
                tracing::debug!("Turn rejected: previous turn still in flight");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Turn rejected");
                return;
            }
        };

        self.input.clear();
        self.scroll_offset = 0;

        // Realtime when connected, one fallback request otherwise.
        let realtime = match &self.channel {
            Some((bound, channel))
                if *bound == session_id && channel.status() == ChannelStatus::Connected =>
            {
                channel
                    .send(skiff_core::ClientFrame {
                        message: text.clone(),
                        include_web: self.include_web,
                    })
                    .is_ok()
            }
            _ => false,
        };
        if realtime {
            self.realtime_turn = Some(session_id);
        } else {
            self.spawn_fallback(session_id, text);
        }
    }

    /// Deliver one turn over HTTP off the UI thread.
    fn spawn_fallback(&self, session_id: String, text: String) {
        let client = self.dispatcher.client().clone();
        let tx = self.fallback_tx.clone();
        let include_web = self.include_web;
        self.runtime.spawn(async move {
            let request = SendMessageRequest {
                message: &text,
                session_id: Some(&session_id),
                include_web,
            };
            let result = client.send_message(&request).await;
            let _ = tx.send(FallbackOutcome { session_id, result });
        });
    }

    fn new_conversation(&mut self) {
        if let Err(e) = self.registry.create_session() {
            tracing::error!(error = %e, "Failed to create session");
            return;
        }
        self.scroll_offset = 0;
        self.ensure_channel();
    }

    fn delete_current(&mut self) {
        let Some(id) = self.registry.current_session_id().map(String::from) else {
            return;
        };
        self.registry.delete_session(&id);
        self.drop_channel();
        self.scroll_offset = 0;
        self.ensure_channel();
    }

    fn start_rename(&mut self) {
        let Some(session) = self.registry.current_session() else {
            return;
        };
        self.rename_buffer = session.name.clone();
        self.input_mode = InputMode::Rename;
    }

    fn commit_rename(&mut self) {
        let name = self.rename_buffer.trim().to_string();
        if !name.is_empty() {
            if let Some(id) = self.registry.current_session_id().map(String::from) {
                self.registry.rename_session(&id, &name);
            }
        }
        self.rename_buffer.clear();
        self.input_mode = InputMode::Compose;
    }

    /// Move to the next/previous session in most-recent order.
    fn cycle_session(&mut self, step: isize) {
        let ids: Vec<String> = self
            .registry
            .sessions_by_recency()
            .iter()
            .map(|s| s.id.clone())
            .collect();
        if ids.is_empty() {
            return;
        }

        let current = self.registry.current_session_id();
        let pos = current
            .and_then(|id| ids.iter().position(|s| s == id))
            .unwrap_or(0);
        let next = (pos as isize + step).rem_euclid(ids.len() as isize) as usize;

        self.registry.switch_session(&ids[next]);
        self.scroll_offset = 0;
        self.ensure_channel();
    }
}
