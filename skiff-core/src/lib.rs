//! # skiff-core
//!
//! Core library for skiff - a dual-channel chat client for a remote
//! assistant backend.
//!
//! This library provides:
//! - Domain types for sessions, messages, and citation sources
//! - A session registry with durable local persistence and a hydration gate
//! - Realtime (WebSocket) and fallback (HTTP) delivery channels
//! - The message dispatcher that routes turns and reconciles replies
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Control flow for one turn:
//! - the dispatcher appends the optimistic user message to the registry
//! - the turn goes over the realtime channel when it is connected,
//!   otherwise over one fallback request
//! - the reply (or a user-visible error) is appended when it arrives
//! - every registry mutation is mirrored to the local state store
//! - on a fresh start, the hydration gate blocks all of the above until the
//!   persisted state has loaded
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use skiff_core::{
//!     BackendClient, Config, FileStore, MessageDispatcher, SessionRegistry, TurnOptions,
//! };
//!
//! # async fn run() -> skiff_core::Result<()> {
//! let config = Config::load()?;
//!
//! let mut registry = SessionRegistry::new(Arc::new(FileStore::at_default_path()));
//! registry.hydrate().await;
//!
//! let dispatcher = MessageDispatcher::new(BackendClient::new(&config.server)?);
//! registry.create_session()?;
//! dispatcher
//!     .send_turn(&mut registry, None, "Hello", &TurnOptions::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use backend::{BackendClient, ChatReply, SendMessageRequest};
pub use channel::{ChannelManager, ClientFrame, ServerFrame};
pub use config::Config;
pub use dispatch::{MessageDispatcher, TurnOptions, TURN_FAILED_TEXT};
pub use error::{Error, Result};
pub use store::{FileStore, HydrationGate, MemoryStore, NullStore, SessionRegistry, StateStore};
pub use types::*;

// Public modules
pub mod backend;
pub mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod store;
pub mod types;
