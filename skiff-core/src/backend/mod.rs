//! Fallback request channel to the assistant backend
//!
//! One-shot HTTP calls used when the realtime channel is unavailable, plus
//! the health probe and remote session endpoints.

pub mod client;

pub use client::{BackendClient, ChatHistory, ChatReply, HistoryMessage, SendMessageRequest};
