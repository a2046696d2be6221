//! Realtime channel layer
//!
//! Wire frames for the WebSocket protocol and the [`ChannelManager`] that
//! owns one channel instance's lifecycle.

pub mod frames;
pub mod manager;

pub use frames::{parse_frame, ClientFrame, ServerFrame};
pub use manager::ChannelManager;
