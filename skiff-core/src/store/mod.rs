//! Session state storage layer
//!
//! This module provides:
//! - The [`StateStore`] persistence seam with file-backed, in-memory, and
//!   null implementations
//! - The one-shot [`HydrationGate`] barrier
//! - The [`SessionRegistry`] that owns all session mutations

pub mod hydration;
pub mod registry;
pub mod state_store;

pub use hydration::{GateState, HydrationGate};
pub use registry::SessionRegistry;
pub use state_store::{FileStore, MemoryStore, NullStore, StateStore};
