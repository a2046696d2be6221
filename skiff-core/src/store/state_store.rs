//! Durable storage for the persisted chat state
//!
//! The persisted unit is a single JSON record holding the serialized
//! [`ChatState`] (sessions and the current-session pointer). Writes are
//! fire-and-forget: the in-memory state stays authoritative for the current
//! process lifetime, so storage failures are logged and never propagated
//! to the mutation path.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::Config;
use crate::types::ChatState;

/// Persistence seam for the session registry.
///
/// `load` returns an empty state when there is nothing durable to read or
/// the record cannot be parsed; `save` must never surface an error to the
/// caller.
pub trait StateStore: Send + Sync {
    /// Load the persisted state, or an empty state when unavailable.
    fn load(&self) -> ChatState;

    /// Durably mirror the given state. Failures are logged, not returned.
    fn save(&self, state: &ChatState);
}

// ============================================
// File-backed store
// ============================================

/// JSON-file-backed store at a fixed path.
///
/// Saves write to a temp file in the same directory and rename into place,
/// so a crash mid-write leaves the previous record intact.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create a store at the default XDG location
    /// (`$XDG_DATA_HOME/skiff/state.json`).
    pub fn at_default_path() -> Self {
        Self::new(Config::state_path())
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStore {
    fn load(&self) -> ChatState {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No persisted state, starting empty");
                return ChatState::default();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read persisted state");
                return ChatState::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                // Unparseable record: hydrate empty; the next save overwrites it.
                tracing::warn!(path = %self.path.display(), error = %e, "Persisted state is unparseable, starting empty");
                ChatState::default()
            }
        }
    }

    fn save(&self, state: &ChatState) {
        if let Err(e) = self.try_save(state) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to persist state");
        }
    }
}

impl FileStore {
    fn try_save(&self, state: &ChatState) -> std::io::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let json = serde_json::to_string(state)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

// ============================================
// Null store
// ============================================

/// Store for contexts with no durable backing: empty load, no-op save.
#[derive(Debug, Default)]
pub struct NullStore;

impl StateStore for NullStore {
    fn load(&self) -> ChatState {
        ChatState::default()
    }

    fn save(&self, _state: &ChatState) {}
}

// ============================================
// In-memory store
// ============================================

/// In-memory store holding a serialized snapshot.
///
/// Useful in tests and as an ephemeral backing: round-trips through JSON
/// exactly like [`FileStore`] does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if something has been saved.
    pub fn has_snapshot(&self) -> bool {
        self.snapshot.lock().map(|s| s.is_some()).unwrap_or(false)
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> ChatState {
        let guard = match self.snapshot.lock() {
            Ok(guard) => guard,
            Err(_) => return ChatState::default(),
        };
        match guard.as_deref() {
            Some(json) => serde_json::from_str(json).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "In-memory snapshot is unparseable, starting empty");
                ChatState::default()
            }),
            None => ChatState::default(),
        }
    }

    fn save(&self, state: &ChatState) {
        match serde_json::to_string(state) {
            Ok(json) => {
                if let Ok(mut guard) = self.snapshot.lock() {
                    *guard = Some(json);
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize state snapshot"),
        }
    }
}
