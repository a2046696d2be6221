//! One-shot hydration barrier
//!
//! On a fresh start the persisted state loads asynchronously. Until that
//! load resolves, the registry must not be read for session resolution and
//! must not accept mutations; otherwise the first consumer could observe an
//! empty session set, create a spurious session, and race its writes against
//! the real data arriving a moment later. The gate makes the ordering
//! explicit: `Pending` until the load has been installed, then `Hydrated`,
//! permanently.

use tokio::sync::watch;

/// State of the hydration barrier. One-way: `Pending` then `Hydrated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Pending,
    Hydrated,
}

/// Observable one-shot barrier that flips once hydration completes.
#[derive(Debug)]
pub struct HydrationGate {
    tx: watch::Sender<GateState>,
}

impl HydrationGate {
    /// Create a gate in the `Pending` state.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(GateState::Pending);
        Self { tx }
    }

    /// Returns the current gate state.
    pub fn state(&self) -> GateState {
        *self.tx.borrow()
    }

    /// Returns true once hydration has completed.
    pub fn is_hydrated(&self) -> bool {
        self.state() == GateState::Hydrated
    }

    /// Mark hydration complete. Idempotent; there is no way back to `Pending`.
    pub fn mark_hydrated(&self) {
        self.tx.send_replace(GateState::Hydrated);
    }

    /// Subscribe to gate transitions.
    pub fn subscribe(&self) -> watch::Receiver<GateState> {
        self.tx.subscribe()
    }

    /// Wait until the gate reports `Hydrated`.
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        while *rx.borrow() != GateState::Hydrated {
            // Sender lives in the same struct, so changed() only errors if
            // the gate itself is gone.
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for HydrationGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_starts_pending() {
        let gate = HydrationGate::new();
        assert_eq!(gate.state(), GateState::Pending);
        assert!(!gate.is_hydrated());
    }

    #[test]
    fn test_gate_is_one_way_and_idempotent() {
        let gate = HydrationGate::new();
        gate.mark_hydrated();
        assert!(gate.is_hydrated());
        gate.mark_hydrated();
        assert!(gate.is_hydrated());
    }

    #[tokio::test]
    async fn test_wait_resolves_after_hydration() {
        let gate = std::sync::Arc::new(HydrationGate::new());

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait().await })
        };

        gate.mark_hydrated();
        waiter.await.unwrap();
        assert!(gate.is_hydrated());
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_hydrated() {
        let gate = HydrationGate::new();
        gate.mark_hydrated();
        gate.wait().await;
    }
}
