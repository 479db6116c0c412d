//! The bridge daemon's state machine (spec §4.7 "State machine").
//!
//! Transitions are driven from [`crate::daemon::BridgeDaemon`]; this module
//! only holds the states and the small amount of bookkeeping
//! (`outstanding` request count) the `draining -> stopping` transition needs.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BridgeState {
    Initializing = 0,
    Ready = 1,
    RefreshingAuth = 2,
    Draining = 3,
    Stopping = 4,
    Expired = 5,
}

impl BridgeState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => BridgeState::Initializing,
            1 => BridgeState::Ready,
            2 => BridgeState::RefreshingAuth,
            3 => BridgeState::Draining,
            4 => BridgeState::Stopping,
            _ => BridgeState::Expired,
        }
    }
}

/// Shared, lock-free state cell plus an outstanding-request counter, so the
/// IPC acceptor (many concurrent tasks) and the daemon's own lifecycle code
/// can both read/update it without a mutex.
#[derive(Clone)]
pub struct StateCell(Arc<Inner>);

struct Inner {
    state: AtomicU8,
    outstanding: AtomicI64,
}

impl StateCell {
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            state: AtomicU8::new(BridgeState::Initializing as u8),
            outstanding: AtomicI64::new(0),
        }))
    }

    pub fn get(&self) -> BridgeState {
        BridgeState::from_u8(self.0.state.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: BridgeState) {
        self.0.state.store(state as u8, Ordering::SeqCst);
    }

    /// Records one MCP call starting; call [`Self::call_finished`] when it
    /// resolves. Used so `draining` can wait for `outstanding == 0`
    /// (spec §4.7 state table) before moving to `stopping`.
    pub fn call_started(&self) {
        self.0.outstanding.fetch_add(1, Ordering::SeqCst);
    }

    pub fn call_finished(&self) {
        self.0.outstanding.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn outstanding(&self) -> i64 {
        self.0.outstanding.load(Ordering::SeqCst)
    }

    pub fn is_accepting_calls(&self) -> bool {
        matches!(self.get(), BridgeState::Ready | BridgeState::RefreshingAuth)
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_initializing_and_transitions_are_visible_across_clones() {
        let cell = StateCell::new();
        let clone = cell.clone();
        assert_eq!(cell.get(), BridgeState::Initializing);

        clone.set(BridgeState::Ready);
        assert_eq!(cell.get(), BridgeState::Ready);
    }

    #[test]
    fn outstanding_count_tracks_started_and_finished_calls() {
        let cell = StateCell::new();
        cell.call_started();
        cell.call_started();
        assert_eq!(cell.outstanding(), 2);
        cell.call_finished();
        assert_eq!(cell.outstanding(), 1);
    }

    #[test]
    fn only_ready_and_refreshing_auth_accept_calls() {
        let cell = StateCell::new();
        assert!(!cell.is_accepting_calls());
        cell.set(BridgeState::Ready);
        assert!(cell.is_accepting_calls());
        cell.set(BridgeState::RefreshingAuth);
        assert!(cell.is_accepting_calls());
        cell.set(BridgeState::Draining);
        assert!(!cell.is_accepting_calls());
    }
}
