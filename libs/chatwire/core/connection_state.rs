//! Connection state machine primitives
//!
//! The connection manager owns exactly one [`AtomicConnectionState`] per
//! instance. All state changes go through the legal-transition table below;
//! anything else is refused and logged.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Lifecycle state of the realtime connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No socket, no pending reconnect. Initial state.
    Disconnected,
    /// A transport open is in flight.
    Connecting,
    /// The socket is open and frames can be sent.
    Connected,
    /// A reconnect timer is pending.
    Reconnecting,
    /// Open failure or reconnect exhaustion. Terminal until `connect()` is
    /// called again.
    Error,
}

impl ConnectionState {
    /// Whether `from -> to` is a legal edge of the state machine.
    ///
    /// The edge set:
    /// - `Disconnected -> Connecting` (connect)
    /// - `Error -> Connecting` (connect after terminal failure)
    /// - `Connecting -> Connected` (transport opened)
    /// - `Connecting -> Error` (open failure)
    /// - `Error -> Reconnecting` (reconnect scheduled)
    /// - `Connected -> Reconnecting` (abnormal close)
    /// - `Reconnecting -> Connecting` (timer fired)
    /// - `Reconnecting -> Error` (attempts exhausted)
    /// - `any -> Disconnected` (explicit disconnect, or normal close)
    ///
    /// Self-loops are not transitions and are always refused.
    pub fn is_valid_transition(from: ConnectionState, to: ConnectionState) -> bool {
        use ConnectionState::*;

        if from == to {
            return false;
        }

        matches!(
            (from, to),
            (_, Disconnected)
                | (Disconnected, Connecting)
                | (Error, Connecting)
                | (Connecting, Connected)
                | (Connecting, Error)
                | (Error, Reconnecting)
                | (Connected, Reconnecting)
                | (Reconnecting, Connecting)
                | (Reconnecting, Error)
        )
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Reconnecting => 3,
            ConnectionState::Error => 4,
        }
    }

    fn from_u8(value: u8) -> ConnectionState {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            4 => ConnectionState::Error,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Lock-free connection state cell
pub struct AtomicConnectionState {
    state: AtomicU8,
}

impl AtomicConnectionState {
    pub fn new(initial: ConnectionState) -> Self {
        Self {
            state: AtomicU8::new(initial.as_u8()),
        }
    }

    #[inline]
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Swap `from` for `to` atomically. Fails if another writer got there
    /// first, which keeps concurrent transitions from clobbering each other.
    #[inline]
    pub fn compare_exchange(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state
            .compare_exchange(
                from.as_u8(),
                to.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.get() == ConnectionState::Connected
    }

    #[inline]
    pub fn is_disconnected(&self) -> bool {
        self.get() == ConnectionState::Disconnected
    }
}

/// Atomic frame/reconnect counters
#[derive(Default)]
pub struct AtomicMetrics {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    reconnect_count: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_reconnects(&self) {
        self.reconnect_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn reconnect_count(&self) -> u64 {
        self.reconnect_count.load(Ordering::Relaxed)
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone)]
pub struct Metrics {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub reconnect_count: u64,
    pub connection_state: ConnectionState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    const ALL: [ConnectionState; 5] = [Disconnected, Connecting, Connected, Reconnecting, Error];

    #[test]
    fn transition_table_matches_the_documented_edge_set() {
        let legal: &[(ConnectionState, ConnectionState)] = &[
            (Disconnected, Connecting),
            (Error, Connecting),
            (Connecting, Connected),
            (Connecting, Error),
            (Connecting, Disconnected),
            (Error, Reconnecting),
            (Error, Disconnected),
            (Connected, Reconnecting),
            (Connected, Disconnected),
            (Reconnecting, Connecting),
            (Reconnecting, Error),
            (Reconnecting, Disconnected),
        ];

        for from in ALL {
            for to in ALL {
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    ConnectionState::is_valid_transition(from, to),
                    expected,
                    "transition {from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn self_loops_are_refused() {
        for state in ALL {
            assert!(!ConnectionState::is_valid_transition(state, state));
        }
    }

    #[test]
    fn atomic_state_roundtrips_every_variant() {
        let cell = AtomicConnectionState::new(Disconnected);
        for state in ALL {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }

    #[test]
    fn compare_exchange_only_succeeds_from_expected() {
        let cell = AtomicConnectionState::new(Connecting);
        assert!(!cell.compare_exchange(Reconnecting, Connected));
        assert_eq!(cell.get(), Connecting);
        assert!(cell.compare_exchange(Connecting, Connected));
        assert!(cell.is_connected());
    }

    #[test]
    fn metrics_counters_accumulate() {
        let metrics = AtomicMetrics::new();
        metrics.increment_sent();
        metrics.increment_sent();
        metrics.increment_received();
        metrics.increment_reconnects();

        assert_eq!(metrics.frames_sent(), 2);
        assert_eq!(metrics.frames_received(), 1);
        assert_eq!(metrics.reconnect_count(), 1);
    }
}
