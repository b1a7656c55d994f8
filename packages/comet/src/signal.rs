//! Completion signals and the broadcast bus hosts publish them on.
//!
//! A settle signal says "the long-running work you started has finished".
//! Hosts that can tell which invocation finished tag the signal with the
//! invocation's [`CaptureToken`]; hosts that can't send an untagged signal,
//! which settles every capture armed before it.
//!
//! # Guarantees
//!
//! - **At-most-once delivery**: slow receivers may miss signals (`RecvError::Lagged`)
//! - **In-memory only**: signals are not persisted
//! - **No replay**: signals emitted before a subscription are not received

use tokio::sync::broadcast;

use crate::core::CaptureToken;

/// Default channel capacity for the signal bus.
const DEFAULT_CAPACITY: usize = 1024;

/// One-shot "settled" notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleSignal {
    /// The invocation that settled, when the host knows it.
    pub token: Option<CaptureToken>,
}

impl SettleSignal {
    /// Untagged signal: settles everything currently armed.
    pub fn settled() -> Self {
        Self { token: None }
    }

    /// Signal for one specific invocation.
    pub fn for_token(token: CaptureToken) -> Self {
        Self { token: Some(token) }
    }
}

/// Broadcast channel for settle signals.
///
/// Cloning is cheap; every clone publishes to the same subscribers.
#[derive(Clone)]
pub struct SignalBus {
    sender: broadcast::Sender<SettleSignal>,
}

impl SignalBus {
    /// Create a new signal bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new signal bus with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a signal (fire-and-forget).
    ///
    /// Returns the number of receivers that received it.
    pub fn emit(&self, signal: SettleSignal) -> usize {
        self.sender.send(signal).unwrap_or(0)
    }

    /// Subscribe to signals published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SettleSignal> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SignalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = SignalBus::new();
        let mut receiver = bus.subscribe();

        let token = CaptureToken::next();
        assert_eq!(bus.emit(SettleSignal::for_token(token)), 1);

        let signal = receiver.recv().await.unwrap();
        assert_eq!(signal.token, Some(token));
    }

    #[test]
    fn test_emit_without_subscribers_returns_zero() {
        let bus = SignalBus::new();
        assert_eq!(bus.emit(SettleSignal::settled()), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_signals() {
        let bus = SignalBus::new();
        let mut early = bus.subscribe();

        bus.emit(SettleSignal::settled());
        let mut late = bus.subscribe();

        assert!(early.recv().await.is_ok());
        assert!(late.try_recv().is_err());
    }
}
