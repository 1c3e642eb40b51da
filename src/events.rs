//! Engine event stream
//!
//! Single outbound channel consumed by the external dashboard layer. Every
//! event is also written as a log line; the engine has no knowledge of
//! subscribers and never blocks on them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use crate::token_info::TokenDescriptor;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NewTokenDetected,
    BuyAttempt,
    BuySuccess,
    BuyFailed,
    SellAttempt,
    SellSuccess,
    SellFailed,
    PriceUpdate,
    WalletConnected,
    WalletDisconnected,
}

/// One outbound engine event
#[derive(Debug, Clone, Serialize)]
pub struct EngineEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub mint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Why a sell fired: "take-profit 1", "stop-loss", "timeout", ...
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    pub timestamp: DateTime<Utc>,
}

impl EngineEvent {
    pub fn new(kind: EventKind, mint: impl Into<String>) -> Self {
        Self {
            kind,
            mint: mint.into(),
            token: None,
            amount: None,
            tx_ref: None,
            user_id: None,
            reason: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_token(mut self, token: TokenDescriptor) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_tx_ref(mut self, tx_ref: impl Into<String>) -> Self {
        self.tx_ref = Some(tx_ref.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_reason(mut self, reason: &'static str) -> Self {
        self.reason = Some(reason);
        self
    }
}

/// Fire-and-forget event sink
#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event: one log line plus a broadcast. Lagging or absent
    /// subscribers are ignored.
    pub fn emit(&self, event: EngineEvent) {
        info!(
            kind = ?event.kind,
            mint = %event.mint,
            amount = ?event.amount,
            tx_ref = ?event.tx_ref,
            user = ?event.user_id,
            "engine event"
        );
        let _ = self.tx.send(event);
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let sink = EventSink::new(16);
        let mut rx = sink.subscribe();

        sink.emit(
            EngineEvent::new(EventKind::BuySuccess, "mint1")
                .with_amount(0.1)
                .with_tx_ref("sig1")
                .with_user("u1"),
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::BuySuccess);
        assert_eq!(event.mint, "mint1");
        assert_eq!(event.amount, Some(0.1));
        assert_eq!(event.tx_ref.as_deref(), Some("sig1"));
        assert_eq!(event.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let sink = EventSink::new(16);
        sink.emit(EngineEvent::new(EventKind::NewTokenDetected, "mint1"));
        assert_eq!(sink.subscriber_count(), 0);
    }
}
