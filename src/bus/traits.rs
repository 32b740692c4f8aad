//! Core traits for signal bus backends.
//!
//! The bus abstraction is split in two:
//!
//! - [`SignalBus`]: the capability surface handed to an agent (bind, send,
//!   listen, receiver)
//! - [`PubSubTransport`]: the store-client seam over the backend's publish and
//!   pattern-subscribe primitives
//!
//! Concrete buses own a transport and an in-process [`SignalRegistry`] of
//! listeners; the backend's delivery mechanism feeds [`SignalBus::receiver`],
//! which dispatches to the registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// In-process callback invoked with `(channel, message)` on delivery.
pub type Listener = Box<dyn Fn(&str, &str) + Send + Sync>;

/// Store-client seam for pub/sub backends.
///
/// Implementations forward to the backend's publish and pattern-subscribe
/// primitives. Each primitive is individually atomic; no ordering is guaranteed
/// across concurrent callers.
#[async_trait]
pub trait PubSubTransport: Send + Sync {
    /// Publish a message to a channel. Fire-and-forget: either the backend
    /// accepted the write or the call fails, never a partial delivery.
    async fn publish(&self, channel: &str, message: &str) -> Result<(), TransportError>;

    /// Subscribe to a channel pattern on the backend.
    async fn psubscribe(&self, pattern: &str) -> Result<(), TransportError>;
}

/// Broadcast channel for named, ephemeral events ("signals").
///
/// Signals are delivered at-most-once to each listener active at publish time.
/// Arrival order is preserved per channel; there is no cross-channel guarantee.
#[async_trait]
pub trait SignalBus: Send + Sync {
    /// Subscribe to a channel pattern on the backend. Idempotent per channel.
    async fn bind(&self, channel: &str) -> Result<(), TransportError>;

    /// Publish a message to a channel. Not retried by this layer; transport
    /// failures propagate to the caller.
    async fn send(&self, channel: &str, message: &str) -> Result<(), TransportError>;

    /// Register an in-process listener for a channel.
    fn listen(&self, channel: &str, listener: Listener);

    /// Entry point for the backend's delivery mechanism. Dispatches to every
    /// listener registered for `channel`, in registration order.
    fn receiver(&self, channel: &str, message: &str);

    /// Snapshot of delivery counters.
    fn stats(&self) -> BusStats;
}

/// Snapshot of bus activity, for monitoring.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BusStats {
    /// Signals published through this bus.
    pub signals_sent: u64,
    /// Signals delivered to in-process listeners.
    pub signals_received: u64,
    /// Channels with at least one registered listener.
    pub channels_listening: usize,
}

/// In-process listener table shared between a bus and its reader task.
///
/// Dispatch iterates listeners in registration order. The backend reader
/// delivers serially, so per-channel arrival order is preserved end to end.
pub(crate) struct SignalRegistry {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    sent: AtomicU64,
    received: AtomicU64,
}

impl SignalRegistry {
    pub(crate) fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
        }
    }

    pub(crate) fn add(&self, channel: &str, listener: Listener) {
        if let Ok(mut guard) = self.listeners.write() {
            guard.entry(channel.to_string()).or_default().push(listener);
        }
    }

    /// Deliver `(channel, message)` to every listener on that exact channel.
    pub(crate) fn dispatch(&self, channel: &str, message: &str) {
        self.received.fetch_add(1, Ordering::Relaxed);
        if let Ok(guard) = self.listeners.read() {
            if let Some(listeners) = guard.get(channel) {
                for listener in listeners {
                    listener(channel, message);
                }
            }
        }
    }

    pub(crate) fn count_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stats(&self) -> BusStats {
        let channels_listening = self
            .listeners
            .read()
            .map(|guard| guard.len())
            .unwrap_or(0);
        BusStats {
            signals_sent: self.sent.load(Ordering::Relaxed),
            signals_received: self.received.load(Ordering::Relaxed),
            channels_listening,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn dispatch_preserves_registration_order() {
        let registry = SignalRegistry::new();
        let order = Arc::new(RwLock::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            registry.add(
                "events",
                Box::new(move |_, _| order.write().unwrap().push(tag)),
            );
        }

        registry.dispatch("events", "hello");
        assert_eq!(*order.read().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn stats_snapshot_serializes_for_monitoring() {
        let registry = SignalRegistry::new();
        registry.add("events", Box::new(|_, _| {}));
        registry.count_sent();
        registry.dispatch("events", "msg");

        let json = serde_json::to_value(registry.stats()).unwrap();
        assert_eq!(json["signals_sent"], 1);
        assert_eq!(json["signals_received"], 1);
        assert_eq!(json["channels_listening"], 1);
    }

    #[test]
    fn dispatch_is_exact_channel_match() {
        let registry = SignalRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        registry.add(
            "alpha",
            Box::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        registry.dispatch("beta", "msg");
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        registry.dispatch("alpha", "msg");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
