//! Redis pub/sub implementation of the signal bus.
//!
//! The publish side goes through a lazily-built bb8 connection pool. The
//! subscribe side is a background reader task that owns the dedicated pub/sub
//! connection: it applies pattern subscriptions, feeds every incoming message
//! into the bus's dispatch handle, and reconnects with exponential backoff,
//! re-issuing bound patterns after each reconnect.
//!
//! The dispatch handle is registered with the reader once, at construction.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::bb8::Pool;
use bb8_redis::RedisConnectionManager;
use futures::StreamExt;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::traits::{BusStats, Listener, PubSubTransport, SignalBus, SignalRegistry};
use crate::config::redacted;
use crate::error::TransportError;

const PUBLISH_POOL_SIZE: u32 = 8;
const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(400);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Signal bus backed by a Redis pub/sub connection.
pub struct RedisSignalBus {
    transport: Arc<dyn PubSubTransport>,
    registry: Arc<SignalRegistry>,
    bound: Arc<RwLock<HashSet<String>>>,
}

impl RedisSignalBus {
    /// Create a bus for the given Redis URL.
    ///
    /// Validates the URL and spawns the reader task, but opens no connection
    /// until the first operation. Must be called from within a Tokio runtime.
    pub fn new(redis_url: &str) -> Result<Self, TransportError> {
        let client = redis::Client::open(redis_url).map_err(|e| {
            TransportError::Configuration(format!(
                "invalid redis url: {} - {}",
                redacted(redis_url),
                e
            ))
        })?;
        let manager = RedisConnectionManager::new(redis_url).map_err(|e| {
            TransportError::Configuration(format!(
                "invalid redis url: {} - {}",
                redacted(redis_url),
                e
            ))
        })?;
        let pool = Pool::builder()
            .max_size(PUBLISH_POOL_SIZE)
            .build_unchecked(manager);

        let registry = Arc::new(SignalRegistry::new());
        let bound = Arc::new(RwLock::new(HashSet::new()));
        let (tx, rx) = mpsc::unbounded_channel();

        // The reader owns the pub/sub connection and holds the dispatch
        // handle for the lifetime of the bus.
        tokio::spawn(run_reader(client, registry.clone(), bound.clone(), rx));

        info!(url = %redacted(redis_url), "redis signal bus created");
        Ok(Self {
            transport: Arc::new(RedisPubSubTransport { pool, tx }),
            registry,
            bound,
        })
    }

    /// Create a bus over an already-built transport.
    ///
    /// Useful for alternative store clients; the caller is responsible for
    /// feeding incoming messages into [`SignalBus::receiver`].
    pub fn from_transport(transport: Arc<dyn PubSubTransport>) -> Self {
        Self {
            transport,
            registry: Arc::new(SignalRegistry::new()),
            bound: Arc::new(RwLock::new(HashSet::new())),
        }
    }
}

#[async_trait]
impl SignalBus for RedisSignalBus {
    async fn bind(&self, channel: &str) -> Result<(), TransportError> {
        let newly_bound = self
            .bound
            .write()
            .map(|mut guard| guard.insert(channel.to_string()))
            .unwrap_or(false);
        if !newly_bound {
            debug!(channel, "already bound, skipping psubscribe");
            return Ok(());
        }
        if let Err(e) = self.transport.psubscribe(channel).await {
            // Keep the channel unbound so a retry reaches the backend.
            if let Ok(mut guard) = self.bound.write() {
                guard.remove(channel);
            }
            return Err(e);
        }
        Ok(())
    }

    async fn send(&self, channel: &str, message: &str) -> Result<(), TransportError> {
        self.transport.publish(channel, message).await?;
        self.registry.count_sent();
        Ok(())
    }

    fn listen(&self, channel: &str, listener: Listener) {
        self.registry.add(channel, listener);
    }

    fn receiver(&self, channel: &str, message: &str) {
        self.registry.dispatch(channel, message);
    }

    fn stats(&self) -> BusStats {
        self.registry.stats()
    }
}

/// Store-client transport over Redis PUBLISH / PSUBSCRIBE.
///
/// Publishing round-trips through the pool; pattern subscriptions are handed
/// to the reader task, which applies them on its own connection.
struct RedisPubSubTransport {
    pool: Pool<RedisConnectionManager>,
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl PubSubTransport for RedisPubSubTransport {
    async fn publish(&self, channel: &str, message: &str) -> Result<(), TransportError> {
        let mut conn = self.pool.get().await?;
        let _: i64 = conn.publish(channel, message).await?;
        Ok(())
    }

    async fn psubscribe(&self, pattern: &str) -> Result<(), TransportError> {
        self.tx.send(pattern.to_string()).map_err(|_| {
            TransportError::Connection("pub/sub reader task is gone".to_string())
        })
    }
}

enum ReaderEvent {
    Bind(String),
    Message(String, String),
    Disconnected,
    Closed,
}

/// Reader loop: one pub/sub connection at a time, reconnect with backoff,
/// resubscribe bound patterns after reconnect, dispatch serially.
async fn run_reader(
    client: redis::Client,
    registry: Arc<SignalRegistry>,
    bound: Arc<RwLock<HashSet<String>>>,
    mut rx: mpsc::UnboundedReceiver<String>,
) {
    let mut delay = RECONNECT_BASE_DELAY;
    loop {
        let mut pubsub = match client.get_async_pubsub().await {
            Ok(pubsub) => pubsub,
            Err(e) => {
                warn!(error = %e, "pub/sub connect failed, retrying in {:?}", delay);
                sleep(delay).await;
                delay = (delay * 2).min(RECONNECT_MAX_DELAY);
                continue;
            }
        };
        delay = RECONNECT_BASE_DELAY;

        let patterns: Vec<String> = bound
            .read()
            .map(|guard| guard.iter().cloned().collect())
            .unwrap_or_default();
        let mut resubscribe_failed = false;
        for pattern in &patterns {
            if let Err(e) = pubsub.psubscribe(pattern).await {
                warn!(pattern = %pattern, error = %e, "resubscribe failed");
                resubscribe_failed = true;
                break;
            }
        }
        if resubscribe_failed {
            continue;
        }
        debug!(patterns = patterns.len(), "pub/sub reader connected");

        loop {
            let event = {
                let mut stream = pubsub.on_message();
                tokio::select! {
                    maybe_pattern = rx.recv() => match maybe_pattern {
                        Some(pattern) => ReaderEvent::Bind(pattern),
                        None => ReaderEvent::Closed,
                    },
                    maybe_msg = stream.next() => match maybe_msg {
                        Some(msg) => {
                            let channel = msg.get_channel_name().to_string();
                            match msg.get_payload::<String>() {
                                Ok(payload) => ReaderEvent::Message(channel, payload),
                                Err(e) => {
                                    warn!(channel = %channel, error = %e, "undecodable signal payload");
                                    continue;
                                }
                            }
                        }
                        None => ReaderEvent::Disconnected,
                    },
                }
            };

            match event {
                ReaderEvent::Bind(pattern) => {
                    if let Err(e) = pubsub.psubscribe(&pattern).await {
                        warn!(pattern = %pattern, error = %e, "psubscribe failed, reconnecting");
                        break;
                    }
                }
                ReaderEvent::Message(channel, payload) => {
                    registry.dispatch(&channel, &payload);
                }
                ReaderEvent::Disconnected => {
                    warn!("pub/sub connection lost, reconnecting");
                    break;
                }
                ReaderEvent::Closed => {
                    debug!("signal bus dropped, stopping reader");
                    return;
                }
            }
        }
    }
}
