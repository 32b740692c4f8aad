//! Redis list implementation of the queue broker.
//!
//! One named queue maps to one Redis list: send is RPUSH, queue_length is
//! LLEN, pop is LPOP. LLEN on a key that does not exist reports 0, which is
//! exactly the missing-queue contract of [`QueueTransport::len`].

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bb8_redis::bb8::Pool;
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info};

use super::traits::{BackendKind, QueueBroker, QueueConnector, QueueTransport};
use crate::config::redacted;
use crate::error::TransportError;

const QUEUE_POOL_SIZE: u32 = 16;

/// Queue broker backed by Redis lists.
pub struct RedisBroker {
    connector: Arc<dyn QueueConnector>,
    transport: RwLock<Arc<dyn QueueTransport>>,
}

impl RedisBroker {
    /// Create a broker for the given Redis URL.
    ///
    /// Validates the URL but opens no connection until the first operation.
    pub fn new(redis_url: &str) -> Result<Self, TransportError> {
        let connector = Arc::new(RedisQueueConnector::new(redis_url)?);
        info!(url = %redacted(redis_url), "redis queue broker created");
        Self::from_connector(connector)
    }

    /// Create a broker over a custom connector.
    pub fn from_connector(connector: Arc<dyn QueueConnector>) -> Result<Self, TransportError> {
        let transport = connector.connect()?;
        Ok(Self {
            connector,
            transport: RwLock::new(transport),
        })
    }

    /// Clone the current transport handle out of the slot.
    fn transport(&self) -> Arc<dyn QueueTransport> {
        self.transport
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl QueueBroker for RedisBroker {
    async fn send(&self, queue: &str, message: &str) -> Result<(), TransportError> {
        self.transport().push(queue, message).await
    }

    async fn queue_length(&self, queue: &str) -> Result<u64, TransportError> {
        self.transport().len(queue).await
    }

    async fn pop(&self, queue: &str) -> Result<Option<String>, TransportError> {
        self.transport().pop(queue).await
    }

    async fn new_connection(&self) -> Result<(), TransportError> {
        let fresh = self.connector.connect()?;
        if let Ok(mut guard) = self.transport.write() {
            *guard = fresh;
        }
        debug!("redis broker switched to a fresh connection handle");
        Ok(())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }
}

/// Builds independent bb8 pools over one parsed Redis URL.
pub struct RedisQueueConnector {
    manager: RedisConnectionManager,
}

impl RedisQueueConnector {
    pub fn new(redis_url: &str) -> Result<Self, TransportError> {
        let manager = RedisConnectionManager::new(redis_url).map_err(|e| {
            TransportError::Configuration(format!(
                "invalid redis url: {} - {}",
                redacted(redis_url),
                e
            ))
        })?;
        Ok(Self { manager })
    }
}

impl QueueConnector for RedisQueueConnector {
    fn connect(&self) -> Result<Arc<dyn QueueTransport>, TransportError> {
        let pool = Pool::builder()
            .max_size(QUEUE_POOL_SIZE)
            .build_unchecked(self.manager.clone());
        Ok(Arc::new(RedisQueueTransport { pool }))
    }
}

/// Store-client transport over Redis RPUSH / LLEN / LPOP.
struct RedisQueueTransport {
    pool: Pool<RedisConnectionManager>,
}

#[async_trait]
impl QueueTransport for RedisQueueTransport {
    async fn push(&self, queue: &str, message: &str) -> Result<(), TransportError> {
        let mut conn = self.pool.get().await?;
        let _: i64 = conn.rpush(queue, message).await?;
        Ok(())
    }

    async fn len(&self, queue: &str) -> Result<u64, TransportError> {
        let mut conn = self.pool.get().await?;
        let len: u64 = conn.llen(queue).await?;
        Ok(len)
    }

    async fn pop(&self, queue: &str) -> Result<Option<String>, TransportError> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = conn.lpop(queue, None).await?;
        Ok(value)
    }
}
