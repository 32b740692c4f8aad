//! AMQP 0.9.1 implementation of the queue broker.
//!
//! Same contract as the Redis broker over a lapin connection: send publishes
//! to the default exchange with the queue name as routing key (the queue is
//! declared durable on first use), queue_length reads `message_count` from a
//! passive declare, pop is a `basic_get` with auto-ack.
//!
//! The connection is established lazily on the first operation; resolving an
//! `amqp://` URL never opens a socket. A passive declare of a queue that does
//! not exist closes the channel with a 404, which this backend reports as
//! length 0; channels are created per operation so the connection survives.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use lapin::options::{BasicGetOptions, BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::traits::{BackendKind, QueueBroker, QueueConnector, QueueTransport};
use crate::config::redacted;
use crate::error::TransportError;

/// Queue broker backed by an AMQP queue.
pub struct AmqpBroker {
    connector: Arc<dyn QueueConnector>,
    transport: RwLock<Arc<dyn QueueTransport>>,
}

impl AmqpBroker {
    /// Create a broker for the given AMQP URL.
    ///
    /// The connection is opened on the first operation, not here.
    pub fn new(amqp_url: &str) -> Result<Self, TransportError> {
        let connector = Arc::new(AmqpQueueConnector {
            uri: amqp_url.to_string(),
        });
        info!(url = %redacted(amqp_url), "amqp queue broker created");
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

    fn transport(&self) -> Arc<dyn QueueTransport> {
        self.transport
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl QueueBroker for AmqpBroker {
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
        debug!("amqp broker switched to a fresh connection handle");
        Ok(())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Amqp
    }
}

/// Builds independent lazy connections over one AMQP URI.
pub struct AmqpQueueConnector {
    uri: String,
}

impl QueueConnector for AmqpQueueConnector {
    fn connect(&self) -> Result<Arc<dyn QueueTransport>, TransportError> {
        Ok(Arc::new(AmqpQueueTransport {
            uri: self.uri.clone(),
            connection: OnceCell::new(),
            declared: Mutex::new(HashSet::new()),
        }))
    }
}

/// Store-client transport over an AMQP channel.
struct AmqpQueueTransport {
    uri: String,
    connection: OnceCell<Connection>,
    declared: Mutex<HashSet<String>>,
}

impl AmqpQueueTransport {
    async fn channel(&self) -> Result<Channel, TransportError> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                Connection::connect(&self.uri, ConnectionProperties::default()).await
            })
            .await?;
        Ok(connection.create_channel().await?)
    }

    async fn ensure_declared(&self, channel: &Channel, queue: &str) -> Result<(), TransportError> {
        let already = self
            .declared
            .lock()
            .map(|guard| guard.contains(queue))
            .unwrap_or(false);
        if already {
            return Ok(());
        }
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        if let Ok(mut guard) = self.declared.lock() {
            guard.insert(queue.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl QueueTransport for AmqpQueueTransport {
    async fn push(&self, queue: &str, message: &str) -> Result<(), TransportError> {
        let channel = self.channel().await?;
        self.ensure_declared(&channel, queue).await?;
        channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                message.as_bytes(),
                BasicProperties::default(),
            )
            .await?
            .await?;
        Ok(())
    }

    async fn len(&self, queue: &str) -> Result<u64, TransportError> {
        let channel = self.channel().await?;
        let declared = channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    passive: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await;
        match declared {
            Ok(reply) => Ok(u64::from(reply.message_count())),
            Err(err) if queue_missing(&err) => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    async fn pop(&self, queue: &str) -> Result<Option<String>, TransportError> {
        let channel = self.channel().await?;
        let delivery = channel
            .basic_get(queue, BasicGetOptions { no_ack: true })
            .await?;
        match delivery {
            Some(message) => {
                let payload = String::from_utf8(message.delivery.data).map_err(|e| {
                    TransportError::Protocol(format!("non-utf8 message payload: {}", e))
                })?;
                Ok(Some(payload))
            }
            None => Ok(None),
        }
    }
}

/// A passive declare of an unknown queue comes back as a 404 channel close.
fn queue_missing(err: &lapin::Error) -> bool {
    matches!(err, lapin::Error::ProtocolError(e) if e.get_id() == 404)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingTransport {
        pushed: Mutex<Vec<(String, String)>>,
        length: u64,
    }

    #[async_trait]
    impl QueueTransport for RecordingTransport {
        async fn push(&self, queue: &str, message: &str) -> Result<(), TransportError> {
            self.pushed
                .lock()
                .unwrap()
                .push((queue.to_string(), message.to_string()));
            Ok(())
        }

        async fn len(&self, _queue: &str) -> Result<u64, TransportError> {
            Ok(self.length)
        }

        async fn pop(&self, queue: &str) -> Result<Option<String>, TransportError> {
            let mut pushed = self.pushed.lock().unwrap();
            let pos = pushed.iter().position(|(q, _)| q == queue);
            Ok(pos.map(|i| pushed.remove(i).1))
        }
    }

    struct FixedConnector(Arc<RecordingTransport>);

    impl QueueConnector for FixedConnector {
        fn connect(&self) -> Result<Arc<dyn QueueTransport>, TransportError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn construction_is_lazy() {
        // No AMQP server behind this URL; construction must still succeed.
        let broker = AmqpBroker::new("amqp://fake").unwrap();
        assert_eq!(broker.kind(), BackendKind::Amqp);
    }

    #[tokio::test]
    async fn satisfies_the_broker_contract() {
        let transport = Arc::new(RecordingTransport {
            length: 3,
            ..Default::default()
        });
        let broker = AmqpBroker::from_connector(Arc::new(FixedConnector(transport.clone()))).unwrap();

        broker.send("jobs", "payload").await.unwrap();
        assert_eq!(broker.queue_length("jobs").await.unwrap(), 3);
        assert_eq!(broker.pop("jobs").await.unwrap().as_deref(), Some("payload"));

        let pushed = transport.pushed.lock().unwrap();
        assert!(pushed.is_empty());
    }

    #[test]
    fn only_a_404_close_reads_as_a_missing_queue() {
        let not_found = lapin::protocol::AMQPError::from_id(
            404,
            "NOT_FOUND - no queue 'jobs' in vhost '/'".into(),
        )
        .map(lapin::Error::ProtocolError)
        .unwrap();
        assert!(queue_missing(&not_found));

        let access_refused = lapin::protocol::AMQPError::from_id(
            403,
            "ACCESS_REFUSED - access to queue 'jobs' refused".into(),
        )
        .map(lapin::Error::ProtocolError)
        .unwrap();
        assert!(!queue_missing(&access_refused));
        assert!(!queue_missing(&lapin::Error::ChannelsLimitReached));
    }
}
