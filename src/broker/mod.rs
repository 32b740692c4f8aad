//! Queue broker abstraction.
//!
//! A broker is a point-to-point work queue: messages enqueued under a named
//! queue persist in the backend until consumed. The abstraction consists of:
//!
//! - [`QueueBroker`]: the capability trait an agent programs against
//! - [`QueueTransport`] / [`QueueConnector`]: the store-client seam and the
//!   factory behind [`QueueBroker::new_connection`]
//! - [`RedisBroker`]: Redis lists (RPUSH / LLEN / LPOP)
//! - [`AmqpBroker`]: AMQP queues over lapin, same contract
//!
//! # Usage
//!
//! ```rust,ignore
//! use microbus::broker::{QueueBroker, RedisBroker};
//!
//! let broker = RedisBroker::new("redis://127.0.0.1:6379/7")?;
//! broker.send("jobs", "payload").await?;
//! assert_eq!(broker.queue_length("jobs").await?, 1);
//! ```

mod amqp;
mod redis;
mod traits;

pub use amqp::AmqpBroker;
pub use redis::RedisBroker;
pub use traits::{BackendKind, QueueBroker, QueueConnector, QueueTransport};
