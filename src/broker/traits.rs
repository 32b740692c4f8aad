//! Core traits for queue broker backends.
//!
//! The broker abstraction mirrors the bus:
//!
//! - [`QueueBroker`]: the capability surface handed to an agent (send,
//!   queue_length, pop, new_connection)
//! - [`QueueTransport`]: the store-client seam over the backend's list
//!   primitives (push to tail, length, pop from head)
//! - [`QueueConnector`]: factory producing fresh transport handles, used at
//!   construction and by [`QueueBroker::new_connection`]
//!
//! A broker holds exactly one live transport handle at a time. Replacing the
//! handle does not invalidate operations already dispatched on the old one;
//! they keep their own reference until they complete.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportError;

/// Which backend family a broker instance talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Redis,
    Amqp,
}

/// Store-client seam for queue backends.
///
/// One named queue maps to one backend structure (a Redis list, an AMQP queue).
/// Each primitive is individually atomic.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Append a message to the tail of the named queue.
    async fn push(&self, queue: &str, message: &str) -> Result<(), TransportError>;

    /// Current depth of the named queue. A queue that does not exist yet
    /// reports 0.
    async fn len(&self, queue: &str) -> Result<u64, TransportError>;

    /// Remove and return the message at the head of the named queue, or
    /// `None` when the queue is empty.
    async fn pop(&self, queue: &str) -> Result<Option<String>, TransportError>;
}

/// Factory for transport handles.
///
/// Construction is lazy: building a handle never opens a socket, the first
/// operation on it does. That keeps resolution cheap and makes a fresh
/// post-fork handle independent of its parent's.
pub trait QueueConnector: Send + Sync {
    fn connect(&self) -> Result<Arc<dyn QueueTransport>, TransportError>;
}

/// Point-to-point work queue: messages persist in the backend until consumed.
#[async_trait]
pub trait QueueBroker: Send + Sync {
    /// Append a message to the tail of the named queue.
    async fn send(&self, queue: &str, message: &str) -> Result<(), TransportError>;

    /// Current depth of the named queue, as reported by the backend.
    async fn queue_length(&self, queue: &str) -> Result<u64, TransportError>;

    /// Remove and return the head message, or `None` when the queue is empty.
    async fn pop(&self, queue: &str) -> Result<Option<String>, TransportError>;

    /// Establish a fresh backend handle, independent of the current one.
    ///
    /// Used when a worker process forks and must not share a connection with
    /// its parent. Must not be called concurrently with in-flight operations
    /// on the same instance; operations already dispatched stay valid.
    async fn new_connection(&self) -> Result<(), TransportError>;

    /// Which backend family this broker talks to.
    fn kind(&self) -> BackendKind;
}
