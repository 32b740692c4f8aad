//! # microbus
//!
//! Pluggable signal bus and queue broker backends for microagent workers.
//!
//! Two capabilities are exposed to an agent through uniform traits, so the
//! agent stays oblivious to backend identity:
//!
//! - [`bus::SignalBus`]: broadcast named, ephemeral events to in-process
//!   listeners (Redis pub/sub)
//! - [`broker::QueueBroker`]: point-to-point work queues (Redis lists or AMQP)
//!
//! Backends are selected by the scheme of a connection-string setting and
//! constructed once at worker startup; an empty setting leaves the capability
//! absent. See [`config`] for resolution and [`worker`] for the bootstrap
//! contract.
//!
//! # Example
//!
//! ```rust,ignore
//! use microbus::{worker_start, WorkerSettings};
//!
//! let settings = WorkerSettings {
//!     signal_bus: "redis://127.0.0.1:6379/7".into(),
//!     queue_broker: "amqp://127.0.0.1:5672/%2f".into(),
//! };
//! let agent = worker_start(&settings, |bus, broker| MyAgent::new(bus, broker)).await?;
//! ```
//!
//! This layer performs no retries and no scheduling: transport failures
//! propagate to the caller, and delivery callbacks run on the backend
//! client's own reader task.

pub mod broker;
pub mod bus;
pub mod config;
pub mod error;
pub mod worker;

pub use broker::{AmqpBroker, BackendKind, QueueBroker, QueueConnector, QueueTransport, RedisBroker};
pub use bus::{BusStats, Listener, PubSubTransport, RedisSignalBus, SignalBus};
pub use config::{queue_broker_from_url, signal_bus_from_url};
pub use error::TransportError;
pub use worker::{worker_start, Agent, WorkerError, WorkerSettings};
