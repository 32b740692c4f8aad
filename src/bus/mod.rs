//! Signal bus abstraction.
//!
//! A signal bus broadcasts named, ephemeral events ("signals") to zero or more
//! listeners. The abstraction consists of:
//!
//! - [`SignalBus`]: the capability trait an agent programs against
//! - [`PubSubTransport`]: the store-client seam (publish, pattern-subscribe)
//! - [`RedisSignalBus`]: the Redis pub/sub implementation
//!
//! # Usage
//!
//! ```rust,ignore
//! use microbus::bus::{RedisSignalBus, SignalBus};
//!
//! let bus = RedisSignalBus::new("redis://127.0.0.1:6379/7")?;
//! bus.listen("user_created", Box::new(|channel, message| {
//!     println!("{channel}: {message}");
//! }));
//! bus.bind("user_created").await?;
//! bus.send("user_created", "42").await?;
//! ```

mod redis;
mod traits;

pub use redis::RedisSignalBus;
pub use traits::{BusStats, Listener, PubSubTransport, SignalBus};
