//! End-to-end queue broker demo.
//!
//! Resolves a broker from the `QUEUE_BROKER_URL` environment variable
//! (defaults to local Redis), pushes a few messages and reports the depth.
//!
//! ```sh
//! cargo run --example queue_demo
//! QUEUE_BROKER_URL=amqp://127.0.0.1:5672/%2f cargo run --example queue_demo
//! ```

use anyhow::{Context, Result};
use microbus::{queue_broker_from_url, QueueBroker};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let url = std::env::var("QUEUE_BROKER_URL")
        .unwrap_or_else(|_| "redis://127.0.0.1:6379/7".to_string());

    let broker = queue_broker_from_url(&url)?
        .context("QUEUE_BROKER_URL is empty, nothing to demo")?;

    for n in 1..=3 {
        let payload = format!("job-{n}");
        broker.send("demo_jobs", &payload).await?;
        println!("pushed {payload}");
    }

    let depth = broker.queue_length("demo_jobs").await?;
    println!("demo_jobs depth: {depth}");

    while let Some(message) = broker.pop("demo_jobs").await? {
        println!("popped {message}");
    }

    Ok(())
}
