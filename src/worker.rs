//! Worker bootstrap glue.
//!
//! On worker start the host framework reads the two capability settings
//! independently, resolves each through [`crate::config`], hands the resolved
//! instances to the agent, runs the agent's initialization check and finally
//! its start hook. Either capability may be absent; the agent checks before
//! use.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::broker::QueueBroker;
use crate::bus::SignalBus;
use crate::config::{queue_broker_from_url, signal_bus_from_url};
use crate::error::TransportError;

/// Errors surfaced by the worker bootstrap.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The agent's initialization check failed.
    #[error("agent is not initialized")]
    NotInitialized,

    /// Resolving or talking to a backend failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Agent-level failure during the start hook.
    #[error("agent error: {0}")]
    Agent(String),
}

/// The two capability settings of a worker, read independently.
///
/// Each is a connection-string URL; the empty string disables the capability.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub signal_bus: String,
    pub queue_broker: String,
}

impl Default for WorkerSettings {
    /// Local Redis bus, no broker.
    fn default() -> Self {
        Self {
            signal_bus: "redis://127.0.0.1:6379".to_string(),
            queue_broker: String::new(),
        }
    }
}

/// The hooks a microagent exposes to the worker bootstrap.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Initialization check, run after construction and before the start hook.
    fn check_init(&self) -> Result<(), WorkerError>;

    /// Start hook, run once the bus and broker are attached.
    async fn start(&self) -> Result<(), WorkerError>;
}

/// Resolve the configured backends, construct the agent with them, run its
/// initialization check and its start hook, and return the started agent.
pub async fn worker_start<A, F>(settings: &WorkerSettings, make_agent: F) -> Result<A, WorkerError>
where
    A: Agent,
    F: FnOnce(Option<Arc<dyn SignalBus>>, Option<Arc<dyn QueueBroker>>) -> A,
{
    let bus = signal_bus_from_url(&settings.signal_bus)?;
    let broker = queue_broker_from_url(&settings.queue_broker)?;
    info!(
        bus = bus.is_some(),
        broker = broker.is_some(),
        "starting worker agent"
    );

    let agent = make_agent(bus, broker);
    agent.check_init()?;
    agent.start().await?;
    Ok(agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BackendKind;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MockAgent {
        bus: Option<Arc<dyn SignalBus>>,
        broker: Option<Arc<dyn QueueBroker>>,
        fail_init: bool,
        checked: Arc<AtomicBool>,
        started: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Agent for MockAgent {
        fn check_init(&self) -> Result<(), WorkerError> {
            self.checked.store(true, Ordering::SeqCst);
            if self.fail_init {
                return Err(WorkerError::NotInitialized);
            }
            Ok(())
        }

        async fn start(&self) -> Result<(), WorkerError> {
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn make_mock(
        fail_init: bool,
        checked: Arc<AtomicBool>,
        started: Arc<AtomicBool>,
    ) -> impl FnOnce(Option<Arc<dyn SignalBus>>, Option<Arc<dyn QueueBroker>>) -> MockAgent {
        move |bus, broker| MockAgent {
            bus,
            broker,
            fail_init,
            checked,
            started,
        }
    }

    #[tokio::test]
    async fn default_settings_attach_a_bus_and_no_broker() {
        let checked = Arc::new(AtomicBool::new(false));
        let started = Arc::new(AtomicBool::new(false));
        let settings = WorkerSettings::default();

        let agent = worker_start(&settings, make_mock(false, checked.clone(), started.clone()))
            .await
            .unwrap();

        assert!(agent.bus.is_some());
        assert!(agent.broker.is_none());
        assert!(checked.load(Ordering::SeqCst));
        assert!(started.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn empty_settings_attach_neither_capability() {
        let checked = Arc::new(AtomicBool::new(false));
        let started = Arc::new(AtomicBool::new(false));
        let settings = WorkerSettings {
            signal_bus: String::new(),
            queue_broker: String::new(),
        };

        let agent = worker_start(&settings, make_mock(false, checked.clone(), started.clone()))
            .await
            .unwrap();

        assert!(agent.bus.is_none());
        assert!(agent.broker.is_none());
        assert!(started.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn redis_broker_setting_attaches_a_redis_broker() {
        let settings = WorkerSettings {
            signal_bus: String::new(),
            queue_broker: "redis://127.0.0.1:6379/7".to_string(),
        };

        let agent = worker_start(
            &settings,
            make_mock(
                false,
                Arc::new(AtomicBool::new(false)),
                Arc::new(AtomicBool::new(false)),
            ),
        )
        .await
        .unwrap();

        assert_eq!(agent.broker.unwrap().kind(), BackendKind::Redis);
    }

    #[tokio::test]
    async fn amqp_broker_setting_attaches_an_amqp_broker() {
        let settings = WorkerSettings {
            signal_bus: String::new(),
            queue_broker: "amqp://fake".to_string(),
        };

        let agent = worker_start(
            &settings,
            make_mock(
                false,
                Arc::new(AtomicBool::new(false)),
                Arc::new(AtomicBool::new(false)),
            ),
        )
        .await
        .unwrap();

        assert_eq!(agent.broker.unwrap().kind(), BackendKind::Amqp);
    }

    #[tokio::test]
    async fn failed_init_check_skips_the_start_hook() {
        let checked = Arc::new(AtomicBool::new(false));
        let started = Arc::new(AtomicBool::new(false));
        let settings = WorkerSettings {
            signal_bus: String::new(),
            queue_broker: String::new(),
        };

        let err = worker_start(&settings, make_mock(true, checked.clone(), started.clone()))
            .await
            .err().unwrap();

        assert!(matches!(err, WorkerError::NotInitialized));
        assert!(checked.load(Ordering::SeqCst));
        assert!(!started.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn bad_setting_fails_before_the_agent_is_built() {
        let checked = Arc::new(AtomicBool::new(false));
        let settings = WorkerSettings {
            signal_bus: String::new(),
            queue_broker: "kafka://broker:9092".to_string(),
        };

        let err = worker_start(
            &settings,
            make_mock(false, checked.clone(), Arc::new(AtomicBool::new(false))),
        )
        .await
        .err().unwrap();

        assert!(matches!(
            err,
            WorkerError::Transport(TransportError::Configuration(_))
        ));
        assert!(!checked.load(Ordering::SeqCst));
    }
}
