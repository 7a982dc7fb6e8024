//! Message-bus seam.
//!
//! The gateway knows nothing about the bus beyond [`Bridge::publish`] for
//! readings and a channel of [`InboundCommand`]s for actions. Publication goes
//! through a bounded queue drained by one task, so a slow broker never holds
//! up decoding.

use crate::error::BridgeError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[async_trait]
pub trait Bridge: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), BridgeError>;
}

/// One reading ready for the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub payload: String,
}

/// A message received on the subscribed action topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    pub topic: String,
    pub payload: String,
}

impl InboundCommand {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Actuator name from `home/action/<name>`; any other topic names none.
    pub fn actuator(&self) -> Option<&str> {
        let mut levels = self.topic.split('/');
        match (levels.next(), levels.next(), levels.next()) {
            (Some("home"), Some("action"), Some(name)) if !name.is_empty() => Some(name),
            _ => None,
        }
    }

    /// The command token, without surrounding whitespace.
    pub fn token(&self) -> &str {
        self.payload.trim()
    }
}

/// Counters returned by the publish task when it ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub published: u64,
    pub failed: u64,
}

/// Spawn the task draining `rx` into the bridge. It ends once every sender is
/// dropped and the queue is empty.
pub fn spawn_publisher<B>(
    bridge: Arc<B>,
    mut rx: mpsc::Receiver<Publication>,
) -> JoinHandle<PublishReport>
where
    B: Bridge + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut report = PublishReport::default();
        while let Some(p) = rx.recv().await {
            match bridge.publish(&p.topic, &p.payload).await {
                Ok(()) => {
                    debug!(topic = %p.topic, "published");
                    report.published += 1;
                }
                Err(e) => {
                    warn!(topic = %p.topic, error = %e, "publish failed");
                    report.failed += 1;
                }
            }
        }
        info!(
            published = report.published,
            failed = report.failed,
            "publisher stopped"
        );
        report
    })
}
