//! One request's path through the bridge: resolve the project, pick its
//! primary agent, build the thread, arm the aggregator, then publish.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{info, instrument, Instrument};

use threadgate_core::chat::ChunkHeader;
use threadgate_core::config::BridgeConfig;
use threadgate_core::thread::ThreadId;
use threadgate_core::BridgeError;
use threadgate_relay::MessageTransport;

use crate::aggregator::{AggregatorSettings, HandoffItem, ResponseAggregator};
use crate::publisher::PromptPublisher;
use crate::registry::ProjectRegistry;
use crate::resolver::ProjectResolver;
use crate::{selector, session};

/// A running exchange. Dropping `rx` cancels it.
#[derive(Debug)]
pub struct Exchange {
    pub header: ChunkHeader,
    pub thread_id: ThreadId,
    pub rx: mpsc::Receiver<HandoffItem>,
}

#[derive(Clone)]
pub struct Bridge {
    resolver: ProjectResolver,
    publisher: PromptPublisher,
    transport: Arc<dyn MessageTransport>,
    settings: AggregatorSettings,
    staleness_threshold: Duration,
    handoff_capacity: usize,
}

impl Bridge {
    pub fn new(
        registry: Arc<ProjectRegistry>,
        transport: Arc<dyn MessageTransport>,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            resolver: ProjectResolver::new(registry, config.status_wait()),
            publisher: PromptPublisher::new(transport.clone(), config.publish_timeout()),
            transport,
            settings: AggregatorSettings::from(config),
            staleness_threshold: config.staleness_threshold(),
            handoff_capacity: config.handoff_capacity.max(1),
        }
    }

    /// Start an exchange for `content` with the primary agent of `project`.
    ///
    /// Errors returned here happen before any response bytes exist. Once this
    /// returns, every outcome arrives through the exchange's channel.
    #[instrument(skip_all, fields(project = %project))]
    pub async fn open(&self, project: &str, model: &str, content: &str) -> Result<Exchange, BridgeError> {
        let status = self.resolver.resolve(project).await?;
        let agent = selector::select(&status, Utc::now(), self.staleness_threshold)?;
        let (thread, prompt) = session::build(content, project, &agent)?;

        let header = ChunkHeader {
            id: thread.id.completion_id(),
            created: thread.created_at.timestamp(),
            model: model.to_string(),
        };
        let thread_id = thread.id;

        let aggregator =
            ResponseAggregator::arm(&*self.transport, thread, header.clone(), self.settings).await?;

        let (tx, rx) = mpsc::channel(self.handoff_capacity);
        let publisher = self.publisher.clone();
        tokio::spawn(
            aggregator
                .run(async move { publisher.publish(prompt).await }, tx)
                .in_current_span(),
        );

        info!(thread_id = %thread_id, agent = %agent.identity, "exchange opened");
        Ok(Exchange { header, thread_id, rx })
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("resolver", &self.resolver)
            .field("settings", &self.settings)
            .field("staleness_threshold", &self.staleness_threshold)
            .field("handoff_capacity", &self.handoff_capacity)
            .finish_non_exhaustive()
    }
}
