//! Turns the fragments an agent publishes on `relay.thread.<id>` into an
//! ordered sequence of chat-completion chunks.
//!
//! One aggregator serves one request. It subscribes before the prompt is
//! published, sends the role chunk straight away, then forwards accepted
//! fragments into a bounded handoff channel that the HTTP writer drains.
//! Every outcome other than a clean finish puts exactly one
//! [`HandoffItem::Failed`] into the channel before it closes.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use threadgate_core::chat::{ChatCompletionChunk, ChunkHeader};
use threadgate_core::config::BridgeConfig;
use threadgate_core::thread::{ConversationThread, FragmentKind, InboundFragment, ThreadId};
use threadgate_core::{BridgeError, TimeoutPhase};
use threadgate_relay::events::{AgentFragment, FINISH, REASONING_DELTA, TEXT_DELTA};
use threadgate_relay::{topics, Message, MessageTransport, Subscription};

/// What the aggregator hands to the response writer.
#[derive(Debug, Clone, PartialEq)]
pub enum HandoffItem {
    Chunk(ChatCompletionChunk),
    Failed(BridgeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorSettings {
    pub armed_timeout: Duration,
    pub inter_fragment_timeout: Duration,
    pub malformed_limit: u32,
    pub reorder_window: usize,
}

impl From<&BridgeConfig> for AggregatorSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            armed_timeout: config.armed_timeout(),
            inter_fragment_timeout: config.inter_fragment_timeout(),
            malformed_limit: config.malformed_fragment_limit,
            reorder_window: config.reorder_window,
        }
    }
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    /// Subscribed, waiting for the first fragment.
    Armed,
    /// At least one fragment accepted.
    Streaming,
    Completed,
    TimedOut,
    /// Client went away or the agent sent too much garbage.
    Aborted,
    /// Publishing the prompt or the subscription failed.
    UpstreamError,
}

impl AggregatorState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Armed | Self::Streaming)
    }
}

// ── Reorder buffer ────────────────────────────────────────────

/// Releases sequenced fragments in order.
///
/// The cursor starts at the first sequence number seen. Fragments below the
/// cursor are released as they arrive; a buffer holding `window` fragments is
/// flushed in sequence order and the cursor jumps past the highest one.
#[derive(Debug)]
struct ReorderBuffer {
    next: Option<u64>,
    pending: BTreeMap<u64, InboundFragment>,
    window: usize,
}

impl ReorderBuffer {
    fn new(window: usize) -> Self {
        Self {
            next: None,
            pending: BTreeMap::new(),
            window: window.max(1),
        }
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn push(&mut self, seq: u64, fragment: InboundFragment) -> Vec<InboundFragment> {
        let next = *self.next.get_or_insert(seq);
        if seq < next {
            return vec![fragment];
        }
        self.pending.entry(seq).or_insert(fragment);

        let mut ready = Vec::new();
        while let Some(cursor) = self.next {
            match self.pending.remove(&cursor) {
                Some(f) => {
                    ready.push(f);
                    self.next = Some(cursor.saturating_add(1));
                }
                None => break,
            }
        }

        if self.pending.len() >= self.window {
            ready.extend(self.flush());
        }
        ready
    }

    /// Drain everything buffered, skipping over any gaps.
    fn flush(&mut self) -> Vec<InboundFragment> {
        let drained = std::mem::take(&mut self.pending);
        if let Some(&last) = drained.keys().next_back() {
            self.next = Some(last.saturating_add(1));
        }
        drained.into_values().collect()
    }
}

// ── Aggregator ────────────────────────────────────────────────

enum Event {
    Disconnected,
    Published(Result<(), BridgeError>),
    Inbound(Option<Message>),
    Deadline,
}

pub struct ResponseAggregator {
    thread: ConversationThread,
    header: ChunkHeader,
    settings: AggregatorSettings,
    subscription: Subscription,
    state: AggregatorState,
    seen: HashSet<Uuid>,
    reorder: ReorderBuffer,
    malformed: u32,
    deadline: Instant,
}

impl ResponseAggregator {
    /// Subscribe to the thread's fragment topic.
    ///
    /// Must complete before the prompt is published so no fragment can be
    /// missed.
    pub async fn arm(
        transport: &dyn MessageTransport,
        thread: ConversationThread,
        header: ChunkHeader,
        settings: AggregatorSettings,
    ) -> Result<Self, BridgeError> {
        let subscription = transport
            .subscribe(&topics::thread(thread.id))
            .await
            .map_err(|e| BridgeError::Subscription(e.to_string()))?;

        debug!(thread_id = %thread.id, agent = %thread.agent, "aggregator armed");
        Ok(Self {
            thread,
            header,
            subscription,
            state: AggregatorState::Armed,
            seen: HashSet::new(),
            reorder: ReorderBuffer::new(settings.reorder_window),
            malformed: 0,
            deadline: Instant::now() + settings.armed_timeout,
            settings,
        })
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread.id
    }

    /// Drive the exchange to a terminal state.
    ///
    /// `publish` is polled alongside the subscription; its failure ends the
    /// exchange only while no fragment has been accepted yet.
    pub async fn run<F>(mut self, publish: F, tx: mpsc::Sender<HandoffItem>) -> AggregatorState
    where
        F: Future<Output = Result<(), BridgeError>> + Send,
    {
        tokio::pin!(publish);
        let mut published = false;

        let outcome = match self.send(&tx, HandoffItem::Chunk(ChatCompletionChunk::role(&self.header))).await {
            ControlFlow::Break(state) => state,
            ControlFlow::Continue(()) => loop {
                let event = tokio::select! {
                    biased;
                    _ = tx.closed() => Event::Disconnected,
                    result = &mut publish, if !published => Event::Published(result),
                    msg = self.subscription.recv() => Event::Inbound(msg),
                    _ = tokio::time::sleep_until(self.deadline) => Event::Deadline,
                };

                let flow = match event {
                    Event::Disconnected => self.client_gone(),
                    Event::Published(result) => {
                        published = true;
                        self.on_published(result, &tx).await
                    }
                    Event::Inbound(Some(msg)) => self.on_message(msg, &tx).await,
                    Event::Inbound(None) => {
                        let err = BridgeError::Subscription("relay subscription closed".into());
                        Self::fail(&tx, err, AggregatorState::UpstreamError).await
                    }
                    Event::Deadline => self.on_deadline(&tx).await,
                };

                if let ControlFlow::Break(state) = flow {
                    break state;
                }
            },
        };

        self.state = outcome;
        info!(
            thread_id = %self.thread.id,
            agent = %self.thread.agent,
            state = ?outcome,
            malformed = self.malformed,
            "exchange finished"
        );
        outcome
    }

    async fn on_published(
        &mut self,
        result: Result<(), BridgeError>,
        tx: &mpsc::Sender<HandoffItem>,
    ) -> ControlFlow<AggregatorState> {
        match result {
            Ok(()) => ControlFlow::Continue(()),
            Err(err) if self.state == AggregatorState::Armed => {
                Self::fail(tx, err, AggregatorState::UpstreamError).await
            }
            Err(err) => {
                debug!(thread_id = %self.thread.id, error = %err, "publish reported failure after fragments arrived");
                ControlFlow::Continue(())
            }
        }
    }

    async fn on_deadline(&mut self, tx: &mpsc::Sender<HandoffItem>) -> ControlFlow<AggregatorState> {
        if !self.reorder.is_empty() {
            debug!(thread_id = %self.thread.id, "releasing buffered fragments past a sequence gap");
            self.deadline = Instant::now() + self.settings.inter_fragment_timeout;
            let ready = self.reorder.flush();
            return self.emit_all(ready, tx).await;
        }

        let phase = match self.state {
            AggregatorState::Armed => TimeoutPhase::Armed,
            _ => TimeoutPhase::InterFragment,
        };
        warn!(thread_id = %self.thread.id, agent = %self.thread.agent, %phase, "agent timed out");
        Self::fail(tx, BridgeError::StreamTimeout(phase), AggregatorState::TimedOut).await
    }

    async fn on_message(&mut self, msg: Message, tx: &mpsc::Sender<HandoffItem>) -> ControlFlow<AggregatorState> {
        if !self.seen.insert(msg.id) {
            trace!(thread_id = %self.thread.id, event_id = %msg.id, "duplicate fragment");
            return ControlFlow::Continue(());
        }

        let fragment = match msg.decode::<AgentFragment>() {
            Ok(f) => f,
            Err(e) => return self.malformed(msg.id, &format!("undecodable payload: {e}"), tx).await,
        };

        if ThreadId::parse(&fragment.thread_id) != Some(self.thread.id) || fragment.agent != self.thread.agent {
            debug!(
                thread_id = %self.thread.id,
                fragment_thread = %fragment.thread_id,
                fragment_agent = %fragment.agent,
                "ignoring fragment for another thread or agent"
            );
            return ControlFlow::Continue(());
        }

        let kind = match (fragment.data.kind.as_str(), fragment.data.text) {
            (TEXT_DELTA, Some(text)) => FragmentKind::TextDelta(text),
            (TEXT_DELTA, None) => return self.malformed(msg.id, "text delta without text", tx).await,
            (REASONING_DELTA, _) => FragmentKind::ReasoningDelta,
            (FINISH, _) => FragmentKind::Finish,
            (other, _) => {
                return self
                    .malformed(msg.id, &format!("unknown fragment type '{other}'"), tx)
                    .await
            }
        };

        if fragment.seq == Some(u64::MAX) {
            return self.malformed(msg.id, "sequence number out of range", tx).await;
        }

        let inbound = InboundFragment {
            source_event_id: msg.id,
            thread_id: self.thread.id,
            agent: fragment.agent,
            sequence: fragment.seq,
            kind,
        };

        self.state = AggregatorState::Streaming;
        self.deadline = Instant::now() + self.settings.inter_fragment_timeout;

        match inbound.sequence {
            Some(seq) => {
                let ready = self.reorder.push(seq, inbound);
                self.emit_all(ready, tx).await
            }
            None if inbound.is_terminal() => {
                let mut ready = self.reorder.flush();
                ready.push(inbound);
                self.emit_all(ready, tx).await
            }
            None => self.emit(inbound, tx).await,
        }
    }

    async fn malformed(
        &mut self,
        event_id: Uuid,
        reason: &str,
        tx: &mpsc::Sender<HandoffItem>,
    ) -> ControlFlow<AggregatorState> {
        self.malformed += 1;
        warn!(
            thread_id = %self.thread.id,
            %event_id,
            count = self.malformed,
            reason,
            "skipping malformed fragment"
        );
        if self.malformed > self.settings.malformed_limit {
            let err = BridgeError::MalformedFragments(self.malformed);
            return Self::fail(tx, err, AggregatorState::Aborted).await;
        }
        ControlFlow::Continue(())
    }

    async fn emit_all(
        &mut self,
        fragments: Vec<InboundFragment>,
        tx: &mpsc::Sender<HandoffItem>,
    ) -> ControlFlow<AggregatorState> {
        for fragment in fragments {
            self.emit(fragment, tx).await?;
        }
        ControlFlow::Continue(())
    }

    async fn emit(&mut self, fragment: InboundFragment, tx: &mpsc::Sender<HandoffItem>) -> ControlFlow<AggregatorState> {
        match fragment.kind {
            FragmentKind::TextDelta(text) if text.is_empty() => ControlFlow::Continue(()),
            FragmentKind::TextDelta(text) => {
                self.send(tx, HandoffItem::Chunk(ChatCompletionChunk::content(&self.header, text))).await
            }
            FragmentKind::ReasoningDelta => ControlFlow::Continue(()),
            FragmentKind::Finish => {
                self.send(tx, HandoffItem::Chunk(ChatCompletionChunk::stop(&self.header))).await?;
                ControlFlow::Break(AggregatorState::Completed)
            }
        }
    }

    async fn send(&self, tx: &mpsc::Sender<HandoffItem>, item: HandoffItem) -> ControlFlow<AggregatorState> {
        match tx.send(item).await {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => self.client_gone(),
        }
    }

    /// The writer hung up. Nobody is left to tell, so the reason is only logged.
    fn client_gone(&self) -> ControlFlow<AggregatorState> {
        let reason = BridgeError::ClientDisconnected;
        debug!(thread_id = %self.thread.id, %reason, "dropping exchange");
        ControlFlow::Break(AggregatorState::Aborted)
    }

    async fn fail(
        tx: &mpsc::Sender<HandoffItem>,
        err: BridgeError,
        state: AggregatorState,
    ) -> ControlFlow<AggregatorState> {
        // The client may already be gone; the state is terminal either way.
        let _ = tx.send(HandoffItem::Failed(err)).await;
        ControlFlow::Break(state)
    }
}
