//! Cancellable Publisher
//!
//! Background producer that hands a counter (1, 2, 3, ...) to a single consumer,
//! pausing a fixed interval between emissions, until its governing signal node is
//! done. Every iteration races "node done" against "next emission" with done-detection
//! taking priority, so a consumer that stops reading can never pin the producer.
//!
//! The leaky variant has no governing node and exists as a negative control: it
//! stays blocked on its send for as long as the consumer keeps the receiver alive.

use crate::census::TaskCensus;
use crate::config::PublisherConfig;
use crate::error::DoneCause;
use crate::signal::SignalNode;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Why a publisher stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The governing node was released or an ancestor was cancelled
    Cancelled,
    /// The governing node's deadline passed
    DeadlineExceeded,
    /// The consumer dropped its receiver
    ConsumerGone,
}

impl Termination {
    fn from_node(node: &SignalNode) -> Self {
        match node.err() {
            Some(DoneCause::DeadlineExceeded) => Termination::DeadlineExceeded,
            _ => Termination::Cancelled,
        }
    }
}

/// Consumer end of a publisher's handoff channel.
///
/// Yields values in strictly increasing order. Once the governing node is done no
/// further value is observable, even one the publisher already handed over.
#[derive(Debug)]
pub struct Handoff {
    receiver: mpsc::Receiver<u64>,
    node: Option<SignalNode>,
}

impl Handoff {
    /// Next value, or `None` once the node is done or the publisher has exited.
    pub async fn recv(&mut self) -> Option<u64> {
        let Some(node) = &self.node else {
            return self.receiver.recv().await;
        };
        tokio::select! {
            biased;
            _ = node.done() => {
                self.receiver.close();
                None
            }
            value = self.receiver.recv() => value,
        }
    }

    /// Governing node, `None` for a leaky publisher.
    pub fn node(&self) -> Option<&SignalNode> {
        self.node.as_ref()
    }
}

/// Spawns publishers with a fixed emission interval.
#[derive(Debug, Clone)]
pub struct Publisher {
    interval: Duration,
    census: TaskCensus,
}

impl Publisher {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            census: TaskCensus::new(),
        }
    }

    pub fn from_config(config: &PublisherConfig) -> Self {
        Self::new(config.interval())
    }

    /// Count spawned publishers in `census` instead of a private one.
    pub fn with_census(mut self, census: TaskCensus) -> Self {
        self.census = census;
        self
    }

    pub fn census(&self) -> &TaskCensus {
        &self.census
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn a publisher governed by `node`.
    ///
    /// The handoff channel is closed by the publisher itself on every exit path.
    pub fn spawn(&self, node: &SignalNode) -> (Handoff, JoinHandle<Termination>) {
        let (sender, receiver) = mpsc::channel(1);
        let guard = self.census.enter();
        let governor = node.clone();
        let interval = self.interval;

        info!(
            node_id = node.id().as_u64(),
            ?interval,
            "Publisher started"
        );

        let handle = tokio::spawn(async move {
            let _guard = guard;
            Self::publish_loop(governor, sender, interval).await
        });

        let handoff = Handoff {
            receiver,
            node: Some(node.clone()),
        };
        (handoff, handle)
    }

    /// Spawn a publisher with no governing node and no done-check.
    ///
    /// Its only exit is the consumer dropping the receiver.
    pub fn spawn_leaky(&self) -> (Handoff, JoinHandle<Termination>) {
        let (sender, receiver) = mpsc::channel(1);
        let guard = self.census.enter();

        warn!("Leaky publisher started without a governing signal");

        let handle = tokio::spawn(async move {
            let _guard = guard;
            let mut counter: u64 = 1;
            while sender.send(counter).await.is_ok() {
                counter += 1;
            }
            info!(emitted = counter - 1, "Leaky publisher terminated");
            Termination::ConsumerGone
        });

        let handoff = Handoff {
            receiver,
            node: None,
        };
        (handoff, handle)
    }

    async fn publish_loop(
        node: SignalNode,
        sender: mpsc::Sender<u64>,
        interval: Duration,
    ) -> Termination {
        let mut counter: u64 = 1;

        let reason = loop {
            let permit = tokio::select! {
                biased;
                _ = node.done() => break Termination::from_node(&node),
                permit = sender.reserve() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Termination::ConsumerGone,
                },
            };
            permit.send(counter);
            debug!(node_id = node.id().as_u64(), value = counter, "Published");
            counter += 1;

            tokio::select! {
                biased;
                _ = node.done() => break Termination::from_node(&node),
                _ = sleep(interval) => {}
            }
        };

        info!(
            node_id = node.id().as_u64(),
            emitted = counter - 1,
            reason = ?reason,
            "Publisher terminated"
        );
        reason
    }
}

/// Spawn a publisher governed by `node`, emitting every `interval`.
pub fn start_publisher(node: &SignalNode, interval: Duration) -> Handoff {
    Publisher::new(interval).spawn(node).0
}

/// Spawn the ungoverned producer used to reproduce the leak.
pub fn start_leaky_publisher() -> Handoff {
    Publisher::new(Duration::ZERO).spawn_leaky().0
}
