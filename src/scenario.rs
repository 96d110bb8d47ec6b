//! Lifecycle Scenarios
//!
//! Reproducible runs of the signal tree and publisher: printing roots, value
//! inheritance, the producer leak, and the three governed shutdown paths (manual
//! release, timeout, absolute deadline). Each run records what the consumer saw and
//! the live publisher count before spawning and after the grace period.

use crate::config::PublisherConfig;
use crate::error::DoneCause;
use crate::publisher::{Handoff, Publisher};
use crate::signal::{self, SignalNode};
use tokio::time::{sleep, Instant};
use tracing::info;

/// Outcome of one scenario run.
#[derive(Debug, Clone, Default)]
pub struct ScenarioReport {
    pub name: &'static str,
    pub lines: Vec<String>,
    pub received: Vec<u64>,
    pub live_before: usize,
    pub live_after: usize,
    pub cause: Option<DoneCause>,
}

impl ScenarioReport {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    fn line(&mut self, line: impl Into<String>) {
        let line = line.into();
        info!(scenario = self.name, "{}", line);
        self.lines.push(line);
    }

    /// True when more publishers are alive after the run than before it.
    pub fn leaked(&self) -> bool {
        self.live_after > self.live_before
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

/// Print both canonical roots.
pub fn roots() -> ScenarioReport {
    let mut report = ScenarioReport::new("roots");
    report.line(signal::background().to_string());
    report.line(signal::todo().to_string());
    report
}

/// Build a small value tree and show which lookups succeed.
pub fn values() -> ScenarioReport {
    let mut report = ScenarioReport::new("values");

    let a = signal::background();
    let b = signal::with_value(&a, "b", "B");
    let c = signal::with_value(&a, "c", "C");
    let d = signal::with_value(&b, "d", "D");
    let e = signal::with_value(&b, "e", "E");
    let f = signal::with_value(&c, "f", "F");

    for node in [&a, &b, &c, &d, &e, &f] {
        report.line(node.to_string());
    }

    for (label, node, key) in [
        ("a", &a, "b"),
        ("f", &f, "f"),
        ("f", &f, "c"),
        ("b", &b, "e"),
    ] {
        report.line(format!("{}.value({:?}) = {}", label, key, lookup(node, key)));
    }
    report
}

fn lookup(node: &SignalNode, key: &str) -> String {
    match node.value_as::<&str>(key) {
        Some(value) => format!("{:?}", value),
        None => "<absent>".to_string(),
    }
}

/// Ungoverned producer: the consumer stops reading and the producer stays blocked.
pub async fn leak(config: &PublisherConfig) -> ScenarioReport {
    let mut report = ScenarioReport::new("leak");
    let publisher = Publisher::from_config(config);

    report.live_before = publisher.census().live();
    report.line(format!("live publishers: {}", report.live_before));

    let (mut handoff, _handle) = publisher.spawn_leaky();
    report.line(format!("live publishers: {}", publisher.census().live()));

    read_until(&mut handoff, config.stop_after, &mut report).await;

    // The receiver stays alive and undrained across the grace period.
    sleep(config.grace()).await;
    report.live_after = publisher.census().live();
    report.line(format!("live publishers: {}", report.live_after));

    drop(handoff);
    report
}

/// Governed producer released by the consumer after it stops reading.
pub async fn cancel(config: &PublisherConfig) -> ScenarioReport {
    let mut report = ScenarioReport::new("cancel");
    let publisher = Publisher::from_config(config);
    report.live_before = publisher.census().live();
    report.line(format!("live publishers: {}", report.live_before));

    let root = signal::background();
    let (node, cancel) = signal::with_cancel(&root);
    let (mut handoff, _handle) = publisher.spawn(&node);
    report.line(format!("live publishers: {}", publisher.census().live()));

    read_until(&mut handoff, config.stop_after, &mut report).await;
    cancel.cancel();

    finish(&publisher, config, &node, &mut report).await;
    report
}

/// Governed producer that expires after the configured timeout.
pub async fn timeout(config: &PublisherConfig) -> ScenarioReport {
    let root = signal::background();
    let (node, cancel) = signal::with_timeout(&root, config.timeout());
    let _release = cancel.drop_guard();
    drain_governed("timeout", config, &node).await
}

/// Governed producer that expires at an absolute deadline.
pub async fn deadline(config: &PublisherConfig) -> ScenarioReport {
    let root = signal::background();
    let (node, cancel) = match Instant::now().checked_add(config.deadline_offset()) {
        Some(at) => signal::with_deadline(&root, at),
        None => signal::with_cancel(&root),
    };
    let _release = cancel.drop_guard();
    drain_governed("deadline", config, &node).await
}

async fn drain_governed(
    name: &'static str,
    config: &PublisherConfig,
    node: &SignalNode,
) -> ScenarioReport {
    let mut report = ScenarioReport::new(name);
    let publisher = Publisher::from_config(config);
    report.live_before = publisher.census().live();
    report.line(format!("live publishers: {}", report.live_before));

    let (mut handoff, _handle) = publisher.spawn(node);
    report.line(format!("live publishers: {}", publisher.census().live()));

    while let Some(value) = handoff.recv().await {
        report.line(format!("counter {}", value));
        report.received.push(value);
    }

    finish(&publisher, config, node, &mut report).await;
    report
}

async fn read_until(handoff: &mut Handoff, stop_after: u64, report: &mut ScenarioReport) {
    while let Some(value) = handoff.recv().await {
        report.line(format!("counter {}", value));
        report.received.push(value);
        if value >= stop_after {
            break;
        }
    }
}

async fn finish(
    publisher: &Publisher,
    config: &PublisherConfig,
    node: &SignalNode,
    report: &mut ScenarioReport,
) {
    sleep(config.grace()).await;
    report.cause = node.err();
    report.live_after = publisher.census().live();
    if let Some(cause) = report.cause {
        report.line(format!("signal done: {}", cause));
    }
    report.line(format!("live publishers: {}", report.live_after));
}
