//! Integration tests for publisher leak detection
//!
//! A governed publisher must leave the live-task census once its node is released;
//! the ungoverned one stays alive for as long as the consumer holds the receiver.

use lifeline::census::TaskCensus;
use lifeline::config::PublisherConfig;
use lifeline::error::DoneCause;
use lifeline::publisher::Publisher;
use lifeline::scenario;
use lifeline::signal::{background, with_cancel};
use std::time::Duration;
use tokio::time::sleep;

const INTERVAL: Duration = Duration::from_secs(1);
const GRACE: Duration = Duration::from_secs(4);

#[tokio::test(start_paused = true)]
async fn test_no_leak_with_cancellation() {
    let census = TaskCensus::new();
    let publisher = Publisher::new(INTERVAL).with_census(census.clone());
    let before = census.live();

    let root = background();
    let (ctx, cancel) = with_cancel(&root);
    let (mut handoff, _handle) = publisher.spawn(&ctx);
    assert_eq!(census.live(), before + 1);

    for expected in 1..=10 {
        assert_eq!(handoff.recv().await, Some(expected));
    }
    cancel.cancel();

    sleep(GRACE).await;
    assert_eq!(census.live(), before);
}

#[tokio::test(start_paused = true)]
async fn test_leak_reproduction_without_signal() {
    let census = TaskCensus::new();
    let publisher = Publisher::new(INTERVAL).with_census(census.clone());
    let before = census.live();

    let (mut handoff, _handle) = publisher.spawn_leaky();
    for expected in 1..=10 {
        assert_eq!(handoff.recv().await, Some(expected));
    }

    sleep(GRACE).await;
    assert_eq!(census.live(), before + 1);

    // Dropping the receiver is the leaky publisher's only way out.
    drop(handoff);
    census.settle(before, GRACE).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shared_census_across_publishers() {
    let census = TaskCensus::new();
    let root = background();
    let (ctx, cancel) = with_cancel(&root);

    let handoffs: Vec<_> = (0..4)
        .map(|_| {
            Publisher::new(INTERVAL)
                .with_census(census.clone())
                .spawn(&ctx)
                .0
        })
        .collect();
    assert_eq!(census.live(), 4);

    cancel.cancel();
    census.settle(0, INTERVAL).await.unwrap();
    drop(handoffs);
}

#[tokio::test(start_paused = true)]
async fn test_scenarios_report_leaks() {
    let config = PublisherConfig::default();

    let leak = scenario::leak(&config).await;
    assert!(leak.leaked());
    assert_eq!(leak.received, (1..=10).collect::<Vec<_>>());

    let cancel = scenario::cancel(&config).await;
    assert!(!cancel.leaked());
    assert_eq!(cancel.cause, Some(DoneCause::Cancelled));
    assert_eq!(cancel.received, (1..=10).collect::<Vec<_>>());

    let timeout = scenario::timeout(&config).await;
    assert!(!timeout.leaked());
    assert_eq!(timeout.cause, Some(DoneCause::DeadlineExceeded));

    let deadline = scenario::deadline(&config).await;
    assert!(!deadline.leaked());
    assert_eq!(deadline.cause, Some(DoneCause::DeadlineExceeded));
    assert!(deadline.received.len() >= 5);
}
