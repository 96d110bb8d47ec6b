//! Integration tests for cancellation and deadline propagation
//!
//! Tests cover:
//! - Idempotent release
//! - Parent-to-subtree propagation with the parent's cause
//! - Child release never reaching ancestors
//! - Deadline firing and early release racing the timer
//! - Listener deregistration on long-lived ancestors
//! - Unbounded and zero timeouts, and very deep derivation chains

use futures::future::join_all;
use lifeline::error::DoneCause;
use lifeline::signal::{background, with_cancel, with_deadline, with_timeout, with_value};
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

#[test]
fn test_idempotent_cancellation() {
    let root = background();
    let (node, cancel) = with_cancel(&root);
    for _ in 0..5 {
        cancel.cancel();
    }
    assert_eq!(node.err(), Some(DoneCause::Cancelled));
}

#[test]
fn test_parent_cancel_reaches_whole_subtree() {
    let root = background();
    let (parent, cancel) = with_cancel(&root);
    let (child, _c1) = with_cancel(&parent);
    let carrier = with_value(&child, "k", "v");
    let (grandchild, _c2) = with_cancel(&carrier);

    cancel.cancel();

    for node in [&parent, &child, &carrier, &grandchild] {
        assert_eq!(node.err(), Some(DoneCause::Cancelled));
    }
    assert!(!root.is_done());
}

#[test]
fn test_child_cancel_keeps_parent_and_siblings_live() {
    let root = background();
    let (parent, _cancel) = with_cancel(&root);
    let (left, left_cancel) = with_cancel(&parent);
    let (right, _right_cancel) = with_cancel(&parent);

    left_cancel.cancel();

    assert!(left.is_done());
    assert!(!right.is_done());
    assert!(!parent.is_done());
    assert_eq!(parent.live_children(), 1);
}

#[test]
fn test_child_keeps_own_cause_after_parent_expires() {
    let root = background();
    let (parent, parent_cancel) = with_cancel(&root);
    let (child, child_cancel) = with_cancel(&parent);

    child_cancel.cancel();
    parent_cancel.cancel();
    assert_eq!(child.err(), Some(DoneCause::Cancelled));
}

#[test]
fn test_drop_guard_releases() {
    let root = background();
    let (node, cancel) = with_cancel(&root);
    {
        let _guard = cancel.drop_guard();
        assert!(!node.is_done());
    }
    assert_eq!(node.err(), Some(DoneCause::Cancelled));

    let (kept, cancel) = with_cancel(&root);
    let handle = cancel.drop_guard().disarm();
    assert!(!kept.is_done());
    handle.cancel();
    assert!(kept.is_done());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_fires_not_before() {
    let root = background();
    let start = Instant::now();
    let (node, _cancel) = with_timeout(&root, Duration::from_secs(1));

    sleep(Duration::from_millis(999)).await;
    assert!(!node.is_done());

    node.done().await;
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(node.err(), Some(DoneCause::DeadlineExceeded));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_propagates_to_children() {
    let root = background();
    let (parent, _cancel) = with_deadline(&root, Instant::now() + Duration::from_secs(3));
    let (child, _child_cancel) = with_cancel(&parent);

    child.done().await;
    assert_eq!(child.err(), Some(DoneCause::DeadlineExceeded));
    assert_eq!(parent.err(), Some(DoneCause::DeadlineExceeded));
}

#[tokio::test(start_paused = true)]
async fn test_early_release_beats_timer() {
    let root = background();
    let (node, cancel) = with_timeout(&root, Duration::from_secs(5));

    sleep(Duration::from_secs(1)).await;
    cancel.cancel();
    sleep(Duration::from_secs(10)).await;

    assert_eq!(node.err(), Some(DoneCause::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn test_release_after_expiry_is_noop() {
    let root = background();
    let (node, cancel) = with_timeout(&root, Duration::from_millis(10));
    node.done().await;
    cancel.cancel();
    assert_eq!(node.err(), Some(DoneCause::DeadlineExceeded));
}

#[tokio::test(start_paused = true)]
async fn test_done_is_level_triggered() {
    let root = background();
    let (node, cancel) = with_cancel(&root);
    cancel.cancel();

    sleep(Duration::from_secs(60)).await;
    timeout(Duration::from_millis(1), node.done())
        .await
        .expect("done resolves immediately for a finished node");
    timeout(Duration::from_millis(1), node.done())
        .await
        .expect("done stays resolved");
}

#[tokio::test]
async fn test_all_waiters_wake_on_cancel() {
    let root = background();
    let (parent, cancel) = with_cancel(&root);
    let children: Vec<_> = (0..16).map(|_| with_cancel(&parent)).collect();

    let waiters = children.iter().map(|(node, _)| node.done());
    let canceller = async {
        tokio::task::yield_now().await;
        cancel.cancel();
    };
    let (_, _) = tokio::join!(join_all(waiters), canceller);

    assert!(children.iter().all(|(node, _)| node.is_done()));
}

#[tokio::test]
async fn test_root_never_done() {
    let root = background();
    assert!(timeout(Duration::from_millis(20), root.done()).await.is_err());
}

#[test]
fn test_unbounded_timeout_is_plain_cancel() {
    let root = background();
    let (node, cancel) = with_timeout(&root, Duration::MAX);
    assert!(!node.is_done());
    assert!(node.deadline().is_none());

    cancel.cancel();
    assert_eq!(node.err(), Some(DoneCause::Cancelled));
}

#[test]
fn test_zero_timeout_done_at_creation() {
    // No runtime here: a timer spawn would panic.
    let root = background();
    let (node, cancel) = with_timeout(&root, Duration::ZERO);
    assert_eq!(node.err(), Some(DoneCause::DeadlineExceeded));

    cancel.cancel();
    assert_eq!(node.err(), Some(DoneCause::DeadlineExceeded));
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_timeout_under_runtime() {
    let root = background();
    let (node, _cancel) = with_timeout(&root, Duration::MAX);
    sleep(Duration::from_secs(86_400)).await;
    assert!(!node.is_done());
}

#[test]
fn test_cancel_reaches_leaf_of_deep_chain() {
    let root = background();
    let (top, cancel) = with_cancel(&root);
    let mut handles = Vec::new();
    let mut leaf = top.clone();
    for _ in 0..20_000 {
        let (child, handle) = with_cancel(&leaf);
        handles.push(handle);
        leaf = child;
    }

    cancel.cancel();
    assert_eq!(leaf.err(), Some(DoneCause::Cancelled));
    assert_eq!(top.live_children(), 0);

    drop(handles);
    drop(leaf);
}

#[test]
fn test_drop_deep_value_chain() {
    let root = background();
    let mut node = root.clone();
    for i in 0..100_000u32 {
        node = with_value(&node, "depth", i);
    }
    assert_eq!(node.value_as::<u32>("depth"), Some(&99_999));
    drop(node);
    assert!(!root.is_done());
}

#[test]
fn test_drop_deep_cancel_chain_releases_parent() {
    let root = background();
    let (top, _cancel) = with_cancel(&root);
    let mut node = top.clone();
    for _ in 0..50_000 {
        node = with_cancel(&node).0;
    }
    assert_eq!(top.live_children(), 1);
    drop(node);
    assert_eq!(top.live_children(), 0);
}

#[test]
fn test_released_children_deregister_from_long_lived_parent() {
    let root = background();
    let (parent, _cancel) = with_cancel(&root);

    for _ in 0..100 {
        let (_child, cancel) = with_cancel(&parent);
        cancel.cancel();
    }
    assert_eq!(parent.live_children(), 0);

    let kept: Vec<_> = (0..3).map(|_| with_cancel(&parent)).collect();
    assert_eq!(parent.live_children(), 3);
    drop(kept);
    assert_eq!(parent.live_children(), 0);
}
