//! Signal Tree
//!
//! Root construction and the derivation operations. Every derivation returns a new
//! node parented to its argument; the parent is never modified beyond registering
//! the child for propagation.

use crate::error::DoneCause;
use crate::signal::cancel::CancelHandle;
use crate::signal::node::SignalNode;
use crate::signal::value::ValueEntry;
use std::any::Any;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Root for real top-level lifetimes. Never done, no deadline, no values.
///
/// Each call returns a fresh root; callers pass it explicitly to whatever needs it.
pub fn background() -> SignalNode {
    SignalNode::background()
}

/// Placeholder root for code whose governing lifetime is not decided yet.
pub fn todo() -> SignalNode {
    SignalNode::todo()
}

/// Derive a node carrying one key/value pair.
///
/// Repeated calls chain nodes; the nearest pair wins on lookup. The parent's done
/// state is untouched.
pub fn with_value<V>(parent: &SignalNode, key: &'static str, value: V) -> SignalNode
where
    V: Any + Send + Sync,
{
    SignalNode::value_child(parent, ValueEntry::new(key, value))
}

/// Derive a cancellable node.
///
/// The node becomes done when the returned handle is invoked or when `parent`
/// becomes done, whichever happens first.
pub fn with_cancel(parent: &SignalNode) -> (SignalNode, CancelHandle) {
    let node = SignalNode::cancel_child(parent, None);
    (node.clone(), CancelHandle::new(node))
}

/// Derive a node that expires `timeout` from now.
///
/// A timeout too large to be represented as an instant never expires; the node is
/// then a plain cancellable child.
///
/// # Panics
///
/// Same as [`with_deadline`].
pub fn with_timeout(parent: &SignalNode, timeout: Duration) -> (SignalNode, CancelHandle) {
    match Instant::now().checked_add(timeout) {
        Some(deadline) => with_deadline(parent, deadline),
        None => {
            debug!(?timeout, "Timeout unrepresentable, deriving without deadline");
            with_cancel(parent)
        }
    }
}

/// Derive a node that expires at `deadline`.
///
/// A deadline already in the past yields a node that is done on return with
/// [`DoneCause::DeadlineExceeded`] and no timer. When the parent already has an
/// earlier deadline in force, the node is a plain cancellable child and inherits it.
/// Otherwise a one-shot timer is spawned on the current Tokio runtime.
///
/// # Panics
///
/// Panics when a timer is needed (the deadline is in the future and earlier than any
/// inherited one) and the caller is not inside a Tokio runtime.
pub fn with_deadline(parent: &SignalNode, deadline: Instant) -> (SignalNode, CancelHandle) {
    if let Some(inherited) = parent.deadline() {
        if inherited <= deadline {
            return with_cancel(parent);
        }
    }

    let node = SignalNode::cancel_child(parent, Some(deadline));
    if deadline <= Instant::now() {
        debug!(node_id = node.id().as_u64(), "Deadline already passed at creation");
        node.finish(DoneCause::DeadlineExceeded, true);
    } else {
        node.arm_timer(deadline);
    }

    (node.clone(), CancelHandle::new(node))
}
