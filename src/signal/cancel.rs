//! Release operations paired with cancellable derivations.

use crate::error::DoneCause;
use crate::signal::node::SignalNode;

/// Releases the node it was created with.
///
/// Releasing transitions that node (and therefore its subtree) to done with
/// [`DoneCause::Cancelled`], stops any pending deadline timer, and deregisters the
/// node from its parent. Ancestors are never affected. Calling it more than once,
/// or after the node expired, is a no-op.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    node: SignalNode,
}

impl CancelHandle {
    pub(crate) fn new(node: SignalNode) -> Self {
        Self { node }
    }

    pub fn cancel(&self) {
        self.node.finish(DoneCause::Cancelled, true);
    }

    /// The node this handle releases.
    pub fn node(&self) -> &SignalNode {
        &self.node
    }

    /// Convert into a guard that releases the node when dropped.
    pub fn drop_guard(self) -> CancelGuard {
        CancelGuard { handle: Some(self) }
    }
}

/// Releases its node on drop unless disarmed.
#[derive(Debug)]
pub struct CancelGuard {
    handle: Option<CancelHandle>,
}

impl CancelGuard {
    /// Give the handle back without releasing.
    pub fn disarm(mut self) -> CancelHandle {
        // `handle` is only ever `None` after this call consumed the guard.
        match self.handle.take() {
            Some(handle) => handle,
            None => unreachable!("cancel guard disarmed twice"),
        }
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }
}
