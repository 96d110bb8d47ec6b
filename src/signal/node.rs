//! Signal Node
//!
//! One node in the cancellation tree. A node is either a root (`background`/`todo`),
//! a value carrier, or a cancel scope. Only cancel scopes hold done state; roots are
//! never done and value carriers report the state of their nearest cancel scope.
//!
//! Children hold a strong reference to their parent (for lookup and inherited state).
//! Cancel scopes hold only `Weak` entries for registered child scopes, used to push
//! the done transition down the tree.

use crate::error::DoneCause;
use crate::signal::value::ValueEntry;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

const NOT_DONE: u8 = 0;

/// Process-unique node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        NodeId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Shared handle to a node of the signal tree.
///
/// Cloning is cheap and yields the same node. Equality is identity.
#[derive(Clone)]
pub struct SignalNode {
    pub(crate) inner: Arc<NodeInner>,
}

pub(crate) struct NodeInner {
    id: NodeId,
    parent: Option<SignalNode>,
    kind: NodeKind,
}

enum NodeKind {
    Background,
    Todo,
    Value(ValueEntry),
    Cancel(CancelScope),
}

struct CancelScope {
    state: AtomicU8,
    notify: Notify,
    /// Deadline owned by this scope (inherited deadlines are looked up on ancestors)
    deadline: Option<Instant>,
    listeners: Mutex<Listeners>,
}

#[derive(Default)]
struct Listeners {
    children: HashMap<NodeId, Weak<NodeInner>>,
    timer: Option<JoinHandle<()>>,
}

impl CancelScope {
    fn new(deadline: Option<Instant>) -> Self {
        Self {
            state: AtomicU8::new(NOT_DONE),
            notify: Notify::new(),
            deadline,
            listeners: Mutex::new(Listeners::default()),
        }
    }

    fn cause(&self) -> Option<DoneCause> {
        DoneCause::from_code(self.state.load(Ordering::Acquire))
    }
}

impl NodeInner {
    fn scope(&self) -> Option<&CancelScope> {
        match &self.kind {
            NodeKind::Cancel(scope) => Some(scope),
            _ => None,
        }
    }

    /// Nearest cancel scope strictly above this node.
    fn parent_scope(&self) -> Option<&NodeInner> {
        let mut current = self.parent.as_ref().map(|p| p.inner.as_ref());
        while let Some(node) = current {
            if node.scope().is_some() {
                return Some(node);
            }
            current = node.parent.as_ref().map(|p| p.inner.as_ref());
        }
        None
    }

    fn detach_from_parent(&self) {
        if let Some(scope) = self.parent_scope().and_then(NodeInner::scope) {
            scope.listeners.lock().children.remove(&self.id);
        }
    }

    /// Stop the timer and deregister from the parent scope. Idempotent.
    fn release(&mut self) {
        if let NodeKind::Cancel(scope) = &mut self.kind {
            if let Some(timer) = scope.listeners.get_mut().timer.take() {
                timer.abort();
            }
            self.detach_from_parent();
        }
    }
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        self.release();

        // Unlink uniquely owned ancestors one at a time so long chains do not
        // recurse through nested drops.
        let mut next = self.parent.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node.inner) {
                Ok(mut inner) => {
                    inner.release();
                    next = inner.parent.take();
                }
                Err(_) => break,
            }
        }
    }
}

impl SignalNode {
    pub(crate) fn background() -> Self {
        Self::root(NodeKind::Background)
    }

    pub(crate) fn todo() -> Self {
        Self::root(NodeKind::Todo)
    }

    fn root(kind: NodeKind) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                id: NodeId::next(),
                parent: None,
                kind,
            }),
        }
    }

    pub(crate) fn value_child(parent: &SignalNode, entry: ValueEntry) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                id: NodeId::next(),
                parent: Some(parent.clone()),
                kind: NodeKind::Value(entry),
            }),
        }
    }

    /// Create a cancel scope under `parent` and register it for propagation.
    ///
    /// If the governing ancestor is already done, the new scope is done immediately
    /// with the ancestor's cause and is not registered.
    pub(crate) fn cancel_child(parent: &SignalNode, deadline: Option<Instant>) -> Self {
        let node = Self {
            inner: Arc::new(NodeInner {
                id: NodeId::next(),
                parent: Some(parent.clone()),
                kind: NodeKind::Cancel(CancelScope::new(deadline)),
            }),
        };

        if let Some(scope) = node.inner.parent_scope().and_then(NodeInner::scope) {
            let mut listeners = scope.listeners.lock();
            match scope.cause() {
                Some(cause) => {
                    drop(listeners);
                    node.finish(cause, false);
                }
                None => {
                    listeners
                        .children
                        .insert(node.inner.id, Arc::downgrade(&node.inner));
                }
            }
        }

        node
    }

    /// Spawn the one-shot timer that expires this scope at its deadline.
    ///
    /// # Panics
    ///
    /// Panics outside a Tokio runtime.
    pub(crate) fn arm_timer(&self, deadline: Instant) {
        let Some(scope) = self.inner.scope() else {
            return;
        };
        if scope.cause().is_some() {
            return;
        }

        let id = self.inner.id;
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(node_id = id.as_u64(), error = %e, "No Tokio runtime for deadline timer");
                panic!(
                    "lifeline: a node with a future deadline requires a Tokio runtime for its timer: {}",
                    e
                );
            }
        };

        let weak = Arc::downgrade(&self.inner);
        let timer = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                SignalNode { inner }.finish(DoneCause::DeadlineExceeded, true);
            }
        });
        debug!(node_id = id.as_u64(), "Deadline timer scheduled");

        let mut listeners = scope.listeners.lock();
        if scope.cause().is_some() {
            drop(listeners);
            timer.abort();
        } else {
            listeners.timer = Some(timer);
        }
    }

    /// Transition this scope to done.
    ///
    /// Only the first caller wins the compare-and-set; later calls are no-ops. The winner
    /// wakes waiters, stops the timer, and pushes the same cause to every live child.
    /// With `detach`, the scope also removes itself from its parent's listeners.
    pub(crate) fn finish(&self, cause: DoneCause, detach: bool) {
        let Some(children) = Self::transition(&self.inner, cause) else {
            return;
        };

        let mut pending = children;
        while let Some(inner) = pending.pop() {
            if let Some(children) = Self::transition(&inner, cause) {
                pending.extend(children);
            }
        }

        if detach {
            self.inner.detach_from_parent();
        }
    }

    /// Move one scope to done and hand back its live children.
    ///
    /// `None` when the node is not a cancel scope or another cause got there first.
    fn transition(inner: &NodeInner, cause: DoneCause) -> Option<Vec<Arc<NodeInner>>> {
        let scope = inner.scope()?;
        scope
            .state
            .compare_exchange(NOT_DONE, cause.as_code(), Ordering::AcqRel, Ordering::Acquire)
            .ok()?;

        scope.notify.notify_waiters();

        let (children, timer) = {
            let mut listeners = scope.listeners.lock();
            (
                std::mem::take(&mut listeners.children),
                listeners.timer.take(),
            )
        };

        if let Some(timer) = timer {
            timer.abort();
            debug!(node_id = inner.id.as_u64(), "Deadline timer stopped");
        }

        debug!(
            node_id = inner.id.as_u64(),
            cause = %cause,
            children = children.len(),
            "Signal node done"
        );

        Some(
            children
                .into_values()
                .filter_map(|weak| weak.upgrade())
                .collect(),
        )
    }

    /// Nearest cancel scope governing this node (self included).
    fn governor(&self) -> Option<&CancelScope> {
        let mut current = Some(self.inner.as_ref());
        while let Some(node) = current {
            match &node.kind {
                NodeKind::Cancel(scope) => return Some(scope),
                NodeKind::Background | NodeKind::Todo => return None,
                NodeKind::Value(_) => {}
            }
            current = node.parent.as_ref().map(|p| p.inner.as_ref());
        }
        None
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// The node this one was derived from, `None` for roots.
    pub fn parent(&self) -> Option<&SignalNode> {
        self.inner.parent.as_ref()
    }

    /// Why the node is done, or `None` while it is still live.
    pub fn err(&self) -> Option<DoneCause> {
        self.governor().and_then(CancelScope::cause)
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the node is done.
    ///
    /// Level-triggered: resolves immediately for a node that is already done, however
    /// long ago the transition happened. Never resolves for a root.
    pub async fn done(&self) {
        let Some(scope) = self.governor() else {
            return std::future::pending::<()>().await;
        };
        loop {
            let notified = scope.notify.notified();
            if scope.cause().is_some() {
                return;
            }
            notified.await;
        }
    }

    /// Nearest deadline in force for this node, own or inherited.
    pub fn deadline(&self) -> Option<Instant> {
        let mut current = Some(self.inner.as_ref());
        while let Some(node) = current {
            if let Some(deadline) = node.scope().and_then(|s| s.deadline) {
                return Some(deadline);
            }
            current = node.parent.as_ref().map(|p| p.inner.as_ref());
        }
        None
    }

    /// Look up `key` on this node, then on each ancestor toward the root.
    ///
    /// The nearest match wins. Values set on sibling branches are never visible.
    pub fn value(&self, key: &str) -> Option<&(dyn Any + Send + Sync)> {
        let mut current = Some(self.inner.as_ref());
        while let Some(node) = current {
            if let NodeKind::Value(entry) = &node.kind {
                if entry.key == key {
                    return Some(&*entry.value);
                }
            }
            current = node.parent.as_ref().map(|p| p.inner.as_ref());
        }
        None
    }

    /// Typed lookup; `None` when the key is absent or holds another type.
    pub fn value_as<T: Any>(&self, key: &str) -> Option<&T> {
        self.value(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Child scopes currently registered on this node's governing cancel scope.
    pub fn live_children(&self) -> usize {
        self.governor()
            .map(|scope| scope.listeners.lock().children.len())
            .unwrap_or(0)
    }
}

impl PartialEq for SignalNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for SignalNode {}

impl fmt::Display for SignalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut path = Vec::new();
        let mut current = Some(self.inner.as_ref());
        while let Some(node) = current {
            path.push(node);
            current = node.parent.as_ref().map(|p| p.inner.as_ref());
        }

        for (i, node) in path.iter().rev().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match &node.kind {
                NodeKind::Background => f.write_str("background")?,
                NodeKind::Todo => f.write_str("todo")?,
                NodeKind::Value(entry) => write!(f, "with_value({})", entry)?,
                NodeKind::Cancel(CancelScope {
                    deadline: Some(deadline),
                    ..
                }) => write!(
                    f,
                    "with_deadline(+{:?})",
                    deadline.saturating_duration_since(Instant::now())
                )?,
                NodeKind::Cancel(_) => f.write_str("with_cancel")?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for SignalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalNode")
            .field("id", &self.inner.id)
            .field("path", &self.to_string())
            .field("err", &self.err())
            .finish()
    }
}
