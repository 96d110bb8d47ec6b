//! Signal tree: propagating cancellation, deadlines and values.

mod cancel;
mod node;
mod tree;
mod value;

pub use cancel::{CancelGuard, CancelHandle};
pub use node::{NodeId, SignalNode};
pub use tree::{background, todo, with_cancel, with_deadline, with_timeout, with_value};
