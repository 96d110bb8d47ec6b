//! Lifeline: Propagating Lifetimes for Background Tasks
//!
//! An immutable tree of cancellation signals. Cancelling or expiring a node
//! deterministically terminates every descendant, and publishers spawned under a
//! node observe that transition and exit instead of leaking.

pub mod census;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod publisher;
pub mod scenario;
pub mod signal;

pub use error::{ApiError, DoneCause};
pub use publisher::{start_leaky_publisher, start_publisher, Handoff, Publisher, Termination};
pub use signal::{
    background, todo, with_cancel, with_deadline, with_timeout, with_value, CancelGuard,
    CancelHandle, SignalNode,
};
