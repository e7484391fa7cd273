//! Causal delivery for Treedoc operations.
//!
//! Remote operations arrive in whatever order the network chooses. The
//! [`CausalQueue`] holds each one back until everything it depends on has
//! been delivered, and the [`OperationLog`] remembers every applied operation
//! so a lagging peer can be caught up from its version vector.
//!
//! Both containers are generic over the payload so they stay independent of
//! the document tree.

pub mod log;
pub mod queue;

pub use log::{LogEntry, OperationLog};
pub use queue::{CausalQueue, QueueElem};
