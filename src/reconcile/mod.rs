//! Typed change events and their application to the routing tree.

mod change;
mod reconciler;

pub use change::{Action, Change, UnknownAction};
pub use reconciler::{ApplyError, HostCreatePolicy, Reconciler};
