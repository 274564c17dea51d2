//! Coordinator runtime: the per-agent control loop and its seams.

mod capability;
mod coordinator;

pub use capability::{
    AnyTask, FilterFn, RoleFilter, ShutdownDecision, ShutdownSignal, WorkCapability, WorkOutcome,
    filter_fn,
};
pub use coordinator::RuntimeState;

pub(crate) use coordinator::Coordinator;
