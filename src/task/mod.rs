//! Shared task list with dependency edges and atomic claim semantics.

mod record;
mod store;

pub use record::{BatchDep, Task, TaskSpec, TaskStatus};
pub use store::TaskStore;

pub use crate::team::TaskId;
