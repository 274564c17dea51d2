//! Agent identity and roster types.

mod id;
mod roster;

pub use id::{AgentId, TaskId};
pub use roster::{AgentLifecycle, Roster, Teammate};
