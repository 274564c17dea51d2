//! Coordination core for agent teams.
//!
//! Independent agent sessions cooperate through exactly two shared services:
//! a task list with dependency edges and atomic claim semantics
//! ([`task::TaskStore`]), and per-agent mailboxes with broadcast fan-out
//! ([`mailbox::MailboxHub`]). A per-agent control loop
//! ([`runtime`]) polls both, performs work through an injected
//! [`runtime::WorkCapability`], and participates in cooperative shutdown.
//! The [`session::TeamSession`] ties it together from formation to
//! teardown.

pub mod config;
pub mod error;
pub mod mailbox;
pub mod runtime;
pub mod session;
pub mod task;
pub mod team;
pub mod testing;

pub use config::TeamConfig;
pub use error::{Result, TeamError};
pub use mailbox::{MailboxHub, Message, MessageKind};
pub use runtime::{
    AnyTask, FilterFn, RoleFilter, RuntimeState, ShutdownDecision, ShutdownSignal, WorkCapability,
    WorkOutcome, filter_fn,
};
pub use session::{LeadHandle, SessionEvent, TeamArchive, TeamSession};
pub use task::{Task, TaskSpec, TaskStatus, TaskStore};
pub use team::{AgentId, AgentLifecycle, TaskId, Teammate};
