//! Task records and batch specs for the shared task list.

use serde::{Deserialize, Serialize};

use crate::team::{AgentId, TaskId};

/// Stored status of a task.
///
/// "Blocked" is deliberately not a stored status: a pending task with unmet
/// dependencies is simply not claimable, and claimability is re-derived on
/// every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Unowned; claimable once all dependencies are completed.
    Pending,
    /// Claimed by exactly one agent.
    InProgress,
    /// Terminal. Status and owner are immutable from here on.
    Completed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

/// A single unit of work on the shared task list.
///
/// Invariants, enforced by the store: `owner` is `None` iff `status` is
/// `Pending`; a completed task never changes again; dependencies only
/// reference tasks that existed when this task was created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Opaque text; the core never interprets it.
    pub description: String,
    pub status: TaskStatus,
    pub owner: Option<AgentId>,
    /// Tasks that must all be completed before this one is claimable.
    pub dependencies: Vec<TaskId>,
}

impl Task {
    pub(crate) fn new(id: TaskId, description: String, dependencies: Vec<TaskId>) -> Self {
        Self {
            id,
            description,
            status: TaskStatus::Pending,
            owner: None,
            dependencies,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Reference to a dependency inside a batch creation request.
///
/// Batch entries may depend on tasks that already exist in the store or on
/// other entries of the same batch (by position), which is what allows the
/// lead to submit a whole dependency graph at team formation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchDep {
    /// An id already present in the store.
    Existing(TaskId),
    /// Zero-based position of another entry in the same batch.
    Entry(usize),
}

/// One entry of a batch creation request.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub description: String,
    pub dependencies: Vec<BatchDep>,
}

impl TaskSpec {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            dependencies: Vec::new(),
        }
    }

    pub fn depends_on(mut self, id: TaskId) -> Self {
        self.dependencies.push(BatchDep::Existing(id));
        self
    }

    pub fn depends_on_entry(mut self, index: usize) -> Self {
        self.dependencies.push(BatchDep::Entry(index));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_is_pending_and_unowned() {
        let task = Task::new(TaskId::default(), "write docs".into(), Vec::new());
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.owner.is_none());
        assert!(!task.is_completed());
    }

    #[test]
    fn test_spec_builder() {
        let spec = TaskSpec::new("integrate")
            .depends_on_entry(0)
            .depends_on_entry(1);
        assert_eq!(spec.dependencies.len(), 2);
        assert_eq!(spec.dependencies[0], BatchDep::Entry(0));
    }
}
