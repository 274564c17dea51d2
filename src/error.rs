use thiserror::Error;

use crate::team::{AgentId, TaskId};

#[derive(Error, Debug)]
pub enum TeamError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Invalid dependency: {task} references unknown task {dependency}")]
    InvalidDependency { task: String, dependency: String },

    #[error("Dependency cycle detected: {0}")]
    CycleDetected(String),

    #[error("Task {task} is not claimable (status: {status})")]
    NotClaimable { task: TaskId, status: String },

    #[error("Task {task} has unmet dependencies: {unmet:?}")]
    DependenciesUnmet { task: TaskId, unmet: Vec<TaskId> },

    #[error("Task {task} is already owned by {owner}")]
    AlreadyOwned { task: TaskId, owner: AgentId },

    #[error("Task {task} is not owned by {agent}")]
    NotOwner { task: TaskId, agent: AgentId },

    #[error("Unknown recipient: {0}")]
    UnknownRecipient(AgentId),

    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),

    #[error("Agent teams are disabled in configuration")]
    TeamsDisabled,

    #[error("Session error: {0}")]
    Session(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, TeamError>;
