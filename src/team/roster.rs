//! Team roster: the session-owned record of agents and their lifecycle.
//!
//! The roster is the only place agent lifecycle status lives, and the team
//! session is its only writer. Coordinator runtimes report transitions over
//! the session event channel; they never touch the roster directly.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AgentId;

/// Lifecycle status of an agent as tracked by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentLifecycle {
    /// Agent is running its control loop (awaiting or performing work).
    Active,
    /// Agent has no claimable work and is parked on its mailbox.
    Idle,
    /// Agent received a shutdown request and has not yet decided.
    ShutdownRequested,
    /// Agent approved shutdown; it is out of the addressable set for good.
    Terminated,
}

impl AgentLifecycle {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Idle => "idle",
            Self::ShutdownRequested => "shutdown_requested",
            Self::Terminated => "terminated",
        }
    }
}

/// One agent's entry in the roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Teammate {
    pub id: AgentId,
    /// Role label, e.g. "lead", "researcher". Opaque to the core.
    pub role: String,
    pub lifecycle: AgentLifecycle,
    pub joined_at: DateTime<Utc>,
}

impl Teammate {
    pub fn new(id: AgentId, role: impl Into<String>) -> Self {
        Self {
            id,
            role: role.into(),
            lifecycle: AgentLifecycle::Active,
            joined_at: Utc::now(),
        }
    }

    pub fn is_lead(&self) -> bool {
        self.role == "lead"
    }
}

/// Registry of all agents that ever joined the session, in join order.
///
/// Terminated members stay in the roster (for the teardown archive) but drop
/// out of [`Roster::active_ids`].
#[derive(Debug, Default)]
pub struct Roster {
    members: BTreeMap<AgentId, Teammate>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new member. Returns false if the id is already taken.
    pub fn register(&mut self, teammate: Teammate) -> bool {
        if self.members.contains_key(&teammate.id) {
            return false;
        }
        self.members.insert(teammate.id.clone(), teammate);
        true
    }

    pub fn get(&self, id: &AgentId) -> Option<&Teammate> {
        self.members.get(id)
    }

    /// Update a member's lifecycle. No-op once terminated: termination is
    /// final.
    pub fn set_lifecycle(&mut self, id: &AgentId, lifecycle: AgentLifecycle) {
        if let Some(member) = self.members.get_mut(id) {
            if !member.lifecycle.is_terminal() {
                member.lifecycle = lifecycle;
            }
        }
    }

    pub fn active_ids(&self) -> Vec<AgentId> {
        self.members
            .values()
            .filter(|m| !m.lifecycle.is_terminal())
            .map(|m| m.id.clone())
            .collect()
    }

    pub fn members(&self) -> impl Iterator<Item = &Teammate> {
        self.members.values()
    }

    pub fn all_terminated(&self) -> bool {
        self.members.values().all(|m| m.lifecycle.is_terminal())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
