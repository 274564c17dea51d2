//! Teardown archive: the durable record a session leaves behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::error::Result;
use crate::mailbox::Message;
use crate::task::Task;
use crate::team::{AgentId, AgentLifecycle};

/// Descriptor of a team session: who was on it and when it ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub torn_down_at: DateTime<Utc>,
    pub agents: Vec<AgentSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
    pub id: AgentId,
    pub role: String,
    pub lifecycle: AgentLifecycle,
}

/// Everything worth keeping after teardown: the descriptor, the final task
/// list, and the full per-agent message logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamArchive {
    pub descriptor: SessionDescriptor,
    pub tasks: Vec<Task>,
    pub mailboxes: BTreeMap<AgentId, Vec<Message>>,
}

impl TeamArchive {
    /// Write the archive as pretty JSON under `dir`, named after the session
    /// and the teardown timestamp. Returns the written path.
    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).await?;
        let filename = format!(
            "{}-{}.json",
            self.descriptor.name,
            self.descriptor.torn_down_at.format("%Y%m%dT%H%M%S")
        );
        let path = dir.join(filename);
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content).await?;
        info!(path = %path.display(), "Session archive written");
        Ok(path)
    }
}
