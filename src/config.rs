//! Crate configuration, loaded from and saved as TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Result, TeamError};

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamConfig {
    /// Feature flag: team sessions may only be formed when enabled.
    pub enabled: bool,
    /// Upper bound on roster size, lead included.
    pub max_teammates: usize,
    /// Bounded idle wait before an agent re-polls the task list.
    pub idle_repoll_ms: u64,
    /// Interval at which a working agent checks for an inbound shutdown
    /// request to flip the cooperative cancellation signal.
    pub work_poll_ms: u64,
    /// Directory teardown archives are written to.
    pub archive_dir: PathBuf,
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_teammates: 8,
            idle_repoll_ms: 500,
            work_poll_ms: 100,
            archive_dir: PathBuf::from(".squadron/archive"),
        }
    }
}

impl TeamConfig {
    pub async fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        let config = if path.exists() {
            let content = fs::read_to_string(&path).await?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, dir: &Path) -> Result<()> {
        self.validate()?;
        let content = toml::to_string_pretty(self).map_err(|e| TeamError::Config(e.to_string()))?;
        fs::create_dir_all(dir).await?;
        fs::write(dir.join(CONFIG_FILE), content).await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.max_teammates == 0 {
            errors.push("max_teammates must be greater than 0");
        }
        if self.idle_repoll_ms == 0 {
            errors.push("idle_repoll_ms must be greater than 0");
        }
        if self.work_poll_ms == 0 {
            errors.push("work_poll_ms must be greater than 0");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TeamError::Config(errors.join("; ")))
        }
    }

    pub fn idle_repoll(&self) -> Duration {
        Duration::from_millis(self.idle_repoll_ms)
    }

    pub fn work_poll(&self) -> Duration {
        Duration::from_millis(self.work_poll_ms)
    }
}
