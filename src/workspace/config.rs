use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::export::AiTool;

/// Overrides the author recorded on ledger entries.
pub const AUTHOR_ENV: &str = "GRIDWRINKL_AUTHOR";

const DEFAULT_SNAPSHOT_ENTRIES: usize = 5;

const UNKNOWN_AUTHOR: &str = "unknown";

/// Per-project settings stored in `.gridwrinkl/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    pub project_name: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    /// Assistants whose instruction files `context sync` writes.
    #[serde(default = "default_ai_tools")]
    pub ai_tools: Vec<AiTool>,
    /// Ledger entries per feature included in a snapshot.
    #[serde(default = "default_snapshot_entries")]
    pub snapshot_entries: usize,
    /// Author for entries when `GRIDWRINKL_AUTHOR` is unset.
    #[serde(default)]
    pub default_author: Option<String>,
}

fn default_ai_tools() -> Vec<AiTool> {
    vec![AiTool::Cursor, AiTool::Copilot]
}

fn default_snapshot_entries() -> usize {
    DEFAULT_SNAPSHOT_ENTRIES
}

impl ProjectConfig {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            ai_tools: default_ai_tools(),
            snapshot_entries: DEFAULT_SNAPSHOT_ENTRIES,
            default_author: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        if config.project_name.trim().is_empty() {
            return Err(Error::Config(format!(
                "{}: project_name is empty",
                path.display()
            )));
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Name recorded on ledger entries: `GRIDWRINKL_AUTHOR`, then
    /// `default_author`, then `USER`, then `unknown`. Blank values are skipped.
    pub fn author_name(&self) -> String {
        std::env::var(AUTHOR_ENV)
            .ok()
            .and_then(non_blank)
            .or_else(|| self.default_author.clone().and_then(non_blank))
            .or_else(|| std::env::var("USER").ok().and_then(non_blank))
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string())
    }
}

fn non_blank(name: String) -> Option<String> {
    let trimmed = name.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
