//! Context exporter: read-only snapshots of ledger and zone state for an
//! external AI assistant.
//!
//! Snapshots are written as versioned JSON (see [`ContextSnapshot`]). A
//! snapshot file is written to a temporary file and renamed into place, so an
//! assistant reading the directory never sees a partial file.

mod render;

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::ledger::LedgerStore;
use crate::models::*;
use crate::registry::ZoneRegistry;

pub use render::{render_markdown, render_membership, render_zone_tree, status_symbol};

/// Assistants whose instruction files can be kept in sync with the ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AiTool {
    Cursor,
    Copilot,
    Windsurf,
    Augment,
}

impl AiTool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cursor => "cursor",
            Self::Copilot => "copilot",
            Self::Windsurf => "windsurf",
            Self::Augment => "augment",
        }
    }

    /// Instruction file location, relative to the project root.
    pub fn file_path(&self) -> &'static str {
        match self {
            Self::Cursor => ".cursorrules",
            Self::Copilot => ".github/copilot-instructions.md",
            Self::Windsurf => ".windsurfrules",
            Self::Augment => "augment.md",
        }
    }
}

impl fmt::Display for AiTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AiTool {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cursor" => Ok(Self::Cursor),
            "copilot" => Ok(Self::Copilot),
            "windsurf" => Ok(Self::Windsurf),
            "augment" => Ok(Self::Augment),
            other => Err(Error::Config(format!("unsupported AI tool '{}'", other))),
        }
    }
}

pub struct ContextExporter {
    ledger: LedgerStore,
    registry: ZoneRegistry,
    project: String,
}

impl ContextExporter {
    pub fn new(db: Database, project: impl Into<String>) -> Self {
        Self {
            ledger: LedgerStore::new(db.clone()),
            registry: ZoneRegistry::new(db),
            project: project.into(),
        }
    }

    /// Capture feature statuses, the last `recent` entries of each ledger and
    /// current zone membership.
    pub fn snapshot(&self, recent: usize) -> Result<ContextSnapshot> {
        let listing = self.ledger.list_features(None);
        let mut features = Vec::new();
        for feature in &listing {
            let feature = feature?;
            let entry_count = feature.entries.len();
            let skip = entry_count.saturating_sub(recent);
            features.push(FeatureContext {
                id: feature.id,
                description: feature.description,
                status: feature.status,
                entry_count,
                recent_entries: feature.entries.into_iter().skip(skip).collect(),
            });
        }

        let mut zones = ZoneMembership::default();
        for zone in Zone::ALL {
            let listing = self.registry.list_by_zone(zone);
            *zones.paths_mut(zone) = listing.iter().collect::<Result<Vec<_>>>()?;
        }

        Ok(ContextSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            project: self.project.clone(),
            generated_at: Utc::now(),
            features,
            zones,
        })
    }

    /// Write `snapshot` as `<dir>/<name>.json`, replacing any previous file
    /// of that name. Defaults to a timestamped name.
    pub fn write_snapshot(
        &self,
        snapshot: &ContextSnapshot,
        dir: &Path,
        name: Option<&str>,
    ) -> Result<PathBuf> {
        let name = match name {
            Some(name) => validate_snapshot_name(name)?,
            None => format!(
                "snapshot-{}",
                snapshot.generated_at.format("%Y%m%d-%H%M%S")
            ),
        };
        let path = dir.join(format!("{}.json", name));
        let json = serde_json::to_string_pretty(snapshot)?;
        write_atomic(&path, json.as_bytes())?;

        tracing::info!("Wrote context snapshot {}", path.display());
        Ok(path)
    }

    /// Render `snapshot` into each tool's instruction file under `root`.
    pub fn sync_tools(
        &self,
        snapshot: &ContextSnapshot,
        root: &Path,
        tools: &[AiTool],
    ) -> Result<Vec<PathBuf>> {
        let body = render_markdown(snapshot);
        let mut written = Vec::with_capacity(tools.len());

        for tool in tools {
            let path = root.join(tool.file_path());
            let content = format!(
                "<!-- Generated by gridwrinkl for {} at {}. Edits are overwritten by 'gridwrinkl context sync'. -->\n\n{}",
                tool,
                snapshot.generated_at.to_rfc3339(),
                body
            );
            write_atomic(&path, content.as_bytes())?;
            tracing::debug!("Synced {} context to {}", tool, path.display());
            written.push(path);
        }

        Ok(written)
    }
}

fn validate_snapshot_name(name: &str) -> Result<String> {
    let name = name.trim();
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !name.starts_with('.');
    if valid {
        Ok(name.to_string())
    } else {
        Err(Error::Config(format!("invalid snapshot name '{}'", name)))
    }
}

/// Replace `path` with `contents` via a temp file in the same directory.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Config(format!("{} has no parent directory", path.display())))?;
    std::fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
