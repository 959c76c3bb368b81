use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::feature::FeatureStatus;
use super::zone::Zone;

/// An immutable record appended to a feature's ledger.
///
/// The ledger is append-only: corrections are new entries, never edits.
/// Status transitions are recorded as entries too, carrying `transition`, and
/// so are file associations and reorganizer moves, carrying `file_change`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub feature_id: String,
    /// Position in the feature's ledger, starting at 1 with no gaps.
    pub sequence: i64,
    pub author: Author,
    pub note: String,
    /// Reference to a coding pattern this entry relies on or establishes.
    pub pattern_ref: Option<String>,
    /// Reference to an architecture decision this entry relies on or records.
    pub architecture_ref: Option<String>,
    /// Set on the implicit entries written by status transitions.
    pub transition: Option<StatusChange>,
    /// Set on the implicit entries written when a file joins, leaves or moves.
    #[serde(default)]
    pub file_change: Option<FileChange>,
    pub created_at: DateTime<Utc>,
}

/// Who wrote a ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    pub kind: AuthorKind,
    pub name: String,
}

impl Author {
    pub fn human(name: impl Into<String>) -> Self {
        Self {
            kind: AuthorKind::Human,
            name: name.into(),
        }
    }

    pub fn assistant(name: impl Into<String>) -> Self {
        Self {
            kind: AuthorKind::Assistant,
            name: name.into(),
        }
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AuthorKind::Human => write!(f, "{}", self.name),
            AuthorKind::Assistant => write!(f, "{} (assistant)", self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthorKind {
    Human,
    Assistant,
}

impl AuthorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Assistant => "assistant",
        }
    }
}

impl FromStr for AuthorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(Self::Human),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("unknown author kind '{}'", other)),
        }
    }
}

/// The status change recorded by a transition entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusChange {
    pub from: FeatureStatus,
    pub to: FeatureStatus,
}

/// What happened to a file of the feature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FileChange {
    /// The file was associated with the feature and placed in `zone`.
    Associated { path: String, zone: Zone },
    /// The association was dropped; the file is now in `zone`.
    Detached { path: String, zone: Zone },
    /// The reorganizer moved the file.
    Moved { path: String, from: Zone, to: Zone },
}

impl FileChange {
    pub fn path(&self) -> &str {
        match self {
            Self::Associated { path, .. } | Self::Detached { path, .. } | Self::Moved { path, .. } => {
                path
            }
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::Associated { .. } => "associated",
            Self::Detached { .. } => "detached",
            Self::Moved { .. } => "moved",
        }
    }

    /// Note text for the implicit entry recording this change.
    pub fn describe(&self) -> String {
        match self {
            Self::Associated { path, zone } => format!("Associated {} ({})", path, zone),
            Self::Detached { path, zone } => format!("Detached {} ({})", path, zone),
            Self::Moved { path, from, to } => format!("Moved {} from {} to {}", path, from, to),
        }
    }
}

/// Input for appending an entry to a feature's ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub author: Author,
    pub note: String,
    #[serde(default)]
    pub pattern_ref: Option<String>,
    #[serde(default)]
    pub architecture_ref: Option<String>,
}

impl NewLedgerEntry {
    pub fn note(author: Author, note: impl Into<String>) -> Self {
        Self {
            author,
            note: note.into(),
            pattern_ref: None,
            architecture_ref: None,
        }
    }
}
