use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::feature::FeatureStatus;
use super::ledger::LedgerEntry;
use super::zone::Zone;

/// Bumped whenever the snapshot layout changes incompatibly.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time view of ledger and zone state for an AI assistant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextSnapshot {
    pub format_version: u32,
    pub project: String,
    pub generated_at: DateTime<Utc>,
    pub features: Vec<FeatureContext>,
    pub zones: ZoneMembership,
}

/// A feature as it appears in a snapshot, with only its most recent entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureContext {
    pub id: String,
    pub description: String,
    pub status: FeatureStatus,
    /// Total entries in the ledger, including those not shown.
    pub entry_count: usize,
    /// The most recent entries, oldest first.
    pub recent_entries: Vec<LedgerEntry>,
}

/// Paths in each zone, sorted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ZoneMembership {
    pub active: Vec<String>,
    pub resources: Vec<String>,
    pub archive: Vec<String>,
}

impl ZoneMembership {
    pub fn paths(&self, zone: Zone) -> &[String] {
        match zone {
            Zone::Active => &self.active,
            Zone::Resources => &self.resources,
            Zone::Archive => &self.archive,
        }
    }

    pub fn paths_mut(&mut self, zone: Zone) -> &mut Vec<String> {
        match zone {
            Zone::Active => &mut self.active,
            Zone::Resources => &mut self.resources,
            Zone::Archive => &mut self.archive,
        }
    }
}
