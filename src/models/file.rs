use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::zone::Zone;

/// A tracked file and the zone it currently belongs to.
///
/// A record is associated with at most one feature. Pinned records are manual
/// overrides: the reorganizer never moves them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    /// Project-relative path with forward slashes.
    pub path: String,
    pub zone: Zone,
    pub feature_id: Option<String>,
    pub pinned: bool,
    /// When the record's zone, association or pin last changed.
    pub last_modified: DateTime<Utc>,
}
