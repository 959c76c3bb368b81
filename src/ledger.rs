//! Feature ledger store.
//!
//! Features and their append-only ledgers. Every write that depends on
//! current state (the next entry sequence, the current status) runs inside one
//! immediate transaction, so concurrent callers are totally ordered and no
//! update is lost.

use std::collections::VecDeque;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{parse_column, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::*;

const PAGE_SIZE: usize = 64;

const FEATURE_COLUMNS: &str = "seq, id, description, status, status_seq, created_at, updated_at";
const ENTRY_COLUMNS: &str = "id, feature_id, sequence, author_kind, author, note, pattern_ref, architecture_ref, from_status, to_status, file_path, file_action, file_from_zone, file_to_zone, created_at";

#[derive(Clone)]
pub struct LedgerStore {
    db: Database,
}

/// A feature's status together with the store-wide sequence number of its
/// last status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMark {
    pub feature_id: String,
    pub status: FeatureStatus,
    pub status_seq: i64,
}

impl LedgerStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create_feature(&self, id: &str, description: &str) -> Result<Feature> {
        validate_feature_id(id)?;
        let now = Utc::now();

        self.db.with_transaction(|tx| {
            if feature_exists(tx, id)? {
                return Err(Error::DuplicateFeature(id.to_string()));
            }

            let status_seq = next_status_seq(tx)?;
            tx.execute(
                "INSERT INTO features (id, description, status, status_seq, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                (
                    id,
                    description,
                    FeatureStatus::Proposed.as_str(),
                    status_seq,
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ),
            )?;
            Ok(())
        })?;

        tracing::info!("Created feature {}", id);

        Ok(Feature {
            id: id.to_string(),
            description: description.to_string(),
            status: FeatureStatus::Proposed,
            entries: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn append_entry(&self, id: &str, entry: NewLedgerEntry) -> Result<LedgerEntry> {
        let appended = self.db.with_transaction(|tx| {
            if !feature_exists(tx, id)? {
                return Err(Error::UnknownFeature(id.to_string()));
            }
            let appended = insert_entry(tx, id, &entry, None, None)?;
            touch_feature(tx, id, &appended.created_at.to_rfc3339())?;
            Ok(appended)
        })?;

        tracing::debug!("Appended entry {} to {}", appended.sequence, id);
        Ok(appended)
    }

    /// Move a feature to `new_status` and record the change in its ledger.
    ///
    /// Only the immediate successor of the current status is accepted.
    pub fn transition(
        &self,
        id: &str,
        new_status: FeatureStatus,
        author: &Author,
    ) -> Result<Feature> {
        let change = self.db.with_transaction(|tx| {
            let current = current_status(tx, id)?;
            if !current.can_transition_to(new_status) {
                return Err(Error::InvalidTransition {
                    id: id.to_string(),
                    from: current,
                    to: new_status,
                });
            }

            let change = StatusChange {
                from: current,
                to: new_status,
            };
            let entry = NewLedgerEntry::note(
                author.clone(),
                format!("Status changed from {} to {}", change.from, change.to),
            );
            let recorded = insert_entry(tx, id, &entry, Some(change), None)?;

            let status_seq = next_status_seq(tx)?;
            tx.execute(
                "UPDATE features SET status = ?, status_seq = ?, updated_at = ? WHERE id = ?",
                (
                    new_status.as_str(),
                    status_seq,
                    recorded.created_at.to_rfc3339(),
                    id,
                ),
            )?;
            Ok(change)
        })?;

        tracing::info!("Feature {} moved from {} to {}", id, change.from, change.to);

        self.get_feature(id)?
            .ok_or_else(|| Error::UnknownFeature(id.to_string()))
    }

    pub fn get_feature(&self, id: &str) -> Result<Option<Feature>> {
        self.db.with_conn(|conn| {
            let raw = conn
                .query_row(
                    &format!("SELECT {} FROM features WHERE id = ?", FEATURE_COLUMNS),
                    [id],
                    RawFeature::from_row,
                )
                .optional()?;
            match raw {
                Some(raw) => {
                    let entries = entries_for(conn, &raw.id)?;
                    Ok(Some(raw.into_feature(entries)?))
                }
                None => Ok(None),
            }
        })
    }

    /// Features in creation order, optionally only those in `status`.
    ///
    /// Nothing is read until the listing is iterated; each
    /// [`FeatureListing::iter`] starts from the first feature again.
    pub fn list_features(&self, status: Option<FeatureStatus>) -> FeatureListing {
        FeatureListing {
            db: self.db.clone(),
            status,
            page_size: PAGE_SIZE,
        }
    }

    /// The last `limit` entries of a feature's ledger, oldest first.
    pub fn recent_entries(&self, id: &str, limit: usize) -> Result<Vec<LedgerEntry>> {
        self.db.with_conn(|conn| {
            if !feature_exists(conn, id)? {
                return Err(Error::UnknownFeature(id.to_string()));
            }
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM ledger_entries WHERE feature_id = ? ORDER BY sequence DESC LIMIT ?",
                ENTRY_COLUMNS
            ))?;
            let raws = stmt
                .query_map((id, limit as i64), RawEntry::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let mut entries = raws
                .into_iter()
                .map(RawEntry::into_entry)
                .collect::<Result<Vec<_>>>()?;
            entries.reverse();
            Ok(entries)
        })
    }

    /// Features whose status changed after store-wide sequence `after`.
    pub fn status_changes_since(&self, after: i64) -> Result<Vec<StatusMark>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, status, status_seq FROM features WHERE status_seq > ? ORDER BY status_seq",
            )?;
            let rows = stmt
                .query_map([after], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(feature_id, status, status_seq)| {
                    Ok(StatusMark {
                        feature_id,
                        status: parse_column("features.status", &status)?,
                        status_seq,
                    })
                })
                .collect()
        })
    }
}

/// A lazy, restartable listing of features.
pub struct FeatureListing {
    db: Database,
    status: Option<FeatureStatus>,
    page_size: usize,
}

impl FeatureListing {
    /// Read `page_size` features per storage round trip.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn iter(&self) -> Features<'_> {
        Features {
            listing: self,
            buffer: VecDeque::new(),
            after: 0,
            done: false,
        }
    }

    fn fetch_page(&self, after: i64) -> Result<Vec<(i64, Feature)>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM features
                 WHERE seq > ?1 AND (?2 IS NULL OR status = ?2)
                 ORDER BY seq LIMIT ?3",
                FEATURE_COLUMNS
            ))?;
            let raws = stmt
                .query_map(
                    (
                        after,
                        self.status.map(|s| s.as_str()),
                        self.page_size as i64,
                    ),
                    RawFeature::from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut page = Vec::with_capacity(raws.len());
            for raw in raws {
                let seq = raw.seq;
                let entries = entries_for(conn, &raw.id)?;
                page.push((seq, raw.into_feature(entries)?));
            }
            Ok(page)
        })
    }
}

impl<'a> IntoIterator for &'a FeatureListing {
    type Item = Result<Feature>;
    type IntoIter = Features<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`FeatureListing`]. Stops after the first storage error.
pub struct Features<'a> {
    listing: &'a FeatureListing,
    buffer: VecDeque<Feature>,
    after: i64,
    done: bool,
}

impl Iterator for Features<'_> {
    type Item = Result<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            match self.listing.fetch_page(self.after) {
                Ok(page) => {
                    self.done = page.len() < self.listing.page_size;
                    if let Some((seq, _)) = page.last() {
                        self.after = *seq;
                    }
                    self.buffer.extend(page.into_iter().map(|(_, f)| f));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

// ============================================================
// Row mapping
// ============================================================

struct RawFeature {
    seq: i64,
    id: String,
    description: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl RawFeature {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            id: row.get(1)?,
            description: row.get(2)?,
            status: row.get(3)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_feature(self, entries: Vec<LedgerEntry>) -> Result<Feature> {
        Ok(Feature {
            status: parse_column("features.status", &self.status)?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            id: self.id,
            description: self.description,
            entries,
        })
    }
}

struct RawEntry {
    id: String,
    feature_id: String,
    sequence: i64,
    author_kind: String,
    author: String,
    note: String,
    pattern_ref: Option<String>,
    architecture_ref: Option<String>,
    from_status: Option<String>,
    to_status: Option<String>,
    file_path: Option<String>,
    file_action: Option<String>,
    file_from_zone: Option<String>,
    file_to_zone: Option<String>,
    created_at: String,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            feature_id: row.get(1)?,
            sequence: row.get(2)?,
            author_kind: row.get(3)?,
            author: row.get(4)?,
            note: row.get(5)?,
            pattern_ref: row.get(6)?,
            architecture_ref: row.get(7)?,
            from_status: row.get(8)?,
            to_status: row.get(9)?,
            file_path: row.get(10)?,
            file_action: row.get(11)?,
            file_from_zone: row.get(12)?,
            file_to_zone: row.get(13)?,
            created_at: row.get(14)?,
        })
    }

    fn into_entry(self) -> Result<LedgerEntry> {
        let id = Uuid::parse_str(&self.id).map_err(|e| {
            Error::StorageUnavailable(format!("corrupt entry id '{}': {}", self.id, e))
        })?;
        let transition = match (self.from_status.as_deref(), self.to_status.as_deref()) {
            (Some(from), Some(to)) => Some(StatusChange {
                from: parse_column("ledger_entries.from_status", from)?,
                to: parse_column("ledger_entries.to_status", to)?,
            }),
            _ => None,
        };
        let file_change = self.file_change()?;

        Ok(LedgerEntry {
            id,
            feature_id: self.feature_id,
            sequence: self.sequence,
            author: Author {
                kind: parse_column("ledger_entries.author_kind", &self.author_kind)?,
                name: self.author,
            },
            note: self.note,
            pattern_ref: self.pattern_ref,
            architecture_ref: self.architecture_ref,
            transition,
            file_change,
            created_at: parse_datetime(&self.created_at)?,
        })
    }

    fn file_change(&self) -> Result<Option<FileChange>> {
        let (Some(path), Some(action)) = (&self.file_path, self.file_action.as_deref()) else {
            return Ok(None);
        };
        let zone = |column: &str, value: &Option<String>| -> Result<Zone> {
            match value {
                Some(value) => parse_column(column, value),
                None => Err(Error::StorageUnavailable(format!(
                    "missing {} for file change on entry {}",
                    column, self.id
                ))),
            }
        };

        let change = match action {
            "associated" => FileChange::Associated {
                path: path.clone(),
                zone: zone("ledger_entries.file_to_zone", &self.file_to_zone)?,
            },
            "detached" => FileChange::Detached {
                path: path.clone(),
                zone: zone("ledger_entries.file_to_zone", &self.file_to_zone)?,
            },
            "moved" => FileChange::Moved {
                path: path.clone(),
                from: zone("ledger_entries.file_from_zone", &self.file_from_zone)?,
                to: zone("ledger_entries.file_to_zone", &self.file_to_zone)?,
            },
            other => {
                return Err(Error::StorageUnavailable(format!(
                    "corrupt value '{}' in column ledger_entries.file_action",
                    other
                )))
            }
        };
        Ok(Some(change))
    }
}

// ============================================================
// Statement helpers (callers hold the connection or transaction)
// ============================================================

fn feature_exists(conn: &Connection, id: &str) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM features WHERE id = ?", [id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn current_status(conn: &Connection, id: &str) -> Result<FeatureStatus> {
    let status: Option<String> = conn
        .query_row("SELECT status FROM features WHERE id = ?", [id], |row| {
            row.get(0)
        })
        .optional()?;
    match status {
        Some(s) => parse_column("features.status", &s),
        None => Err(Error::UnknownFeature(id.to_string())),
    }
}

fn next_status_seq(conn: &Connection) -> Result<i64> {
    let seq: i64 = conn.query_row(
        "SELECT COALESCE(MAX(status_seq), 0) + 1 FROM features",
        [],
        |row| row.get(0),
    )?;
    Ok(seq)
}

fn touch_feature(conn: &Connection, id: &str, at: &str) -> Result<()> {
    conn.execute("UPDATE features SET updated_at = ? WHERE id = ?", (at, id))?;
    Ok(())
}

/// Append an implicit entry recording `change` to a feature's ledger.
///
/// Runs on the caller's transaction so the entry commits or rolls back with
/// the file record update it describes.
pub(crate) fn record_file_change(
    conn: &Connection,
    feature_id: &str,
    author: &Author,
    change: &FileChange,
) -> Result<LedgerEntry> {
    let entry = NewLedgerEntry::note(author.clone(), change.describe());
    let recorded = insert_entry(conn, feature_id, &entry, None, Some(change))?;
    touch_feature(conn, feature_id, &recorded.created_at.to_rfc3339())?;
    Ok(recorded)
}

fn insert_entry(
    conn: &Connection,
    feature_id: &str,
    entry: &NewLedgerEntry,
    transition: Option<StatusChange>,
    file_change: Option<&FileChange>,
) -> Result<LedgerEntry> {
    let sequence: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sequence), 0) + 1 FROM ledger_entries WHERE feature_id = ?",
        [feature_id],
        |row| row.get(0),
    )?;
    let id = Uuid::new_v4();
    let now = Utc::now();

    let (file_from_zone, file_to_zone) = match file_change {
        Some(FileChange::Associated { zone, .. } | FileChange::Detached { zone, .. }) => {
            (None, Some(zone.as_str()))
        }
        Some(FileChange::Moved { from, to, .. }) => (Some(from.as_str()), Some(to.as_str())),
        None => (None, None),
    };

    conn.execute(
        &format!(
            "INSERT INTO ledger_entries ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            ENTRY_COLUMNS
        ),
        (
            id.to_string(),
            feature_id,
            sequence,
            entry.author.kind.as_str(),
            &entry.author.name,
            &entry.note,
            &entry.pattern_ref,
            &entry.architecture_ref,
            transition.map(|t| t.from.as_str()),
            transition.map(|t| t.to.as_str()),
            file_change.map(|c| c.path()),
            file_change.map(|c| c.action()),
            file_from_zone,
            file_to_zone,
            now.to_rfc3339(),
        ),
    )?;

    Ok(LedgerEntry {
        id,
        feature_id: feature_id.to_string(),
        sequence,
        author: entry.author.clone(),
        note: entry.note.clone(),
        pattern_ref: entry.pattern_ref.clone(),
        architecture_ref: entry.architecture_ref.clone(),
        transition,
        file_change: file_change.cloned(),
        created_at: now,
    })
}

fn entries_for(conn: &Connection, feature_id: &str) -> Result<Vec<LedgerEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM ledger_entries WHERE feature_id = ? ORDER BY sequence",
        ENTRY_COLUMNS
    ))?;
    let raws = stmt
        .query_map([feature_id], RawEntry::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    raws.into_iter().map(RawEntry::into_entry).collect()
}
