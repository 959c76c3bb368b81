//! Zone registry: which zone each tracked file is in.
//!
//! Every write is a single statement or a short immediate transaction, so a
//! reader never observes a half-applied assignment. Writes to the same path
//! serialize on the store's write lock and the last writer wins.
//!
//! Associating a file with a feature, dropping the association and moving a
//! feature's file are also recorded in that feature's ledger, in the same
//! transaction as the record update.

use std::collections::VecDeque;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::db::{parse_column, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::ledger::record_file_change;
use crate::models::{Author, FeatureStatus, FileChange, FileRecord, Zone};
use crate::reorganize::target_zone;

const PAGE_SIZE: usize = 256;

const RECORD_COLUMNS: &str = "path, zone, feature_id, pinned, last_modified";

const DEFAULT_AUTHOR: &str = "unknown";

#[derive(Clone)]
pub struct ZoneRegistry {
    db: Database,
    author: Author,
}

impl ZoneRegistry {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            author: Author::human(DEFAULT_AUTHOR),
        }
    }

    /// Author recorded on the ledger entries this registry writes.
    pub fn with_author(mut self, author: Author) -> Self {
        self.author = author;
        self
    }

    /// Set or overwrite the zone for `path`, tracking it if it is new.
    ///
    /// A manual assignment keeps the record's pin and feature association.
    pub fn assign(&self, path: &str, zone: Zone) -> Result<FileRecord> {
        let path = normalize_path(path)?;
        let now = Utc::now().to_rfc3339();

        let record = self.db.with_conn(|conn| {
            let raw = conn.query_row(
                &format!(
                    "INSERT INTO file_records (path, zone, feature_id, pinned, last_modified)
                     VALUES (?1, ?2, NULL, 0, ?3)
                     ON CONFLICT(path) DO UPDATE SET
                        zone = excluded.zone,
                        last_modified = excluded.last_modified
                     RETURNING {}",
                    RECORD_COLUMNS
                ),
                (&path, zone.as_str(), &now),
                RawRecord::from_row,
            )?;
            raw.into_record()
        })?;

        tracing::debug!("Assigned {} to {}", record.path, zone);
        Ok(record)
    }

    /// Same as [`assign`](Self::assign), taking the zone by name.
    pub fn assign_named(&self, path: &str, zone: &str) -> Result<FileRecord> {
        let zone: Zone = zone.parse()?;
        self.assign(path, zone)
    }

    pub fn zone_of(&self, path: &str) -> Result<Option<Zone>> {
        Ok(self.get(path)?.map(|record| record.zone))
    }

    pub fn get(&self, path: &str) -> Result<Option<FileRecord>> {
        let path = normalize_path(path)?;
        self.db.with_conn(|conn| get_record(conn, &path))
    }

    /// Paths currently in `zone`, ordered by path.
    ///
    /// Nothing is read until the listing is iterated. Each call to
    /// [`ZoneListing::iter`] starts again from the first path.
    pub fn list_by_zone(&self, zone: Zone) -> ZoneListing {
        ZoneListing {
            db: self.db.clone(),
            zone,
            page_size: PAGE_SIZE,
        }
    }

    /// Track `path`, optionally associating it with a feature.
    ///
    /// The zone follows the feature's status (or `resources` without a
    /// feature). A pinned record keeps its zone; only the association changes.
    /// A changed association is recorded in the ledgers of the features the
    /// file left and joined.
    pub fn track(&self, path: &str, feature_id: Option<&str>) -> Result<FileRecord> {
        let path = normalize_path(path)?;
        let now = Utc::now().to_rfc3339();

        let record = self.db.with_transaction(|tx| {
            let previous = get_record(tx, &path)?.and_then(|record| record.feature_id);
            let status = match feature_id {
                Some(id) => Some(feature_status(tx, id)?),
                None => None,
            };
            let derived = target_zone(status);

            let raw = tx.query_row(
                &format!(
                    "INSERT INTO file_records (path, zone, feature_id, pinned, last_modified)
                     VALUES (?1, ?2, ?3, 0, ?4)
                     ON CONFLICT(path) DO UPDATE SET
                        zone = CASE WHEN file_records.pinned = 1
                                    THEN file_records.zone
                                    ELSE excluded.zone END,
                        feature_id = excluded.feature_id,
                        last_modified = excluded.last_modified
                     RETURNING {}",
                    RECORD_COLUMNS
                ),
                (&path, derived.as_str(), feature_id, &now),
                RawRecord::from_row,
            )?;
            let record = raw.into_record()?;

            if previous.as_deref() != feature_id {
                if let Some(old) = previous.as_deref() {
                    let change = FileChange::Detached {
                        path: record.path.clone(),
                        zone: record.zone,
                    };
                    record_file_change(tx, old, &self.author, &change)?;
                }
                if let Some(new) = feature_id {
                    let change = FileChange::Associated {
                        path: record.path.clone(),
                        zone: record.zone,
                    };
                    record_file_change(tx, new, &self.author, &change)?;
                }
            }
            Ok(record)
        })?;

        tracing::info!(
            "Tracking {} in {} (feature: {})",
            record.path,
            record.zone,
            record.feature_id.as_deref().unwrap_or("none")
        );
        Ok(record)
    }

    /// Drop the feature association. An unpinned file falls back to `resources`.
    pub fn detach(&self, path: &str) -> Result<FileRecord> {
        let path = normalize_path(path)?;
        let now = Utc::now().to_rfc3339();

        self.db.with_transaction(|tx| {
            let existing =
                get_record(tx, &path)?.ok_or_else(|| Error::UnknownFile(path.clone()))?;
            tx.execute(
                "UPDATE file_records SET
                    feature_id = NULL,
                    zone = CASE WHEN pinned = 1 THEN zone ELSE ?2 END,
                    last_modified = ?3
                 WHERE path = ?1",
                (&path, target_zone(None).as_str(), &now),
            )?;
            let record =
                get_record(tx, &path)?.ok_or_else(|| Error::UnknownFile(path.clone()))?;

            if let Some(old) = existing.feature_id.as_deref() {
                let change = FileChange::Detached {
                    path: record.path.clone(),
                    zone: record.zone,
                };
                record_file_change(tx, old, &self.author, &change)?;
            }
            Ok(record)
        })
    }

    /// Put `path` in `zone` and keep it there regardless of feature status.
    pub fn pin(&self, path: &str, zone: Zone) -> Result<FileRecord> {
        self.update_existing(
            path,
            "UPDATE file_records SET zone = ?2, pinned = 1, last_modified = ?3 WHERE path = ?1",
            zone,
        )
    }

    /// Release a manual override and re-derive the zone from the feature.
    pub fn unpin(&self, path: &str) -> Result<FileRecord> {
        let path = normalize_path(path)?;
        let now = Utc::now().to_rfc3339();

        self.db.with_transaction(|tx| {
            let existing =
                get_record(tx, &path)?.ok_or_else(|| Error::UnknownFile(path.clone()))?;
            let status = match existing.feature_id.as_deref() {
                Some(id) => Some(feature_status(tx, id)?),
                None => None,
            };
            let derived = target_zone(status);

            tx.execute(
                "UPDATE file_records SET zone = ?2, pinned = 0, last_modified = ?3 WHERE path = ?1",
                (&path, derived.as_str(), &now),
            )?;
            get_record(tx, &path)?.ok_or_else(|| Error::UnknownFile(path.clone()))
        })
    }

    /// Move an unpinned file whose zone is still `expected` to `zone`, and
    /// record the move in its feature's ledger.
    ///
    /// Returns `false` without writing when the record is pinned, gone, or no
    /// longer in `expected`.
    pub fn reassign_if_unpinned(&self, path: &str, expected: Zone, zone: Zone) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        self.db.with_transaction(|tx| {
            let rows = tx.execute(
                "UPDATE file_records SET zone = ?3, last_modified = ?4
                 WHERE path = ?1 AND zone = ?2 AND pinned = 0",
                (path, expected.as_str(), zone.as_str(), &now),
            )?;
            if rows == 0 {
                return Ok(false);
            }

            let feature_id: Option<String> = tx.query_row(
                "SELECT feature_id FROM file_records WHERE path = ?",
                [path],
                |row| row.get(0),
            )?;
            if let Some(feature_id) = feature_id {
                let change = FileChange::Moved {
                    path: path.to_string(),
                    from: expected,
                    to: zone,
                };
                record_file_change(tx, &feature_id, &self.author, &change)?;
            }
            Ok(true)
        })
    }

    /// Track `path` at `resources` unless it is already tracked.
    ///
    /// Returns whether a new record was created.
    pub fn register_untracked(&self, path: &str) -> Result<bool> {
        let path = normalize_path(path)?;
        let now = Utc::now().to_rfc3339();
        let rows = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "INSERT OR IGNORE INTO file_records (path, zone, feature_id, pinned, last_modified)
                 VALUES (?1, ?2, NULL, 0, ?3)",
                (&path, target_zone(None).as_str(), &now),
            )?)
        })?;
        Ok(rows > 0)
    }

    pub fn files_for_feature(&self, feature_id: &str) -> Result<Vec<FileRecord>> {
        self.db.with_conn(|conn| {
            query_records(
                conn,
                &format!(
                    "SELECT {} FROM file_records WHERE feature_id = ? ORDER BY path",
                    RECORD_COLUMNS
                ),
                [feature_id],
            )
        })
    }

    pub fn all_files(&self) -> Result<Vec<FileRecord>> {
        self.db.with_conn(|conn| {
            query_records(
                conn,
                &format!("SELECT {} FROM file_records ORDER BY path", RECORD_COLUMNS),
                [],
            )
        })
    }

    /// Number of tracked files per zone, in zone order.
    pub fn counts(&self) -> Result<Vec<(Zone, usize)>> {
        self.db.with_conn(|conn| {
            let mut counts = Vec::with_capacity(Zone::ALL.len());
            for zone in Zone::ALL {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM file_records WHERE zone = ?",
                    [zone.as_str()],
                    |row| row.get(0),
                )?;
                counts.push((zone, count as usize));
            }
            Ok(counts)
        })
    }

    fn update_existing(&self, path: &str, sql: &str, zone: Zone) -> Result<FileRecord> {
        let path = normalize_path(path)?;
        let now = Utc::now().to_rfc3339();

        self.db.with_transaction(|tx| {
            let rows = tx.execute(sql, (&path, zone.as_str(), &now))?;
            if rows == 0 {
                return Err(Error::UnknownFile(path.clone()));
            }
            get_record(tx, &path)?.ok_or_else(|| Error::UnknownFile(path.clone()))
        })
    }
}

/// A lazy, restartable listing of the paths in one zone.
pub struct ZoneListing {
    db: Database,
    zone: Zone,
    page_size: usize,
}

impl ZoneListing {
    /// Read `page_size` paths per storage round trip.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn iter(&self) -> ZonePaths<'_> {
        ZonePaths {
            listing: self,
            buffer: VecDeque::new(),
            after: None,
            done: false,
        }
    }

    fn fetch_page(&self, after: Option<&str>) -> Result<Vec<String>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT path FROM file_records
                 WHERE zone = ?1 AND (?2 IS NULL OR path > ?2)
                 ORDER BY path LIMIT ?3",
            )?;
            let paths = stmt
                .query_map(
                    (self.zone.as_str(), after, self.page_size as i64),
                    |row| row.get(0),
                )?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(paths)
        })
    }
}

impl<'a> IntoIterator for &'a ZoneListing {
    type Item = Result<String>;
    type IntoIter = ZonePaths<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`ZoneListing`], fetching one page at a time.
///
/// Stops after yielding the first storage error.
pub struct ZonePaths<'a> {
    listing: &'a ZoneListing,
    buffer: VecDeque<String>,
    after: Option<String>,
    done: bool,
}

impl Iterator for ZonePaths<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            match self.listing.fetch_page(self.after.as_deref()) {
                Ok(page) => {
                    self.done = page.len() < self.listing.page_size;
                    self.after = page.last().cloned();
                    self.buffer.extend(page);
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

/// Normalize a project-relative path: forward slashes, no `.` or empty
/// segments.
pub fn normalize_path(path: &str) -> Result<String> {
    let normalized = path
        .trim()
        .replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/");

    if normalized.is_empty() {
        return Err(Error::InvalidPath(path.to_string()));
    }
    Ok(normalized)
}

struct RawRecord {
    path: String,
    zone: String,
    feature_id: Option<String>,
    pinned: i64,
    last_modified: String,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            path: row.get(0)?,
            zone: row.get(1)?,
            feature_id: row.get(2)?,
            pinned: row.get(3)?,
            last_modified: row.get(4)?,
        })
    }

    fn into_record(self) -> Result<FileRecord> {
        Ok(FileRecord {
            zone: parse_column("file_records.zone", &self.zone)?,
            last_modified: parse_datetime(&self.last_modified)?,
            path: self.path,
            feature_id: self.feature_id,
            pinned: self.pinned != 0,
        })
    }
}

fn get_record(conn: &Connection, path: &str) -> Result<Option<FileRecord>> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM file_records WHERE path = ?", RECORD_COLUMNS),
            [path],
            RawRecord::from_row,
        )
        .optional()?;
    raw.map(RawRecord::into_record).transpose()
}

fn query_records<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<FileRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let raws = stmt
        .query_map(params, RawRecord::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    raws.into_iter().map(RawRecord::into_record).collect()
}

fn feature_status(conn: &Connection, feature_id: &str) -> Result<FeatureStatus> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM features WHERE id = ?",
            [feature_id],
            |row| row.get(0),
        )
        .optional()?;
    match status {
        Some(s) => parse_column("features.status", &s),
        None => Err(Error::UnknownFeature(feature_id.to_string())),
    }
}
