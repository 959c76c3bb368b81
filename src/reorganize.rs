//! Reorganizer: reconcile file zones with feature status.
//!
//! A run looks at features whose status changed since the last completed run,
//! derives the target zone of each associated file and moves the files that
//! are elsewhere. The checkpoint is written only after the whole batch has
//! been applied, so an interrupted run is simply redone next time; applying a
//! move twice is harmless because a file already in its target zone is left
//! alone.
//!
//! Every applied move of a feature's file is recorded in that feature's
//! ledger, so what a batch changed can be read back later.

use serde::Serialize;

use crate::db::{parse_column, Database};
use crate::error::Result;
use crate::ledger::LedgerStore;
use crate::models::{Author, FeatureStatus, FileRecord, Zone};
use crate::registry::ZoneRegistry;

const CHECKPOINT_KEY: &str = "reorganizer.checkpoint";

/// The zone a file belongs in, given its feature's status.
///
/// Files with no feature belong in `resources`.
pub fn target_zone(status: Option<FeatureStatus>) -> Zone {
    match status {
        Some(FeatureStatus::Proposed | FeatureStatus::InProgress) => Zone::Active,
        Some(FeatureStatus::Complete | FeatureStatus::Archived) => Zone::Archive,
        None => Zone::Resources,
    }
}

/// A single zone change derived by the reorganizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneMove {
    pub path: String,
    pub feature_id: Option<String>,
    pub from: Zone,
    pub to: Zone,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReorganizeReport {
    /// Whether the moves were applied, as opposed to only planned.
    pub applied: bool,
    /// Features whose files were examined.
    pub features_examined: usize,
    /// Moves that were (or, for a dry run, would be) applied.
    pub moves: Vec<ZoneMove>,
    /// Files left in place because they are pinned.
    pub pinned_skipped: usize,
}

impl ReorganizeReport {
    pub fn is_noop(&self) -> bool {
        self.moves.is_empty()
    }
}

pub struct Reorganizer {
    db: Database,
    ledger: LedgerStore,
    registry: ZoneRegistry,
}

impl Reorganizer {
    pub fn new(db: Database) -> Self {
        Self {
            ledger: LedgerStore::new(db.clone()),
            registry: ZoneRegistry::new(db.clone()),
            db,
        }
    }

    /// Author recorded on the ledger entries for applied moves.
    pub fn with_author(mut self, author: Author) -> Self {
        self.registry = self.registry.with_author(author);
        self
    }

    /// Reconcile the files of every feature whose status changed since the
    /// last run.
    pub fn run(&self) -> Result<ReorganizeReport> {
        self.execute(false, true)
    }

    /// Reconcile every tracked file, unassociated ones included.
    pub fn run_full(&self) -> Result<ReorganizeReport> {
        self.execute(true, true)
    }

    /// Compute the moves a run would make without applying them.
    pub fn plan(&self, full: bool) -> Result<ReorganizeReport> {
        self.execute(full, false)
    }

    fn execute(&self, full: bool, apply: bool) -> Result<ReorganizeReport> {
        let checkpoint = self.checkpoint()?;
        let changed = self
            .ledger
            .status_changes_since(if full { 0 } else { checkpoint })?;
        let high_water = changed
            .iter()
            .map(|mark| mark.status_seq)
            .max()
            .unwrap_or(checkpoint)
            .max(checkpoint);

        let mut report = ReorganizeReport {
            applied: apply,
            features_examined: changed.len(),
            ..Default::default()
        };

        for mark in &changed {
            let target = target_zone(Some(mark.status));
            let files = self.registry.files_for_feature(&mark.feature_id)?;
            self.reconcile(&files, target, apply, &mut report)?;
        }

        if full {
            let unassociated: Vec<FileRecord> = self
                .registry
                .all_files()?
                .into_iter()
                .filter(|record| record.feature_id.is_none())
                .collect();
            self.reconcile(&unassociated, target_zone(None), apply, &mut report)?;
        }

        if apply {
            if high_water > checkpoint {
                self.db
                    .set_meta(CHECKPOINT_KEY, &high_water.to_string())?;
            }
            tracing::info!(
                "Reorganized {} feature(s): {} move(s), {} pinned file(s) skipped",
                report.features_examined,
                report.moves.len(),
                report.pinned_skipped
            );
        }

        Ok(report)
    }

    fn reconcile(
        &self,
        files: &[FileRecord],
        target: Zone,
        apply: bool,
        report: &mut ReorganizeReport,
    ) -> Result<()> {
        for record in files {
            if record.pinned {
                if record.zone != target {
                    tracing::debug!("Skipping pinned {} in {}", record.path, record.zone);
                }
                report.pinned_skipped += 1;
                continue;
            }
            if record.zone == target {
                continue;
            }

            // The record may have been pinned or moved since it was read.
            if apply
                && !self
                    .registry
                    .reassign_if_unpinned(&record.path, record.zone, target)?
            {
                continue;
            }

            tracing::debug!("Moving {} from {} to {}", record.path, record.zone, target);
            report.moves.push(ZoneMove {
                path: record.path.clone(),
                feature_id: record.feature_id.clone(),
                from: record.zone,
                to: target,
            });
        }
        Ok(())
    }

    fn checkpoint(&self) -> Result<i64> {
        match self.db.get_meta(CHECKPOINT_KEY)? {
            Some(value) => parse_column(CHECKPOINT_KEY, &value),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_zone_by_status() {
        assert_eq!(target_zone(Some(FeatureStatus::Proposed)), Zone::Active);
        assert_eq!(target_zone(Some(FeatureStatus::InProgress)), Zone::Active);
        assert_eq!(target_zone(Some(FeatureStatus::Complete)), Zone::Archive);
        assert_eq!(target_zone(Some(FeatureStatus::Archived)), Zone::Archive);
        assert_eq!(target_zone(None), Zone::Resources);
    }

    #[test]
    fn test_corrupt_checkpoint_is_storage_error() {
        let db = Database::open_memory().unwrap();
        db.migrate().unwrap();
        db.set_meta(CHECKPOINT_KEY, "garbage").unwrap();

        let reorganizer = Reorganizer::new(db.clone());
        assert!(matches!(
            reorganizer.run(),
            Err(crate::Error::StorageUnavailable(_))
        ));
        assert!(matches!(
            reorganizer.plan(false),
            Err(crate::Error::StorageUnavailable(_))
        ));
        assert_eq!(db.get_meta(CHECKPOINT_KEY).unwrap(), Some("garbage".to_string()));
    }

    #[test]
    fn test_missing_checkpoint_starts_from_zero() {
        let db = Database::open_memory().unwrap();
        db.migrate().unwrap();

        let report = Reorganizer::new(db).plan(false).unwrap();
        assert!(!report.applied);
        assert_eq!(report.features_examined, 0);
    }
}
