//! On-disk project layout and component wiring.
//!
//! A workspace lives in `.gridwrinkl/` under the project root:
//!
//! ```text
//! .gridwrinkl/
//! ├── config.json     project settings
//! ├── gridwrinkl.db   zones, features and ledgers
//! ├── reports/        applied reorganize batches
//! └── snapshots/      context snapshots for assistants
//! ```

mod config;
mod scan;

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::export::{write_atomic, ContextExporter};
use crate::ledger::LedgerStore;
use crate::models::Author;
use crate::registry::ZoneRegistry;
use crate::reorganize::{ReorganizeReport, Reorganizer};

pub use config::{ProjectConfig, AUTHOR_ENV};
pub use scan::{scan, ScanReport};

pub const STATE_DIR: &str = ".gridwrinkl";
const CONFIG_FILE: &str = "config.json";
const DATABASE_FILE: &str = "gridwrinkl.db";
const SNAPSHOT_DIR: &str = "snapshots";
const REPORT_DIR: &str = "reports";

/// An opened project: its root, settings and store.
pub struct Workspace {
    root: PathBuf,
    config: ProjectConfig,
    db: Database,
}

impl Workspace {
    /// Create the state directory, config and database under `root`.
    ///
    /// Fails with [`Error::AlreadyInitialized`] if a config exists, unless
    /// `force` is set, in which case the config is rewritten and the existing
    /// database is kept.
    pub fn init(root: &Path, project_name: &str, force: bool) -> Result<Self> {
        let project_name = project_name.trim();
        if project_name.is_empty() {
            return Err(Error::Config("project name is empty".to_string()));
        }

        let state_dir = root.join(STATE_DIR);
        let config_path = state_dir.join(CONFIG_FILE);
        if config_path.exists() && !force {
            return Err(Error::AlreadyInitialized(root.to_path_buf()));
        }

        std::fs::create_dir_all(state_dir.join(SNAPSHOT_DIR))?;
        let config = ProjectConfig::new(project_name);
        config.save(&config_path)?;

        let db = Database::open(&state_dir.join(DATABASE_FILE))?;
        db.migrate()?;

        tracing::info!("Initialized project '{}' at {}", project_name, root.display());

        Ok(Self {
            root: root.to_path_buf(),
            config,
            db,
        })
    }

    /// Open an initialized project, migrating its database if needed.
    pub fn open(root: &Path) -> Result<Self> {
        let state_dir = root.join(STATE_DIR);
        let config_path = state_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(Error::NotInitialized(root.to_path_buf()));
        }

        let config = ProjectConfig::load(&config_path)?;
        let db = Database::open(&state_dir.join(DATABASE_FILE))?;
        db.migrate()?;

        Ok(Self {
            root: root.to_path_buf(),
            config,
            db,
        })
    }

    pub fn is_initialized(root: &Path) -> bool {
        root.join(STATE_DIR).join(CONFIG_FILE).exists()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR).join(SNAPSHOT_DIR)
    }

    pub fn report_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR).join(REPORT_DIR)
    }

    pub fn registry(&self) -> ZoneRegistry {
        ZoneRegistry::new(self.db.clone()).with_author(self.author(false))
    }

    pub fn ledger(&self) -> LedgerStore {
        LedgerStore::new(self.db.clone())
    }

    pub fn reorganizer(&self) -> Reorganizer {
        Reorganizer::new(self.db.clone()).with_author(self.author(false))
    }

    pub fn exporter(&self) -> ContextExporter {
        ContextExporter::new(self.db.clone(), self.config.project_name.clone())
    }

    /// Keep the report of an applied reorganize batch as
    /// `reports/reorganize-<timestamp>.json`.
    pub fn save_reorganize_report(&self, report: &ReorganizeReport) -> Result<PathBuf> {
        let path = self.report_dir().join(format!(
            "reorganize-{}.json",
            Utc::now().format("%Y%m%d-%H%M%S-%6f")
        ));
        let json = serde_json::to_string_pretty(report)?;
        write_atomic(&path, json.as_bytes())?;

        tracing::info!("Saved reorganize report {}", path.display());
        Ok(path)
    }

    /// Register untracked project files in `resources`.
    pub fn scan(&self) -> Result<ScanReport> {
        scan(&self.root, &self.registry())
    }

    /// Default author for entries written from this process.
    pub fn author(&self, assistant: bool) -> Author {
        let name = self.config.author_name();
        if assistant {
            Author::assistant(name)
        } else {
            Author::human(name)
        }
    }
}
