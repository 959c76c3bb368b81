//! GridWrinkl: zone-based file organization and feature ledgers for
//! AI-assisted development.
//!
//! Files are tracked in one of three [`Zone`](models::Zone)s. Work is tracked
//! as [`Feature`](models::Feature)s with append-only ledgers. The
//! [`Reorganizer`](reorganize::Reorganizer) moves files between zones as their
//! features progress, and the [`ContextExporter`](export::ContextExporter)
//! publishes snapshots for assistants.
//!
//! All components share one explicit [`Database`](db::Database), usually
//! obtained through a [`Workspace`](workspace::Workspace).

pub mod cli;
pub mod db;
pub mod error;
pub mod export;
pub mod ledger;
pub mod models;
pub mod registry;
pub mod reorganize;
pub mod workspace;

pub use error::{Error, Result};
