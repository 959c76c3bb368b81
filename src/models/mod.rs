//! Domain models for GridWrinkl.
//!
//! # Core Concepts
//!
//! - [`Zone`]: the closed set of workflow buckets a file can sit in.
//! - [`FileRecord`]: a tracked file, its zone, its optional feature and pin.
//! - [`Feature`]: a unit of work whose [`FeatureStatus`] only moves forward.
//! - [`LedgerEntry`]: an immutable record appended to a feature's ledger.
//! - [`ContextSnapshot`]: what the context exporter hands to an assistant.

mod feature;
mod file;
mod ledger;
mod snapshot;
mod zone;

pub use feature::*;
pub use file::*;
pub use ledger::*;
pub use snapshot::*;
pub use zone::*;
