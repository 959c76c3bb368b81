//! Command-line interface.
//!
//! Commands map one-to-one onto the zone registry, ledger store, reorganizer
//! and context exporter of an opened [`Workspace`]. Output goes to the writer
//! passed to [`run`]; errors are returned to the caller for reporting.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::Result;
use crate::export::{render_markdown, render_zone_tree, status_symbol};
use crate::models::*;
use crate::workspace::Workspace;

#[derive(Debug, Parser)]
#[command(name = "gridwrinkl", version)]
#[command(about = "Zone-based file organization and feature ledgers for AI-assisted development")]
pub struct Cli {
    /// Project root
    #[arg(
        id = "project_root",
        short = 'p',
        long = "path",
        value_name = "DIR",
        global = true,
        default_value = "."
    )]
    pub root: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Initialize zone and ledger storage for a project
    Init {
        /// Project name
        project_name: String,

        /// Rewrite the configuration of an initialized project
        #[arg(short, long)]
        force: bool,

        /// Don't register existing project files
        #[arg(long)]
        no_scan: bool,
    },
    /// Manage features and their ledgers
    Feature {
        #[command(subcommand)]
        command: FeatureCommand,
    },
    /// Manage tracked files
    File {
        #[command(subcommand)]
        command: FileCommand,
    },
    /// Zone layout operations
    Grid {
        #[command(subcommand)]
        command: GridCommand,
    },
    /// Export context for AI assistants
    Context {
        #[command(subcommand)]
        command: ContextCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum FeatureCommand {
    /// Create a feature in status 'proposed'
    Create {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// List features
    List {
        /// Only features in this status
        #[arg(short, long)]
        status: Option<String>,
        /// Include archived features
        #[arg(short, long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show a feature and its full ledger
    Show {
        name: String,
        #[arg(long)]
        json: bool,
    },
    /// Append a note to a feature's ledger
    Note {
        name: String,
        text: String,
        /// Author name (defaults to GRIDWRINKL_AUTHOR, config, then USER)
        #[arg(long)]
        author: Option<String>,
        /// Record the entry as written by an assistant
        #[arg(long)]
        assistant: bool,
        /// Coding pattern reference
        #[arg(long)]
        pattern: Option<String>,
        /// Architecture decision reference
        #[arg(long)]
        architecture: Option<String>,
    },
    /// Move a feature to its next status
    Transition { name: String, status: String },
    /// Shorthand for 'transition <name> in_progress'
    Start { name: String },
    /// Shorthand for 'transition <name> complete'
    Complete { name: String },
    /// Shorthand for 'transition <name> archived'
    Archive { name: String },
}

#[derive(Debug, Subcommand)]
pub enum FileCommand {
    /// Track a file, optionally associating it with a feature
    Track {
        path: String,
        #[arg(short, long)]
        feature: Option<String>,
    },
    /// Remove a file's feature association
    Detach { path: String },
    /// Assign a file to a zone
    Assign { path: String, zone: String },
    /// Pin a file to a zone so the reorganizer leaves it alone
    Pin { path: String, zone: String },
    /// Release a pin and re-derive the zone
    Unpin { path: String },
    /// Print a file's zone
    Zone { path: String },
    /// List tracked files
    List {
        #[arg(short, long)]
        zone: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum GridCommand {
    /// Reconcile file zones with feature status
    Reorganize {
        /// Reconcile every tracked file, not only those of changed features
        #[arg(long)]
        full: bool,
        /// Print the moves without applying them
        #[arg(long)]
        dry_run: bool,
    },
    /// Register untracked project files in 'resources'
    Scan,
    /// Print files grouped by zone
    Show,
}

#[derive(Debug, Subcommand)]
pub enum ContextCommand {
    /// Write a JSON context snapshot
    Snapshot {
        #[arg(short, long)]
        name: Option<String>,
        /// Ledger entries per feature
        #[arg(short, long)]
        entries: Option<usize>,
    },
    /// Write the current context into configured assistant instruction files
    Sync,
    /// Print the current context as markdown
    Show {
        #[arg(short, long)]
        entries: Option<usize>,
    },
}

pub fn run(cli: Cli, out: &mut dyn Write) -> Result<()> {
    match cli.command {
        Commands::Init {
            project_name,
            force,
            no_scan,
        } => {
            let workspace = Workspace::init(&cli.root, &project_name, force)?;
            writeln!(
                out,
                "Initialized '{}' in {}",
                workspace.config().project_name,
                workspace.root().display()
            )?;
            if !no_scan {
                let report = workspace.scan()?;
                writeln!(
                    out,
                    "Registered {} of {} file(s) in resources",
                    report.registered, report.discovered
                )?;
            }
            Ok(())
        }
        Commands::Feature { command } => {
            let workspace = Workspace::open(&cli.root)?;
            run_feature(&workspace, command, out)
        }
        Commands::File { command } => {
            let workspace = Workspace::open(&cli.root)?;
            run_file(&workspace, command, out)
        }
        Commands::Grid { command } => {
            let workspace = Workspace::open(&cli.root)?;
            run_grid(&workspace, command, out)
        }
        Commands::Context { command } => {
            let workspace = Workspace::open(&cli.root)?;
            run_context(&workspace, command, out)
        }
    }
}

fn run_feature(workspace: &Workspace, command: FeatureCommand, out: &mut dyn Write) -> Result<()> {
    let ledger = workspace.ledger();

    match command {
        FeatureCommand::Create { name, description } => {
            let feature = ledger.create_feature(&normalize_feature_name(&name), &description)?;
            writeln!(out, "Created feature '{}' ({})", feature.id, feature.status)?;
        }
        FeatureCommand::List { status, all, json } => {
            let status = status.map(|s| s.parse::<FeatureStatus>()).transpose()?;
            let listing = ledger.list_features(status);
            let mut features = Vec::new();
            for feature in &listing {
                let feature = feature?;
                if status.is_none() && !all && feature.status == FeatureStatus::Archived {
                    continue;
                }
                features.push(feature);
            }

            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&features)?)?;
            } else if features.is_empty() {
                writeln!(out, "No features.")?;
            } else {
                for feature in &features {
                    writeln!(
                        out,
                        "{} {:<24} {:<12} {}",
                        status_symbol(feature.status),
                        feature.id,
                        feature.status,
                        feature.description
                    )?;
                }
            }
        }
        FeatureCommand::Show { name, json } => {
            let id = normalize_feature_name(&name);
            let feature = ledger
                .get_feature(&id)?
                .ok_or(crate::Error::UnknownFeature(id.clone()))?;
            let files = workspace.registry().files_for_feature(&id)?;

            if json {
                let value = serde_json::json!({ "feature": feature, "files": files });
                writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
            } else {
                write_feature(out, &feature, &files)?;
            }
        }
        FeatureCommand::Note {
            name,
            text,
            author,
            assistant,
            pattern,
            architecture,
        } => {
            let mut writer = workspace.author(assistant);
            if let Some(author) = author {
                writer.name = author;
            }
            let entry = ledger.append_entry(
                &normalize_feature_name(&name),
                NewLedgerEntry {
                    author: writer,
                    note: text,
                    pattern_ref: pattern,
                    architecture_ref: architecture,
                },
            )?;
            writeln!(out, "Appended entry #{} to '{}'", entry.sequence, entry.feature_id)?;
        }
        FeatureCommand::Transition { name, status } => {
            transition(workspace, &name, status.parse()?, out)?;
        }
        FeatureCommand::Start { name } => {
            transition(workspace, &name, FeatureStatus::InProgress, out)?;
        }
        FeatureCommand::Complete { name } => {
            transition(workspace, &name, FeatureStatus::Complete, out)?;
        }
        FeatureCommand::Archive { name } => {
            transition(workspace, &name, FeatureStatus::Archived, out)?;
        }
    }
    Ok(())
}

fn transition(
    workspace: &Workspace,
    name: &str,
    status: FeatureStatus,
    out: &mut dyn Write,
) -> Result<()> {
    let feature = workspace.ledger().transition(
        &normalize_feature_name(name),
        status,
        &workspace.author(false),
    )?;
    writeln!(out, "Feature '{}' is now {}", feature.id, feature.status)?;
    writeln!(out, "Run 'gridwrinkl grid reorganize' to move its files.")?;
    Ok(())
}

fn write_feature(out: &mut dyn Write, feature: &Feature, files: &[FileRecord]) -> Result<()> {
    writeln!(
        out,
        "{} {} ({})",
        status_symbol(feature.status),
        feature.id,
        feature.status
    )?;
    if !feature.description.is_empty() {
        writeln!(out, "{}", feature.description)?;
    }

    writeln!(out, "\nLedger:")?;
    if feature.entries.is_empty() {
        writeln!(out, "  (empty)")?;
    }
    for entry in &feature.entries {
        writeln!(
            out,
            "  #{} {} {}: {}",
            entry.sequence,
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.author,
            entry.note
        )?;
        if let Some(pattern) = &entry.pattern_ref {
            writeln!(out, "     pattern: {}", pattern)?;
        }
        if let Some(architecture) = &entry.architecture_ref {
            writeln!(out, "     architecture: {}", architecture)?;
        }
    }

    writeln!(out, "\nFiles:")?;
    if files.is_empty() {
        writeln!(out, "  (none)")?;
    }
    for file in files {
        let pin = if file.pinned { " (pinned)" } else { "" };
        writeln!(out, "  {:<10} {}{}", file.zone, file.path, pin)?;
    }
    Ok(())
}

fn run_file(workspace: &Workspace, command: FileCommand, out: &mut dyn Write) -> Result<()> {
    let registry = workspace.registry();

    match command {
        FileCommand::Track { path, feature } => {
            let feature = feature.map(|f| normalize_feature_name(&f));
            let record = registry.track(&path, feature.as_deref())?;
            writeln!(out, "{} -> {}", record.path, record.zone)?;
        }
        FileCommand::Detach { path } => {
            let record = registry.detach(&path)?;
            writeln!(out, "{} -> {}", record.path, record.zone)?;
        }
        FileCommand::Assign { path, zone } => {
            let record = registry.assign_named(&path, &zone)?;
            writeln!(out, "{} -> {}", record.path, record.zone)?;
        }
        FileCommand::Pin { path, zone } => {
            let record = registry.pin(&path, zone.parse()?)?;
            writeln!(out, "{} pinned to {}", record.path, record.zone)?;
        }
        FileCommand::Unpin { path } => {
            let record = registry.unpin(&path)?;
            writeln!(out, "{} -> {}", record.path, record.zone)?;
        }
        FileCommand::Zone { path } => match registry.zone_of(&path)? {
            Some(zone) => writeln!(out, "{}", zone)?,
            None => return Err(crate::Error::UnknownFile(path)),
        },
        FileCommand::List { zone, json } => {
            let zone = zone.map(|z| z.parse::<Zone>()).transpose()?;
            let records: Vec<FileRecord> = registry
                .all_files()?
                .into_iter()
                .filter(|record| zone.map_or(true, |z| record.zone == z))
                .collect();

            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&records)?)?;
            } else {
                for record in &records {
                    let feature = record.feature_id.as_deref().unwrap_or("-");
                    let pin = if record.pinned { " (pinned)" } else { "" };
                    writeln!(
                        out,
                        "{:<10} {:<20} {}{}",
                        record.zone, feature, record.path, pin
                    )?;
                }
            }
        }
    }
    Ok(())
}

fn run_grid(workspace: &Workspace, command: GridCommand, out: &mut dyn Write) -> Result<()> {
    match command {
        GridCommand::Reorganize { full, dry_run } => {
            let reorganizer = workspace.reorganizer();
            let report = match (full, dry_run) {
                (_, true) => reorganizer.plan(full)?,
                (true, false) => reorganizer.run_full()?,
                (false, false) => reorganizer.run()?,
            };

            let verb = if dry_run { "would move" } else { "moved" };
            for change in &report.moves {
                writeln!(
                    out,
                    "{} {}: {} -> {}",
                    verb, change.path, change.from, change.to
                )?;
            }
            writeln!(
                out,
                "{} feature(s) examined, {} move(s), {} pinned file(s) skipped",
                report.features_examined,
                report.moves.len(),
                report.pinned_skipped
            )?;
            if report.applied && !report.is_noop() {
                let path = workspace.save_reorganize_report(&report)?;
                writeln!(out, "Report saved to {}", path.display())?;
            }
        }
        GridCommand::Scan => {
            let report = workspace.scan()?;
            writeln!(
                out,
                "Registered {} of {} file(s) in resources",
                report.registered, report.discovered
            )?;
        }
        GridCommand::Show => {
            let records = workspace.registry().all_files()?;
            write!(out, "{}", render_zone_tree(&records))?;
        }
    }
    Ok(())
}

fn run_context(workspace: &Workspace, command: ContextCommand, out: &mut dyn Write) -> Result<()> {
    let exporter = workspace.exporter();
    let default_entries = workspace.config().snapshot_entries;

    match command {
        ContextCommand::Snapshot { name, entries } => {
            let snapshot = exporter.snapshot(entries.unwrap_or(default_entries))?;
            let path =
                exporter.write_snapshot(&snapshot, &workspace.snapshot_dir(), name.as_deref())?;
            writeln!(out, "Wrote {}", path.display())?;
        }
        ContextCommand::Sync => {
            let snapshot = exporter.snapshot(default_entries)?;
            let written =
                exporter.sync_tools(&snapshot, workspace.root(), &workspace.config().ai_tools)?;
            if written.is_empty() {
                writeln!(out, "No AI tools configured.")?;
            }
            for path in written {
                writeln!(out, "Wrote {}", path.display())?;
            }
        }
        ContextCommand::Show { entries } => {
            let snapshot = exporter.snapshot(entries.unwrap_or(default_entries))?;
            write!(out, "{}", render_markdown(&snapshot))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_project_root_and_file_path_are_separate() {
        let cli = Cli::try_parse_from([
            "gridwrinkl",
            "--path",
            "/tmp/project",
            "file",
            "track",
            "src/user_authentication/models.py",
            "-f",
            "login",
        ])
        .unwrap();

        assert_eq!(cli.root, PathBuf::from("/tmp/project"));
        match cli.command {
            Commands::File {
                command: FileCommand::Track { path, feature },
            } => {
                assert_eq!(path, "src/user_authentication/models.py");
                assert_eq!(feature.as_deref(), Some("login"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_project_root_flag_is_global_with_default() {
        let cli = Cli::try_parse_from(["gridwrinkl", "file", "zone", "a.rs", "-p", "proj"]).unwrap();

        assert_eq!(cli.root, PathBuf::from("proj"));
        assert!(matches!(
            cli.command,
            Commands::File { command: FileCommand::Zone { ref path } } if path == "a.rs"
        ));

        let cli = Cli::try_parse_from(["gridwrinkl", "grid", "show"]).unwrap();
        assert_eq!(cli.root, PathBuf::from("."));
    }
}
