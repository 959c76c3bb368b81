//! Text rendering for zones and snapshots.

use crate::models::{ContextSnapshot, FeatureStatus, FileRecord, Zone, ZoneMembership};

const PROPOSED: char = '◇';
const IN_PROGRESS: char = '○';
const COMPLETE: char = '●';
const ARCHIVED: char = '✗';

/// Get the status symbol for a feature status.
pub fn status_symbol(status: FeatureStatus) -> char {
    match status {
        FeatureStatus::Proposed => PROPOSED,
        FeatureStatus::InProgress => IN_PROGRESS,
        FeatureStatus::Complete => COMPLETE,
        FeatureStatus::Archived => ARCHIVED,
    }
}

/// Render tracked files grouped by zone, with their feature and pin.
///
/// Example output:
/// ```text
/// active (2)
/// ├── src/auth/login.rs [login]
/// └── src/auth/session.rs [login]
/// resources (1)
/// └── README.md (pinned)
/// archive (0)
/// ```
pub fn render_zone_tree(records: &[FileRecord]) -> String {
    let mut output = String::new();
    for zone in Zone::ALL {
        let labels: Vec<String> = records
            .iter()
            .filter(|record| record.zone == zone)
            .map(record_label)
            .collect();
        render_zone(&mut output, zone, &labels);
    }
    output
}

/// Render zone membership as it appears in a snapshot.
pub fn render_membership(zones: &ZoneMembership) -> String {
    let mut output = String::new();
    for zone in Zone::ALL {
        render_zone(&mut output, zone, zones.paths(zone));
    }
    output
}

/// Render a snapshot as markdown for an AI assistant.
pub fn render_markdown(snapshot: &ContextSnapshot) -> String {
    let mut output = format!("# {}\n\n", snapshot.project);
    output.push_str(&format!(
        "_Context snapshot generated {}_\n\n",
        snapshot.generated_at.format("%Y-%m-%d %H:%M UTC")
    ));

    output.push_str("## Features\n\n");
    if snapshot.features.is_empty() {
        output.push_str("No features are tracked yet.\n\n");
    }
    for status in FeatureStatus::ALL {
        let features: Vec<_> = snapshot
            .features
            .iter()
            .filter(|f| f.status == status)
            .collect();
        if features.is_empty() {
            continue;
        }

        output.push_str(&format!("### {} {}\n\n", status_symbol(status), status));
        for feature in features {
            output.push_str(&format!("- **{}**: {}\n", feature.id, feature.description));
            let hidden = feature
                .entry_count
                .saturating_sub(feature.recent_entries.len());
            if hidden > 0 {
                output.push_str(&format!("  - _{} earlier entries omitted_\n", hidden));
            }
            for entry in &feature.recent_entries {
                output.push_str(&format!(
                    "  - {} {}: {}\n",
                    entry.created_at.format("%Y-%m-%d"),
                    entry.author,
                    entry.note
                ));
                if let Some(pattern) = &entry.pattern_ref {
                    output.push_str(&format!("    - pattern: {}\n", pattern));
                }
                if let Some(architecture) = &entry.architecture_ref {
                    output.push_str(&format!("    - architecture: {}\n", architecture));
                }
            }
        }
        output.push('\n');
    }

    output.push_str("## Zones\n\n```text\n");
    output.push_str(&render_membership(&snapshot.zones));
    output.push_str("```\n");
    output
}

fn record_label(record: &FileRecord) -> String {
    let mut label = record.path.clone();
    if let Some(feature) = &record.feature_id {
        label.push_str(&format!(" [{}]", feature));
    }
    if record.pinned {
        label.push_str(" (pinned)");
    }
    label
}

fn render_zone(output: &mut String, zone: Zone, items: &[String]) {
    output.push_str(&format!("{} ({})\n", zone, items.len()));
    for (i, item) in items.iter().enumerate() {
        let branch = if i == items.len() - 1 {
            "└── "
        } else {
            "├── "
        };
        output.push_str(branch);
        output.push_str(item);
        output.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Author, FeatureContext, LedgerEntry, SNAPSHOT_FORMAT_VERSION};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn make_record(path: &str, zone: Zone, feature: Option<&str>, pinned: bool) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            zone,
            feature_id: feature.map(str::to_string),
            pinned,
            last_modified: Utc::now(),
        }
    }

    #[test]
    fn test_empty_zones() {
        let output = render_zone_tree(&[]);
        assert_eq!(output, "active (0)\nresources (0)\narchive (0)\n");
    }

    #[test]
    fn test_zone_tree_with_labels() {
        let records = vec![
            make_record("src/login.rs", Zone::Active, Some("login"), false),
            make_record("src/session.rs", Zone::Active, Some("login"), false),
            make_record("README.md", Zone::Resources, None, true),
        ];
        let output = render_zone_tree(&records);
        assert_eq!(
            output,
            "active (2)\n├── src/login.rs [login]\n└── src/session.rs [login]\nresources (1)\n└── README.md (pinned)\narchive (0)\n"
        );
    }

    #[test]
    fn test_markdown_groups_features_by_status() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            feature_id: "login".to_string(),
            sequence: 2,
            author: Author::assistant("claude"),
            note: "Added password hashing".to_string(),
            pattern_ref: Some("patterns/hashing.md".to_string()),
            architecture_ref: None,
            transition: None,
            file_change: None,
            created_at: at,
        };
        let snapshot = ContextSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            project: "Demo".to_string(),
            generated_at: at,
            features: vec![FeatureContext {
                id: "login".to_string(),
                description: "user auth".to_string(),
                status: FeatureStatus::InProgress,
                entry_count: 2,
                recent_entries: vec![entry],
            }],
            zones: ZoneMembership {
                active: vec!["src/login.rs".to_string()],
                ..Default::default()
            },
        };

        let output = render_markdown(&snapshot);
        assert!(output.starts_with("# Demo\n"));
        assert!(output.contains("### ○ in_progress"));
        assert!(output.contains("- **login**: user auth"));
        assert!(output.contains("_1 earlier entries omitted_"));
        assert!(output.contains("2024-03-01 claude (assistant): Added password hashing"));
        assert!(output.contains("pattern: patterns/hashing.md"));
        assert!(output.contains("active (1)\n└── src/login.rs\n"));
        assert!(!output.contains("### ◇ proposed"));
    }
}
