use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ledger::LedgerEntry;
use crate::error::Error;

/// A unit of work with its own status and ledger.
///
/// Features are never deleted. Once finished they are transitioned to
/// `Archived` and remain available as history for assistants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feature {
    /// Slug-form identifier, unique across the project.
    pub id: String,
    pub description: String,
    pub status: FeatureStatus,
    /// Ledger entries in append order.
    pub entries: Vec<LedgerEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The lifecycle status of a feature.
///
/// Statuses only move forward, one step at a time:
/// `Proposed → InProgress → Complete → Archived`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    Proposed,
    InProgress,
    Complete,
    Archived,
}

impl FeatureStatus {
    pub const ALL: [FeatureStatus; 4] = [
        FeatureStatus::Proposed,
        FeatureStatus::InProgress,
        FeatureStatus::Complete,
        FeatureStatus::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::Archived => "archived",
        }
    }

    /// The only status this one may transition to, if any.
    pub fn successor(&self) -> Option<Self> {
        match self {
            Self::Proposed => Some(Self::InProgress),
            Self::InProgress => Some(Self::Complete),
            Self::Complete => Some(Self::Archived),
            Self::Archived => None,
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        self.successor() == Some(next)
    }
}

impl fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "proposed" => Ok(Self::Proposed),
            "in_progress" => Ok(Self::InProgress),
            "complete" => Ok(Self::Complete),
            "archived" => Ok(Self::Archived),
            _ => Err(Error::InvalidStatus(s.to_string())),
        }
    }
}

/// Check that `id` is in slug form: lowercase ASCII letters, digits, `-` and
/// `_`, starting with a letter or digit.
pub fn validate_feature_id(id: &str) -> Result<(), Error> {
    let mut chars = id.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let valid_rest =
        chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');

    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(Error::InvalidFeatureId(id.to_string()))
    }
}

/// Turn a user-supplied feature name into slug form.
///
/// Lowercases and collapses runs of whitespace into a single `-`. The result
/// still has to pass [`validate_feature_id`].
pub fn normalize_feature_name(name: &str) -> String {
    name.split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successor_chain() {
        assert_eq!(
            FeatureStatus::Proposed.successor(),
            Some(FeatureStatus::InProgress)
        );
        assert_eq!(
            FeatureStatus::InProgress.successor(),
            Some(FeatureStatus::Complete)
        );
        assert_eq!(
            FeatureStatus::Complete.successor(),
            Some(FeatureStatus::Archived)
        );
        assert_eq!(FeatureStatus::Archived.successor(), None);
    }

    #[test]
    fn test_no_transition_to_earlier_or_same_status() {
        for from in FeatureStatus::ALL {
            for to in FeatureStatus::ALL {
                if to <= from {
                    assert!(!from.can_transition_to(to), "{} -> {}", from, to);
                }
            }
        }
    }

    #[test]
    fn test_no_skipping_forward() {
        assert!(!FeatureStatus::Proposed.can_transition_to(FeatureStatus::Complete));
        assert!(!FeatureStatus::Proposed.can_transition_to(FeatureStatus::Archived));
        assert!(!FeatureStatus::InProgress.can_transition_to(FeatureStatus::Archived));
    }

    #[test]
    fn test_status_parsing_accepts_dashes() {
        assert_eq!(
            "in-progress".parse::<FeatureStatus>().unwrap(),
            FeatureStatus::InProgress
        );
        assert!(matches!(
            "done".parse::<FeatureStatus>(),
            Err(Error::InvalidStatus(_))
        ));
    }

    #[test]
    fn test_feature_id_validation() {
        assert!(validate_feature_id("login").is_ok());
        assert!(validate_feature_id("user_auth-2").is_ok());
        assert!(validate_feature_id("2fa").is_ok());
        assert!(validate_feature_id("").is_err());
        assert!(validate_feature_id("-login").is_err());
        assert!(validate_feature_id("Login").is_err());
        assert!(validate_feature_id("user auth").is_err());
        assert!(validate_feature_id("auth/login").is_err());
    }

    #[test]
    fn test_normalize_feature_name() {
        assert_eq!(normalize_feature_name("User  Auth"), "user-auth");
        assert_eq!(normalize_feature_name("  login "), "login");
        assert_eq!(normalize_feature_name("user_auth"), "user_auth");
    }
}
