use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The coarse lifecycle bucket a tracked file belongs to.
///
/// - `Active`: work in progress
/// - `Resources`: supporting reference material
/// - `Archive`: completed work
///
/// The set is closed and ordered; zones carry no behavior of their own beyond
/// the reorganizer's mapping from feature status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Active,
    Resources,
    Archive,
}

impl Zone {
    pub const ALL: [Zone; 3] = [Zone::Active, Zone::Resources, Zone::Archive];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Resources => "resources",
            Self::Archive => "archive",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Zone {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "resources" => Ok(Self::Resources),
            "archive" => Ok(Self::Archive),
            _ => Err(Error::InvalidZone(s.to_string())),
        }
    }
}
