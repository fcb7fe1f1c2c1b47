//! Backup domains: the independently-exportable slices of application state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::errors::BackupError;

/// One exportable slice of application state.
///
/// Used as a map key throughout the manifest, so it carries a total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupDomain {
    Topics,
    Groups,
    Tags,
    Knowledge,
    Preferences,
}

impl BackupDomain {
    /// Every known domain, in canonical export order.
    pub const ALL: [BackupDomain; 5] = [
        BackupDomain::Topics,
        BackupDomain::Groups,
        BackupDomain::Tags,
        BackupDomain::Knowledge,
        BackupDomain::Preferences,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackupDomain::Topics => "topics",
            BackupDomain::Groups => "groups",
            BackupDomain::Tags => "tags",
            BackupDomain::Knowledge => "knowledge",
            BackupDomain::Preferences => "preferences",
        }
    }

    /// Name of the per-domain subdirectory inside the work directory.
    pub fn dir_name(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for BackupDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupDomain {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "topics" => Ok(BackupDomain::Topics),
            "groups" => Ok(BackupDomain::Groups),
            "tags" => Ok(BackupDomain::Tags),
            "knowledge" => Ok(BackupDomain::Knowledge),
            "preferences" => Ok(BackupDomain::Preferences),
            other => Err(BackupError::UnknownDomain(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_str() {
        for domain in BackupDomain::ALL {
            let parsed: BackupDomain = domain.as_str().parse().unwrap();
            assert_eq!(parsed, domain);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let parsed: BackupDomain = "Topics".parse().unwrap();
        assert_eq!(parsed, BackupDomain::Topics);
    }

    #[test]
    fn test_unknown_domain_is_rejected() {
        let err = "plugins".parse::<BackupDomain>().unwrap_err();
        assert!(matches!(err, BackupError::UnknownDomain(name) if name == "plugins"));
    }

    #[test]
    fn test_serializes_as_lowercase_string() {
        let json = serde_json::to_string(&BackupDomain::Knowledge).unwrap();
        assert_eq!(json, "\"knowledge\"");
    }

    #[test]
    fn test_canonical_order_starts_with_topics() {
        assert_eq!(BackupDomain::ALL[0], BackupDomain::Topics);
        assert_eq!(BackupDomain::ALL.len(), 5);
    }
}
