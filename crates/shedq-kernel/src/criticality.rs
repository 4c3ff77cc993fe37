//! Request criticality tiers.

use std::fmt;
use std::str::FromStr;

/// Importance tier attached to every queued request.
///
/// Ordered from least to most important, so `a < b` means `a` is shed first.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    /// Batch and background work; the first to go under overload
    Sheddable,
    /// Work that tolerates partial unavailability
    SheddablePlus,
    /// Default tier for user-facing requests
    #[default]
    Critical,
    /// Requests whose failure is itself an outage
    CriticalPlus,
}

impl Criticality {
    /// All tiers, least critical first.
    pub const ALL: [Criticality; 4] = [
        Criticality::Sheddable,
        Criticality::SheddablePlus,
        Criticality::Critical,
        Criticality::CriticalPlus,
    ];

    /// Stable name used by `Display` and `FromStr`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sheddable => "sheddable",
            Self::SheddablePlus => "sheddable_plus",
            Self::Critical => "critical",
            Self::CriticalPlus => "critical_plus",
        }
    }
}

impl fmt::Display for Criticality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known [`Criticality`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown criticality '{0}'")]
pub struct ParseCriticalityError(pub String);

impl FromStr for Criticality {
    type Err = ParseCriticalityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| ParseCriticalityError(s.to_string()))
    }
}
