/// Catalog item status definitions
use std::fmt;

/// Extraction state of one file under one catalog version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CatalogStatus {
    // ===== Active States =====
    /// Waiting to be claimed
    Pending,

    /// Claimed by a worker in some process
    Processing,

    // ===== Terminal States =====
    /// Extracted and judged relevant; metadata populated
    Ok,

    /// Extracted correctly but intentionally excluded as off-topic
    Skipped,

    /// Extraction failed; eligible for a manual retry
    Error,
}

impl CatalogStatus {
    /// Returns true if the item needs no more work under its version
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ok | Self::Skipped | Self::Error)
    }

    /// Returns true for the states a worker may be holding or waiting on
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Ok => "ok",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "ok" => Some(Self::Ok),
            "skipped" => Some(Self::Skipped),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Returns all statuses in lifecycle order
    pub fn all_statuses() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Processing,
            Self::Ok,
            Self::Skipped,
            Self::Error,
        ]
    }
}

impl fmt::Display for CatalogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
