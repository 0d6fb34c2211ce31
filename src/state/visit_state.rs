/// Visit state definitions for URLs seen during one crawl run
use std::fmt;

/// Represents the state of a URL within one site crawl
///
/// `Queued -> Visiting -> {Followed, FileAdmitted, Rejected}`. A URL that is
/// rejected before it is ever visited (excluded link, off-site, budget) goes
/// straight from `Queued` to `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitState {
    // ===== Active States =====
    /// On the frontier, waiting to be fetched
    Queued,

    /// Currently being fetched
    Visiting,

    // ===== Terminal States =====
    /// Page fetched and its links processed
    Followed,

    /// File downloaded and handed to the content store
    FileAdmitted,

    /// Excluded, failed, or not worth storing
    Rejected,
}

impl VisitState {
    /// Returns true if no further transition is expected
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Followed | Self::FileAdmitted | Self::Rejected)
    }

    /// Returns true if the transition `self -> next` is allowed
    pub fn can_transition_to(&self, next: VisitState) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Visiting)
                | (Self::Queued, Self::Rejected)
                | (Self::Visiting, Self::Followed)
                | (Self::Visiting, Self::FileAdmitted)
                | (Self::Visiting, Self::Rejected)
        )
    }

    /// Converts the state to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Visiting => "visiting",
            Self::Followed => "followed",
            Self::FileAdmitted => "file_admitted",
            Self::Rejected => "rejected",
        }
    }

    /// Parses a state from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "visiting" => Some(Self::Visiting),
            "followed" => Some(Self::Followed),
            "file_admitted" => Some(Self::FileAdmitted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for VisitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
