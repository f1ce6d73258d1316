use chrono::{DateTime, Utc};
use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// The lifecycle status of an election, derived from the clock and the
/// election's date window. Never stored; always recomputed at the point of
/// use, since there is no background scheduler to tick transitions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionStatus {
    /// The window has not opened yet.
    Upcoming,
    /// Within the window; ballots are accepted.
    Ongoing,
    /// The window has closed (or results were declared early).
    Completed,
}

impl ElectionStatus {
    /// The status transition function. Pure and total: any instant maps to
    /// exactly one status.
    pub fn derive(now: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if now < start {
            Self::Upcoming
        } else if now > end {
            Self::Completed
        } else {
            Self::Ongoing
        }
    }
}

impl From<ElectionStatus> for Bson {
    fn from(status: ElectionStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}
