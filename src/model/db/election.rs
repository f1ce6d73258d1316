use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{common::ElectionStatus, mongodb::Id};

/// Core election data, as stored in the database.
///
/// Status is deliberately *not* a stored field: it is derived from the date
/// window on every read. The only stored piece of lifecycle state is the
/// `declared` override flag, set when an admin declares results ahead of the
/// end time.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ElectionCore {
    /// Election title.
    pub title: String,
    /// Optional free-text description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Start of the voting window.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    /// End of the voting window.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
    /// Forced-completion override: results were declared by an admin before
    /// the window closed. Cleared when an admin resubmits dates.
    #[serde(default)]
    pub declared: bool,
    /// The admin who created this election.
    pub created_by: Id,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl ElectionCore {
    /// The status of this election at the given instant.
    pub fn status_at(&self, now: DateTime<Utc>) -> ElectionStatus {
        if self.declared {
            ElectionStatus::Completed
        } else {
            ElectionStatus::derive(now, self.start_time, self.end_time)
        }
    }

    /// Is this election accepting ballots at the given instant?
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) == ElectionStatus::Ongoing
    }
}

/// An election without an ID.
pub type NewElection = ElectionCore;

/// An election from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl DerefMut for Election {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.election
    }
}
