use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::id::ApiId,
    common::ElectionStatus,
    db::election::{Election, NewElection},
    mongodb::Id,
};

/// An election specification, as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSpec {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ElectionSpec {
    /// Check the spec is well-formed, naming the offending field if not.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("'title' must not be empty".to_string()));
        }
        if self.end_time <= self.start_time {
            return Err(Error::Validation(
                "'end_time' must be after 'start_time'".to_string(),
            ));
        }
        Ok(())
    }

    /// Convert this spec into a new election record created by the given admin.
    pub fn into_election(self, created_by: Id) -> NewElection {
        NewElection {
            title: self.title,
            description: self.description,
            start_time: self.start_time,
            end_time: self.end_time,
            declared: false,
            created_by,
            created_at: Utc::now(),
        }
    }
}

/// A partial update of an election; absent fields are left untouched.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ElectionUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl ElectionUpdate {
    /// Does this update resubmit either date?
    ///
    /// A date edit clears any forced-completion override, since the admin is
    /// explicitly asking for the status to re-derive from the new window.
    pub fn touches_dates(&self) -> bool {
        self.start_time.is_some() || self.end_time.is_some()
    }

    /// The election as it would look after this update.
    pub fn apply_to(&self, mut election: NewElection) -> NewElection {
        if let Some(title) = &self.title {
            election.title = title.clone();
        }
        if let Some(description) = &self.description {
            election.description = Some(description.clone());
        }
        if let Some(start_time) = self.start_time {
            election.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            election.end_time = end_time;
        }
        if self.touches_dates() {
            election.declared = false;
        }
        election
    }

    /// Check the update is well-formed against the record it would produce.
    pub fn validate_against(&self, current: &NewElection) -> Result<()> {
        let start = self.start_time.unwrap_or(current.start_time);
        let end = self.end_time.unwrap_or(current.end_time);
        if end <= start {
            return Err(Error::Validation(
                "'end_time' must be after 'start_time'".to_string(),
            ));
        }
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(Error::Validation("'title' must not be empty".to_string()));
            }
        }
        Ok(())
    }
}

/// An election as returned by the API, with its status recomputed at
/// serialisation time.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDescription {
    pub id: ApiId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ElectionStatus,
    pub created_by: ApiId,
    pub created_at: DateTime<Utc>,
}

impl From<Election> for ElectionDescription {
    fn from(election: Election) -> Self {
        let status = election.status_at(Utc::now());
        Self {
            id: election.id.into(),
            title: election.election.title,
            description: election.election.description,
            start_time: election.election.start_time,
            end_time: election.election.end_time,
            status,
            created_by: election.election.created_by.into(),
            created_at: election.election.created_at,
        }
    }
}

/// Confirmation of an election deletion.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedElection {
    pub id: ApiId,
    pub title: String,
}
