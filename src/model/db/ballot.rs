use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core ballot data, as stored in the database.
///
/// A ballot is immutable once created: there is no update or retraction
/// operation, and a unique index on (voter_id, election_id) guarantees at
/// most one ballot per voter per election at the storage layer.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct BallotCore {
    pub voter_id: Id,
    pub election_id: Id,
    pub candidate_id: Id,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
}

impl BallotCore {
    pub fn new(voter_id: Id, election_id: Id, candidate_id: Id) -> Self {
        Self {
            voter_id,
            election_id,
            candidate_id,
            cast_at: Utc::now(),
        }
    }
}

/// A ballot without an ID.
pub type NewBallot = BallotCore;

/// A ballot from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ballot {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub ballot: BallotCore,
}

impl Deref for Ballot {
    type Target = BallotCore;

    fn deref(&self) -> &Self::Target {
        &self.ballot
    }
}
