use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core candidate data, as stored in the database.
///
/// `vote_count` is the vote-of-record tally. It is only ever mutated by the
/// atomic `$inc` that accompanies a ballot insert, inside the same
/// transaction; it is never written from a value read at the application
/// layer.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct CandidateCore {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifesto: Option<String>,
    /// The election this candidate stands in.
    pub election_id: Id,
    /// Running vote tally.
    pub vote_count: u64,
}

impl CandidateCore {
    pub fn new(
        name: String,
        party: Option<String>,
        manifesto: Option<String>,
        election_id: Id,
    ) -> Self {
        Self {
            name,
            party,
            manifesto,
            election_id,
            vote_count: 0,
        }
    }
}

/// A candidate without an ID.
pub type NewCandidate = CandidateCore;

/// A candidate from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub candidate: CandidateCore,
}

impl Deref for Candidate {
    type Target = CandidateCore;

    fn deref(&self) -> &Self::Target {
        &self.candidate
    }
}

impl DerefMut for Candidate {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.candidate
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl CandidateCore {
        pub fn example1(election_id: Id) -> Self {
            Self::new(
                "Alice Atkins".to_string(),
                Some("Progress Party".to_string()),
                Some("More bike lanes.".to_string()),
                election_id,
            )
        }

        pub fn example2(election_id: Id) -> Self {
            Self::new(
                "Bob Brierly".to_string(),
                Some("Tradition Party".to_string()),
                None,
                election_id,
            )
        }
    }
}
