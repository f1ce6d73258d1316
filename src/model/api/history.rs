use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    db::{ballot::Ballot, candidate::Candidate, election::Election},
};

/// One entry in a voter's voting history: their ballot enriched with the
/// election title and candidate details at read time.
///
/// Ballots outlive deleted elections and candidates, so the enrichment
/// fields are optional; a dangling reference yields `None` rather than an
/// error.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub id: ApiId,
    pub election_id: ApiId,
    pub candidate_id: ApiId,
    pub cast_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub election_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_party: Option<String>,
}

impl VoteRecord {
    /// Enrich a ballot with whatever referenced records still exist.
    pub fn enrich(ballot: Ballot, election: Option<&Election>, candidate: Option<&Candidate>) -> Self {
        Self {
            id: ballot.id.into(),
            election_id: ballot.ballot.election_id.into(),
            candidate_id: ballot.ballot.candidate_id.into(),
            cast_at: ballot.ballot.cast_at,
            election_title: election.map(|e| e.title.clone()),
            candidate_name: candidate.map(|c| c.name.clone()),
            candidate_party: candidate.and_then(|c| c.party.clone()),
        }
    }
}
