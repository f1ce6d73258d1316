use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::id::ApiId,
    db::candidate::{Candidate, NewCandidate},
    mongodb::Id,
};

/// A candidate specification, as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub name: String,
    #[serde(default)]
    pub party: Option<String>,
    #[serde(default)]
    pub manifesto: Option<String>,
}

impl CandidateSpec {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("'name' must not be empty".to_string()));
        }
        Ok(())
    }

    /// Convert this spec into a new candidate standing in the given election.
    pub fn into_candidate(self, election_id: Id) -> NewCandidate {
        NewCandidate::new(self.name, self.party, self.manifesto, election_id)
    }
}

/// A partial update of a candidate; absent fields are left untouched.
/// The vote count cannot be written through this type.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CandidateUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub party: Option<String>,
    #[serde(default)]
    pub manifesto: Option<String>,
}

impl CandidateUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(Error::Validation("'name' must not be empty".to_string()));
            }
        }
        Ok(())
    }
}

/// A candidate as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDescription {
    pub id: ApiId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifesto: Option<String>,
    pub election_id: ApiId,
    pub vote_count: u64,
}

impl From<Candidate> for CandidateDescription {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id.into(),
            name: candidate.candidate.name,
            party: candidate.candidate.party,
            manifesto: candidate.candidate.manifesto,
            election_id: candidate.candidate.election_id.into(),
            vote_count: candidate.candidate.vote_count,
        }
    }
}

/// Confirmation of a candidate deletion.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedCandidate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party: Option<String>,
}
