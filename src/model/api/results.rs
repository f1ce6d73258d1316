use serde::{Deserialize, Serialize};

use crate::model::{
    api::{candidate::CandidateDescription, election::ElectionDescription},
    db::candidate::Candidate,
};

/// One candidate's standing in the results of an election.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateStanding {
    #[serde(flatten)]
    pub candidate: CandidateDescription,
    /// Share of the total vote, as a percentage rounded to two decimal
    /// places. Defined as 0 when no votes have been cast at all.
    pub percentage: f64,
}

/// The full results of an election.
#[derive(Debug, Serialize, Deserialize)]
pub struct ElectionResults {
    pub election: ElectionDescription,
    /// Standings in stored (insertion) order.
    pub candidates: Vec<CandidateStanding>,
    /// Sum of all candidate tallies.
    pub total_votes: u64,
    /// The winning candidate. Ties break to the first candidate at the
    /// maximum tally in stored order; absent when the election has no
    /// candidates or no votes were cast at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<CandidateDescription>,
}

impl ElectionResults {
    /// Aggregate results from an election and its candidates.
    pub fn tally(election: ElectionDescription, candidates: Vec<Candidate>) -> Self {
        let total_votes: u64 = candidates.iter().map(|c| c.vote_count).sum();

        // First candidate at the maximum tally in stored order; a strict
        // comparison would pick the last instead. Nobody wins a zero-turnout
        // election.
        let winner = if total_votes == 0 {
            None
        } else {
            candidates
                .iter()
                .fold(None::<&Candidate>, |best, c| match best {
                    Some(b) if b.vote_count >= c.vote_count => Some(b),
                    _ => Some(c),
                })
                .map(|c| CandidateDescription::from(c.clone()))
        };

        let standings = candidates
            .into_iter()
            .map(|candidate| {
                let percentage = if total_votes == 0 {
                    0.0
                } else {
                    let raw = candidate.vote_count as f64 / total_votes as f64 * 100.0;
                    (raw * 100.0).round() / 100.0
                };
                CandidateStanding {
                    candidate: candidate.into(),
                    percentage,
                }
            })
            .collect();

        Self {
            election,
            candidates: standings,
            total_votes,
            winner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::{
        api::election::ElectionSpec,
        db::{
            candidate::CandidateCore,
            election::{Election, ElectionCore},
        },
        mongodb::Id,
    };

    fn election() -> (Election, Id) {
        let id = Id::new();
        let election = Election {
            id,
            election: ElectionSpec::completed_example().into_election(Id::new()),
        };
        (election, id)
    }

    fn candidate(core: CandidateCore, votes: u64) -> Candidate {
        Candidate {
            id: Id::new(),
            candidate: CandidateCore {
                vote_count: votes,
                ..core
            },
        }
    }

    #[test]
    fn totals_and_percentages() {
        let (election, id) = election();
        let candidates = vec![
            candidate(CandidateCore::example1(id), 3),
            candidate(CandidateCore::example2(id), 1),
        ];

        let results = ElectionResults::tally(election.into(), candidates);
        assert_eq!(results.total_votes, 4);
        assert_eq!(results.candidates[0].percentage, 75.0);
        assert_eq!(results.candidates[1].percentage, 25.0);
        let winner = results.winner.unwrap();
        assert_eq!(winner.name, "Alice Atkins");
        assert_eq!(winner.vote_count, 3);
    }

    #[test]
    fn zero_votes_means_zero_percent() {
        let (election, id) = election();
        let candidates = vec![
            candidate(CandidateCore::example1(id), 0),
            candidate(CandidateCore::example2(id), 0),
        ];

        let results = ElectionResults::tally(election.into(), candidates);
        assert_eq!(results.total_votes, 0);
        for standing in &results.candidates {
            assert_eq!(standing.percentage, 0.0);
        }
        // Nobody voted, so nobody won.
        assert!(results.winner.is_none());
    }

    #[test]
    fn tie_breaks_to_first_in_stored_order() {
        let (election, id) = election();
        let candidates = vec![
            candidate(CandidateCore::example2(id), 2),
            candidate(CandidateCore::example1(id), 2),
        ];

        let results = ElectionResults::tally(election.into(), candidates);
        assert_eq!(results.winner.unwrap().name, "Bob Brierly");
    }

    #[test]
    fn no_candidates_means_no_winner() {
        let (election, _) = election();
        let results = ElectionResults::tally(election.into(), Vec::new());
        assert_eq!(results.total_votes, 0);
        assert!(results.winner.is_none());
    }
}
