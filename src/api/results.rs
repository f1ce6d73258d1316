use chrono::Utc;
use mongodb::bson::doc;
use rocket::{serde::json::Json, Route};

use crate::{
    error::{Error, Result},
    model::{
        api::{election::ElectionDescription, results::ElectionResults},
        auth::{Admin, AuthToken},
        common::ElectionStatus,
        db::{candidate::Candidate, election::Election},
        mongodb::{Coll, Id},
    },
};

use super::admin::{candidates_of_election, election_by_id};

pub fn routes() -> Vec<Route> {
    routes![results_admin, results_non_admin, declare_result]
}

/// Admins may see results at any time, including mid-election.
#[get("/results/<election_id>", rank = 1)]
async fn results_admin(
    _token: AuthToken<Admin>,
    election_id: Id,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
) -> Result<Json<ElectionResults>> {
    let election = election_by_id(election_id, &elections).await?;
    tally(election, &candidates).await
}

/// Everyone else only once the election has completed.
#[get("/results/<election_id>", rank = 2)]
async fn results_non_admin(
    election_id: Id,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
) -> Result<Json<ElectionResults>> {
    let election = election_by_id(election_id, &elections).await?;
    if election.status_at(Utc::now()) != ElectionStatus::Completed {
        return Err(Error::ResultsNotAvailable(election_id));
    }
    tally(election, &candidates).await
}

/// Declare the results of an election, forcing its status to completed even
/// if the voting window is still open. Only an explicit date edit re-derives
/// the status afterwards.
#[put("/results/<election_id>/declare")]
async fn declare_result(
    _token: AuthToken<Admin>,
    election_id: Id,
    elections: Coll<Election>,
) -> Result<Json<ElectionDescription>> {
    let result = elections
        .update_one(
            election_id.as_doc(),
            doc! { "$set": { "declared": true } },
            None,
        )
        .await?;
    if result.matched_count == 0 {
        return Err(Error::not_found(format!("Election {election_id}")));
    }

    let election = elections
        .find_one(election_id.as_doc(), None)
        .await?
        .unwrap(); // Presence just checked.
    Ok(Json(election.into()))
}

async fn tally(election: Election, candidates: &Coll<Candidate>) -> Result<Json<ElectionResults>> {
    let standing = candidates_of_election(election.id, candidates).await?;
    Ok(Json(ElectionResults::tally(election.into(), standing)))
}

#[cfg(test)]
mod tests {
    use mongodb::Database;
    use rocket::{http::Status, local::asynchronous::Client, serde::json::serde_json};

    use crate::model::db::{
        candidate::{CandidateCore, NewCandidate},
        election::{ElectionCore, NewElection},
    };

    use super::*;

    #[backend_test(admin)]
    async fn admin_sees_results_mid_election(client: Client, db: Database) {
        let election_id = seed(&db, ElectionCore::ongoing_example(), &[2, 5, 2]).await;

        let response = client
            .get(format!("/results/{election_id}"))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let results: ElectionResults =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();

        assert_eq!(results.total_votes, 9);
        assert_eq!(results.candidates.len(), 3);
        assert_eq!(results.candidates[0].percentage, 22.22);
        assert_eq!(results.candidates[1].percentage, 55.56);
        let winner = results.winner.unwrap();
        assert_eq!(winner.vote_count, 5);
        assert_eq!(winner.name, results.candidates[1].candidate.name);
    }

    #[backend_test(voter)]
    async fn results_hidden_until_completed(client: Client, db: Database) {
        let election_id = seed(&db, ElectionCore::ongoing_example(), &[1, 2]).await;

        let response = client
            .get(format!("/results/{election_id}"))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());

        // Once the window has closed, the same request succeeds.
        let completed_id = seed(&db, ElectionCore::completed_example(), &[1, 2]).await;
        let response = client
            .get(format!("/results/{completed_id}"))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let results: ElectionResults =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(results.total_votes, 3);
    }

    #[backend_test]
    async fn results_visible_to_the_logged_out(client: Client, db: Database) {
        let election_id = seed(&db, ElectionCore::completed_example(), &[4]).await;

        let response = client
            .get(format!("/results/{election_id}"))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let ongoing_id = seed(&db, ElectionCore::ongoing_example(), &[4]).await;
        let response = client
            .get(format!("/results/{ongoing_id}"))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test(admin)]
    async fn declare_forces_completion(client: Client, db: Database) {
        let election_id = seed(&db, ElectionCore::ongoing_example(), &[3, 1]).await;

        let response = client
            .put(format!("/results/{election_id}/declare"))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let declared: ElectionDescription =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(declared.status, ElectionStatus::Completed);

        // The results are now public even though the window is open.
        let stored = Coll::<Election>::from_db(&db)
            .find_one(election_id.as_doc(), None)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.declared);
        assert_eq!(stored.status_at(Utc::now()), ElectionStatus::Completed);
    }

    #[backend_test(admin)]
    async fn declare_missing_election(client: Client) {
        let response = client
            .put(format!("/results/{}/declare", Id::new()))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test(voter)]
    async fn declare_rejects_voters(client: Client, db: Database) {
        let election_id = seed(&db, ElectionCore::ongoing_example(), &[1]).await;

        let response = client
            .put(format!("/results/{election_id}/declare"))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());

        let stored = Coll::<Election>::from_db(&db)
            .find_one(election_id.as_doc(), None)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.declared);
    }

    #[backend_test(admin)]
    async fn empty_election_has_no_winner(client: Client, db: Database) {
        let election_id = seed(&db, ElectionCore::completed_example(), &[]).await;

        let response = client
            .get(format!("/results/{election_id}"))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let results: ElectionResults =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(results.total_votes, 0);
        assert!(results.candidates.is_empty());
        assert!(results.winner.is_none());
    }

    /// Insert an election with one candidate per entry of `votes`, holding
    /// that many votes.
    async fn seed(db: &Database, core: ElectionCore, votes: &[u64]) -> Id {
        let id: Id = Coll::<NewElection>::from_db(db)
            .insert_one(core, None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap()
            .into();
        for (index, count) in votes.iter().enumerate() {
            let mut candidate = CandidateCore::new(
                format!("Candidate {index}"),
                None,
                None,
                id,
            );
            candidate.vote_count = *count;
            Coll::<NewCandidate>::from_db(db)
                .insert_one(candidate, None)
                .await
                .unwrap();
        }
        id
    }
}
