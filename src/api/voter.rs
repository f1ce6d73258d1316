use chrono::Utc;
use mongodb::{
    bson::doc, error::TRANSIENT_TRANSACTION_ERROR, options::FindOptions, Client,
};
use rocket::{futures::TryStreamExt, serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            candidate::CandidateDescription, election::ElectionDescription, history::VoteRecord,
            id::ApiId,
        },
        auth::{AuthToken, Voter},
        db::{
            ballot::{Ballot, NewBallot},
            candidate::Candidate,
            election::Election,
            user::User,
        },
        mongodb::{Coll, Id},
    },
};

use super::admin::{candidates_of_election, election_by_id};

pub fn routes() -> Vec<Route> {
    routes![get_elections, get_candidates, cast_vote, get_history]
}

#[get("/voter/elections")]
async fn get_elections(
    _token: AuthToken<Voter>,
    elections: Coll<Election>,
) -> Result<Json<Vec<ElectionDescription>>> {
    let options = FindOptions::builder()
        .sort(doc! { "start_time": 1 })
        .build();
    let elections: Vec<Election> = elections.find(None, options).await?.try_collect().await?;
    Ok(Json(elections.into_iter().map(Into::into).collect()))
}

#[get("/voter/elections/<election_id>/candidates")]
async fn get_candidates(
    _token: AuthToken<Voter>,
    election_id: Id,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
) -> Result<Json<Vec<CandidateDescription>>> {
    election_by_id(election_id, &elections).await?;
    let candidates = candidates_of_election(election_id, &candidates).await?;
    Ok(Json(candidates.into_iter().map(Into::into).collect()))
}

/// Cast a ballot.
///
/// Pre-checks run in a fixed order so each failure mode surfaces as its own
/// error: missing election, closed voting window, unverified voter, repeat
/// vote, then unknown candidate. The ballot insert and the tally `$inc` then
/// happen inside one transaction, and the unique (voter, election) index
/// catches any double vote that races past the pre-check.
#[post("/voter/elections/<election_id>/vote", data = "<vote>", format = "json")]
#[allow(clippy::too_many_arguments)]
async fn cast_vote(
    token: AuthToken<Voter>,
    election_id: Id,
    vote: Json<VoteSpec>,
    elections: Coll<Election>,
    users: Coll<User>,
    ballots: Coll<Ballot>,
    new_ballots: Coll<NewBallot>,
    candidates: Coll<Candidate>,
    db_client: &State<Client>,
) -> Result<Json<BallotReceipt>> {
    let election = election_by_id(election_id, &elections).await?;

    if !election.is_open_at(Utc::now()) {
        return Err(Error::VotingClosed(election_id));
    }

    // Unwrap is safe because the token guard checked the user exists.
    let voter = users.find_one(token.id().as_doc(), None).await?.unwrap();
    if !voter.verified {
        return Err(Error::NotEligible(token.id()));
    }

    let one_per_election = doc! {
        "voter_id": token.id(),
        "election_id": election_id,
    };
    if ballots
        .find_one(one_per_election.clone(), None)
        .await?
        .is_some()
    {
        return Err(Error::AlreadyVoted(token.id(), election_id));
    }

    let candidate_in_election = doc! {
        "_id": vote.candidate_id,
        "election_id": election_id,
    };
    let candidate = candidates
        .find_one(candidate_in_election, None)
        .await?
        .ok_or(Error::InvalidCandidate {
            candidate: vote.candidate_id,
            election: election_id,
        })?;

    let new_ballot = NewBallot::new(token.id(), election_id, candidate.id);
    let ballot = record_ballot(db_client, &ballots, &new_ballots, &candidates, &new_ballot).await?;

    Ok(Json(BallotReceipt::from(ballot)))
}

/// Record a ballot and bump its candidate's tally in one transaction.
///
/// The tally is a server-side `$inc`, never a read-modify-write. The unique
/// (voter, election) index is the last line of defence against a double vote
/// that races past the pre-checks, and a candidate deleted since the
/// pre-check aborts the whole transaction, so a ballot can never outlive its
/// tally increment.
async fn record_ballot(
    db_client: &Client,
    ballots: &Coll<Ballot>,
    new_ballots: &Coll<NewBallot>,
    candidates: &Coll<Candidate>,
    ballot: &NewBallot,
) -> Result<Ballot> {
    // Overlapping transactions can conflict on the tally document or the
    // unique index; the driver labels such failures transient, so rerun the
    // transaction until it commits or fails for a terminal reason.
    loop {
        match try_record_ballot(db_client, ballots, new_ballots, candidates, ballot).await {
            Err(Error::Db(err)) if err.contains_label(TRANSIENT_TRANSACTION_ERROR) => continue,
            result => return result,
        }
    }
}

async fn try_record_ballot(
    db_client: &Client,
    ballots: &Coll<Ballot>,
    new_ballots: &Coll<NewBallot>,
    candidates: &Coll<Candidate>,
    ballot: &NewBallot,
) -> Result<Ballot> {
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;

    let insertion = new_ballots
        .insert_one_with_session(ballot, None, &mut session)
        .await
        .map_err(Error::from);
    let new_id: Id = match insertion {
        Ok(result) => result
            .inserted_id
            .as_object_id()
            .unwrap() // Valid because the ID comes directly from the DB.
            .into(),
        Err(err) => {
            // A racing vote hit the unique index first.
            session.abort_transaction().await?;
            if err.is_duplicate_key() {
                return Err(Error::AlreadyVoted(ballot.voter_id, ballot.election_id));
            }
            return Err(err);
        }
    };

    let tally = candidates
        .update_one_with_session(
            doc! {
                "_id": ballot.candidate_id,
                "election_id": ballot.election_id,
            },
            doc! { "$inc": { "vote_count": 1 } },
            None,
            &mut session,
        )
        .await?;
    if tally.matched_count != 1 {
        // The candidate vanished between the pre-check and the update.
        session.abort_transaction().await?;
        return Err(Error::InvalidCandidate {
            candidate: ballot.candidate_id,
            election: ballot.election_id,
        });
    }

    session.commit_transaction().await?;

    let ballot = ballots
        .find_one(new_id.as_doc(), None)
        .await?
        .unwrap(); // Just committed.
    Ok(ballot)
}

/// A voter's full voting history, enriched with whatever referenced
/// elections and candidates still exist.
#[get("/voter/history")]
async fn get_history(
    token: AuthToken<Voter>,
    ballots: Coll<Ballot>,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
) -> Result<Json<Vec<VoteRecord>>> {
    let options = FindOptions::builder().sort(doc! { "cast_at": 1 }).build();
    let filter = doc! { "voter_id": token.id() };
    let cast: Vec<Ballot> = ballots.find(filter, options).await?.try_collect().await?;

    let mut history = Vec::with_capacity(cast.len());
    for ballot in cast {
        let election = elections
            .find_one(ballot.election_id.as_doc(), None)
            .await?;
        let candidate = candidates
            .find_one(ballot.candidate_id.as_doc(), None)
            .await?;
        history.push(VoteRecord::enrich(
            ballot,
            election.as_ref(),
            candidate.as_ref(),
        ));
    }

    Ok(Json(history))
}

/// The candidate a voter wishes to cast their ballot for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VoteSpec {
    pub candidate_id: Id,
}

/// Confirmation of a recorded ballot.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotReceipt {
    pub id: ApiId,
    pub election_id: ApiId,
    pub candidate_id: ApiId,
    pub cast_at: chrono::DateTime<Utc>,
}

impl From<Ballot> for BallotReceipt {
    fn from(ballot: Ballot) -> Self {
        Self {
            id: ballot.id.into(),
            election_id: ballot.ballot.election_id.into(),
            candidate_id: ballot.ballot.candidate_id.into(),
            cast_at: ballot.ballot.cast_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use mongodb::Database;
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::serde_json::{self, json},
    };

    use crate::model::{
        common::{ElectionStatus, Role},
        db::{
            candidate::{CandidateCore, NewCandidate},
            election::{ElectionCore, NewElection},
        },
    };

    use super::*;

    #[backend_test(voter)]
    async fn browse_elections_and_candidates(
        client: Client,
        new_elections: Coll<NewElection>,
        elections: Coll<Election>,
        new_candidates: Coll<NewCandidate>,
    ) {
        new_elections
            .insert_one(ElectionCore::upcoming_example(), None)
            .await
            .unwrap();
        let ongoing_id = new_elections
            .insert_one(ElectionCore::ongoing_example(), None)
            .await
            .unwrap()
            .inserted_id;
        let election = elections
            .find_one(doc! { "_id": &ongoing_id }, None)
            .await
            .unwrap()
            .unwrap();
        new_candidates
            .insert_one(CandidateCore::example1(election.id), None)
            .await
            .unwrap();
        new_candidates
            .insert_one(CandidateCore::example2(election.id), None)
            .await
            .unwrap();

        let response = client.get(uri!(get_elections)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let listed: Vec<ElectionDescription> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed
            .windows(2)
            .all(|pair| pair[0].start_time <= pair[1].start_time));
        assert_eq!(listed[0].status, ElectionStatus::Ongoing);
        assert_eq!(listed[1].status, ElectionStatus::Upcoming);

        let response = client
            .get(format!("/voter/elections/{}/candidates", election.id))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let candidates: Vec<CandidateDescription> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].name, "Alice Atkins");
    }

    #[backend_test(voter)]
    async fn cast_and_tally(client: Client, db: Database) {
        let (election, alice, bob) = seed_ongoing_election(&db).await;

        let receipt = cast_expecting_ok(&client, election.id, alice.id).await;
        assert_eq!(*receipt.candidate_id, alice.id);
        assert_eq!(*receipt.election_id, election.id);

        // Exactly one vote recorded, for the right candidate.
        let candidates = Coll::<Candidate>::from_db(&db);
        let alice = candidates
            .find_one(alice.id.as_doc(), None)
            .await
            .unwrap()
            .unwrap();
        let bob = candidates
            .find_one(bob.id.as_doc(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alice.vote_count, 1);
        assert_eq!(bob.vote_count, 0);
    }

    #[backend_test(voter)]
    async fn double_vote_rejected(client: Client, db: Database) {
        let (election, alice, bob) = seed_ongoing_election(&db).await;

        cast_expecting_ok(&client, election.id, alice.id).await;

        // A second ballot, even for a different candidate, is a conflict.
        let response = cast(&client, election.id, bob.id).await;
        assert_eq!(Status::Conflict, response.status());

        // The first vote stands and the second left no trace.
        let candidates = Coll::<Candidate>::from_db(&db);
        let alice = candidates
            .find_one(alice.id.as_doc(), None)
            .await
            .unwrap()
            .unwrap();
        let bob = candidates
            .find_one(bob.id.as_doc(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alice.vote_count, 1);
        assert_eq!(bob.vote_count, 0);
        let ballot_count = Coll::<Ballot>::from_db(&db)
            .count_documents(None, None)
            .await
            .unwrap();
        assert_eq!(ballot_count, 1);
    }

    #[backend_test(voter)]
    async fn closed_elections_reject_votes(client: Client, db: Database) {
        // Upcoming.
        let (election, alice) = seed_election(&db, ElectionCore::upcoming_example()).await;
        let response = cast(&client, election.id, alice.id).await;
        assert_eq!(Status::BadRequest, response.status());

        // Completed.
        let (election, alice) = seed_election(&db, ElectionCore::completed_example()).await;
        let response = cast(&client, election.id, alice.id).await;
        assert_eq!(Status::BadRequest, response.status());

        // Declared early: window still open but results are in.
        let mut declared = ElectionCore::ongoing_example();
        declared.declared = true;
        let (election, alice) = seed_election(&db, declared).await;
        let response = cast(&client, election.id, alice.id).await;
        assert_eq!(Status::BadRequest, response.status());

        let ballot_count = Coll::<Ballot>::from_db(&db)
            .count_documents(None, None)
            .await
            .unwrap();
        assert_eq!(ballot_count, 0);
    }

    #[backend_test(voter)]
    async fn unverified_voter_rejected(client: Client, db: Database, users: Coll<User>) {
        let (election, alice, _) = seed_ongoing_election(&db).await;

        // Strip our own verification.
        users
            .update_one(
                doc! { "role": Role::Voter },
                doc! { "$set": { "verified": false } },
                None,
            )
            .await
            .unwrap();

        let response = cast(&client, election.id, alice.id).await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test(voter)]
    async fn unknown_candidate_rejected(client: Client, db: Database) {
        let (election, _, _) = seed_ongoing_election(&db).await;

        // A candidate ID that exists in no election.
        let response = cast(&client, election.id, Id::new()).await;
        assert_eq!(Status::BadRequest, response.status());

        // A real candidate standing in a *different* election.
        let (_, other_candidate) = seed_election(&db, ElectionCore::ongoing_example()).await;
        let response = cast(&client, election.id, other_candidate.id).await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test(voter)]
    async fn vanished_candidate_aborts_ballot(client: Client, db: Database) {
        let (election, alice, _) = seed_ongoing_election(&db).await;
        let candidates = Coll::<Candidate>::from_db(&db);
        candidates
            .delete_one(alice.id.as_doc(), None)
            .await
            .unwrap();

        // The route re-checks, so the rejection comes before any write.
        let response = cast(&client, election.id, alice.id).await;
        assert_eq!(Status::BadRequest, response.status());

        // Even when the candidate disappears after the pre-checks, the
        // transaction refuses to commit a ballot with no tally increment.
        let db_client = client.rocket().state::<mongodb::Client>().unwrap();
        let ballot = NewBallot::new(Id::new(), election.id, alice.id);
        let err = record_ballot(
            db_client,
            &Coll::<Ballot>::from_db(&db),
            &Coll::<NewBallot>::from_db(&db),
            &candidates,
            &ballot,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidCandidate { .. }));

        // The aborted transaction left no ballot behind.
        let ballot_count = Coll::<Ballot>::from_db(&db)
            .count_documents(None, None)
            .await
            .unwrap();
        assert_eq!(ballot_count, 0);
    }

    #[backend_test(voter)]
    async fn concurrent_casts_admit_exactly_one(client: Client, db: Database) {
        let (election, alice, bob) = seed_ongoing_election(&db).await;

        let (first, second) = rocket::tokio::join!(
            cast(&client, election.id, alice.id),
            cast(&client, election.id, bob.id),
        );

        // One ballot lands, the other is a conflict, whichever way the race
        // goes.
        let statuses = [first.status(), second.status()];
        assert_eq!(1, statuses.iter().filter(|s| **s == Status::Ok).count());
        assert_eq!(
            1,
            statuses.iter().filter(|s| **s == Status::Conflict).count()
        );

        // Exactly one ballot and one tally increment between the two.
        let ballot_count = Coll::<Ballot>::from_db(&db)
            .count_documents(None, None)
            .await
            .unwrap();
        assert_eq!(ballot_count, 1);
        let tallies: Vec<Candidate> = Coll::<Candidate>::from_db(&db)
            .find(None, None)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(1, tallies.iter().map(|c| c.vote_count).sum::<u64>());
    }

    #[backend_test(voter)]
    async fn storage_rejects_duplicate_ballots(client: Client, db: Database) {
        let (election, alice, bob) = seed_ongoing_election(&db).await;
        cast_expecting_ok(&client, election.id, alice.id).await;

        // Even bypassing the API, a second ballot for the same (voter,
        // election) violates the unique index.
        let ballots = Coll::<Ballot>::from_db(&db);
        let existing = ballots
            .find_one(None, None)
            .await
            .unwrap()
            .unwrap();
        let duplicate = NewBallot::new(existing.voter_id, election.id, bob.id);
        let result = Coll::<NewBallot>::from_db(&db)
            .insert_one(duplicate, None)
            .await;
        assert!(Error::from(result.unwrap_err()).is_duplicate_key());
    }

    #[backend_test(voter)]
    async fn history_survives_election_deletion(client: Client, db: Database) {
        let (election, alice, _) = seed_ongoing_election(&db).await;
        let receipt = cast_expecting_ok(&client, election.id, alice.id).await;

        let response = client.get(uri!(get_history)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let history: Vec<VoteRecord> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, receipt.id);
        assert_eq!(history[0].election_title.as_deref(), Some("Town Council"));
        assert_eq!(history[0].candidate_name.as_deref(), Some("Alice Atkins"));
        assert_eq!(
            history[0].candidate_party.as_deref(),
            Some("Progress Party")
        );

        // Delete the election and its candidates out from under the ballot.
        Coll::<Election>::from_db(&db)
            .delete_one(election.id.as_doc(), None)
            .await
            .unwrap();
        Coll::<Candidate>::from_db(&db)
            .delete_many(doc! { "election_id": election.id }, None)
            .await
            .unwrap();

        // The entry remains, with the enrichment fields gone.
        let response = client.get(uri!(get_history)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let history: Vec<VoteRecord> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, receipt.id);
        assert!(history[0].election_title.is_none());
        assert!(history[0].candidate_name.is_none());
        assert!(history[0].candidate_party.is_none());
    }

    #[backend_test(admin)]
    async fn voter_routes_reject_admins(client: Client) {
        let response = client.get(uri!(get_elections)).dispatch().await;
        assert_eq!(Status::NotFound, response.status());

        let response = client.get(uri!(get_history)).dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }

    /// Insert the given election with a single candidate.
    async fn seed_election(db: &Database, core: ElectionCore) -> (Election, Candidate) {
        let id = Coll::<NewElection>::from_db(db)
            .insert_one(core, None)
            .await
            .unwrap()
            .inserted_id;
        let election = Coll::<Election>::from_db(db)
            .find_one(doc! { "_id": id }, None)
            .await
            .unwrap()
            .unwrap();
        let id = Coll::<NewCandidate>::from_db(db)
            .insert_one(CandidateCore::example1(election.id), None)
            .await
            .unwrap()
            .inserted_id;
        let candidate = Coll::<Candidate>::from_db(db)
            .find_one(doc! { "_id": id }, None)
            .await
            .unwrap()
            .unwrap();
        (election, candidate)
    }

    /// Insert an ongoing election with two candidates.
    async fn seed_ongoing_election(db: &Database) -> (Election, Candidate, Candidate) {
        let (election, alice) = seed_election(db, ElectionCore::ongoing_example()).await;
        let id = Coll::<NewCandidate>::from_db(db)
            .insert_one(CandidateCore::example2(election.id), None)
            .await
            .unwrap()
            .inserted_id;
        let bob = Coll::<Candidate>::from_db(db)
            .find_one(doc! { "_id": id }, None)
            .await
            .unwrap()
            .unwrap();
        (election, alice, bob)
    }

    async fn cast<'c>(
        client: &'c Client,
        election_id: Id,
        candidate_id: Id,
    ) -> rocket::local::asynchronous::LocalResponse<'c> {
        client
            .post(format!("/voter/elections/{election_id}/vote"))
            .header(ContentType::JSON)
            .body(json!(VoteSpec { candidate_id }).to_string())
            .dispatch()
            .await
    }

    async fn cast_expecting_ok(
        client: &Client,
        election_id: Id,
        candidate_id: Id,
    ) -> BallotReceipt {
        let response = cast(client, election_id, candidate_id).await;
        assert_eq!(Status::Ok, response.status());
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap()
    }
}
