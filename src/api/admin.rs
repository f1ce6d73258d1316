use mongodb::{bson::doc, options::FindOptions, Client};
use rocket::{futures::TryStreamExt, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::UserProfile,
            candidate::{CandidateDescription, CandidateSpec, CandidateUpdate, DeletedCandidate},
            election::{DeletedElection, ElectionDescription, ElectionSpec, ElectionUpdate},
        },
        auth::{Admin, AuthToken},
        common::Role,
        db::{
            candidate::{Candidate, NewCandidate},
            election::{Election, NewElection},
            user::User,
        },
        mongodb::{Coll, Id},
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        create_election,
        get_elections,
        get_election,
        update_election,
        delete_election,
        add_candidate,
        get_candidates,
        update_candidate,
        delete_candidate,
        get_voters,
        verify_voter,
    ]
}

#[post("/admin/elections", data = "<spec>", format = "json")]
async fn create_election(
    token: AuthToken<Admin>,
    spec: Json<ElectionSpec>,
    new_elections: Coll<NewElection>,
    elections: Coll<Election>,
) -> Result<Json<ElectionDescription>> {
    spec.validate()?;

    let election = spec.0.into_election(token.id());
    let new_id: Id = new_elections
        .insert_one(&election, None)
        .await?
        .inserted_id
        .as_object_id()
        .unwrap() // Valid because the ID comes directly from the DB.
        .into();

    // Retrieve the full election including ID.
    let election = elections.find_one(new_id.as_doc(), None).await?.unwrap();
    Ok(Json(election.into()))
}

#[get("/admin/elections")]
async fn get_elections(
    _token: AuthToken<Admin>,
    elections: Coll<Election>,
) -> Result<Json<Vec<ElectionDescription>>> {
    let options = FindOptions::builder()
        .sort(doc! { "start_time": 1 })
        .build();
    let elections: Vec<Election> = elections.find(None, options).await?.try_collect().await?;
    Ok(Json(elections.into_iter().map(Into::into).collect()))
}

#[get("/admin/elections/<election_id>")]
async fn get_election(
    _token: AuthToken<Admin>,
    election_id: Id,
    elections: Coll<Election>,
) -> Result<Json<ElectionDescription>> {
    let election = election_by_id(election_id, &elections).await?;
    Ok(Json(election.into()))
}

#[put("/admin/elections/<election_id>", data = "<update>", format = "json")]
async fn update_election(
    _token: AuthToken<Admin>,
    election_id: Id,
    update: Json<ElectionUpdate>,
    new_elections: Coll<NewElection>,
    elections: Coll<Election>,
) -> Result<Json<ElectionDescription>> {
    let election = election_by_id(election_id, &elections).await?;

    update.validate_against(&election.election)?;
    let updated = update.0.apply_to(election.election);

    let result = new_elections
        .replace_one(election_id.as_doc(), &updated, None)
        .await?;
    assert_eq!(result.matched_count, 1);

    let election = elections
        .find_one(election_id.as_doc(), None)
        .await?
        .unwrap();
    Ok(Json(election.into()))
}

/// Delete an election and all of its candidates in one transaction.
/// Ballots are deliberately retained as immutable history; the voting
/// history endpoint tolerates the resulting dangling references.
#[delete("/admin/elections/<election_id>")]
async fn delete_election(
    _token: AuthToken<Admin>,
    election_id: Id,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
    db_client: &State<Client>,
) -> Result<Json<DeletedElection>> {
    let election = election_by_id(election_id, &elections).await?;

    {
        let mut session = db_client.start_session(None).await?;
        session.start_transaction(None).await?;

        let filter = doc! { "election_id": election_id };
        candidates
            .delete_many_with_session(filter, None, &mut session)
            .await?;

        let result = elections
            .delete_one_with_session(election_id.as_doc(), None, &mut session)
            .await?;
        assert_eq!(result.deleted_count, 1);

        session.commit_transaction().await?;
    }

    Ok(Json(DeletedElection {
        id: election.id.into(),
        title: election.election.title,
    }))
}

#[post(
    "/admin/elections/<election_id>/candidates",
    data = "<spec>",
    format = "json"
)]
async fn add_candidate(
    _token: AuthToken<Admin>,
    election_id: Id,
    spec: Json<CandidateSpec>,
    elections: Coll<Election>,
    new_candidates: Coll<NewCandidate>,
    candidates: Coll<Candidate>,
) -> Result<Json<CandidateDescription>> {
    // The election must exist for a candidate to stand in it.
    election_by_id(election_id, &elections).await?;
    spec.validate()?;

    let candidate = spec.0.into_candidate(election_id);
    let new_id: Id = new_candidates
        .insert_one(&candidate, None)
        .await?
        .inserted_id
        .as_object_id()
        .unwrap() // Valid because the ID comes directly from the DB.
        .into();

    let candidate = candidates.find_one(new_id.as_doc(), None).await?.unwrap();
    Ok(Json(candidate.into()))
}

#[get("/admin/elections/<election_id>/candidates")]
async fn get_candidates(
    _token: AuthToken<Admin>,
    election_id: Id,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
) -> Result<Json<Vec<CandidateDescription>>> {
    election_by_id(election_id, &elections).await?;
    let candidates = candidates_of_election(election_id, &candidates).await?;
    Ok(Json(candidates.into_iter().map(Into::into).collect()))
}

#[put("/admin/candidates/<candidate_id>", data = "<update>", format = "json")]
async fn update_candidate(
    _token: AuthToken<Admin>,
    candidate_id: Id,
    update: Json<CandidateUpdate>,
    candidates: Coll<Candidate>,
) -> Result<Json<CandidateDescription>> {
    update.validate()?;

    // The vote count is never writable through this route.
    let mut set = doc! {};
    if let Some(name) = &update.name {
        set.insert("name", name);
    }
    if let Some(party) = &update.party {
        set.insert("party", party);
    }
    if let Some(manifesto) = &update.manifesto {
        set.insert("manifesto", manifesto);
    }

    if !set.is_empty() {
        let result = candidates
            .update_one(candidate_id.as_doc(), doc! { "$set": set }, None)
            .await?;
        if result.matched_count == 0 {
            return Err(Error::not_found(format!("Candidate {candidate_id}")));
        }
    }

    let candidate = candidates
        .find_one(candidate_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Candidate {candidate_id}")))?;
    Ok(Json(candidate.into()))
}

#[delete("/admin/candidates/<candidate_id>")]
async fn delete_candidate(
    _token: AuthToken<Admin>,
    candidate_id: Id,
    candidates: Coll<Candidate>,
) -> Result<Json<DeletedCandidate>> {
    let candidate = candidates
        .find_one(candidate_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Candidate {candidate_id}")))?;

    let result = candidates.delete_one(candidate_id.as_doc(), None).await?;
    assert_eq!(result.deleted_count, 1);

    Ok(Json(DeletedCandidate {
        name: candidate.candidate.name,
        party: candidate.candidate.party,
    }))
}

#[get("/admin/voters")]
async fn get_voters(
    _token: AuthToken<Admin>,
    users: Coll<User>,
) -> Result<Json<Vec<UserProfile>>> {
    let filter = doc! { "role": Role::Voter };
    let voters: Vec<User> = users.find(filter, None).await?.try_collect().await?;
    Ok(Json(voters.into_iter().map(Into::into).collect()))
}

/// Mark a voter as verified. One-way: there is no unverify.
#[post("/admin/voters/<voter_id>/verify")]
async fn verify_voter(
    _token: AuthToken<Admin>,
    voter_id: Id,
    users: Coll<User>,
) -> Result<Json<UserProfile>> {
    let user = users
        .find_one(voter_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("User {voter_id}")))?;

    if user.role != Role::Voter {
        return Err(Error::NotAVoter(voter_id));
    }

    users
        .update_one(
            voter_id.as_doc(),
            doc! { "$set": { "verified": true } },
            None,
        )
        .await?;

    let user = users.find_one(voter_id.as_doc(), None).await?.unwrap();
    Ok(Json(user.into()))
}

pub(super) async fn election_by_id(
    election_id: Id,
    elections: &Coll<Election>,
) -> Result<Election> {
    elections
        .find_one(election_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election {election_id}")))
}

pub(super) async fn candidates_of_election(
    election_id: Id,
    candidates: &Coll<Candidate>,
) -> Result<Vec<Candidate>> {
    // Insertion order (IDs are monotonic); results tie-breaking relies on it.
    let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
    let filter = doc! { "election_id": election_id };
    Ok(candidates.find(filter, options).await?.try_collect().await?)
}
