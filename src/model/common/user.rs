use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// The role of a user principal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May browse elections, cast ballots once verified, and view their own history.
    Voter,
    /// May manage elections, candidates, and voter verification.
    Admin,
}

impl From<Role> for Bson {
    fn from(role: Role) -> Self {
        to_bson(&role).expect("Serialisation is infallible")
    }
}
