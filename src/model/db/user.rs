use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{common::Role, mongodb::{Coll, Id}};

/// Core user data, as stored in the database. Covers both voters and admins,
/// distinguished by `role`.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCore {
    pub name: String,
    /// Unique login identifier (unique index on the collection).
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    /// Voters may only cast ballots once an admin has verified them.
    /// Admins are created verified.
    pub verified: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl UserCore {
    /// Create a new user, hashing the given password.
    pub fn new(name: String, email: String, password: &str, role: Role) -> Result<Self> {
        let salt: [u8; 16] = rand::random();
        let password_hash =
            argon2::hash_encoded(password.as_bytes(), &salt, &argon2::Config::default())?;
        Ok(Self {
            name,
            email,
            password_hash,
            role,
            verified: role == Role::Admin,
            created_at: Utc::now(),
        })
    }

    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        // Unwrap safe because users are only ever created via `UserCore::new`,
        // so the stored hash is always well-formed.
        argon2::verify_encoded(&self.password_hash, password.as_ref()).unwrap()
    }
}

/// A user without an ID.
pub type NewUser = UserCore;

/// A user from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub user: UserCore,
}

impl Deref for User {
    type Target = UserCore;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl DerefMut for User {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.user
    }
}

/// Ensure at least one admin account exists, creating the default one if not.
pub async fn ensure_admin_exists(users: &Coll<NewUser>, email: &str, password: &str) -> Result<()> {
    let filter = doc! { "role": Role::Admin };
    if users.find_one(filter, None).await?.is_none() {
        warn!("No admin user found; creating the default admin '{email}'");
        warn!("Change the default admin password before going live!");
        let admin = NewUser::new("Administrator".to_string(), email.to_string(), password, Role::Admin)?;
        users.insert_one(admin, None).await?;
    }
    Ok(())
}
