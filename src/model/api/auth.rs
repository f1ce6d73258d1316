use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{api::id::ApiId, common::Role, db::user::User};

/// Minimum accepted password length, as enforced at registration.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// A registration request. Registration always creates an unverified voter;
/// admin accounts are provisioned out-of-band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    /// Check the request is well-formed, naming the offending field if not.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("'name' must not be empty".to_string()));
        }
        if !self.email.contains('@') {
            return Err(Error::Validation(
                "'email' must be a valid email address".to_string(),
            ));
        }
        if self.password.len() < MIN_PASSWORD_LENGTH {
            return Err(Error::Validation(format!(
                "'password' must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        Ok(())
    }
}

/// A login request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// A user's own profile, as returned by the API. Never includes the
/// password hash.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: ApiId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id.into(),
            name: user.user.name,
            email: user.user.email,
            role: user.user.role,
            verified: user.user.verified,
            created_at: user.user.created_at,
        }
    }
}
