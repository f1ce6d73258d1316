use std::marker::PhantomData;

use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use mongodb::bson::doc;
use rocket::{
    http::{Cookie, SameSite, Status},
    outcome::{try_outcome, IntoOutcome},
    request::{FromRequest, Outcome},
    time::Duration,
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::{
    common::Role,
    db::user::User,
    mongodb::{Coll, Id},
};

use super::principal::Principal;

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// The signed contents of an auth cookie: who the user is, what role they
/// hold, and when the token expires.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub id: Id,
    #[serde(rename = "rol")]
    pub role: Role,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

impl Claims {
    /// Create claims for the given user, expiring after the configured TTL.
    pub fn for_user(user: &User, config: &Config) -> Self {
        Self {
            id: user.id,
            role: user.role,
            expire_at: Utc::now() + config.auth_ttl(),
        }
    }

    /// Serialize these claims into an auth cookie.
    #[allow(clippy::missing_panics_doc)]
    pub fn into_cookie(self, config: &Config) -> Cookie<'static> {
        let max_age = Duration::seconds(config.auth_ttl().num_seconds());
        let token = jsonwebtoken::encode(
            &Header::default(),
            &self,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .expect("JWT encoding is infallible with default settings");

        Cookie::build(AUTH_TOKEN_COOKIE, token)
            .max_age(max_age)
            .http_only(true)
            .same_site(SameSite::Strict)
            .finish()
    }

    /// Deserialize claims from an auth cookie, verifying signature and expiry.
    pub fn from_cookie(cookie: &Cookie<'static>, config: &Config) -> Result<Self, Error> {
        let claims = jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|data: TokenData<Claims>| data.claims)?;
        Ok(claims)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Claims {
    type Error = Error;

    /// Get the claims of any logged-in user, voter or admin, verifying that
    /// the user still exists.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Unwrap is safe as `Config` is always managed.
        let config = req.guard::<&State<Config>>().await.unwrap();

        // Forward if there is no valid token; some routes are unauthenticated.
        let cookie = try_outcome!(req.cookies().get(AUTH_TOKEN_COOKIE).or_forward(()));
        let claims: Self = try_outcome!(Self::from_cookie(cookie, config).or_forward(()));

        let db = req.guard::<&State<mongodb::Database>>().await.unwrap();
        let filter = doc! {
            "_id": claims.id,
            "role": claims.role,
        };
        match Coll::<User>::from_db(db).find_one(filter, None).await {
            Ok(Some(_)) => Outcome::Success(claims),
            Ok(None) => Outcome::Forward(()),
            Err(e) => Outcome::Failure((Status::InternalServerError, e.into())),
        }
    }
}

/// An authentication token proving the bearer is a specific user with the
/// role demanded by the route.
pub struct AuthToken<P> {
    pub id: Id,
    phantom: PhantomData<P>,
}

impl<P> AuthToken<P> {
    pub fn id(&self) -> Id {
        self.id
    }
}

#[rocket::async_trait]
impl<'r, P> FromRequest<'r> for AuthToken<P>
where
    P: Principal + Send,
{
    type Error = Error;

    /// Get verified claims and check they carry the rights this route demands.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let claims = try_outcome!(req.guard::<Claims>().await);
        if claims.role != P::ROLE {
            return Outcome::Forward(());
        }
        Outcome::Success(Self {
            id: claims.id,
            phantom: PhantomData,
        })
    }
}
