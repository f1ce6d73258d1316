use mongodb::bson::doc;
use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    config::Config,
    error::{Error, Result},
    model::{
        api::auth::{LoginRequest, RegisterRequest, UserProfile},
        auth::{Claims, AUTH_TOKEN_COOKIE},
        common::Role,
        db::user::{NewUser, User},
        mongodb::{Coll, Id},
    },
};

pub fn routes() -> Vec<Route> {
    routes![register, login, logout, me]
}

#[post("/auth/register", data = "<request>", format = "json")]
pub async fn register(
    request: Json<RegisterRequest>,
    users: Coll<User>,
    new_users: Coll<NewUser>,
) -> Result<Json<UserProfile>> {
    request.validate()?;

    // Check email uniqueness up front for a friendly error; the unique index
    // still catches concurrent registrations.
    let with_email = doc! { "email": &request.email };
    if users.find_one(with_email.clone(), None).await?.is_some() {
        return Err(Error::Validation(format!(
            "'email' already in use: {}",
            request.email
        )));
    }

    // Registration only ever creates unverified voters.
    let request = request.0;
    let user = NewUser::new(request.name, request.email, &request.password, Role::Voter)?;
    let new_id: Id = new_users
        .insert_one(&user, None)
        .await?
        .inserted_id
        .as_object_id()
        .unwrap() // Valid because the ID comes directly from the DB.
        .into();

    let user = users.find_one(new_id.as_doc(), None).await?.unwrap();
    Ok(Json(user.into()))
}

#[post("/auth/login", data = "<credentials>", format = "json")]
pub async fn login(
    credentials: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<Json<UserProfile>> {
    let with_email = doc! { "email": &credentials.email };

    let user = users
        .find_one(with_email, None)
        .await?
        .filter(|user| user.verify_password(&credentials.password))
        .ok_or_else(|| {
            Error::Unauthorized("No user found with that email and password".to_string())
        })?;

    let claims = Claims::for_user(&user, config);
    cookies.add(claims.into_cookie(config));

    Ok(Json(user.into()))
}

#[delete("/auth")]
pub fn logout(cookies: &CookieJar) -> Status {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
    Status::Ok
}

#[get("/auth/me")]
pub async fn me(claims: Claims, users: Coll<User>) -> Result<Json<UserProfile>> {
    let user = users
        .find_one(claims.id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("User {}", claims.id)))?;
    Ok(Json(user.into()))
}
