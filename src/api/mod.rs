use rocket::Route;

mod admin;
pub mod auth;
mod results;
mod voter;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(auth::routes());
    routes.extend(admin::routes());
    routes.extend(voter::routes());
    routes.extend(results::routes());
    routes
}
