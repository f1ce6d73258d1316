#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;

use config::{ConfigFairing, DatabaseFairing};
use logging::LoggerFairing;

/// Assemble the full server: all routes, config loading, database
/// connection, and request logging.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(LoggerFairing)
}

/// Connect to the test database server. Used by the `#[backend_test]` macro.
#[cfg(test)]
async fn db_client() -> mongodb::Client {
    let db_uri: String = rocket::build()
        .figment()
        .extract_inner("db_uri")
        .expect("`db_uri` not set");
    mongodb::Client::with_uri_str(&db_uri)
        .await
        .expect("Could not connect to the database")
}

/// Pick a fresh database name, so concurrent tests never share state.
#[cfg(test)]
fn database() -> String {
    let random: u32 = rand::random();
    format!("test{random}")
}

/// Assemble a server against the given test database. The database fairing
/// is deliberately not attached; the test harness owns the connection and
/// drops the database afterwards.
#[cfg(test)]
async fn rocket_for_db(client: mongodb::Client, db_name: &str) -> Rocket<Build> {
    let db = client.database(db_name);
    model::mongodb::ensure_indexes_exist(&db)
        .await
        .expect("Failed to create database indexes");
    rocket::build()
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .manage(client)
        .manage(db)
}
