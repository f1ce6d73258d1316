pub mod auth;
pub mod candidate;
pub mod election;
pub mod history;
pub mod id;
pub mod results;
