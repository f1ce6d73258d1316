pub mod ballot;
pub mod candidate;
pub mod election;
pub mod user;
