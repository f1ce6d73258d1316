pub mod election;
pub mod user;

pub use election::ElectionStatus;
pub use user::Role;
