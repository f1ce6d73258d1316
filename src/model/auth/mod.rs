mod principal;
mod token;

pub use principal::{Admin, Principal, Voter};
pub use token::{AuthToken, Claims, AUTH_TOKEN_COOKIE};
