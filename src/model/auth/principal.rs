use crate::model::common::Role;

/// Marker trait for the kinds of principal a route can demand.
///
/// Used as the type parameter of [`super::AuthToken`], so a route's signature
/// states exactly who may call it.
pub trait Principal {
    const ROLE: Role;
}

/// A voter principal.
pub struct Voter;

impl Principal for Voter {
    const ROLE: Role = Role::Voter;
}

/// An admin principal.
pub struct Admin;

impl Principal for Admin {
    const ROLE: Role = Role::Admin;
}
