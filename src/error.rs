use argon2::Error as Argon2Error;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use mongodb::error::{Error as DbError, ErrorKind, WriteFailure};
use rocket::{http::Status, response::Responder};
use thiserror::Error;

use crate::model::mongodb::Id;

pub type Result<T> = std::result::Result<T, Error>;

/// Mongo's error code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;

/// Everything that can go wrong serving a request.
///
/// The business-error variants are part of the API contract: each maps to a
/// distinct status and message at the boundary. The transparent variants are
/// unexpected internal faults and must never be reported as business errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Voting is closed for election {0}")]
    VotingClosed(Id),
    #[error("Voter {0} is not verified and cannot vote")]
    NotEligible(Id),
    #[error("Voter {0} has already voted in election {1}")]
    AlreadyVoted(Id, Id),
    #[error("Candidate {candidate} does not stand in election {election}")]
    InvalidCandidate { candidate: Id, election: Id },
    #[error("Results for election {0} are not yet available")]
    ResultsNotAvailable(Id),
    #[error("User {0} is not a voter")]
    NotAVoter(Id),
}

impl Error {
    /// Shorthand for a [`Error::NotFound`] describing the given entity.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Was this caused by a unique index violation?
    ///
    /// The unique (voter, election) ballot index reports concurrent
    /// double-voting this way; callers on the cast path translate it into
    /// [`Error::AlreadyVoted`].
    pub fn is_duplicate_key(&self) -> bool {
        let Self::Db(db_err) = self else {
            return false;
        };
        match &*db_err.kind {
            ErrorKind::Write(WriteFailure::WriteError(write_err)) => {
                write_err.code == DUPLICATE_KEY
            }
            ErrorKind::Command(cmd_err) => cmd_err.code == DUPLICATE_KEY,
            _ => false,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = match &self {
            Self::NotFound(_) => Status::NotFound,
            Self::Validation(_) | Self::NotAVoter(_) => Status::UnprocessableEntity,
            Self::Unauthorized(_) => Status::Unauthorized,
            Self::VotingClosed(_) | Self::InvalidCandidate { .. } => Status::BadRequest,
            Self::NotEligible(_) | Self::ResultsNotAvailable(_) => Status::Forbidden,
            Self::AlreadyVoted(_, _) => Status::Conflict,
            Self::Db(_) | Self::Argon2(_) => Status::InternalServerError,
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature | JwtErrorKind::ImmatureSignature => {
                    Status::Unauthorized
                }
                _ => Status::BadRequest,
            },
        };
        if status.code >= 500 {
            error!("{self}");
        } else {
            warn!("{self}");
        }
        Err(status)
    }
}
