//! Protocol error taxonomy.
//!
//! Every operation resolves to exactly one of these outcomes. `Forbidden`
//! (a failed proof of possession: wrong challenge or wrong code) is kept
//! distinct from `Unauthorized` (missing, invalid, expired, or revoked
//! token) because clients must be able to tell them apart.

use crate::auth::crypto::CryptoError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid username")]
    InvalidUsername,
    #[error("user already exists")]
    AlreadyExists,
    #[error("not found")]
    NotFound,
    #[error("bad request")]
    BadRequest,
    #[error("forbidden")]
    Forbidden,
    #[error("unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("internal error")]
    Unknown,
}

impl Error {
    /// Stable error code exposed in response bodies. Internals never leak.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidUsername => "INVALID_USERNAME",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::NotFound => "NOT_FOUND",
            Self::BadRequest => "BAD_REQUEST",
            Self::Forbidden => "FORBIDDEN",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Crypto(_) => "CRYPTO_ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists => Self::AlreadyExists,
            StoreError::NotFound => Self::NotFound,
            // An unguarded write lost a race; nothing actionable for the caller.
            StoreError::Conflict | StoreError::Backend(_) => Self::Unknown,
        }
    }
}
