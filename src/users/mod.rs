//! User records and the repository that maps them onto the store contract.

pub mod model;
pub mod repo;

pub use model::{User, UserProfile};
pub use repo::{ChallengeRotation, UserRepo};
