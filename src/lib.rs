//! # Sesamo (Passwordless Authentication Service)
//!
//! `sesamo` proves identity by possession of an asymmetric private key
//! instead of a password. The server stores each user's public key together
//! with a client-encrypted copy of the private key, and issues a single-use
//! random challenge that is handed out encrypted under the user's own public
//! key; decrypting it is the proof of possession.
//!
//! ## Sessions
//!
//! Sessions are rotating signed tokens in three classes with disjoint
//! secrets: short-lived access tokens, long-lived refresh tokens, and
//! very-short-lived temp tokens that only bridge the gap between a passed
//! challenge and a pending TOTP check. Device-wide revocation is a single
//! watermark timestamp on the user record; no per-token state is kept.
//!
//! ## Two-Factor
//!
//! An optional TOTP step-up can be required at signin. Secrets are sealed
//! with ChaCha20-Poly1305 before they reach the store and are bound to the
//! owning user id, so ciphertext cannot be transplanted between records.

pub mod api;
pub mod auth;
pub mod cli;
pub mod store;
pub mod users;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
