//! Authentication orchestrator.
//!
//! Composes the crypto, token and two-factor engines with the user
//! repository into the protocol state machine:
//! `Unauthenticated -> ChallengeIssued -> ChallengeAnswered ->
//! (TwoFactorPending | Authenticated)`.

use crate::auth::crypto;
use crate::auth::error::Error;
use crate::auth::token::{self, TokenEngine};
use crate::auth::totp::TwoFactorEngine;
use crate::users::{ChallengeRotation, User, UserRepo};
use regex::Regex;
use tracing::error;

/// A freshly minted access/refresh pair. `expires_in` is the access-token
/// TTL in seconds.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Outcome of a successful challenge match: either a full pair, or a temp
/// token when the account still owes a 2FA check.
#[derive(Debug)]
pub enum SigninOutcome {
    Tokens(TokenPair),
    TwoFactorPending { id: String, temp_token: String },
}

/// Public profile handed to unauthenticated callers so they can attempt
/// signin: the key blobs plus the current challenge, encrypted under the
/// user's own public key.
#[derive(Debug)]
pub struct PublicProfile {
    pub id: String,
    pub public_key: String,
    pub encrypted_private_key: String,
    pub encrypted_challenge: String,
}

#[derive(Clone)]
pub struct AuthService {
    users: UserRepo,
    tokens: TokenEngine,
    two_factor: TwoFactorEngine,
}

impl AuthService {
    #[must_use]
    pub fn new(users: UserRepo, tokens: TokenEngine, two_factor: TwoFactorEngine) -> Self {
        Self {
            users,
            tokens,
            two_factor,
        }
    }

    /// Registers a new user with their public key and client-encrypted
    /// private key. The server never receives the private key in the clear.
    ///
    /// # Errors
    /// `InvalidUsername`, `AlreadyExists`, or `Crypto` when the public key
    /// does not parse.
    pub async fn signup(
        &self,
        username: &str,
        public_key: &str,
        encrypted_private_key: &str,
    ) -> Result<User, Error> {
        let username = normalize_username(username);
        if !valid_username(&username) {
            return Err(Error::InvalidUsername);
        }
        // A key that cannot encrypt a challenge would make the account
        // unusable; reject it at the door.
        crypto::parse_public_key(public_key)?;

        let user = self
            .users
            .create(&username, public_key, encrypted_private_key)
            .await?;
        Ok(user)
    }

    /// Fetches the public profile by username, including the current signin
    /// challenge encrypted under the user's public key. Only the holder of
    /// the matching private key can learn the plaintext challenge.
    ///
    /// # Errors
    /// `NotFound` when the username is unknown.
    pub async fn public_profile(&self, username: &str) -> Result<PublicProfile, Error> {
        let username = normalize_username(username);
        let user = self
            .users
            .get_by_username(&username)
            .await?
            .ok_or(Error::NotFound)?;

        let encrypted_challenge = crypto::encrypt(&user.public_key, &user.signin_challenge)?;
        Ok(PublicProfile {
            id: user.id,
            public_key: user.public_key,
            encrypted_private_key: user.encrypted_private_key,
            encrypted_challenge,
        })
    }

    /// Completes the challenge-response exchange. The presented value must
    /// exactly match the stored challenge; on match the challenge is
    /// consumed and rotated before any token is issued, so a matched
    /// challenge can never be replayed.
    ///
    /// # Errors
    /// `BadRequest` for an unknown user, `Forbidden` on mismatch (including
    /// losing a race against a concurrent presenter of the same value).
    pub async fn signin(&self, username: &str, challenge: &str) -> Result<SigninOutcome, Error> {
        let username = normalize_username(username);
        let user = self
            .users
            .get_by_username(&username)
            .await?
            .ok_or(Error::BadRequest)?;

        match self
            .users
            .rotate_challenge_if_matches(&user.id, challenge)
            .await?
        {
            ChallengeRotation::Mismatch => Err(Error::Forbidden),
            ChallengeRotation::Rotated(user) => {
                if user.two_factor_enabled {
                    let temp_token = self
                        .tokens
                        .issue_temp_token(&user.id)
                        .map_err(signing_failure)?;
                    Ok(SigninOutcome::TwoFactorPending {
                        id: user.id,
                        temp_token,
                    })
                } else {
                    Ok(SigninOutcome::Tokens(self.issue_pair(&user.id)?))
                }
            }
        }
    }

    /// Completes the 2FA step-up with a temp token and a TOTP code. A wrong
    /// code leaves the temp token usable until its own expiry.
    ///
    /// # Errors
    /// `Unauthorized` for a bad/expired/revoked temp token, `Forbidden` for
    /// a wrong code.
    pub async fn verify_two_factor(
        &self,
        temp_token: &str,
        code: &str,
    ) -> Result<TokenPair, Error> {
        let claims = self
            .tokens
            .verify_temp_token(temp_token)
            .map_err(|_| Error::Unauthorized)?;
        let user = self
            .users
            .get_by_id(&claims.user)
            .await?
            .ok_or(Error::Unauthorized)?;
        if !issued_at_valid(&user, claims.iat) {
            return Err(Error::Unauthorized);
        }

        if !self.two_factor.verify_code(&user, code)? {
            return Err(Error::Forbidden);
        }

        self.users.mark_two_factor_checked(&user.id).await?;
        self.issue_pair(&user.id)
    }

    /// Exchanges a refresh token for a new pair. The previous refresh token
    /// stays valid until it expires or the watermark moves past it.
    ///
    /// # Errors
    /// `Unauthorized` on any validation failure, including a subject that no
    /// longer exists.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, Error> {
        let claims = self
            .tokens
            .verify_refresh_token(refresh_token)
            .map_err(|_| Error::Unauthorized)?;
        let user = self
            .users
            .get_by_id(&claims.user)
            .await?
            .ok_or(Error::Unauthorized)?;
        if !issued_at_valid(&user, claims.iat) {
            return Err(Error::Unauthorized);
        }

        self.issue_pair(&user.id)
    }

    /// Resolves a bearer access token to its live user. Rejects tokens
    /// issued before the revocation watermark even when cryptographically
    /// valid and unexpired.
    ///
    /// # Errors
    /// `Unauthorized` on any failure; callers cannot tell the reasons apart.
    pub async fn authenticate(&self, access_token: &str) -> Result<User, Error> {
        let claims = self
            .tokens
            .verify_access_token(access_token)
            .ok_or(Error::Unauthorized)?;
        let user = self
            .users
            .get_by_id(&claims.user)
            .await?
            .ok_or(Error::Unauthorized)?;
        if !issued_at_valid(&user, claims.iat) {
            return Err(Error::Unauthorized);
        }
        Ok(user)
    }

    /// Replaces the encrypted private key after the caller re-proves
    /// possession via the current challenge. Bumps the watermark, forcing
    /// re-authentication everywhere else.
    ///
    /// # Errors
    /// `Forbidden` when the presented challenge does not match.
    pub async fn change_credential(
        &self,
        user_id: &str,
        encrypted_private_key: &str,
        challenge: &str,
    ) -> Result<User, Error> {
        match self
            .users
            .rotate_credentials_if_matches(user_id, challenge, encrypted_private_key)
            .await?
        {
            ChallengeRotation::Mismatch => Err(Error::Forbidden),
            ChallengeRotation::Rotated(user) => Ok(user),
        }
    }

    /// "Log out everywhere": moves the watermark to now. The only
    /// revocation primitive; there is no per-token blacklist.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn logout_everywhere(&self, user_id: &str) -> Result<User, Error> {
        Ok(self.users.set_token_valid_from(user_id).await?)
    }

    /// Removes the user and their username lookup record.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn delete_account(&self, user_id: &str) -> Result<(), Error> {
        Ok(self.users.delete(user_id).await?)
    }

    /// Starts (or restarts) 2FA enrollment; returns the provisioning URI.
    ///
    /// # Errors
    /// Engine or store failures.
    pub async fn enroll_two_factor(&self, user: &User) -> Result<String, Error> {
        self.two_factor.generate_secret(user).await
    }

    /// Turns 2FA on once the submitted code proves the authenticator works.
    ///
    /// # Errors
    /// `Forbidden` when the code is wrong or no secret is enrolled.
    pub async fn enable_two_factor(&self, user: &User, code: &str) -> Result<User, Error> {
        if !self.two_factor.verify_code(user, code)? {
            return Err(Error::Forbidden);
        }
        Ok(self.users.enable_two_factor(&user.id).await?)
    }

    /// Turns 2FA off; gated by a valid code so a hijacked session cannot
    /// silently drop the second factor.
    ///
    /// # Errors
    /// `Forbidden` when the code is wrong or no secret is enrolled.
    pub async fn disable_two_factor(&self, user: &User, code: &str) -> Result<User, Error> {
        if !self.two_factor.verify_code(user, code)? {
            return Err(Error::Forbidden);
        }
        Ok(self.users.disable_two_factor(&user.id).await?)
    }

    /// Store liveness for the health endpoint.
    ///
    /// # Errors
    /// Propagates the store probe failure.
    pub async fn health(&self) -> Result<(), Error> {
        Ok(self.users.ping().await?)
    }

    fn issue_pair(&self, user_id: &str) -> Result<TokenPair, Error> {
        let access_token = self
            .tokens
            .issue_access_token(user_id)
            .map_err(signing_failure)?;
        let refresh_token = self
            .tokens
            .issue_refresh_token(user_id)
            .map_err(signing_failure)?;
        Ok(TokenPair {
            id: user_id.to_string(),
            access_token,
            refresh_token,
            expires_in: self.tokens.access_ttl_seconds(),
        })
    }
}

/// Tokens carry whole-second `iat`; the watermark is milliseconds. The
/// multiplication truncates the token to the start of its second, so a token
/// minted within the same second as a revocation counts as predating it:
/// revocation errs strict rather than leaving a sub-second acceptance hole.
fn issued_at_valid(user: &User, iat: i64) -> bool {
    match user.token_valid_from {
        Some(watermark) => iat.saturating_mul(1000) > watermark,
        None => true,
    }
}

fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// 3 to 32 characters, lowercase alphanumeric with `-`/`_`, starting with an
/// alphanumeric.
fn valid_username(username: &str) -> bool {
    Regex::new(r"^[a-z0-9][a-z0-9_-]{2,31}$").is_ok_and(|regex| regex.is_match(username))
}

fn signing_failure(err: token::Error) -> Error {
    error!("token signing failed: {err}");
    Error::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::crypto::test_keys::{TEST_PRIVATE_KEY_PEM, TEST_PUBLIC_KEY_PEM};
    use crate::auth::token::TokenConfig;
    use crate::store::MemoryStore;
    use secrecy::SecretString;
    use std::sync::Arc;
    use totp_rs::TOTP;

    fn service() -> (AuthService, UserRepo) {
        let users = UserRepo::new(Arc::new(MemoryStore::new()));
        let tokens = TokenEngine::new(TokenConfig::new(
            "sesamo.test",
            SecretString::from("access-secret".to_string()),
            SecretString::from("refresh-secret".to_string()),
            SecretString::from("temp-secret".to_string()),
        ));
        let two_factor = TwoFactorEngine::new(users.clone(), [7u8; 32], "sesamo.test");
        (
            AuthService::new(users.clone(), tokens, two_factor),
            users,
        )
    }

    async fn signup_alice(service: &AuthService) -> User {
        service
            .signup("alice", TEST_PUBLIC_KEY_PEM, "encrypted-private-key")
            .await
            .expect("signup succeeds")
    }

    #[tokio::test]
    async fn signup_rejects_bad_usernames() {
        let (service, _) = service();
        for bad in ["", "ab", "UPPER CASE", "-leading", "way#too@weird"] {
            let result = service.signup(bad, TEST_PUBLIC_KEY_PEM, "epk").await;
            assert!(
                matches!(result, Err(Error::InvalidUsername)),
                "expected rejection for {bad:?}"
            );
        }
    }

    #[tokio::test]
    async fn signup_rejects_duplicate_and_bad_key() {
        let (service, _) = service();
        signup_alice(&service).await;

        let result = service
            .signup("alice", TEST_PUBLIC_KEY_PEM, "epk")
            .await;
        assert!(matches!(result, Err(Error::AlreadyExists)));

        let result = service.signup("bob", "not a key", "epk").await;
        assert!(matches!(result, Err(Error::Crypto(_))));
    }

    #[tokio::test]
    async fn profile_challenge_decrypts_to_current_value() {
        let (service, users) = service();
        let user = signup_alice(&service).await;

        let profile = service.public_profile("alice").await.expect("profile");
        let challenge =
            crypto::decrypt(TEST_PRIVATE_KEY_PEM, &profile.encrypted_challenge).expect("decrypt");
        assert!(!challenge.is_empty());

        let stored = users
            .get_by_id(&user.id)
            .await
            .expect("store")
            .expect("user");
        assert_eq!(challenge, stored.signin_challenge);
    }

    #[tokio::test]
    async fn unknown_profile_is_not_found() {
        let (service, _) = service();
        let result = service.public_profile("nobody").await;
        assert!(matches!(result, Err(Error::NotFound)));
    }

    #[tokio::test]
    async fn signin_consumes_challenge_exactly_once() {
        let (service, _) = service();
        let user = signup_alice(&service).await;
        let challenge = user.signin_challenge.clone();

        let outcome = service.signin("alice", &challenge).await.expect("signin");
        let pair = match outcome {
            SigninOutcome::Tokens(pair) => pair,
            SigninOutcome::TwoFactorPending { .. } => panic!("2fa is not enabled"),
        };
        assert_eq!(pair.id, user.id);
        assert!(!pair.access_token.is_empty());

        // The same challenge value never works twice.
        let replay = service.signin("alice", &challenge).await;
        assert!(matches!(replay, Err(Error::Forbidden)));
    }

    #[tokio::test]
    async fn signin_error_classes_are_distinct() {
        let (service, _) = service();
        signup_alice(&service).await;

        let unknown_user = service.signin("nobody", "whatever").await;
        assert!(matches!(unknown_user, Err(Error::BadRequest)));

        let wrong_challenge = service.signin("alice", "wrong").await;
        assert!(matches!(wrong_challenge, Err(Error::Forbidden)));
    }

    #[tokio::test]
    async fn access_token_authenticates_until_revoked() {
        let (service, users) = service();
        let user = signup_alice(&service).await;

        let outcome = service
            .signin("alice", &user.signin_challenge)
            .await
            .expect("signin");
        let SigninOutcome::Tokens(pair) = outcome else {
            panic!("2fa is not enabled");
        };

        let authenticated = service
            .authenticate(&pair.access_token)
            .await
            .expect("token is valid");
        assert_eq!(authenticated.id, user.id);

        service
            .logout_everywhere(&user.id)
            .await
            .expect("logout succeeds");
        let result = service.authenticate(&pair.access_token).await;
        assert!(matches!(result, Err(Error::Unauthorized)));

        // Refresh tokens from before the revocation are dead too.
        let result = service.refresh(&pair.refresh_token).await;
        assert!(matches!(result, Err(Error::Unauthorized)));

        // A token whose second lies strictly after the watermark is accepted
        // again. The clock will not move inside this test, so check the
        // comparison directly against a watermark from the previous second.
        let claims = service
            .tokens
            .verify_access_token(&pair.access_token)
            .expect("token is still cryptographically valid");
        let mut rewound = users
            .get_by_id(&user.id)
            .await
            .expect("store")
            .expect("user");
        rewound.token_valid_from = Some(claims.iat.saturating_mul(1000) - 1);
        assert!(issued_at_valid(&rewound, claims.iat));
    }

    #[tokio::test]
    async fn refresh_mints_new_pair() {
        let (service, _) = service();
        let user = signup_alice(&service).await;

        let SigninOutcome::Tokens(pair) = service
            .signin("alice", &user.signin_challenge)
            .await
            .expect("signin")
        else {
            panic!("2fa is not enabled");
        };

        let refreshed = service.refresh(&pair.refresh_token).await.expect("refresh");
        assert_eq!(refreshed.id, user.id);
        assert!(!refreshed.access_token.is_empty());

        let garbage = service.refresh("tampered.token.value").await;
        assert!(matches!(garbage, Err(Error::Unauthorized)));
    }

    #[tokio::test]
    async fn refresh_for_deleted_subject_fails_gracefully() {
        let (service, _) = service();
        let user = signup_alice(&service).await;
        let SigninOutcome::Tokens(pair) = service
            .signin("alice", &user.signin_challenge)
            .await
            .expect("signin")
        else {
            panic!("2fa is not enabled");
        };

        service.delete_account(&user.id).await.expect("delete");
        let result = service.refresh(&pair.refresh_token).await;
        assert!(matches!(result, Err(Error::Unauthorized)));
    }

    #[tokio::test]
    async fn two_factor_gates_token_issuance() {
        let (service, users) = service();
        let user = signup_alice(&service).await;

        let uri = service.enroll_two_factor(&user).await.expect("enroll");
        let totp = TOTP::from_url(&uri).expect("uri parses");
        let user = users.get_by_id(&user.id).await.expect("store").expect("user");
        let code = totp.generate_current().expect("code");
        let enabled = service
            .enable_two_factor(&user, &code)
            .await
            .expect("enable");
        assert!(enabled.two_factor_enabled);

        // Signin now yields only a temp token.
        let outcome = service
            .signin("alice", &enabled.signin_challenge)
            .await
            .expect("signin");
        let SigninOutcome::TwoFactorPending { id, temp_token } = outcome else {
            panic!("expected a pending 2fa outcome");
        };
        assert_eq!(id, user.id);

        // Wrong code: Forbidden, temp token still usable.
        let wrong: String = code
            .chars()
            .map(|c| if c == '0' { '1' } else { '0' })
            .collect();
        let result = service.verify_two_factor(&temp_token, &wrong).await;
        assert!(matches!(result, Err(Error::Forbidden)));

        let code = totp.generate_current().expect("code");
        let pair = service
            .verify_two_factor(&temp_token, &code)
            .await
            .expect("step-up completes");
        assert!(!pair.access_token.is_empty());

        let checked = users.get_by_id(&user.id).await.expect("store").expect("user");
        assert!(checked.two_factor_checked);

        // A temp token is not an access token.
        let result = service.authenticate(&temp_token).await;
        assert!(matches!(result, Err(Error::Unauthorized)));
    }

    #[tokio::test]
    async fn tampered_temp_token_is_unauthorized() {
        let (service, _) = service();
        let result = service.verify_two_factor("junk.token.here", "123456").await;
        assert!(matches!(result, Err(Error::Unauthorized)));
    }

    #[tokio::test]
    async fn credential_change_requires_challenge_and_revokes() {
        let (service, _) = service();
        let user = signup_alice(&service).await;

        let wrong = service
            .change_credential(&user.id, "new-epk", "wrong-challenge")
            .await;
        assert!(matches!(wrong, Err(Error::Forbidden)));

        let updated = service
            .change_credential(&user.id, "new-epk", &user.signin_challenge)
            .await
            .expect("rotation succeeds");
        assert_eq!(updated.encrypted_private_key, "new-epk");
        assert_ne!(updated.signin_challenge, user.signin_challenge);
        assert!(updated.token_valid_from.is_some());
    }

    #[tokio::test]
    async fn disable_two_factor_requires_code() {
        let (service, users) = service();
        let user = signup_alice(&service).await;
        let uri = service.enroll_two_factor(&user).await.expect("enroll");
        let totp = TOTP::from_url(&uri).expect("uri parses");
        let user = users.get_by_id(&user.id).await.expect("store").expect("user");
        let code = totp.generate_current().expect("code");
        service
            .enable_two_factor(&user, &code)
            .await
            .expect("enable");

        let user = users.get_by_id(&user.id).await.expect("store").expect("user");
        let wrong = service.disable_two_factor(&user, "000000").await;
        // One in a million chance the fixed wrong code is the real one.
        if let Err(err) = wrong {
            assert!(matches!(err, Error::Forbidden));
        }

        let code = totp.generate_current().expect("code");
        let disabled = service
            .disable_two_factor(&user, &code)
            .await
            .expect("disable");
        assert!(!disabled.two_factor_enabled);
    }
}
