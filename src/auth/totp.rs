//! Time-based one-time code step-up.
//!
//! Codes are 6-digit SHA-1 TOTP over a 30 second step with a skew of one
//! step either way, so codes from the adjacent windows are accepted to
//! absorb client clock drift. The secret and its provisioning URI are kept
//! confidential at rest: they are sealed with ChaCha20-Poly1305 under a
//! process-wide key, with the ciphertext bound to the owning user id through
//! the AAD so a blob copied between records will not open.

use crate::auth::error::Error;
use crate::users::{User, UserRepo};
use base64ct::{Base64, Encoding};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::error;

const TOTP_DIGITS: usize = 6;
const TOTP_SKEW: u8 = 1;
const TOTP_STEP: u64 = 30;

/// What gets sealed and persisted: the base32 secret plus the otpauth URI
/// shown to the user at enrollment time.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TwoFactorSecret {
    secret: String,
    uri: String,
}

#[derive(Clone)]
pub struct TwoFactorEngine {
    users: UserRepo,
    key: [u8; 32],
    issuer: String,
}

impl TwoFactorEngine {
    #[must_use]
    pub fn new(users: UserRepo, key: [u8; 32], issuer: impl Into<String>) -> Self {
        Self {
            users,
            key,
            issuer: issuer.into(),
        }
    }

    /// Begins enrollment: generates a fresh secret bound to the username and
    /// the service display name, seals it, persists the ciphertext, and
    /// returns the provisioning URI for display. Re-enrollment overwrites
    /// any previous secret.
    ///
    /// # Errors
    /// Fails if secret generation, sealing, or persistence fails.
    pub async fn generate_secret(&self, user: &User) -> Result<String, Error> {
        let secret_bytes = Secret::generate_secret().to_bytes().map_err(|err| {
            error!("TOTP secret generation failed: {err:?}");
            Error::Unknown
        })?;

        let totp = TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW,
            TOTP_STEP,
            secret_bytes,
            Some(self.issuer.clone()),
            user.username.clone(),
        )
        .map_err(|err| {
            error!("TOTP init failed: {err}");
            Error::Unknown
        })?;

        let uri = totp.get_url();
        let record = TwoFactorSecret {
            secret: totp.get_secret_base32(),
            uri: uri.clone(),
        };
        let plaintext = serde_json::to_vec(&record).map_err(|err| {
            error!("TOTP secret encoding failed: {err}");
            Error::Unknown
        })?;
        let sealed = seal(&self.key, &plaintext, &user.id)?;

        self.users
            .save_two_factor_secret(&user.id, &Base64::encode_string(&sealed))
            .await?;

        Ok(uri)
    }

    /// Checks a submitted code against the stored secret.
    ///
    /// Returns `false` when no secret is provisioned. A stored blob that
    /// fails to open or parse signals a bad request rather than a crash.
    ///
    /// # Errors
    /// [`Error::BadRequest`] when the stored secret is missing its shape.
    pub fn verify_code(&self, user: &User, code: &str) -> Result<bool, Error> {
        let Some(ciphertext) = user.two_factor_secret.as_deref() else {
            return Ok(false);
        };

        let sealed = Base64::decode_vec(ciphertext).map_err(|_| Error::BadRequest)?;
        let plaintext = open(&self.key, &sealed, &user.id)?;
        let record: TwoFactorSecret =
            serde_json::from_slice(&plaintext).map_err(|_| Error::BadRequest)?;

        let secret_bytes = Secret::Encoded(record.secret)
            .to_bytes()
            .map_err(|_| Error::BadRequest)?;
        let totp = TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW,
            TOTP_STEP,
            secret_bytes,
            Some(self.issuer.clone()),
            user.username.clone(),
        )
        .map_err(|_| Error::BadRequest)?;

        Ok(totp.check_current(code).unwrap_or(false))
    }
}

/// Seals `plaintext` under the process key. Layout: `nonce (12) || ciphertext`.
fn seal(key: &[u8; 32], plaintext: &[u8], user_id: &str) -> Result<Vec<u8>, Error> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad = construct_aad(user_id);
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|err| {
            error!("secret sealing failed: {err}");
            Error::Unknown
        })?;

    let mut sealed = Vec::with_capacity(nonce_bytes.len() + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Opens a sealed blob. Expects `nonce (12) || ciphertext`.
fn open(key: &[u8; 32], sealed: &[u8], user_id: &str) -> Result<Vec<u8>, Error> {
    if sealed.len() < 12 {
        return Err(Error::BadRequest);
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(12);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let aad = construct_aad(user_id);
    cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| Error::BadRequest)
}

fn construct_aad(user_id: &str) -> Vec<u8> {
    format!("two-factor-secret:v1|{user_id}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    const KEY: [u8; 32] = [42u8; 32];

    fn engine() -> (TwoFactorEngine, UserRepo) {
        let users = UserRepo::new(Arc::new(MemoryStore::new()));
        (TwoFactorEngine::new(users.clone(), KEY, "sesamo.test"), users)
    }

    #[test]
    fn seal_open_round_trips() -> Result<(), Error> {
        let sealed = seal(&KEY, b"my-secret-seed-123", "user-1")?;
        assert_ne!(sealed.as_slice(), b"my-secret-seed-123".as_slice());

        let opened = open(&KEY, &sealed, "user-1")?;
        assert_eq!(opened, b"my-secret-seed-123");
        Ok(())
    }

    #[test]
    fn open_fails_for_wrong_user() -> Result<(), Error> {
        let sealed = seal(&KEY, b"seed", "user-1")?;
        let result = open(&KEY, &sealed, "user-2");
        assert!(matches!(result, Err(Error::BadRequest)));
        Ok(())
    }

    #[test]
    fn open_fails_on_tampered_ciphertext() -> Result<(), Error> {
        let mut sealed = seal(&KEY, b"seed", "user-1")?;
        let last = sealed.len() - 1;
        if let Some(byte) = sealed.get_mut(last) {
            *byte ^= 0xFF;
        }

        let result = open(&KEY, &sealed, "user-1");
        assert!(matches!(result, Err(Error::BadRequest)));
        Ok(())
    }

    #[tokio::test]
    async fn enrollment_then_correct_code_verifies() -> Result<(), Error> {
        let (engine, users) = engine();
        let user = users.create("alice", "pk", "epk").await?;

        let uri = engine.generate_secret(&user).await?;
        assert!(uri.starts_with("otpauth://totp/"));

        // Reload: the engine persisted the sealed secret.
        let user = users.get_by_id(&user.id).await?.expect("user exists");
        assert!(user.two_factor_secret.is_some());

        let totp = TOTP::from_url(&uri).expect("provisioning uri parses");
        let code = totp.generate_current().expect("clock is past the epoch");
        assert!(engine.verify_code(&user, &code)?);
        Ok(())
    }

    #[tokio::test]
    async fn wrong_code_is_rejected() -> Result<(), Error> {
        let (engine, users) = engine();
        let user = users.create("alice", "pk", "epk").await?;
        let uri = engine.generate_secret(&user).await?;
        let user = users.get_by_id(&user.id).await?.expect("user exists");

        let totp = TOTP::from_url(&uri).expect("provisioning uri parses");
        let code = totp.generate_current().expect("clock is past the epoch");
        // Guaranteed different from the real code, same length.
        let wrong: String = code
            .chars()
            .map(|c| if c == '0' { '1' } else { '0' })
            .collect();
        assert!(!engine.verify_code(&user, &wrong)?);
        Ok(())
    }

    #[tokio::test]
    async fn missing_secret_is_false_not_error() -> Result<(), Error> {
        let (engine, users) = engine();
        let user = users.create("alice", "pk", "epk").await?;
        assert!(!engine.verify_code(&user, "123456")?);
        Ok(())
    }

    #[tokio::test]
    async fn corrupted_stored_secret_is_bad_request() -> Result<(), Error> {
        let (engine, users) = engine();
        let user = users.create("alice", "pk", "epk").await?;
        users
            .save_two_factor_secret(&user.id, "bm90IGEgc2VhbGVkIGJsb2I=")
            .await?;
        let user = users.get_by_id(&user.id).await?.expect("user exists");

        let result = engine.verify_code(&user, "123456");
        assert!(matches!(result, Err(Error::BadRequest)));
        Ok(())
    }

    #[tokio::test]
    async fn reenrollment_overwrites_previous_secret() -> Result<(), Error> {
        let (engine, users) = engine();
        let user = users.create("alice", "pk", "epk").await?;

        let first_uri = engine.generate_secret(&user).await?;
        let user = users.get_by_id(&user.id).await?.expect("user exists");
        let second_uri = engine.generate_secret(&user).await?;
        assert_ne!(first_uri, second_uri);

        // Only the newest secret verifies.
        let user = users.get_by_id(&user.id).await?.expect("user exists");
        let totp = TOTP::from_url(&second_uri).expect("provisioning uri parses");
        let code = totp.generate_current().expect("clock is past the epoch");
        assert!(engine.verify_code(&user, &code)?);
        Ok(())
    }
}
