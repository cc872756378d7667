//! Signed session tokens.
//!
//! HS256 JWTs with claims `{iss, user, iat, exp}` in three flavors: access
//! (short-lived, authorizes self-service operations), refresh (long-lived,
//! only mints new pairs) and temp (very short-lived, proves a passed
//! challenge while a 2FA check is still pending). Each flavor signs with its
//! own secret so a leaked secret compromises one token class only and a
//! token minted for one purpose can never be replayed as another.
//!
//! Access verification soft-fails (`None`): callers must distinguish
//! "unauthenticated" from "server error". Refresh and temp verification
//! hard-fail: both start privileged flows with no softer path.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_ACCESS_TTL_SECONDS: i64 = 900;
pub const DEFAULT_REFRESH_TTL_SECONDS: i64 = 60 * 60 * 24 * 30;
pub const DEFAULT_TEMP_TTL_SECONDS: i64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub iss: String,
    /// Subject user id. The token asserts identity only; ownership and
    /// revocation are always checked against the live user record.
    pub user: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid key")]
    Key,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid issuer")]
    InvalidIssuer,
}

/// Immutable signing configuration, loaded once at startup and shared across
/// requests. Tests inject distinct secrets per scenario.
pub struct TokenConfig {
    issuer: String,
    access_secret: SecretString,
    refresh_secret: SecretString,
    temp_secret: SecretString,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    temp_ttl_seconds: i64,
}

impl TokenConfig {
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        access_secret: SecretString,
        refresh_secret: SecretString,
        temp_secret: SecretString,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            access_secret,
            refresh_secret,
            temp_secret,
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            temp_ttl_seconds: DEFAULT_TEMP_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, ttl: i64) -> Self {
        self.access_ttl_seconds = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, ttl: i64) -> Self {
        self.refresh_ttl_seconds = ttl;
        self
    }

    #[must_use]
    pub fn with_temp_ttl_seconds(mut self, ttl: i64) -> Self {
        self.temp_ttl_seconds = ttl;
        self
    }
}

#[derive(Clone)]
pub struct TokenEngine {
    config: Arc<TokenConfig>,
}

impl TokenEngine {
    #[must_use]
    pub fn new(config: TokenConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.config.access_ttl_seconds
    }

    /// # Errors
    /// Returns an error if claim encoding or signing fails.
    pub fn issue_access_token(&self, user_id: &str) -> Result<String, Error> {
        self.sign_at(
            &self.config.access_secret,
            self.config.access_ttl_seconds,
            user_id,
            now_unix_seconds(),
        )
    }

    /// # Errors
    /// Returns an error if claim encoding or signing fails.
    pub fn issue_refresh_token(&self, user_id: &str) -> Result<String, Error> {
        self.sign_at(
            &self.config.refresh_secret,
            self.config.refresh_ttl_seconds,
            user_id,
            now_unix_seconds(),
        )
    }

    /// # Errors
    /// Returns an error if claim encoding or signing fails.
    pub fn issue_temp_token(&self, user_id: &str) -> Result<String, Error> {
        self.sign_at(
            &self.config.temp_secret,
            self.config.temp_ttl_seconds,
            user_id,
            now_unix_seconds(),
        )
    }

    /// Soft verification against the access secret: `None` on any failure.
    #[must_use]
    pub fn verify_access_token(&self, token: &str) -> Option<TokenClaims> {
        self.verify_at(&self.config.access_secret, token, now_unix_seconds())
            .ok()
    }

    /// Hard verification against the refresh secret.
    ///
    /// # Errors
    /// Returns the precise validation failure; callers surface `Unauthorized`.
    pub fn verify_refresh_token(&self, token: &str) -> Result<TokenClaims, Error> {
        self.verify_at(&self.config.refresh_secret, token, now_unix_seconds())
    }

    /// Hard verification against the temp secret.
    ///
    /// # Errors
    /// Returns the precise validation failure; callers surface `Unauthorized`.
    pub fn verify_temp_token(&self, token: &str) -> Result<TokenClaims, Error> {
        self.verify_at(&self.config.temp_secret, token, now_unix_seconds())
    }

    fn sign_at(
        &self,
        secret: &SecretString,
        ttl_seconds: i64,
        user_id: &str,
        now: i64,
    ) -> Result<String, Error> {
        let claims = TokenClaims {
            iss: self.config.issuer.clone(),
            user: user_id.to_string(),
            iat: now,
            exp: now + ttl_seconds,
        };

        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let claims_b64 = b64e_json(&claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
            .map_err(|_| Error::Key)?;
        mac.update(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    fn verify_at(
        &self,
        secret: &SecretString,
        token: &str,
        now: i64,
    ) -> Result<TokenClaims, Error> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(Error::TokenFormat)?;
        let claims_b64 = parts.next().ok_or(Error::TokenFormat)?;
        let sig_b64 = parts.next().ok_or(Error::TokenFormat)?;
        if parts.next().is_some() {
            return Err(Error::TokenFormat);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != "HS256" {
            return Err(Error::UnsupportedAlg(header.alg));
        }

        let signing_input = format!("{header_b64}.{claims_b64}");
        let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| Error::Base64)?;
        let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
            .map_err(|_| Error::Key)?;
        mac.update(signing_input.as_bytes());
        // Constant-time comparison.
        mac.verify_slice(&signature)
            .map_err(|_| Error::InvalidSignature)?;

        let claims: TokenClaims = b64d_json(claims_b64)?;
        if claims.iss != self.config.issuer {
            return Err(Error::InvalidIssuer);
        }
        if claims.exp <= now {
            return Err(Error::Expired);
        }

        Ok(claims)
    }
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub(crate) fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn engine() -> TokenEngine {
        TokenEngine::new(TokenConfig::new(
            "sesamo.test",
            SecretString::from("access-secret".to_string()),
            SecretString::from("refresh-secret".to_string()),
            SecretString::from("temp-secret".to_string()),
        ))
    }

    fn config(engine: &TokenEngine) -> &TokenConfig {
        engine.config.as_ref()
    }

    #[test]
    fn sign_and_verify_round_trips() -> Result<(), Error> {
        let engine = engine();
        let token = engine.sign_at(&config(&engine).access_secret, 900, "user-1", NOW)?;

        let claims = engine.verify_at(&config(&engine).access_secret, &token, NOW + 10)?;
        assert_eq!(claims.user, "user-1");
        assert_eq!(claims.iss, "sesamo.test");
        assert_eq!(claims.iat, NOW);
        assert_eq!(claims.exp, NOW + 900);
        Ok(())
    }

    #[test]
    fn tampered_signature_is_rejected() -> Result<(), Error> {
        let engine = engine();
        let token = engine.sign_at(&config(&engine).access_secret, 900, "user-1", NOW)?;

        let mut tampered = token.clone();
        let last = tampered.pop().expect("token is not empty");
        tampered.push(if last == 'A' { 'B' } else { 'A' });

        let result = engine.verify_at(&config(&engine).access_secret, &tampered, NOW);
        assert!(matches!(
            result,
            Err(Error::InvalidSignature | Error::Base64)
        ));
        Ok(())
    }

    #[test]
    fn token_classes_do_not_cross_verify() -> Result<(), Error> {
        let engine = engine();
        let access = engine.sign_at(&config(&engine).access_secret, 900, "user-1", NOW)?;
        let temp = engine.sign_at(&config(&engine).temp_secret, 300, "user-1", NOW)?;

        // An access token presented on the refresh path, and a temp token on
        // the access path, both fail the MAC.
        let result = engine.verify_at(&config(&engine).refresh_secret, &access, NOW);
        assert!(matches!(result, Err(Error::InvalidSignature)));
        let result = engine.verify_at(&config(&engine).access_secret, &temp, NOW);
        assert!(matches!(result, Err(Error::InvalidSignature)));
        Ok(())
    }

    #[test]
    fn expired_token_is_rejected() -> Result<(), Error> {
        let engine = engine();
        let token = engine.sign_at(&config(&engine).access_secret, 900, "user-1", NOW)?;

        let result = engine.verify_at(&config(&engine).access_secret, &token, NOW + 900);
        assert!(matches!(result, Err(Error::Expired)));
        Ok(())
    }

    #[test]
    fn foreign_issuer_is_rejected() -> Result<(), Error> {
        let issuer_a = engine();
        let token = issuer_a.sign_at(&config(&issuer_a).access_secret, 900, "user-1", NOW)?;

        let issuer_b = TokenEngine::new(TokenConfig::new(
            "somewhere.else",
            SecretString::from("access-secret".to_string()),
            SecretString::from("refresh-secret".to_string()),
            SecretString::from("temp-secret".to_string()),
        ));
        let result = issuer_b.verify_at(&config(&issuer_b).access_secret, &token, NOW);
        assert!(matches!(result, Err(Error::InvalidIssuer)));
        Ok(())
    }

    #[test]
    fn access_verification_soft_fails() {
        let engine = engine();
        assert!(engine.verify_access_token("garbage").is_none());
        assert!(engine.verify_access_token("a.b").is_none());
        assert!(engine.verify_access_token("").is_none());
    }

    #[test]
    fn refresh_verification_hard_fails() {
        let engine = engine();
        let result = engine.verify_refresh_token("not-a-token");
        assert!(matches!(result, Err(Error::TokenFormat)));
    }

    #[test]
    fn issued_tokens_verify_through_public_paths() -> Result<(), Error> {
        let engine = engine();

        let access = engine.issue_access_token("user-1")?;
        assert_eq!(
            engine.verify_access_token(&access).map(|c| c.user),
            Some("user-1".to_string())
        );

        let refresh = engine.issue_refresh_token("user-1")?;
        assert_eq!(engine.verify_refresh_token(&refresh)?.user, "user-1");

        let temp = engine.issue_temp_token("user-1")?;
        assert_eq!(engine.verify_temp_token(&temp)?.user, "user-1");
        Ok(())
    }

    #[test]
    fn default_ttls_are_ordered() {
        assert!(DEFAULT_TEMP_TTL_SECONDS < DEFAULT_ACCESS_TTL_SECONDS);
        assert!(DEFAULT_ACCESS_TTL_SECONDS < DEFAULT_REFRESH_TTL_SECONDS);
    }

    #[test]
    fn unsupported_algorithm_is_rejected() -> Result<(), Error> {
        let engine = engine();
        // Forge a token whose header claims "none".
        let header = Base64UrlUnpadded::encode_string(br#"{"alg":"none","typ":"JWT"}"#);
        let token = engine.sign_at(&config(&engine).access_secret, 900, "user-1", NOW)?;
        let claims_b64 = token.split('.').nth(1).expect("claims segment").to_string();
        let forged = format!("{header}.{claims_b64}.");

        let result = engine.verify_at(&config(&engine).access_secret, &forged, NOW);
        assert!(matches!(result, Err(Error::UnsupportedAlg(_))));
        Ok(())
    }
}
