//! The authenticated principal and its public projection.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Primary user record as persisted in the store.
///
/// The private key is stored as an opaque client-encrypted blob; the server
/// never sees it in the clear. `signin_challenge` is single-use: it is
/// replaced on every successful signin and on credential rotation.
/// `token_valid_from` is the revocation watermark in unix milliseconds; any
/// token issued before it is invalid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub public_key: String,
    pub encrypted_private_key: String,
    pub signin_challenge: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_valid_from: Option<i64>,
    /// Encrypted TOTP secret blob, present once 2FA enrollment has started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub two_factor_secret: Option<String>,
    #[serde(default)]
    pub two_factor_enabled: bool,
    /// Whether the user has ever completed a 2FA check.
    #[serde(default)]
    pub two_factor_checked: bool,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl User {
    #[must_use]
    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            username: self.username.clone(),
            public_key: self.public_key.clone(),
            encrypted_private_key: self.encrypted_private_key.clone(),
            two_factor_enabled: self.two_factor_enabled,
            two_factor_checked: self.two_factor_checked,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Profile projection returned to clients. Never carries the challenge, the
/// revocation watermark, or the encrypted TOTP secret.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub public_key: String,
    pub encrypted_private_key: String,
    pub two_factor_enabled: bool,
    pub two_factor_checked: bool,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

/// Username lookup record: maps the chosen username to the generated id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsernameLookup {
    pub user_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: "2f4d".to_string(),
            username: "alice".to_string(),
            public_key: "pk".to_string(),
            encrypted_private_key: "epk".to_string(),
            signin_challenge: "challenge".to_string(),
            token_valid_from: Some(1_700_000_000_000),
            two_factor_secret: Some("ciphertext".to_string()),
            two_factor_enabled: true,
            two_factor_checked: false,
            created_at: 1_699_999_999_000,
            updated_at: None,
        }
    }

    #[test]
    fn profile_omits_secret_material() {
        let value = serde_json::to_value(sample_user().to_profile()).expect("serialize");
        let object = value.as_object().expect("object");
        assert!(!object.contains_key("signinChallenge"));
        assert!(!object.contains_key("twoFactorSecret"));
        assert!(!object.contains_key("tokenValidFrom"));
        assert_eq!(
            object.get("publicKey").and_then(serde_json::Value::as_str),
            Some("pk")
        );
    }

    #[test]
    fn stored_record_round_trips_camel_case() {
        let value = serde_json::to_value(sample_user()).expect("serialize");
        assert!(value.get("encryptedPrivateKey").is_some());
        let decoded: User = serde_json::from_value(value).expect("deserialize");
        assert_eq!(decoded.username, "alice");
        assert!(decoded.two_factor_enabled);
    }

    #[test]
    fn missing_optional_fields_default() {
        let decoded: User = serde_json::from_str(
            r#"{
                "id": "1",
                "username": "bob",
                "publicKey": "pk",
                "encryptedPrivateKey": "epk",
                "signinChallenge": "c",
                "createdAt": 1
            }"#,
        )
        .expect("deserialize");
        assert_eq!(decoded.token_valid_from, None);
        assert!(!decoded.two_factor_enabled);
        assert!(!decoded.two_factor_checked);
    }
}
