//! User repository over the store contract.
//!
//! Composes the two records that make up a user (primary + username lookup)
//! and owns the conditional updates that keep the signin challenge
//! single-use under concurrent requests.

use super::model::{User, UsernameLookup};
use crate::store::{Record, RecordKind, Store, StoreError};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Outcome of a challenge-gated update. A version conflict means another
/// request consumed the same challenge first and is reported as a mismatch.
#[derive(Debug)]
pub enum ChallengeRotation {
    Rotated(User),
    Mismatch,
}

#[derive(Clone)]
pub struct UserRepo {
    store: Arc<dyn Store>,
}

impl UserRepo {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Creates the primary and lookup records for a new user.
    ///
    /// The lookup record is created first: its key is the username, so it is
    /// the uniqueness guard when two signups race on the same name.
    ///
    /// # Errors
    /// [`StoreError::AlreadyExists`] when the username is taken.
    pub async fn create(
        &self,
        username: &str,
        public_key: &str,
        encrypted_private_key: &str,
    ) -> Result<User, StoreError> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            public_key: public_key.to_string(),
            encrypted_private_key: encrypted_private_key.to_string(),
            signin_challenge: Uuid::new_v4().to_string(),
            token_valid_from: None,
            two_factor_secret: None,
            two_factor_enabled: false,
            two_factor_checked: false,
            created_at: now_unix_millis(),
            updated_at: None,
        };

        let lookup = serde_json::to_value(UsernameLookup {
            user_id: user.id.clone(),
        })
        .map_err(corrupt)?;
        self.store
            .create(Record::new(username, RecordKind::UsernameLookup, lookup))
            .await?;

        let payload = serde_json::to_value(&user).map_err(corrupt)?;
        if let Err(err) = self
            .store
            .create(Record::new(user.id.as_str(), RecordKind::User, payload))
            .await
        {
            // Do not leave a dangling lookup behind.
            let _ = self.store.delete(username, RecordKind::UsernameLookup).await;
            return Err(err);
        }

        Ok(user)
    }

    /// # Errors
    /// Fails only on store/deserialization errors; a missing user is `None`.
    pub async fn get_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.load(user_id).await?.map(|(user, _)| user))
    }

    /// # Errors
    /// Fails only on store/deserialization errors; a missing user is `None`.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let Some(record) = self.store.get(username, RecordKind::UsernameLookup).await? else {
            return Ok(None);
        };
        let lookup: UsernameLookup = serde_json::from_value(record.payload).map_err(corrupt)?;
        self.get_by_id(&lookup.user_id).await
    }

    /// Consumes the current signin challenge if `presented` matches it.
    ///
    /// The rotation is a compare-and-swap on the record version read together
    /// with the challenge, so two requests presenting the same challenge
    /// cannot both succeed; the loser observes a mismatch.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] when the user does not exist.
    pub async fn rotate_challenge_if_matches(
        &self,
        user_id: &str,
        presented: &str,
    ) -> Result<ChallengeRotation, StoreError> {
        let (mut user, version) = self.load(user_id).await?.ok_or(StoreError::NotFound)?;
        if user.signin_challenge != presented {
            return Ok(ChallengeRotation::Mismatch);
        }

        user.signin_challenge = Uuid::new_v4().to_string();
        user.updated_at = Some(now_unix_millis());
        match self.write(&user, Some(version)).await {
            Ok(user) => Ok(ChallengeRotation::Rotated(user)),
            Err(StoreError::Conflict) => Ok(ChallengeRotation::Mismatch),
            Err(err) => Err(err),
        }
    }

    /// Replaces the encrypted private key after re-proving challenge
    /// possession; rotates the challenge and bumps the revocation watermark
    /// in the same conditional write.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] when the user does not exist.
    pub async fn rotate_credentials_if_matches(
        &self,
        user_id: &str,
        presented: &str,
        encrypted_private_key: &str,
    ) -> Result<ChallengeRotation, StoreError> {
        let (mut user, version) = self.load(user_id).await?.ok_or(StoreError::NotFound)?;
        if user.signin_challenge != presented {
            return Ok(ChallengeRotation::Mismatch);
        }

        let now = now_unix_millis();
        user.encrypted_private_key = encrypted_private_key.to_string();
        user.signin_challenge = Uuid::new_v4().to_string();
        user.token_valid_from = Some(now);
        user.updated_at = Some(now);
        match self.write(&user, Some(version)).await {
            Ok(user) => Ok(ChallengeRotation::Rotated(user)),
            Err(StoreError::Conflict) => Ok(ChallengeRotation::Mismatch),
            Err(err) => Err(err),
        }
    }

    /// Sets the revocation watermark to now, invalidating every token issued
    /// before this instant on any device.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] when the user does not exist.
    pub async fn set_token_valid_from(&self, user_id: &str) -> Result<User, StoreError> {
        self.mutate(user_id, |user| {
            user.token_valid_from = Some(now_unix_millis());
        })
        .await
    }

    /// # Errors
    /// [`StoreError::NotFound`] when the user does not exist.
    pub async fn save_two_factor_secret(
        &self,
        user_id: &str,
        ciphertext: &str,
    ) -> Result<User, StoreError> {
        let ciphertext = ciphertext.to_string();
        self.mutate(user_id, move |user| {
            user.two_factor_secret = Some(ciphertext);
        })
        .await
    }

    /// # Errors
    /// [`StoreError::NotFound`] when the user does not exist.
    pub async fn enable_two_factor(&self, user_id: &str) -> Result<User, StoreError> {
        self.mutate(user_id, |user| {
            user.two_factor_enabled = true;
            user.two_factor_checked = true;
        })
        .await
    }

    /// # Errors
    /// [`StoreError::NotFound`] when the user does not exist.
    pub async fn disable_two_factor(&self, user_id: &str) -> Result<User, StoreError> {
        self.mutate(user_id, |user| {
            user.two_factor_enabled = false;
        })
        .await
    }

    /// # Errors
    /// [`StoreError::NotFound`] when the user does not exist.
    pub async fn mark_two_factor_checked(&self, user_id: &str) -> Result<User, StoreError> {
        self.mutate(user_id, |user| {
            user.two_factor_checked = true;
        })
        .await
    }

    /// Removes the primary record and the username lookup record.
    ///
    /// A lookup that is already gone (from an earlier partial deletion) does
    /// not fail the operation; any other lookup failure does.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] when the user does not exist.
    pub async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        let (user, _) = self.load(user_id).await?.ok_or(StoreError::NotFound)?;
        self.store.delete(&user.id, RecordKind::User).await?;
        match self
            .store
            .delete(&user.username, RecordKind::UsernameLookup)
            .await
        {
            Ok(()) | Err(StoreError::NotFound) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Store liveness, surfaced by the health endpoint.
    ///
    /// # Errors
    /// Propagates the store's probe failure.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }

    async fn load(&self, user_id: &str) -> Result<Option<(User, i64)>, StoreError> {
        let Some(record) = self.store.get(user_id, RecordKind::User).await? else {
            return Ok(None);
        };
        let user: User = serde_json::from_value(record.payload).map_err(corrupt)?;
        Ok(Some((user, record.version)))
    }

    async fn mutate(
        &self,
        user_id: &str,
        apply: impl FnOnce(&mut User) + Send,
    ) -> Result<User, StoreError> {
        let (mut user, _) = self.load(user_id).await?.ok_or(StoreError::NotFound)?;
        apply(&mut user);
        user.updated_at = Some(now_unix_millis());
        // Field overwrites are last-write-wins; only challenge consumption
        // needs the version guard.
        self.write(&user, None).await
    }

    async fn write(&self, user: &User, expected_version: Option<i64>) -> Result<User, StoreError> {
        let payload = serde_json::to_value(user).map_err(corrupt)?;
        self.store
            .update(&user.id, RecordKind::User, payload, expected_version)
            .await?;
        Ok(user.clone())
    }
}

fn corrupt(err: serde_json::Error) -> StoreError {
    StoreError::Backend(format!("corrupt record payload: {err}"))
}

pub(crate) fn now_unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
