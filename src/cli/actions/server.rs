use crate::api;
use crate::auth::{AuthService, TokenConfig, TokenEngine, TwoFactorEngine};
use crate::store::{MemoryStore, PostgresStore, Store};
use crate::users::UserRepo;
use anyhow::{Context, Result, anyhow};
use base64ct::{Base64, Encoding};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub frontend_url: Option<String>,
    pub backend_public_key: Option<String>,
    pub issuer: String,
    pub access_secret: SecretString,
    pub refresh_secret: SecretString,
    pub temp_secret: SecretString,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub temp_ttl_seconds: i64,
    pub two_factor_key: SecretString,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the store connection fails, the sealing key is not a
/// base64 32-byte value, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let store: Arc<dyn Store> = match &args.dsn {
        Some(dsn) => Arc::new(
            PostgresStore::connect(dsn)
                .await
                .context("Failed to connect to database")?,
        ),
        None => {
            warn!("No --dsn given; falling back to the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let users = UserRepo::new(store);
    let tokens = TokenEngine::new(
        TokenConfig::new(
            args.issuer.clone(),
            args.access_secret,
            args.refresh_secret,
            args.temp_secret,
        )
        .with_access_ttl_seconds(args.access_ttl_seconds)
        .with_refresh_ttl_seconds(args.refresh_ttl_seconds)
        .with_temp_ttl_seconds(args.temp_ttl_seconds),
    );

    let sealing_key = decode_sealing_key(&args.two_factor_key)?;
    let two_factor = TwoFactorEngine::new(users.clone(), sealing_key, args.issuer);

    let auth = AuthService::new(users, tokens, two_factor);

    let config = api::ApiConfig {
        backend_public_key: args.backend_public_key,
        frontend_base_url: args.frontend_url,
    };

    api::new(args.port, auth, config).await
}

fn decode_sealing_key(key: &SecretString) -> Result<[u8; 32]> {
    let bytes = Base64::decode_vec(key.expose_secret().trim())
        .map_err(|_| anyhow!("--two-factor-key is not valid base64"))?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| anyhow!("--two-factor-key must decode to exactly 32 bytes"))
}
