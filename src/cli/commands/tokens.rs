//! Token engine arguments: issuer, the three signing secrets, and TTLs.

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_ISSUER: &str = "issuer";
pub const ARG_ACCESS_TOKEN_SECRET: &str = "access-token-secret";
pub const ARG_REFRESH_TOKEN_SECRET: &str = "refresh-token-secret";
pub const ARG_TEMP_TOKEN_SECRET: &str = "temp-token-secret";
pub const ARG_ACCESS_TOKEN_TTL: &str = "access-token-ttl";
pub const ARG_REFRESH_TOKEN_TTL: &str = "refresh-token-ttl";
pub const ARG_TEMP_TOKEN_TTL: &str = "temp-token-ttl";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ISSUER)
                .long(ARG_ISSUER)
                .help("Issuer claim stamped into every token")
                .default_value("sesamo")
                .env("SESAMO_ISSUER"),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_SECRET)
                .long(ARG_ACCESS_TOKEN_SECRET)
                .help("HS256 secret for access tokens")
                .env("SESAMO_ACCESS_TOKEN_SECRET")
                .required(true),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_SECRET)
                .long(ARG_REFRESH_TOKEN_SECRET)
                .help("HS256 secret for refresh tokens")
                .env("SESAMO_REFRESH_TOKEN_SECRET")
                .required(true),
        )
        .arg(
            Arg::new(ARG_TEMP_TOKEN_SECRET)
                .long(ARG_TEMP_TOKEN_SECRET)
                .help("HS256 secret for pre-2FA temp tokens")
                .env("SESAMO_TEMP_TOKEN_SECRET")
                .required(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL)
                .long(ARG_ACCESS_TOKEN_TTL)
                .help("Access token lifetime in seconds")
                .default_value("900")
                .env("SESAMO_ACCESS_TOKEN_TTL")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL)
                .long(ARG_REFRESH_TOKEN_TTL)
                .help("Refresh token lifetime in seconds")
                .default_value("2592000")
                .env("SESAMO_REFRESH_TOKEN_TTL")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_TEMP_TOKEN_TTL)
                .long(ARG_TEMP_TOKEN_TTL)
                .help("Temp (pre-2FA) token lifetime in seconds")
                .default_value("300")
                .env("SESAMO_TEMP_TOKEN_TTL")
                .value_parser(clap::value_parser!(i64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub issuer: String,
    pub access_secret: SecretString,
    pub refresh_secret: SecretString,
    pub temp_secret: SecretString,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub temp_ttl_seconds: i64,
}

impl Options {
    /// # Errors
    /// Returns an error when a required secret is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let secret = |arg: &str| -> Result<SecretString> {
            matches
                .get_one::<String>(arg)
                .cloned()
                .map(SecretString::from)
                .with_context(|| format!("missing required argument: --{arg}"))
        };

        Ok(Self {
            issuer: matches
                .get_one::<String>(ARG_ISSUER)
                .cloned()
                .unwrap_or_else(|| "sesamo".to_string()),
            access_secret: secret(ARG_ACCESS_TOKEN_SECRET)?,
            refresh_secret: secret(ARG_REFRESH_TOKEN_SECRET)?,
            temp_secret: secret(ARG_TEMP_TOKEN_SECRET)?,
            access_ttl_seconds: matches
                .get_one::<i64>(ARG_ACCESS_TOKEN_TTL)
                .copied()
                .unwrap_or(900),
            refresh_ttl_seconds: matches
                .get_one::<i64>(ARG_REFRESH_TOKEN_TTL)
                .copied()
                .unwrap_or(2_592_000),
            temp_ttl_seconds: matches
                .get_one::<i64>(ARG_TEMP_TOKEN_TTL)
                .copied()
                .unwrap_or(300),
        })
    }
}
