//! Two-factor arguments: the key that seals TOTP secrets at rest.

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_TWO_FACTOR_KEY: &str = "two-factor-key";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_TWO_FACTOR_KEY)
            .long(ARG_TWO_FACTOR_KEY)
            .help("Base64 32-byte key sealing TOTP secrets at rest")
            .env("SESAMO_TWO_FACTOR_KEY")
            .required(true),
    )
}

#[derive(Debug)]
pub struct Options {
    pub sealing_key: SecretString,
}

impl Options {
    /// # Errors
    /// Returns an error when the key is missing. Decoding happens at server
    /// startup where the error can name the argument.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let sealing_key = matches
            .get_one::<String>(ARG_TWO_FACTOR_KEY)
            .cloned()
            .map(SecretString::from)
            .with_context(|| format!("missing required argument: --{ARG_TWO_FACTOR_KEY}"))?;
        Ok(Self { sealing_key })
    }
}
