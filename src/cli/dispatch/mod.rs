//! Command-line argument dispatch and server initialization.
//!
//! Maps validated CLI matches to the server action with its full
//! configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{tokens, twofactor};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches.get_one::<String>("dsn").cloned();
    let frontend_url = matches.get_one::<String>("frontend-url").cloned();
    let backend_public_key = matches.get_one::<String>("backend-public-key").cloned();

    let token_opts = tokens::Options::parse(matches)?;
    let twofactor_opts = twofactor::Options::parse(matches)?;

    Ok(Action::Server(Box::new(Args {
        port,
        dsn,
        frontend_url,
        backend_public_key,
        issuer: token_opts.issuer,
        access_secret: token_opts.access_secret,
        refresh_secret: token_opts.refresh_secret,
        temp_secret: token_opts.temp_secret,
        access_ttl_seconds: token_opts.access_ttl_seconds,
        refresh_ttl_seconds: token_opts.refresh_ttl_seconds,
        temp_ttl_seconds: token_opts.temp_ttl_seconds,
        two_factor_key: twofactor_opts.sealing_key,
    })))
}
