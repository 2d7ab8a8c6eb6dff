use anyhow::{Context, Result};
use tracing::info;

use crate::{
    cli::{actions::build_warden, commands::store::Options as StoreOptions},
    throttle::SecurityPolicy,
    token::TokenConfig,
};

#[derive(Debug)]
pub struct Args {
    pub subject: String,
    pub authorities: Vec<String>,
    pub store: StoreOptions,
    pub tokens: TokenConfig,
}

/// Issue a token pair and print it as JSON on stdout.
/// # Errors
/// Returns an error if the store is unreachable or the tokens cannot be issued.
pub async fn execute(args: Args) -> Result<()> {
    let warden = build_warden(&args.store, SecurityPolicy::default(), args.tokens).await?;

    let pair = warden
        .issue_token_pair(&args.subject, &args.authorities)
        .await
        .context("Could not issue token pair")?;

    info!(subject = %args.subject, "token pair issued");

    println!("{}", serde_json::to_string_pretty(&pair)?);

    Ok(())
}
