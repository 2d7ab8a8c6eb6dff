pub mod issue_token;
pub mod server;

// Internal "interpreter" for `Action`.
mod run;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::warn;

use crate::{
    cli::commands::store::{Backend, Options as StoreOptions},
    clock::SystemClock,
    store::{MemoryStore, RedisStore, TtlStore},
    throttle::SecurityPolicy,
    token::TokenConfig,
    warden::Warden,
};

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    IssueToken(issue_token::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> Result<()> {
        run::execute(self).await
    }
}

/// Connect the configured store and wire a [`Warden`] over it.
async fn build_warden(
    store: &StoreOptions,
    policy: SecurityPolicy,
    tokens: TokenConfig,
) -> Result<Arc<Warden>> {
    let backend: Arc<dyn TtlStore> = match store.backend {
        Backend::Redis => Arc::new(
            RedisStore::connect(&store.redis_url, store.timeout)
                .await
                .context("Could not connect to Redis")?,
        ),
        Backend::Memory => {
            warn!("using the in-memory store: state is lost on exit and not shared between instances");
            Arc::new(MemoryStore::default())
        }
    };

    let warden = Warden::new(backend, Arc::new(SystemClock), policy, tokens)
        .context("invalid configuration")?;
    Ok(Arc::new(warden))
}
