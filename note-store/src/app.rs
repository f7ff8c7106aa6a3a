//! Store setup and initialization
//!
//! `NoteStore` wires the pool, cache, save coordinator and key settings
//! together and hands out repositories that share them.

use crate::config::StoreConfig;
use crate::crypto::{KeyParams, KeySource};
use crate::database::{create_memory_pool, create_pool, Executor, NoteRepository, TagRepository};
use crate::error::Result;
use crate::storage::{NoteCache, SaveCoordinator};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// Honors `RUST_LOG`; defaults to `note_store=debug,info`. Calling this
/// again once a subscriber is set does nothing.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "note_store=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// An open note store
#[derive(Clone)]
pub struct NoteStore {
    pub notes: NoteRepository,
    pub tags: TagRepository,
    exec: Executor,
    cache: Arc<NoteCache>,
}

impl NoteStore {
    /// Open (or create) the database named by `config`
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        tracing::info!("Opening note store");

        let pool = create_pool(&config.database_path).await?;
        let keys = KeySource::new(
            config.passphrase.clone(),
            config.salt.clone(),
            KeyParams {
                cost: config.key_cost,
                memory_kib: config.key_memory_kib,
            },
        );

        Ok(Self::from_pool(pool, keys))
    }

    /// Store backed by a private in-memory database
    pub async fn in_memory(keys: KeySource) -> Result<Self> {
        let pool = create_memory_pool().await?;
        Ok(Self::from_pool(pool, keys))
    }

    /// Build a store over a pool whose schema is already in place
    pub fn from_pool(pool: SqlitePool, keys: KeySource) -> Self {
        let exec = Executor::new(pool);
        let cache = Arc::new(NoteCache::new());
        let saves = Arc::new(SaveCoordinator::new());

        Self {
            notes: NoteRepository::new(exec.clone(), cache.clone(), saves, Arc::new(keys)),
            tags: TagRepository::new(exec.clone(), cache.clone()),
            exec,
            cache,
        }
    }

    pub fn executor(&self) -> &Executor {
        &self.exec
    }

    pub fn cache(&self) -> &NoteCache {
        &self.cache
    }

    /// Close the pool; pending statements finish first
    pub async fn close(&self) {
        self.exec.pool().close().await;
        tracing::info!("Note store closed");
    }
}

/// Cheap key settings so tests don't pay for real derivation
#[cfg(test)]
pub(crate) fn test_key_source() -> KeySource {
    KeySource::new(
        "test-passphrase",
        "test-salt-value",
        KeyParams {
            cost: 1,
            memory_kib: 64,
        },
    )
}
