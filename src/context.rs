//! Shared handles for one process: config, database pool, and providers.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, DisabledEmbedder, EmbeddingProvider};
use crate::llm::{create_chat_provider, ChatProvider, DisabledChat};
use crate::migrate;

/// Everything the pipeline needs. Cheap to clone.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub chat: Arc<dyn ChatProvider>,
}

impl AppContext {
    /// Connect to the database (creating and migrating it if needed) and
    /// build the providers named in `config`.
    pub async fn open(config: Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let chat = create_chat_provider(&config.chat)?;
        let pool = db::connect(&config).await?;
        migrate::run_migrations(&pool).await?;

        Ok(Self {
            config: Arc::new(config),
            pool,
            embedder,
            chat,
        })
    }

    /// Like [`AppContext::open`] but with both providers disabled, for
    /// commands that only touch the database and storage. No API key needed.
    pub async fn open_storage(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(
            config,
            pool,
            Arc::new(DisabledEmbedder),
            Arc::new(DisabledChat),
        ))
    }

    /// Assemble a context from parts. Tests use this to inject stub providers.
    pub fn new(
        config: Config,
        pool: SqlitePool,
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatProvider>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            pool,
            embedder,
            chat,
        }
    }

    /// Whether chunk vectors should be produced and used.
    pub fn embeddings_enabled(&self) -> bool {
        self.config.embedding.is_enabled()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
