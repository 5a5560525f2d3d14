//! TOML configuration.
//!
//! Every command reads one config file (default `./config/dchat.toml`).
//! Secrets are never stored here: the OpenAI key comes from the
//! `OPENAI_API_KEY` environment variable.
//!
//! ```toml
//! [db]
//! path = "./data/dchat.sqlite"
//!
//! [storage]
//! root = "./data/files"
//!
//! [chunking]
//! chunk_chars = 1000
//! overlap_chars = 200
//!
//! [retrieval]
//! mode = "semantic"
//! top_k = 5
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [chat]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory uploaded files are copied into.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/files")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_chunk_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}

/// How candidate chunks are scored.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Keyword,
    Semantic,
    Hybrid,
}

impl RetrievalMode {
    pub fn needs_embeddings(self) -> bool {
        matches!(self, RetrievalMode::Semantic | RetrievalMode::Hybrid)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RetrievalMode::Keyword => "keyword",
            RetrievalMode::Semantic => "semantic",
            RetrievalMode::Hybrid => "hybrid",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_mode")]
    pub mode: RetrievalMode,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_candidate_k")]
    pub candidate_k: i64,
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f64,
    #[serde(default = "default_snippet_count")]
    pub snippet_count: usize,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            top_k: default_top_k(),
            candidate_k: default_candidate_k(),
            hybrid_alpha: default_hybrid_alpha(),
            snippet_count: default_snippet_count(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

fn default_mode() -> RetrievalMode {
    RetrievalMode::Semantic
}
fn default_top_k() -> usize {
    5
}
fn default_candidate_k() -> i64 {
    80
}
fn default_hybrid_alpha() -> f64 {
    0.6
}
fn default_snippet_count() -> usize {
    3
}
fn default_snippet_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (OpenAI-compatible gateway or Ollama host).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embed_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_embed_retries(),
            timeout_secs: default_embed_timeout(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embed_retries() -> u32 {
    5
}
fn default_embed_timeout() -> u64 {
    30
}
fn default_max_input_chars() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_chat_retries")]
    pub max_retries: u32,
    #[serde(default = "default_chat_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_no_documents_message")]
    pub no_documents_message: String,
    #[serde(default = "default_no_results_message")]
    pub no_results_message: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_chat_retries(),
            timeout_secs: default_chat_timeout(),
            system_prompt: default_system_prompt(),
            no_documents_message: default_no_documents_message(),
            no_results_message: default_no_results_message(),
        }
    }
}

impl ChatConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    500
}
fn default_chat_retries() -> u32 {
    3
}
fn default_chat_timeout() -> u64 {
    60
}
fn default_system_prompt() -> String {
    "You are a helpful assistant that answers questions based on excerpts from documents. \
     Always state which documents you used to answer the question. \
     If the documents do not contain relevant information, say so clearly."
        .to_string()
}
fn default_no_documents_message() -> String {
    "No documents are currently enabled for search. Please enable at least one document."
        .to_string()
}
fn default_no_results_message() -> String {
    "No relevant information was found in the enabled documents.".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}
fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.pdf".to_string(),
        "**/*.docx".to_string(),
        "**/*.md".to_string(),
        "**/*.txt".to_string(),
    ]
}

/// One top-level catalog category, optionally split into subcategories.
#[derive(Debug, Deserialize, Clone)]
pub struct CatalogEntry {
    pub title: String,
    #[serde(default)]
    pub subcategories: Vec<String>,
}

impl Config {
    /// A config with every section defaulted and providers disabled.
    ///
    /// Used by tests and as a base for programmatic construction.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            storage: StorageConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig {
                mode: RetrievalMode::Keyword,
                ..RetrievalConfig::default()
            },
            embedding: EmbeddingConfig::default(),
            chat: ChatConfig::default(),
            server: ServerConfig::default(),
            import: ImportConfig::default(),
            catalog: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_chars == 0 {
            bail!("chunking.chunk_chars must be > 0");
        }
        if self.chunking.overlap_chars >= self.chunking.chunk_chars {
            bail!("chunking.overlap_chars must be < chunking.chunk_chars");
        }

        if self.retrieval.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }
        if self.retrieval.candidate_k < 1 {
            bail!("retrieval.candidate_k must be >= 1");
        }
        if self.retrieval.snippet_count > self.retrieval.top_k {
            bail!("retrieval.snippet_count must be <= retrieval.top_k");
        }
        if !(0.0..=1.0).contains(&self.retrieval.hybrid_alpha) {
            bail!("retrieval.hybrid_alpha must be in [0.0, 1.0]");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
                other
            ),
        }
        if self.embedding.is_enabled() {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.batch_size == 0 {
                bail!("embedding.batch_size must be > 0");
            }
        }

        match self.chat.provider.as_str() {
            "disabled" | "openai" | "ollama" => {}
            other => bail!(
                "Unknown chat provider: '{}'. Must be disabled, openai, or ollama.",
                other
            ),
        }
        if self.chat.is_enabled() && self.chat.model.is_none() {
            bail!(
                "chat.model must be specified when provider is '{}'",
                self.chat.provider
            );
        }

        if self.retrieval.mode.needs_embeddings() && !self.embedding.is_enabled() {
            bail!(
                "retrieval.mode '{}' requires embeddings. Set [embedding] provider in config.",
                self.retrieval.mode.as_str()
            );
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_defaults_applied() {
        let cfg = parse(
            r#"
            [db]
            path = "x.sqlite"

            [retrieval]
            mode = "keyword"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.chunking.chunk_chars, 1000);
        assert_eq!(cfg.chunking.overlap_chars, 200);
        assert_eq!(cfg.retrieval.top_k, 5);
        assert_eq!(cfg.retrieval.snippet_count, 3);
        assert_eq!(cfg.retrieval.snippet_chars, 200);
        assert_eq!(cfg.chat.max_tokens, 500);
        assert!(!cfg.embedding.is_enabled());
        assert!(!cfg.chat.is_enabled());
    }

    #[test]
    fn test_semantic_mode_requires_embeddings() {
        let err = parse(
            r#"
            [db]
            path = "x.sqlite"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("requires embeddings"));
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let err = parse(
            r#"
            [db]
            path = "x.sqlite"

            [chunking]
            chunk_chars = 100
            overlap_chars = 100

            [retrieval]
            mode = "keyword"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("overlap_chars"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = parse(
            r#"
            [db]
            path = "x.sqlite"

            [retrieval]
            mode = "keyword"

            [chat]
            provider = "mystery"
            model = "m"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown chat provider"));
    }

    #[test]
    fn test_embedding_requires_model_and_dims() {
        let err = parse(
            r#"
            [db]
            path = "x.sqlite"

            [embedding]
            provider = "openai"
            model = "text-embedding-3-small"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_catalog_parsed() {
        let cfg = parse(
            r#"
            [db]
            path = "x.sqlite"

            [retrieval]
            mode = "keyword"

            [[catalog]]
            title = "Association"
            subcategories = ["Bylaws", "Minutes"]

            [[catalog]]
            title = "Privacy"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.catalog.len(), 2);
        assert_eq!(cfg.catalog[0].subcategories, vec!["Bylaws", "Minutes"]);
        assert!(cfg.catalog[1].subcategories.is_empty());
    }

    #[test]
    fn test_retrieval_mode_parsed_lowercase() {
        let cfg = parse(
            r#"
            [db]
            path = "x.sqlite"

            [retrieval]
            mode = "hybrid"

            [embedding]
            provider = "ollama"
            model = "nomic-embed-text"
            dims = 768
            "#,
        )
        .unwrap();
        assert_eq!(cfg.retrieval.mode, RetrievalMode::Hybrid);

        let err = parse(
            r#"
            [db]
            path = "x.sqlite"

            [retrieval]
            mode = "fuzzy"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown variant"));
    }

    #[test]
    fn test_minimal_is_valid() {
        Config::minimal("db.sqlite").validate().unwrap();
    }
}
