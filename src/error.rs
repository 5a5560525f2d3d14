//! Classifiable failures.
//!
//! Library code returns `anyhow::Result` everywhere. The variants below are
//! raised (via `.into()`) for failures a caller may want to tell apart, and
//! the HTTP layer recovers them with `anyhow::Error::downcast_ref`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocChatError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} provider is disabled")]
    ProviderDisabled(&'static str),

    #[error("unsupported: {0}")]
    Unsupported(String),
}
