//! Core data models used throughout doc-chat.
//!
//! These types represent the documents, chunks, retrieval hits, and chat
//! answers that flow through the processing and question-answering pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered document: an uploaded file or a linked URL.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    /// Path relative to the storage root for uploads, or an http(s) URL.
    pub file_path: String,
    /// MIME type.
    pub file_type: String,
    pub file_size: i64,
    /// Only enabled documents take part in retrieval.
    pub enabled: bool,
    pub category: Option<String>,
    /// Whether text has been extracted.
    pub processed: bool,
    /// Extracted text. Omitted from listings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn is_remote(&self) -> bool {
        is_remote_path(&self.file_path)
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    /// Drop the extracted text, keeping only metadata.
    pub fn into_summary(mut self) -> Self {
        self.content = None;
        self
    }
}

/// Whether a `file_path` points at an external URL.
pub fn is_remote_path(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

/// Fields needed to insert a new document row.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub name: String,
    pub file_path: String,
    pub file_type: String,
    pub file_size: i64,
    pub enabled: bool,
    pub category: Option<String>,
}

/// Partial update applied by `documents::update_document`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentPatch {
    pub name: Option<String>,
    pub category: Option<String>,
    pub enabled: Option<bool>,
}

impl DocumentPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.category.is_none() && self.enabled.is_none()
    }
}

/// A chunk of a document's extracted text.
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A chunk selected by retrieval, with its parent document's name.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub document_name: String,
    pub chunk_index: i64,
    pub text: String,
    pub score: f64,
}

/// A document cited by an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
}

/// A short excerpt shown alongside an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub document: String,
    pub text: String,
}

/// The response to a chat question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub answer: String,
    pub sources: Vec<Source>,
    pub snippets: Vec<Snippet>,
}

pub(crate) fn ts_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}
