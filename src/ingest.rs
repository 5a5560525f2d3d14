//! Document processing: extract → chunk → store → embed.
//!
//! [`process_document`] obtains a document's text (supplied by the caller,
//! downloaded for linked documents, or read from storage for uploads),
//! replaces its chunks and FTS rows in one transaction, then embeds the new
//! chunks. Embedding is non-fatal: a failed batch is logged and its chunks
//! stay pending until [`embed_pending`] picks them up.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::chunk::chunk_text;
use crate::context::AppContext;
use crate::documents;
use crate::embedding::vec_to_blob;
use crate::error::DocChatError;
use crate::extract;
use crate::fetch;
use crate::models::{Chunk, Document};

const FETCH_TIMEOUT_SECS: u64 = 60;

/// Outcome of processing one document.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessReport {
    pub document_id: String,
    pub name: String,
    pub characters: usize,
    pub chunks: usize,
    pub embedded: usize,
    pub embeddings_pending: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub document_id: String,
    pub name: String,
    pub error: String,
}

/// Outcome of [`process_pending`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: usize,
    pub failures: Vec<BatchFailure>,
}

/// Outcome of [`embed_pending`] / [`embed_rebuild`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmbedReport {
    pub total: usize,
    pub embedded: usize,
    pub failed: usize,
}

struct LoadedText {
    text: String,
    file_type: String,
    file_size: i64,
}

/// Extract, chunk, and embed one document.
///
/// With `content` given, that text is used verbatim and nothing is read or
/// downloaded.
pub async fn process_document(
    ctx: &AppContext,
    id: &str,
    content: Option<String>,
) -> Result<ProcessReport> {
    let doc = documents::get_document(&ctx.pool, id).await?;

    let loaded = match content {
        Some(text) => LoadedText {
            text,
            file_type: doc.file_type.clone(),
            file_size: doc.file_size,
        },
        None => load_text(ctx, &doc).await?,
    };

    if loaded.text.trim().is_empty() {
        return Err(DocChatError::InvalidInput(format!(
            "no text could be extracted from {}",
            doc.name
        ))
        .into());
    }

    let chunking = &ctx.config.chunking;
    let chunks = chunk_text(
        &doc.id,
        &loaded.text,
        chunking.chunk_chars,
        chunking.overlap_chars,
    );

    store_content(&ctx.pool, &doc.id, &loaded, &chunks).await?;

    let (embedded, embeddings_pending) = if ctx.embeddings_enabled() {
        embed_chunks(ctx, &chunks).await
    } else {
        (0, 0)
    };

    tracing::info!(
        id = %doc.id,
        name = %doc.name,
        chunks = chunks.len(),
        embedded,
        embeddings_pending,
        "processed document"
    );

    Ok(ProcessReport {
        document_id: doc.id,
        name: doc.name,
        characters: loaded.text.chars().count(),
        chunks: chunks.len(),
        embedded,
        embeddings_pending,
    })
}

/// Process every pending document in registration order. A failing document
/// is recorded and the batch continues.
pub async fn process_pending(ctx: &AppContext) -> Result<BatchReport> {
    let pending = documents::list_pending(&ctx.pool).await?;
    let mut report = BatchReport::default();

    for doc in pending {
        match process_document(ctx, &doc.id, None).await {
            Ok(_) => report.processed += 1,
            Err(e) => {
                tracing::warn!(id = %doc.id, name = %doc.name, error = %e, "processing failed");
                report.failed += 1;
                report.failures.push(BatchFailure {
                    document_id: doc.id,
                    name: doc.name,
                    error: format!("{:#}", e),
                });
            }
        }
    }

    tracing::info!(
        processed = report.processed,
        failed = report.failed,
        "processed pending documents"
    );
    Ok(report)
}

async fn load_text(ctx: &AppContext, doc: &Document) -> Result<LoadedText> {
    if doc.is_remote() {
        let client = fetch::http_client(FETCH_TIMEOUT_SECS)?;
        let fetched = fetch::fetch_url(&client, &doc.file_path).await?;
        let text = extract::extract_text(&fetched.bytes, &fetched.content_type)
            .with_context(|| format!("Failed to extract text from {}", doc.file_path))?;
        return Ok(LoadedText {
            text,
            file_type: fetched.content_type,
            file_size: fetched.bytes.len() as i64,
        });
    }

    let path = documents::stored_path(&ctx.config, doc);
    let bytes = std::fs::read(&path)
        .with_context(|| format!("Failed to read stored file {}", path.display()))?;
    let text = extract::extract_text(&bytes, &doc.file_type)
        .with_context(|| format!("Failed to extract text from {}", doc.name))?;

    Ok(LoadedText {
        text,
        file_type: doc.file_type.clone(),
        file_size: bytes.len() as i64,
    })
}

/// Save extracted text and swap in the new chunk set atomically.
async fn store_content(
    pool: &SqlitePool,
    document_id: &str,
    loaded: &LoadedText,
    chunks: &[Chunk],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE documents SET content = ?, file_type = ?, file_size = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&loaded.text)
    .bind(&loaded.file_type)
    .bind(loaded.file_size)
    .bind(chrono::Utc::now().timestamp())
    .bind(document_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chunks_fts WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

    for chunk in chunks {
        sqlx::query(
            "INSERT INTO chunks (id, document_id, chunk_index, text, hash) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO chunks_fts (chunk_id, document_id, text) VALUES (?, ?, ?)")
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(&chunk.text)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Embed freshly written chunks. Returns `(embedded, pending)`; never fails.
async fn embed_chunks(ctx: &AppContext, chunks: &[Chunk]) -> (usize, usize) {
    let pending: Vec<PendingChunk> = chunks
        .iter()
        .map(|c| PendingChunk {
            chunk_id: c.id.clone(),
            document_id: c.document_id.clone(),
            text: c.text.clone(),
            hash: c.hash.clone(),
        })
        .collect();

    let report = embed_batches(ctx, &pending).await;
    (report.embedded, report.failed)
}

/// Embed chunks that have no vector for the current model, or whose text
/// changed since they were embedded.
pub async fn embed_pending(ctx: &AppContext, limit: Option<usize>) -> Result<EmbedReport> {
    if !ctx.embeddings_enabled() {
        return Err(DocChatError::ProviderDisabled("embedding").into());
    }

    let pending = find_pending_chunks(&ctx.pool, ctx.embedder.model_name(), limit).await?;
    if pending.is_empty() {
        return Ok(EmbedReport::default());
    }

    let report = embed_batches(ctx, &pending).await;
    tracing::info!(
        total = report.total,
        embedded = report.embedded,
        failed = report.failed,
        "embedded pending chunks"
    );
    Ok(report)
}

/// Drop every stored vector and embed all chunks again.
pub async fn embed_rebuild(ctx: &AppContext) -> Result<EmbedReport> {
    if !ctx.embeddings_enabled() {
        return Err(DocChatError::ProviderDisabled("embedding").into());
    }

    let cleared = sqlx::query("DELETE FROM chunk_vectors")
        .execute(&ctx.pool)
        .await?
        .rows_affected();
    tracing::info!(cleared, "cleared stored vectors");

    embed_pending(ctx, None).await
}

struct PendingChunk {
    chunk_id: String,
    document_id: String,
    text: String,
    hash: String,
}

async fn embed_batches(ctx: &AppContext, pending: &[PendingChunk]) -> EmbedReport {
    let provider = ctx.embedder.as_ref();
    let model = provider.model_name().to_string();
    let dims = provider.dims();
    let batch_size = ctx.config.embedding.batch_size.max(1);

    let mut report = EmbedReport {
        total: pending.len(),
        ..EmbedReport::default()
    };

    for batch in pending.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();

        match provider.embed(&texts).await {
            Ok(vectors) => {
                for (item, vec) in batch.iter().zip(vectors.iter()) {
                    match upsert_vector(&ctx.pool, item, &model, dims, vec).await {
                        Ok(()) => report.embedded += 1,
                        Err(e) => {
                            tracing::warn!(chunk_id = %item.chunk_id, error = %e, "failed to store vector");
                            report.failed += 1;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(batch = batch.len(), error = %e, "embedding batch failed");
                report.failed += batch.len();
            }
        }
    }

    report
}

async fn find_pending_chunks(
    pool: &SqlitePool,
    model: &str,
    limit: Option<usize>,
) -> Result<Vec<PendingChunk>> {
    let limit_val = limit.map(|l| l as i64).unwrap_or(-1);

    let rows = sqlx::query(
        r#"
        SELECT c.id AS chunk_id, c.document_id, c.text, c.hash
        FROM chunks c
        LEFT JOIN chunk_vectors cv ON cv.chunk_id = c.id AND cv.model = ?
        WHERE cv.chunk_id IS NULL OR cv.hash != c.hash
        ORDER BY c.document_id, c.chunk_index
        LIMIT ?
        "#,
    )
    .bind(model)
    .bind(limit_val)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| PendingChunk {
            chunk_id: row.get("chunk_id"),
            document_id: row.get("document_id"),
            text: row.get("text"),
            hash: row.get("hash"),
        })
        .collect())
}

async fn upsert_vector(
    pool: &SqlitePool,
    chunk: &PendingChunk,
    model: &str,
    dims: usize,
    vector: &[f32],
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO chunk_vectors (chunk_id, document_id, model, dims, hash, embedding, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(chunk_id) DO UPDATE SET
            document_id = excluded.document_id,
            model = excluded.model,
            dims = excluded.dims,
            hash = excluded.hash,
            embedding = excluded.embedding,
            created_at = excluded.created_at
        "#,
    )
    .bind(&chunk.chunk_id)
    .bind(&chunk.document_id)
    .bind(model)
    .bind(dims as i64)
    .bind(&chunk.hash)
    .bind(vec_to_blob(vector))
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await?;

    Ok(())
}
