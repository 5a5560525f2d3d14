//! Chunk retrieval over enabled documents.
//!
//! Three modes, picked by `[retrieval].mode`:
//!
//! - **keyword**: FTS5 `MATCH` on an OR-query of the question's terms; the
//!   score is the negated BM25 rank.
//! - **semantic**: embed the query and linear-scan cosine similarity over
//!   every stored chunk vector of the current model.
//! - **hybrid**: min-max normalize both channels to `[0, 1]` and combine
//!   as `(1 - α) · keyword + α · semantic`.
//!
//! Results are ordered by score descending, then document name, then chunk
//! index, and cut to `top_k`.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::config::RetrievalMode;
use crate::context::AppContext;
use crate::embedding::{blob_to_vec, cosine_similarity, embed_query};
use crate::models::RetrievedChunk;

/// Retrieve up to `limit` (default `top_k`) chunks relevant to `query`.
/// A blank query returns nothing.
pub async fn retrieve(
    ctx: &AppContext,
    query: &str,
    limit: Option<usize>,
) -> Result<Vec<RetrievedChunk>> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }

    let retrieval = &ctx.config.retrieval;
    let mode = effective_mode(retrieval.mode, ctx.embeddings_enabled());
    let limit = limit.unwrap_or(retrieval.top_k);

    let keyword = if matches!(mode, RetrievalMode::Keyword | RetrievalMode::Hybrid) {
        fetch_keyword_candidates(&ctx.pool, query, retrieval.candidate_k).await?
    } else {
        Vec::new()
    };

    let semantic = if mode.needs_embeddings() {
        let query_vec = embed_query(ctx.embedder.as_ref(), query).await?;
        fetch_vector_candidates(
            &ctx.pool,
            ctx.embedder.model_name(),
            &query_vec,
            retrieval.candidate_k,
        )
        .await?
    } else {
        Vec::new()
    };

    let mut results = match mode {
        RetrievalMode::Keyword => into_results(keyword),
        RetrievalMode::Semantic => into_results(semantic),
        RetrievalMode::Hybrid => merge_hybrid(&keyword, &semantic, retrieval.hybrid_alpha),
    };

    rank(&mut results, limit);
    tracing::debug!(mode = mode.as_str(), hits = results.len(), "retrieved chunks");
    Ok(results)
}

/// Keyword search stands in when vectors are unavailable.
fn effective_mode(configured: RetrievalMode, embeddings_enabled: bool) -> RetrievalMode {
    if configured.needs_embeddings() && !embeddings_enabled {
        RetrievalMode::Keyword
    } else {
        configured
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    chunk_id: String,
    document_id: String,
    document_name: String,
    chunk_index: i64,
    text: String,
    raw_score: f64,
}

/// Turn free text into an FTS5 query: every alphanumeric term quoted,
/// joined with OR. `None` when the text has no terms.
fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

async fn fetch_keyword_candidates(
    pool: &SqlitePool,
    query: &str,
    candidate_k: i64,
) -> Result<Vec<Candidate>> {
    let Some(match_expr) = fts_query(query) else {
        return Ok(Vec::new());
    };

    let rows = sqlx::query(
        r#"
        SELECT chunks_fts.chunk_id AS chunk_id, chunks_fts.document_id AS document_id,
               d.name AS document_name, c.chunk_index, c.text,
               bm25(chunks_fts) AS bm25_score
        FROM chunks_fts
        JOIN chunks c ON c.id = chunks_fts.chunk_id
        JOIN documents d ON d.id = chunks_fts.document_id
        WHERE chunks_fts MATCH ? AND d.enabled = 1
        ORDER BY bm25_score
        LIMIT ?
        "#,
    )
    .bind(&match_expr)
    .bind(candidate_k)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let bm25: f64 = row.get("bm25_score");
            Candidate {
                chunk_id: row.get("chunk_id"),
                document_id: row.get("document_id"),
                document_name: row.get("document_name"),
                chunk_index: row.get("chunk_index"),
                text: row.get("text"),
                raw_score: -bm25,
            }
        })
        .collect())
}

async fn fetch_vector_candidates(
    pool: &SqlitePool,
    model: &str,
    query_vec: &[f32],
    candidate_k: i64,
) -> Result<Vec<Candidate>> {
    let rows = sqlx::query(
        r#"
        SELECT cv.chunk_id, cv.document_id, d.name AS document_name,
               c.chunk_index, c.text, cv.embedding
        FROM chunk_vectors cv
        JOIN chunks c ON c.id = cv.chunk_id
        JOIN documents d ON d.id = cv.document_id
        WHERE d.enabled = 1 AND cv.model = ?
        "#,
    )
    .bind(model)
    .fetch_all(pool)
    .await?;

    let mut candidates: Vec<Candidate> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let similarity = cosine_similarity(query_vec, &blob_to_vec(&blob)) as f64;
            Candidate {
                chunk_id: row.get("chunk_id"),
                document_id: row.get("document_id"),
                document_name: row.get("document_name"),
                chunk_index: row.get("chunk_index"),
                text: row.get("text"),
                raw_score: similarity,
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.raw_score
            .partial_cmp(&a.raw_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(candidate_k.max(0) as usize);

    Ok(candidates)
}

fn into_results(candidates: Vec<Candidate>) -> Vec<RetrievedChunk> {
    candidates
        .into_iter()
        .map(|c| {
            let score = c.raw_score;
            to_result(c, score)
        })
        .collect()
}

fn to_result(c: Candidate, score: f64) -> RetrievedChunk {
    RetrievedChunk {
        chunk_id: c.chunk_id,
        document_id: c.document_id,
        document_name: c.document_name,
        chunk_index: c.chunk_index,
        text: c.text,
        score,
    }
}

/// Combine normalized keyword and semantic scores. A chunk missing from one
/// channel scores 0 there.
fn merge_hybrid(keyword: &[Candidate], semantic: &[Candidate], alpha: f64) -> Vec<RetrievedChunk> {
    let kw_map: HashMap<&str, f64> = normalize_scores(keyword)
        .into_iter()
        .map(|(c, s)| (c.chunk_id.as_str(), s))
        .collect();
    let vec_map: HashMap<&str, f64> = normalize_scores(semantic)
        .into_iter()
        .map(|(c, s)| (c.chunk_id.as_str(), s))
        .collect();

    let mut seen: HashMap<&str, &Candidate> = HashMap::new();
    for c in keyword.iter().chain(semantic.iter()) {
        seen.entry(c.chunk_id.as_str()).or_insert(c);
    }

    seen.into_iter()
        .map(|(chunk_id, cand)| {
            let k = kw_map.get(chunk_id).copied().unwrap_or(0.0);
            let v = vec_map.get(chunk_id).copied().unwrap_or(0.0);
            to_result(cand.clone(), (1.0 - alpha) * k + alpha * v)
        })
        .collect()
}

/// Min-max normalize scores to `[0, 1]`. Equal scores all become 1.0.
fn normalize_scores(candidates: &[Candidate]) -> Vec<(&Candidate, f64)> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let s_min = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::INFINITY, f64::min);
    let s_max = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::NEG_INFINITY, f64::max);

    candidates
        .iter()
        .map(|c| {
            let norm = if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (c.raw_score - s_min) / (s_max - s_min)
            };
            (c, norm)
        })
        .collect()
}

/// Sort: score desc, document name asc, chunk index asc. Then truncate.
fn rank(results: &mut Vec<RetrievedChunk>, limit: usize) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document_name.cmp(&b.document_name))
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
    });
    results.truncate(limit);
}
