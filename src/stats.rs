//! Library statistics.
//!
//! A quick summary of what is registered and searchable: document counts,
//! processing and embedding coverage, and stored bytes. Used by `dchat stats`
//! and `GET /stats`.

use anyhow::Result;
use serde::Serialize;
use sqlx::Row;

use crate::context::AppContext;

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub documents: i64,
    pub enabled: i64,
    pub pending: i64,
    pub chunks: i64,
    pub embedded_chunks: i64,
    pub total_bytes: i64,
    pub embedding_model: Option<String>,
}

pub async fn collect_stats(ctx: &AppContext) -> Result<Stats> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS documents,
            COALESCE(SUM(CASE WHEN enabled = 1 THEN 1 ELSE 0 END), 0) AS enabled,
            COALESCE(SUM(CASE WHEN content IS NULL THEN 1 ELSE 0 END), 0) AS pending,
            COALESCE(SUM(file_size), 0) AS total_bytes
        FROM documents
        "#,
    )
    .fetch_one(&ctx.pool)
    .await?;

    let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&ctx.pool)
        .await?;

    let embedding_model = if ctx.embeddings_enabled() {
        ctx.config.embedding.model.clone()
    } else {
        None
    };

    let embedded_chunks: i64 = match &embedding_model {
        Some(model) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors WHERE model = ?")
                .bind(model)
                .fetch_one(&ctx.pool)
                .await?
        }
        None => 0,
    };

    Ok(Stats {
        documents: row.get("documents"),
        enabled: row.get("enabled"),
        pending: row.get("pending"),
        chunks,
        embedded_chunks,
        total_bytes: row.get("total_bytes"),
        embedding_model,
    })
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}
