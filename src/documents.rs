//! Document registry: the `documents` table plus the local storage directory.
//!
//! Uploaded files are copied into `[storage].root` as `<uuid>-<filename>` and
//! the row's `file_path` holds that relative name. Linked documents keep their
//! http(s) URL in `file_path` and are downloaded when processed.
//!
//! New documents start enabled with `content = NULL` (pending).

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::DocChatError;
use crate::extract;
use crate::models::{is_remote_path, ts_to_datetime, Chunk, Document, DocumentPatch, NewDocument};

const DOCUMENT_COLUMNS: &str = "id, name, file_path, file_type, file_size, enabled, category, content, created_at, updated_at";

/// Register a local file: copy it into storage and insert a row.
pub async fn add_file(
    config: &Config,
    pool: &SqlitePool,
    path: &Path,
    name: Option<String>,
    category: Option<String>,
) -> Result<Document> {
    if !path.is_file() {
        return Err(DocChatError::InvalidInput(format!("not a file: {}", path.display())).into());
    }
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| DocChatError::InvalidInput(format!("no file name: {}", path.display())))?;

    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let content_type = extract::content_type_for_path(&filename);

    let mut new = store_upload(config, &filename, &bytes, Some(content_type))?;
    if let Some(name) = non_empty(name) {
        new.name = name;
    }
    new.category = non_empty(category);
    insert_document(pool, new).await
}

/// Register a linked document. The body is downloaded when the document is
/// processed.
pub async fn add_url(
    pool: &SqlitePool,
    url: &str,
    name: Option<String>,
    category: Option<String>,
    file_type: Option<String>,
) -> Result<Document> {
    let url = url.trim();
    if !is_remote_path(url) {
        return Err(
            DocChatError::InvalidInput(format!("not an http(s) URL: {}", url)).into(),
        );
    }

    let name = name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| name_from_url(url));
    let file_type = file_type
        .map(|t| extract::normalize_content_type(&t))
        .unwrap_or_else(|| extract::content_type_for_path(url).to_string());
    // Octet-stream is resolved from the response header at fetch time.
    if file_type != extract::MIME_OCTET && !extract::is_supported(&file_type) {
        return Err(DocChatError::Unsupported(format!(
            "{} has unsupported type {}",
            url, file_type
        ))
        .into());
    }

    insert_document(
        pool,
        NewDocument {
            name,
            file_path: url.to_string(),
            file_type,
            file_size: 0,
            enabled: true,
            category: non_empty(category),
        },
    )
    .await
}

/// Register an uploaded body under `filename`.
///
/// The content type is taken from `content_type` unless it is missing or
/// generic, in which case it is guessed from the file name.
pub async fn add_bytes(
    config: &Config,
    pool: &SqlitePool,
    filename: &str,
    bytes: &[u8],
    content_type: Option<&str>,
    category: Option<String>,
) -> Result<Document> {
    let mut new = store_upload(config, filename, bytes, content_type)?;
    new.category = non_empty(category);
    insert_document(pool, new).await
}

/// Validate an upload and copy it into the storage root.
fn store_upload(
    config: &Config,
    filename: &str,
    bytes: &[u8],
    content_type: Option<&str>,
) -> Result<NewDocument> {
    let filename = safe_file_name(filename)
        .ok_or_else(|| DocChatError::InvalidInput(format!("invalid file name: {:?}", filename)))?;
    if bytes.is_empty() {
        return Err(DocChatError::InvalidInput(format!("{} is empty", filename)).into());
    }

    let file_type = match content_type.map(extract::normalize_content_type) {
        Some(ct) if !ct.is_empty() && ct != extract::MIME_OCTET => ct,
        _ => extract::content_type_for_path(&filename).to_string(),
    };
    if !extract::is_supported(&file_type) {
        return Err(DocChatError::Unsupported(format!(
            "{} has unsupported type {}",
            filename, file_type
        ))
        .into());
    }

    let stored_name = format!("{}-{}", Uuid::new_v4(), filename);
    let root = &config.storage.root;
    std::fs::create_dir_all(root)
        .with_context(|| format!("Failed to create storage root {}", root.display()))?;
    let dest = root.join(&stored_name);
    std::fs::write(&dest, bytes).with_context(|| format!("Failed to write {}", dest.display()))?;

    tracing::info!(file = %filename, bytes = bytes.len(), "stored upload");

    Ok(NewDocument {
        name: filename,
        file_path: stored_name,
        file_type,
        file_size: bytes.len() as i64,
        enabled: true,
        category: None,
    })
}

pub async fn insert_document(pool: &SqlitePool, new: NewDocument) -> Result<Document> {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO documents (id, name, file_path, file_type, file_size, enabled, category, content, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&new.name)
    .bind(&new.file_path)
    .bind(&new.file_type)
    .bind(new.file_size)
    .bind(new.enabled)
    .bind(&new.category)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    tracing::debug!(%id, name = %new.name, "registered document");
    get_document(pool, &id).await
}

/// All documents, newest first, without their extracted text.
pub async fn list_documents(pool: &SqlitePool) -> Result<Vec<Document>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM documents ORDER BY created_at DESC, rowid DESC",
        DOCUMENT_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| row_to_document(row).into_summary())
        .collect())
}

/// Documents that have not been processed yet, oldest first, without
/// their extracted text.
pub async fn list_pending(pool: &SqlitePool) -> Result<Vec<Document>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM documents WHERE content IS NULL ORDER BY created_at ASC, rowid ASC",
        DOCUMENT_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| row_to_document(row).into_summary())
        .collect())
}

pub async fn count_enabled(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE enabled = 1")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn get_document(pool: &SqlitePool, id: &str) -> Result<Document> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM documents WHERE id = ?",
        DOCUMENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(row_to_document(&row)),
        None => Err(DocChatError::NotFound(id.to_string()).into()),
    }
}

/// A document's chunks in index order.
pub async fn get_chunks(pool: &SqlitePool, document_id: &str) -> Result<Vec<Chunk>> {
    let rows = sqlx::query(
        "SELECT id, document_id, chunk_index, text, hash FROM chunks WHERE document_id = ? ORDER BY chunk_index ASC",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Chunk {
            id: row.get("id"),
            document_id: row.get("document_id"),
            chunk_index: row.get("chunk_index"),
            text: row.get("text"),
            hash: row.get("hash"),
        })
        .collect())
}

pub async fn set_enabled(pool: &SqlitePool, id: &str, enabled: bool) -> Result<Document> {
    update_document(
        pool,
        id,
        &DocumentPatch {
            enabled: Some(enabled),
            ..DocumentPatch::default()
        },
    )
    .await
}

/// Apply a partial update. An empty `category` clears it.
pub async fn update_document(
    pool: &SqlitePool,
    id: &str,
    patch: &DocumentPatch,
) -> Result<Document> {
    let current = get_document(pool, id).await?;
    if patch.is_empty() {
        return Ok(current);
    }

    let name = match &patch.name {
        Some(n) if n.trim().is_empty() => {
            return Err(DocChatError::InvalidInput("name must not be empty".to_string()).into())
        }
        Some(n) => n.trim().to_string(),
        None => current.name,
    };
    let category = match &patch.category {
        Some(c) => non_empty(Some(c.clone())),
        None => current.category,
    };
    let enabled = patch.enabled.unwrap_or(current.enabled);

    sqlx::query(
        "UPDATE documents SET name = ?, category = ?, enabled = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&name)
    .bind(&category)
    .bind(enabled)
    .bind(chrono::Utc::now().timestamp())
    .bind(id)
    .execute(pool)
    .await?;

    tracing::info!(%id, enabled, "updated document");
    get_document(pool, id).await
}

/// Delete a document with its chunks, vectors, and stored file.
pub async fn delete_document(config: &Config, pool: &SqlitePool, id: &str) -> Result<()> {
    let doc = get_document(pool, id).await?;

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chunks_fts WHERE document_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    if !doc.is_remote() {
        let path = stored_path(config, &doc);
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "could not remove stored file");
        }
    }

    tracing::info!(%id, name = %doc.name, "deleted document");
    Ok(())
}

/// Absolute path of an uploaded document's stored copy.
pub fn stored_path(config: &Config, doc: &Document) -> PathBuf {
    config.storage.root.join(&doc.file_path)
}

/// Register every file under `root` that matches the import globs.
pub async fn import_dir(config: &Config, pool: &SqlitePool, root: &Path) -> Result<Vec<Document>> {
    if !root.is_dir() {
        return Err(
            DocChatError::InvalidInput(format!("not a directory: {}", root.display())).into(),
        );
    }

    let include_set = build_globset(&config.import.include_globs)?;
    let mut excludes = vec!["**/.git/**".to_string(), "**/node_modules/**".to_string()];
    excludes.extend(config.import.exclude_globs.clone());
    let exclude_set = build_globset(&excludes)?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let rel_str = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        paths.push(path.to_path_buf());
    }
    paths.sort();

    let mut added = Vec::with_capacity(paths.len());
    for path in paths {
        match add_file(config, pool, &path, None, None).await {
            Ok(doc) => added.push(doc),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipped file"),
        }
    }

    tracing::info!(root = %root.display(), count = added.len(), "imported directory");
    Ok(added)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

fn row_to_document(row: &SqliteRow) -> Document {
    let content: Option<String> = row.get("content");
    Document {
        id: row.get("id"),
        name: row.get("name"),
        file_path: row.get("file_path"),
        file_type: row.get("file_type"),
        file_size: row.get("file_size"),
        enabled: row.get("enabled"),
        category: row.get("category"),
        processed: content.is_some(),
        content,
        created_at: ts_to_datetime(row.get("created_at")),
        updated_at: ts_to_datetime(row.get("updated_at")),
    }
}

/// Last path component of a user-supplied name, or `None` if nothing usable remains.
fn safe_file_name(filename: &str) -> Option<String> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename).trim();
    if base.is_empty() || base == "." || base == ".." {
        None
    } else {
        Some(base.to_string())
    }
}

fn name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && !s.contains(':'))
        .map(|s| s.to_string())
        .unwrap_or_else(|| url.to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_file_name_strips_directories() {
        assert_eq!(safe_file_name("rules.pdf").as_deref(), Some("rules.pdf"));
        assert_eq!(safe_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(safe_file_name("C:\\docs\\a.txt").as_deref(), Some("a.txt"));
        assert_eq!(safe_file_name(".."), None);
        assert_eq!(safe_file_name("dir/"), None);
    }

    #[test]
    fn test_name_from_url() {
        assert_eq!(
            name_from_url("https://example.com/files/bylaws.pdf?dl=1"),
            "bylaws.pdf"
        );
        assert_eq!(name_from_url("https://example.com/"), "example.com");
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("  ".to_string())), None);
        assert_eq!(non_empty(Some(" A ".to_string())).as_deref(), Some("A"));
        assert_eq!(non_empty(None), None);
    }
}
