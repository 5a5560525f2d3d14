//! Download linked documents.

use anyhow::{bail, Context, Result};
use std::time::Duration;

use crate::error::DocChatError;
use crate::extract;
use crate::models::is_remote_path;

/// A downloaded document body.
#[derive(Debug)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Build the HTTP client used for document downloads.
pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;
    Ok(client)
}

/// GET an http(s) URL.
///
/// The content type comes from the response header unless it is missing or
/// generic (`application/octet-stream`), in which case it is guessed from
/// the URL's extension.
pub async fn fetch_url(client: &reqwest::Client, url: &str) -> Result<Fetched> {
    if !is_remote_path(url) {
        return Err(DocChatError::InvalidInput(format!(
            "only http(s) URLs can be fetched: {}",
            url
        ))
        .into());
    }

    tracing::info!(%url, "fetching document");

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("request to {} failed", url))?;

    let status = response.status();
    if !status.is_success() {
        bail!("fetching {} failed with HTTP {}", url, status);
    }

    let header_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(extract::normalize_content_type);

    let content_type = match header_type {
        Some(ct) if ct != extract::MIME_OCTET && !ct.is_empty() => ct,
        _ => extract::content_type_for_path(url).to_string(),
    };

    let bytes = response.bytes().await?.to_vec();
    tracing::debug!(%url, bytes = bytes.len(), %content_type, "fetched document");

    Ok(Fetched {
        bytes,
        content_type,
    })
}
