//! Question answering over the enabled documents.
//!
//! Flow of [`answer`]: check that something is enabled, retrieve the top
//! chunks, format them as a context block, ask the chat provider, and attach
//! sources (one per document, in rank order) and short snippets.

use anyhow::Result;

use crate::context::AppContext;
use crate::documents;
use crate::error::DocChatError;
use crate::http::truncate_chars;
use crate::llm::ChatMessage;
use crate::models::{ChatAnswer, RetrievedChunk, Snippet, Source};
use crate::retrieve::retrieve;

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

pub async fn answer(ctx: &AppContext, question: &str) -> Result<ChatAnswer> {
    let question = question.trim();
    if question.is_empty() {
        return Err(DocChatError::InvalidInput("question is required".to_string()).into());
    }

    let chat_config = &ctx.config.chat;

    if documents::count_enabled(&ctx.pool).await? == 0 {
        return Ok(fixed_answer(&chat_config.no_documents_message));
    }

    let chunks = retrieve(ctx, question, None).await?;
    if chunks.is_empty() {
        return Ok(fixed_answer(&chat_config.no_results_message));
    }

    let messages = vec![
        ChatMessage::system(chat_config.system_prompt.clone()),
        ChatMessage::user(build_user_message(&build_context(&chunks), question)),
    ];
    let answer = ctx.chat.complete(&messages).await?;

    let retrieval = &ctx.config.retrieval;
    tracing::info!(
        chunks = chunks.len(),
        model = ctx.chat.model_name(),
        "answered question"
    );

    Ok(ChatAnswer {
        answer,
        sources: collect_sources(&chunks),
        snippets: collect_snippets(&chunks, retrieval.snippet_count, retrieval.snippet_chars),
    })
}

fn fixed_answer(message: &str) -> ChatAnswer {
    ChatAnswer {
        answer: message.to_string(),
        sources: Vec::new(),
        snippets: Vec::new(),
    }
}

/// `[Document: <name>]` headed excerpts separated by horizontal rules.
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("[Document: {}]\n{}", c.document_name, c.text))
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

pub fn build_user_message(context: &str, question: &str) -> String {
    format!(
        "Based on these document excerpts:\n\n{}\n\nQuestion: {}",
        context, question
    )
}

/// One source per document, first occurrence wins.
pub fn collect_sources(chunks: &[RetrievedChunk]) -> Vec<Source> {
    let mut sources: Vec<Source> = Vec::new();
    for chunk in chunks {
        if !sources.iter().any(|s| s.id == chunk.document_id) {
            sources.push(Source {
                id: chunk.document_id.clone(),
                name: chunk.document_name.clone(),
            });
        }
    }
    sources
}

pub fn collect_snippets(chunks: &[RetrievedChunk], count: usize, max_chars: usize) -> Vec<Snippet> {
    chunks
        .iter()
        .take(count)
        .map(|c| {
            let cut = truncate_chars(&c.text, max_chars);
            let text = if cut.len() < c.text.len() {
                format!("{}...", cut)
            } else {
                cut.to_string()
            };
            Snippet {
                document: c.document_name.clone(),
                text,
            }
        })
        .collect()
}
