//! # doc-chat CLI (`dchat`)
//!
//! ## Usage
//!
//! ```bash
//! dchat --config ./config/dchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dchat init` | Create the SQLite database and run schema migrations |
//! | `dchat add <path\|url>` | Register a local file or a linked document |
//! | `dchat import <dir>` | Register every matching file under a directory |
//! | `dchat list` | List documents (`--grouped` for the catalog view) |
//! | `dchat get <id>` | Show a document with its text and chunks |
//! | `dchat enable <id>` / `disable <id>` | Toggle whether a document is searched |
//! | `dchat remove <id>` | Delete a document and its stored file |
//! | `dchat process <id>` / `--pending` | Extract, chunk, and embed |
//! | `dchat embed pending` / `rebuild` | Backfill or regenerate embeddings |
//! | `dchat search "<query>"` | Show the chunks a question would retrieve |
//! | `dchat ask "<question>"` | Answer a question from the enabled documents |
//! | `dchat stats` | Library statistics |
//! | `dchat serve` | Start the HTTP API |
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); results go to stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use doc_chat::catalog::group_documents;
use doc_chat::chat;
use doc_chat::config::{self, Config};
use doc_chat::context::AppContext;
use doc_chat::documents;
use doc_chat::http::truncate_chars;
use doc_chat::ingest;
use doc_chat::models::{is_remote_path, Document};
use doc_chat::retrieve::retrieve;
use doc_chat::server;
use doc_chat::stats::{collect_stats, format_bytes};

/// doc-chat: ask cited questions over your own documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/dchat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dchat",
    about = "doc-chat: register documents, choose which are searchable, and ask cited questions",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Register a local file or an http(s) URL.
    ///
    /// Local files are copied into the storage directory. The document is
    /// pending until processed.
    Add {
        /// File path or http(s) URL.
        target: String,

        /// Display name (defaults to the file name).
        #[arg(long)]
        name: Option<String>,

        /// Catalog category or subcategory.
        #[arg(long)]
        category: Option<String>,

        /// Register the document disabled (excluded from search).
        #[arg(long)]
        disabled: bool,
    },

    /// Register every file under a directory matching `[import]` globs.
    Import {
        dir: PathBuf,
    },

    /// List documents, newest first.
    List {
        /// Group by the `[[catalog]]` taxonomy.
        #[arg(long)]
        grouped: bool,
    },

    /// Show a document with its extracted text and chunks.
    Get {
        id: String,
    },

    /// Include a document in search.
    Enable {
        id: String,
    },

    /// Exclude a document from search.
    Disable {
        id: String,
    },

    /// Delete a document, its chunks and vectors, and its stored file.
    Remove {
        id: String,
    },

    /// Extract text, chunk, and embed.
    Process {
        /// Document to process.
        #[arg(required_unless_present = "pending", conflicts_with = "pending")]
        id: Option<String>,

        /// Process every document that has no extracted text yet.
        #[arg(long)]
        pending: bool,
    },

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Show the chunks retrieved for a query.
    Search {
        query: String,

        /// Maximum number of chunks (defaults to `retrieval.top_k`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a question from the enabled documents.
    Ask {
        question: String,
    },

    /// Print library statistics.
    Stats,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed chunks that are missing or have stale embeddings.
    Pending {
        /// Maximum number of chunks to embed in this run.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Delete and regenerate all embeddings.
    Rebuild,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let ctx = AppContext::open_storage(cfg).await?;
            ctx.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Add {
            target,
            name,
            category,
            disabled,
        } => {
            let ctx = AppContext::open_storage(cfg).await?;
            let mut doc = if is_remote_path(&target) {
                documents::add_url(&ctx.pool, &target, name, category, None).await?
            } else {
                documents::add_file(
                    &ctx.config,
                    &ctx.pool,
                    &PathBuf::from(&target),
                    name,
                    category,
                )
                .await?
            };
            if disabled {
                doc = documents::set_enabled(&ctx.pool, &doc.id, false).await?;
            }
            println!("added {}", doc.name);
            println!("  id: {}", doc.id);
            println!("  type: {}", doc.file_type);
            println!("  enabled: {}", doc.enabled);
            ctx.close().await;
        }
        Commands::Import { dir } => {
            let ctx = AppContext::open_storage(cfg).await?;
            let added = documents::import_dir(&ctx.config, &ctx.pool, &dir).await?;
            println!("import {}", dir.display());
            for doc in &added {
                println!("  {}  {}", doc.id, doc.name);
            }
            println!("  added: {}", added.len());
            ctx.close().await;
        }
        Commands::List { grouped } => {
            let ctx = AppContext::open_storage(cfg).await?;
            let docs = documents::list_documents(&ctx.pool).await?;
            if docs.is_empty() {
                println!("No documents.");
            } else if grouped {
                print_grouped(&ctx.config, &docs);
            } else {
                print_table(&docs);
            }
            ctx.close().await;
        }
        Commands::Get { id } => {
            let ctx = AppContext::open_storage(cfg).await?;
            let doc = documents::get_document(&ctx.pool, &id).await?;
            let chunks = documents::get_chunks(&ctx.pool, &id).await?;
            print_document(&doc);
            println!("  chunks: {}", chunks.len());
            if let Some(content) = &doc.content {
                println!();
                println!("{}", content);
            }
            ctx.close().await;
        }
        Commands::Enable { id } => {
            let ctx = AppContext::open_storage(cfg).await?;
            let doc = documents::set_enabled(&ctx.pool, &id, true).await?;
            println!("enabled {}", doc.name);
            ctx.close().await;
        }
        Commands::Disable { id } => {
            let ctx = AppContext::open_storage(cfg).await?;
            let doc = documents::set_enabled(&ctx.pool, &id, false).await?;
            println!("disabled {}", doc.name);
            ctx.close().await;
        }
        Commands::Remove { id } => {
            let ctx = AppContext::open_storage(cfg).await?;
            let doc = documents::get_document(&ctx.pool, &id).await?;
            documents::delete_document(&ctx.config, &ctx.pool, &id).await?;
            println!("removed {}", doc.name);
            ctx.close().await;
        }
        Commands::Process { id, pending } => {
            let ctx = AppContext::open(cfg).await?;
            if pending {
                let report = ingest::process_pending(&ctx).await?;
                println!("process pending");
                println!("  processed: {}", report.processed);
                println!("  failed: {}", report.failed);
                for f in &report.failures {
                    println!("    {} ({}): {}", f.name, f.document_id, f.error);
                }
            } else if let Some(id) = id {
                let report = ingest::process_document(&ctx, &id, None).await?;
                println!("process {}", report.name);
                println!("  characters: {}", report.characters);
                println!("  chunks: {}", report.chunks);
                if ctx.embeddings_enabled() {
                    println!("  embedded: {}", report.embedded);
                    println!("  embeddings pending: {}", report.embeddings_pending);
                }
            }
            ctx.close().await;
        }
        Commands::Embed { action } => {
            let ctx = AppContext::open(cfg).await?;
            let (label, report) = match action {
                EmbedAction::Pending { limit } => {
                    ("embed pending", ingest::embed_pending(&ctx, limit).await?)
                }
                EmbedAction::Rebuild => ("embed rebuild", ingest::embed_rebuild(&ctx).await?),
            };
            println!("{}", label);
            if report.total == 0 {
                println!("  all chunks up to date");
            } else {
                println!("  total: {}", report.total);
                println!("  embedded: {}", report.embedded);
                println!("  failed: {}", report.failed);
            }
            ctx.close().await;
        }
        Commands::Search { query, limit } => {
            let ctx = AppContext::open(cfg).await?;
            let results = retrieve(&ctx, &query, limit).await?;
            if results.is_empty() {
                println!("No results.");
            }
            for (i, r) in results.iter().enumerate() {
                println!(
                    "{}. [{:.3}] {} #{}",
                    i + 1,
                    r.score,
                    r.document_name,
                    r.chunk_index
                );
                println!("    excerpt: \"{}\"", excerpt(&r.text, 160));
                println!("    document: {}", r.document_id);
                println!();
            }
            ctx.close().await;
        }
        Commands::Ask { question } => {
            let ctx = AppContext::open(cfg).await?;
            let answer = chat::answer(&ctx, &question).await?;
            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!();
                println!("Sources:");
                for s in &answer.sources {
                    println!("  - {} ({})", s.name, s.id);
                }
            }
            if !answer.snippets.is_empty() {
                println!();
                println!("Snippets:");
                for s in &answer.snippets {
                    println!("  [{}] {}", s.document, s.text.replace('\n', " "));
                }
            }
            ctx.close().await;
        }
        Commands::Stats => {
            let ctx = AppContext::open_storage(cfg).await?;
            let stats = collect_stats(&ctx).await?;
            println!("doc-chat library");
            println!("================");
            println!();
            println!("  Database:    {}", ctx.config.db.path.display());
            println!("  Documents:   {}", stats.documents);
            println!("  Enabled:     {}", stats.enabled);
            println!("  Pending:     {}", stats.pending);
            println!("  Stored:      {}", format_bytes(stats.total_bytes.max(0) as u64));
            println!("  Chunks:      {}", stats.chunks);
            match &stats.embedding_model {
                Some(model) => println!(
                    "  Embedded:    {} / {} ({})",
                    stats.embedded_chunks, stats.chunks, model
                ),
                None => println!("  Embedded:    embeddings disabled"),
            }
            ctx.close().await;
        }
        Commands::Serve => {
            let ctx = AppContext::open(cfg).await?;
            server::run_server(ctx).await?;
        }
    }

    Ok(())
}

fn print_table(docs: &[Document]) {
    println!(
        "{:<36}  {:<8}  {:<9}  {:>9}  NAME",
        "ID", "ENABLED", "STATUS", "SIZE"
    );
    for doc in docs {
        println!(
            "{:<36}  {:<8}  {:<9}  {:>9}  {}{}",
            doc.id,
            if doc.enabled { "yes" } else { "no" },
            if doc.is_processed() { "processed" } else { "pending" },
            format_bytes(doc.file_size.max(0) as u64),
            doc.name,
            doc.category
                .as_deref()
                .map(|c| format!("  [{}]", c))
                .unwrap_or_default()
        );
    }
}

fn print_grouped(cfg: &Config, docs: &[Document]) {
    for group in group_documents(&cfg.catalog, docs) {
        println!("{}", group.title);
        for doc in &group.documents {
            println!("  {}", doc_line(doc));
        }
        for sub in &group.subcategories {
            println!("  {}", sub.name);
            for doc in &sub.documents {
                println!("    {}", doc_line(doc));
            }
        }
        println!();
    }
}

fn doc_line(doc: &Document) -> String {
    format!(
        "{} {} ({}, {})",
        if doc.enabled { "[x]" } else { "[ ]" },
        doc.name,
        doc.file_type.rsplit('/').next().unwrap_or(&doc.file_type),
        format_bytes(doc.file_size.max(0) as u64)
    )
}

fn print_document(doc: &Document) {
    println!("{}", doc.name);
    println!("  id: {}", doc.id);
    println!("  path: {}", doc.file_path);
    println!("  type: {}", doc.file_type);
    println!("  size: {}", format_bytes(doc.file_size.max(0) as u64));
    println!("  enabled: {}", doc.enabled);
    if let Some(category) = &doc.category {
        println!("  category: {}", category);
    }
    println!("  created: {}", doc.created_at.format("%Y-%m-%d %H:%M"));
    println!(
        "  status: {}",
        if doc.is_processed() { "processed" } else { "pending" }
    );
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    let cut = truncate_chars(flat, max_chars);
    if cut.len() < flat.len() {
        format!("{}...", cut)
    } else {
        flat.to_string()
    }
}
