//! # doc-chat
//!
//! A document chat backend. Register documents (uploads or links), choose
//! which are searchable, and ask questions answered from their contents with
//! citations.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌───────────┐
//! │  Documents  │──▶│     Pipeline     │──▶│  SQLite   │
//! │ upload/link │   │ Extract+Chunk+Emb│   │ FTS5+Vec  │
//! └─────────────┘   └──────────────────┘   └─────┬─────┘
//!                                                │ enabled only
//!                                          ┌─────▼─────┐   ┌─────────┐
//!                                          │ Retrieve  │──▶│  Chat   │
//!                                          └───────────┘   │  (LLM)  │
//!                                                          └────┬────┘
//!                                     ┌──────────┐   ┌──────────▼┐
//!                                     │   CLI    │   │   HTTP    │
//!                                     │ (dchat)  │   │   API     │
//!                                     └──────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dchat init                          # create database
//! dchat add ./bylaws.pdf --category Bylaws
//! dchat process --pending             # extract, chunk, embed
//! dchat ask "When is the annual meeting?"
//! dchat serve                         # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Classifiable error kinds |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`documents`] | Document registry and file storage |
//! | [`extract`] | Text extraction (plain, Markdown, PDF, DOCX) |
//! | [`fetch`] | Downloads for linked documents |
//! | [`http`] | JSON POST with retry, text truncation |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Chat-completion provider abstraction |
//! | [`ingest`] | Document processing and embedding backfill |
//! | [`retrieve`] | Keyword, semantic, and hybrid chunk retrieval |
//! | [`chat`] | Question answering with sources |
//! | [`catalog`] | Category grouping for listings |
//! | [`stats`] | Library statistics |
//! | [`server`] | HTTP API |

pub mod catalog;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod context;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod retrieve;
pub mod server;
pub mod stats;
