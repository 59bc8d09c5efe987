//! # askdoc
//!
//! Document-grounded question answering over uploaded PDFs.
//!
//! Documents are extracted, split into word-window chunks and embedded;
//! queries are answered from the most similar chunks, or with a canned
//! conversational reply when no retrieval is needed.
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌────────────────┐
//! │  Upload  │──▶│ Extract+Chunk │──▶│ Knowledge base │
//! │  (PDF)   │   │    +Embed     │   │  (JSON file)   │
//! └──────────┘   └───────────────┘   └───────┬────────┘
//!                                            │ snapshot
//!                 ┌──────────┐        ┌──────▼──────┐
//!     query ────▶ │ Composer │ ◀───── │  Retriever  │
//!                 └──────────┘        └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Embedding providers (OpenAI, Ollama, local) |
//! | [`generation`] | Generation providers and failover |
//! | [`extract`] | PDF text extraction |
//! | [`knowledge`] | Live knowledge base handle and JSON store |
//! | [`ingest`] | Upload and delete pipeline |
//! | [`upload_log`] | Administrative upload records |
//! | [`server`] | HTTP API |
//! | [`commands`] | CLI command implementations |
//!
//! Chunking, retrieval and response composition live in `askdoc-core`.

pub mod commands;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod knowledge;
pub mod server;
pub mod stats;
pub mod upload_log;
