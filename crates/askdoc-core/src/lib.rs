//! # askdoc Core
//!
//! Runtime-independent logic for askdoc: data models, word-window
//! chunking, the embedding and generation traits, the knowledge base
//! and its persistence trait, similarity retrieval, and the response
//! composer that turns a query into an answer.
//!
//! This crate contains no tokio, HTTP, or filesystem code. Concrete
//! providers, the PDF extractor, and the server live in the `askdoc`
//! application crate.

pub mod chunk;
pub mod compose;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod models;
pub mod search;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Error, Result};
