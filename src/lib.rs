//! hubseek - hybrid lexical and semantic search
//!
//! Fuses BM25 and vector search over a chunked document index, optionally
//! helped by an LLM for query expansion and re-ranking, and returns ranked
//! results with provenance (document, heading, line range).

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod retrieval;
pub mod storage;

pub use error::{HubseekError, Result};
