// SPDX-License-Identifier: MIT OR Apache-2.0

//! policy-rag - Policy document retrieval library
//!
//! Chunks policy documents, embeds them into a flat vector index and answers
//! queries with ranked, citable hits.

pub mod config;
pub mod embedding;
pub mod errors;
pub mod indexer;
pub mod output;
pub mod retriever;
pub mod utils;

pub use errors::{RagError, Result};
pub use retriever::{format_citations, source_docs, Grounding, Hit, Retriever};
