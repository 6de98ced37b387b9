// SPDX-License-Identifier: MIT OR Apache-2.0

//! Indexer module - turns a docs directory into a persisted retrieval snapshot

pub mod build;
pub mod scanner;
pub mod watch;

pub use build::{BuildReport, IndexBuilder};
pub use scanner::{Document, DocumentScanner};
pub use watch::Watcher;
