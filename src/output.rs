// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output and color utilities for consistent terminal formatting
//!
//! Provides shared color functions respecting NO_COLOR environment variable.

use colored::Colorize;
use serde::Serialize;

use crate::retriever::Hit;

/// Check if colors should be used (respects NO_COLOR env var)
pub fn use_colors() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Colorize citation (cyan)
pub fn colorize_citation(text: &str, use_color: bool) -> String {
    if use_color {
        text.cyan().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize similarity score (yellow)
pub fn colorize_score(score: f32, use_color: bool) -> String {
    let text = format!("{:.4}", score);
    if use_color {
        text.yellow().to_string()
    } else {
        text
    }
}

/// Colorize chunk text (dimmed)
pub fn colorize_text(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize rank marker (bold)
pub fn colorize_rank(rank: usize, use_color: bool) -> String {
    let text = format!("[{}]", rank);
    if use_color {
        text.bold().to_string()
    } else {
        text
    }
}

/// One hit as printed by `search`: rank, score and citation on the first
/// line, the chunk text indented below.
pub fn render_hit(rank: usize, hit: &Hit, use_color: bool) -> String {
    let body = hit
        .text
        .lines()
        .map(|line| format!("    {}", colorize_text(line, use_color)))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{} {} {}\n{}",
        colorize_rank(rank, use_color),
        colorize_score(hit.score, use_color),
        colorize_citation(&hit.cite(), use_color),
        body
    )
}

/// Hit shape used for JSON output
#[derive(Debug, Serialize)]
pub struct HitView<'a> {
    pub rank: usize,
    pub score: f32,
    pub citation: String,
    pub doc_id: &'a str,
    pub doc_title: &'a str,
    pub chunk_id: usize,
    pub text: &'a str,
}

impl<'a> HitView<'a> {
    pub fn new(rank: usize, hit: &'a Hit) -> Self {
        Self {
            rank,
            score: hit.score,
            citation: hit.cite(),
            doc_id: &hit.doc_id,
            doc_title: &hit.doc_title,
            chunk_id: hit.chunk_id,
            text: &hit.text,
        }
    }
}

/// JSON payload for a search
#[derive(Debug, Serialize)]
pub struct SearchReport<'a> {
    pub query: &'a str,
    pub k: usize,
    pub hits: Vec<HitView<'a>>,
}

impl<'a> SearchReport<'a> {
    pub fn new(query: &'a str, k: usize, hits: &'a [Hit]) -> Self {
        Self {
            query,
            k,
            hits: hits
                .iter()
                .enumerate()
                .map(|(i, hit)| HitView::new(i + 1, hit))
                .collect(),
        }
    }
}
