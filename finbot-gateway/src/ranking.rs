//! Keyword-overlap relevance ranking over the glossary.
//!
//! Each query token longer than [`MIN_TOKEN_CHARS`] characters that appears as
//! a substring of an entry's lowercased `"term definition"` text adds one to
//! that entry's score. Repeated tokens count once per occurrence.

use crate::glossary::{Glossary, GlossaryEntry};

/// Maximum number of terms returned.
pub const MAX_RELEVANT_TERMS: usize = 3;

/// Tokens must be strictly longer than this to count.
pub const MIN_TOKEN_CHARS: usize = 3;

/// A glossary entry with its overlap score.
#[derive(Debug, Clone, Copy)]
pub struct ScoredEntry<'a> {
    pub entry: &'a GlossaryEntry,
    pub score: usize,
}

/// Split a query into lowercase match tokens.
///
/// Surrounding punctuation is trimmed so "budget?" matches "budget".
fn query_tokens(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|t| t.chars().count() > MIN_TOKEN_CHARS)
        .collect()
}

/// Score every glossary entry and return the non-zero ones, best first.
///
/// Ties keep glossary enumeration order.
pub fn score_entries<'a>(query: &str, glossary: &'a Glossary) -> Vec<ScoredEntry<'a>> {
    let tokens = query_tokens(query);

    let mut scored: Vec<ScoredEntry<'a>> = glossary
        .entries()
        .iter()
        .map(|entry| ScoredEntry {
            entry,
            score: tokens
                .iter()
                .filter(|t| entry.haystack().contains(t.as_str()))
                .count(),
        })
        .filter(|s| s.score > 0)
        .collect();

    // sort_by is stable
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored
}

/// Up to three entries most relevant to `query`.
pub fn top_entries<'a>(query: &str, glossary: &'a Glossary) -> Vec<&'a GlossaryEntry> {
    score_entries(query, glossary)
        .into_iter()
        .take(MAX_RELEVANT_TERMS)
        .map(|s| s.entry)
        .collect()
}

/// Up to three term names most relevant to `query`.
pub fn rank_terms(query: &str, glossary: &Glossary) -> Vec<String> {
    top_entries(query, glossary)
        .into_iter()
        .map(|e| e.term.clone())
        .collect()
}
