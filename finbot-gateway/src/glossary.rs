//! Static financial glossary used for ranking and prompt augmentation.
//!
//! The glossary is fixed at startup: either the built-in table or a JSON
//! object of `{ "term": "definition" }` loaded from disk. Entry order is the
//! order of the source table and is the tie-break for relevance ranking.

use finbot_common::error::{Error, Result};
use serde_json::{Map, Value};
use std::path::Path;

/// Built-in glossary, in enumeration order.
const DEFAULT_ENTRIES: &[(&str, &str)] = &[
    (
        "budget",
        "A plan for your money that helps you track income and expenses. Think of it as a roadmap for your finances.",
    ),
    (
        "saving",
        "Setting aside money for future use instead of spending it now. Like storing nuts for winter!",
    ),
    (
        "investing",
        "Putting money into assets (like stocks or property) with the hope they'll grow in value over time.",
    ),
    (
        "compound interest",
        "When you earn interest not just on your initial money, but also on the interest you've already earned. It's like a snowball that keeps growing as it rolls downhill.",
    ),
    (
        "credit score",
        "A number that tells lenders how reliable you are with money. Higher scores mean you're seen as more trustworthy.",
    ),
    (
        "debt",
        "Money you owe to someone else. Think of it as 'borrowed money' that you need to pay back, usually with interest.",
    ),
    (
        "401k",
        "A retirement account offered by employers where you can save money from your paycheck before taxes. Many employers match part of what you contribute - that's free money!",
    ),
    (
        "stock",
        "A small piece of ownership in a company. When you buy stock, you're buying a tiny fraction of that business.",
    ),
    (
        "bond",
        "A loan you give to a company or government that they promise to pay back with interest. It's generally safer than stocks but offers lower returns.",
    ),
    (
        "etf",
        "Similar to mutual funds, but traded like stocks throughout the day. ETFs (Exchange-Traded Funds) often have lower fees than mutual funds.",
    ),
    (
        "mortgage",
        "A loan specifically for buying property. You pay it back over many years, and the property serves as collateral.",
    ),
];

/// A single term/definition pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlossaryEntry {
    pub term: String,
    pub definition: String,
    /// Lowercased `"{term} {definition}"`, precomputed for ranking.
    haystack: String,
}

impl GlossaryEntry {
    /// Create an entry.
    pub fn new(term: impl Into<String>, definition: impl Into<String>) -> Self {
        let term = term.into();
        let definition = definition.into();
        let haystack = format!("{term} {definition}").to_lowercase();
        Self {
            term,
            definition,
            haystack,
        }
    }

    /// Lowercased term and definition, the text queries are matched against.
    pub fn haystack(&self) -> &str {
        &self.haystack
    }
}

/// Ordered, immutable glossary.
#[derive(Debug, Clone)]
pub struct Glossary {
    entries: Vec<GlossaryEntry>,
}

impl Glossary {
    /// Build a glossary from ordered entries. Later duplicates of a term are dropped.
    pub fn new(entries: Vec<GlossaryEntry>) -> Self {
        let mut unique: Vec<GlossaryEntry> = Vec::with_capacity(entries.len());
        for entry in entries {
            if unique.iter().any(|e| e.term == entry.term) {
                tracing::warn!(term = %entry.term, "Duplicate glossary term ignored");
                continue;
            }
            unique.push(entry);
        }
        Self { entries: unique }
    }

    /// The built-in financial glossary.
    pub fn builtin() -> Self {
        Self::new(
            DEFAULT_ENTRIES
                .iter()
                .map(|(term, definition)| GlossaryEntry::new(*term, *definition))
                .collect(),
        )
    }

    /// Parse a JSON object of `{ "term": "definition" }`, keeping key order.
    pub fn from_json(json: &str) -> Result<Self> {
        let map: Map<String, Value> = serde_json::from_str(json)?;
        if map.is_empty() {
            return Err(Error::Config("glossary must contain at least one entry".into()));
        }

        let mut entries = Vec::with_capacity(map.len());
        for (term, value) in map {
            let definition = value.as_str().ok_or_else(|| {
                Error::Config(format!("definition for '{term}' must be a string"))
            })?;
            entries.push(GlossaryEntry::new(term, definition));
        }

        Ok(Self::new(entries))
    }

    /// Load a glossary file, seeding it with the built-in glossary if it does not exist.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            let builtin = Self::builtin();
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, builtin.to_json_pretty()?)?;
            tracing::info!(
                path = %path.display(),
                entries = builtin.len(),
                "Wrote default glossary"
            );
            return Ok(builtin);
        }

        let content = std::fs::read_to_string(path)?;
        let glossary = Self::from_json(&content)
            .map_err(|e| e.with_context(format!("loading glossary {}", path.display())))?;
        tracing::info!(path = %path.display(), entries = glossary.len(), "Loaded glossary");
        Ok(glossary)
    }

    /// Serialize back to the `{ "term": "definition" }` file format.
    pub fn to_json_pretty(&self) -> Result<String> {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|e| (e.term.clone(), Value::String(e.definition.clone())))
            .collect();
        Ok(serde_json::to_string_pretty(&map)?)
    }

    /// Entries in enumeration order.
    pub fn entries(&self) -> &[GlossaryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Glossary {
    fn default() -> Self {
        Self::builtin()
    }
}
