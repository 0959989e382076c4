//! Inverted-index search engine for job listings.
//!
//! The crate is organised leaf-first: [`tokenizer`] feeds [`index`], which
//! [`ranking`] and [`expansion`] read; [`trie`] holds the autocomplete
//! vocabulary and [`engine`] ties everything together behind a
//! snapshot-swapping [`SearchEngine`]. [`persist`] reads and writes the
//! on-disk format.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod config;
pub mod engine;
pub mod error;
pub mod expansion;
pub mod index;
pub mod persist;
pub mod ranking;
pub mod tokenizer;
pub mod trie;

pub use config::{EngineConfig, ExpansionConfig, RankingParams};
pub use engine::{IndexStats, Query, SearchEngine, SearchHit, SearchResults, Snapshot};
pub use error::{Error, Result};
pub use index::InvertedIndex;
pub use ranking::RetrievalModel;
pub use trie::Trie;

pub type TermId = u32;
pub type DocId = u32;

/// A job listing as submitted for indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Structured listing fields (company, location, salary_range, ...).
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self { id: id.into(), title: title.into(), body: body.into(), attributes: BTreeMap::new() }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Everything that gets tokenized: title, body, then attribute values in key order.
    pub fn indexable_text(&self) -> String {
        let mut text = String::with_capacity(self.title.len() + self.body.len() + 64);
        text.push_str(&self.title);
        text.push('\n');
        text.push_str(&self.body);
        for value in self.attributes.values() {
            text.push('\n');
            text.push_str(value);
        }
        text
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            company: self.attributes.get("company").cloned(),
            location: self.attributes.get("location").cloned(),
            salary_range: self.attributes.get("salary_range").cloned(),
        }
    }
}

/// Listing view of a document, attached to search hits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub salary_range: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc: DocId,
    pub tf: u32,
    pub positions: Vec<u32>,
}
