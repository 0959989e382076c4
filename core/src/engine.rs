//! Query processing over a swappable index snapshot.
//!
//! Readers grab the current `Arc<Snapshot>` under a momentary read lock and
//! then work without holding any lock. Writers serialize on `writer`, mutate
//! a private copy of the snapshot and publish it with a pointer swap, so a
//! failed mutation is never visible.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::expansion::expand;
use crate::index::InvertedIndex;
use crate::persist::{load_index, save_index, IndexPaths, MetaFile};
use crate::ranking::{rank, Deadline, RetrievalModel};
use crate::tokenizer::{is_word_char, normalize, surface_terms, tokenize};
use crate::trie::Trie;
use crate::{Document, DocumentSummary, TermId};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub index: InvertedIndex,
    pub trie: Trie,
    /// Bumped on every published mutation.
    pub version: u64,
}

impl Snapshot {
    fn empty() -> Self { Self { index: InvertedIndex::new(), trie: Trie::new(), version: 0 } }

    fn insert(&mut self, doc: Document, replace: bool) -> Result<()> {
        if replace {
            if let Some(old) = self.index.get(&doc.id) {
                for (word, count) in vocabulary(old) {
                    self.trie.decrement(&word, count);
                }
            }
        }
        let words = vocabulary(&doc);
        self.index.add_document(doc, replace)?;
        for (word, count) in words {
            self.trie.insert(&word, count);
        }
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<Document> {
        let doc = self.index.remove_document(id)?;
        for (word, count) in vocabulary(&doc) {
            self.trie.decrement(&word, count);
        }
        Ok(doc)
    }
}

/// Surface words of a document with their occurrence counts.
fn vocabulary(doc: &Document) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for word in surface_terms(&doc.indexable_text()) {
        *counts.entry(word).or_insert(0) += 1;
    }
    counts
}

fn build_snapshot(corpus: Vec<Document>, version: u64) -> Result<Snapshot> {
    let mut trie = Trie::new();
    for doc in &corpus {
        for (word, count) in vocabulary(doc) {
            trie.insert(&word, count);
        }
    }
    let index = InvertedIndex::build(corpus)?;
    Ok(Snapshot { index, trie, version })
}

/// A search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    /// Must be positive.
    pub num_results: i64,
    /// Falls back to the engine's default model.
    pub model: Option<RetrievalModel>,
    pub use_expansion: bool,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), num_results: 10, model: None, use_expansion: false }
    }

    pub fn limit(mut self, num_results: i64) -> Self {
        self.num_results = num_results;
        self
    }

    pub fn model(mut self, model: RetrievalModel) -> Self {
        self.model = Some(model);
        self
    }

    pub fn expansion(mut self, use_expansion: bool) -> Self {
        self.use_expansion = use_expansion;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    pub metadata: DocumentSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    /// Matching documents before truncation.
    pub total_hits: usize,
    pub model: RetrievalModel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub documents: u32,
    pub tokens: u64,
    pub unique_terms: usize,
    pub avg_doc_len: f64,
    pub suggestions: usize,
    pub version: u64,
    pub default_model: RetrievalModel,
    pub available_models: Vec<RetrievalModel>,
}

pub struct SearchEngine {
    current: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
    /// Serializes saves; they share the target directory's files.
    saving: Mutex<()>,
    default_model: RwLock<RetrievalModel>,
    config: EngineConfig,
}

impl SearchEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_snapshot(Snapshot::empty(), config)
    }

    fn with_snapshot(snapshot: Snapshot, config: EngineConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
            saving: Mutex::new(()),
            default_model: RwLock::new(config.default_model),
            config,
        }
    }

    /// Index a whole corpus up front.
    pub fn from_corpus(corpus: Vec<Document>, config: EngineConfig) -> Result<Self> {
        Ok(Self::with_snapshot(build_snapshot(corpus, 0)?, config))
    }

    /// Load an index directory written by [`SearchEngine::save`] or the indexer.
    pub fn open<P: AsRef<Path>>(root: P, config: EngineConfig) -> Result<Self> {
        let (index, trie, _meta) = load_index(&IndexPaths::new(root))?;
        Ok(Self::with_snapshot(Snapshot { index, trie, version: 0 }, config))
    }

    /// Persist the current snapshot. Concurrent saves run one after another;
    /// writers are not blocked while the files are written.
    pub fn save<P: AsRef<Path>>(&self, root: P) -> Result<MetaFile> {
        let _saving = self.saving.lock();
        let snap = self.snapshot();
        save_index(&IndexPaths::new(root), &snap.index, &snap.trie)
    }

    pub fn config(&self) -> &EngineConfig { &self.config }

    pub fn snapshot(&self) -> Arc<Snapshot> { self.current.read().clone() }

    pub fn default_model(&self) -> RetrievalModel { *self.default_model.read() }

    pub fn set_default_model(&self, model: RetrievalModel) {
        *self.default_model.write() = model;
        tracing::info!(%model, "default retrieval model changed");
    }

    pub fn search(&self, query: &Query) -> Result<SearchResults> {
        if query.num_results <= 0 {
            return Err(Error::InvalidResultCount(query.num_results));
        }
        let start = Instant::now();
        let deadline = Deadline::new(self.config.query_timeout());
        let model = query.model.unwrap_or_else(|| self.default_model());
        let snap = self.snapshot();
        let index = &snap.index;

        let terms = query_terms(index, &query.text);
        if terms.is_empty() {
            return Ok(SearchResults { hits: Vec::new(), total_hits: 0, model });
        }

        let params = &self.config.ranking;
        let mut ranked = rank(index, &terms, model, params, &deadline)?;
        if query.use_expansion {
            let expanded = expand(index, &ranked, &terms, &self.config.expansion);
            if expanded.len() > terms.len() {
                ranked = rank(index, &expanded, model, params, &deadline)?;
            }
        }

        let total_hits = ranked.len();
        let limit = (query.num_results as u64).min(self.config.max_results as u64) as usize;
        let hits = ranked
            .into_iter()
            .take(limit)
            .filter_map(|s| {
                index.entry(s.doc).map(|e| SearchHit { id: e.document.id.clone(), score: s.score, metadata: e.document.summary() })
            })
            .collect::<Vec<_>>();

        tracing::debug!(query = %query.text, %model, expansion = query.use_expansion, total_hits, returned = hits.len(), took_ms = start.elapsed().as_millis() as u64, "search");
        Ok(SearchResults { hits, total_hits, model })
    }

    pub fn get_document(&self, id: &str) -> Result<Document> {
        self.snapshot().index.get(id).cloned().ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Summaries of every indexed document, in ingestion order.
    pub fn list_documents(&self) -> Vec<DocumentSummary> {
        self.snapshot().index.documents().map(Document::summary).collect()
    }

    /// Complete the last word of `text`, returning whole-phrase suggestions.
    /// Words are split the way the tokenizer splits them, so "senior-py" completes "py".
    ///
    /// Every suggestion starts with the normalized input; an empty input yields
    /// the globally heaviest words.
    pub fn suggest(&self, text: &str, limit: usize) -> Vec<String> {
        let normalized = normalize(text.trim_start());
        let split = normalized
            .char_indices()
            .filter(|&(_, c)| !is_word_char(c))
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let (head, last) = normalized.split_at(split);
        self.snapshot()
            .trie
            .suggest(last, limit)
            .into_iter()
            .map(|(word, _)| format!("{head}{word}"))
            .collect()
    }

    pub fn add_document(&self, doc: Document, replace: bool) -> Result<()> {
        let id = doc.id.clone();
        let version = self.mutate(|snap| snap.insert(doc, replace))?;
        tracing::info!(doc_id = %id, replace, version, "document added");
        Ok(())
    }

    /// Add a batch as one mutation: either every document lands or none does.
    pub fn add_documents(&self, docs: Vec<Document>, replace: bool) -> Result<usize> {
        let count = docs.len();
        let version = self.mutate(|snap| docs.into_iter().try_for_each(|doc| snap.insert(doc, replace)))?;
        tracing::info!(count, version, "document batch added");
        Ok(count)
    }

    pub fn remove_document(&self, id: &str) -> Result<Document> {
        let mut removed = None;
        let version = self.mutate(|snap| {
            removed = Some(snap.remove(id)?);
            Ok(())
        })?;
        tracing::info!(doc_id = %id, version, "document removed");
        removed.ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Replace the whole index. The new snapshot is built before any lock is
    /// taken; on failure the current one stays in place.
    pub fn rebuild(&self, corpus: Vec<Document>) -> Result<()> {
        let mut next = build_snapshot(corpus, 0)?;
        let _guard = self.writer.lock();
        next.version = self.snapshot().version + 1;
        let (docs, version) = (next.index.num_docs(), next.version);
        *self.current.write() = Arc::new(next);
        tracing::info!(num_docs = docs, version, "index rebuilt");
        Ok(())
    }

    pub fn stats(&self) -> IndexStats {
        let snap = self.snapshot();
        IndexStats {
            documents: snap.index.num_docs(),
            tokens: snap.index.total_tokens(),
            unique_terms: snap.index.unique_terms(),
            avg_doc_len: snap.index.avg_doc_len(),
            suggestions: snap.trie.len(),
            version: snap.version,
            default_model: self.default_model(),
            available_models: RetrievalModel::ALL.to_vec(),
        }
    }

    /// Apply `f` to a copy of the current snapshot and publish it if `f` succeeds.
    fn mutate<F>(&self, f: F) -> Result<u64>
    where
        F: FnOnce(&mut Snapshot) -> Result<()>,
    {
        let _guard = self.writer.lock();
        let mut next = Snapshot::clone(&self.snapshot());
        f(&mut next)?;
        next.version += 1;
        let version = next.version;
        *self.current.write() = Arc::new(next);
        Ok(version)
    }
}

/// Query term weights (term frequency in the query), in order of first appearance.
/// Terms unknown to the index are dropped.
fn query_terms(index: &InvertedIndex, text: &str) -> Vec<(TermId, f64)> {
    let mut slots: HashMap<TermId, usize> = HashMap::new();
    let mut terms: Vec<(TermId, f64)> = Vec::new();
    for (term, _pos) in tokenize(text) {
        let Some(tid) = index.term_id(&term) else { continue };
        match slots.get(&tid) {
            Some(&at) => terms[at].1 += 1.0,
            None => {
                slots.insert(tid, terms.len());
                terms.push((tid, 1.0));
            }
        }
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_terms_count_repeats_and_skip_unknown() {
        let index = InvertedIndex::build(vec![Document::new("1", "", "rust systems rust")]).unwrap();
        let terms = query_terms(&index, "Rust rust unknown systems");
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0], (index.term_id("rust").unwrap(), 2.0));
        assert_eq!(terms[1].1, 1.0);
    }

    #[test]
    fn failed_mutation_is_not_published() {
        let engine = SearchEngine::from_corpus(vec![Document::new("a", "Welder", "steel")], EngineConfig::default()).unwrap();
        let batch = vec![Document::new("b", "Painter", "walls"), Document::new("a", "Welder", "again")];
        assert!(matches!(engine.add_documents(batch, false), Err(Error::DuplicateDocumentId(_))));
        assert_eq!(engine.stats().documents, 1);
        assert_eq!(engine.stats().version, 0);
        assert!(engine.get_document("b").is_err());
        assert!(engine.suggest("pain", 5).is_empty());
    }

    #[test]
    fn snapshots_held_by_readers_are_stable() {
        let engine = SearchEngine::from_corpus(vec![Document::new("a", "Welder", "steel")], EngineConfig::default()).unwrap();
        let before = engine.snapshot();
        engine.add_document(Document::new("b", "Painter", "walls"), false).unwrap();
        assert_eq!(before.index.num_docs(), 1);
        assert_eq!(engine.snapshot().index.num_docs(), 2);
        assert_eq!(engine.snapshot().version, before.version + 1);
    }
}
