use crate::error::{Error, Result};
use crate::tokenizer::tokenize;
use crate::{DocId, Document, Posting, TermId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Per-term collection statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermStats {
    /// Number of documents containing the term.
    pub df: u32,
    /// Total occurrences across the collection.
    pub cf: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocEntry {
    pub document: Document,
    /// Number of indexed tokens.
    pub length: u32,
    /// Forward list of (term, tf), sorted by term id. Used to unwind postings on removal.
    pub terms: Vec<(TermId, u32)>,
}

/// Raw parts of an index, as stored on disk.
pub struct IndexParts {
    pub terms: Vec<String>,
    pub stats: Vec<TermStats>,
    pub postings: Vec<Vec<Posting>>,
    pub docs: BTreeMap<DocId, DocEntry>,
    pub next_doc: DocId,
}

#[derive(Debug, Clone, Default)]
pub struct InvertedIndex {
    dictionary: HashMap<String, TermId>,
    terms: Vec<String>,
    stats: Vec<TermStats>,
    postings: Vec<Vec<Posting>>, // indexed by term id, each sorted by doc
    docs: BTreeMap<DocId, DocEntry>,
    ids: HashMap<String, DocId>,
    next_doc: DocId,
    total_tokens: u64,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    /// Build a fresh index from a corpus. The first malformed document aborts the build.
    pub fn build<I>(corpus: I) -> Result<Self>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut index = Self::new();
        for doc in corpus {
            let doc_id = doc.id.clone();
            match index.add_document(doc, false) {
                Ok(_) => {}
                Err(Error::DuplicateDocumentId(id)) => {
                    return Err(Error::IndexBuildFailure { doc_id: id, reason: "document id appears more than once in the corpus".into() });
                }
                Err(Error::IndexBuildFailure { reason, .. }) => {
                    return Err(Error::IndexBuildFailure { doc_id, reason });
                }
                Err(e) => return Err(e),
            }
        }
        tracing::debug!(num_docs = index.num_docs(), num_terms = index.unique_terms(), "built index");
        Ok(index)
    }

    /// Index a document. With `replace`, an existing document with the same id is removed first.
    pub fn add_document(&mut self, doc: Document, replace: bool) -> Result<DocId> {
        if doc.id.trim().is_empty() {
            return Err(Error::IndexBuildFailure { doc_id: doc.id, reason: "document id is empty".into() });
        }
        if self.ids.contains_key(&doc.id) {
            if !replace {
                return Err(Error::DuplicateDocumentId(doc.id));
            }
            self.remove_document(&doc.id)?;
        }

        let tokens = tokenize(&doc.indexable_text());
        let length = tokens.len() as u32;
        let mut positions: BTreeMap<TermId, Vec<u32>> = BTreeMap::new();
        for (term, pos) in tokens {
            let tid = self.intern(term);
            positions.entry(tid).or_default().push(pos as u32);
        }

        let doc_id = self.next_doc;
        self.next_doc += 1;
        let mut forward = Vec::with_capacity(positions.len());
        for (tid, pos) in positions {
            let tf = pos.len() as u32;
            let stats = &mut self.stats[tid as usize];
            stats.df += 1;
            stats.cf += tf as u64;
            // doc ids only grow, so appending keeps the list sorted
            self.postings[tid as usize].push(Posting { doc: doc_id, tf, positions: pos });
            forward.push((tid, tf));
        }

        self.total_tokens += length as u64;
        self.ids.insert(doc.id.clone(), doc_id);
        self.docs.insert(doc_id, DocEntry { document: doc, length, terms: forward });
        Ok(doc_id)
    }

    /// Remove a document and every posting it contributed.
    pub fn remove_document(&mut self, id: &str) -> Result<Document> {
        let doc_id = self.ids.remove(id).ok_or_else(|| Error::NotFound(id.to_string()))?;
        let entry = match self.docs.remove(&doc_id) {
            Some(entry) => entry,
            None => return Err(Error::NotFound(id.to_string())),
        };
        for &(tid, tf) in &entry.terms {
            let list = &mut self.postings[tid as usize];
            if let Ok(at) = list.binary_search_by_key(&doc_id, |p| p.doc) {
                list.remove(at);
            }
            let stats = &mut self.stats[tid as usize];
            stats.df = stats.df.saturating_sub(1);
            stats.cf = stats.cf.saturating_sub(tf as u64);
        }
        self.total_tokens = self.total_tokens.saturating_sub(entry.length as u64);
        Ok(entry.document)
    }

    fn intern(&mut self, term: String) -> TermId {
        if let Some(&tid) = self.dictionary.get(&term) {
            return tid;
        }
        let tid = self.terms.len() as TermId;
        self.dictionary.insert(term.clone(), tid);
        self.terms.push(term);
        self.stats.push(TermStats::default());
        self.postings.push(Vec::new());
        tid
    }

    pub fn term_id(&self, term: &str) -> Option<TermId> { self.dictionary.get(term).copied() }

    pub fn term(&self, tid: TermId) -> Option<&str> { self.terms.get(tid as usize).map(String::as_str) }

    pub fn term_stats(&self, tid: TermId) -> TermStats { self.stats.get(tid as usize).copied().unwrap_or_default() }

    pub fn postings(&self, tid: TermId) -> &[Posting] {
        self.postings.get(tid as usize).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.ids.get(id).and_then(|d| self.docs.get(d)).map(|e| &e.document)
    }

    pub fn doc_id(&self, id: &str) -> Option<DocId> { self.ids.get(id).copied() }

    pub fn entry(&self, doc_id: DocId) -> Option<&DocEntry> { self.docs.get(&doc_id) }

    pub fn doc_len(&self, doc_id: DocId) -> u32 { self.docs.get(&doc_id).map(|e| e.length).unwrap_or(0) }

    pub fn external_id(&self, doc_id: DocId) -> &str {
        self.docs.get(&doc_id).map(|e| e.document.id.as_str()).unwrap_or("")
    }

    /// Documents in ingestion order.
    pub fn documents(&self) -> impl Iterator<Item = &Document> + '_ {
        self.docs.values().map(|e| &e.document)
    }

    pub fn entries(&self) -> &BTreeMap<DocId, DocEntry> { &self.docs }

    /// Size of the term dictionary, including terms no document uses anymore.
    pub fn dictionary_len(&self) -> usize { self.terms.len() }

    pub fn next_doc_id(&self) -> DocId { self.next_doc }

    pub fn num_docs(&self) -> u32 { self.docs.len() as u32 }

    pub fn total_tokens(&self) -> u64 { self.total_tokens }

    /// Terms currently present in at least one document.
    pub fn unique_terms(&self) -> usize { self.stats.iter().filter(|s| s.df > 0).count() }

    pub fn avg_doc_len(&self) -> f64 {
        if self.docs.is_empty() { 0.0 } else { self.total_tokens as f64 / self.docs.len() as f64 }
    }

    pub fn into_parts(self) -> IndexParts {
        IndexParts { terms: self.terms, stats: self.stats, postings: self.postings, docs: self.docs, next_doc: self.next_doc }
    }

    pub fn to_parts(&self) -> IndexParts { self.clone().into_parts() }

    /// Reassemble an index from stored parts, recomputing the derived lookups.
    pub fn from_parts(parts: IndexParts) -> Result<Self> {
        let IndexParts { terms, stats, postings, docs, next_doc } = parts;
        if terms.len() != stats.len() || terms.len() != postings.len() {
            return Err(Error::CorruptIndex(format!(
                "dictionary has {} terms but {} stats and {} postings lists",
                terms.len(),
                stats.len(),
                postings.len()
            )));
        }
        for (tid, list) in postings.iter().enumerate() {
            if list.len() != stats[tid].df as usize {
                return Err(Error::CorruptIndex(format!("term {:?} has df {} but {} postings", terms[tid], stats[tid].df, list.len())));
            }
            if list.windows(2).any(|w| w[0].doc >= w[1].doc) {
                return Err(Error::CorruptIndex(format!("postings for term {:?} are not sorted by doc", terms[tid])));
            }
            if let Some(p) = list.iter().find(|p| !docs.contains_key(&p.doc)) {
                return Err(Error::CorruptIndex(format!("term {:?} points at unknown doc {}", terms[tid], p.doc)));
            }
        }
        if let Some((doc, _)) = docs.iter().find(|(_, e)| e.terms.iter().any(|&(tid, _)| tid as usize >= terms.len())) {
            return Err(Error::CorruptIndex(format!("doc {doc} references a term outside the dictionary")));
        }
        let dictionary = terms.iter().enumerate().map(|(i, t)| (t.clone(), i as TermId)).collect();
        let ids = docs.iter().map(|(&d, e)| (e.document.id.clone(), d)).collect();
        let total_tokens = docs.values().map(|e| e.length as u64).sum();
        Ok(Self { dictionary, terms, stats, postings, docs, ids, next_doc, total_tokens })
    }
}
