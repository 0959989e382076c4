//! On-disk index format.
//!
//! An index directory holds `meta.json` plus one generation directory
//! (`gen-000001`, `gen-000002`, ...) containing:
//! - `dictionary.bin`: term dictionary with df/cf and the byte range of each
//!   term's block in `postings.bin`.
//! - `postings.bin`: concatenated postings blocks, doc ids and positions delta-coded.
//! - `docs.bin`: document table (documents, lengths, forward term lists).
//! - `trie.bin`: autocomplete trie.
//!
//! A save writes a complete new generation, then atomically replaces
//! `meta.json` to point at it. Until that rename the previous generation is
//! what loads; afterwards the previous generation is deleted.

use crate::error::{Error, Result};
use crate::index::{DocEntry, IndexParts, InvertedIndex, TermStats};
use crate::trie::Trie;
use crate::{DocId, Posting, TermId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;

pub const FORMAT_VERSION: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    /// Generation directory holding the index files.
    pub generation: u64,
    pub num_docs: u32,
    pub num_terms: u32,
    pub total_tokens: u64,
    pub created_at: String,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }

    fn generation(&self, generation: u64) -> Generation {
        Generation { dir: self.root.join(format!("gen-{generation:06}")) }
    }

    /// True when a complete index has been written here.
    pub fn exists(&self) -> bool { self.meta().is_file() }
}

struct Generation {
    dir: PathBuf,
}

impl Generation {
    fn dictionary(&self) -> PathBuf { self.dir.join("dictionary.bin") }
    fn postings(&self) -> PathBuf { self.dir.join("postings.bin") }
    fn docs(&self) -> PathBuf { self.dir.join("docs.bin") }
    fn trie(&self) -> PathBuf { self.dir.join("trie.bin") }
}

#[derive(Debug, Serialize, Deserialize)]
struct DictEntry {
    term: String,
    df: u32,
    cf: u64,
    offset: u64,
    len: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PostingsBlock {
    doc_gaps: Vec<u32>,
    tfs: Vec<u32>,
    position_gaps: Vec<Vec<u32>>,
}

#[derive(Serialize)]
struct DocTableRef<'a> {
    next_doc: DocId,
    docs: &'a BTreeMap<DocId, DocEntry>,
}

#[derive(Deserialize)]
struct DocTable {
    next_doc: DocId,
    docs: BTreeMap<DocId, DocEntry>,
}

fn delta_encode(values: impl Iterator<Item = u32>) -> Vec<u32> {
    let mut prev = 0u32;
    values
        .map(|v| {
            let gap = v - prev;
            prev = v;
            gap
        })
        .collect()
}

fn delta_decode(gaps: &[u32]) -> Vec<u32> {
    let mut acc = 0u32;
    gaps.iter()
        .map(|g| {
            acc += g;
            acc
        })
        .collect()
}

fn encode_block(postings: &[Posting]) -> PostingsBlock {
    PostingsBlock {
        doc_gaps: delta_encode(postings.iter().map(|p| p.doc)),
        tfs: postings.iter().map(|p| p.tf).collect(),
        position_gaps: postings.iter().map(|p| delta_encode(p.positions.iter().copied())).collect(),
    }
}

fn decode_block(block: PostingsBlock) -> Result<Vec<Posting>> {
    if block.doc_gaps.len() != block.tfs.len() || block.tfs.len() != block.position_gaps.len() {
        return Err(Error::CorruptIndex("postings block has mismatched column lengths".into()));
    }
    let docs = delta_decode(&block.doc_gaps);
    Ok(docs
        .into_iter()
        .zip(block.tfs)
        .zip(block.position_gaps)
        .map(|((doc, tf), gaps)| Posting { doc, tf, positions: delta_decode(&gaps) })
        .collect())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut f = File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    write_file(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_all(path: &Path) -> Result<Vec<u8>> {
    let mut f = File::open(path)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    Ok(buf)
}

fn save_bin<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = bincode::serialize(value)?;
    write_file(path, &bytes)
}

fn load_bin<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let buf = read_all(path)?;
    Ok(bincode::deserialize(&buf)?)
}

/// Replace `meta.json` atomically. This is the commit point of a save.
pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let json = serde_json::to_string_pretty(meta)?;
    write_atomic(&paths.meta(), json.as_bytes())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let buf = read_all(&paths.meta())?;
    let meta: MetaFile = serde_json::from_slice(&buf)?;
    if meta.version != FORMAT_VERSION {
        return Err(Error::IncompatibleFormat { found: meta.version, expected: FORMAT_VERSION });
    }
    Ok(meta)
}

/// Write every index file into a fresh generation directory. Nothing points at it yet.
fn write_generation(generation: &Generation, index: &InvertedIndex, trie: &Trie) -> Result<()> {
    if generation.dir.exists() {
        // leftover of a save that never committed
        fs::remove_dir_all(&generation.dir)?;
    }
    create_dir_all(&generation.dir)?;

    let mut dictionary = Vec::with_capacity(index.dictionary_len());
    let mut postings = Vec::new();
    for tid in 0..index.dictionary_len() as TermId {
        let bytes = bincode::serialize(&encode_block(index.postings(tid)))?;
        let stats = index.term_stats(tid);
        dictionary.push(DictEntry {
            term: index.term(tid).unwrap_or_default().to_string(),
            df: stats.df,
            cf: stats.cf,
            offset: postings.len() as u64,
            len: bytes.len() as u32,
        });
        postings.extend_from_slice(&bytes);
    }

    write_file(&generation.postings(), &postings)?;
    save_bin(&generation.dictionary(), &dictionary)?;
    save_bin(&generation.docs(), &DocTableRef { next_doc: index.next_doc_id(), docs: index.entries() })?;
    save_bin(&generation.trie(), trie)?;
    Ok(())
}

/// Write the index and trie into `paths.root`, replacing whatever was there.
///
/// A save that fails at any point leaves the previously committed index loadable.
pub fn save_index(paths: &IndexPaths, index: &InvertedIndex, trie: &Trie) -> Result<MetaFile> {
    create_dir_all(&paths.root)?;
    let previous = load_meta(paths).ok();
    let generation = previous.as_ref().map_or(1, |m| m.generation + 1);
    write_generation(&paths.generation(generation), index, trie)?;

    let meta = MetaFile {
        version: FORMAT_VERSION,
        generation,
        num_docs: index.num_docs(),
        num_terms: index.unique_terms() as u32,
        total_tokens: index.total_tokens(),
        created_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| "".into()),
    };
    save_meta(paths, &meta)?;

    if let Some(old) = previous {
        let dir = paths.generation(old.generation).dir;
        if let Err(err) = fs::remove_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), %err, "could not remove previous index generation");
        }
    }
    tracing::info!(root = %paths.root.display(), generation, num_docs = meta.num_docs, num_terms = meta.num_terms, "saved index");
    Ok(meta)
}

/// Load the generation `meta.json` points at, checking it against the recorded counts.
pub fn load_index(paths: &IndexPaths) -> Result<(InvertedIndex, Trie, MetaFile)> {
    let meta = load_meta(paths)?;
    let generation = paths.generation(meta.generation);
    let dictionary: Vec<DictEntry> = load_bin(&generation.dictionary())?;
    let postings_bytes = read_all(&generation.postings())?;

    let mut terms = Vec::with_capacity(dictionary.len());
    let mut stats = Vec::with_capacity(dictionary.len());
    let mut postings = Vec::with_capacity(dictionary.len());
    for entry in dictionary {
        let start = entry.offset as usize;
        let end = start + entry.len as usize;
        let slice = postings_bytes
            .get(start..end)
            .ok_or_else(|| Error::CorruptIndex(format!("postings for term {:?} lie outside postings.bin", entry.term)))?;
        postings.push(decode_block(bincode::deserialize(slice)?)?);
        stats.push(TermStats { df: entry.df, cf: entry.cf });
        terms.push(entry.term);
    }

    let table: DocTable = load_bin(&generation.docs())?;
    let index = InvertedIndex::from_parts(IndexParts { terms, stats, postings, docs: table.docs, next_doc: table.next_doc })?;
    if index.num_docs() != meta.num_docs
        || index.unique_terms() as u32 != meta.num_terms
        || index.total_tokens() != meta.total_tokens
    {
        return Err(Error::CorruptIndex(format!(
            "meta.json records {} docs, {} terms, {} tokens but generation {} holds {}, {}, {}",
            meta.num_docs,
            meta.num_terms,
            meta.total_tokens,
            meta.generation,
            index.num_docs(),
            index.unique_terms(),
            index.total_tokens()
        )));
    }
    let trie = load_bin(&generation.trie())?;
    tracing::info!(root = %paths.root.display(), generation = meta.generation, num_docs = meta.num_docs, "loaded index");
    Ok((index, trie, meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Document;
    use tempfile::tempdir;

    #[test]
    fn delta_coding_round_trips() {
        let postings = vec![
            Posting { doc: 3, tf: 2, positions: vec![0, 7] },
            Posting { doc: 10, tf: 1, positions: vec![4] },
            Posting { doc: 11, tf: 3, positions: vec![1, 2, 9] },
        ];
        let block = encode_block(&postings);
        assert_eq!(block.doc_gaps, vec![3, 7, 1]);
        assert_eq!(block.position_gaps[2], vec![1, 1, 7]);
        assert_eq!(decode_block(block).unwrap(), postings);
    }

    #[test]
    fn index_survives_save_and_load() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let mut index = InvertedIndex::build(vec![
            Document::new("1", "Barista", "coffee bar shifts").with_attribute("company", "Bean Co"),
            Document::new("2", "Data Analyst", "sql dashboards"),
        ])
        .unwrap();
        index.remove_document("1").unwrap();
        index.add_document(Document::new("3", "Barista", "espresso"), false).unwrap();
        let mut trie = Trie::new();
        trie.insert("barista", 2);

        assert!(!paths.exists());
        let meta = save_index(&paths, &index, &trie).unwrap();
        assert!(paths.exists());
        assert_eq!(meta.num_docs, 2);

        let (loaded, loaded_trie, loaded_meta) = load_index(&paths).unwrap();
        assert_eq!(loaded_meta, meta);
        assert_eq!(loaded.num_docs(), 2);
        assert_eq!(loaded.next_doc_id(), index.next_doc_id());
        assert_eq!(loaded.get("3"), index.get("3"));
        assert!(loaded.get("1").is_none());
        for tid in 0..index.dictionary_len() as TermId {
            assert_eq!(loaded.postings(tid), index.postings(tid));
            assert_eq!(loaded.term_stats(tid), index.term_stats(tid));
        }
        assert_eq!(loaded_trie.weight("barista"), Some(2));
    }

    #[test]
    fn rejects_other_format_versions() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        save_meta(&paths, &MetaFile { version: 1, generation: 1, num_docs: 0, num_terms: 0, total_tokens: 0, created_at: String::new() }).unwrap();
        assert!(matches!(load_index(&paths), Err(Error::IncompatibleFormat { found: 1, .. })));
    }

    fn listings(docs: &[(&str, &str, &str)]) -> (InvertedIndex, Trie) {
        let corpus: Vec<Document> = docs.iter().map(|(id, title, body)| Document::new(*id, *title, *body)).collect();
        let mut trie = Trie::new();
        for doc in &corpus {
            trie.insert(&doc.title.to_lowercase(), 1);
        }
        (InvertedIndex::build(corpus).unwrap(), trie)
    }

    #[test]
    fn interrupted_save_keeps_previous_index() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let (old, old_trie) = listings(&[("a1", "Welder", "steel"), ("a2", "Painter", "walls")]);
        save_index(&paths, &old, &old_trie).unwrap();

        // The next save dies after some of its files are written.
        let (new, new_trie) = listings(&[("b1", "Nurse", "ward care")]);
        let next = paths.generation(2);
        write_generation(&next, &new, &new_trie).unwrap();
        fs::remove_file(next.docs()).unwrap();

        let (loaded, trie, meta) = load_index(&paths).unwrap();
        assert_eq!(meta.generation, 1);
        assert_eq!(loaded.num_docs(), 2);
        assert!(loaded.get("a1").is_some());
        assert!(loaded.get("b1").is_none());
        assert_eq!(trie.weight("welder"), Some(1));

        // A later save replaces the stale generation and drops the old one.
        let meta = save_index(&paths, &new, &new_trie).unwrap();
        assert_eq!(meta.generation, 2);
        assert!(!paths.generation(1).dir.exists());
        let (loaded, _, _) = load_index(&paths).unwrap();
        assert_eq!(loaded.num_docs(), 1);
        assert!(loaded.get("b1").is_some());
        assert!(loaded.get("a1").is_none());
    }

    #[test]
    fn mismatched_files_are_rejected() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let (old, old_trie) = listings(&[("a1", "Welder", "steel"), ("a2", "Painter", "walls")]);
        save_index(&paths, &old, &old_trie).unwrap();
        let current = paths.generation(1);
        let good_docs = fs::read(current.docs()).unwrap();

        // docs.bin from a different index next to this dictionary
        let (other, _) = listings(&[("b1", "Nurse", "ward care")]);
        save_bin(&current.docs(), &DocTableRef { next_doc: other.next_doc_id(), docs: other.entries() }).unwrap();
        assert!(matches!(load_index(&paths), Err(Error::CorruptIndex(_))));

        // counts in meta.json that disagree with the files
        fs::write(current.docs(), good_docs).unwrap();
        let mut meta = load_meta(&paths).unwrap();
        meta.num_docs = 7;
        save_meta(&paths, &meta).unwrap();
        assert!(matches!(load_index(&paths), Err(Error::CorruptIndex(_))));
    }
}
