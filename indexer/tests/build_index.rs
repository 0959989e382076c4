use jobdex_core::persist::{load_meta, IndexPaths};
use jobdex_core::{EngineConfig, Query, SearchEngine};
use jobdex_indexer::load_corpus;
use std::fs;
use tempfile::tempdir;

const LISTINGS: &str = r#"[
  {"Job Id": 101, "Job Title": "Frontend Developer", "Job Description": "React and TypeScript user interfaces", "Company": "Pied Piper", "location": "Palo Alto"},
  {"Job Id": 102, "Job Title": "Backend Developer", "Job Description": "Rust services and PostgreSQL", "Company": "Hooli", "Salary Range": "$100K-$140K"},
  {"Job Id": 103, "Job Title": "Product Manager", "Job Description": "Roadmaps and stakeholder interviews", "Company": "Aviato"}
]"#;

#[test]
fn corpus_files_become_a_searchable_index() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    fs::write(input.path().join("listings.json"), LISTINGS).unwrap();

    let corpus = load_corpus(input.path()).unwrap();
    let engine = SearchEngine::from_corpus(corpus, EngineConfig::default()).unwrap();
    engine.save(output.path()).unwrap();

    let meta = load_meta(&IndexPaths::new(output.path())).unwrap();
    assert_eq!(meta.num_docs, 3);

    let reopened = SearchEngine::open(output.path(), EngineConfig::default()).unwrap();
    let results = reopened.search(&Query::new("rust developer")).unwrap();
    assert_eq!(results.hits[0].id, "102");
    assert_eq!(results.hits[0].metadata.company.as_deref(), Some("Hooli"));
    assert_eq!(results.hits[0].metadata.salary_range.as_deref(), Some("$100K-$140K"));
    assert_eq!(results.total_hits, 2);
}

#[test]
fn duplicate_ids_across_files_fail_the_build() {
    let input = tempdir().unwrap();
    fs::write(input.path().join("a.jsonl"), "{\"id\": \"x\", \"title\": \"One\"}\n").unwrap();
    fs::write(input.path().join("b.jsonl"), "{\"id\": \"x\", \"title\": \"Two\"}\n").unwrap();
    let corpus = load_corpus(input.path()).unwrap();
    let err = SearchEngine::from_corpus(corpus, EngineConfig::default()).err().unwrap();
    assert!(err.to_string().contains("\"x\""));
}
