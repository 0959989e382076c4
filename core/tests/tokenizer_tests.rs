use jobdex_core::tokenizer::{normalize, tokenize};

#[test]
fn it_normalizes_and_stems() {
    let toks = tokenize("Running Runners RUN! The café's menu.");
    let words: Vec<String> = toks.into_iter().map(|(w, _)| w).collect();
    // Stemming to "run" should appear
    assert!(words.contains(&"run".to_string()));
    // Diacritic folding: café -> cafe
    assert!(words.contains(&"cafe".to_string()));
}

#[test]
fn it_filters_stopwords() {
    let toks = tokenize("The quick brown fox and the lazy dog");
    let words: Vec<String> = toks.into_iter().map(|(w, _)| w).collect();
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
}

#[test]
fn query_and_document_paths_agree() {
    let doc: Vec<String> = tokenize("Développeur Senior").into_iter().map(|(w, _)| w).collect();
    let query: Vec<String> = tokenize("DEVELOPPEUR senior").into_iter().map(|(w, _)| w).collect();
    assert_eq!(doc, query);
}

#[test]
fn keeps_alphanumeric_terms() {
    let words: Vec<String> = tokenize("401k plan, 5 years of c3 experience").into_iter().map(|(w, _)| w).collect();
    assert!(words.contains(&"401k".to_string()));
    assert!(words.contains(&"5".to_string()));
    assert_eq!(normalize("ÅNGSTRÖM"), "angstrom");
}
