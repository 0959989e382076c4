//! Scoring of documents against a weighted bag of query terms.
//!
//! Three closed-set models are supported: BM25, TF-IDF with add-one smoothed
//! IDF, and query likelihood with Dirichlet smoothing. Scoring is
//! term-at-a-time over the postings lists; results are ordered by score
//! descending, ties broken by external document id ascending.

use crate::config::RankingParams;
use crate::error::{Error, Result};
use crate::index::InvertedIndex;
use crate::{DocId, TermId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetrievalModel {
    #[serde(rename = "BM25")]
    Bm25,
    #[serde(rename = "TF_IDF")]
    TfIdf,
    #[serde(rename = "DirichletLM")]
    DirichletLm,
}

impl Default for RetrievalModel {
    fn default() -> Self { RetrievalModel::Bm25 }
}

impl RetrievalModel {
    pub const ALL: [RetrievalModel; 3] = [RetrievalModel::Bm25, RetrievalModel::TfIdf, RetrievalModel::DirichletLm];

    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalModel::Bm25 => "BM25",
            RetrievalModel::TfIdf => "TF_IDF",
            RetrievalModel::DirichletLm => "DirichletLM",
        }
    }
}

impl fmt::Display for RetrievalModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for RetrievalModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s.chars().filter(|c| !matches!(c, '_' | '-' | ' ')).collect::<String>().to_ascii_uppercase();
        match key.as_str() {
            "BM25" => Ok(RetrievalModel::Bm25),
            "TFIDF" => Ok(RetrievalModel::TfIdf),
            "DIRICHLETLM" | "LMDIRICHLET" | "DIRICHLET" => Ok(RetrievalModel::DirichletLm),
            _ => Err(Error::UnsupportedModel(s.to_string())),
        }
    }
}

/// Time budget for a single query.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    pub fn new(budget: Option<Duration>) -> Self { Self { start: Instant::now(), budget } }

    pub fn unbounded() -> Self { Self::new(None) }

    pub fn check(&self) -> Result<()> {
        match self.budget {
            Some(budget) if self.start.elapsed() >= budget => {
                Err(Error::QueryTimeout { budget_ms: budget.as_millis() as u64 })
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub doc: DocId,
    pub score: f64,
}

/// BM25 contribution of one term occurring `tf` times in a document of length `dl`.
pub fn bm25_term(tf: f64, dl: f64, avgdl: f64, df: f64, n: f64, params: &RankingParams) -> f64 {
    let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
    let norm = if avgdl > 0.0 { 1.0 - params.b + params.b * dl / avgdl } else { 1.0 };
    idf * tf * (params.k1 + 1.0) / (tf + params.k1 * norm)
}

/// TF-IDF contribution with IDF = ln(1 + N/df).
pub fn tf_idf_term(tf: f64, df: f64, n: f64) -> f64 {
    tf * (1.0 + n / df.max(1.0)).ln()
}

/// Document-dependent half of the Dirichlet query likelihood for one matching term.
pub fn dirichlet_term(tf: f64, collection_prob: f64, mu: f64) -> f64 {
    (1.0 + tf / (mu * collection_prob)).ln()
}

/// Score every document matching at least one query term.
///
/// `query` holds (term, weight) pairs; the weight is the query term frequency,
/// or a fractional weight for expansion terms.
pub fn rank(
    index: &InvertedIndex,
    query: &[(TermId, f64)],
    model: RetrievalModel,
    params: &RankingParams,
    deadline: &Deadline,
) -> Result<Vec<ScoredDoc>> {
    let n = index.num_docs() as f64;
    if n == 0.0 || query.is_empty() {
        return Ok(Vec::new());
    }
    let avgdl = index.avg_doc_len();
    let total_tokens = index.total_tokens() as f64;

    let mut scores: HashMap<DocId, f64> = HashMap::new();
    let mut query_mass = 0.0;
    for &(tid, qw) in query {
        deadline.check()?;
        let stats = index.term_stats(tid);
        if stats.df == 0 {
            continue;
        }
        let df = stats.df as f64;
        query_mass += qw;
        for p in index.postings(tid) {
            let tf = p.tf as f64;
            let contrib = match model {
                RetrievalModel::Bm25 => bm25_term(tf, index.doc_len(p.doc) as f64, avgdl, df, n, params),
                RetrievalModel::TfIdf => tf_idf_term(tf, df, n),
                RetrievalModel::DirichletLm => dirichlet_term(tf, stats.cf as f64 / total_tokens, params.mu),
            };
            *scores.entry(p.doc).or_insert(0.0) += qw * contrib;
        }
    }

    if model == RetrievalModel::DirichletLm {
        for (doc, score) in scores.iter_mut() {
            let dl = index.doc_len(*doc) as f64;
            *score += query_mass * (params.mu / (dl + params.mu)).ln();
        }
    }

    deadline.check()?;
    let mut scored: Vec<ScoredDoc> = scores.into_iter().map(|(doc, score)| ScoredDoc { doc, score }).collect();
    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| index.external_id(a.doc).cmp(index.external_id(b.doc)))
    });
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Document;

    fn index() -> InvertedIndex {
        InvertedIndex::build(vec![
            Document::new("1", "", "cat dog"),
            Document::new("2", "", "dog bird"),
            Document::new("3", "", "cat bird fish"),
        ])
        .unwrap()
    }

    fn ids(index: &InvertedIndex, scored: &[ScoredDoc]) -> Vec<String> {
        scored.iter().map(|s| index.external_id(s.doc).to_string()).collect()
    }

    #[test]
    fn parses_model_names() {
        assert_eq!("BM25".parse::<RetrievalModel>().unwrap(), RetrievalModel::Bm25);
        assert_eq!("tf_idf".parse::<RetrievalModel>().unwrap(), RetrievalModel::TfIdf);
        assert_eq!("DirichletLM".parse::<RetrievalModel>().unwrap(), RetrievalModel::DirichletLm);
        assert!(matches!("PL2".parse::<RetrievalModel>(), Err(Error::UnsupportedModel(m)) if m == "PL2"));
        for model in RetrievalModel::ALL {
            assert_eq!(model.to_string().parse::<RetrievalModel>().unwrap(), model);
        }
    }

    #[test]
    fn bm25_grows_with_tf_at_fixed_length() {
        let params = RankingParams::default();
        let mut prev = 0.0;
        for tf in 1..20 {
            let s = bm25_term(tf as f64, 40.0, 25.0, 3.0, 100.0, &params);
            assert!(s > prev, "tf={tf} score={s} prev={prev}");
            prev = s;
        }
    }

    #[test]
    fn every_model_finds_the_matching_documents() {
        let index = index();
        let cat = index.term_id("cat").unwrap();
        for model in RetrievalModel::ALL {
            let scored = rank(&index, &[(cat, 1.0)], model, &RankingParams::default(), &Deadline::unbounded()).unwrap();
            let mut found = ids(&index, &scored);
            found.sort();
            assert_eq!(found, vec!["1", "3"], "{model}");
        }
    }

    #[test]
    fn ties_break_on_document_id() {
        let index = index();
        let cat = index.term_id("cat").unwrap();
        let scored = rank(&index, &[(cat, 1.0)], RetrievalModel::TfIdf, &RankingParams::default(), &Deadline::unbounded()).unwrap();
        assert_eq!(scored[0].score, scored[1].score);
        assert_eq!(ids(&index, &scored), vec!["1", "3"]);
    }

    #[test]
    fn shorter_document_wins_under_length_normalized_models() {
        let index = index();
        let bird = index.term_id("bird").unwrap();
        for model in [RetrievalModel::Bm25, RetrievalModel::DirichletLm] {
            let scored = rank(&index, &[(bird, 1.0)], model, &RankingParams::default(), &Deadline::unbounded()).unwrap();
            assert_eq!(ids(&index, &scored), vec!["2", "3"], "{model}");
            assert!(scored[0].score > scored[1].score);
        }
    }

    #[test]
    fn expired_deadline_times_out() {
        let index = index();
        let cat = index.term_id("cat").unwrap();
        let deadline = Deadline::new(Some(Duration::ZERO));
        let err = rank(&index, &[(cat, 1.0)], RetrievalModel::Bm25, &RankingParams::default(), &deadline).unwrap_err();
        assert!(matches!(err, Error::QueryTimeout { .. }));
    }
}
