use crate::error::Result;
use crate::ranking::RetrievalModel;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Free parameters of the ranking functions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingParams {
    /// BM25 term-frequency saturation.
    pub k1: f64,
    /// BM25 length normalization.
    pub b: f64,
    /// Dirichlet smoothing mass.
    pub mu: f64,
}

impl Default for RankingParams {
    fn default() -> Self { Self { k1: 1.2, b: 0.75, mu: 2000.0 } }
}

/// Pseudo-relevance feedback settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    /// Top-ranked documents treated as relevant.
    pub feedback_docs: usize,
    /// Upper bound on terms added to a query.
    pub max_terms: usize,
}

impl Default for ExpansionConfig {
    fn default() -> Self { Self { feedback_docs: 3, max_terms: 10 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ranking: RankingParams,
    pub expansion: ExpansionConfig,
    pub default_model: RetrievalModel,
    /// Queries running longer than this fail with a timeout. `None` disables the budget.
    pub query_timeout_ms: Option<u64>,
    /// Hard cap on results per query, whatever the caller asks for.
    pub max_results: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ranking: RankingParams::default(),
            expansion: ExpansionConfig::default(),
            default_model: RetrievalModel::Bm25,
            query_timeout_ms: Some(2_000),
            max_results: 100,
        }
    }
}

impl EngineConfig {
    pub fn query_timeout(&self) -> Option<Duration> { self.query_timeout_ms.map(Duration::from_millis) }

    /// Load a JSON config file; missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
