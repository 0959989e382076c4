//! Pseudo-relevance feedback query expansion.
//!
//! The top-ranked documents of a first retrieval pass are assumed relevant;
//! terms that occur in them more often than the collection predicts are
//! weighted with Bo1 (Bose-Einstein divergence from randomness) and the
//! strongest are appended to the query.

use crate::config::ExpansionConfig;
use crate::index::InvertedIndex;
use crate::ranking::ScoredDoc;
use crate::TermId;
use std::collections::{HashMap, HashSet};

/// Bo1 informativeness of a term seen `tf_x` times in the feedback set.
pub fn bo1_weight(tf_x: f64, cf: f64, num_docs: f64) -> f64 {
    let pn = cf / num_docs;
    if pn <= 0.0 {
        return 0.0;
    }
    tf_x * ((1.0 + pn) / pn).log2() + (1.0 + pn).log2()
}

/// Return the original query plus at most `cfg.max_terms` expansion terms.
///
/// Expansion terms are weighted in (0, 1] relative to the strongest candidate;
/// original terms keep their weights.
pub fn expand(
    index: &InvertedIndex,
    ranked: &[ScoredDoc],
    original: &[(TermId, f64)],
    cfg: &ExpansionConfig,
) -> Vec<(TermId, f64)> {
    let mut query = original.to_vec();
    if cfg.max_terms == 0 || cfg.feedback_docs == 0 || ranked.is_empty() {
        return query;
    }

    let mut feedback_tf: HashMap<TermId, u64> = HashMap::new();
    for scored in ranked.iter().take(cfg.feedback_docs) {
        if let Some(entry) = index.entry(scored.doc) {
            for &(tid, tf) in &entry.terms {
                *feedback_tf.entry(tid).or_insert(0) += tf as u64;
            }
        }
    }

    let present: HashSet<TermId> = original.iter().map(|(t, _)| *t).collect();
    let n = index.num_docs().max(1) as f64;
    let mut candidates: Vec<(TermId, f64)> = feedback_tf
        .into_iter()
        .filter(|(tid, _)| !present.contains(tid))
        .map(|(tid, tf_x)| (tid, bo1_weight(tf_x as f64, index.term_stats(tid).cf as f64, n)))
        .filter(|(_, w)| *w > 0.0)
        .collect();
    candidates.sort_by(|a, b| {
        b.1.total_cmp(&a.1).then_with(|| index.term(a.0).cmp(&index.term(b.0)))
    });
    candidates.truncate(cfg.max_terms);

    let Some(max_w) = candidates.first().map(|c| c.1) else { return query };
    tracing::debug!(added = candidates.len(), "expanded query");
    query.extend(candidates.into_iter().map(|(tid, w)| (tid, w / max_w)));
    query
}
