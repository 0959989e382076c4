//! Weighted prefix tree for query autocompletion.

use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Node {
    children: BTreeMap<char, u32>,
    weight: u64,
    terminal: bool,
}

/// Arena-backed trie; node 0 is the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trie {
    nodes: Vec<Node>,
    len: usize,
}

impl Default for Trie {
    fn default() -> Self { Self { nodes: vec![Node::default()], len: 0 } }
}

#[derive(PartialEq, Eq)]
struct Candidate {
    weight: u64,
    term: String,
}

// Greater means better: heavier first, then lexicographically smaller.
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.weight.cmp(&other.weight).then_with(|| other.term.cmp(&self.term))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Trie {
    pub fn new() -> Self { Self::default() }

    /// Number of terminal terms.
    pub fn len(&self) -> usize { self.len }

    pub fn is_empty(&self) -> bool { self.len == 0 }

    /// Add `weight` to `term`, creating it if needed.
    pub fn insert(&mut self, term: &str, weight: u64) {
        if term.is_empty() {
            return;
        }
        let mut at = 0usize;
        for ch in term.chars() {
            at = match self.nodes[at].children.get(&ch) {
                Some(&next) => next as usize,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(Node::default());
                    self.nodes[at].children.insert(ch, next as u32);
                    next
                }
            };
        }
        let node = &mut self.nodes[at];
        node.weight = node.weight.saturating_add(weight);
        if !node.terminal {
            node.terminal = true;
            self.len += 1;
        }
    }

    /// Subtract `weight` from `term`; at zero the term stops being suggested.
    pub fn decrement(&mut self, term: &str, weight: u64) {
        let Some(at) = self.find(term) else { return };
        let node = &mut self.nodes[at];
        if !node.terminal {
            return;
        }
        node.weight = node.weight.saturating_sub(weight);
        if node.weight == 0 {
            node.terminal = false;
            self.len -= 1;
        }
    }

    pub fn weight(&self, term: &str) -> Option<u64> {
        self.find(term).map(|at| &self.nodes[at]).filter(|n| n.terminal).map(|n| n.weight)
    }

    fn find(&self, prefix: &str) -> Option<usize> {
        let mut at = 0usize;
        for ch in prefix.chars() {
            at = *self.nodes[at].children.get(&ch)? as usize;
        }
        Some(at)
    }

    /// The `limit` heaviest terms starting with `prefix`, heaviest first, ties lexicographic.
    pub fn suggest(&self, prefix: &str, limit: usize) -> Vec<(String, u64)> {
        if limit == 0 {
            return Vec::new();
        }
        let Some(start) = self.find(prefix) else { return Vec::new() };

        let mut heap: BinaryHeap<Reverse<Candidate>> = BinaryHeap::with_capacity(limit.min(self.len).saturating_add(1));
        let mut stack = vec![(start, prefix.to_string())];
        while let Some((at, word)) = stack.pop() {
            let node = &self.nodes[at];
            if node.terminal {
                heap.push(Reverse(Candidate { weight: node.weight, term: word.clone() }));
                if heap.len() > limit {
                    heap.pop();
                }
            }
            for (&ch, &child) in &node.children {
                let mut next = word.clone();
                next.push(ch);
                stack.push((child as usize, next));
            }
        }
        heap.into_sorted_vec().into_iter().map(|Reverse(c)| (c.term, c.weight)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Trie {
        let mut trie = Trie::new();
        for (term, weight) in [("engineer", 5), ("engine", 5), ("english", 2), ("data", 9), ("design", 3)] {
            trie.insert(term, weight);
        }
        trie
    }

    #[test]
    fn suggests_by_weight_then_lexicographic() {
        let trie = sample();
        assert_eq!(
            trie.suggest("eng", 10),
            vec![("engine".to_string(), 5), ("engineer".to_string(), 5), ("english".to_string(), 2)]
        );
        assert_eq!(trie.suggest("eng", 1), vec![("engine".to_string(), 5)]);
        assert!(trie.suggest("x", 5).is_empty());
        assert!(trie.suggest("eng", 0).is_empty());
    }

    #[test]
    fn empty_prefix_returns_global_top() {
        let trie = sample();
        let top: Vec<String> = trie.suggest("", 2).into_iter().map(|(t, _)| t).collect();
        assert_eq!(top, vec!["data", "engine"]);
    }

    #[test]
    fn incremental_insert_accumulates() {
        let mut trie = sample();
        trie.insert("english", 10);
        assert_eq!(trie.weight("english"), Some(12));
        assert_eq!(trie.suggest("e", 1)[0].0, "english");
        assert_eq!(trie.len(), 5);
    }

    #[test]
    fn decrement_to_zero_removes_term() {
        let mut trie = sample();
        trie.decrement("design", 3);
        assert_eq!(trie.weight("design"), None);
        assert_eq!(trie.len(), 4);
        assert!(trie.suggest("des", 5).is_empty());
        trie.decrement("data", 4);
        assert_eq!(trie.weight("data"), Some(5));
    }

    #[test]
    fn huge_limit_returns_every_match() {
        let trie = sample();
        assert_eq!(trie.suggest("eng", usize::MAX / 64).len(), 3);
        assert_eq!(trie.suggest("", usize::MAX).len(), 5);
    }

    #[test]
    fn handles_multibyte_prefixes() {
        let mut trie = Trie::new();
        trie.insert("über", 1);
        trie.insert("übung", 2);
        let got: Vec<String> = trie.suggest("üb", 5).into_iter().map(|(t, _)| t).collect();
        assert_eq!(got, vec!["übung", "über"]);
    }
}
