use regex::{Regex, RegexBuilder};

const BEFORE: usize = 100;
const AFTER: usize = 200;

/// Raw query words used for highlighting, stripped of surrounding punctuation.
pub fn raw_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn terms_regex(terms: &[String]) -> Option<Regex> {
    if terms.is_empty() {
        return None;
    }
    let alternation = terms.iter().map(|t| regex::escape(t)).collect::<Vec<_>>().join("|");
    RegexBuilder::new(&alternation).case_insensitive(true).build().ok()
}

fn floor_boundary(s: &str, mut i: usize) -> usize {
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// A window of `text` around the first query-term hit with every hit wrapped in `<em>`.
pub fn snippet(text: &str, terms: &[String]) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    let re = terms_regex(terms);
    let first = re.as_ref().and_then(|re| re.find(text)).map(|m| m.start());
    let window = match first {
        Some(idx) => {
            let start = floor_boundary(text, idx.saturating_sub(BEFORE));
            let end = floor_boundary(text, (idx + AFTER).min(text.len()));
            &text[start..end]
        }
        None => {
            let end = text.char_indices().nth(AFTER).map(|(i, _)| i).unwrap_or(text.len());
            &text[..end]
        }
    };
    Some(match re {
        Some(re) => re.replace_all(window, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).into_owned(),
        None => window.to_string(),
    })
}
