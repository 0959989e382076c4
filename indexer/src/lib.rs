//! Corpus loading for the indexer: JSON arrays, single JSON objects and JSONL
//! files of job listings, from a file or a directory tree.

use anyhow::{anyhow, Context, Result};
use jobdex_core::Document;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A listing as found in the input files. Both the plain `id/title/body`
/// layout and the job-dataset column names are accepted; every other field
/// becomes an attribute.
#[derive(Debug, Deserialize)]
pub struct InputDoc {
    #[serde(alias = "Job Id", alias = "job_id", alias = "docno")]
    pub id: Value,
    #[serde(default, alias = "Job Title", alias = "job_title")]
    pub title: Option<String>,
    #[serde(default, alias = "Job Description", alias = "job_description", alias = "text")]
    pub body: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// "Salary Range" -> "salary_range"
fn attribute_key(raw: &str) -> String {
    raw.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join("_")
}

fn attribute_value(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s),
        Value::Array(items) => {
            let parts: Vec<String> = items.into_iter().filter_map(attribute_value).collect();
            if parts.is_empty() { None } else { Some(parts.join(", ")) }
        }
        other => Some(other.to_string()),
    }
}

impl InputDoc {
    pub fn into_document(self) -> Result<Document> {
        let id = match self.id {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => return Err(anyhow!("document id must be a string or number, got {other}")),
        };
        let mut doc = Document::new(id, self.title.unwrap_or_default(), self.body.unwrap_or_default());
        for (key, value) in self.extra {
            if let Some(value) = attribute_value(value) {
                doc.attributes.insert(attribute_key(&key), value);
            }
        }
        Ok(doc)
    }
}

/// Every `.json`/`.jsonl` file under `input` (or `input` itself), sorted for a stable doc order.
pub fn input_files(input: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
        files.sort();
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files
}

pub fn load_corpus(input: &Path) -> Result<Vec<Document>> {
    let files = input_files(input);
    if files.is_empty() {
        return Err(anyhow!("no .json or .jsonl input found at {}", input.display()));
    }
    let mut docs = Vec::new();
    for file in files {
        let before = docs.len();
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(&file, &mut docs)?;
        } else {
            read_json(&file, &mut docs)?;
        }
        tracing::debug!(file = %file.display(), docs = docs.len() - before, "read input file");
    }
    Ok(docs)
}

fn read_jsonl(file: &Path, docs: &mut Vec<Document>) -> Result<()> {
    let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let reader = BufReader::new(f);
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let doc: InputDoc = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: malformed listing", file.display(), lineno + 1))?;
        docs.push(doc.into_document().with_context(|| format!("{}:{}", file.display(), lineno + 1))?);
    }
    Ok(())
}

fn read_json(file: &Path, docs: &mut Vec<Document>) -> Result<()> {
    let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let json: Value = serde_json::from_reader(BufReader::new(f)).with_context(|| format!("parsing {}", file.display()))?;
    match json {
        Value::Array(arr) => {
            for (i, v) in arr.into_iter().enumerate() {
                let doc: InputDoc = serde_json::from_value(v)
                    .with_context(|| format!("{}[{}]: malformed listing", file.display(), i))?;
                docs.push(doc.into_document().with_context(|| format!("{}[{}]", file.display(), i))?);
            }
        }
        Value::Object(_) => {
            let doc: InputDoc = serde_json::from_value(json).with_context(|| format!("{}: malformed listing", file.display()))?;
            docs.push(doc.into_document()?);
        }
        _ => tracing::warn!(file = %file.display(), "skipping file: expected an object or an array"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn maps_dataset_columns() {
        let raw = r#"{"Job Id": 1089843540111562, "Job Title": "Digital Marketing Specialist",
            "Job Description": "Social media campaigns", "Company": "Icahn Enterprises",
            "Salary Range": "$59K-$99K", "location": "Douglas", "Company Size": 26801,
            "Benefits": ["Health Insurance", "401(k)"], "latitude": null}"#;
        let doc = serde_json::from_str::<InputDoc>(raw).unwrap().into_document().unwrap();
        assert_eq!(doc.id, "1089843540111562");
        assert_eq!(doc.title, "Digital Marketing Specialist");
        assert_eq!(doc.body, "Social media campaigns");
        assert_eq!(doc.attributes["company"], "Icahn Enterprises");
        assert_eq!(doc.attributes["salary_range"], "$59K-$99K");
        assert_eq!(doc.attributes["company_size"], "26801");
        assert_eq!(doc.attributes["benefits"], "Health Insurance, 401(k)");
        assert!(!doc.attributes.contains_key("latitude"));
    }

    #[test]
    fn rejects_structured_ids() {
        let doc: InputDoc = serde_json::from_str(r#"{"id": {"a": 1}, "title": "x"}"#).unwrap();
        assert!(doc.into_document().is_err());
    }

    #[test]
    fn loads_a_directory_of_mixed_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.jsonl"), "{\"id\":\"a1\",\"title\":\"Cook\",\"body\":\"kitchen\"}\n\n{\"id\":\"a2\",\"title\":\"Chef\"}\n").unwrap();
        fs::write(dir.path().join("b.json"), r#"[{"id": 7, "body": "warehouse"}]"#).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let docs = load_corpus(dir.path()).unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2", "7"]);
    }

    #[test]
    fn malformed_line_names_its_location() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("bad.jsonl");
        fs::write(&file, "{\"id\":\"ok\"}\nnot json\n").unwrap();
        let err = load_corpus(&file).unwrap_err();
        assert!(format!("{err:#}").contains("bad.jsonl:2"));
    }
}
