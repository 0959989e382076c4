//! Command-line client for the search server's HTTP API.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "jobdex")]
#[command(about = "Query and manage a running job search server")]
struct Cli {
    /// Base URL of the search engine API
    #[arg(long, global = true, env = "JOBDEX_URL", default_value = "http://localhost:8000")]
    url: String,
    /// Admin token for add/remove/commit
    #[arg(long, global = true, env = "ADMIN_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Request timeout seconds
    #[arg(long, global = true, default_value_t = 10)]
    timeout_secs: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search for documents
    Search {
        query: String,
        /// Use query expansion
        #[arg(short, long)]
        expansion: bool,
        /// Number of results to display
        #[arg(short, long, default_value_t = 10)]
        results: i64,
        /// Retrieval model for this query only
        #[arg(long)]
        model: Option<String>,
    },
    /// Set the server's default retrieval model
    Model {
        #[arg(value_parser = ["BM25", "TF_IDF", "DirichletLM"])]
        name: String,
    },
    /// Get search engine information
    Info,
    /// Add a document to the index
    Add {
        docno: String,
        text: String,
        #[arg(long, default_value = "")]
        title: String,
        /// Replace an existing document with the same id
        #[arg(long)]
        replace: bool,
    },
    /// Remove a document from the index
    Remove { docno: String },
    /// Show a full document
    Get { docno: String },
    /// Autocomplete a partial query
    Suggest {
        prefix: String,
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },
    /// Persist the server's current index to disk
    Commit,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    doc_id: String,
    score: f64,
    title: String,
    company: Option<String>,
    location: Option<String>,
    snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    model: String,
    took_s: f64,
    total_hits: usize,
    results: Vec<SearchHit>,
}

struct ApiClient {
    http: Client,
    base: Url,
    token: Option<String>,
}

impl ApiClient {
    fn new(base: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("jobdex-client/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { http, base: Url::parse(base)?, token })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.base.join(path)?;
        Ok(self.request_url(method, url))
    }

    /// Request against `/api/documents/{docno}`, with `docno` sent as one encoded path segment.
    fn document_request(&self, method: Method, docno: &str) -> Result<RequestBuilder> {
        let mut url = self.base.join("/api/documents/")?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("base URL {} cannot carry a path", self.base))?
            .pop_if_empty()
            .push(docno);
        Ok(self.request_url(method, url))
    }

    fn request_url(&self, method: Method, url: Url) -> RequestBuilder {
        let mut req = self.http.request(method, url);
        if let Some(token) = &self.token {
            req = req.header("X-ADMIN-TOKEN", token);
        }
        req
    }

    async fn send(&self, req: RequestBuilder) -> Result<Value> {
        let resp: Response = req.send().await?;
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let msg = body["error"].as_str().map(str::to_string).unwrap_or_else(|| status.to_string());
            return Err(anyhow!("{status}: {msg}"));
        }
        Ok(body)
    }
}

fn render_results(results: &SearchResponse) -> String {
    if results.results.is_empty() {
        return "No results found.\n".to_string();
    }
    let mut out = format!(
        "\nFound {} results ({} total, {}, {:.3}s):\n\n",
        results.results.len(),
        results.total_hits,
        results.model,
        results.took_s
    );
    for (i, hit) in results.results.iter().enumerate() {
        out.push_str(&format!("{}. {} (Score: {:.4}) {}\n", i + 1, hit.doc_id, hit.score, hit.title));
        let place: Vec<&str> = [hit.company.as_deref(), hit.location.as_deref()].into_iter().flatten().collect();
        if !place.is_empty() {
            out.push_str(&format!("   {}\n", place.join(" · ")));
        }
        if let Some(snippet) = &hit.snippet {
            out.push_str(&format!("   {}\n", snippet.replace('\n', " ")));
        }
        out.push('\n');
    }
    out
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let api = ApiClient::new(&cli.url, cli.token.clone(), Duration::from_secs(cli.timeout_secs))?;
    tracing::debug!(url = %api.base, command = ?cli.command, "sending request");

    match cli.command {
        Command::Search { query, expansion, results, model } => {
            let body = json!({ "query": query, "use_expansion": expansion, "num_results": results, "model": model });
            let value = api.send(api.request(Method::POST, "/api/search")?.json(&body)).await?;
            let parsed: SearchResponse = serde_json::from_value(value)?;
            print!("{}", render_results(&parsed));
        }
        Command::Model { name } => {
            let value = api.send(api.request(Method::POST, "/api/set_model")?.json(&json!({ "model": name }))).await?;
            println!("Model set to {name}: {}", value["status"].as_str().unwrap_or("unknown"));
        }
        Command::Info => {
            let value = api.send(api.request(Method::GET, "/api/info")?).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Add { docno, text, title, replace } => {
            let body = json!({ "id": docno, "title": title, "body": text, "replace": replace });
            let value = api.send(api.request(Method::POST, "/api/documents")?.json(&body)).await?;
            println!("Document added: {}", value["status"].as_str().unwrap_or("unknown"));
        }
        Command::Remove { docno } => {
            let value = api.send(api.document_request(Method::DELETE, &docno)?).await?;
            println!("Document removed: {}", value["status"].as_str().unwrap_or("unknown"));
        }
        Command::Get { docno } => {
            let value = api.send(api.document_request(Method::GET, &docno)?).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Suggest { prefix, limit } => {
            let req = api.request(Method::GET, "/api/suggest")?.query(&[("query", prefix), ("limit", limit.to_string())]);
            let value = api.send(req).await?;
            for suggestion in value["results"].as_array().into_iter().flatten() {
                println!("{}", suggestion.as_str().unwrap_or_default());
            }
        }
        Command::Commit => {
            let value = api.send(api.request(Method::POST, "/api/index/commit")?).await?;
            println!("{}", serde_json::to_string_pretty(&value["meta"])?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_numbered_hits() {
        let body = json!({
            "query": "rust",
            "model": "BM25",
            "took_s": 0.0012,
            "total_hits": 7,
            "results": [
                {"doc_id": "j1", "score": 2.5, "title": "Rust Engineer", "company": "Acme", "location": "Berlin", "salary_range": null, "snippet": "<em>Rust</em>\nservices"},
                {"doc_id": "j2", "score": 1.25, "title": "Intern", "company": null, "location": null, "salary_range": null, "snippet": null}
            ]
        });
        let parsed: SearchResponse = serde_json::from_value(body).unwrap();
        let out = render_results(&parsed);
        assert!(out.contains("Found 2 results (7 total, BM25"));
        assert!(out.contains("1. j1 (Score: 2.5000) Rust Engineer"));
        assert!(out.contains("   Acme · Berlin"));
        assert!(out.contains("<em>Rust</em> services"));
        assert!(out.contains("2. j2 (Score: 1.2500) Intern"));
    }

    #[test]
    fn empty_results_say_so() {
        let parsed = SearchResponse { model: "BM25".into(), took_s: 0.0, total_hits: 0, results: vec![] };
        assert_eq!(render_results(&parsed), "No results found.\n");
    }

    #[test]
    fn admin_token_is_attached() {
        let api = ApiClient::new("http://localhost:8000", Some("t0k".into()), Duration::from_secs(1)).unwrap();
        let req = api.document_request(Method::DELETE, "j1").unwrap().build().unwrap();
        assert_eq!(req.url().as_str(), "http://localhost:8000/api/documents/j1");
        assert_eq!(req.headers()["X-ADMIN-TOKEN"], "t0k");
    }

    #[test]
    fn document_ids_are_one_encoded_segment() {
        let api = ApiClient::new("http://localhost:8000", None, Duration::from_secs(1)).unwrap();
        let req = api.document_request(Method::GET, "a/b?c#d%e f").unwrap().build().unwrap();
        assert_eq!(req.url().path(), "/api/documents/a%2Fb%3Fc%23d%25e%20f");
        assert_eq!(req.url().query(), None);
        assert_eq!(req.url().fragment(), None);
    }
}
