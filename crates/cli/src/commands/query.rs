//! Query command handler.
//!
//! Builds a throwaway knowledge base from inline texts and files, then ranks
//! its documents against the query.

use clap::Args;
use recall_core::{config::AppConfig, AppError, AppResult};
use recall_knowledge::{build_registry, DocumentId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Rank documents by similarity to a query
#[derive(Args, Debug)]
pub struct QueryCommand {
    /// Query text
    pub query: String,

    /// Inline document text (repeatable)
    #[arg(long)]
    pub text: Vec<String>,

    /// File or directory to read documents from (repeatable)
    #[arg(long)]
    pub path: Vec<PathBuf>,

    /// Number of documents to return (default: config top_n)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// A document to load, with a label saying where it came from.
#[derive(Debug, Clone, PartialEq)]
struct SourceDocument {
    source: String,
    text: String,
}

impl QueryCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing query command");

        let documents = self.collect_sources()?;
        if documents.is_empty() {
            return Err(AppError::Other(
                "No documents to search; pass --text or --path".to_string(),
            ));
        }

        let registry = build_registry(config).await?;
        let kb = registry.create_knowledge_base("query").await?;

        let mut sources: HashMap<DocumentId, String> = HashMap::with_capacity(documents.len());
        for document in documents {
            let id = registry.add_document(kb, &document.text).await?;
            sources.insert(id, document.source);
        }

        let top_n = self.top_k.unwrap_or(config.top_n);
        let results = registry.query_similar(kb, &self.query, top_n).await?;
        tracing::debug!("Query returned {} of {} documents", results.len(), sources.len());

        if self.json {
            let output: Vec<serde_json::Value> = results
                .iter()
                .map(|result| {
                    serde_json::json!({
                        "id": result.id,
                        "source": sources.get(&result.id),
                        "score": result.score,
                        "text": result.text,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else if results.is_empty() {
            println!("No similar documents");
        } else {
            for (rank, result) in results.iter().enumerate() {
                let source = sources.get(&result.id).map(String::as_str).unwrap_or("?");
                println!("{}. [{:.3}] {}", rank + 1, result.score, source);
                println!("   {}", snippet(&result.text, 120));
            }
        }

        Ok(())
    }

    fn collect_sources(&self) -> AppResult<Vec<SourceDocument>> {
        let mut documents: Vec<SourceDocument> = self
            .text
            .iter()
            .enumerate()
            .map(|(i, text)| SourceDocument {
                source: format!("text #{}", i + 1),
                text: text.clone(),
            })
            .collect();

        for path in &self.path {
            documents.extend(read_path(path)?);
        }

        Ok(documents)
    }
}

/// Read every non-empty UTF-8 file under `path`, in a stable order.
fn read_path(path: &Path) -> AppResult<Vec<SourceDocument>> {
    if !path.exists() {
        return Err(AppError::Config(format!("Path does not exist: {:?}", path)));
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|e| AppError::Other(format!("Failed to walk {:?}: {}", path, e)))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let text = match std::fs::read_to_string(entry.path()) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Skipping unreadable file {:?}: {}", entry.path(), e);
                continue;
            }
        };

        if text.trim().is_empty() {
            tracing::debug!("Skipping empty file {:?}", entry.path());
            continue;
        }

        documents.push(SourceDocument {
            source: entry.path().display().to_string(),
            text,
        });
    }

    Ok(documents)
}

/// First line of `text`, cut to at most `max_chars` characters.
fn snippet(text: &str, max_chars: usize) -> String {
    let line = text.lines().find(|line| !line.trim().is_empty()).unwrap_or("");
    let mut snippet: String = line.trim().chars().take(max_chars).collect();
    if line.trim().chars().count() > max_chars {
        snippet.push_str("...");
    }
    snippet
}
