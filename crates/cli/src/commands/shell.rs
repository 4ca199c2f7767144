//! Shell command handler.
//!
//! Reads one command per line from stdin or a script file and runs it
//! against an in-memory registry. Failed commands print a message and the
//! session continues.

use clap::Args;
use recall_core::{config::AppConfig, AppResult};
use recall_knowledge::{build_registry, DocumentId, KnowledgeError, KnowledgeRegistry};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

const HELP: &str = "\
Commands:
  create <name>            create an empty knowledge base
  list                     list knowledge bases
  show <kb>                show the documents of a knowledge base
  add <kb> <text>          add a document
  remove <kb> <doc-id>     remove a document
  query <kb> <k> <text>    find the k documents most similar to text
  cache <kb>               show index cache statistics
  help                     show this help
  quit                     end the session
Knowledge bases may be named by id or by name.";

/// Interactive knowledge base session
#[derive(Args, Debug)]
pub struct ShellCommand {
    /// Read commands from a file instead of stdin
    #[arg(long)]
    pub script: Option<PathBuf>,
}

impl ShellCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing shell command");

        let registry = build_registry(config).await?;
        let stdout = std::io::stdout();

        match &self.script {
            Some(path) => {
                let file = std::fs::File::open(path)?;
                run_session(&registry, BufReader::new(file), stdout.lock(), false).await
            }
            None => {
                let stdin = std::io::stdin();
                run_session(&registry, stdin.lock(), stdout.lock(), true).await
            }
        }
    }
}

/// One parsed shell line.
#[derive(Debug, Clone, PartialEq)]
enum ShellInput {
    Create(String),
    List,
    Show(String),
    Add { kb: String, text: String },
    Remove { kb: String, document: String },
    Query { kb: String, k: usize, text: String },
    Cache(String),
    Help,
    Quit,
    Blank,
}

fn parse_line(line: &str) -> Result<ShellInput, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(ShellInput::Blank);
    }

    let (command, rest) = split_word(line);
    let input = match command {
        "create" => ShellInput::Create(required(rest, "create <name>")?.to_string()),
        "list" => ShellInput::List,
        "show" => ShellInput::Show(required(rest, "show <kb>")?.to_string()),
        "add" => {
            let (kb, text) = split_word(required(rest, "add <kb> <text>")?);
            ShellInput::Add {
                kb: kb.to_string(),
                text: required(text, "add <kb> <text>")?.to_string(),
            }
        }
        "remove" => {
            let (kb, document) = split_word(required(rest, "remove <kb> <doc-id>")?);
            ShellInput::Remove {
                kb: kb.to_string(),
                document: required(document, "remove <kb> <doc-id>")?.to_string(),
            }
        }
        "query" => {
            const USAGE: &str = "query <kb> <k> <text>";
            let (kb, rest) = split_word(required(rest, USAGE)?);
            let (k, text) = split_word(required(rest, USAGE)?);
            let k = k
                .parse()
                .map_err(|_| format!("k must be a non-negative integer, got '{}'", k))?;
            ShellInput::Query {
                kb: kb.to_string(),
                k,
                text: required(text, USAGE)?.to_string(),
            }
        }
        "cache" => ShellInput::Cache(required(rest, "cache <kb>")?.to_string()),
        "help" => ShellInput::Help,
        "quit" | "exit" => ShellInput::Quit,
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };

    Ok(input)
}

fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(at) => (&input[..at], input[at..].trim()),
        None => (input, ""),
    }
}

fn required<'a>(value: &'a str, usage: &str) -> Result<&'a str, String> {
    if value.is_empty() {
        Err(format!("usage: {}", usage))
    } else {
        Ok(value)
    }
}

/// Message shown to the user for a failed knowledge operation.
fn describe(err: &KnowledgeError) -> String {
    match err {
        KnowledgeError::KnowledgeBaseNotFound(_) => "knowledge base not found".to_string(),
        KnowledgeError::DocumentNotFound { .. } => "document not found".to_string(),
        KnowledgeError::IndexUnavailable { .. } => {
            "cannot build index for empty knowledge base".to_string()
        }
        KnowledgeError::DuplicateDocument { .. } => {
            "document id already used with different text".to_string()
        }
        other => other.to_string(),
    }
}

/// Run commands from `input` until it ends or `quit` is read.
async fn run_session<R: BufRead, W: Write>(
    registry: &KnowledgeRegistry,
    input: R,
    mut output: W,
    interactive: bool,
) -> AppResult<()> {
    if interactive {
        writeln!(output, "recall shell, type 'help' for commands")?;
    }

    for (number, line) in input.lines().enumerate() {
        let line = line?;

        let command = match parse_line(&line) {
            Ok(ShellInput::Blank) => continue,
            Ok(ShellInput::Quit) => break,
            Ok(command) => command,
            Err(message) => {
                writeln!(output, "error: {}", message)?;
                continue;
            }
        };

        tracing::debug!("Shell line {}: {:?}", number + 1, command);
        if let Err(message) = run_command(registry, command, &mut output).await? {
            writeln!(output, "error: {}", message)?;
        }
        output.flush()?;
    }

    Ok(())
}

/// Execute one command. The outer result carries I/O failures, the inner one
/// user-facing failures.
async fn run_command<W: Write>(
    registry: &KnowledgeRegistry,
    command: ShellInput,
    output: &mut W,
) -> AppResult<Result<(), String>> {
    match command {
        ShellInput::Create(name) => match registry.create_knowledge_base(&name).await {
            Ok(id) => writeln!(output, "created {} ({})", name, id)?,
            Err(err) => return Ok(Err(describe(&err))),
        },

        ShellInput::List => {
            let summaries = registry.list().await;
            if summaries.is_empty() {
                writeln!(output, "no knowledge bases")?;
            }
            for summary in summaries {
                writeln!(
                    output,
                    "{} {} documents={} cached_indexes={}",
                    summary.id, summary.name, summary.documents_count, summary.cached_indexes
                )?;
            }
        }

        ShellInput::Show(key) => {
            let Some(id) = registry.resolve(&key).await else {
                return Ok(Err(format!("knowledge base '{}' not found", key)));
            };
            let kb = match registry.knowledge_base(id).await {
                Ok(kb) => kb,
                Err(err) => return Ok(Err(describe(&err))),
            };

            let mut documents: Vec<_> = kb.documents().collect();
            documents.sort_by(|a, b| a.text().cmp(b.text()).then(a.id().cmp(&b.id())));

            writeln!(output, "{} ({}) documents={}", kb.name(), kb.id(), kb.len())?;
            for document in documents {
                writeln!(output, "  {} {}", document.id(), document.text())?;
            }
        }

        ShellInput::Add { kb, text } => {
            let Some(id) = registry.resolve(&kb).await else {
                return Ok(Err(format!("knowledge base '{}' not found", kb)));
            };
            match registry.add_document(id, &text).await {
                Ok(document) => writeln!(output, "added {}", document)?,
                Err(err) => return Ok(Err(describe(&err))),
            }
        }

        ShellInput::Remove { kb, document } => {
            let Some(id) = registry.resolve(&kb).await else {
                return Ok(Err(format!("knowledge base '{}' not found", kb)));
            };
            let Ok(document_id) = document.parse::<DocumentId>() else {
                return Ok(Err(format!("invalid document id '{}'", document)));
            };
            match registry.remove_document(id, document_id).await {
                Ok(()) => writeln!(output, "removed {}", document_id)?,
                Err(err) => return Ok(Err(describe(&err))),
            }
        }

        ShellInput::Query { kb, k, text } => {
            let Some(id) = registry.resolve(&kb).await else {
                return Ok(Err(format!("knowledge base '{}' not found", kb)));
            };
            let results = match registry.query_similar(id, &text, k).await {
                Ok(results) => results,
                Err(err) => return Ok(Err(describe(&err))),
            };

            if results.is_empty() {
                writeln!(output, "no results")?;
            }
            for (rank, result) in results.iter().enumerate() {
                writeln!(
                    output,
                    "{}. [{:.3}] {} {}",
                    rank + 1,
                    result.score,
                    result.id,
                    result.text
                )?;
            }
        }

        ShellInput::Cache(key) => {
            let Some(id) = registry.resolve(&key).await else {
                return Ok(Err(format!("knowledge base '{}' not found", key)));
            };
            let stats = match registry.cache_stats(id).await {
                Ok(stats) => stats,
                Err(err) => return Ok(Err(describe(&err))),
            };
            writeln!(
                output,
                "entries={}/{} hits={} misses={} builds={} incremental_updates={} evictions={}",
                stats.entries,
                stats.capacity,
                stats.hits,
                stats.misses,
                stats.builds,
                stats.incremental_updates,
                stats.evictions
            )?;
        }

        ShellInput::Help => writeln!(output, "{}", HELP)?,

        ShellInput::Quit | ShellInput::Blank => {}
    }

    Ok(Ok(()))
}
