use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stackrank_core::{Bm25Ranker, IndexMeta, IndexReport, IndexStore, Indexer, QuestionRecord, RankerConfig, SledStore};
use tracing_subscriber::{EnvFilter, fmt};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Ingest question/answer dumps and build the search index", long_about = None)]
struct Cli {
    /// Store directory
    #[arg(long, default_value = "./stackrank.db", global = true)]
    db: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store and index questions from JSON/JSONL files or a directory of them
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
    },
    /// Re-index every stored question and answer from scratch
    Rebuild,
    /// Print corpus statistics
    Stats,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let store = SledStore::open(&cli.db)?;

    match cli.command {
        Commands::Build { input } => {
            let report = build_index(&store, Path::new(&input))?;
            finish(&store, &report)
        }
        Commands::Rebuild => {
            let report = Indexer::new(store.clone()).reindex_all()?;
            finish(&store, &report)
        }
        Commands::Stats => {
            let meta = store.load_meta()?;
            let mut ranker = Bm25Ranker::new(store.clone(), RankerConfig::default());
            let stats = ranker.corpus_stats()?;
            let out = serde_json::json!({
                "questions": store.question_count()?,
                "total_documents": stats.total_docs,
                "avg_document_length": stats.avg_doc_length,
                "indexed_at": meta.map(|m| m.indexed_at),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
    }
}

fn finish(store: &SledStore, report: &IndexReport) -> Result<()> {
    let meta = IndexMeta {
        indexed_at: time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_else(|_| "".into()),
        version: 1,
    };
    store.save_meta(&meta)?;
    store.flush()?;
    tracing::info!(indexed = report.indexed, answers = report.answers, failed = report.failed.len(), "index build complete");
    for failure in &report.failed {
        eprintln!("failed question {}: {}", failure.question_id, failure.error);
    }
    Ok(())
}

fn build_index(store: &SledStore, input: &Path) -> Result<IndexReport> {
    let files = input_files(input);
    tracing::info!(files = files.len(), "reading input");
    let indexer = Indexer::new(store.clone());
    let mut report = IndexReport::default();
    for file in files {
        let records = read_records(&file)?;
        let part = indexer.index_batch(records);
        report.indexed += part.indexed;
        report.answers += part.answers;
        report.failed.extend(part.failed);
    }
    Ok(report)
}

fn input_files(input: &Path) -> Vec<PathBuf> {
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

/// Parse a JSON array/object or a JSONL file. Malformed JSONL lines are
/// logged and skipped so one bad row does not sink the file.
fn read_records(file: &Path) -> Result<Vec<QuestionRecord>> {
    let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let reader = BufReader::new(f);
    if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let mut out = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() { continue; }
            match serde_json::from_str::<QuestionRecord>(&line) {
                Ok(rec) => out.push(rec),
                Err(err) => tracing::warn!(file = %file.display(), line = n + 1, %err, "skipping malformed record"),
            }
        }
        return Ok(out);
    }
    let json: serde_json::Value = serde_json::from_reader(reader).with_context(|| format!("parsing {}", file.display()))?;
    let records: Vec<QuestionRecord> = match json {
        serde_json::Value::Array(arr) => arr.into_iter().map(serde_json::from_value::<QuestionRecord>).collect::<Result<Vec<_>, _>>()?,
        // Stack Exchange API pages wrap questions in "items"
        serde_json::Value::Object(mut obj) => match obj.remove("items") {
            Some(items) => serde_json::from_value(items)?,
            None => vec![serde_json::from_value(serde_json::Value::Object(obj))?],
        },
        _ => Vec::new(),
    };
    Ok(records)
}
