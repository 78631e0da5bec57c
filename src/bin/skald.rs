//! Command-line shell over an index directory

use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

use skald::segment::Document;
use skald::{Index, IndexConfig, Result, Searcher, ScoringMode, SkaldError};

#[derive(Parser)]
#[command(name = "skald", version, about = "Full-text search over immutable segments")]
struct Cli {
    /// Index directory
    #[arg(short, long, default_value = ".skald")]
    dir: PathBuf,

    /// Scoring formula: bm25 or tfidf
    #[arg(long, default_value = "bm25")]
    scoring: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index documents from a JSON-lines file: {"id": "...", "fields": {...}}
    Index {
        file: PathBuf,
        /// Flush after this many documents
        #[arg(long, default_value_t = 1000)]
        flush_threshold: usize,
    },
    /// Run a query and print hits
    Search {
        query: String,
        /// Maximum number of hits to print
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Show segment statistics
    Stats,
    /// Merge all segments into one
    Merge,
}

fn scoring_mode(name: &str) -> Result<ScoringMode> {
    match name {
        "bm25" => Ok(ScoringMode::Bm25),
        "tfidf" => Ok(ScoringMode::TfIdf),
        other => Err(SkaldError::InvalidArgument(format!(
            "unknown scoring mode: {other}"
        ))),
    }
}

fn run(cli: Cli) -> Result<()> {
    let scoring = scoring_mode(&cli.scoring)?;

    match cli.command {
        Command::Index {
            file,
            flush_threshold,
        } => {
            let config = IndexConfig::new(&cli.dir)
                .with_flush_threshold(flush_threshold)
                .with_scoring(scoring);
            let idx = Index::open(config)?;

            let reader = BufReader::new(std::fs::File::open(&file)?);
            let mut count = 0usize;
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let value: Value = serde_json::from_str(&line)?;
                let id = value
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        SkaldError::InvalidArgument("line is missing \"id\"".to_string())
                    })?
                    .to_string();
                let fields: Document = match value.get("fields") {
                    Some(Value::Object(map)) => map.clone(),
                    _ => {
                        return Err(SkaldError::InvalidArgument(
                            "line is missing \"fields\" object".to_string(),
                        ))
                    }
                };
                idx.index(&id, fields)?;
                count += 1;
            }
            idx.flush()?;

            println!("indexed {count} documents into {}", cli.dir.display());
        }
        Command::Search { query, limit } => {
            let config = IndexConfig::new(&cli.dir).with_scoring(scoring);
            let idx = Index::open(config)?;

            let snapshot = idx.snapshot()?;
            let searcher = Searcher::new(&snapshot);
            let hits = searcher.query(&query)?;

            println!("{} hits", hits.len());
            for hit in hits.iter().take(limit) {
                println!("{:>10.4}  {}", hit.score, hit.doc_id);
            }
        }
        Command::Stats => {
            let idx = Index::open(IndexConfig::new(&cli.dir))?;
            let infos = idx.segments();
            println!("{} segments", infos.len());
            for info in infos {
                let stats = idx.segment_stats(&info.id)?;
                println!(
                    "  {}  docs={} deleted={} fields={}",
                    info.id,
                    stats.num_docs,
                    stats.num_deleted,
                    stats.fields.join(",")
                );
            }
        }
        Command::Merge => {
            let idx = Index::open(IndexConfig::new(&cli.dir))?;
            let before = idx.num_segments();
            idx.force_merge()?;
            println!("merged {before} segments into {}", idx.num_segments());
        }
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
