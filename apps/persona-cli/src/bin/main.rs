use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use persona_cli::loader::{collect_outputs, load_corpus, read_index, write_index};
use persona_core::config::{resolve_with_base, Config, PersonaConfig};
use persona_core::types::PersonaRetrievalContext;
use persona_core::ChunkProcessor;
use persona_engine::PersonaEmbeddingEngine;

#[derive(Parser)]
#[command(name = "persona-cli", about = "Build persona fingerprints, retrieve persona context and check drift")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk the corpus and print chunk statistics.
    Stats {
        #[arg(long)]
        corpus: Option<String>,
    },
    /// Chunk and embed the corpus, then write the embedding index.
    Index {
        #[arg(long)]
        corpus: Option<String>,
        #[arg(long)]
        out: Option<String>,
    },
    /// Retrieve the persona chunks closest to a structured context.
    Query {
        #[arg(long)]
        index: Option<String>,
        #[arg(long)]
        archetype: Option<String>,
        #[arg(long)]
        emotional_state: Option<String>,
        #[arg(long)]
        coaching_move: Option<String>,
        #[arg(long)]
        session_stage: Option<String>,
        #[arg(long)]
        message: Option<String>,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Check one candidate output for persona drift.
    Drift {
        #[arg(long)]
        index: Option<String>,
        text: String,
    },
    /// Check every .txt file under a directory and print aggregate statistics.
    DriftBatch {
        #[arg(long)]
        index: Option<String>,
        #[arg(long)]
        dir: PathBuf,
    },
}

struct Paths {
    base: PathBuf,
    corpus_dir: String,
    index_path: String,
}

impl Paths {
    fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            base: env::current_dir()?,
            corpus_dir: config.get("data.corpus_dir").unwrap_or_else(|_| "data/persona".to_string()),
            index_path: config.get("data.index_path").unwrap_or_else(|_| "data/persona_index.json".to_string()),
        })
    }

    fn corpus(&self, arg: Option<String>) -> PathBuf {
        resolve_with_base(&self.base, arg.unwrap_or_else(|| self.corpus_dir.clone()))
    }

    fn index(&self, arg: Option<String>) -> PathBuf {
        resolve_with_base(&self.base, arg.unwrap_or_else(|| self.index_path.clone()))
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()));
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn load_engine(persona: PersonaConfig, index_path: &Path) -> Result<PersonaEmbeddingEngine> {
    let engine = PersonaEmbeddingEngine::from_config(persona)?;
    engine.import_index(read_index(index_path)?)?;
    Ok(engine)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {e}"); e })?;
    let persona = config.persona()?;
    let paths = Paths::from_config(&config)?;

    match cli.command {
        Command::Stats { corpus } => {
            let dir = paths.corpus(corpus);
            let chunks = ChunkProcessor::with_max_tokens(persona.chunk_size).process_all(&load_corpus(&dir)?);
            let stats = ChunkProcessor::chunk_stats(&chunks);
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Index { corpus, out } => {
            let dir = paths.corpus(corpus);
            let out = paths.index(out);
            let raw = load_corpus(&dir)?;
            let engine = PersonaEmbeddingEngine::from_config(persona)?;
            let pb = spinner(&format!("Embedding persona corpus from {}", dir.display()));
            let result = engine.initialize(&raw);
            pb.finish_and_clear();
            result?;
            let index = engine.export_index()?;
            write_index(&out, &index)?;
            println!("✅ Indexed {} chunks into {}", index.entries.len(), out.display());
        }
        Command::Query { index, archetype, emotional_state, coaching_move, session_stage, message, top_k } => {
            let engine = load_engine(persona, &paths.index(index))?;
            let context = PersonaRetrievalContext {
                archetype,
                emotional_state,
                coaching_move,
                session_stage,
                user_message: message,
                top_k,
            };
            for (rank, hit) in engine.retrieve_for_context(&context)?.iter().enumerate() {
                println!("{}. [{:.3}] {} ({})", rank + 1, hit.similarity, hit.chunk.id, hit.reason.as_deref().unwrap_or(""));
                println!("   {}", hit.chunk.text.replace('\n', "\n   "));
            }
        }
        Command::Drift { index, text } => {
            let engine = load_engine(persona, &paths.index(index))?;
            println!("{}", serde_json::to_string_pretty(&engine.check_drift(&text)?)?);
        }
        Command::DriftBatch { index, dir } => {
            let engine = load_engine(persona, &paths.index(index))?;
            let files = collect_outputs(&dir)?;
            let (names, outputs): (Vec<PathBuf>, Vec<String>) = files.into_iter().unzip();
            let report = engine.check_drift_batch(&outputs)?;
            for (name, result) in names.iter().zip(&report.results) {
                let flag = if result.has_drift { "DRIFT" } else { "ok" };
                println!("{flag:>5} {:.3} {}", result.similarity, name.display());
            }
            println!("{}", serde_json::to_string_pretty(&report.stats)?);
        }
    }
    Ok(())
}
