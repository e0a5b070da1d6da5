use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Read};
use tracing_subscriber::EnvFilter;

use vekta_rag::chunk::parse_chunk_line;
use vekta_rag::store::{has_artifacts, StoreOptions};
use vekta_rag::{Chunk, Context, HashingEmbedder, RetrievalPipeline, Settings, VectorStore};

#[derive(Parser)]
#[command(name = "vekta-rag")]
#[command(version = "0.1")]
#[command(about = "Build and query a document retrieval index", long_about = None)]
struct Cli {
    /// More log output (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from JSONL chunks on stdin and save it
    Build,
    /// Print the top matches for a question as JSON
    Query {
        /// Question text; read from stdin when omitted
        question: Option<String>,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Print the assembled context for a question
    Context {
        question: Option<String>,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// List stored records
    List,
    /// Print effective configuration
    Config,
}

fn new_store(settings: &Settings) -> Result<VectorStore<HashingEmbedder>> {
    let embedder = HashingEmbedder::new(settings.dimensions)?;
    Ok(VectorStore::new(embedder, StoreOptions::from(settings)))
}

fn open_store(settings: &Settings) -> Result<VectorStore<HashingEmbedder>> {
    let mut store = new_store(settings)?;
    store.load(&settings.persist_dir).with_context(|| {
        format!(
            "failed to load index from '{}'; run `vekta-rag build` first",
            settings.persist_dir.display()
        )
    })?;
    Ok(store)
}

fn read_question(question: Option<String>) -> Result<String> {
    let question = match question {
        Some(q) => q,
        None => {
            let mut input = String::new();
            io::stdin().read_to_string(&mut input)?;
            input
        }
    };
    let question = question.trim().to_string();
    if question.is_empty() {
        anyhow::bail!("question is empty");
    }
    Ok(question)
}

fn build_command(settings: &Settings) -> Result<()> {
    let stdin = io::stdin();
    let mut chunks: Vec<Chunk> = Vec::new();

    for (line_no, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let chunk =
            parse_chunk_line(&line).with_context(|| format!("invalid chunk on line {}", line_no + 1))?;
        chunks.push(chunk);
    }

    if has_artifacts(&settings.persist_dir) {
        tracing::warn!(
            dir = %settings.persist_dir.display(),
            "replacing existing index"
        );
    }

    let mut store = new_store(settings)?;
    store.build_from_documents(chunks)?;
    store.save(&settings.persist_dir)?;
    eprintln!(
        "Indexed {} chunks into '{}'",
        store.len(),
        settings.persist_dir.display()
    );
    Ok(())
}

fn query_command(settings: &Settings, question: Option<String>, top_k: Option<usize>) -> Result<()> {
    let question = read_question(question)?;
    let top_k = top_k.unwrap_or(settings.top_k);
    let store = open_store(settings)?;
    let results = store.query(&question, top_k)?;

    let output = serde_json::json!({
        "query": question,
        "record_count": store.len(),
        "results": results.iter().map(|r| {
            serde_json::json!({
                "slot": r.slot,
                "score": r.score,
                "id": r.metadata.id,
                "text": r.metadata.text,
                "source": r.metadata.source,
            })
        }).collect::<Vec<_>>(),
        "actual_results_count": results.len(),
        "requested_results_count": top_k,
    });

    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn context_command(
    settings: &Settings,
    question: Option<String>,
    top_k: Option<usize>,
) -> Result<()> {
    let question = read_question(question)?;
    let top_k = top_k.unwrap_or(settings.top_k);
    let pipeline = RetrievalPipeline::new(std::sync::Arc::new(open_store(settings)?));

    match pipeline.retrieve_context(&question, top_k)? {
        Context::Found(text) => println!("{}", text),
        Context::Empty => println!("{}", vekta_rag::rag::NO_RELEVANT_DOCUMENTS),
    }
    Ok(())
}

fn list_command(settings: &Settings) -> Result<()> {
    let store = open_store(settings)?;
    for (slot, record) in store.records().iter().enumerate() {
        let id = record.id.clone().unwrap_or_else(|| slot.to_string());
        println!("{}\t{}", id, record.preview(60));
    }
    Ok(())
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose, args.quiet);
    let settings = Settings::load()?;

    match args.command {
        Commands::Build => build_command(&settings)?,
        Commands::Query { question, top_k } => query_command(&settings, question, top_k)?,
        Commands::Context { question, top_k } => context_command(&settings, question, top_k)?,
        Commands::List => list_command(&settings)?,
        Commands::Config => settings.print_config(),
    }
    Ok(())
}
