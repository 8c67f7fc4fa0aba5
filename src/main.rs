//! ragstation - Main CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use ragstation::{
    cli::{Args, Commands, Verbosity},
    config::Config,
    embedding,
    generation::OllamaGenerator,
    rag::{read_transcript, AskConfig, AskPipeline, RetrievalContext, RetrievedBlock, Retriever},
    sink::{PromptArchive, ResultSink},
    store::IndexStore,
    telemetry::{Stage, StageTimings},
    Chunker, Indexer,
};

/// Characters of block text shown per hit
const SNIPPET_CHARS: usize = 150;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbosity());

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;

    match &args.command {
        Commands::Build { .. } => run_build(&args, &config).await?,
        Commands::Search { query, no_save } => {
            run_search(&args, &config, query.as_deref(), *no_save).await?
        }
        Commands::Ask { query } => run_ask(&args, &config, query.as_deref()).await?,
        Commands::Config => show_config(&args, &config)?,
    }

    Ok(())
}

fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run_build(args: &Args, config: &Config) -> Result<()> {
    let verbosity = args.verbosity();
    let mut timings = StageTimings::new();

    let corpus_root = Config::expand_path(&config.corpus.root);
    let store = IndexStore::new(Config::expand_path(&config.store.root));

    if verbosity.show_progress() {
        println!("{} {}", "📄 Corpus:".bold(), corpus_root.display());
    }

    let embedder = timings
        .time(Stage::ModelLoad, || embedding::from_config(&config.embedder))
        .context("Failed to initialize embedder")?;

    let chunker = Chunker::new(config.chunker())?;
    let indexer = Indexer::new(chunker, embedder, store)
        .with_batch_size(config.embedder.batch_size)
        .with_embed_timeout(Duration::from_secs(config.embedder.timeout_secs))
        .with_progress(verbosity.show_progress());

    let report = indexer
        .build(&corpus_root, &mut timings)
        .await
        .with_context(|| format!("Build failed for {}", corpus_root.display()))?;

    println!(
        "{} {} blocks from {} files ({} skipped), {}-d, embedder {}",
        "✅ Index built:".green().bold(),
        report.blocks,
        report.source_files(),
        report.chunks.files_skipped(),
        report.dimension,
        report.embedder
    );
    println!("   Snapshot: {}", report.snapshot_path.display());
    for skipped in report.chunks.skipped() {
        println!("   {} {:?}", "⚠️  skipped".yellow(), skipped);
    }

    if verbosity.show_timings() {
        timings.display_summary();
    }
    Ok(())
}

/// Load the snapshot and embedder into a retriever
fn open_retriever(config: &Config, timings: &mut StageTimings) -> Result<Retriever> {
    let store = IndexStore::new(Config::expand_path(&config.store.root));

    let snapshot = timings
        .time(Stage::SnapshotLoad, || store.load())
        .with_context(|| {
            format!(
                "No usable index at {} (run `ragstation build`)",
                store.root().display()
            )
        })?;

    let embedder = timings
        .time(Stage::ModelLoad, || embedding::from_config(&config.embedder))
        .context("Failed to initialize embedder")?;

    tracing::info!(
        blocks = snapshot.len(),
        generation = snapshot.generation,
        "snapshot loaded"
    );

    Ok(Retriever::new(RetrievalContext::new(
        snapshot,
        embedder,
        Duration::from_secs(config.embedder.timeout_secs),
    )))
}

async fn run_search(args: &Args, config: &Config, query: Option<&str>, no_save: bool) -> Result<()> {
    let mut timings = StageTimings::new();
    let retriever = open_retriever(config, &mut timings)?;
    let sink = ResultSink::new(Config::expand_path(&config.output.results_dir));
    let top_k = config.retrieval.top_k;

    match query {
        Some(query) => {
            search_once(&retriever, &sink, query, top_k, no_save, &mut timings).await?;
        }
        None => {
            let mut editor = DefaultEditor::new()?;
            loop {
                match editor.readline("\n🔎 Query (or 'exit'): ") {
                    Ok(line) => {
                        let line = line.trim();
                        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
                            break;
                        }
                        if line.is_empty() {
                            continue;
                        }
                        let _ = editor.add_history_entry(line);
                        if let Err(e) =
                            search_once(&retriever, &sink, line, top_k, no_save, &mut timings).await
                        {
                            eprintln!("{} {:#}", "❌".red(), e);
                        }
                    }
                    Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                    Err(e) => return Err(e.into()),
                }
            }
            println!("👋 Bye.");
        }
    }

    if args.verbosity().show_timings() {
        timings.display_summary();
    }
    Ok(())
}

async fn search_once(
    retriever: &Retriever,
    sink: &ResultSink,
    query: &str,
    top_k: usize,
    no_save: bool,
    timings: &mut StageTimings,
) -> Result<()> {
    let start = Instant::now();
    let outcome = retriever.retrieve(query, top_k).await?;
    timings.record(Stage::EmbedAndSearch, start.elapsed());

    println!("\n📊 Cosine similarity to: '{}'\n", query);
    if outcome.is_empty() {
        println!("   (no results)");
    }
    for hit in &outcome.blocks {
        print_hit(hit);
    }
    if outcome.stale_skipped > 0 {
        println!(
            "{} {} hits referred to missing blocks and were skipped",
            "⚠️".yellow(),
            outcome.stale_skipped
        );
    }

    if !no_save {
        let dir = timings.time(Stage::Persist, || sink.persist(query, &outcome.blocks))?;
        println!("✅ {} hits saved in {}", outcome.len(), dir.display());
    }
    Ok(())
}

fn print_hit(hit: &RetrievedBlock<'_>) {
    let snippet: String = hit
        .block
        .text
        .chars()
        .take(SNIPPET_CHARS)
        .collect::<String>()
        .replace('\n', " ");

    println!(
        "{:02}. {} - {}",
        hit.rank,
        format!("{:.4}", hit.score).cyan(),
        hit.block.source_basename()
    );
    println!("    ➤ {}...\n", snippet.dimmed());
}

async fn run_ask(args: &Args, config: &Config, query: Option<&str>) -> Result<()> {
    let mut timings = StageTimings::new();

    let query = match query {
        Some(q) => q.trim().to_string(),
        None => {
            let path = Config::expand_path(&config.output.transcript_file);
            read_transcript(&path)
                .with_context(|| format!("Failed to read transcript {}", path.display()))?
        }
    };

    let retriever = open_retriever(config, &mut timings)?;
    let generator = OllamaGenerator::with_config(
        &config.ollama_url(),
        &config.generator.model,
        config.generator.timeout_secs,
    )?;
    if !generator.health_check().await? {
        anyhow::bail!(
            "Ollama is not reachable at {} (start it with: ollama serve)",
            config.ollama_url()
        );
    }

    let pipeline = AskPipeline::new(
        retriever,
        Arc::new(generator),
        PromptArchive::new(Config::expand_path(&config.output.prompts_dir)),
        AskConfig {
            top_k: config.retrieval.top_k,
            language: config.retrieval.language,
            instructions: config.retrieval.instructions(),
            generate_timeout: Duration::from_secs(config.generator.timeout_secs),
            answer_file: Some(Config::expand_path(&config.output.answer_file)),
            recording_file: config
                .output
                .recording_file
                .as_deref()
                .map(Config::expand_path),
        },
    );

    let outcome = pipeline.ask(&query, &mut timings).await?;

    println!("{}\n", outcome.answer);
    if args.verbosity().show_progress() {
        println!(
            "{} {} ({} blocks)",
            "✅ Prompt, blocks and answer saved in".green(),
            outcome.archive_dir.display(),
            outcome.blocks_used
        );
    }
    if args.verbosity().show_timings() {
        timings.display_summary();
    }
    Ok(())
}

fn show_config(args: &Args, config: &Config) -> Result<()> {
    println!("{}", "ragstation configuration".bold());
    match (&args.config, Config::default_path()) {
        (Some(path), _) => println!("  Source: {}", path.display()),
        (None, Some(path)) if path.exists() => println!("  Source: {}", path.display()),
        _ => println!("  Source: built-in defaults"),
    }
    println!("  Verbosity: {}", args.verbosity().as_str());
    println!();

    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{}", rendered);
    Ok(())
}
