//! specsum: construction-specification materials summarizer.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use specsum_core::{ChunkingConfig, SpecSumConfig};
use specsum_ingest::{locate_sections, ChunkSplitter, SpecDocument};
use specsum_server::{build_router, state, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn resolve_data_dir() -> PathBuf {
    std::env::var("SPECSUM_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));
            if let Some(dir) = exe_dir {
                let parent_data = dir.join("../data");
                if parent_data.exists() {
                    return parent_data;
                }
            }
            PathBuf::from("data")
        })
}

fn print_help() {
    println!("specsum: construction specification materials summarizer");
    println!();
    println!("Usage: specsum [command]");
    println!();
    println!("Commands:");
    println!("  (none)                         Start the server");
    println!("  chunks <file> [max] [overlap]  Print chunk boundaries for a text file");
    println!("  sections <pdf> [keyword]       Print keyword sections found in a PDF");
    println!("  help                           Show this help message");
}

/// `specsum chunks <file> [max] [overlap]`
fn print_chunks(args: &[String]) -> anyhow::Result<()> {
    let path = args
        .first()
        .context("Usage: specsum chunks <file> [max] [overlap]")?;
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;

    let defaults = ChunkingConfig::default();
    let max = match args.get(1) {
        Some(raw) => raw.parse::<usize>().context("max must be a number")?,
        None => defaults.max_chunk_chars,
    };
    let overlap = match args.get(2) {
        Some(raw) => raw.parse::<usize>().context("overlap must be a number")?,
        None => defaults.overlap_chars,
    };

    let splitter = ChunkSplitter::new(ChunkingConfig::new(max, overlap)?)?;
    let chunks = splitter.split(&text);
    println!("{} chars -> {} chunk(s)", text.chars().count(), chunks.len());
    for chunk in &chunks {
        println!(
            "  #{}/{}  [{}..{})  {} chars",
            chunk.index,
            chunk.total,
            chunk.start_char,
            chunk.end_char,
            chunk.char_len()
        );
    }
    Ok(())
}

/// `specsum sections <pdf> [keyword]`
fn print_sections(args: &[String], config: &SpecSumConfig) -> anyhow::Result<()> {
    let path = args
        .first()
        .context("Usage: specsum sections <pdf> [keyword]")?;
    let keyword = args
        .get(1)
        .cloned()
        .unwrap_or_else(|| config.source.keyword.clone());

    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path))?;
    let document = SpecDocument::parse(&bytes)?;
    let located = locate_sections(&document, &keyword, config.source.footer_fraction)?;

    println!(
        "{}: {} pages, {} matching",
        path,
        document.page_count(),
        located.relevant_pages.len()
    );
    for section in &located.sections {
        println!("  {}", section.display_title());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let data_dir = resolve_data_dir();

    // Handle CLI subcommands
    if args.len() > 1 {
        match args[1].as_str() {
            "chunks" => return print_chunks(&args[2..]),
            "sections" => {
                let config = SpecSumConfig::from_env(&data_dir)?;
                return print_sections(&args[2..], &config);
            }
            "--help" | "-h" | "help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'specsum help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    info!("Data directory: {}", data_dir.display());

    let config = SpecSumConfig::from_env(&data_dir)?;
    let port = config.port;
    info!(
        "Chunking: max={} overlap={} lookback={}, concurrency={}, timeout={}s",
        config.chunking.max_chunk_chars,
        config.chunking.overlap_chars,
        config.chunking.lookback_chars,
        config.pipeline.max_concurrent_requests,
        config.pipeline.request_timeout_secs
    );

    let state = Arc::new(AppState::new(config)?);
    if state.llm_config.read().resolve_provider().is_none() {
        tracing::warn!("No LLM provider configured; extraction requests will fail until one is set");
    }

    state::start_session_reaper(state.clone());

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("specsum server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
