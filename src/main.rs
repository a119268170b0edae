use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pagevec::acquire::{self, DocumentSource};
use pagevec::candle::CandleEmbedder;
use pagevec::extractor::extract_chunks;
use pagevec::{EmbeddingProvider, Session, SessionOptions, Settings, VectorStore};

#[derive(Parser)]
#[command(name = "pagevec")]
#[command(version)]
#[command(about = "Ask questions about a PDF using local embeddings", long_about = None)]
struct Cli {
    /// Configuration file (default: ./pagevec_config.*)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a PDF if needed, then answer questions interactively
    Ask {
        /// PDF path or http(s) URL; prompts when omitted
        source: Option<String>,
        /// Results per query
        #[arg(long)]
        top_k: Option<usize>,
        /// Discard any saved index and build it again
        #[arg(long)]
        rebuild: bool,
    },
    /// Build (or load) the index for a PDF without querying
    Index {
        source: String,
        #[arg(long)]
        rebuild: bool,
    },
    /// List PDFs in the data directory
    List,
    /// Print the effective configuration
    Config,
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "warn" };
    let subscriber = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Acquires, extracts and indexes a document, returning a session ready for queries.
fn open_session<W: Write>(
    settings: &Settings,
    path: &Path,
    rebuild: bool,
    top_k: usize,
    out: &mut W,
) -> Result<Session<CandleEmbedder>> {
    let chunks = extract_chunks(path)?;
    writeln!(out, "Loaded {} pages from {}.", chunks.len(), path.display())?;

    let embedder = CandleEmbedder::load(&settings.embedder_config())?;
    settings.check_dimension(embedder.dimension())?;

    let store_config = settings.store_config(embedder.dimension(), path);
    info!(
        model = embedder.name(),
        dim = embedder.dimension(),
        dir = %store_config.storage_dir.display(),
        "Using index directory"
    );
    let store = VectorStore::initialize(store_config, embedder)?;

    let mut session = Session::new(
        store,
        SessionOptions {
            top_k,
            preview_chars: settings.preview_chars,
        },
    );
    session.prepare(&chunks, rebuild, out)?;
    Ok(session)
}

fn resolve_source<R: BufRead, W: Write>(
    settings: &Settings,
    source: Option<&str>,
    input: R,
    out: &mut W,
) -> Result<Option<PathBuf>> {
    let source = match source {
        Some(arg) => DocumentSource::parse(arg, &settings.data_dir),
        None => match acquire::select_source(input, out, &settings.data_dir)? {
            Some(source) => source,
            None => return Ok(None),
        },
    };
    let timeout = Duration::from_secs(settings.download_timeout_secs);
    let path = acquire::resolve(&source, &settings.data_dir, timeout, out)?;
    Ok(Some(path))
}

fn ask_command(
    settings: &Settings,
    source: Option<&str>,
    top_k: Option<usize>,
    rebuild: bool,
) -> Result<()> {
    if top_k == Some(0) {
        anyhow::bail!("--top-k must be greater than zero");
    }

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let Some(path) = resolve_source(settings, source, &mut input, &mut out)? else {
        writeln!(out, "Bye.")?;
        return Ok(());
    };

    let top_k = top_k.unwrap_or(settings.top_k);
    let mut session = open_session(settings, &path, rebuild, top_k, &mut out)?;
    session.run(&mut input, &mut out)?;
    Ok(())
}

fn index_command(settings: &Settings, source: &str, rebuild: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let path = resolve_source(settings, Some(source), io::empty(), &mut out)?
        .context("no document selected")?;
    open_session(settings, &path, rebuild, settings.top_k, &mut out)?;
    Ok(())
}

fn list_command(settings: &Settings) -> Result<()> {
    for name in acquire::list_local_pdfs(&settings.data_dir)? {
        println!("{}", name);
    }
    Ok(())
}

fn config_command(settings: &Settings) -> Result<()> {
    settings.write_config(&mut io::stdout().lock())?;
    Ok(())
}

fn run() -> Result<()> {
    let args = Cli::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    settings.verbose |= args.verbose;
    init_logging(settings.verbose)?;

    let command = args.command.unwrap_or(Commands::Ask {
        source: None,
        top_k: None,
        rebuild: false,
    });

    match command {
        Commands::Ask {
            source,
            top_k,
            rebuild,
        } => ask_command(&settings, source.as_deref(), top_k, rebuild)?,
        Commands::Index { source, rebuild } => index_command(&settings, &source, rebuild)?,
        Commands::List => list_command(&settings)?,
        Commands::Config => config_command(&settings)?,
    }
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
