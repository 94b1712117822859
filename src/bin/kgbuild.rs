//! CLI binary for textbook-kg.
//!
//! A thin shim over the library crate that maps flags and environment onto
//! `SegmentConfig` / `ExtractionConfig` / `Workspace`, runs one stage or all
//! of them, and prints summaries.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use textbook_kg::{
    batch, read_jsonl, write_jsonl, Chunk, ExtractionClient, ExtractionConfig,
    ExtractionProgressCallback, ExtractionResult, ExtractionSummary, IngestReport,
    JsonGraphStore, JsonlWriter, NoopProgressCallback, ProgressCallback, SegmentConfig, Workspace,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress bar with one log line per chunk.
struct CliProgressCallback {
    bar: ProgressBar,
    chunk_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} chunks  \
             ⏱ {elapsed_precise}  ETA {eta_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            chunk_started: Mutex::new(None),
        })
    }

    fn chunk_elapsed(&self) -> String {
        let secs = self
            .chunk_started
            .lock()
            .ok()
            .and_then(|mut started| started.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_chunks: usize) {
        self.bar.set_length(total_chunks as u64);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting {total_chunks} chunks…"))
        ));
    }

    fn on_chunk_start(&self, _index: usize, _total: usize, chunk_id: &str) {
        if let Ok(mut started) = self.chunk_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(chunk_id.to_string());
    }

    fn on_chunk_degraded(&self, index: usize, total: usize, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Chunk {:>4}/{:<4}  {}",
            red("✗"),
            index,
            total,
            red(&msg),
        ));
    }

    fn on_chunk_complete(&self, index: usize, total: usize, entities: usize, relations: usize) {
        self.bar.println(format!(
            "  {} Chunk {:>4}/{:<4}  {}  {}",
            green("✓"),
            index,
            total,
            dim(&format!("{entities:>3} entities {relations:>3} relations")),
            self.chunk_elapsed(),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total: usize, degraded: usize) {
        self.bar.finish_and_clear();
        if degraded == 0 {
            eprintln!("{} {} chunks extracted", green("✔"), bold(&total.to_string()));
        } else {
            eprintln!(
                "{} {}/{} chunks extracted  ({} degraded to empty)",
                if degraded == total { red("✘") } else { cyan("⚠") },
                bold(&(total - degraded).to_string()),
                total,
                red(&degraded.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Whole pipeline over data/pdfs, first 20 chunks only
  kgbuild run-all --max-chunks 20

  # One stage at a time
  kgbuild parse --pdf-dir data/pdfs
  kgbuild extract --max-chunks 50
  kgbuild ingest
  kgbuild subgraph --keyword 导数 --limit 80

  # Send figures and formula candidates along with the text
  kgbuild extract --include-images-and-formulas

ENVIRONMENT VARIABLES:
  OLLAMA_BASE_URL   Extraction endpoint (default http://127.0.0.1:11500)
  OLLAMA_MODEL      Model name (default qwen3-vl:30b)
  PDFIUM_LIB_PATH   pdfium library file or directory
  KG_DATA_DIR       Workspace root (default data)
  RUST_LOG          Log filter, overrides --verbose/--quiet
"#;

/// Build a knowledge graph from textbook PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "kgbuild",
    version,
    about = "Build a knowledge graph from textbook PDFs with a local LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Workspace root holding pdfs/ and outputs/.
    #[arg(long, global = true, env = "KG_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "KG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "KG_QUIET")]
    quiet: bool,

    /// Disable the progress bar.
    #[arg(long, global = true, env = "KG_NO_PROGRESS")]
    no_progress: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Segment PDFs into chunks (text windows + formulas + figures).
    Parse {
        /// Folder of textbook PDFs [default: <data-dir>/pdfs].
        #[arg(long)]
        pdf_dir: Option<PathBuf>,
        /// Chunk output file [default: <data-dir>/outputs/chunks.jsonl].
        #[arg(long)]
        out_file: Option<PathBuf>,
        #[command(flatten)]
        segment: SegmentArgs,
    },
    /// Extract entities and relations from chunks.
    Extract {
        /// Chunk input file [default: <data-dir>/outputs/chunks.jsonl].
        #[arg(long)]
        chunks_file: Option<PathBuf>,
        /// Result output file [default: <data-dir>/outputs/extractions.jsonl].
        #[arg(long)]
        out_file: Option<PathBuf>,
        /// Only process the first N chunks; 0 means all.
        #[arg(long, env = "KG_MAX_CHUNKS", default_value_t = 0)]
        max_chunks: usize,
        #[command(flatten)]
        extract: ExtractArgs,
    },
    /// Upsert extraction results into the graph store.
    Ingest {
        /// Result input file [default: <data-dir>/outputs/extractions.jsonl].
        #[arg(long)]
        extraction_file: Option<PathBuf>,
        /// Graph snapshot [default: <data-dir>/outputs/graph.json].
        #[arg(long)]
        graph_file: Option<PathBuf>,
    },
    /// Render the neighbourhood of a keyword as interactive HTML.
    Subgraph {
        /// Case-insensitive substring of entity names.
        #[arg(long)]
        keyword: String,
        /// Output HTML [default: <data-dir>/outputs/subgraph.html].
        #[arg(long)]
        out_html: Option<PathBuf>,
        /// Maximum (node, relation, neighbour) records.
        #[arg(long, default_value_t = 100)]
        limit: usize,
        /// Graph snapshot [default: <data-dir>/outputs/graph.json].
        #[arg(long)]
        graph_file: Option<PathBuf>,
    },
    /// Parse, extract and ingest in one go.
    RunAll {
        /// Folder of textbook PDFs [default: <data-dir>/pdfs].
        #[arg(long)]
        pdf_dir: Option<PathBuf>,
        /// Only extract the first N chunks; 0 means all.
        #[arg(long, env = "KG_MAX_CHUNKS", default_value_t = 0)]
        max_chunks: usize,
        #[command(flatten)]
        segment: SegmentArgs,
        #[command(flatten)]
        extract: ExtractArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct SegmentArgs {
    /// Window length in characters.
    #[arg(long, env = "KG_CHUNK_SIZE", default_value_t = 1200)]
    chunk_size: usize,

    /// Characters shared by consecutive windows.
    #[arg(long, env = "KG_OVERLAP", default_value_t = 200)]
    overlap: usize,

    /// pdfium library file or directory.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct ExtractArgs {
    /// Ollama-compatible endpoint base URL.
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = "http://127.0.0.1:11500")]
    base_url: String,

    /// Model name.
    #[arg(long, env = "OLLAMA_MODEL", default_value = "qwen3-vl:30b")]
    model: String,

    /// Per-request timeout in seconds.
    #[arg(long, env = "KG_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Send up to 4 figures and 20 formula candidates with each chunk.
    #[arg(long, env = "KG_INCLUDE_IMAGES_AND_FORMULAS")]
    include_images_and_formulas: bool,

    /// Do not retry failed long chunks with truncated text.
    #[arg(long, env = "KG_NO_SHORT_RETRY")]
    no_short_retry: bool,

    /// Text file with a prompt template containing {text} (and optionally {formulas}).
    #[arg(long, env = "KG_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs would interleave with the progress bar.
    let uses_bar = matches!(cli.command, Command::Extract { .. } | Command::RunAll { .. });
    let show_progress = uses_bar && !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let ws = Workspace::rooted_at(&cli.data_dir);

    match &cli.command {
        Command::Parse {
            pdf_dir,
            out_file,
            segment,
        } => {
            let pdf_dir = pdf_dir.clone().unwrap_or_else(|| ws.pdf_dir.clone());
            let out_file = out_file.clone().unwrap_or_else(|| ws.chunks_file.clone());
            run_parse(&cli, &ws, &pdf_dir, &out_file, segment).await?;
        }
        Command::Extract {
            chunks_file,
            out_file,
            max_chunks,
            extract,
        } => {
            let chunks_file = chunks_file.clone().unwrap_or_else(|| ws.chunks_file.clone());
            let out_file = out_file
                .clone()
                .unwrap_or_else(|| ws.extraction_file.clone());
            let chunks: Vec<Chunk> = read_jsonl(&chunks_file)
                .with_context(|| format!("Failed to read chunks from {}", chunks_file.display()))?;
            run_extract(&cli, &chunks, &out_file, *max_chunks, extract, show_progress).await?;
        }
        Command::Ingest {
            extraction_file,
            graph_file,
        } => {
            let extraction_file = extraction_file
                .clone()
                .unwrap_or_else(|| ws.extraction_file.clone());
            let graph_file = graph_file.clone().unwrap_or_else(|| ws.graph_file.clone());
            run_ingest(&cli, &extraction_file, &graph_file)?;
        }
        Command::Subgraph {
            keyword,
            out_html,
            limit,
            graph_file,
        } => {
            let out_html = out_html.clone().unwrap_or_else(|| ws.subgraph_html.clone());
            let graph_file = graph_file.clone().unwrap_or_else(|| ws.graph_file.clone());
            let store = JsonGraphStore::open(&graph_file)
                .with_context(|| format!("Failed to open graph {}", graph_file.display()))?;
            let sub = batch::export_subgraph(&store, keyword, *limit, &out_html)
                .context("Subgraph export failed")?;
            if !cli.quiet {
                eprintln!(
                    "{} {} nodes, {} edges  →  {}",
                    green("✔"),
                    sub.nodes.len(),
                    sub.edges.len(),
                    bold(&out_html.display().to_string()),
                );
            }
        }
        Command::RunAll {
            pdf_dir,
            max_chunks,
            segment,
            extract,
        } => {
            let pdf_dir = pdf_dir.clone().unwrap_or_else(|| ws.pdf_dir.clone());
            let chunks = run_parse(&cli, &ws, &pdf_dir, &ws.chunks_file, segment).await?;
            run_extract(
                &cli,
                &chunks,
                &ws.extraction_file,
                *max_chunks,
                extract,
                show_progress,
            )
            .await?;
            run_ingest(&cli, &ws.extraction_file, &ws.graph_file)?;
            if !cli.quiet {
                eprintln!(
                    "{} Pipeline complete. Run {} to visualise.",
                    green("✔"),
                    bold("kgbuild subgraph --keyword <term>")
                );
            }
        }
    }

    Ok(())
}

async fn run_parse(
    cli: &Cli,
    ws: &Workspace,
    pdf_dir: &Path,
    out_file: &Path,
    args: &SegmentArgs,
) -> Result<Vec<Chunk>> {
    ws.ensure_dirs().context("Failed to create workspace")?;

    let mut builder = SegmentConfig::builder()
        .chunk_size(args.chunk_size)
        .overlap(args.overlap)
        .images_dir(&ws.images_dir);
    if let Some(lib) = &args.pdfium_lib {
        builder = builder.pdfium_lib_path(lib);
    }
    let config = builder.build().context("Invalid segmentation settings")?;

    let start = Instant::now();
    let report = batch::parse_folder(pdf_dir, &config)
        .await
        .with_context(|| format!("Failed to parse PDFs in {}", pdf_dir.display()))?;
    write_jsonl(out_file, &report.chunks).context("Failed to write chunks")?;

    if !cli.quiet {
        eprintln!(
            "{} {} PDFs, {} pages → {} chunks, {} figures in {}ms  →  {}",
            green("✔"),
            report.documents,
            report.pages,
            report.chunks.len(),
            report.images,
            start.elapsed().as_millis(),
            bold(&out_file.display().to_string()),
        );
    }
    Ok(report.chunks)
}

async fn run_extract(
    cli: &Cli,
    chunks: &[Chunk],
    out_file: &Path,
    max_chunks: usize,
    args: &ExtractArgs,
    show_progress: bool,
) -> Result<ExtractionSummary> {
    let config = build_extraction_config(args).await?;
    let client = ExtractionClient::from_config(config).context("Failed to create HTTP client")?;
    let mut sink = JsonlWriter::create(out_file).context("Failed to open result file")?;

    let progress: ProgressCallback = if show_progress {
        CliProgressCallback::new()
    } else {
        Arc::new(NoopProgressCallback)
    };
    let summary = batch::extract_chunks(&client, chunks, max_chunks, &mut sink, progress.as_ref())
        .await
        .context("Extraction failed")?;
    sink.finish().context("Failed to finish result file")?;

    if !cli.quiet {
        print_table(
            "Extraction",
            &[
                ("chunks processed", summary.processed),
                ("short-text retries", summary.retried),
                ("degraded to empty", summary.degraded),
                ("entities", summary.entities),
                ("relations", summary.relations),
            ],
        );
        eprintln!(
            "   {}ms  →  {}",
            summary.duration_ms,
            bold(&out_file.display().to_string())
        );
    }
    Ok(summary)
}

fn run_ingest(cli: &Cli, extraction_file: &Path, graph_file: &Path) -> Result<IngestReport> {
    let results: Vec<ExtractionResult> = read_jsonl(extraction_file).with_context(|| {
        format!(
            "Failed to read extraction results from {}",
            extraction_file.display()
        )
    })?;
    let mut store = JsonGraphStore::open(graph_file)
        .with_context(|| format!("Failed to open graph {}", graph_file.display()))?;
    let report = batch::ingest_results(&results, &mut store).context("Ingest failed")?;

    if !cli.quiet {
        print_table(
            "Ingest",
            &[
                ("entities written (this run)", report.entities_written),
                ("relations written (this run)", report.relations_written),
                ("entities in graph", report.stats.entity_count),
                ("relations in graph", report.stats.relation_count),
            ],
        );
    }
    Ok(report)
}

/// Map CLI args to `ExtractionConfig`.
async fn build_extraction_config(args: &ExtractArgs) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .base_url(&args.base_url)
        .model(&args.model)
        .timeout_secs(args.timeout)
        .include_images_and_formulas(args.include_images_and_formulas)
        .retry_with_short_text(!args.no_short_retry);

    if let Some(path) = &args.prompt_file {
        let template = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt template from {:?}", path))?;
        builder = builder.prompt_template(template);
    }

    builder.build().context("Invalid extraction settings")
}

fn print_table(title: &str, rows: &[(&str, usize)]) {
    let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    eprintln!("{}", bold(title));
    for (key, value) in rows {
        eprintln!("  {:<width$}  {:>8}", key, value, width = width);
    }
}
