//! # textbook-kg
//!
//! Turn textbook PDFs into a knowledge graph.
//!
//! Pages are cut into overlapping text windows that carry the page's formula
//! candidates and visible figures; each window goes to a language model for
//! entity/relation extraction; the model's answer is repaired, validated and
//! upserted into a graph store that can be queried by keyword and rendered as
//! an interactive HTML view.
//!
//! ## Pipeline Overview
//!
//! ```text
//! data/pdfs/*.pdf
//!  │
//!  ├─ 1. Parse    pdfium text + rendered figures → chunks.jsonl   (spawn_blocking)
//!  ├─ 2. Extract  one chunk at a time → model → repair/validate → extractions.jsonl
//!  ├─ 3. Ingest   idempotent upserts → graph.json
//!  └─ 4. Subgraph keyword neighbourhood → subgraph.html
//! ```
//!
//! Every stage persists its output, so any stage can be re-run on its own.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use textbook_kg::{
//!     batch, records, ExtractionClient, ExtractionConfig, JsonlWriter,
//!     NoopProgressCallback, SegmentConfig, Workspace,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ws = Workspace::default();
//!     ws.ensure_dirs()?;
//!
//!     let segment = SegmentConfig::builder().images_dir(&ws.images_dir).build()?;
//!     let chunks = batch::parse_folder(&ws.pdf_dir, &segment).await?.chunks;
//!     records::write_jsonl(&ws.chunks_file, &chunks)?;
//!
//!     let client = ExtractionClient::from_config(ExtractionConfig::default())?;
//!     let mut sink = JsonlWriter::create(&ws.extraction_file)?;
//!     batch::extract_chunks(&client, &chunks, 20, &mut sink, &NoopProgressCallback).await?;
//!     sink.finish()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `kgbuild` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! textbook-kg = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod records;
pub mod store;
pub mod stream;
pub mod visualize;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{
    export_subgraph, extract_chunks, ingest_results, parse_folder, ExtractionSummary, IngestReport,
    ParseReport,
};
pub use config::{
    ExtractionConfig, ExtractionConfigBuilder, SegmentConfig, SegmentConfigBuilder, Workspace,
};
pub use error::{KgError, TransportError};
pub use model::{
    Chunk, Entity, EntityType, ExtractionResult, Relation, Subgraph, SubgraphEdge, SubgraphNode,
};
pub use pipeline::document::{bind_pdfium, segment_pdf, SegmentedDocument};
pub use pipeline::formula::{FormulaPredicate, HeuristicPredicate};
pub use pipeline::harvest::{BBox, ImageHarvester, ImageRegion, PageCanvas};
pub use pipeline::llm::{
    ExtractionClient, ExtractionOutcome, GenerateRequest, OllamaTransport, Transport,
};
pub use pipeline::segment::{PageSegmenter, SegmentedPage, SourcePage};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use records::{read_jsonl, write_jsonl, JsonlWriter};
pub use store::{GraphStats, GraphStore, JsonGraphStore};
pub use stream::extract_stream;
pub use visualize::render_subgraph_html;
