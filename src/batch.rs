//! Stage runners: parse a folder of PDFs, extract chunks, ingest results, and
//! export a keyword subgraph.
//!
//! Each stage reads and writes plain values (or the JSONL files of
//! [`crate::records`]), so the CLI can run them one at a time or chained.
//! Extraction is strictly sequential: one chunk in flight, results persisted in
//! input order.

use crate::config::SegmentConfig;
use crate::error::KgError;
use crate::model::{Chunk, ExtractionResult, Subgraph};
use crate::pipeline::document::{bind_pdfium, segment_pdf};
use crate::pipeline::input::{check_pdf, discover_pdfs};
use crate::pipeline::llm::{ExtractionClient, Transport};
use crate::pipeline::segment::PageSegmenter;
use crate::progress::ExtractionProgressCallback;
use crate::records::JsonlWriter;
use crate::store::{GraphStats, GraphStore};
use crate::visualize::render_subgraph_html;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// What one parse run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseReport {
    pub chunks: Vec<Chunk>,
    pub documents: usize,
    pub pages: usize,
    /// Image artifacts written, including those of pages without text.
    pub images: usize,
}

/// Segment every PDF in `dir` into chunks.
///
/// Documents are processed in lexical file order, pages in page order, so the
/// chunks are document-then-page-then-window ordered. pdfium runs on a
/// blocking thread.
pub async fn parse_folder(dir: &Path, config: &SegmentConfig) -> Result<ParseReport, KgError> {
    let pdfs = discover_pdfs(dir)?;
    for pdf in &pdfs {
        check_pdf(pdf)?;
    }
    if pdfs.is_empty() {
        warn!("No PDFs found in {}", dir.display());
        return Ok(ParseReport::default());
    }

    let config = config.clone();
    tokio::task::spawn_blocking(move || parse_files_blocking(&pdfs, &config))
        .await
        .map_err(|e| KgError::Internal(format!("Parse task panicked: {}", e)))?
}

/// Blocking implementation of [`parse_folder`] over an explicit file list.
pub fn parse_files_blocking(
    pdfs: &[PathBuf],
    config: &SegmentConfig,
) -> Result<ParseReport, KgError> {
    let start = Instant::now();
    let pdfium = bind_pdfium(config.pdfium_lib_path.as_deref())?;
    let segmenter = PageSegmenter::new(config.clone());

    let mut report = ParseReport::default();
    for pdf in pdfs {
        let document = segment_pdf(&pdfium, pdf, &segmenter)?;
        info!(
            "{}: {} chunks, {} images",
            pdf.display(),
            document.chunks.len(),
            document.images
        );
        report.documents += 1;
        report.pages += document.pages;
        report.images += document.images;
        report.chunks.extend(document.chunks);
    }

    info!(
        "Parsed {} PDFs ({} pages) into {} chunks and {} images in {}ms",
        report.documents,
        report.pages,
        report.chunks.len(),
        report.images,
        start.elapsed().as_millis()
    );
    Ok(report)
}

/// Totals of one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionSummary {
    /// Chunks sent to the model.
    pub processed: usize,
    /// Chunks whose every attempt failed.
    pub degraded: usize,
    /// Chunks that needed the short-text retry.
    pub retried: usize,
    pub entities: usize,
    pub relations: usize,
    pub duration_ms: u64,
}

/// Extract the first `max_chunks` chunks (`0` = all), writing each result to
/// `sink` as soon as it is validated.
///
/// A chunk that fails on the wire still produces an (empty) result line; only
/// a failure to write the sink aborts the run.
pub async fn extract_chunks<T: Transport>(
    client: &ExtractionClient<T>,
    chunks: &[Chunk],
    max_chunks: usize,
    sink: &mut JsonlWriter,
    progress: &dyn ExtractionProgressCallback,
) -> Result<ExtractionSummary, KgError> {
    let start = Instant::now();
    let selected = if max_chunks == 0 {
        chunks
    } else {
        &chunks[..chunks.len().min(max_chunks)]
    };
    let total = selected.len();
    info!("Extracting {} of {} chunks", total, chunks.len());
    progress.on_run_start(total);

    let mut summary = ExtractionSummary::default();
    for (i, chunk) in selected.iter().enumerate() {
        let index = i + 1;
        progress.on_chunk_start(index, total, &chunk.chunk_id);

        let (result, outcome) = client
            .extract_detailed(
                &chunk.chunk_id,
                &chunk.text,
                &chunk.image_refs,
                &chunk.formula_candidates,
            )
            .await;
        sink.write(&result)?;

        summary.processed += 1;
        summary.entities += result.entities.len();
        summary.relations += result.relations.len();
        if outcome.attempts > 1 {
            summary.retried += 1;
        }
        if let Some(failure) = &outcome.failure {
            summary.degraded += 1;
            warn!(
                "{}: degraded to empty result after {} attempts",
                chunk.chunk_id, outcome.attempts
            );
            progress.on_chunk_degraded(index, total, &failure.to_string());
        }
        progress.on_chunk_complete(index, total, result.entities.len(), result.relations.len());
    }

    summary.duration_ms = start.elapsed().as_millis() as u64;
    progress.on_run_complete(total, summary.degraded);
    info!(
        "Extraction done: {} chunks, {} degraded, {} entities, {} relations in {}ms",
        summary.processed,
        summary.degraded,
        summary.entities,
        summary.relations,
        summary.duration_ms
    );
    Ok(summary)
}

/// Rows written by one ingest run plus the store totals afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub results: usize,
    pub entities_written: usize,
    pub relations_written: usize,
    pub stats: GraphStats,
}

/// Upsert every result into `store` and flush it.
pub fn ingest_results<S: GraphStore + ?Sized>(
    results: &[ExtractionResult],
    store: &mut S,
) -> Result<IngestReport, KgError> {
    let mut report = IngestReport {
        results: results.len(),
        ..IngestReport::default()
    };
    for result in results {
        report.entities_written += store.upsert_entities(&result.entities)?;
        report.relations_written += store.upsert_relations(&result.relations)?;
        debug!(
            "{}: ingested {} entities, {} relations",
            result.chunk_id,
            result.entities.len(),
            result.relations.len()
        );
    }
    store.flush()?;
    report.stats = store.stats()?;
    info!(
        "Ingested {} results: {} entity rows, {} relation rows (store: {} entities, {} relations)",
        report.results,
        report.entities_written,
        report.relations_written,
        report.stats.entity_count,
        report.stats.relation_count
    );
    Ok(report)
}

/// Query the keyword subgraph and render it to `out_html`.
pub fn export_subgraph<S: GraphStore + ?Sized>(
    store: &S,
    keyword: &str,
    limit: usize,
    out_html: &Path,
) -> Result<Subgraph, KgError> {
    let subgraph = store.subgraph_by_keyword(keyword, limit)?;
    render_subgraph_html(&subgraph, out_html)?;
    Ok(subgraph)
}
