//! Offline integration tests: segment → extract → ingest → subgraph with a
//! synthetic page and a scripted model, so neither pdfium nor a model server
//! is needed.

use futures::StreamExt;
use image::{DynamicImage, RgbImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use textbook_kg::{
    batch, extract_stream, read_jsonl, write_jsonl, BBox, Chunk, EntityType, ExtractionClient,
    ExtractionConfig, ExtractionResult, GenerateRequest, GraphStore, ImageRegion, JsonGraphStore,
    JsonlWriter, KgError, NoopProgressCallback, PageCanvas, PageSegmenter, SegmentConfig,
    SourcePage, Transport, TransportError,
};

struct SyntheticPage {
    number: u32,
    text: String,
    regions: Vec<ImageRegion>,
}

impl PageCanvas for SyntheticPage {
    fn image_regions(&self) -> Result<Vec<ImageRegion>, KgError> {
        Ok(self.regions.clone())
    }

    fn render_region(&self, bbox: &BBox, scale: f32) -> Result<DynamicImage, KgError> {
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            (bbox.width() * scale) as u32,
            (bbox.height() * scale) as u32,
            image::Rgb([200, 10, 10]),
        )))
    }
}

impl SourcePage for SyntheticPage {
    fn number(&self) -> u32 {
        self.number
    }

    fn text(&self) -> Result<String, KgError> {
        Ok(self.text.clone())
    }
}

/// Replays canned outputs in order and records every request.
struct ScriptedModel {
    replies: Vec<Result<String, TransportError>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedModel {
    fn new(replies: Vec<Result<String, TransportError>>) -> Self {
        Self {
            replies,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl Transport for &ScriptedModel {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, TransportError> {
        self.seen.lock().unwrap().push(request.clone());
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .get(n)
            .cloned()
            .unwrap_or_else(|| Ok("{}".to_string()))
    }
}

fn segment_config(dir: &std::path::Path) -> SegmentConfig {
    SegmentConfig::builder()
        .chunk_size(1200)
        .overlap(200)
        .images_dir(dir)
        .build()
        .unwrap()
}

const ANSWER: &str = r#"Here is the result:
```json
{"entities": [
   {"name": " X ", "type": "term", "description": "左边"},
   {"name": "Y", "type": "Term"},
   {"name": "Z", "type": "Quantity"},
   {"name": ""}
 ],
 "relations": [
   {"source": "X", "target": "Y", "type": "依赖", "evidence": "X = Y + Z"},
   {"source": "X", "target": "Z", "type": "依赖"},
   {"source": "X", "target": "W", "type": "依赖"}
 ]}
```"#;

#[tokio::test]
async fn formula_page_flows_through_to_subgraph() {
    let tmp = tempfile::tempdir().unwrap();
    let images = tmp.path().join("images");
    let outputs = tmp.path().join("outputs");

    // ── Segment ──────────────────────────────────────────────────────────
    let page = SyntheticPage {
        number: 1,
        text: "X = Y + Z".into(),
        regions: vec![ImageRegion {
            xref: 7,
            bbox: BBox::new(10.0, 10.0, 110.0, 90.0),
        }],
    };
    let segmenter = PageSegmenter::new(segment_config(&images));
    let chunks = segmenter.segment("algebra", "algebra.pdf", &page).unwrap();
    assert_eq!(chunks.len(), 1);
    let chunk = &chunks[0];
    assert_eq!(chunk.chunk_id, "algebra-p1-c1");
    assert_eq!(chunk.text, "X = Y + Z");
    assert_eq!(chunk.formula_candidates, vec!["X = Y + Z".to_string()]);
    assert_eq!(chunk.image_refs.len(), 1);
    assert!(std::path::Path::new(&chunk.image_refs[0]).is_file());

    let chunks_file = outputs.join("chunks.jsonl");
    assert_eq!(write_jsonl(&chunks_file, &chunks).unwrap(), 1);
    let reloaded: Vec<Chunk> = read_jsonl(&chunks_file).unwrap();
    assert_eq!(reloaded, chunks);

    // ── Extract ──────────────────────────────────────────────────────────
    let model = ScriptedModel::new(vec![Ok(ANSWER.to_string())]);
    let config = ExtractionConfig::builder()
        .include_images_and_formulas(true)
        .build()
        .unwrap();
    let client = ExtractionClient::new(&model, config);
    let extraction_file = outputs.join("extractions.jsonl");
    let mut sink = JsonlWriter::create(&extraction_file).unwrap();
    let summary = batch::extract_chunks(&client, &reloaded, 0, &mut sink, &NoopProgressCallback)
        .await
        .unwrap();
    assert_eq!(sink.finish().unwrap(), 1);
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.degraded, 0);
    assert_eq!(summary.entities, 3);
    assert_eq!(summary.relations, 2);

    let seen = model.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].prompt.contains("X = Y + Z"));
    assert_eq!(seen[0].images.as_ref().map(Vec::len), Some(1));
    drop(seen);

    // ── Ingest ───────────────────────────────────────────────────────────
    let results: Vec<ExtractionResult> = read_jsonl(&extraction_file).unwrap();
    assert_eq!(results[0].chunk_id, "algebra-p1-c1");
    assert_eq!(results[0].entities[0].name, "X");
    assert_eq!(results[0].entities[0].entity_type, EntityType::Term);
    assert!(results[0]
        .relations
        .iter()
        .all(|r| r.source_chunk_id.as_deref() == Some("algebra-p1-c1")));

    let graph_file = outputs.join("graph.json");
    let mut store = JsonGraphStore::open(&graph_file).unwrap();
    let report = batch::ingest_results(&results, &mut store).unwrap();
    assert_eq!(report.stats.entity_count, 3);
    assert_eq!(report.stats.relation_count, 2);

    // Re-ingest is idempotent.
    let mut reopened = JsonGraphStore::open(&graph_file).unwrap();
    let again = batch::ingest_results(&results, &mut reopened).unwrap();
    assert_eq!(again.stats, report.stats);

    // ── Subgraph ─────────────────────────────────────────────────────────
    let html = outputs.join("subgraph.html");
    let sub = batch::export_subgraph(&reopened, "x", 100, &html).unwrap();
    assert_eq!(sub.nodes.len(), 3);
    assert_eq!(sub.edges.len(), 2);
    let page = std::fs::read_to_string(&html).unwrap();
    assert!(page.contains("依赖"));
}

#[tokio::test]
async fn failing_model_degrades_without_stopping_the_run() {
    let model = ScriptedModel::new(vec![
        Err(TransportError::Timeout { secs: 120 }),
        Ok(r#"{"entities":[{"name":"导数","type":"Concept"}],"relations":[]}"#.into()),
    ]);
    let config = ExtractionConfig::builder()
        .retry_with_short_text(false)
        .build()
        .unwrap();
    let client = ExtractionClient::new(&model, config);

    let chunks: Vec<Chunk> = (1..=2)
        .map(|i| Chunk {
            chunk_id: Chunk::make_id("calc", 3, i),
            source_document: "calc.pdf".into(),
            page: 3,
            text: format!("导数 window {i}"),
            image_refs: Vec::new(),
            formula_candidates: Vec::new(),
        })
        .collect();

    let out: Vec<_> = extract_stream(&client, chunks).collect().await;
    assert_eq!(out.len(), 2);

    let (first, first_outcome) = &out[0];
    assert!(first.is_empty());
    assert!(first_outcome.is_degraded());
    assert!(first.raw_response.as_deref().unwrap_or_default().contains("error"));

    let (second, second_outcome) = &out[1];
    assert!(!second_outcome.is_degraded());
    assert_eq!(second.entities.len(), 1);
    assert_eq!(second.chunk_id, "calc-p3-c2");
}

#[test]
fn relations_to_unknown_entities_are_not_stored() {
    let results: Vec<ExtractionResult> = serde_json::from_str(
        r#"[{"chunk_id":"c1",
             "entities":[{"name":"A","type":"Concept"}],
             "relations":[{"source":"A","target":"B","type":"包含"}]}]"#,
    )
    .unwrap();
    let mut store = JsonGraphStore::in_memory();
    let report = batch::ingest_results(&results, &mut store).unwrap();
    assert_eq!(report.relations_written, 0);
    assert_eq!(store.stats().unwrap().relation_count, 0);
}
