//! Per-page composition of chunking, formula detection and image harvesting.

use super::chunker;
use super::formula::{self, FormulaPredicate, HeuristicPredicate};
use super::harvest::{ImageHarvester, PageCanvas};
use crate::config::SegmentConfig;
use crate::error::KgError;
use crate::model::Chunk;
use tracing::debug;

/// A page the segmenter can read text from and render images of.
pub trait SourcePage: PageCanvas {
    /// 1-based page number within its document.
    fn number(&self) -> u32;

    /// Raw extracted text of the page.
    fn text(&self) -> Result<String, KgError>;
}

/// Turns pages into [`Chunk`] records.
///
/// Images and formula candidates are page-level context: every chunk of a
/// page carries the full lists, they are not partitioned across windows.
#[derive(Debug, Clone)]
pub struct PageSegmenter<P = HeuristicPredicate> {
    config: SegmentConfig,
    harvester: ImageHarvester,
    predicate: P,
}

impl PageSegmenter<HeuristicPredicate> {
    pub fn new(config: SegmentConfig) -> Self {
        Self::with_predicate(config, HeuristicPredicate)
    }
}

impl<P: FormulaPredicate> PageSegmenter<P> {
    /// Segmenter using a custom formula detector.
    pub fn with_predicate(config: SegmentConfig, predicate: P) -> Self {
        let harvester = ImageHarvester::new(&config);
        Self {
            config,
            harvester,
            predicate,
        }
    }

    pub fn config(&self) -> &SegmentConfig {
        &self.config
    }

    /// Segment one page.
    ///
    /// `document_stem` names chunk ids and image artifacts; `source_document`
    /// is recorded verbatim on each chunk.
    pub fn segment<S: SourcePage + ?Sized>(
        &self,
        document_stem: &str,
        source_document: &str,
        page: &S,
    ) -> Result<Vec<Chunk>, KgError> {
        self.segment_page(document_stem, source_document, page)
            .map(|segmented| segmented.chunks)
    }

    /// [`segment`](Self::segment) plus the artifacts written for the page.
    ///
    /// Image artifacts are written even when the page has no text and so
    /// yields no chunks; `images` still lists them.
    pub fn segment_page<S: SourcePage + ?Sized>(
        &self,
        document_stem: &str,
        source_document: &str,
        page: &S,
    ) -> Result<SegmentedPage, KgError> {
        let number = page.number();
        let text = page.text()?;
        let images = self.harvester.harvest(page, document_stem, number)?;
        let formula_candidates = formula::detect_with(&text, &self.predicate);
        let windows = chunker::split(&text, self.config.chunk_size, self.config.overlap);

        debug!(
            "{} p{}: {} windows, {} images, {} formula candidates",
            document_stem,
            number,
            windows.len(),
            images.len(),
            formula_candidates.len()
        );

        let chunks = windows
            .into_iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                chunk_id: Chunk::make_id(document_stem, number, i + 1),
                source_document: source_document.to_string(),
                page: number,
                text,
                image_refs: images.clone(),
                formula_candidates: formula_candidates.clone(),
            })
            .collect();
        Ok(SegmentedPage { chunks, images })
    }
}

/// Output of [`PageSegmenter::segment_page`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentedPage {
    pub chunks: Vec<Chunk>,
    /// Artifact paths harvested from the page, in placement order.
    pub images: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::harvest::{BBox, ImageRegion};
    use image::{DynamicImage, RgbImage};

    struct TextPage {
        number: u32,
        text: &'static str,
        regions: Vec<ImageRegion>,
    }

    impl PageCanvas for TextPage {
        fn image_regions(&self) -> Result<Vec<ImageRegion>, KgError> {
            Ok(self.regions.clone())
        }

        fn render_region(&self, bbox: &BBox, scale: f32) -> Result<DynamicImage, KgError> {
            Ok(DynamicImage::ImageRgb8(RgbImage::new(
                (bbox.width() * scale) as u32,
                (bbox.height() * scale) as u32,
            )))
        }
    }

    impl SourcePage for TextPage {
        fn number(&self) -> u32 {
            self.number
        }

        fn text(&self) -> Result<String, KgError> {
            Ok(self.text.to_string())
        }
    }

    fn config(dir: &std::path::Path, size: usize, overlap: usize) -> SegmentConfig {
        SegmentConfig::builder()
            .chunk_size(size)
            .overlap(overlap)
            .images_dir(dir)
            .build()
            .unwrap()
    }

    #[test]
    fn single_page_formula_lands_in_single_chunk() {
        let tmp = tempfile::tempdir().unwrap();
        let page = TextPage {
            number: 1,
            text: "X = Y + Z\nSome prose.",
            regions: Vec::new(),
        };
        let chunks = PageSegmenter::new(config(tmp.path(), 1200, 200))
            .segment("book", "book.pdf", &page)
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "book-p1-c1");
        assert_eq!(chunks[0].source_document, "book.pdf");
        assert!(chunks[0].formula_candidates.contains(&"X = Y + Z".to_string()));
    }

    #[test]
    fn every_chunk_carries_page_context() {
        let tmp = tempfile::tempdir().unwrap();
        let page = TextPage {
            number: 4,
            text: "E = mc^2\nalpha beta gamma delta epsilon zeta eta theta",
            regions: vec![ImageRegion {
                xref: 1,
                bbox: BBox::new(0.0, 0.0, 40.0, 40.0),
            }],
        };
        let chunks = PageSegmenter::new(config(tmp.path(), 16, 4))
            .segment("phys", "phys.pdf", &page)
            .unwrap();
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_id, format!("phys-p4-c{}", i + 1));
            assert_eq!(chunk.page, 4);
            assert_eq!(chunk.image_refs.len(), 1);
            assert_eq!(chunk.image_refs, chunks[0].image_refs);
            assert_eq!(chunk.formula_candidates, vec!["E = mc^2".to_string()]);
        }
    }

    #[test]
    fn blank_page_yields_no_chunks() {
        let tmp = tempfile::tempdir().unwrap();
        let page = TextPage {
            number: 2,
            text: "  \n\n ",
            regions: Vec::new(),
        };
        let chunks = PageSegmenter::new(config(tmp.path(), 100, 10))
            .segment("doc", "doc.pdf", &page)
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn figure_only_page_reports_its_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let page = TextPage {
            number: 9,
            text: "",
            regions: vec![ImageRegion {
                xref: 1,
                bbox: BBox::new(0.0, 0.0, 120.0, 80.0),
            }],
        };
        let segmented = PageSegmenter::new(config(tmp.path(), 1200, 200))
            .segment_page("atlas", "atlas.pdf", &page)
            .unwrap();
        assert!(segmented.chunks.is_empty());
        assert_eq!(segmented.images.len(), 1);
        assert!(std::path::Path::new(&segmented.images[0]).is_file());
    }

    #[test]
    fn custom_predicate_is_used() {
        let tmp = tempfile::tempdir().unwrap();
        let page = TextPage {
            number: 1,
            text: "X = Y + Z\n定义：导数",
            regions: Vec::new(),
        };
        let never = |_: &str| false;
        let chunks = PageSegmenter::with_predicate(config(tmp.path(), 1200, 0), never)
            .segment("doc", "doc.pdf", &page)
            .unwrap();
        assert!(chunks[0].formula_candidates.is_empty());
    }
}
