//! pdfium-backed pages: the concrete [`SourcePage`] used for real documents.
//!
//! Image placements come from the page's image objects, including those nested
//! in form XObjects. Their crops are taken from one full-page render per page,
//! cached on first use, so a page with many figures is rasterised once.
//!
//! pdfium reports object bounds in PDF user space (origin bottom-left); they
//! are flipped to the top-left origin [`BBox`] uses before leaving this module.

use super::harvest::{BBox, ImageRegion, PageCanvas};
use super::segment::{PageSegmenter, SourcePage};
use crate::error::KgError;
use crate::model::Chunk;
use image::DynamicImage;
use once_cell::unsync::OnceCell;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Bind to a pdfium library.
///
/// With an explicit path (a library file or a directory holding one) only that
/// location is tried. Otherwise the working directory, then the system library
/// search path.
pub fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, KgError> {
    let bindings = match lib_path {
        Some(path) if path.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
        }
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| KgError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// One page of an open pdfium document.
pub struct PdfiumPage<'a> {
    page: PdfPage<'a>,
    number: u32,
    path: PathBuf,
    rendered: OnceCell<(f32, DynamicImage)>,
}

impl<'a> PdfiumPage<'a> {
    pub fn new(page: PdfPage<'a>, number: u32, path: impl Into<PathBuf>) -> Self {
        Self {
            page,
            number,
            path: path.into(),
            rendered: OnceCell::new(),
        }
    }

    fn page_error(&self, detail: impl std::fmt::Debug) -> KgError {
        KgError::PageFailed {
            path: self.path.clone(),
            page: self.number,
            detail: format!("{:?}", detail),
        }
    }

    fn render_page(&self, scale: f32) -> Result<DynamicImage, KgError> {
        let config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = self
            .page
            .render_with_config(&config)
            .map_err(|e| self.page_error(e))?;
        Ok(bitmap.as_image())
    }

    /// Full-page raster at `scale`, rendered once per page.
    fn page_raster(&self, scale: f32) -> Result<&DynamicImage, KgError> {
        let (cached_scale, image) = self
            .rendered
            .get_or_try_init(|| self.render_page(scale).map(|img| (scale, img)))?;
        if *cached_scale != scale {
            return Err(KgError::Internal(format!(
                "page {} already rendered at scale {}, asked for {}",
                self.number, cached_scale, scale
            )));
        }
        Ok(image)
    }
}

/// Affine map `[a b c d e f]` in PDF matrix order: `x' = a·x + c·y + e`,
/// `y' = b·x + d·y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Affine([f32; 6]);

impl Affine {
    pub(crate) const IDENTITY: Affine = Affine([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    pub(crate) fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Affine([a, b, c, d, e, f])
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    /// `inner` first, then `self`.
    fn after(&self, inner: Affine) -> Affine {
        let [a2, b2, c2, d2, e2, f2] = self.0;
        let [a1, b1, c1, d1, e1, f1] = inner.0;
        Affine([
            a2 * a1 + c2 * b1,
            b2 * a1 + d2 * b1,
            a2 * c1 + c2 * d1,
            b2 * c1 + d2 * d1,
            a2 * e1 + c2 * f1 + e2,
            b2 * e1 + d2 * f1 + f2,
        ])
    }

    /// Axis-aligned hull of `[left, bottom, right, top]` after mapping.
    fn map_rect(&self, [l, b, r, t]: [f32; 4]) -> [f32; 4] {
        let corners = [self.apply(l, b), self.apply(l, t), self.apply(r, b), self.apply(r, t)];
        corners.iter().fold(
            [f32::MAX, f32::MAX, f32::MIN, f32::MIN],
            |[x0, y0, x1, y1], &(x, y)| [x0.min(x), y0.min(y), x1.max(x), y1.max(y)],
        )
    }
}

/// The parts of a page object that image placement needs.
pub(crate) trait ObjectNode {
    /// Intrinsic pixel size when the object is an image.
    fn image_pixels(&self) -> Option<(u64, u64)>;

    /// Bounds `[left, bottom, right, top]` in the enclosing object's space.
    fn rect(&self) -> Option<[f32; 4]>;

    /// Form-to-parent transform when the object is a form XObject.
    fn form_matrix(&self) -> Option<Affine>;

    /// Visit the children of a form XObject; no-op for other objects.
    fn for_each_child(&self, f: &mut dyn FnMut(&dyn ObjectNode));
}

impl ObjectNode for PdfPageObject<'_> {
    fn image_pixels(&self) -> Option<(u64, u64)> {
        let image = self.as_image_object()?;
        let w = image.width().unwrap_or(0).max(0) as u64;
        let h = image.height().unwrap_or(0).max(0) as u64;
        Some((w, h))
    }

    fn rect(&self) -> Option<[f32; 4]> {
        let b = self.bounds().ok()?;
        Some([b.left().value, b.bottom().value, b.right().value, b.top().value])
    }

    fn form_matrix(&self) -> Option<Affine> {
        let m = self.as_x_object_form_object()?.matrix().ok()?;
        Some(Affine::new(m.a(), m.b(), m.c(), m.d(), m.e(), m.f()))
    }

    fn for_each_child(&self, f: &mut dyn FnMut(&dyn ObjectNode)) {
        if let Some(form) = self.as_x_object_form_object() {
            for child in form.iter() {
                f(&child);
            }
        }
    }
}

/// Top-left-origin box for a page-space rect `[left, bottom, right, top]`.
pub(crate) fn page_bbox([l, b, r, t]: [f32; 4], page_height: f32) -> BBox {
    BBox::new(l, page_height - t, r, page_height - b)
}

/// Collect image placements under `node`, descending into form XObjects.
///
/// `to_page` maps `node`'s enclosing space to page space. Identity is the
/// image's intrinsic pixel size packed as `(w << 32) | h`, since pdfium
/// exposes no resource number.
pub(crate) fn collect_image_regions(
    node: &dyn ObjectNode,
    to_page: Affine,
    page_height: f32,
    out: &mut Vec<ImageRegion>,
) {
    if let Some((w, h)) = node.image_pixels() {
        match node.rect() {
            Some(rect) => out.push(ImageRegion {
                xref: (w << 32) | h,
                bbox: page_bbox(to_page.map_rect(rect), page_height),
            }),
            None => debug!("image object without bounds skipped"),
        }
        return;
    }
    if let Some(matrix) = node.form_matrix() {
        let inner = to_page.after(matrix);
        node.for_each_child(&mut |child: &dyn ObjectNode| {
            collect_image_regions(child, inner, page_height, &mut *out)
        });
    }
}

/// Pixel crop `(x, y, width, height)` of `bbox` on a raster of the whole
/// page, clamped to the raster. `None` when the page has no area.
pub(crate) fn crop_window(
    bbox: &BBox,
    page_size: (f32, f32),
    raster_size: (u32, u32),
) -> Option<(u32, u32, u32, u32)> {
    let (page_width, page_height) = page_size;
    if page_width <= 0.0 || page_height <= 0.0 {
        return None;
    }
    let (raster_width, raster_height) = (raster_size.0 as f32, raster_size.1 as f32);
    let sx = raster_width / page_width;
    let sy = raster_height / page_height;
    let clamp_x = |v: f32| v.clamp(0.0, raster_width) as u32;
    let clamp_y = |v: f32| v.clamp(0.0, raster_height) as u32;

    let x0 = clamp_x((bbox.x0 * sx).floor());
    let y0 = clamp_y((bbox.y0 * sy).floor());
    let x1 = clamp_x((bbox.x1 * sx).ceil());
    let y1 = clamp_y((bbox.y1 * sy).ceil());
    Some((x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0)))
}

impl PageCanvas for PdfiumPage<'_> {
    fn image_regions(&self) -> Result<Vec<ImageRegion>, KgError> {
        let page_height = self.page.height().value;
        let mut regions = Vec::new();
        for object in self.page.objects().iter() {
            collect_image_regions(&object, Affine::IDENTITY, page_height, &mut regions);
        }
        debug!("Page {}: {} image placements", self.number, regions.len());
        Ok(regions)
    }

    fn render_region(&self, bbox: &BBox, scale: f32) -> Result<DynamicImage, KgError> {
        let raster = self.page_raster(scale)?;
        let page_size = (self.page.width().value, self.page.height().value);
        let (x, y, w, h) = crop_window(bbox, page_size, (raster.width(), raster.height()))
            .ok_or_else(|| self.page_error("page has no area"))?;
        Ok(raster.crop_imm(x, y, w, h))
    }
}

impl SourcePage for PdfiumPage<'_> {
    fn number(&self) -> u32 {
        self.number
    }

    fn text(&self) -> Result<String, KgError> {
        let text = self.page.text().map_err(|e| self.page_error(e))?;
        Ok(text.all())
    }
}

/// File stem used in chunk ids and artifact names.
pub fn document_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

/// Chunks of one document plus what parsing it produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentedDocument {
    pub chunks: Vec<Chunk>,
    pub pages: usize,
    /// Image artifacts written, including those of pages without text.
    pub images: usize,
}

/// Segment every page of one PDF, in page order.
///
/// Blocking: call from a blocking task when inside an async runtime.
pub fn segment_pdf<P: super::formula::FormulaPredicate>(
    pdfium: &Pdfium,
    path: &Path,
    segmenter: &PageSegmenter<P>,
) -> Result<SegmentedDocument, KgError> {
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| KgError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("{:?}", e),
        })?;

    let stem = document_stem(path);
    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| stem.clone());

    let pages = document.pages();
    info!("{}: {} pages", file_name, pages.len());

    let mut segmented = SegmentedDocument::default();
    for (index, page) in pages.iter().enumerate() {
        let page = PdfiumPage::new(page, index as u32 + 1, path);
        let page_out = segmenter.segment_page(&stem, &file_name, &page)?;
        debug!("{} p{}: {} chunks", file_name, index + 1, page_out.chunks.len());
        segmented.pages += 1;
        segmented.images += page_out.images.len();
        segmented.chunks.extend(page_out.chunks);
    }
    Ok(segmented)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_strips_extension() {
        assert_eq!(document_stem(Path::new("/data/pdfs/高等数学.pdf")), "高等数学");
        assert_eq!(document_stem(Path::new("calc.v2.pdf")), "calc.v2");
    }

    #[test]
    fn missing_explicit_library_fails_to_bind() {
        let err = bind_pdfium(Some(Path::new("/nonexistent/libpdfium.so"))).unwrap_err();
        assert!(matches!(err, KgError::PdfiumBindingFailed(_)));
    }

    enum Node {
        Image { pixels: (u64, u64), rect: [f32; 4] },
        Form { matrix: Affine, children: Vec<Node> },
        Text,
    }

    impl ObjectNode for Node {
        fn image_pixels(&self) -> Option<(u64, u64)> {
            match self {
                Node::Image { pixels, .. } => Some(*pixels),
                _ => None,
            }
        }

        fn rect(&self) -> Option<[f32; 4]> {
            match self {
                Node::Image { rect, .. } => Some(*rect),
                _ => None,
            }
        }

        fn form_matrix(&self) -> Option<Affine> {
            match self {
                Node::Form { matrix, .. } => Some(*matrix),
                _ => None,
            }
        }

        fn for_each_child(&self, f: &mut dyn FnMut(&dyn ObjectNode)) {
            if let Node::Form { children, .. } = self {
                for child in children {
                    f(child);
                }
            }
        }
    }

    fn collect(nodes: &[Node], page_height: f32) -> Vec<ImageRegion> {
        let mut out = Vec::new();
        for node in nodes {
            collect_image_regions(node, Affine::IDENTITY, page_height, &mut out);
        }
        out
    }

    #[test]
    fn top_level_image_is_flipped_to_top_left_origin() {
        let regions = collect(
            &[
                Node::Text,
                Node::Image {
                    pixels: (640, 480),
                    rect: [100.0, 500.0, 300.0, 700.0],
                },
            ],
            842.0,
        );
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].xref, (640u64 << 32) | 480);
        assert_eq!(regions[0].bbox, BBox::new(100.0, 142.0, 300.0, 342.0));
    }

    #[test]
    fn images_inside_nested_forms_are_found_in_page_space() {
        // Outer form moves by (50, 100); inner form scales by 2.
        let inner = Node::Form {
            matrix: Affine::new(2.0, 0.0, 0.0, 2.0, 0.0, 0.0),
            children: vec![Node::Image {
                pixels: (10, 10),
                rect: [0.0, 0.0, 20.0, 10.0],
            }],
        };
        let outer = Node::Form {
            matrix: Affine::new(1.0, 0.0, 0.0, 1.0, 50.0, 100.0),
            children: vec![
                Node::Image {
                    pixels: (4, 4),
                    rect: [0.0, 0.0, 30.0, 30.0],
                },
                inner,
            ],
        };
        let regions = collect(&[outer], 800.0);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].bbox, BBox::new(50.0, 670.0, 80.0, 700.0));
        assert_eq!(regions[1].bbox, BBox::new(50.0, 680.0, 90.0, 700.0));
    }

    #[test]
    fn rotated_form_yields_axis_aligned_hull() {
        // 90° rotation: (x, y) -> (-y, x), then shift right by 100.
        let form = Node::Form {
            matrix: Affine::new(0.0, 1.0, -1.0, 0.0, 100.0, 0.0),
            children: vec![Node::Image {
                pixels: (1, 1),
                rect: [0.0, 0.0, 40.0, 20.0],
            }],
        };
        let regions = collect(&[form], 100.0);
        assert_eq!(regions[0].bbox, BBox::new(80.0, 60.0, 100.0, 100.0));
    }

    #[test]
    fn crop_window_scales_and_clamps() {
        // A4 page rendered at 2x.
        let page = (595.0, 842.0);
        let raster = (1190, 1684);
        let bbox = BBox::new(100.0, 142.0, 300.0, 342.0);
        assert_eq!(crop_window(&bbox, page, raster), Some((200, 284, 400, 400)));

        let overhang = BBox::new(-10.0, 800.0, 700.0, 900.0);
        assert_eq!(crop_window(&overhang, page, raster), Some((0, 1600, 1190, 84)));
    }

    #[test]
    fn crop_window_rejects_zero_area_page() {
        let bbox = BBox::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(crop_window(&bbox, (0.0, 842.0), (0, 0)), None);
    }
}
