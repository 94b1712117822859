//! Visible-image harvesting: rendered page regions → PNG artifacts.
//!
//! A page's raw image resources include soft masks and stencils that show up
//! as solid black blocks when dumped directly. Rendering the page region under
//! each placed image instead yields exactly what a reader sees, so the
//! harvester asks its [`PageCanvas`] for placements and crops of the rendered
//! page, never for raw resource bytes.
//!
//! Filtering happens twice: on the placement box in page units (tiny rules and
//! bullets) and on the rendered raster in pixels.

use crate::config::SegmentConfig;
use crate::error::KgError;
use image::{DynamicImage, ImageFormat};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Axis-aligned box in page units, origin at the top-left corner of the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// True for degenerate, inverted or non-finite boxes.
    pub fn is_empty(&self) -> bool {
        let finite = [self.x0, self.y0, self.x1, self.y1]
            .iter()
            .all(|v| v.is_finite());
        !finite || self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Corners rounded to whole page units, used as a deduplication key.
    pub fn rounded(&self) -> [i64; 4] {
        [
            self.x0.round() as i64,
            self.y0.round() as i64,
            self.x1.round() as i64,
            self.y1.round() as i64,
        ]
    }
}

/// One placement of an image on a page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageRegion {
    /// Identity of the underlying image resource.
    pub xref: u64,
    pub bbox: BBox,
}

/// Rendering capability the harvester needs from a page.
pub trait PageCanvas {
    /// Every image placement on the page, in content order.
    fn image_regions(&self) -> Result<Vec<ImageRegion>, KgError>;

    /// Render the page area under `bbox` at `scale` pixels per page unit.
    fn render_region(&self, bbox: &BBox, scale: f32) -> Result<DynamicImage, KgError>;
}

/// Turns a page's image placements into deduplicated, size-filtered PNG files.
#[derive(Debug, Clone)]
pub struct ImageHarvester {
    min_region_size: f32,
    min_raster_px: u32,
    render_scale: f32,
    images_dir: PathBuf,
}

impl ImageHarvester {
    pub fn new(config: &SegmentConfig) -> Self {
        Self {
            min_region_size: config.min_region_size,
            min_raster_px: config.min_raster_px,
            render_scale: config.render_scale,
            images_dir: config.images_dir.clone(),
        }
    }

    /// Name of the `sequence`-th artifact harvested from `page`.
    pub fn artifact_name(document_stem: &str, page: u32, sequence: usize) -> String {
        format!("{document_stem}_p{page}_{sequence}.png")
    }

    /// Harvest the visible images of one page.
    ///
    /// Returns artifact paths in encounter order. A region that fails to
    /// render is skipped with a warning; a file that fails to write aborts the
    /// harvest.
    pub fn harvest<C: PageCanvas + ?Sized>(
        &self,
        canvas: &C,
        document_stem: &str,
        page: u32,
    ) -> Result<Vec<String>, KgError> {
        let regions = canvas.image_regions()?;
        let mut seen: HashSet<(u64, [i64; 4])> = HashSet::with_capacity(regions.len());
        let mut artifacts = Vec::new();

        for region in regions {
            let bbox = region.bbox;
            if bbox.is_empty()
                || bbox.width() < self.min_region_size
                || bbox.height() < self.min_region_size
            {
                continue;
            }
            if !seen.insert((region.xref, bbox.rounded())) {
                continue;
            }

            let raster = match canvas.render_region(&bbox, self.render_scale) {
                Ok(img) => img,
                Err(e) => {
                    warn!("Page {}: skipping image region {:?}: {}", page, bbox, e);
                    continue;
                }
            };
            if raster.width() < self.min_raster_px || raster.height() < self.min_raster_px {
                debug!(
                    "Page {}: raster {}x{} below minimum, skipped",
                    page,
                    raster.width(),
                    raster.height()
                );
                continue;
            }

            if artifacts.is_empty() {
                std::fs::create_dir_all(&self.images_dir)
                    .map_err(|e| KgError::io(self.images_dir.as_path(), e))?;
            }
            let path = self.images_dir.join(Self::artifact_name(
                document_stem,
                page,
                artifacts.len() + 1,
            ));
            // Opaque RGB: alpha channels turn masked regions black in viewers.
            DynamicImage::ImageRgb8(raster.to_rgb8())
                .save_with_format(&path, ImageFormat::Png)
                .map_err(|source| KgError::ImageWriteFailed {
                    path: path.clone(),
                    source,
                })?;
            artifacts.push(path.to_string_lossy().into_owned());
        }

        debug!("Page {}: harvested {} images", page, artifacts.len());
        Ok(artifacts)
    }
}
