//! Configuration types for segmentation and extraction.
//!
//! Every knob lives in an explicit struct handed to a constructor; nothing in
//! the library reads environment variables. The `kgbuild` binary is the only
//! place where flags and environment are mapped onto these structs.
//!
//! Both configs are built via a builder so callers set only what they care
//! about and rely on documented defaults for the rest.

use crate::error::KgError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ── Segmentation ─────────────────────────────────────────────────────────

/// Configuration for turning PDF pages into chunks.
///
/// ```rust
/// use textbook_kg::SegmentConfig;
///
/// let config = SegmentConfig::builder()
///     .chunk_size(800)
///     .overlap(100)
///     .images_dir("out/images")
///     .build()
///     .unwrap();
/// assert_eq!(config.chunk_size, 800);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    /// Window length in characters. Default: 1200.
    pub chunk_size: usize,

    /// Characters shared by consecutive windows. Must be `< chunk_size`. Default: 200.
    pub overlap: usize,

    /// Minimum width and height, in page units, of an image region worth
    /// harvesting. Default: 12.0.
    ///
    /// Smaller regions are rules, bullets and stencil masks.
    pub min_region_size: f32,

    /// Minimum width and height, in pixels, of a rendered region. Default: 24.
    pub min_raster_px: u32,

    /// Upscaling factor applied when rendering a region. Default: 2.0.
    pub render_scale: f32,

    /// Directory receiving harvested PNG artifacts.
    pub images_dir: PathBuf,

    /// Explicit pdfium library location. `None` searches `./` then the system.
    pub pdfium_lib_path: Option<PathBuf>,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1200,
            overlap: 200,
            min_region_size: 12.0,
            min_raster_px: 24,
            render_scale: 2.0,
            images_dir: PathBuf::from("data/outputs/images"),
            pdfium_lib_path: None,
        }
    }
}

impl SegmentConfig {
    pub fn builder() -> SegmentConfigBuilder {
        SegmentConfigBuilder {
            config: Self::default(),
        }
    }
}

#[derive(Debug)]
pub struct SegmentConfigBuilder {
    config: SegmentConfig,
}

impl SegmentConfigBuilder {
    pub fn chunk_size(mut self, n: usize) -> Self {
        self.config.chunk_size = n;
        self
    }

    pub fn overlap(mut self, n: usize) -> Self {
        self.config.overlap = n;
        self
    }

    pub fn min_region_size(mut self, units: f32) -> Self {
        self.config.min_region_size = units.max(0.0);
        self
    }

    pub fn min_raster_px(mut self, px: u32) -> Self {
        self.config.min_raster_px = px;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale;
        self
    }

    pub fn images_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.images_dir = dir.into();
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SegmentConfig, KgError> {
        let c = &self.config;
        if c.chunk_size == 0 {
            return Err(KgError::InvalidConfig("chunk_size must be ≥ 1".into()));
        }
        if c.overlap >= c.chunk_size {
            return Err(KgError::InvalidConfig(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                c.overlap, c.chunk_size
            )));
        }
        if !(c.render_scale.is_finite() && c.render_scale > 0.0) {
            return Err(KgError::InvalidConfig(format!(
                "render_scale must be > 0, got {}",
                c.render_scale
            )));
        }
        Ok(self.config)
    }
}

// ── Extraction ───────────────────────────────────────────────────────────

/// Configuration for the LLM extraction client.
///
/// The two historical extractor behaviours are switches on one client:
/// `include_images_and_formulas` embeds page images and formula candidates
/// into the request, `retry_with_short_text` enables the single truncated
/// retry after a failed attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Endpoint root, without the `/api/generate` suffix.
    pub base_url: String,

    pub model: String,

    /// Per-request timeout in seconds. Default: 120.
    pub timeout_secs: u64,

    /// Send up to `max_images` base64 images and `max_formulas` formula
    /// candidates with the chunk text. Default: false (text only).
    pub include_images_and_formulas: bool,

    /// After a failed attempt on a long chunk, retry once with the text cut to
    /// `short_text_threshold` characters. Default: true.
    pub retry_with_short_text: bool,

    /// Character length above which the short-text retry applies. Default: 1200.
    pub short_text_threshold: usize,

    /// Default: 4.
    pub max_images: usize,

    /// Default: 20.
    pub max_formulas: usize,

    /// Replacement for [`crate::prompts::DEFAULT_EXTRACTION_PROMPT`]. Must
    /// contain the `{text}` placeholder; `{formulas}` is optional.
    pub prompt_template: Option<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11500".to_string(),
            model: "qwen3-vl:30b".to_string(),
            timeout_secs: 120,
            include_images_and_formulas: false,
            retry_with_short_text: true,
            short_text_threshold: 1200,
            max_images: 4,
            max_formulas: 20,
            prompt_template: None,
        }
    }
}

impl ExtractionConfig {
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Full URL of the generate endpoint.
    pub fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn include_images_and_formulas(mut self, v: bool) -> Self {
        self.config.include_images_and_formulas = v;
        self
    }

    pub fn retry_with_short_text(mut self, v: bool) -> Self {
        self.config.retry_with_short_text = v;
        self
    }

    pub fn short_text_threshold(mut self, chars: usize) -> Self {
        self.config.short_text_threshold = chars;
        self
    }

    pub fn max_images(mut self, n: usize) -> Self {
        self.config.max_images = n;
        self
    }

    pub fn max_formulas(mut self, n: usize) -> Self {
        self.config.max_formulas = n;
        self
    }

    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.config.prompt_template = Some(template.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, KgError> {
        let c = &self.config;
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(KgError::InvalidConfig(format!(
                "base_url must be an http(s) URL, got '{}'",
                c.base_url
            )));
        }
        if c.model.trim().is_empty() {
            return Err(KgError::InvalidConfig("model must not be empty".into()));
        }
        if c.timeout_secs == 0 {
            return Err(KgError::InvalidConfig("timeout_secs must be ≥ 1".into()));
        }
        if c.short_text_threshold == 0 {
            return Err(KgError::InvalidConfig(
                "short_text_threshold must be ≥ 1".into(),
            ));
        }
        if let Some(ref t) = c.prompt_template {
            if !t.contains("{text}") {
                return Err(KgError::InvalidConfig(
                    "prompt_template must contain the {text} placeholder".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Workspace layout ─────────────────────────────────────────────────────

/// On-disk layout of one pipeline workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub pdf_dir: PathBuf,
    pub output_dir: PathBuf,
    pub images_dir: PathBuf,
    pub chunks_file: PathBuf,
    pub extraction_file: PathBuf,
    pub graph_file: PathBuf,
    pub subgraph_html: PathBuf,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::rooted_at("data")
    }
}

impl Workspace {
    /// Standard layout below `root`: `pdfs/` for input, `outputs/` for every
    /// stage file.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let output_dir = root.join("outputs");
        Self {
            pdf_dir: root.join("pdfs"),
            images_dir: output_dir.join("images"),
            chunks_file: output_dir.join("chunks.jsonl"),
            extraction_file: output_dir.join("extractions.jsonl"),
            graph_file: output_dir.join("graph.json"),
            subgraph_html: output_dir.join("subgraph.html"),
            output_dir,
        }
    }

    /// Create the input, output and image directories if missing.
    pub fn ensure_dirs(&self) -> Result<(), KgError> {
        for dir in [&self.output_dir, &self.images_dir, &self.pdf_dir] {
            std::fs::create_dir_all(dir).map_err(|e| KgError::io(dir.as_path(), e))?;
        }
        Ok(())
    }
}
