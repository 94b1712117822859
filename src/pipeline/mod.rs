//! Pipeline stages from PDF page to validated extraction result.
//!
//! Each submodule implements one step and is testable on its own; the pdfium
//! and HTTP dependencies are confined to [`document`] and [`llm`] behind the
//! [`segment::SourcePage`], [`harvest::PageCanvas`] and [`llm::Transport`]
//! traits.
//!
//! ## Data Flow
//!
//! ```text
//!                 ┌─ chunker ─┐
//! input ─▶ document ─ harvest ─┼─▶ segment ──▶ llm ──▶ repair
//! (folder)  (pdfium)  formula ─┘   (Chunk)   (HTTP)  (validate)
//! ```
//!
//! 1. [`input`]   : discover PDFs in a folder and check their magic bytes
//! 2. [`document`]: open a PDF with pdfium and expose its pages
//! 3. [`chunker`], [`formula`], [`harvest`]: per-page text windows, formula
//!    candidates and visible image artifacts
//! 4. [`segment`] : combine the three into `Chunk` records
//! 5. [`encode`]  : base64 image artifacts for multimodal requests
//! 6. [`llm`]     : request, short-text retry, degrade on failure
//! 7. [`repair`]  : JSON repair and entity/relation validation

pub mod chunker;
pub mod document;
pub mod encode;
pub mod formula;
pub mod harvest;
pub mod input;
pub mod llm;
pub mod repair;
pub mod segment;
