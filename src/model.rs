//! Value types flowing between pipeline stages.
//!
//! Every type here is an immutable value object: a stage takes its inputs by
//! value or reference and produces new records, with no back-references
//! between them. All of them serialise to one JSON object per line in the
//! persisted stage files (see [`crate::records`]).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A bounded window of one page's normalised text plus that page's image and
/// formula context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// `{document-stem}-p{page}-c{index}`, 1-based index.
    pub chunk_id: String,
    /// File name of the source PDF.
    #[serde(alias = "pdf_file")]
    pub source_document: String,
    /// 1-based page number.
    pub page: u32,
    pub text: String,
    /// Paths of the page's harvested image artifacts, in encounter order.
    #[serde(default, alias = "images")]
    pub image_refs: Vec<String>,
    /// Sorted, duplicate-free formula candidates of the whole page.
    #[serde(default)]
    pub formula_candidates: Vec<String>,
}

impl Chunk {
    /// Build the stable chunk id for a window of a page.
    pub fn make_id(document_stem: &str, page: u32, index: usize) -> String {
        format!("{document_stem}-p{page}-c{index}")
    }
}

/// Entity category. Unknown labels from the model map to [`EntityType::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EntityType {
    #[default]
    Concept,
    Person,
    Method,
    Formula,
    Term,
    #[serde(other)]
    Other,
}

impl EntityType {
    /// Lenient, case-insensitive mapping of a model-supplied label.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "concept" => EntityType::Concept,
            "person" => EntityType::Person,
            "method" => EntityType::Method,
            "formula" => EntityType::Formula,
            "term" => EntityType::Term,
            _ => EntityType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Concept => "Concept",
            EntityType::Person => "Person",
            EntityType::Method => "Method",
            EntityType::Formula => "Formula",
            EntityType::Term => "Term",
            EntityType::Other => "Other",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Non-empty, textbook-original casing.
    pub name: String,
    #[serde(rename = "type", default)]
    pub entity_type: EntityType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source_chunk_id: Option<String>,
}

/// A directed, typed edge between two entities of the same extraction result.
///
/// `relation_type` is kept as an opaque validated string: the label vocabulary
/// belongs to the prompt and the store schema, not to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relation_type: String,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub source_chunk_id: Option<String>,
}

/// Validated output of one chunk's extraction. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub chunk_id: String,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    /// Model output text, or the failure diagnostic when every attempt failed.
    #[serde(default)]
    pub raw_response: Option<String>,
}

impl ExtractionResult {
    pub fn empty(chunk_id: impl Into<String>) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            entities: Vec::new(),
            relations: Vec::new(),
            raw_response: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgraphNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgraphEdge {
    /// Node id, not entity name.
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: String,
}

/// Bounded neighbourhood returned by a keyword query against the graph store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subgraph {
    pub nodes: Vec<SubgraphNode>,
    pub edges: Vec<SubgraphEdge>,
}
