//! Model-output repair and validation.
//!
//! The model is asked for strict JSON but routinely wraps it in prose, code
//! fences or `<think>` blocks. Parsing therefore degrades in stages: the whole
//! text, then the outermost brace-delimited span, then an empty answer. None of
//! these steps can fail.
//!
//! Every field of the parsed answer is treated as optional. Entities without a
//! usable `name` are dropped; relations are kept only when both endpoints name
//! an entity of the *same* answer.

use crate::model::{Entity, EntityType, Relation};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

static RE_OUTER_BRACES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("brace pattern is valid"));

/// Shape-checked model answer: the raw `entities` and `relations` items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedOutput {
    pub entities: Vec<Value>,
    pub relations: Vec<Value>,
}

impl ParsedOutput {
    fn from_value(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return Self::default();
        };
        let mut take_array = |key: &str| match map.remove(key) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        Self {
            entities: take_array("entities"),
            relations: take_array("relations"),
        }
    }
}

/// Parse free-form model output into its `entities` and `relations` arrays.
pub fn parse_model_output(raw: &str) -> ParsedOutput {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return ParsedOutput::from_value(value);
    }
    RE_OUTER_BRACES
        .find(raw)
        .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok())
        .map(ParsedOutput::from_value)
        .unwrap_or_default()
}

/// Trimmed, non-empty string field of a JSON object.
fn text_field<'v>(item: &'v Value, key: &str) -> Option<&'v str> {
    item.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Build entities from raw items, skipping any without a non-empty `name`.
///
/// Duplicate names are kept; the store merges them.
pub fn build_entities(items: &[Value], chunk_id: &str) -> Vec<Entity> {
    items
        .iter()
        .filter_map(|item| {
            let name = text_field(item, "name")?;
            Some(Entity {
                name: name.to_string(),
                entity_type: text_field(item, "type")
                    .map(EntityType::from_label)
                    .unwrap_or_default(),
                description: text_field(item, "description").map(str::to_string),
                source_chunk_id: Some(chunk_id.to_string()),
            })
        })
        .collect()
}

/// Build relations whose endpoints are both in `names` and whose `type` is set.
pub fn build_relations(items: &[Value], names: &HashSet<&str>, chunk_id: &str) -> Vec<Relation> {
    items
        .iter()
        .filter_map(|item| {
            let source = text_field(item, "source")?;
            let target = text_field(item, "target")?;
            let relation_type = text_field(item, "type")?;
            if !names.contains(source) || !names.contains(target) {
                return None;
            }
            Some(Relation {
                source: source.to_string(),
                target: target.to_string(),
                relation_type: relation_type.to_string(),
                evidence: text_field(item, "evidence").map(str::to_string),
                source_chunk_id: Some(chunk_id.to_string()),
            })
        })
        .collect()
}

/// Parse and validate in one step: entities first, then relations against the
/// entity names of this same output.
pub fn validate(raw: &str, chunk_id: &str) -> (Vec<Entity>, Vec<Relation>) {
    let parsed = parse_model_output(raw);
    let entities = build_entities(&parsed.entities, chunk_id);
    let names: HashSet<&str> = entities.iter().map(|e| e.name.as_str()).collect();
    let relations = build_relations(&parsed.relations, &names, chunk_id);
    (entities, relations)
}
