//! Graph store: idempotent upserts of validated results, aggregate counts, and
//! keyword subgraph queries.
//!
//! [`GraphStore`] is the contract the ingest stage writes through.
//! [`JsonGraphStore`] implements it in memory with a JSON snapshot on disk,
//! which is enough for a single textbook and keeps the pipeline free of a
//! database server.
//!
//! Merge rules:
//! * entities are keyed by exact name; `type` and `description` are only
//!   filled when still unset, so the first chunk that describes a term wins;
//! * relations are keyed by `(source, target, type)` and are only created when
//!   both endpoint entities already exist; `evidence` is set-if-absent.

use crate::error::KgError;
use crate::model::{Entity, EntityType, Relation, Subgraph, SubgraphEdge, SubgraphNode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Entity and relation totals of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub entity_count: usize,
    pub relation_count: usize,
}

/// Destination for validated extraction results.
pub trait GraphStore {
    /// Merge `entities` by name. Returns the number of rows applied.
    fn upsert_entities(&mut self, entities: &[Entity]) -> Result<usize, KgError>;

    /// Merge `relations` by `(source, target, type)`. Rows whose endpoints are
    /// not stored entities are skipped. Returns the number of rows applied.
    fn upsert_relations(&mut self, relations: &[Relation]) -> Result<usize, KgError>;

    fn stats(&self) -> Result<GraphStats, KgError>;

    /// Entities whose name contains `keyword` (case-insensitive) plus their
    /// incident relations in either direction, bounded to `limit`
    /// (node, relation, neighbour) records.
    fn subgraph_by_keyword(&self, keyword: &str, limit: usize) -> Result<Subgraph, KgError>;

    /// Make prior upserts durable.
    fn flush(&mut self) -> Result<(), KgError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntity {
    name: String,
    #[serde(rename = "type", default)]
    entity_type: Option<EntityType>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRelation {
    source: String,
    target: String,
    #[serde(rename = "type")]
    relation_type: String,
    #[serde(default)]
    evidence: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    entities: Vec<StoredEntity>,
    relations: Vec<StoredRelation>,
}

type RelationKey = (String, String, String);

/// Distinct entity indices in first-seen order.
struct NodePicker {
    seen: Vec<bool>,
    order: Vec<usize>,
}

impl NodePicker {
    fn new(len: usize) -> Self {
        Self {
            seen: vec![false; len],
            order: Vec::new(),
        }
    }

    fn add(&mut self, index: usize) {
        if !self.seen[index] {
            self.seen[index] = true;
            self.order.push(index);
        }
    }
}

/// In-memory graph persisted as one JSON document.
#[derive(Debug, Default)]
pub struct JsonGraphStore {
    path: Option<PathBuf>,
    entities: Vec<StoredEntity>,
    relations: Vec<StoredRelation>,
    by_name: HashMap<String, usize>,
    by_key: HashMap<RelationKey, usize>,
}

impl JsonGraphStore {
    /// Store that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the snapshot at `path`, or start empty when it does not exist.
    /// [`flush`](GraphStore::flush) writes back to the same path.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, KgError> {
        let path = path.into();
        let snapshot = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<Snapshot>(&bytes).map_err(|source| {
                KgError::RecordDecode {
                    path: path.clone(),
                    line: source.line(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(KgError::io(path, e)),
        };

        let mut store = Self {
            path: Some(path),
            ..Self::default()
        };
        for entity in snapshot.entities {
            store.by_name.insert(entity.name.clone(), store.entities.len());
            store.entities.push(entity);
        }
        for relation in snapshot.relations {
            store
                .by_key
                .insert(relation_key(&relation), store.relations.len());
            store.relations.push(relation);
        }
        info!(
            "Graph store loaded: {} entities, {} relations",
            store.entities.len(),
            store.relations.len()
        );
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn save(&self, path: &Path) -> Result<(), KgError> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| KgError::io(dir, e))?;

        let snapshot = SnapshotRef {
            entities: &self.entities,
            relations: &self.relations,
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| KgError::io(dir, e))?;
        serde_json::to_writer_pretty(&mut tmp, &snapshot)?;
        tmp.write_all(b"\n").map_err(|e| KgError::io(path, e))?;
        tmp.persist(path).map_err(|e| KgError::io(path, e.error))?;
        debug!("Graph snapshot written to {}", path.display());
        Ok(())
    }

    fn node_id(index: usize) -> String {
        format!("n{index}")
    }

    fn node(&self, index: usize) -> SubgraphNode {
        let entity = &self.entities[index];
        SubgraphNode {
            id: Self::node_id(index),
            name: entity.name.clone(),
            node_type: entity.entity_type.unwrap_or_default().to_string(),
        }
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    entities: &'a [StoredEntity],
    relations: &'a [StoredRelation],
}

fn relation_key(r: &StoredRelation) -> RelationKey {
    (r.source.clone(), r.target.clone(), r.relation_type.clone())
}

impl GraphStore for JsonGraphStore {
    fn upsert_entities(&mut self, entities: &[Entity]) -> Result<usize, KgError> {
        for entity in entities {
            match self.by_name.get(&entity.name) {
                Some(&i) => {
                    let stored = &mut self.entities[i];
                    stored.entity_type.get_or_insert(entity.entity_type);
                    if stored.description.is_none() {
                        stored.description = entity.description.clone();
                    }
                }
                None => {
                    self.by_name
                        .insert(entity.name.clone(), self.entities.len());
                    self.entities.push(StoredEntity {
                        name: entity.name.clone(),
                        entity_type: Some(entity.entity_type),
                        description: entity.description.clone(),
                    });
                }
            }
        }
        Ok(entities.len())
    }

    fn upsert_relations(&mut self, relations: &[Relation]) -> Result<usize, KgError> {
        let mut applied = 0;
        for relation in relations {
            if !self.by_name.contains_key(&relation.source)
                || !self.by_name.contains_key(&relation.target)
            {
                continue;
            }
            let key = (
                relation.source.clone(),
                relation.target.clone(),
                relation.relation_type.clone(),
            );
            match self.by_key.get(&key) {
                Some(&i) => {
                    let stored = &mut self.relations[i];
                    if stored.evidence.is_none() {
                        stored.evidence = relation.evidence.clone();
                    }
                }
                None => {
                    self.by_key.insert(key, self.relations.len());
                    self.relations.push(StoredRelation {
                        source: relation.source.clone(),
                        target: relation.target.clone(),
                        relation_type: relation.relation_type.clone(),
                        evidence: relation.evidence.clone(),
                    });
                }
            }
            applied += 1;
        }
        Ok(applied)
    }

    fn stats(&self) -> Result<GraphStats, KgError> {
        Ok(GraphStats {
            entity_count: self.entities.len(),
            relation_count: self.relations.len(),
        })
    }

    fn subgraph_by_keyword(&self, keyword: &str, limit: usize) -> Result<Subgraph, KgError> {
        let needle = keyword.to_lowercase();
        let mut picked = NodePicker::new(self.entities.len());
        let mut edge_seen = vec![false; self.relations.len()];
        let mut edges = Vec::new();
        let mut records = 0usize;

        'matches: for (index, entity) in self.entities.iter().enumerate() {
            if !entity.name.to_lowercase().contains(&needle) {
                continue;
            }
            let incident: Vec<usize> = self
                .relations
                .iter()
                .enumerate()
                .filter(|(_, r)| r.source == entity.name || r.target == entity.name)
                .map(|(i, _)| i)
                .collect();

            if incident.is_empty() {
                if records == limit {
                    break 'matches;
                }
                records += 1;
                picked.add(index);
                continue;
            }

            for ri in incident {
                if records == limit {
                    break 'matches;
                }
                records += 1;
                let relation = &self.relations[ri];
                let (Some(&s), Some(&t)) = (
                    self.by_name.get(&relation.source),
                    self.by_name.get(&relation.target),
                ) else {
                    continue;
                };
                picked.add(index);
                picked.add(if s == index { t } else { s });
                if !edge_seen[ri] {
                    edge_seen[ri] = true;
                    edges.push(SubgraphEdge {
                        source: Self::node_id(s),
                        target: Self::node_id(t),
                        edge_type: relation.relation_type.clone(),
                    });
                }
            }
        }

        Ok(Subgraph {
            nodes: picked.order.into_iter().map(|i| self.node(i)).collect(),
            edges,
        })
    }

    fn flush(&mut self) -> Result<(), KgError> {
        match &self.path {
            Some(path) => self.save(path),
            None => Ok(()),
        }
    }
}
