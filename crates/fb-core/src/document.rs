//! JSON document format: export snapshot and validated import.
//!
//! ```json
//! { "version": 1,
//!   "nodes": [ { "id": 1, "parentId": -1, "templateType": "action",
//!                "position": { "x": 100, "y": 100 },
//!                "size": { "width": 200, "height": 80 },
//!                "attributes": {} } ],
//!   "connections": [] }
//! ```
//!
//! `version` and `size` are optional. Nodes are written in pre-order so child
//! order survives a round-trip; on import, siblings keep the order in which
//! they appear in `nodes`.

use crate::error::GraphError;
use crate::id::{BlockId, TemplateId};
use crate::model::{Block, FlowGraph, Point, Size};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Current document format version.
pub const FORMAT_VERSION: u32 = 1;

/// `parentId` value for roots.
pub const NO_PARENT: i64 = -1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    /// Absent means version 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub nodes: Vec<NodeRecord>,
    pub connections: Vec<ConnectionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: u64,
    pub parent_id: i64,
    pub template_type: String,
    pub position: Point,
    /// Absent sizes fall back to the template catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub from_id: u64,
    pub to_id: u64,
}

impl GraphDocument {
    /// Parse a document without validating it against the tree rules.
    pub fn parse(json: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every structural rule and produce the blocks in pre-order.
    ///
    /// Nothing is touched here; a document that fails any rule is rejected
    /// whole with `MalformedData`.
    pub fn validate(&self, graph: &FlowGraph) -> Result<Vec<Block>, GraphError> {
        let malformed = |msg: String| GraphError::MalformedData(msg);

        if let Some(version) = self.version
            && version > FORMAT_VERSION
        {
            return Err(malformed(format!("unsupported document version {version}")));
        }

        let mut blocks: HashMap<BlockId, Block> = HashMap::with_capacity(self.nodes.len());
        let mut order = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let id = BlockId(node.id);
            if id > BlockId::MAX {
                return Err(malformed(format!(
                    "node id {} is larger than {}",
                    node.id,
                    BlockId::MAX.get()
                )));
            }
            let parent = match node.parent_id {
                NO_PARENT => None,
                p => match u64::try_from(p).map(BlockId) {
                    Ok(parent) if parent <= BlockId::MAX => Some(parent),
                    _ => return Err(malformed(format!("node {id} has invalid parentId {p}"))),
                },
            };
            if node.template_type.is_empty() {
                return Err(malformed(format!("node {id} has an empty templateType")));
            }
            let template = TemplateId::intern(&node.template_type);
            let size = node.size.unwrap_or_else(|| graph.catalog().size_of(template));
            let mut block = Block::new(id, template, size);
            block.parent = parent;
            block.position = node.position;
            block.attributes = node.attributes.clone();
            if blocks.insert(id, block).is_some() {
                return Err(malformed(format!("duplicate node id {id}")));
            }
            order.push(id);
        }

        // Parent links must point at known nodes and must not loop.
        let mut links: DiGraphMap<BlockId, ()> = DiGraphMap::new();
        for &id in &order {
            links.add_node(id);
        }
        for &id in &order {
            if let Some(parent) = blocks[&id].parent {
                if !blocks.contains_key(&parent) {
                    return Err(malformed(format!("node {id} references missing parent {parent}")));
                }
                links.add_edge(parent, id, ());
            }
        }
        if let Err(cycle) = toposort(&links, None) {
            return Err(malformed(format!(
                "parent links form a cycle through {}",
                cycle.node_id()
            )));
        }

        // Connections must describe exactly the parent links.
        let expected: HashSet<(BlockId, BlockId)> = order
            .iter()
            .filter_map(|&id| blocks[&id].parent.map(|p| (p, id)))
            .collect();
        let mut seen = HashSet::with_capacity(self.connections.len());
        for conn in &self.connections {
            let edge = (BlockId(conn.from_id), BlockId(conn.to_id));
            if !expected.contains(&edge) {
                return Err(malformed(format!(
                    "connection {} -> {} does not match any parentId",
                    edge.0, edge.1
                )));
            }
            if !seen.insert(edge) {
                return Err(malformed(format!("duplicate connection {} -> {}", edge.0, edge.1)));
            }
        }
        if seen.len() != expected.len() {
            let missing = expected.iter().filter(|e| !seen.contains(*e)).min();
            if let Some((from, to)) = missing {
                return Err(malformed(format!("missing connection {from} -> {to}")));
            }
        }

        // Children keep the order in which they appear in `nodes`.
        let mut children: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        let mut roots = Vec::new();
        for &id in &order {
            match blocks[&id].parent {
                Some(p) => children.entry(p).or_default().push(id),
                None => roots.push(id),
            }
        }
        let mut out = Vec::with_capacity(order.len());
        let mut stack: Vec<BlockId> = roots.into_iter().rev().collect();
        while let Some(id) = stack.pop() {
            if let Some(block) = blocks.remove(&id) {
                out.push(block);
            }
            if let Some(kids) = children.get(&id) {
                stack.extend(kids.iter().rev().copied());
            }
        }
        Ok(out)
    }
}

impl FlowGraph {
    /// Snapshot every block and link, in pre-order.
    ///
    /// # Errors
    /// Returns `IdOutOfRange` if a parent id cannot be written as a `parentId`.
    pub fn to_document(&self) -> Result<GraphDocument, GraphError> {
        let blocks = self.iter_preorder();
        let nodes = blocks
            .iter()
            .map(|b| {
                let parent_id = match b.parent {
                    Some(p) => i64::try_from(p.get()).map_err(|_| GraphError::IdOutOfRange(p))?,
                    None => NO_PARENT,
                };
                Ok(NodeRecord {
                    id: b.id.get(),
                    parent_id,
                    template_type: b.template.as_str().to_string(),
                    position: b.position,
                    size: Some(b.size),
                    attributes: b.attributes.clone(),
                })
            })
            .collect::<Result<Vec<_>, GraphError>>()?;
        let connections = blocks
            .iter()
            .filter_map(|b| {
                b.parent.map(|p| ConnectionRecord {
                    from_id: p.get(),
                    to_id: b.id.get(),
                })
            })
            .collect();
        Ok(GraphDocument {
            version: Some(FORMAT_VERSION),
            nodes,
            connections,
        })
    }

    /// Replace the whole graph with `document`. On error the graph is untouched.
    ///
    /// Positions are taken verbatim. Ids already handed out by this graph
    /// stay reserved, so ids are never reused across an import.
    pub fn import_document(&mut self, document: &GraphDocument) -> Result<(), GraphError> {
        let blocks = document.validate(self)?;
        log::debug!("importing {} blocks", blocks.len());
        self.replace_all(blocks);
        Ok(())
    }

    /// Build a fresh graph from `document`.
    pub fn from_document(document: &GraphDocument) -> Result<Self, GraphError> {
        let mut graph = FlowGraph::new();
        graph.import_document(document)?;
        graph.drain_events();
        Ok(graph)
    }
}

/// Parse and validate JSON into a fresh graph.
pub fn parse_document(json: &str) -> Result<FlowGraph, GraphError> {
    FlowGraph::from_document(&GraphDocument::parse(json)?)
}
