//! Connector geometry for parent → child edges.
//!
//! Arrows are derived data: one per non-root block, leaving the parent's
//! bottom-center and entering the child's top-center. The renderer caches
//! them and recomputes only the edges touching blocks the layout moved.

use crate::config::{ArrowConfig, ArrowRouting};
use crate::error::GraphError;
use crate::id::BlockId;
use crate::model::{Block, FlowGraph, Point};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};

/// A single path command (SVG-like but simplified).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum PathCmd {
    MoveTo { x: f32, y: f32 },
    LineTo { x: f32, y: f32 },
    CubicTo {
        c1x: f32,
        c1y: f32,
        c2x: f32,
        c2y: f32,
        x: f32,
        y: f32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Arrow {
    /// The parent.
    pub from_id: BlockId,
    /// The child.
    pub to_id: BlockId,
    pub path: SmallVec<[PathCmd; 4]>,
}

impl Arrow {
    /// Convert to a `kurbo` path for hosts that paint with kurbo-based renderers.
    pub fn to_bez_path(&self) -> kurbo::BezPath {
        let mut path = kurbo::BezPath::new();
        for cmd in &self.path {
            match *cmd {
                PathCmd::MoveTo { x, y } => path.move_to((x as f64, y as f64)),
                PathCmd::LineTo { x, y } => path.line_to((x as f64, y as f64)),
                PathCmd::CubicTo {
                    c1x,
                    c1y,
                    c2x,
                    c2y,
                    x,
                    y,
                } => path.curve_to(
                    (c1x as f64, c1y as f64),
                    (c2x as f64, c2y as f64),
                    (x as f64, y as f64),
                ),
            }
        }
        path
    }

    pub fn start(&self) -> Option<Point> {
        match self.path.first() {
            Some(PathCmd::MoveTo { x, y }) => Some(Point::new(*x, *y)),
            _ => None,
        }
    }

    pub fn end(&self) -> Option<Point> {
        match self.path.last() {
            Some(PathCmd::LineTo { x, y } | PathCmd::CubicTo { x, y, .. }) => Some(Point::new(*x, *y)),
            _ => None,
        }
    }
}

/// Build the connector between `parent` and `child`.
pub fn route(parent: &Block, child: &Block, routing: ArrowRouting) -> Arrow {
    let start = parent.bottom_center();
    let end = child.top_center();
    let mid_y = start.y + (end.y - start.y) / 2.0;

    let mut path = SmallVec::new();
    path.push(PathCmd::MoveTo {
        x: start.x,
        y: start.y,
    });
    match routing {
        ArrowRouting::Elbow if start.x != end.x => {
            path.push(PathCmd::LineTo {
                x: start.x,
                y: mid_y,
            });
            path.push(PathCmd::LineTo { x: end.x, y: mid_y });
            path.push(PathCmd::LineTo { x: end.x, y: end.y });
        }
        ArrowRouting::Curve => path.push(PathCmd::CubicTo {
            c1x: start.x,
            c1y: mid_y,
            c2x: end.x,
            c2y: mid_y,
            x: end.x,
            y: end.y,
        }),
        ArrowRouting::Elbow | ArrowRouting::Straight => {
            path.push(PathCmd::LineTo { x: end.x, y: end.y });
        }
    }

    Arrow {
        from_id: parent.id,
        to_id: child.id,
        path,
    }
}

/// Cache of arrows keyed by child id.
#[derive(Debug, Clone, Default)]
pub struct ArrowRenderer {
    config: ArrowConfig,
    arrows: BTreeMap<BlockId, Arrow>,
}

impl ArrowRenderer {
    pub fn new(config: ArrowConfig) -> Self {
        Self {
            config,
            arrows: BTreeMap::new(),
        }
    }

    /// Recompute the edges touching `affected`: each block's incoming edge
    /// and the edges to its children. Must run after layout has settled.
    ///
    /// Returns the child ids of the refreshed arrows.
    pub fn refresh_edges(&mut self, graph: &FlowGraph, affected: &[BlockId]) -> Vec<BlockId> {
        let mut edges: BTreeSet<BlockId> = BTreeSet::new();
        for &id in affected {
            let Some(block) = graph.block(id) else {
                // Removed blocks take their incoming arrow with them.
                self.arrows.remove(&id);
                continue;
            };
            if block.parent.is_some() {
                edges.insert(id);
            } else {
                self.arrows.remove(&id);
            }
            edges.extend(block.children.iter().copied());
        }

        let mut refreshed = Vec::with_capacity(edges.len());
        for child in edges {
            match self.route_edge(graph, child) {
                Ok(Some(arrow)) => {
                    self.arrows.insert(child, arrow);
                    refreshed.push(child);
                }
                Ok(None) => {
                    self.arrows.remove(&child);
                }
                Err(err) => {
                    log::error!("skipping arrow: {err}");
                    debug_assert!(false, "{err}");
                    self.arrows.remove(&child);
                }
            }
        }
        refreshed
    }

    fn route_edge(&self, graph: &FlowGraph, child: BlockId) -> Result<Option<Arrow>, GraphError> {
        let Some(block) = graph.block(child) else {
            return Ok(None);
        };
        let Some(parent_id) = block.parent else {
            return Ok(None);
        };
        let parent = graph.block(parent_id).ok_or(GraphError::DanglingEdge {
            from: parent_id,
            to: child,
        })?;
        Ok(Some(route(parent, block, self.config.routing)))
    }

    /// Drop the cached arrows ending at any of `ids`.
    pub fn forget(&mut self, ids: &[BlockId]) {
        for id in ids {
            self.arrows.remove(id);
        }
    }

    /// Recompute every arrow from scratch.
    pub fn rebuild(&mut self, graph: &FlowGraph) {
        self.arrows.clear();
        let ids: Vec<BlockId> = graph.iter_preorder().iter().map(|b| b.id).collect();
        self.refresh_edges(graph, &ids);
    }

    pub fn get(&self, child: BlockId) -> Option<&Arrow> {
        self.arrows.get(&child)
    }

    /// Arrows ordered by child id.
    pub fn arrows(&self) -> impl Iterator<Item = &Arrow> {
        self.arrows.values()
    }

    pub fn len(&self) -> usize {
        self.arrows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrows.is_empty()
    }

    /// Arrows that reference any of `ids` at either end.
    pub fn touching(&self, ids: &[BlockId]) -> Vec<&Arrow> {
        self.arrows
            .values()
            .filter(|a| ids.contains(&a.from_id) || ids.contains(&a.to_id))
            .collect()
    }
}
