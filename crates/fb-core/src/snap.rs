//! Snap resolution: drop point → target parent.
//!
//! Every block exposes a drop zone directly beneath it. A drop whose probe
//! point lands in a zone attaches the dragged block as the rightmost child of
//! that zone's block; a drop outside every zone starts a new root.

use crate::config::SnapConfig;
use crate::id::BlockId;
use crate::model::{Block, Bounds, FlowGraph, Point, Size};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Where a drop would land.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SnapTarget {
    /// No zone matched: the block becomes a new root at `at`.
    Root { at: Point },
    /// Attach under `parent` at sibling slot `index`.
    Child { parent: BlockId, index: usize },
}

impl SnapTarget {
    pub fn parent(&self) -> Option<BlockId> {
        match self {
            SnapTarget::Root { .. } => None,
            SnapTarget::Child { parent, .. } => Some(*parent),
        }
    }
}

/// The rectangle below `block` that accepts drops.
pub fn drop_zone(block: &Block, config: &SnapConfig) -> Bounds {
    let b = block.bounds();
    Bounds {
        x: b.x - config.margin,
        y: b.bottom(),
        width: b.width + 2.0 * config.margin,
        height: config.depth,
    }
}

/// The point tested against drop zones: top-center of the dragged block
/// when its top-left corner is at `drop_point`.
pub fn probe_point(drop_point: Point, dragged_size: Size) -> Point {
    Point::new(drop_point.x + dragged_size.width / 2.0, drop_point.y)
}

/// Resolve a drop of a block of `dragged_size` whose top-left lands on `drop_point`.
///
/// `exclude` (and its whole subtree) never becomes a candidate, so a block
/// cannot be attached below itself. Overlapping zones are tie-broken by the
/// horizontal distance from the zone center to the probe, then by lowest id.
pub fn resolve(
    graph: &FlowGraph,
    config: &SnapConfig,
    drop_point: Point,
    dragged_size: Size,
    exclude: Option<BlockId>,
) -> SnapTarget {
    let excluded: HashSet<BlockId> = exclude
        .and_then(|id| graph.subtree_ids(id).ok())
        .map(|ids| ids.into_iter().collect())
        .unwrap_or_default();
    let probe = probe_point(drop_point, dragged_size);

    let mut best: Option<(f32, BlockId)> = None;
    for block in graph.iter_preorder() {
        if excluded.contains(&block.id) {
            continue;
        }
        let zone = drop_zone(block, config);
        if !zone.contains(probe.x, probe.y) {
            continue;
        }
        let distance = (zone.center().0 - probe.x).abs();
        log::trace!("probe {probe:?} inside zone of {} (dx {distance})", block.id);
        let better = match best {
            None => true,
            Some((d, id)) => distance < d || (distance == d && block.id < id),
        };
        if better {
            best = Some((distance, block.id));
        }
    }

    match best {
        Some((_, parent)) => {
            let index = graph.block(parent).map_or(0, |p| {
                p.children
                    .iter()
                    .filter(|c| Some(**c) != exclude)
                    .count()
            });
            SnapTarget::Child { parent, index }
        }
        None => SnapTarget::Root { at: drop_point },
    }
}
