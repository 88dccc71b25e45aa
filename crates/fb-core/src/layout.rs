//! Tree layout solver.
//!
//! Positions every block of a root tree in two passes: a post-order pass
//! computes subtree widths, then a pre-order pass centers each sibling group
//! beneath its parent and bands rows by depth. A width change anywhere in a
//! tree can move every block in it, and a growing tree can push the trees
//! after it aside, so layout always re-solves the whole forest rather than
//! patching locally.

use crate::config::{LayoutConfig, RootPlacement};
use crate::error::GraphError;
use crate::id::BlockId;
use crate::model::{FlowGraph, Point};
use std::collections::HashMap;

/// Overlaps below this many pixels are float noise, not a collision.
const OVERLAP_EPSILON: f32 = 0.5;

/// Compute positions for every laid-out block without touching the graph.
///
/// `excluded` (a block being dragged) and its subtree are left out, so its
/// siblings close the gap as if it were not there.
pub fn compute_layout(
    graph: &FlowGraph,
    config: &LayoutConfig,
    excluded: Option<BlockId>,
) -> HashMap<BlockId, Point> {
    let mut positions = HashMap::with_capacity(graph.len());
    let mut widths = HashMap::new();

    match config.root_placement {
        RootPlacement::Anchored => {
            layout_anchored_roots(graph, config, excluded, &mut widths, &mut positions);
        }
        RootPlacement::Row => {
            layout_root_row(graph, config, excluded, &mut widths, &mut positions);
        }
    }
    positions
}

/// Recompute and store positions after a change at `from`.
///
/// Widths ripple up to the root and centering ripples back down, and a tree
/// that grows may push later trees aside, so every tree is re-solved. Trees
/// that are already settled do not move. Returns the ids whose position
/// changed.
pub fn relayout(
    graph: &mut FlowGraph,
    from: BlockId,
    config: &LayoutConfig,
) -> Result<Vec<BlockId>, GraphError> {
    graph.get(from)?;
    relayout_all(graph, config)
}

/// Re-solve every tree.
pub fn relayout_all(graph: &mut FlowGraph, config: &LayoutConfig) -> Result<Vec<BlockId>, GraphError> {
    let positions = sorted(compute_layout(graph, config, None));
    apply(graph, positions)
}

fn sorted(positions: HashMap<BlockId, Point>) -> Vec<(BlockId, Point)> {
    let mut positions: Vec<(BlockId, Point)> = positions.into_iter().collect();
    positions.sort_by_key(|(id, _)| *id);
    positions
}

fn apply(graph: &mut FlowGraph, positions: Vec<(BlockId, Point)>) -> Result<Vec<BlockId>, GraphError> {
    let mut moved = Vec::new();
    for (id, position) in positions {
        if graph.get(id)?.position != position {
            graph.set_position(id, position)?;
            moved.push(id);
        }
    }
    log::trace!("layout moved {} blocks", moved.len());
    Ok(moved)
}

/// The rectangle a laid-out root tree claims: its horizontal band, from the
/// root's top edge down to the bottom of its lowest block.
#[derive(Debug, Clone, Copy)]
struct TreeExtent {
    left: f32,
    right: f32,
    top: f32,
    bottom: f32,
}

impl TreeExtent {
    fn collides(&self, other: &TreeExtent) -> bool {
        self.left < other.right - OVERLAP_EPSILON
            && other.left < self.right - OVERLAP_EPSILON
            && self.top < other.bottom
            && other.top < self.bottom
    }
}

/// Anchor each tree at its root, then push it right past any earlier tree
/// (in root-list order) whose extent it would overlap.
fn layout_anchored_roots(
    graph: &FlowGraph,
    config: &LayoutConfig,
    excluded: Option<BlockId>,
    widths: &mut HashMap<BlockId, f32>,
    positions: &mut HashMap<BlockId, Point>,
) {
    let mut placed: Vec<TreeExtent> = Vec::new();
    for &root in graph.root_ids() {
        if Some(root) == excluded {
            continue;
        }
        let mut tree = HashMap::new();
        let Some(mut extent) = layout_anchored(graph, root, config, excluded, widths, &mut tree) else {
            continue;
        };

        let mut shift = 0.0;
        while let Some(blocker) = placed.iter().find(|p| p.collides(&extent)) {
            let step = blocker.right + config.sibling_gap - extent.left;
            extent.left += step;
            extent.right += step;
            shift += step;
        }
        if shift != 0.0 {
            log::trace!("root {root} pushed right by {shift}");
            for point in tree.values_mut() {
                point.x += shift;
            }
        }
        placed.push(extent);
        positions.extend(tree);
    }
}

fn layout_anchored(
    graph: &FlowGraph,
    root: BlockId,
    config: &LayoutConfig,
    excluded: Option<BlockId>,
    widths: &mut HashMap<BlockId, f32>,
    positions: &mut HashMap<BlockId, Point>,
) -> Option<TreeExtent> {
    let block = graph.block(root)?;
    let width = subtree_width(graph, root, config, excluded, widths);
    let center_x = block.position.x + block.size.width / 2.0;
    place(graph, root, center_x, block.position.y, config, excluded, widths, positions);

    let bottom = positions
        .iter()
        .filter_map(|(id, p)| graph.block(*id).map(|b| p.y + b.size.height))
        .fold(block.position.y + block.size.height, f32::max);
    Some(TreeExtent {
        left: center_x - width / 2.0,
        right: center_x + width / 2.0,
        top: block.position.y,
        bottom,
    })
}

fn layout_root_row(
    graph: &FlowGraph,
    config: &LayoutConfig,
    excluded: Option<BlockId>,
    widths: &mut HashMap<BlockId, f32>,
    positions: &mut HashMap<BlockId, Point>,
) {
    let mut cursor = config.root_origin.x;
    for &root in graph.root_ids() {
        if Some(root) == excluded {
            continue;
        }
        let width = subtree_width(graph, root, config, excluded, widths);
        place(
            graph,
            root,
            cursor + width / 2.0,
            config.root_origin.y,
            config,
            excluded,
            widths,
            positions,
        );
        cursor += width + config.sibling_gap;
    }
}

/// Children of `id` that take part in layout.
fn visible_children(graph: &FlowGraph, id: BlockId, excluded: Option<BlockId>) -> Vec<BlockId> {
    graph
        .block(id)
        .map(|b| {
            b.children
                .iter()
                .copied()
                .filter(|c| Some(*c) != excluded)
                .collect()
        })
        .unwrap_or_default()
}

/// Width of the horizontal band the subtree at `id` occupies (post-order, memoized).
fn subtree_width(
    graph: &FlowGraph,
    id: BlockId,
    config: &LayoutConfig,
    excluded: Option<BlockId>,
    widths: &mut HashMap<BlockId, f32>,
) -> f32 {
    if let Some(w) = widths.get(&id) {
        return *w;
    }
    let own = graph.block(id).map_or(0.0, |b| b.size.width);
    let children = visible_children(graph, id, excluded);
    let width = if children.is_empty() {
        own
    } else {
        own.max(children_span(graph, &children, config, excluded, widths))
    };
    widths.insert(id, width);
    width
}

fn children_span(
    graph: &FlowGraph,
    children: &[BlockId],
    config: &LayoutConfig,
    excluded: Option<BlockId>,
    widths: &mut HashMap<BlockId, f32>,
) -> f32 {
    let total: f32 = children
        .iter()
        .map(|&c| subtree_width(graph, c, config, excluded, widths))
        .sum();
    total + config.sibling_gap * (children.len().saturating_sub(1)) as f32
}

#[allow(clippy::too_many_arguments)]
fn place(
    graph: &FlowGraph,
    id: BlockId,
    center_x: f32,
    y: f32,
    config: &LayoutConfig,
    excluded: Option<BlockId>,
    widths: &mut HashMap<BlockId, f32>,
    positions: &mut HashMap<BlockId, Point>,
) {
    let Some(block) = graph.block(id) else {
        return;
    };
    positions.insert(id, Point::new(center_x - block.size.width / 2.0, y));

    let children = visible_children(graph, id, excluded);
    if children.is_empty() {
        return;
    }
    let span = children_span(graph, &children, config, excluded, widths);
    let child_y = y + config.row_height;
    let mut cursor = center_x - span / 2.0;
    for child in children {
        let width = subtree_width(graph, child, config, excluded, widths);
        place(graph, child, cursor + width / 2.0, child_y, config, excluded, widths, positions);
        cursor += width + config.sibling_gap;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::TemplateId;
    use std::collections::BTreeMap;

    fn add(graph: &mut FlowGraph, parent: Option<BlockId>) -> BlockId {
        graph
            .create_block(TemplateId::intern("action"), parent, BTreeMap::new())
            .unwrap()
            .id
    }

    #[test]
    fn single_child_sits_straight_below() {
        let config = LayoutConfig::default();
        let mut g = FlowGraph::new();
        let a = add(&mut g, None);
        g.set_position(a, Point::new(100.0, 100.0)).unwrap();
        let b = add(&mut g, Some(a));

        relayout(&mut g, b, &config).unwrap();
        let b = g.get(b).unwrap();
        assert_eq!(b.position, Point::new(100.0, 100.0 + config.row_height));
    }

    #[test]
    fn siblings_are_centered_under_parent() {
        let config = LayoutConfig::default();
        let mut g = FlowGraph::new();
        let a = add(&mut g, None);
        g.set_position(a, Point::new(100.0, 100.0)).unwrap();
        let b = add(&mut g, Some(a));
        let c = add(&mut g, Some(a));

        relayout(&mut g, c, &config).unwrap();
        let (ax, bx, cx) = (
            g.get(a).unwrap().position.x,
            g.get(b).unwrap().position.x,
            g.get(c).unwrap().position.x,
        );
        assert_eq!(ax, (bx + cx) / 2.0);
        // 200 wide blocks + 40 gap
        assert_eq!(cx - bx, 240.0);
    }

    #[test]
    fn deep_subtree_widens_its_branch() {
        let config = LayoutConfig::default();
        let mut g = FlowGraph::new();
        let a = add(&mut g, None);
        let b = add(&mut g, Some(a));
        let c = add(&mut g, Some(a));
        let b1 = add(&mut g, Some(b));
        let b2 = add(&mut g, Some(b));

        relayout(&mut g, b2, &config).unwrap();
        let pos = |id| g.get(id).unwrap().position;
        // b's band is 440 wide, c's is 200; c starts one gap after b's band.
        assert_eq!(pos(c).x - pos(b1).x, 440.0 + 40.0);
        assert_eq!(pos(b).x, (pos(b1).x + pos(b2).x) / 2.0);
        assert_eq!(pos(b1).y, pos(a).y + 2.0 * config.row_height);
    }

    #[test]
    fn excluded_block_leaves_no_gap() {
        let config = LayoutConfig::default();
        let mut g = FlowGraph::new();
        let a = add(&mut g, None);
        let b = add(&mut g, Some(a));
        let c = add(&mut g, Some(a));
        relayout(&mut g, a, &config).unwrap();

        let preview = compute_layout(&g, &config, Some(b));
        assert!(!preview.contains_key(&b));
        // c alone is centered under a.
        assert_eq!(preview[&c].x, g.get(a).unwrap().position.x);
    }

    #[test]
    fn row_placement_packs_roots() {
        let config = LayoutConfig {
            root_placement: RootPlacement::Row,
            ..LayoutConfig::default()
        };
        let mut g = FlowGraph::new();
        let a = add(&mut g, None);
        let _a1 = add(&mut g, Some(a));
        let _a2 = add(&mut g, Some(a));
        let d = add(&mut g, None);

        relayout_all(&mut g, &config).unwrap();
        let a_pos = g.get(a).unwrap().position;
        let d_pos = g.get(d).unwrap().position;
        assert_eq!(a_pos.y, config.root_origin.y);
        assert_eq!(d_pos.y, config.root_origin.y);
        // a's tree is 440 wide starting at the origin.
        assert_eq!(d_pos.x, config.root_origin.x + 440.0 + 40.0);
    }

    #[test]
    fn relayout_reports_only_moved_blocks() {
        let config = LayoutConfig::default();
        let mut g = FlowGraph::new();
        let a = add(&mut g, None);
        let b = add(&mut g, Some(a));
        relayout(&mut g, b, &config).unwrap();
        assert!(relayout(&mut g, b, &config).unwrap().is_empty());
    }

    #[test]
    fn roots_dropped_on_the_same_spot_are_pushed_apart() {
        let config = LayoutConfig::default();
        let mut g = FlowGraph::new();
        let a = add(&mut g, None);
        let d = add(&mut g, None);
        g.set_position(a, Point::new(100.0, 100.0)).unwrap();
        g.set_position(d, Point::new(100.0, 100.0)).unwrap();

        relayout_all(&mut g, &config).unwrap();
        assert_eq!(g.get(a).unwrap().position, Point::new(100.0, 100.0));
        assert_eq!(g.get(d).unwrap().position, Point::new(340.0, 100.0));
        // Settled trees stay put on the next pass.
        assert!(relayout_all(&mut g, &config).unwrap().is_empty());
    }

    #[test]
    fn growing_tree_pushes_the_next_tree_aside() {
        let config = LayoutConfig::default();
        let mut g = FlowGraph::new();
        let a = add(&mut g, None);
        let d = add(&mut g, None);
        g.set_position(a, Point::new(100.0, 100.0)).unwrap();
        g.set_position(d, Point::new(400.0, 100.0)).unwrap();
        add(&mut g, Some(a));
        relayout_all(&mut g, &config).unwrap();
        assert_eq!(g.get(d).unwrap().position.x, 400.0);

        // A's band grows to [-20, 420], which runs into D.
        let c = add(&mut g, Some(a));
        let moved = relayout(&mut g, c, &config).unwrap();
        assert!(moved.contains(&d));
        assert_eq!(g.get(d).unwrap().position.x, 420.0 + config.sibling_gap);

        // Trees on separate rows do not push each other.
        let low = add(&mut g, None);
        g.set_position(low, Point::new(100.0, 900.0)).unwrap();
        relayout_all(&mut g, &config).unwrap();
        assert_eq!(g.get(low).unwrap().position, Point::new(100.0, 900.0));
    }
}
