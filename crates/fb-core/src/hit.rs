//! Hit testing: point → block lookup.
//!
//! Blocks are painted in id order, so the highest id under a point is the
//! one on top.

use crate::id::BlockId;
use crate::model::{Bounds, FlowGraph, Point};

/// Find the topmost block at `point`.
/// Returns `None` if no block is hit (background).
pub fn hit_test(graph: &FlowGraph, point: Point) -> Option<BlockId> {
    graph
        .iter_preorder()
        .into_iter()
        .filter(|b| b.bounds().contains(point.x, point.y))
        .map(|b| b.id)
        .max()
}

/// Find all blocks whose bounds intersect `rect`, in pre-order.
/// Used for marquee (box) selection.
pub fn hit_test_rect(graph: &FlowGraph, rect: Bounds) -> Vec<BlockId> {
    graph
        .iter_preorder()
        .into_iter()
        .filter(|b| b.bounds().intersects(&rect))
        .map(|b| b.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::TemplateId;
    use std::collections::BTreeMap;

    fn graph_with_overlap() -> (FlowGraph, BlockId, BlockId) {
        let mut g = FlowGraph::new();
        let t = TemplateId::intern("action");
        let a = g.create_block(t, None, BTreeMap::new()).unwrap().id;
        let b = g.create_block(t, None, BTreeMap::new()).unwrap().id;
        g.set_position(a, Point::new(0.0, 0.0)).unwrap();
        g.set_position(b, Point::new(150.0, 40.0)).unwrap();
        (g, a, b)
    }

    #[test]
    fn hit_returns_topmost() {
        let (g, a, b) = graph_with_overlap();
        assert_eq!(hit_test(&g, Point::new(10.0, 10.0)), Some(a));
        // Inside both: later block is on top.
        assert_eq!(hit_test(&g, Point::new(180.0, 60.0)), Some(b));
    }

    #[test]
    fn hit_background_is_none() {
        let (g, _, _) = graph_with_overlap();
        assert_eq!(hit_test(&g, Point::new(900.0, 900.0)), None);
    }

    #[test]
    fn rect_selection_collects_intersecting() {
        let (g, a, b) = graph_with_overlap();
        let rect = Bounds {
            x: 0.0,
            y: 0.0,
            width: 50.0,
            height: 50.0,
        };
        assert_eq!(hit_test_rect(&g, rect), vec![a]);
        let all = Bounds {
            width: 1000.0,
            height: 1000.0,
            ..rect
        };
        assert_eq!(hit_test_rect(&g, all), vec![a, b]);
    }
}
