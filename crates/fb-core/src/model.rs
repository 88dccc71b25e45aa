//! Block graph data model and the graph store.
//!
//! The diagram is a forest: every block has at most one parent and an
//! ordered list of children (insertion order = left-to-right). Blocks with
//! no parent are roots, kept in their own ordered list. `FlowGraph` owns all
//! of it and is the only place parent links change; every structural change
//! queues a `GraphEvent` for the editor to drain.

use crate::config::TemplateCatalog;
use crate::error::GraphError;
use crate::events::GraphEvent;
use crate::id::{BlockId, IdAllocator, TemplateId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap, HashSet};

// ─── Geometry ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned rectangle in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn from_origin_size(origin: Point, size: Size) -> Self {
        Self {
            x: origin.x,
            y: origin.y,
            width: size.width,
            height: size.height,
        }
    }

    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// AABB overlap test; touching edges do not count.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }
}

// ─── Blocks ──────────────────────────────────────────────────────────────

/// A node of the diagram, instantiated from a palette template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    /// `None` for roots.
    pub parent: Option<BlockId>,
    /// Top-left anchor. Written only by the layout engine (or restored verbatim by undo/import).
    pub position: Point,
    /// Given by the template catalog or the imported document; layout treats it as read-only.
    pub size: Size,
    /// Ordered left-to-right.
    pub children: SmallVec<[BlockId; 4]>,
    pub template: TemplateId,
    /// Free-form rendered content, opaque to the core.
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Block {
    pub fn new(id: BlockId, template: TemplateId, size: Size) -> Self {
        Self {
            id,
            parent: None,
            position: Point::ORIGIN,
            size,
            children: SmallVec::new(),
            template,
            attributes: BTreeMap::new(),
        }
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::from_origin_size(self.position, self.size)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Anchor where arrows leave this block towards its children.
    pub fn bottom_center(&self) -> Point {
        Point::new(self.position.x + self.size.width / 2.0, self.position.y + self.size.height)
    }

    /// Anchor where the arrow from the parent enters this block.
    pub fn top_center(&self) -> Point {
        Point::new(self.position.x + self.size.width / 2.0, self.position.y)
    }
}

// ─── Graph store ─────────────────────────────────────────────────────────

/// The authoritative set of blocks and parent links.
///
/// Cloning is cheap enough to use as a transaction checkpoint: the editor
/// clones before a compound operation and restores the clone on failure.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    blocks: HashMap<BlockId, Block>,
    roots: Vec<BlockId>,
    ids: IdAllocator,
    catalog: TemplateCatalog,
    pending: Vec<GraphEvent>,
}

impl FlowGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty graph whose new blocks take their size from `catalog`.
    #[must_use]
    pub fn with_catalog(catalog: TemplateCatalog) -> Self {
        Self {
            catalog,
            ..Self::default()
        }
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.blocks.contains_key(&id)
    }

    /// The id the next created block will receive.
    pub fn next_id(&self) -> BlockId {
        self.ids.peek()
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    pub fn get(&self, id: BlockId) -> Result<&Block, GraphError> {
        self.blocks.get(&id).ok_or(GraphError::UnknownBlock(id))
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(&id)
    }

    pub fn children(&self, id: BlockId) -> Result<Vec<&Block>, GraphError> {
        let block = self.get(id)?;
        Ok(block
            .children
            .iter()
            .filter_map(|child| self.blocks.get(child))
            .collect())
    }

    pub fn roots(&self) -> Vec<&Block> {
        self.roots
            .iter()
            .filter_map(|id| self.blocks.get(id))
            .collect()
    }

    pub fn root_ids(&self) -> &[BlockId] {
        &self.roots
    }

    /// Blocks in deterministic pre-order: roots left-to-right, each followed by its subtree.
    pub fn iter_preorder(&self) -> Vec<&Block> {
        let mut out = Vec::with_capacity(self.blocks.len());
        for &root in &self.roots {
            self.collect_preorder(root, &mut out);
        }
        out
    }

    fn collect_preorder<'a>(&'a self, id: BlockId, out: &mut Vec<&'a Block>) {
        if let Some(block) = self.blocks.get(&id) {
            out.push(block);
            for &child in &block.children {
                self.collect_preorder(child, out);
            }
        }
    }

    /// `id` followed by all its descendants, pre-order.
    pub fn subtree_ids(&self, id: BlockId) -> Result<Vec<BlockId>, GraphError> {
        self.get(id)?;
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(block) = self.blocks.get(&current) {
                stack.extend(block.children.iter().rev().copied());
            }
        }
        Ok(out)
    }

    /// Check if `ancestor` is a parent/grandparent/etc. of `descendant`.
    pub fn is_ancestor_of(&self, ancestor: BlockId, descendant: BlockId) -> bool {
        if ancestor == descendant {
            return false;
        }
        let mut current = self.blocks.get(&descendant).and_then(|b| b.parent);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.blocks.get(&parent).and_then(|b| b.parent);
        }
        false
    }

    /// The root of the tree containing `id`.
    pub fn root_of(&self, id: BlockId) -> Result<BlockId, GraphError> {
        let mut current = self.get(id)?;
        while let Some(parent) = current.parent {
            current = self.get(parent)?;
        }
        Ok(current.id)
    }

    /// Where `id` sits among its siblings (or in the root list).
    pub fn sibling_index(&self, id: BlockId) -> Result<usize, GraphError> {
        let block = self.get(id)?;
        let siblings: &[BlockId] = match block.parent {
            Some(parent) => &self.get(parent)?.children,
            None => &self.roots,
        };
        siblings
            .iter()
            .position(|&s| s == id)
            .ok_or(GraphError::UnknownBlock(id))
    }

    // ─── Mutations ───────────────────────────────────────────────────────

    /// Create a new block under `parent` (or as a new root).
    ///
    /// The block is appended as the rightmost child. Its position is left at
    /// the origin; the caller is expected to run layout (or place the root)
    /// before the block is considered placed.
    pub fn create_block(
        &mut self,
        template: TemplateId,
        parent: Option<BlockId>,
        attributes: BTreeMap<String, serde_json::Value>,
    ) -> Result<&Block, GraphError> {
        if let Some(parent) = parent
            && !self.blocks.contains_key(&parent)
        {
            return Err(GraphError::InvalidParent(parent));
        }

        let id = self
            .ids
            .allocate()
            .ok_or(GraphError::IdOutOfRange(self.ids.peek()))?;
        let mut block = Block::new(id, template, self.catalog.size_of(template));
        block.parent = parent;
        block.attributes = attributes;

        self.attach(id, parent, None);
        self.blocks.insert(id, block);
        self.pending.push(GraphEvent::NodeAdded { id });
        if let Some(parent) = parent {
            self.pending.push(GraphEvent::ConnectionAdded {
                from_id: parent,
                to_id: id,
            });
        }
        log::trace!("created {id} ({template}) under {parent:?}");
        self.get(id)
    }

    /// Remove `id` and its whole subtree. Returns the removed blocks in pre-order.
    pub fn delete_subtree(&mut self, id: BlockId) -> Result<Vec<Block>, GraphError> {
        let ids = self.subtree_ids(id)?;
        let parent = self.get(id)?.parent;
        self.detach(id, parent);

        let mut removed = Vec::with_capacity(ids.len());
        for current in ids {
            if let Some(block) = self.blocks.remove(&current) {
                if let Some(p) = block.parent {
                    self.pending.push(GraphEvent::ConnectionRemoved {
                        from_id: p,
                        to_id: current,
                    });
                }
                self.pending.push(GraphEvent::NodeRemoved { id: current });
                removed.push(block);
            }
        }
        log::trace!("deleted subtree of {id} ({} blocks)", removed.len());
        Ok(removed)
    }

    /// Move `id` under `new_parent` as its rightmost child, or detach it into
    /// a new root when `new_parent` is `None`.
    pub fn reparent(&mut self, id: BlockId, new_parent: Option<BlockId>) -> Result<(), GraphError> {
        self.reparent_at(id, new_parent, None)
    }

    /// Like `reparent`, but inserts at `index` among the new siblings (clamped).
    pub fn reparent_at(
        &mut self,
        id: BlockId,
        new_parent: Option<BlockId>,
        index: Option<usize>,
    ) -> Result<(), GraphError> {
        let old_parent = self.get(id)?.parent;
        if let Some(parent) = new_parent {
            if !self.blocks.contains_key(&parent) {
                return Err(GraphError::UnknownParent(parent));
            }
            if parent == id || self.is_ancestor_of(id, parent) {
                return Err(GraphError::CycleDetected { block: id, parent });
            }
        }

        self.detach(id, old_parent);
        self.attach(id, new_parent, index);
        if let Some(block) = self.blocks.get_mut(&id) {
            block.parent = new_parent;
        }

        if old_parent != new_parent {
            if let Some(p) = old_parent {
                self.pending.push(GraphEvent::ConnectionRemoved {
                    from_id: p,
                    to_id: id,
                });
            }
            if let Some(p) = new_parent {
                self.pending.push(GraphEvent::ConnectionAdded {
                    from_id: p,
                    to_id: id,
                });
            }
        }
        Ok(())
    }

    /// Re-insert a previously removed subtree with its original ids, sizes
    /// and positions. `blocks` must be in pre-order with the subtree root first.
    pub fn insert_subtree(
        &mut self,
        parent: Option<BlockId>,
        index: Option<usize>,
        blocks: &[Block],
    ) -> Result<BlockId, GraphError> {
        let Some(top) = blocks.first() else {
            return Err(GraphError::MalformedData("empty subtree".into()));
        };
        if let Some(parent) = parent
            && !self.blocks.contains_key(&parent)
        {
            return Err(GraphError::InvalidParent(parent));
        }
        let incoming: HashSet<BlockId> = blocks.iter().map(|b| b.id).collect();
        if incoming.len() != blocks.len() {
            return Err(GraphError::MalformedData("duplicate id in subtree".into()));
        }
        if let Some(existing) = blocks.iter().find(|b| self.blocks.contains_key(&b.id)) {
            return Err(GraphError::DuplicateBlock(existing.id));
        }
        for block in &blocks[1..] {
            match block.parent {
                Some(p) if incoming.contains(&p) => {}
                _ => {
                    return Err(GraphError::MalformedData(format!(
                        "{} is not inside the restored subtree",
                        block.id
                    )));
                }
            }
        }

        let top_id = top.id;
        self.attach(top_id, parent, index);
        for block in blocks {
            let mut block = block.clone();
            if block.id == top_id {
                block.parent = parent;
            }
            self.ids.reserve(block.id);
            self.pending.push(GraphEvent::NodeAdded { id: block.id });
            if let Some(p) = block.parent {
                self.pending.push(GraphEvent::ConnectionAdded {
                    from_id: p,
                    to_id: block.id,
                });
            }
            self.blocks.insert(block.id, block);
        }
        Ok(top_id)
    }

    pub fn set_position(&mut self, id: BlockId, position: Point) -> Result<(), GraphError> {
        let block = self
            .blocks
            .get_mut(&id)
            .ok_or(GraphError::UnknownBlock(id))?;
        block.position = position;
        Ok(())
    }

    /// Replace every block at once. Used by import; the caller has already
    /// validated `blocks` (pre-order, consistent links).
    pub(crate) fn replace_all(&mut self, blocks: Vec<Block>) {
        let previous: Vec<BlockId> = self.iter_preorder().iter().map(|b| b.id).collect();
        for id in previous {
            if let Some(block) = self.blocks.get(&id) {
                if let Some(p) = block.parent {
                    self.pending.push(GraphEvent::ConnectionRemoved {
                        from_id: p,
                        to_id: id,
                    });
                }
                self.pending.push(GraphEvent::NodeRemoved { id });
            }
        }
        self.blocks.clear();
        self.roots.clear();

        for mut block in blocks {
            block.children.clear();
            let id = block.id;
            let parent = block.parent;
            self.ids.reserve(id);
            self.blocks.insert(id, block);
            self.attach(id, parent, None);
            self.pending.push(GraphEvent::NodeAdded { id });
            if let Some(p) = parent {
                self.pending.push(GraphEvent::ConnectionAdded {
                    from_id: p,
                    to_id: id,
                });
            }
        }
    }

    /// Take the events queued since the last drain.
    pub fn drain_events(&mut self) -> Vec<GraphEvent> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending_events(&self) -> &[GraphEvent] {
        &self.pending
    }

    fn attach(&mut self, id: BlockId, parent: Option<BlockId>, index: Option<usize>) {
        let siblings = match parent {
            Some(p) => match self.blocks.get_mut(&p) {
                Some(block) => &mut block.children,
                None => return,
            },
            None => {
                let at = index.map_or(self.roots.len(), |i| i.min(self.roots.len()));
                self.roots.insert(at, id);
                return;
            }
        };
        let at = index.map_or(siblings.len(), |i| i.min(siblings.len()));
        siblings.insert(at, id);
    }

    fn detach(&mut self, id: BlockId, parent: Option<BlockId>) {
        match parent {
            Some(p) => {
                if let Some(block) = self.blocks.get_mut(&p) {
                    block.children.retain(|c| *c != id);
                }
            }
            None => self.roots.retain(|r| *r != id),
        }
    }

    /// Verify the structural invariants, returning the first violation found.
    pub fn check_invariants(&self) -> Result<(), GraphError> {
        let mut seen_roots = HashSet::new();
        for &root in &self.roots {
            let block = self.get(root)?;
            if block.parent.is_some() || !seen_roots.insert(root) {
                return Err(GraphError::MalformedData(format!(
                    "{root} listed as a root but has a parent or is listed twice"
                )));
            }
        }
        for block in self.blocks.values() {
            match block.parent {
                None if !seen_roots.contains(&block.id) => {
                    return Err(GraphError::MalformedData(format!(
                        "{} has no parent but is not a root",
                        block.id
                    )));
                }
                Some(p) => {
                    let parent = self.get(p).map_err(|_| GraphError::InvalidParent(p))?;
                    if parent.children.iter().filter(|c| **c == block.id).count() != 1 {
                        return Err(GraphError::MalformedData(format!(
                            "{} missing from the children of {p}",
                            block.id
                        )));
                    }
                    if self.cycles_through(block.id) {
                        return Err(GraphError::CycleDetected {
                            block: block.id,
                            parent: p,
                        });
                    }
                }
                None => {}
            }
            for &child in &block.children {
                if self.get(child)?.parent != Some(block.id) {
                    return Err(GraphError::MalformedData(format!(
                        "{child} listed under {} but points elsewhere",
                        block.id
                    )));
                }
            }
        }
        Ok(())
    }

    fn cycles_through(&self, id: BlockId) -> bool {
        let mut steps = 0;
        let mut current = self.blocks.get(&id).and_then(|b| b.parent);
        while let Some(parent) = current {
            if parent == id || steps > self.blocks.len() {
                return true;
            }
            steps += 1;
            current = self.blocks.get(&parent).and_then(|b| b.parent);
        }
        false
    }
}
