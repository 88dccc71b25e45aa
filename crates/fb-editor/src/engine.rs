//! Transactional mutation engine.
//!
//! The engine owns the authoritative `FlowGraph`, the arrow cache and the
//! canvas configuration. Every change goes through `transaction`:
//!
//! 1. checkpoint the graph,
//! 2. apply the structural mutation (capturing its inverse as it goes),
//! 3. settle positions (relayout the forest once, or restore
//!    recorded positions when replaying history),
//! 4. refresh the arrows of every touched block,
//! 5. drain the queued domain events.
//!
//! Any error rolls the graph back to the checkpoint, so callers see either
//! the whole change or none of it.

use fb_core::arrows::ArrowRenderer;
use fb_core::config::CanvasConfig;
use fb_core::document::GraphDocument;
use fb_core::error::GraphError;
use fb_core::events::GraphEvent;
use fb_core::id::{BlockId, TemplateId};
use fb_core::layout::relayout_all;
use fb_core::model::{Block, FlowGraph, Point};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A structural change to the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphMutation {
    /// Create a block with a fresh id. `at` places a new root.
    CreateBlock {
        template: TemplateId,
        parent: Option<BlockId>,
        at: Option<Point>,
        attributes: BTreeMap<String, serde_json::Value>,
    },
    /// Re-insert blocks with their original ids (pre-order, subtree root first).
    InsertSubtree {
        parent: Option<BlockId>,
        index: Option<usize>,
        blocks: Vec<Block>,
    },
    /// Remove a block and all its descendants.
    RemoveSubtree { id: BlockId },
    /// Move a block (with its subtree) under `parent`, or detach it into a root placed at `at`.
    Reparent {
        id: BlockId,
        parent: Option<BlockId>,
        index: Option<usize>,
        at: Option<Point>,
    },
    /// Swap the whole graph for a document.
    Replace { document: Box<GraphDocument> },
    /// Apply in order; the inverse runs the inverses in reverse order.
    Batch(Vec<GraphMutation>),
}

/// How block positions are settled once the structure has changed.
#[derive(Debug, Clone, Copy)]
pub enum Settle<'a> {
    /// Re-solve the layout of every affected root tree.
    Relayout,
    /// Leave positions as the mutation left them (import).
    Keep,
    /// Write recorded positions back verbatim (undo/redo).
    Restore(&'a [(BlockId, Point)]),
}

/// Where one block was before and after a transaction.
/// `None` means the block did not exist on that side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionDelta {
    pub id: BlockId,
    pub before: Option<Point>,
    pub after: Option<Point>,
}

/// Result of a committed transaction.
#[derive(Debug, Clone)]
pub struct Transaction {
    /// Undoes the change (structure only; positions come from `moved`).
    pub inverse: GraphMutation,
    /// Re-applies the change with stable ids.
    pub replay: GraphMutation,
    /// Every block whose position changed, appeared or disappeared.
    pub moved: Vec<PositionDelta>,
    pub events: Vec<GraphEvent>,
    /// Blocks created by this transaction, in creation order.
    pub created: Vec<BlockId>,
    /// Child ids of the arrows that were recomputed.
    pub refreshed_arrows: Vec<BlockId>,
}

impl Transaction {
    /// Positions to restore when undoing.
    pub fn positions_before(moved: &[PositionDelta]) -> Vec<(BlockId, Point)> {
        moved.iter().filter_map(|d| d.before.map(|p| (d.id, p))).collect()
    }

    /// Positions to restore when redoing.
    pub fn positions_after(moved: &[PositionDelta]) -> Vec<(BlockId, Point)> {
        moved.iter().filter_map(|d| d.after.map(|p| (d.id, p))).collect()
    }
}

/// What applying one mutation did, before positions are settled.
struct Applied {
    inverse: GraphMutation,
    replay: GraphMutation,
    /// Blocks whose tree needs relayout and whose arrows need a refresh.
    /// May include ids that no longer exist.
    touched: Vec<BlockId>,
    created: Vec<BlockId>,
}

/// The engine holds the authoritative graph and keeps arrows in sync with it.
#[derive(Debug, Clone)]
pub struct FlowEngine {
    /// The current graph (single source of truth).
    pub graph: FlowGraph,
    /// Cached arrow geometry, refreshed after every transaction.
    pub arrows: ArrowRenderer,
    pub config: CanvasConfig,
}

impl FlowEngine {
    /// Create an empty engine.
    pub fn new(config: CanvasConfig) -> Self {
        Self {
            graph: FlowGraph::with_catalog(config.templates.clone()),
            arrows: ArrowRenderer::new(config.arrows),
            config,
        }
    }

    /// Create an engine from an exported document. Positions are kept as-is.
    pub fn from_document(document: &GraphDocument, config: CanvasConfig) -> Result<Self, GraphError> {
        let mut engine = Self::new(config);
        engine.graph.import_document(document)?;
        engine.graph.drain_events();
        engine.arrows.rebuild(&engine.graph);
        Ok(engine)
    }

    /// Apply `mutation` atomically.
    ///
    /// On error the graph is restored to its state before the call and no
    /// events are emitted.
    pub fn transaction(
        &mut self,
        mutation: &GraphMutation,
        settle: Settle<'_>,
    ) -> Result<Transaction, GraphError> {
        debug_assert!(self.graph.pending_events().is_empty());
        let checkpoint = self.graph.clone();
        match self.run(mutation, settle, &checkpoint) {
            Ok(tx) => Ok(tx),
            Err(err) => {
                log::warn!("rolled back {}: {err}", mutation_name(mutation));
                self.graph = checkpoint;
                Err(err)
            }
        }
    }

    fn run(
        &mut self,
        mutation: &GraphMutation,
        settle: Settle<'_>,
        checkpoint: &FlowGraph,
    ) -> Result<Transaction, GraphError> {
        let applied = self.apply_mutation(mutation)?;

        match settle {
            Settle::Relayout => self.relayout_touched(&applied.touched)?,
            Settle::Keep => {}
            Settle::Restore(positions) => {
                for &(id, position) in positions {
                    self.graph.set_position(id, position)?;
                }
            }
        }

        let moved = diff_positions(checkpoint, &self.graph);
        let mut touched: BTreeSet<BlockId> = applied.touched.iter().copied().collect();
        touched.extend(moved.iter().map(|d| d.id));
        let touched: Vec<BlockId> = touched.into_iter().collect();
        let refreshed_arrows = self.arrows.refresh_edges(&self.graph, &touched);

        let events = self.graph.drain_events();
        log::debug!(
            "{}: {} events, {} blocks moved, {} arrows refreshed",
            mutation_name(mutation),
            events.len(),
            moved.len(),
            refreshed_arrows.len()
        );
        Ok(Transaction {
            inverse: applied.inverse,
            replay: applied.replay,
            moved,
            events,
            created: applied.created,
            refreshed_arrows,
        })
    }

    // ─── Structural mutations ────────────────────────────────────────────

    /// Apply a mutation to the graph, computing its inverse from the state
    /// right before each step.
    fn apply_mutation(&mut self, mutation: &GraphMutation) -> Result<Applied, GraphError> {
        match mutation {
            GraphMutation::CreateBlock {
                template,
                parent,
                at,
                attributes,
            } => {
                let id = self
                    .graph
                    .create_block(*template, *parent, attributes.clone())?
                    .id;
                if let Some(at) = at {
                    self.graph.set_position(id, *at)?;
                }
                let index = self.graph.sibling_index(id)?;
                let block = self.graph.get(id)?.clone();
                Ok(Applied {
                    inverse: GraphMutation::RemoveSubtree { id },
                    replay: GraphMutation::InsertSubtree {
                        parent: *parent,
                        index: Some(index),
                        blocks: vec![block],
                    },
                    touched: parent.iter().copied().chain([id]).collect(),
                    created: vec![id],
                })
            }
            GraphMutation::InsertSubtree {
                parent,
                index,
                blocks,
            } => {
                let top = self.graph.insert_subtree(*parent, *index, blocks)?;
                let mut touched: Vec<BlockId> = blocks.iter().map(|b| b.id).collect();
                touched.extend(parent.iter().copied());
                Ok(Applied {
                    inverse: GraphMutation::RemoveSubtree { id: top },
                    replay: mutation.clone(),
                    touched,
                    created: Vec::new(),
                })
            }
            GraphMutation::RemoveSubtree { id } => {
                let parent = self.graph.get(*id)?.parent;
                let index = self.graph.sibling_index(*id)?;
                let removed = self.graph.delete_subtree(*id)?;
                let mut touched: Vec<BlockId> = removed.iter().map(|b| b.id).collect();
                touched.extend(parent.iter().copied());
                Ok(Applied {
                    inverse: GraphMutation::InsertSubtree {
                        parent,
                        index: Some(index),
                        blocks: removed,
                    },
                    replay: mutation.clone(),
                    touched,
                    created: Vec::new(),
                })
            }
            GraphMutation::Reparent {
                id,
                parent,
                index,
                at,
            } => {
                let old_parent = self.graph.get(*id)?.parent;
                let old_index = self.graph.sibling_index(*id)?;
                self.graph.reparent_at(*id, *parent, *index)?;
                if parent.is_none()
                    && let Some(at) = at
                {
                    self.graph.set_position(*id, *at)?;
                }
                let new_index = self.graph.sibling_index(*id)?;
                let touched = [Some(*id), old_parent, *parent].into_iter().flatten().collect();
                Ok(Applied {
                    inverse: GraphMutation::Reparent {
                        id: *id,
                        parent: old_parent,
                        index: Some(old_index),
                        at: None,
                    },
                    replay: GraphMutation::Reparent {
                        id: *id,
                        parent: *parent,
                        index: Some(new_index),
                        at: *at,
                    },
                    touched,
                    created: Vec::new(),
                })
            }
            GraphMutation::Replace { document } => {
                let previous = self.graph.to_document()?;
                let mut touched: Vec<BlockId> =
                    self.graph.iter_preorder().iter().map(|b| b.id).collect();
                self.graph.import_document(document)?;
                touched.extend(self.graph.iter_preorder().iter().map(|b| b.id));
                Ok(Applied {
                    inverse: GraphMutation::Replace {
                        document: Box::new(previous),
                    },
                    replay: mutation.clone(),
                    touched,
                    created: Vec::new(),
                })
            }
            GraphMutation::Batch(steps) => {
                let mut inverses = Vec::with_capacity(steps.len());
                let mut replays = Vec::with_capacity(steps.len());
                let mut touched = Vec::new();
                let mut created = Vec::new();
                for step in steps {
                    let applied = self.apply_mutation(step)?;
                    inverses.push(applied.inverse);
                    replays.push(applied.replay);
                    touched.extend(applied.touched);
                    created.extend(applied.created);
                }
                inverses.reverse();
                Ok(Applied {
                    inverse: GraphMutation::Batch(inverses),
                    replay: GraphMutation::Batch(replays),
                    touched,
                    created,
                })
            }
        }
    }

    /// Re-solve the layout once if anything was touched. Trees push each
    /// other apart, so the whole forest is solved; settled trees stay put.
    fn relayout_touched(&mut self, touched: &[BlockId]) -> Result<(), GraphError> {
        if touched.is_empty() {
            return Ok(());
        }
        relayout_all(&mut self.graph, &self.config.layout)?;
        Ok(())
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    pub fn block(&self, id: BlockId) -> Result<&Block, GraphError> {
        self.graph.get(id)
    }
}

/// Compare positions block by block, in id order.
fn diff_positions(before: &FlowGraph, after: &FlowGraph) -> Vec<PositionDelta> {
    let old: HashMap<BlockId, Point> = before
        .iter_preorder()
        .iter()
        .map(|b| (b.id, b.position))
        .collect();
    let new: HashMap<BlockId, Point> = after
        .iter_preorder()
        .iter()
        .map(|b| (b.id, b.position))
        .collect();

    let ids: BTreeSet<BlockId> = old.keys().chain(new.keys()).copied().collect();
    ids.into_iter()
        .filter_map(|id| {
            let (before, after) = (old.get(&id).copied(), new.get(&id).copied());
            (before != after).then_some(PositionDelta { id, before, after })
        })
        .collect()
}

fn mutation_name(mutation: &GraphMutation) -> &'static str {
    match mutation {
        GraphMutation::CreateBlock { .. } => "create",
        GraphMutation::InsertSubtree { .. } => "insert",
        GraphMutation::RemoveSubtree { .. } => "remove",
        GraphMutation::Reparent { .. } => "reparent",
        GraphMutation::Replace { .. } => "replace",
        GraphMutation::Batch(_) => "batch",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(parent: Option<BlockId>, at: Option<Point>) -> GraphMutation {
        GraphMutation::CreateBlock {
            template: TemplateId::intern("action"),
            parent,
            at,
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn create_relayouts_and_refreshes_arrows() {
        let mut engine = FlowEngine::new(CanvasConfig::default());
        let tx = engine
            .transaction(&create(None, Some(Point::new(100.0, 100.0))), Settle::Relayout)
            .unwrap();
        let a = tx.created[0];
        let tx = engine.transaction(&create(Some(a), None), Settle::Relayout).unwrap();
        let b = tx.created[0];

        assert_eq!(engine.block(b).unwrap().position, Point::new(100.0, 260.0));
        assert_eq!(tx.refreshed_arrows, vec![b]);
        assert_eq!(engine.arrows.len(), 1);
        assert_eq!(
            tx.events,
            vec![
                GraphEvent::NodeAdded { id: b },
                GraphEvent::ConnectionAdded { from_id: a, to_id: b },
            ]
        );
    }

    #[test]
    fn failed_batch_rolls_back_everything() {
        let mut engine = FlowEngine::new(CanvasConfig::default());
        let a = engine
            .transaction(&create(None, None), Settle::Relayout)
            .unwrap()
            .created[0];
        let before = engine.graph.to_document().unwrap();

        let bad = GraphMutation::Batch(vec![
            create(Some(a), None),
            GraphMutation::RemoveSubtree { id: BlockId(99) },
        ]);
        let err = engine.transaction(&bad, Settle::Relayout).unwrap_err();
        assert_eq!(err, GraphError::UnknownBlock(BlockId(99)));
        assert_eq!(engine.graph.to_document().unwrap(), before);
        assert!(engine.graph.pending_events().is_empty());
    }

    #[test]
    fn inverse_and_replay_restore_structure() {
        let mut engine = FlowEngine::new(CanvasConfig::default());
        let a = engine.transaction(&create(None, None), Settle::Relayout).unwrap().created[0];
        let b = engine.transaction(&create(Some(a), None), Settle::Relayout).unwrap().created[0];
        let _c = engine.transaction(&create(Some(b), None), Settle::Relayout).unwrap();
        let start = engine.graph.to_document().unwrap();

        let tx = engine
            .transaction(&GraphMutation::RemoveSubtree { id: b }, Settle::Relayout)
            .unwrap();
        let end = engine.graph.to_document().unwrap();
        assert_eq!(engine.graph.len(), 1);

        let before = Transaction::positions_before(&tx.moved);
        engine.transaction(&tx.inverse, Settle::Restore(&before)).unwrap();
        assert_eq!(engine.graph.to_document().unwrap(), start);

        let after = Transaction::positions_after(&tx.moved);
        engine.transaction(&tx.replay, Settle::Restore(&after)).unwrap();
        assert_eq!(engine.graph.to_document().unwrap(), end);
    }
}
