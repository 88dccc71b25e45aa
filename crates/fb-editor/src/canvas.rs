//! `FlowCanvas`: the surface hosts drive.
//!
//! Wraps the engine, the history and the drag tool. Every successful
//! mutation is recorded for undo and reported to the registered observers
//! as domain events plus a fresh render snapshot.

use crate::commands::{CommandStack, OperationKind};
use crate::engine::{FlowEngine, GraphMutation, Settle, Transaction};
use crate::input::{DragSource, InputEvent};
use crate::tools::{DragTool, ToolAction};
use fb_core::arrows::{Arrow, ArrowRenderer};
use fb_core::config::CanvasConfig;
use fb_core::document::GraphDocument;
use fb_core::error::GraphError;
use fb_core::events::GraphEvent;
use fb_core::id::{BlockId, TemplateId};
use fb_core::layout::compute_layout;
use fb_core::model::{Block, FlowGraph, Point, Size};
use fb_core::snap::{SnapTarget, resolve};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

// ─── Host-facing types ───────────────────────────────────────────────────

/// Receives change notifications after every successful mutation.
pub trait CanvasObserver {
    fn on_events(&mut self, events: &[GraphEvent]);

    fn on_render(&mut self, _snapshot: &RenderSnapshot) {}
}

/// A block as the presentation layer needs it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockView {
    pub id: BlockId,
    pub parent_id: Option<BlockId>,
    pub template_type: TemplateId,
    pub position: Point,
    pub size: Size,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// Everything needed to paint the canvas.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderSnapshot {
    /// Pre-order.
    pub blocks: Vec<BlockView>,
    pub arrows: Vec<Arrow>,
}

impl RenderSnapshot {
    pub fn capture(graph: &FlowGraph, arrows: &ArrowRenderer) -> Self {
        Self {
            blocks: graph
                .iter_preorder()
                .into_iter()
                .map(|b| BlockView {
                    id: b.id,
                    parent_id: b.parent,
                    template_type: b.template,
                    position: b.position,
                    size: b.size,
                    attributes: b.attributes.clone(),
                })
                .collect(),
            arrows: arrows.arrows().cloned().collect(),
        }
    }
}

/// What a drop did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum DropOutcome {
    /// The block now hangs under `parent`.
    Attached { id: BlockId, parent: BlockId },
    /// The block starts a new tree; `at` is where layout settled it.
    NewRoot { id: BlockId, at: Point },
    /// The block was dropped back where it already was.
    Unchanged { id: BlockId },
    /// No target and outside the canvas: nothing happened.
    Cancelled,
}

/// Where a drop would land and how the canvas would look without the dragged block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DragPreview {
    pub target: SnapTarget,
    pub positions: BTreeMap<BlockId, Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "response", rename_all = "camelCase")]
pub enum InputResponse {
    Ignored,
    Started,
    Preview { preview: DragPreview },
    Dropped { outcome: DropOutcome },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryOutcome {
    pub applied: bool,
    pub description: Option<String>,
}

// ─── Canvas ──────────────────────────────────────────────────────────────

pub struct FlowCanvas {
    engine: FlowEngine,
    history: CommandStack,
    drag: DragTool,
    observers: Vec<Box<dyn CanvasObserver>>,
}

impl Default for FlowCanvas {
    fn default() -> Self {
        Self::new(CanvasConfig::default())
    }
}

impl FlowCanvas {
    pub fn new(config: CanvasConfig) -> Self {
        Self {
            history: CommandStack::new(config.history_capacity),
            engine: FlowEngine::new(config),
            drag: DragTool::new(),
            observers: Vec::new(),
        }
    }

    /// Build a canvas from a host JSON config (see `CanvasConfig::from_json`).
    pub fn from_config_json(json: &str) -> Result<Self, GraphError> {
        Ok(Self::new(CanvasConfig::from_json(json)?))
    }

    pub fn add_observer(&mut self, observer: Box<dyn CanvasObserver>) {
        self.observers.push(observer);
    }

    pub fn clear_observers(&mut self) {
        self.observers.clear();
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    pub fn graph(&self) -> &FlowGraph {
        &self.engine.graph
    }

    pub fn arrows(&self) -> &ArrowRenderer {
        &self.engine.arrows
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.engine.config
    }

    pub fn history(&self) -> &CommandStack {
        &self.history
    }

    pub fn block(&self, id: BlockId) -> Result<&Block, GraphError> {
        self.engine.block(id)
    }

    pub fn snapshot(&self) -> RenderSnapshot {
        RenderSnapshot::capture(&self.engine.graph, &self.engine.arrows)
    }

    /// The drag gesture in progress, if any.
    pub fn active_drag(&self) -> Option<DragSource> {
        self.drag.active()
    }

    // ─── Block operations ────────────────────────────────────────────────

    /// Create a new root block with its top-left at `at`.
    pub fn add_root(&mut self, template: &str, at: Point) -> Result<Block, GraphError> {
        let template = TemplateId::intern(template);
        let tx = self.execute(
            &GraphMutation::CreateBlock {
                template,
                parent: None,
                at: Some(at),
                attributes: BTreeMap::new(),
            },
            OperationKind::AddBlock,
            &format!("Add {template}"),
        )?;
        let id = created(&tx)?;
        Ok(self.engine.block(id)?.clone())
    }

    /// Where `id` would land if released at `point`. Nothing is changed.
    pub fn drag_existing_block(&self, id: BlockId, point: Point) -> Result<SnapTarget, GraphError> {
        let block = self.engine.block(id)?;
        Ok(resolve(
            &self.engine.graph,
            &self.engine.config.snap,
            point,
            block.size,
            Some(id),
        ))
    }

    /// Snap target plus the layout with the dragged block (and its subtree) left out.
    pub fn preview(&self, source: DragSource, point: Point) -> Result<DragPreview, GraphError> {
        let (target, excluded) = match source {
            DragSource::Block { id } => (self.drag_existing_block(id, point)?, Some(id)),
            DragSource::Template { template } => (self.template_target(template, point), None),
        };
        let positions = compute_layout(&self.engine.graph, &self.engine.config.layout, excluded)
            .into_iter()
            .collect();
        Ok(DragPreview { target, positions })
    }

    /// Release an existing block at `point`.
    pub fn commit_drag(&mut self, id: BlockId, point: Point) -> Result<DropOutcome, GraphError> {
        let target = self.drag_existing_block(id, point)?;
        let block = self.engine.block(id)?;
        let current = block.parent;
        let (old_position, is_last) = (block.position, self.is_last_sibling(id)?);

        match target {
            SnapTarget::Child { parent, .. } => {
                if current == Some(parent) && is_last {
                    return Ok(DropOutcome::Unchanged { id });
                }
                self.execute(
                    &GraphMutation::Reparent {
                        id,
                        parent: Some(parent),
                        index: None,
                        at: None,
                    },
                    OperationKind::MoveBlock,
                    &format!("Move {id} under {parent}"),
                )?;
                Ok(DropOutcome::Attached { id, parent })
            }
            SnapTarget::Root { at } => {
                if !self.engine.config.viewport.contains(at) {
                    log::warn!("drop of {id} at {at:?} is outside the canvas, cancelled");
                    return Ok(DropOutcome::Cancelled);
                }
                if current.is_none() && old_position == at {
                    return Ok(DropOutcome::Unchanged { id });
                }
                self.execute(
                    &GraphMutation::Reparent {
                        id,
                        parent: None,
                        index: None,
                        at: Some(at),
                    },
                    OperationKind::MoveBlock,
                    &format!("Move {id}"),
                )?;
                let at = self.engine.block(id)?.position;
                Ok(DropOutcome::NewRoot { id, at })
            }
        }
    }

    /// Drop a palette template at `point`: a new child, a new root, or nothing.
    pub fn drop_template(&mut self, template: &str, point: Point) -> Result<DropOutcome, GraphError> {
        self.drop_template_id(TemplateId::intern(template), point)
    }

    fn drop_template_id(&mut self, template: TemplateId, point: Point) -> Result<DropOutcome, GraphError> {
        let (parent, at) = match self.template_target(template, point) {
            SnapTarget::Child { parent, .. } => (Some(parent), None),
            SnapTarget::Root { at } => {
                if !self.engine.config.viewport.contains(at) {
                    log::warn!("drop of {template} at {at:?} is outside the canvas, cancelled");
                    return Ok(DropOutcome::Cancelled);
                }
                (None, Some(at))
            }
        };
        let tx = self.execute(
            &GraphMutation::CreateBlock {
                template,
                parent,
                at,
                attributes: BTreeMap::new(),
            },
            OperationKind::AddBlock,
            &format!("Add {template}"),
        )?;
        let id = created(&tx)?;
        Ok(match parent {
            Some(parent) => DropOutcome::Attached { id, parent },
            None => DropOutcome::NewRoot {
                id,
                at: self.engine.block(id)?.position,
            },
        })
    }

    /// Drive the drag tool from a host input event.
    pub fn handle_input(&mut self, event: &InputEvent) -> Result<InputResponse, GraphError> {
        match self.drag.handle(event) {
            ToolAction::Idle => Ok(InputResponse::Ignored),
            ToolAction::Started(source) => {
                if let DragSource::Block { id } = source
                    && !self.engine.graph.contains(id)
                {
                    self.drag.reset();
                    return Err(GraphError::UnknownBlock(id));
                }
                Ok(InputResponse::Started)
            }
            ToolAction::Moved { source, point } => {
                let preview = self.preview(source, point)?;
                Ok(InputResponse::Preview { preview })
            }
            ToolAction::Released { source, point } => {
                let outcome = match source {
                    DragSource::Block { id } => self.commit_drag(id, point)?,
                    DragSource::Template { template } => self.drop_template_id(template, point)?,
                };
                Ok(InputResponse::Dropped { outcome })
            }
            ToolAction::Cancelled(source) => {
                log::debug!("drag of {source:?} cancelled");
                Ok(InputResponse::Cancelled)
            }
        }
    }

    /// Delete blocks and their subtrees as one undoable step.
    ///
    /// Ids inside another selected block's subtree are folded into it.
    /// Returns every removed id, pre-order per subtree.
    pub fn delete_blocks(&mut self, ids: &[BlockId]) -> Result<Vec<BlockId>, GraphError> {
        for &id in ids {
            self.engine.block(id)?;
        }
        let selected: BTreeSet<BlockId> = ids.iter().copied().collect();
        let mut seen = BTreeSet::new();
        let tops: Vec<BlockId> = ids
            .iter()
            .copied()
            .filter(|&id| seen.insert(id))
            .filter(|&id| {
                !selected
                    .iter()
                    .any(|&other| self.engine.graph.is_ancestor_of(other, id))
            })
            .collect();
        if tops.is_empty() {
            return Ok(Vec::new());
        }

        let mutation = match tops.as_slice() {
            [id] => GraphMutation::RemoveSubtree { id: *id },
            _ => GraphMutation::Batch(
                tops.iter()
                    .map(|&id| GraphMutation::RemoveSubtree { id })
                    .collect(),
            ),
        };
        let tx = self.execute(
            &mutation,
            OperationKind::DeleteBlocks,
            &format!("Delete {} block(s)", tops.len()),
        )?;
        Ok(tx
            .events
            .iter()
            .filter_map(|e| match e {
                GraphEvent::NodeRemoved { id } => Some(*id),
                _ => None,
            })
            .collect())
    }

    // ─── History ─────────────────────────────────────────────────────────

    pub fn undo(&mut self) -> Result<HistoryOutcome, GraphError> {
        match self.history.undo(&mut self.engine)? {
            Some(replayed) => {
                self.after_change(&replayed.transaction.events);
                Ok(HistoryOutcome {
                    applied: true,
                    description: Some(replayed.description),
                })
            }
            None => Ok(HistoryOutcome {
                applied: false,
                description: None,
            }),
        }
    }

    pub fn redo(&mut self) -> Result<HistoryOutcome, GraphError> {
        match self.history.redo(&mut self.engine)? {
            Some(replayed) => {
                self.after_change(&replayed.transaction.events);
                Ok(HistoryOutcome {
                    applied: true,
                    description: Some(replayed.description),
                })
            }
            None => Ok(HistoryOutcome {
                applied: false,
                description: None,
            }),
        }
    }

    // ─── Import / export ─────────────────────────────────────────────────

    pub fn export(&self) -> Result<GraphDocument, GraphError> {
        self.engine.graph.to_document()
    }

    pub fn export_json(&self) -> Result<String, GraphError> {
        self.export()?.to_json()
    }

    /// Replace the whole graph. Validated before anything changes; undoable.
    pub fn import(&mut self, document: GraphDocument) -> Result<(), GraphError> {
        document.validate(&self.engine.graph)?;
        let count = document.nodes.len();
        let tx = self.history.execute_with(
            &mut self.engine,
            &GraphMutation::Replace {
                document: Box::new(document),
            },
            Settle::Keep,
            OperationKind::Import,
            &format!("Import {count} blocks"),
        )?;
        self.drag.reset();
        self.after_change(&tx.events);
        Ok(())
    }

    pub fn import_json(&mut self, json: &str) -> Result<(), GraphError> {
        self.import(GraphDocument::parse(json)?)
    }

    // ─── Internals ───────────────────────────────────────────────────────

    fn execute(
        &mut self,
        mutation: &GraphMutation,
        kind: OperationKind,
        description: &str,
    ) -> Result<Transaction, GraphError> {
        let tx = self
            .history
            .execute(&mut self.engine, mutation, kind, description)?;
        self.after_change(&tx.events);
        Ok(tx)
    }

    fn after_change(&mut self, events: &[GraphEvent]) {
        debug_assert!(
            self.engine.graph.check_invariants().is_ok(),
            "{:?}",
            self.engine.graph.check_invariants()
        );
        if self.observers.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        for observer in &mut self.observers {
            observer.on_events(events);
            observer.on_render(&snapshot);
        }
    }

    fn template_target(&self, template: TemplateId, point: Point) -> SnapTarget {
        let size = self.engine.graph.catalog().size_of(template);
        resolve(&self.engine.graph, &self.engine.config.snap, point, size, None)
    }

    fn is_last_sibling(&self, id: BlockId) -> Result<bool, GraphError> {
        let index = self.engine.graph.sibling_index(id)?;
        let count = match self.engine.block(id)?.parent {
            Some(parent) => self.engine.block(parent)?.children.len(),
            None => self.engine.graph.root_ids().len(),
        };
        Ok(index + 1 == count)
    }
}

fn created(tx: &Transaction) -> Result<BlockId, GraphError> {
    tx.created
        .first()
        .copied()
        .ok_or_else(|| GraphError::MalformedData("create produced no block".into()))
}
