//! Undo/Redo command stack.
//!
//! Every user-facing operation is recorded as a reversible `Command`: the
//! id-stable forward mutation, its inverse, and the position of every block
//! the operation moved. Undo applies the inverse and writes the old
//! positions back; redo does the same with the forward side. Neither runs
//! layout, so replaying history is exact.
//!
//! Imports are recorded as whole-document snapshots (a `Replace` mutation on
//! both sides).

use crate::engine::{FlowEngine, GraphMutation, PositionDelta, Settle, Transaction};
use fb_core::error::GraphError;
use serde::{Deserialize, Serialize};

/// What kind of user operation a command came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    AddBlock,
    DeleteBlocks,
    MoveBlock,
    Import,
}

/// A recorded operation with both directions.
#[derive(Debug, Clone)]
pub struct Command {
    pub kind: OperationKind,
    pub forward: Box<GraphMutation>,
    pub inverse: Box<GraphMutation>,
    pub description: String,
    pub moved: Vec<PositionDelta>,
}

impl Command {
    pub fn from_transaction(kind: OperationKind, description: &str, tx: &Transaction) -> Self {
        Self {
            kind,
            forward: Box::new(tx.replay.clone()),
            inverse: Box::new(tx.inverse.clone()),
            description: description.to_string(),
            moved: tx.moved.clone(),
        }
    }
}

/// One undo or redo step that actually ran.
#[derive(Debug, Clone)]
pub struct Replayed {
    pub kind: OperationKind,
    pub description: String,
    pub transaction: Transaction,
}

/// Linear history with a cursor: `entries[..cursor]` can be undone,
/// `entries[cursor..]` can be redone.
#[derive(Debug, Clone)]
pub struct CommandStack {
    entries: Vec<Command>,
    cursor: usize,
    /// Maximum number of entries kept.
    capacity: usize,
}

impl CommandStack {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity),
            cursor: 0,
            capacity,
        }
    }

    /// Push a command. Drops the redo tail and evicts the oldest entry when full.
    pub fn record(&mut self, command: Command) {
        self.entries.truncate(self.cursor);
        self.entries.push(command);
        if self.entries.len() > self.capacity {
            let evicted = self.entries.remove(0);
            log::trace!("history full, evicted \"{}\"", evicted.description);
        }
        self.cursor = self.entries.len();
    }

    /// Run `mutation` as a relayout transaction and record it.
    pub fn execute(
        &mut self,
        engine: &mut FlowEngine,
        mutation: &GraphMutation,
        kind: OperationKind,
        description: &str,
    ) -> Result<Transaction, GraphError> {
        self.execute_with(engine, mutation, Settle::Relayout, kind, description)
    }

    pub fn execute_with(
        &mut self,
        engine: &mut FlowEngine,
        mutation: &GraphMutation,
        settle: Settle<'_>,
        kind: OperationKind,
        description: &str,
    ) -> Result<Transaction, GraphError> {
        let tx = engine.transaction(mutation, settle)?;
        self.record(Command::from_transaction(kind, description, &tx));
        log::debug!("recorded \"{description}\" ({} in history)", self.cursor);
        Ok(tx)
    }

    /// Undo the last command. `Ok(None)` when there is nothing to undo.
    ///
    /// If the inverse cannot be applied the graph is left untouched and the
    /// command stays where it was.
    pub fn undo(&mut self, engine: &mut FlowEngine) -> Result<Option<Replayed>, GraphError> {
        let Some(index) = self.cursor.checked_sub(1) else {
            return Ok(None);
        };
        let command = &self.entries[index];
        let positions = Transaction::positions_before(&command.moved);
        let transaction = engine.transaction(&command.inverse, Settle::Restore(&positions))?;
        self.cursor = index;
        log::debug!("undo \"{}\"", command.description);
        Ok(Some(Replayed {
            kind: command.kind,
            description: command.description.clone(),
            transaction,
        }))
    }

    /// Redo the last undone command. `Ok(None)` when there is nothing to redo.
    pub fn redo(&mut self, engine: &mut FlowEngine) -> Result<Option<Replayed>, GraphError> {
        let Some(command) = self.entries.get(self.cursor) else {
            return Ok(None);
        };
        let positions = Transaction::positions_after(&command.moved);
        let transaction = engine.transaction(&command.forward, Settle::Restore(&positions))?;
        let replayed = Replayed {
            kind: command.kind,
            description: command.description.clone(),
            transaction,
        };
        self.cursor += 1;
        log::debug!("redo \"{}\"", replayed.description);
        Ok(Some(replayed))
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    /// Number of entries that can be undone.
    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    pub fn undo_description(&self) -> Option<&str> {
        let index = self.cursor.checked_sub(1)?;
        self.entries.get(index).map(|c| c.description.as_str())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.entries.get(self.cursor).map(|c| c.description.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fb_core::config::CanvasConfig;
    use fb_core::id::{BlockId, TemplateId};
    use fb_core::model::Point;
    use std::collections::BTreeMap;

    fn create(parent: Option<BlockId>) -> GraphMutation {
        GraphMutation::CreateBlock {
            template: TemplateId::intern("action"),
            parent,
            at: parent.is_none().then_some(Point::new(100.0, 100.0)),
            attributes: BTreeMap::new(),
        }
    }

    fn add(stack: &mut CommandStack, engine: &mut FlowEngine, parent: Option<BlockId>) -> BlockId {
        stack
            .execute(engine, &create(parent), OperationKind::AddBlock, "add")
            .unwrap()
            .created[0]
    }

    #[test]
    fn undo_redo_add() {
        let mut engine = FlowEngine::new(CanvasConfig::default());
        let mut stack = CommandStack::new(50);
        let a = add(&mut stack, &mut engine, None);
        let b = add(&mut stack, &mut engine, Some(a));
        let c = add(&mut stack, &mut engine, Some(a));
        let a_x = engine.block(a).unwrap().position.x;
        let b_before = engine.block(b).unwrap().position;

        let undone = stack.undo(&mut engine).unwrap().unwrap();
        assert_eq!(undone.description, "add");
        assert!(!engine.graph.contains(c));
        // b slides back under a.
        assert_eq!(engine.block(b).unwrap().position.x, a_x);

        stack.redo(&mut engine).unwrap().unwrap();
        assert!(engine.graph.contains(c));
        assert_eq!(engine.block(b).unwrap().position, b_before);
        assert_eq!(engine.arrows.len(), 2);
    }

    #[test]
    fn new_action_clears_redo() {
        let mut engine = FlowEngine::new(CanvasConfig::default());
        let mut stack = CommandStack::new(50);
        let a = add(&mut stack, &mut engine, None);
        add(&mut stack, &mut engine, Some(a));
        stack.undo(&mut engine).unwrap();
        assert!(stack.can_redo());

        add(&mut stack, &mut engine, Some(a));
        assert!(!stack.can_redo());
        assert!(stack.redo(&mut engine).unwrap().is_none());
    }

    #[test]
    fn capacity_trims_oldest() {
        let mut engine = FlowEngine::new(CanvasConfig::default());
        let mut stack = CommandStack::new(3);
        for _ in 0..5 {
            add(&mut stack, &mut engine, None);
        }
        let mut undo_count = 0;
        while stack.undo(&mut engine).unwrap().is_some() {
            undo_count += 1;
        }
        assert_eq!(undo_count, 3);
        // The two evicted creations stay.
        assert_eq!(engine.graph.len(), 2);
    }

    #[test]
    fn undo_at_start_is_a_no_op() {
        let mut engine = FlowEngine::new(CanvasConfig::default());
        let mut stack = CommandStack::new(50);
        assert!(stack.undo(&mut engine).unwrap().is_none());
        assert!(!stack.can_undo());
        assert_eq!(stack.undo_description(), None);
    }

    #[test]
    fn delete_undo_restores_ids_and_slot() {
        let mut engine = FlowEngine::new(CanvasConfig::default());
        let mut stack = CommandStack::new(50);
        let a = add(&mut stack, &mut engine, None);
        let b = add(&mut stack, &mut engine, Some(a));
        let _b1 = add(&mut stack, &mut engine, Some(b));
        let c = add(&mut stack, &mut engine, Some(a));
        let before = engine.graph.to_document().unwrap();

        stack
            .execute(
                &mut engine,
                &GraphMutation::RemoveSubtree { id: b },
                OperationKind::DeleteBlocks,
                "delete",
            )
            .unwrap();
        assert_eq!(engine.graph.len(), 2);

        stack.undo(&mut engine).unwrap();
        assert_eq!(engine.graph.to_document().unwrap(), before);
        assert_eq!(engine.block(a).unwrap().children.as_slice(), &[b, c]);
        assert_eq!(stack.redo_description(), Some("delete"));
    }
}
