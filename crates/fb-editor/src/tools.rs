//! Drag tool: tracks a drag gesture between start and release.
//!
//! The tool never touches the graph. It turns the raw event stream into
//! gesture-level actions; the canvas decides what a move or a release means.

use crate::input::{DragSource, InputEvent};
use fb_core::model::Point;

/// What the tool wants the canvas to do with an event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToolAction {
    /// Nothing to do (e.g. a move with no drag in progress).
    Idle,
    Started(DragSource),
    /// Update the drop preview.
    Moved { source: DragSource, point: Point },
    /// Commit the drop.
    Released { source: DragSource, point: Point },
    /// The gesture was abandoned.
    Cancelled(DragSource),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DragTool {
    source: Option<DragSource>,
    last: Option<Point>,
}

impl DragTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current gesture, if one is in progress.
    pub fn active(&self) -> Option<DragSource> {
        self.source
    }

    /// Last reported position of the current gesture.
    pub fn last_point(&self) -> Option<Point> {
        self.last
    }

    pub fn reset(&mut self) {
        self.source = None;
        self.last = None;
    }

    pub fn handle(&mut self, event: &InputEvent) -> ToolAction {
        match *event {
            InputEvent::DragStart { source } => {
                // A new start replaces any gesture the host forgot to end.
                if let Some(previous) = self.source {
                    log::warn!("drag of {previous:?} restarted without an end");
                }
                self.source = Some(source);
                self.last = None;
                ToolAction::Started(source)
            }
            InputEvent::DragMove { point } => match self.source {
                Some(source) => {
                    self.last = Some(point);
                    ToolAction::Moved { source, point }
                }
                None => ToolAction::Idle,
            },
            InputEvent::DragEnd { point } => match self.source.take() {
                Some(source) => {
                    self.last = None;
                    ToolAction::Released { source, point }
                }
                None => ToolAction::Idle,
            },
            InputEvent::DragCancel => match self.source.take() {
                Some(source) => {
                    self.last = None;
                    ToolAction::Cancelled(source)
                }
                None => ToolAction::Idle,
            },
        }
    }
}
