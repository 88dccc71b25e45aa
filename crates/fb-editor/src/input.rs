//! Input abstraction layer.
//!
//! The host translates mouse/touch gestures into drag events in canvas
//! coordinates. Points are the top-left of the dragged block.

use fb_core::id::{BlockId, TemplateId};
use fb_core::model::Point;
use serde::{Deserialize, Serialize};

/// What is being dragged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DragSource {
    /// A palette template; dropping it creates a block.
    Template { template: TemplateId },
    /// An existing block (with its subtree).
    Block { id: BlockId },
}

/// A normalized drag event from the host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InputEvent {
    DragStart { source: DragSource },
    DragMove { point: Point },
    DragEnd { point: Point },
    DragCancel,
}

impl InputEvent {
    pub fn start_template(name: &str) -> Self {
        Self::DragStart {
            source: DragSource::Template {
                template: TemplateId::intern(name),
            },
        }
    }

    pub fn start_block(id: BlockId) -> Self {
        Self::DragStart {
            source: DragSource::Block { id },
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Extract the position if the event carries one.
    pub fn position(&self) -> Option<Point> {
        match self {
            Self::DragMove { point } | Self::DragEnd { point } => Some(*point),
            _ => None,
        }
    }
}
