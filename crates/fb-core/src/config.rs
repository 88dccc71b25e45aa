//! Canvas configuration.
//!
//! Every pixel constant the engine uses lives here. Hosts can pass a JSON
//! object (camelCase keys, every field optional) to override the defaults.

use crate::error::GraphError;
use crate::id::TemplateId;
use crate::model::{Point, Size};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The canvas dimensions. Drops with no snap target outside these bounds are cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 4000.0,
            height: 3000.0,
        }
    }
}

impl Viewport {
    pub fn contains(&self, point: Point) -> bool {
        point.x >= 0.0 && point.y >= 0.0 && point.x <= self.width && point.y <= self.height
    }
}

/// How root trees are positioned horizontally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RootPlacement {
    /// Roots stay where they were dropped; their trees hang centered beneath them.
    #[default]
    Anchored,
    /// Roots are packed left-to-right from `root_origin`, like siblings.
    Row,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutConfig {
    /// Vertical distance between the tops of a parent and its children.
    pub row_height: f32,
    /// Horizontal gap between neighbouring sibling subtrees.
    pub sibling_gap: f32,
    pub root_placement: RootPlacement,
    /// Top-left of the first root when `root_placement` is `Row`.
    pub root_origin: Point,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            row_height: 160.0,
            sibling_gap: 40.0,
            root_placement: RootPlacement::Anchored,
            root_origin: Point::new(40.0, 40.0),
        }
    }
}

/// Drop-zone geometry: the zone sits directly below a block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SnapConfig {
    /// Extra width added on both sides of the block.
    pub margin: f32,
    /// How far below the block's bottom edge the zone reaches.
    pub depth: f32,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            margin: 20.0,
            depth: 140.0,
        }
    }
}

/// Shape of the parent → child connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArrowRouting {
    /// Down, across, down.
    #[default]
    Elbow,
    /// Cubic curve bending at the mid row.
    Curve,
    Straight,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArrowConfig {
    pub routing: ArrowRouting,
}

/// Block sizes per palette template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TemplateCatalog {
    pub default_size: Size,
    pub sizes: HashMap<String, Size>,
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self {
            default_size: Size::new(200.0, 80.0),
            sizes: HashMap::new(),
        }
    }
}

impl TemplateCatalog {
    pub fn size_of(&self, template: TemplateId) -> Size {
        self.sizes
            .get(template.as_str())
            .copied()
            .unwrap_or(self.default_size)
    }

    pub fn with_size(mut self, template: &str, size: Size) -> Self {
        self.sizes.insert(template.to_string(), size);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CanvasConfig {
    pub layout: LayoutConfig,
    pub snap: SnapConfig,
    pub arrows: ArrowConfig,
    pub viewport: Viewport,
    pub templates: TemplateCatalog,
    /// Maximum number of undoable operations kept.
    pub history_capacity: usize,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            layout: LayoutConfig::default(),
            snap: SnapConfig::default(),
            arrows: ArrowConfig::default(),
            viewport: Viewport::default(),
            templates: TemplateCatalog::default(),
            history_capacity: 50,
        }
    }
}

impl CanvasConfig {
    /// Parse a host-supplied JSON config. Missing fields keep their defaults.
    ///
    /// # Errors
    /// Returns `MalformedData` if the JSON does not parse or a value is out of range.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let config: CanvasConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        let invalid = |what: &str| Err(GraphError::MalformedData(format!("invalid config: {what}")));
        if !(self.layout.row_height > 0.0) {
            return invalid("layout.rowHeight must be positive");
        }
        if !(self.layout.sibling_gap >= 0.0) {
            return invalid("layout.siblingGap must not be negative");
        }
        if !(self.snap.margin >= 0.0 && self.snap.depth > 0.0) {
            return invalid("snap.margin must be >= 0 and snap.depth > 0");
        }
        if self.history_capacity == 0 {
            return invalid("historyCapacity must be at least 1");
        }
        Ok(())
    }
}
