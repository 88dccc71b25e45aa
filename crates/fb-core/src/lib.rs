pub mod arrows;
pub mod config;
pub mod document;
pub mod error;
pub mod events;
pub mod hit;
pub mod id;
pub mod layout;
pub mod model;
pub mod snap;

pub use arrows::{Arrow, ArrowRenderer, PathCmd};
pub use config::{ArrowConfig, ArrowRouting, CanvasConfig, LayoutConfig, RootPlacement, SnapConfig, TemplateCatalog, Viewport};
pub use document::{ConnectionRecord, GraphDocument, NodeRecord, parse_document};
pub use error::GraphError;
pub use events::GraphEvent;
pub use hit::{hit_test, hit_test_rect};
pub use id::{BlockId, TemplateId};
pub use layout::{compute_layout, relayout, relayout_all};
pub use model::*;
pub use snap::{SnapTarget, resolve};
