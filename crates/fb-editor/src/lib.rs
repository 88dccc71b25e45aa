pub mod canvas;
pub mod commands;
pub mod engine;
pub mod input;
pub mod tools;

pub use canvas::{
    BlockView, CanvasObserver, DragPreview, DropOutcome, FlowCanvas, HistoryOutcome, InputResponse,
    RenderSnapshot,
};
pub use commands::{CommandStack, OperationKind};
pub use engine::{FlowEngine, GraphMutation, PositionDelta, Settle, Transaction};
pub use input::{DragSource, InputEvent};
pub use tools::{DragTool, ToolAction};
