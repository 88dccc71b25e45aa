//! Error taxonomy shared by every graph operation.

use crate::id::BlockId;

/// Why a graph operation was rejected. No variant implies a partial change:
/// callers can always assume the graph is as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("parent block {0} does not exist")]
    InvalidParent(BlockId),
    #[error("block {0} does not exist")]
    UnknownBlock(BlockId),
    #[error("new parent {0} does not exist")]
    UnknownParent(BlockId),
    #[error("cannot attach {block} under {parent}: it would become its own ancestor")]
    CycleDetected { block: BlockId, parent: BlockId },
    #[error("block {0} already exists")]
    DuplicateBlock(BlockId),
    #[error("block id {0} is outside the supported id range")]
    IdOutOfRange(BlockId),
    #[error("malformed diagram data: {0}")]
    MalformedData(String),
    #[error("arrow {from} -> {to} references a missing block")]
    DanglingEdge { from: BlockId, to: BlockId },
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::MalformedData(err.to_string())
    }
}
