//! Domain events queued by the graph store on every structural change.

use crate::id::BlockId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GraphEvent {
    #[serde(rename = "node:add")]
    NodeAdded { id: BlockId },
    #[serde(rename = "node:remove")]
    NodeRemoved { id: BlockId },
    #[serde(rename = "connection:add", rename_all = "camelCase")]
    ConnectionAdded { from_id: BlockId, to_id: BlockId },
    #[serde(rename = "connection:remove", rename_all = "camelCase")]
    ConnectionRemoved { from_id: BlockId, to_id: BlockId },
}

impl GraphEvent {
    /// Every block id the event refers to.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        let (a, b) = match *self {
            GraphEvent::NodeAdded { id } | GraphEvent::NodeRemoved { id } => (id, None),
            GraphEvent::ConnectionAdded { from_id, to_id }
            | GraphEvent::ConnectionRemoved { from_id, to_id } => (from_id, Some(to_id)),
        };
        std::iter::once(a).chain(b)
    }
}
