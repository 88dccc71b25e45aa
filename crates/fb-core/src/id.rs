use lasso::{Spur, ThreadedRodeo};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;

/// Global string interner for template names.
static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::default);

/// Identifier of a block on the canvas.
///
/// Assigned by the graph store from a monotonic counter and never reused,
/// so ids held by undo entries stay valid after delete-then-create sequences.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u64);

impl BlockId {
    /// Largest id a block can have: the largest integer a JSON number (and a
    /// JavaScript host) holds exactly.
    pub const MAX: BlockId = BlockId((1 << 53) - 1);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out block ids. Never goes backwards.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl IdAllocator {
    /// Hand out the next id, or `None` once every id up to `BlockId::MAX` is used.
    pub fn allocate(&mut self) -> Option<BlockId> {
        let id = BlockId(self.next);
        if id > BlockId::MAX {
            return None;
        }
        self.next += 1;
        Some(id)
    }

    /// Make sure `id` will never be handed out again.
    pub fn reserve(&mut self, id: BlockId) {
        if id.0 >= self.next {
            self.next = id.0.saturating_add(1);
        }
    }

    pub fn peek(&self) -> BlockId {
        BlockId(self.next)
    }
}

/// Interned palette template name (e.g. `action`, `condition`).
/// Internally a 4-byte `Spur` index.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateId(Spur);

impl TemplateId {
    /// Intern a template name, or return the existing handle.
    pub fn intern(s: &str) -> Self {
        TemplateId(INTERNER.get_or_intern(s))
    }

    /// Resolve back to a string slice.
    pub fn as_str(&self) -> &str {
        INTERNER.resolve(&self.0)
    }
}

impl fmt::Debug for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.as_str())
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TemplateId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TemplateId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(TemplateId::intern(&s))
    }
}
