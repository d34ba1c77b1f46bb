// ── State store boundary ──
//
// The core writes into a hierarchical state store through `StateSink`
// and never reads back from it to make decisions. `TreeStore` is the
// in-memory implementation used by the binary and the tests.

mod node;
mod path;
mod tree;

pub use node::{NodeKind, NodeSpec, ScalarType, ScalarValue};
pub use path::{MAX_SEGMENT_LEN, NodePath, PATH_DELIMITER, sanitize_segment};
pub use tree::{CommandWrite, Node, TreeStore};

/// Write side of a hierarchical state store.
///
/// Both operations are idempotent and infallible from the caller's point
/// of view; a store that can fail logs and swallows the error.
pub trait StateSink: Send + Sync {
    /// Create the node if it does not exist. An existing node keeps its
    /// label and kind.
    fn ensure_node(&self, path: &NodePath, spec: &NodeSpec);

    /// Upsert a leaf value. `ack = false` marks an inbound command write.
    fn set_value(&self, path: &NodePath, value: ScalarValue, ack: bool);
}
