/// Database row types for the leaf table.
/// Values are JSON-encoded scalars; paths use `/` separators.

pub struct NodeRow {
    /// Path relative to the subtree that was read; empty for the root leaf.
    pub path: String,
    pub value: String,
}

/// Replacement of the subtree at `path` by `leaves` (absolute paths).
/// An empty leaf list deletes the subtree.
pub struct SubtreeWrite {
    pub path: String,
    pub leaves: Vec<(String, String)>,
}
