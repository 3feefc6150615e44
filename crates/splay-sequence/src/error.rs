//! Diagnostic error type surfaced by the consistency checker.

use thiserror::Error;

/// A defect detected while walking the tree. Any of these indicates a bug
/// in the node-layer primitives, not a caller error; the checker is meant
/// for test suites, not production call sites.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("subtree count of node {node} is {actual}, expected {expected}")]
    CountMismatch {
        node: u32,
        expected: u32,
        actual: u32,
    },

    #[error("parent links of node {node} form a cycle")]
    ParentCycle { node: u32 },

    #[error("node {child} is a child of {parent} but its parent link points elsewhere")]
    BadParentLink { parent: u32, child: u32 },
}
