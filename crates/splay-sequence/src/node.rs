//! Arena slot type for the sequence tree.
//!
//! Every "pointer" is an `Option<u32>` index into the [`Vec`]-backed arena
//! owned by a `Sequence`. A slot holds either a live element (`data` is
//! `Some`), the sequence's end sentinel, or nothing at all while the slot
//! sits on the free-list; the latter two are distinguished by the sequence,
//! which knows its sentinel index.

/// One slot of the sequence arena.
///
/// `n_nodes` counts the nodes of the subtree rooted here, including the
/// node itself. It is what makes position lookups O(log n): descending
/// from the root, the size of the left subtree tells which side a given
/// in-order offset lives on.
#[derive(Debug)]
pub(crate) struct SeqNode<T> {
    pub n_nodes: u32,
    pub p: Option<u32>,
    pub l: Option<u32>,
    pub r: Option<u32>,
    /// Monotonic insertion serial, the tie-break that keeps sorted
    /// insertion stable when a user comparator reports equality.
    pub serial: u64,
    /// `None` for the end sentinel and for slots on the free-list.
    pub data: Option<T>,
}

impl<T> SeqNode<T> {
    pub(crate) fn new(serial: u64, data: Option<T>) -> Self {
        Self {
            n_nodes: 1,
            p: None,
            l: None,
            r: None,
            serial,
            data,
        }
    }
}
