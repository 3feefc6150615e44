//! Arena-based splay-tree ordered sequence.
//!
//! A [`Sequence`] stores an ordered list of opaque elements in a
//! self-adjusting binary search tree used as an order-statistics
//! structure: the tree has no key, only in-order position, and subtree
//! counts make position-based lookup amortized O(log n). Insertion at any
//! position, removal, predecessor/successor, split, splice, position
//! queries, sorted insertion, and an extract-and-reinsert sort all run in
//! amortized logarithmic time.
//!
//! Instead of raw pointers, every tree link is an `Option<u32>` index into
//! a `Vec`-backed arena owned by the sequence, and the iterator type
//! [`SeqIter`] is an opaque, copyable slot index. Splay rotations move
//! nodes around the tree but never move them in the arena, so an iterator
//! stays a valid reference to its element across arbitrary restructuring,
//! including restructuring triggered by lookups through other iterators.
//! It is invalidated only when its element is removed.
//!
//! Each sequence anchors its tree on a single end sentinel, the
//! one-past-the-last position; a sequence's length is the sentinel's
//! subtree count minus one.
//!
//! # Module layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | `node` | Arena slot type with links, subtree count, payload |
//! | `splay` | Node layer: rotations, split/join, position arithmetic |
//! | [`sequence`] | Sequence layer: public operations, sentinel, sort/search |
//! | [`error`] | Diagnostic error type for the consistency checker |
//!
//! Sequences are single-threaded: even read-like lookups splay and thus
//! mutate tree shape, which is why they take `&mut self`.

mod node;
mod splay;

pub mod error;
pub mod sequence;

pub use error::ConsistencyError;
pub use sequence::{SeqIter, Sequence};
