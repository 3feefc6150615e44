//! Sequence layer: the public container built on the node-layer surgery.
//!
//! A [`Sequence`] owns an arena of [`SeqNode`] slots and a single end
//! sentinel that anchors the tree and stands for the one-past-the-last
//! position. All public operations delegate to the splay primitives and
//! walk from the sentinel.
//!
//! Because even lookups splay the accessed node to the root, almost every
//! operation takes `&mut self`; the exclusive borrow is also what makes
//! reentrant mutation from comparators and traversal callbacks impossible
//! to express, since those callbacks only ever receive `&T`.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

use crate::error::ConsistencyError;
use crate::node::SeqNode;
use crate::splay as tree;

static NEXT_SEQUENCE_ID: AtomicU32 = AtomicU32::new(1);

/// A stable reference to one position in a [`Sequence`].
///
/// An iterator is a copyable arena index: splay rotations, splits, joins,
/// and moves never invalidate it, and it keeps denoting the same element
/// until that element is removed. The value returned by [`Sequence::end`]
/// denotes the one-past-the-last position and is never removed.
///
/// Iterators carry the id of the sequence that minted them, so handing an
/// iterator to a different sequence is detected (fatal in debug builds).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SeqIter {
    seq: u32,
    node: u32,
}

impl SeqIter {
    /// Id of the sequence this iterator belongs to.
    pub fn sequence_id(self) -> u32 {
        self.seq
    }
}

/// An ordered sequence of elements backed by a splay tree keyed by
/// position only.
///
/// Insert, remove, split, splice, position lookup, and neighbour queries
/// are all amortized O(log n). Elements are opaque; comparators are
/// supplied per call for sorted insertion and sorting.
pub struct Sequence<T> {
    arena: Vec<SeqNode<T>>,
    free: Vec<u32>,
    end: u32,
    id: u32,
    next_serial: u64,
    access_prohibited: bool,
    evict: Option<Box<dyn FnMut(T)>>,
}

impl<T> Sequence<T> {
    /// New empty sequence. Evicted elements are simply dropped.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// New empty sequence with an eviction hook.
    ///
    /// The hook receives each element exactly once, by value, when the
    /// element is removed or the sequence is dropped, never both.
    pub fn with_eviction_hook<F>(hook: F) -> Self
    where
        F: FnMut(T) + 'static,
    {
        Self::build(Some(Box::new(hook)))
    }

    fn build(evict: Option<Box<dyn FnMut(T)>>) -> Self {
        let mut seq = Sequence {
            arena: Vec::new(),
            free: Vec::new(),
            end: 0,
            id: NEXT_SEQUENCE_ID.fetch_add(1, AtomicOrdering::Relaxed),
            next_serial: 0,
            access_prohibited: false,
            evict,
        };
        seq.end = seq.alloc(None);
        seq
    }

    /// Process-unique id of this sequence, matched by
    /// [`SeqIter::sequence_id`] for every iterator it mints.
    pub fn sequence_id(&self) -> u32 {
        self.id
    }

    /// Number of elements, excluding the end sentinel.
    pub fn len(&self) -> usize {
        self.arena.len() - self.free.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── slot management ───────────────────────────────────────────────

    fn alloc(&mut self, data: Option<T>) -> u32 {
        let serial = self.next_serial;
        self.next_serial += 1;
        match self.free.pop() {
            Some(idx) => {
                self.arena[idx as usize] = SeqNode::new(serial, data);
                idx
            }
            None => {
                self.arena.push(SeqNode::new(serial, data));
                (self.arena.len() - 1) as u32
            }
        }
    }

    /// Return a slot to the free-list, firing the eviction hook if the
    /// slot held an element.
    fn release(&mut self, idx: u32) {
        let node = &mut self.arena[idx as usize];
        node.p = None;
        node.l = None;
        node.r = None;
        node.n_nodes = 1;
        let data = node.data.take();
        if let Some(value) = data {
            if let Some(hook) = self.evict.as_mut() {
                hook(value);
            }
        }
        self.free.push(idx);
    }

    /// Free every node of a detached tree, iteratively. `node` may sit
    /// anywhere in the tree; it is splayed first so the whole tree hangs
    /// below it. A splay tree gives no height bound, so the traversal uses
    /// an explicit work-list instead of recursion.
    fn free_subtree(&mut self, node: u32) {
        tree::splay(&mut self.arena, node);
        let mut stack = vec![node];
        while let Some(idx) = stack.pop() {
            if let Some(l) = self.arena[idx as usize].l {
                stack.push(l);
            }
            if let Some(r) = self.arena[idx as usize].r {
                stack.push(r);
            }
            self.release(idx);
        }
    }

    fn iter(&self, node: u32) -> SeqIter {
        SeqIter { seq: self.id, node }
    }

    fn check_iter(&self, iter: SeqIter) -> u32 {
        debug_assert_eq!(
            iter.seq, self.id,
            "iterator belongs to a different sequence"
        );
        iter.node
    }

    fn check_access(&self) {
        debug_assert!(
            !self.access_prohibited,
            "sequence accessed while it is being sorted or traversed"
        );
    }

    /// Engage the structural guard for the duration of a bulk operation.
    /// The returned scope clears the flag when dropped, so an unwinding
    /// callback cannot leave the sequence permanently locked.
    fn lock_access(&mut self) -> AccessScope<'_, T> {
        self.access_prohibited = true;
        AccessScope(self)
    }

    // ── insertion ─────────────────────────────────────────────────────

    /// Insert `value` at the back. Returns its iterator.
    pub fn append(&mut self, value: T) -> SeqIter {
        self.check_access();
        let node = self.alloc(Some(value));
        tree::insert_before(&mut self.arena, self.end, node);
        self.iter(node)
    }

    /// Insert `value` at the front. Returns its iterator.
    pub fn prepend(&mut self, value: T) -> SeqIter {
        self.check_access();
        let node = self.alloc(Some(value));
        let first = tree::get_first(&mut self.arena, self.end);
        tree::insert_before(&mut self.arena, first, node);
        self.iter(node)
    }

    /// Insert `value` just before `iter`. Passing [`Sequence::end`] is
    /// equivalent to [`Sequence::append`]. Returns the new iterator.
    pub fn insert_before(&mut self, iter: SeqIter, value: T) -> SeqIter {
        self.check_access();
        let at = self.check_iter(iter);
        let node = self.alloc(Some(value));
        tree::insert_before(&mut self.arena, at, node);
        self.iter(node)
    }

    /// Insert `value` at the position determined by `cmp`.
    ///
    /// When `cmp` reports equality against existing elements the new
    /// element lands after them: ties are broken by insertion serial, so
    /// repeated sorted insertion is stable and deterministic.
    pub fn insert_sorted<F>(&mut self, value: T, mut cmp: F) -> SeqIter
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.check_access();
        let end = self.end;
        let serial = self.next_serial;
        let closest = tree::find_closest(&mut self.arena, end, end, |a, i| {
            let n = &a[i as usize];
            let elem = n.data.as_ref().expect("element node without payload");
            match cmp(elem, &value) {
                Ordering::Equal => n.serial.cmp(&serial),
                c => c,
            }
        });
        let node = self.alloc(Some(value));
        tree::insert_before(&mut self.arena, closest, node);
        self.iter(node)
    }

    /// Sorted insertion of an existing, unlinked node. The probe payload
    /// stays in its arena slot; the comparator reads it through the arena
    /// view the descent passes along.
    fn insert_node_sorted<F>(&mut self, node: u32, cmp: &mut F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let serial = self.arena[node as usize].serial;
        let end = self.end;
        let closest = tree::find_closest(&mut self.arena, end, end, |a, i| {
            let probe = a[node as usize]
                .data
                .as_ref()
                .expect("sorting a node without payload");
            let n = &a[i as usize];
            let elem = n.data.as_ref().expect("element node without payload");
            match cmp(elem, probe) {
                Ordering::Equal => n.serial.cmp(&serial),
                c => c,
            }
        });
        tree::insert_before(&mut self.arena, closest, node);
    }

    // ── removal & relocation ──────────────────────────────────────────

    /// Remove the element at `iter`, evicting its payload. Removing the
    /// end iterator is a precondition violation: fatal in debug builds, a
    /// no-op in release.
    pub fn remove(&mut self, iter: SeqIter) {
        self.check_access();
        let node = self.check_iter(iter);
        debug_assert_ne!(node, self.end, "cannot remove the end iterator");
        if node == self.end {
            return;
        }
        tree::unlink(&mut self.arena, node);
        self.release(node);
    }

    /// Remove the half-open range `[begin, end)`, evicting every element
    /// in it. Two splits isolate the range in O(log n); no per-element
    /// walk happens.
    pub fn remove_range(&mut self, begin: SeqIter, end: SeqIter) {
        self.move_range(None, begin, end);
    }

    /// Relocate the half-open range `[begin, end)` to just before `dest`,
    /// or remove it when `dest` is `None`.
    ///
    /// Defined no-ops, detected without structural change: `dest` equal to
    /// `begin` or `end`; `begin` at or after `end`; `dest` strictly inside
    /// the open interval `(begin, end)`.
    pub fn move_range(&mut self, dest: Option<SeqIter>, begin: SeqIter, end: SeqIter) {
        self.check_access();
        let begin = self.check_iter(begin);
        let end = self.check_iter(end);
        let dest = dest.map(|d| self.check_iter(d));

        if dest == Some(begin) || dest == Some(end) {
            return;
        }

        let begin_pos = tree::get_pos(&mut self.arena, begin);
        let end_pos = tree::get_pos(&mut self.arena, end);
        if begin_pos >= end_pos {
            return;
        }
        if let Some(d) = dest {
            let d_pos = tree::get_pos(&mut self.arena, d);
            if d_pos > begin_pos && d_pos < end_pos {
                return;
            }
        }

        let first = tree::get_first(&mut self.arena, begin);
        tree::cut(&mut self.arena, begin);
        tree::cut(&mut self.arena, end);
        if first != begin {
            // stitch the prefix back onto the suffix
            let last = tree::get_last(&mut self.arena, first);
            tree::insert_after(&mut self.arena, last, end);
        }

        match dest {
            Some(d) => tree::insert_before(&mut self.arena, d, begin),
            None => self.free_subtree(begin),
        }
    }

    /// Move the single element at `src` to just before `dest`; the
    /// one-element form of [`Sequence::move_range`].
    pub fn move_to(&mut self, src: SeqIter, dest: SeqIter) {
        self.check_access();
        let src = self.check_iter(src);
        let dest = self.check_iter(dest);
        debug_assert_ne!(src, self.end, "cannot move the end iterator");
        if src == self.end {
            return;
        }
        self.move_node(src, dest);
    }

    fn move_node(&mut self, src: u32, dest: u32) {
        if src == dest {
            return;
        }
        tree::unlink(&mut self.arena, src);
        tree::insert_before(&mut self.arena, dest, src);
    }

    /// Exchange the positions of the elements at `a` and `b`. Built
    /// entirely from single-element moves, so it inherits their O(log n)
    /// bound and degenerate-case handling.
    pub fn swap(&mut self, a: SeqIter, b: SeqIter) {
        self.check_access();
        let a = self.check_iter(a);
        let b = self.check_iter(b);
        debug_assert_ne!(a, self.end, "cannot swap the end iterator");
        debug_assert_ne!(b, self.end, "cannot swap the end iterator");
        if a == b || a == self.end || b == self.end {
            return;
        }

        let a_pos = tree::get_pos(&mut self.arena, a);
        let b_pos = tree::get_pos(&mut self.arena, b);
        let (leftmost, rightmost) = if a_pos > b_pos { (b, a) } else { (a, b) };
        let rightmost_next = tree::get_next(&mut self.arena, rightmost);

        self.move_node(rightmost, leftmost);
        self.move_node(leftmost, rightmost_next);
    }

    /// Replace the element at `iter`. The old payload is evicted
    /// unconditionally before the new one is stored, even if the two are
    /// equal.
    pub fn set(&mut self, iter: SeqIter, value: T) {
        self.check_access();
        let node = self.check_iter(iter);
        debug_assert_ne!(node, self.end, "cannot set the end iterator");
        if node == self.end {
            return;
        }
        let old = self.arena[node as usize].data.replace(value);
        if let Some(old) = old {
            if let Some(hook) = self.evict.as_mut() {
                hook(old);
            }
        }
    }

    /// Remove every element, keeping the sequence usable.
    pub fn clear(&mut self) {
        self.check_access();
        let end = self.end;
        if let Some(root) = tree::cut(&mut self.arena, end) {
            self.free_subtree(root);
        }
    }

    // ── navigation & element access ───────────────────────────────────

    /// Iterator to the first element, or [`Sequence::end`] when empty.
    pub fn begin(&mut self) -> SeqIter {
        let node = tree::get_first(&mut self.arena, self.end);
        self.iter(node)
    }

    /// Iterator to the one-past-the-last position.
    pub fn end(&self) -> SeqIter {
        SeqIter {
            seq: self.id,
            node: self.end,
        }
    }

    /// Successor of `iter`; the end iterator is its own successor.
    pub fn next(&mut self, iter: SeqIter) -> SeqIter {
        let node = self.check_iter(iter);
        let next = tree::get_next(&mut self.arena, node);
        self.iter(next)
    }

    /// Predecessor of `iter`; the first iterator is its own predecessor.
    pub fn prev(&mut self, iter: SeqIter) -> SeqIter {
        let node = self.check_iter(iter);
        let prev = tree::get_prev(&mut self.arena, node);
        self.iter(prev)
    }

    pub fn is_end(&self, iter: SeqIter) -> bool {
        self.check_iter(iter) == self.end
    }

    pub fn is_begin(&mut self, iter: SeqIter) -> bool {
        let node = self.check_iter(iter);
        tree::get_prev(&mut self.arena, node) == node
    }

    /// 0-based position of `iter`; the end iterator reports the length.
    pub fn position_of(&mut self, iter: SeqIter) -> usize {
        let node = self.check_iter(iter);
        tree::get_pos(&mut self.arena, node) as usize
    }

    /// Iterator at position `pos`. Positions past the length (including
    /// `usize::MAX` as a "not found" marker) clamp to the length, i.e.
    /// the end iterator.
    pub fn at_position(&mut self, pos: usize) -> SeqIter {
        let pos = pos.min(self.len());
        let node = tree::get_by_pos(&mut self.arena, self.end, pos as u32);
        self.iter(node)
    }

    /// Jump `delta` positions from `iter`, clamping at both ends of the
    /// sequence.
    pub fn iter_move(&mut self, iter: SeqIter, delta: isize) -> SeqIter {
        let node = self.check_iter(iter);
        let pos = (tree::get_pos(&mut self.arena, node) as isize).saturating_add(delta);
        let pos = pos.clamp(0, self.len() as isize);
        let node = tree::get_by_pos(&mut self.arena, node, pos as u32);
        self.iter(node)
    }

    /// Order two iterators of this sequence by position.
    pub fn iter_compare(&mut self, a: SeqIter, b: SeqIter) -> Ordering {
        let a = self.check_iter(a);
        let b = self.check_iter(b);
        let a_pos = tree::get_pos(&mut self.arena, a);
        let b_pos = tree::get_pos(&mut self.arena, b);
        a_pos.cmp(&b_pos)
    }

    /// Iterator at the positional midpoint of `[begin, end)`. A reversed
    /// range is a precondition violation; in release it yields `begin`.
    pub fn range_midpoint(&mut self, begin: SeqIter, end: SeqIter) -> SeqIter {
        let begin = self.check_iter(begin);
        let end = self.check_iter(end);
        let begin_pos = tree::get_pos(&mut self.arena, begin);
        let end_pos = tree::get_pos(&mut self.arena, end);
        debug_assert!(end_pos >= begin_pos, "range_midpoint: reversed range");
        if end_pos <= begin_pos {
            return self.iter(begin);
        }
        let mid = begin_pos + (end_pos - begin_pos) / 2;
        let node = tree::get_by_pos(&mut self.arena, begin, mid);
        self.iter(node)
    }

    /// Element at `iter`, `None` for the end iterator.
    pub fn get(&self, iter: SeqIter) -> Option<&T> {
        let node = self.check_iter(iter);
        self.arena[node as usize].data.as_ref()
    }

    /// Mutable element access. Does not fire the eviction hook; use
    /// [`Sequence::set`] for destroy-then-store replacement.
    pub fn get_mut(&mut self, iter: SeqIter) -> Option<&mut T> {
        let node = self.check_iter(iter);
        self.arena[node as usize].data.as_mut()
    }

    // ── search & sort ─────────────────────────────────────────────────

    /// Binary-search descent for `probe` under `cmp`, which compares an
    /// element against the probe. Returns an element comparing equal, or
    /// the first element greater than the probe, or the end iterator when
    /// the probe is greater than everything. Never changes element order.
    pub fn closest_match<F>(&mut self, probe: &T, mut cmp: F) -> SeqIter
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let end = self.end;
        let node = tree::find_closest(&mut self.arena, end, end, |a, i| {
            let elem = a[i as usize]
                .data
                .as_ref()
                .expect("element node without payload");
            cmp(elem, probe)
        });
        self.iter(node)
    }

    /// Re-position a single element whose sort key changed, assuming the
    /// rest of the sequence is sorted under `cmp`.
    pub fn sort_changed<F>(&mut self, iter: SeqIter, mut cmp: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.check_access();
        let node = self.check_iter(iter);
        debug_assert_ne!(node, self.end, "cannot sort the end iterator");
        if node == self.end {
            return;
        }
        let mut scope = self.lock_access();
        tree::unlink(&mut scope.0.arena, node);
        scope.0.insert_node_sorted(node, &mut cmp);
    }

    /// Sort the sequence under `cmp`. Elements comparing equal keep their
    /// insertion order relative to each other.
    ///
    /// The whole tree is split off under a scratch root in the same arena,
    /// then every element is re-inserted in sorted position: O(n log n)
    /// amortized, and every iterator stays valid throughout. A splay tree
    /// has no global shape invariant for an in-place array sort to
    /// exploit, so extract-and-reinsert is also the only way to re-sort a
    /// drifted tree; as a side effect the tree comes out rebalanced.
    pub fn sort<F>(&mut self, mut cmp: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.check_access();
        if self.len() < 2 {
            return;
        }

        let end = self.end;
        let scratch = self.alloc(None);
        let elems = tree::cut(&mut self.arena, end).expect("non-empty sequence has no elements");
        tree::insert_before(&mut self.arena, scratch, elems);

        let mut scope = self.lock_access();
        loop {
            let node = tree::get_first(&mut scope.0.arena, scratch);
            if node == scratch {
                break;
            }
            tree::unlink(&mut scope.0.arena, node);
            scope.0.insert_node_sorted(node, &mut cmp);
        }
        drop(scope);

        self.release(scratch);
    }

    // ── bulk traversal ────────────────────────────────────────────────

    /// Visit every element of `[begin, end)` in order. The successor is
    /// computed before each callback runs.
    pub fn foreach_range<F>(&mut self, begin: SeqIter, end: SeqIter, mut f: F)
    where
        F: FnMut(SeqIter, &T),
    {
        self.check_access();
        let begin = self.check_iter(begin);
        let end = self.check_iter(end);

        let mut scope = self.lock_access();
        let mut curr = begin;
        while curr != end {
            let next = tree::get_next(&mut scope.0.arena, curr);
            if let Some(value) = scope.0.arena[curr as usize].data.as_ref() {
                f(SeqIter { seq: scope.0.id, node: curr }, value);
            }
            if next == curr {
                // ran off the back of the tree; end was not ahead of begin
                break;
            }
            curr = next;
        }
    }

    /// Visit every element in order.
    pub fn foreach<F>(&mut self, f: F)
    where
        F: FnMut(SeqIter, &T),
    {
        let begin = self.begin();
        let end = self.end();
        self.foreach_range(begin, end, f);
    }

    /// Worklist-driven midpoint bisection for locating structural
    /// boundaries. Starting from the whole sequence, each interval for
    /// which `f` returns true is split at its positional midpoint and both
    /// halves are queued, until every interval is a singleton. `f` may
    /// inspect the sequence through position and element queries; the
    /// structural guard is engaged for the whole bisection, so calling a
    /// mutating operation from inside `f` is a usage error, fatal in debug
    /// builds.
    pub fn search_binary<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Self, SeqIter, SeqIter) -> bool,
    {
        self.check_access();
        let mut intervals = VecDeque::new();
        let begin = tree::get_first(&mut self.arena, self.end);
        intervals.push_back((begin, self.end));

        let mut scope = self.lock_access();
        while let Some((b, e)) = intervals.pop_front() {
            let (bi, ei) = (scope.0.iter(b), scope.0.iter(e));
            let keep = f(&mut *scope.0, bi, ei);
            if !keep {
                continue;
            }
            let b_pos = tree::get_pos(&mut scope.0.arena, b);
            let e_pos = tree::get_pos(&mut scope.0.arena, e);
            if e_pos > b_pos + 1 {
                let mid_pos = b_pos + (e_pos - b_pos) / 2;
                let mid = tree::get_by_pos(&mut scope.0.arena, b, mid_pos);
                intervals.push_back((b, mid));
                intervals.push_back((mid, e));
            }
        }
    }

    // ── diagnostics ───────────────────────────────────────────────────

    /// Walk the whole tree and verify the subtree-count invariant and the
    /// coherence of parent/child links. Intended for test suites.
    pub fn self_check(&self) -> Result<(), ConsistencyError> {
        let mut root = self.end;
        let mut hops = 0usize;
        while let Some(p) = self.arena[root as usize].p {
            if p == root || hops > self.arena.len() {
                return Err(ConsistencyError::ParentCycle { node: root });
            }
            root = p;
            hops += 1;
        }

        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            let node = &self.arena[idx as usize];
            if node.p == Some(idx) {
                return Err(ConsistencyError::ParentCycle { node: idx });
            }
            let mut expected = 1;
            for child in [node.l, node.r].into_iter().flatten() {
                if self.arena[child as usize].p != Some(idx) {
                    return Err(ConsistencyError::BadParentLink { parent: idx, child });
                }
                expected += self.arena[child as usize].n_nodes;
                stack.push(child);
            }
            if node.n_nodes != expected {
                return Err(ConsistencyError::CountMismatch {
                    node: idx,
                    expected,
                    actual: node.n_nodes,
                });
            }
        }
        Ok(())
    }

    /// Height of the tree as it currently stands. A splay tree is not
    /// height-bounded, so this is only meaningful as a diagnostic.
    pub fn tree_height(&self) -> usize {
        let mut root = self.end;
        while let Some(p) = self.arena[root as usize].p {
            root = p;
        }
        let mut height = 0;
        let mut stack = vec![(root, 1usize)];
        while let Some((idx, depth)) = stack.pop() {
            height = height.max(depth);
            if let Some(l) = self.arena[idx as usize].l {
                stack.push((l, depth + 1));
            }
            if let Some(r) = self.arena[idx as usize].r {
                stack.push((r, depth + 1));
            }
        }
        height
    }
}

/// Exclusive view of a sequence with the structural guard engaged;
/// clears the guard on drop, including during unwinding.
struct AccessScope<'a, T>(&'a mut Sequence<T>);

impl<T> Drop for AccessScope<'_, T> {
    fn drop(&mut self) {
        self.0.access_prohibited = false;
    }
}

impl<T> Default for Sequence<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Sequence<T> {
    /// Evict every remaining element. The arena is swept flat, no tree
    /// walk and no recursion, so pathological tree shapes cannot overflow
    /// the stack.
    fn drop(&mut self) {
        if let Some(mut hook) = self.evict.take() {
            for slot in &mut self.arena {
                if let Some(value) = slot.data.take() {
                    hook(value);
                }
            }
        }
    }
}
