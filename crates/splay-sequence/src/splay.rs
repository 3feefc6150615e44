//! Node layer: splay rotations and tree surgery over the arena.
//!
//! All functions take the arena as a slice of [`SeqNode`] and work with
//! `u32` indices. None of them allocate or free slots; that is the
//! sequence layer's job. Every structural change recomputes `n_nodes` for
//! the nodes it touches, so the subtree-count invariant holds whenever no
//! operation is mid-flight.
//!
//! The tree has no key ordering. The only intrinsic order is the in-order
//! traversal, and [`splay`] never changes it, only the tree shape.

use std::cmp::Ordering;

use crate::node::SeqNode;

#[inline]
fn get_p<T>(a: &[SeqNode<T>], idx: u32) -> Option<u32> {
    a[idx as usize].p
}
#[inline]
fn get_l<T>(a: &[SeqNode<T>], idx: u32) -> Option<u32> {
    a[idx as usize].l
}
#[inline]
fn get_r<T>(a: &[SeqNode<T>], idx: u32) -> Option<u32> {
    a[idx as usize].r
}
#[inline]
fn set_p<T>(a: &mut [SeqNode<T>], idx: u32, v: Option<u32>) {
    a[idx as usize].p = v;
}
#[inline]
fn set_l<T>(a: &mut [SeqNode<T>], idx: u32, v: Option<u32>) {
    a[idx as usize].l = v;
}
#[inline]
fn set_r<T>(a: &mut [SeqNode<T>], idx: u32, v: Option<u32>) {
    a[idx as usize].r = v;
}

/// Subtree node count, 0 for an absent child.
#[inline]
pub(crate) fn count<T>(a: &[SeqNode<T>], idx: Option<u32>) -> u32 {
    match idx {
        Some(i) => a[i as usize].n_nodes,
        None => 0,
    }
}

/// Recompute `n_nodes` of `idx` from its children.
#[inline]
pub(crate) fn update_count<T>(a: &mut [SeqNode<T>], idx: u32) {
    let n = 1 + count(a, get_l(a, idx)) + count(a, get_r(a, idx));
    a[idx as usize].n_nodes = n;
}

/// Rotate `node` one level up, keeping the in-order traversal intact.
///
/// `node` must have a parent. Counts are recomputed for the demoted
/// parent first, then for `node`, in that order, since `node` now counts
/// the parent's subtree.
fn rotate<T>(a: &mut [SeqNode<T>], node: u32) {
    let p = get_p(a, node).expect("rotate: node is already the root");
    debug_assert_ne!(p, node, "rotate: node is its own parent");
    let pp = get_p(a, p);

    if get_l(a, p) == Some(node) {
        // rotate right
        let tmp = get_r(a, node);
        set_r(a, node, Some(p));
        set_p(a, node, pp);
        if let Some(pp) = pp {
            if get_l(a, pp) == Some(p) {
                set_l(a, pp, Some(node));
            } else {
                set_r(a, pp, Some(node));
            }
        }
        set_p(a, p, Some(node));
        set_l(a, p, tmp);
        if let Some(tmp) = tmp {
            set_p(a, tmp, Some(p));
        }
    } else {
        // rotate left
        let tmp = get_l(a, node);
        set_l(a, node, Some(p));
        set_p(a, node, pp);
        if let Some(pp) = pp {
            if get_r(a, pp) == Some(p) {
                set_r(a, pp, Some(node));
            } else {
                set_l(a, pp, Some(node));
            }
        }
        set_p(a, p, Some(node));
        set_r(a, p, tmp);
        if let Some(tmp) = tmp {
            set_p(a, tmp, Some(p));
        }
    }

    update_count(a, p);
    update_count(a, node);
}

/// Splay `node` to the root of its tree.
///
/// Applies the standard pattern: zig when the parent is the root, zig-zig
/// when node and parent are same-side children, zig-zag otherwise.
/// Amortized O(log n) over a sequence of accesses.
pub(crate) fn splay<T>(a: &mut [SeqNode<T>], node: u32) {
    while let Some(p) = get_p(a, node) {
        if get_p(a, p).is_none() {
            // zig
            rotate(a, node);
        } else {
            let pp = get_p(a, p).expect("splay: grandparent vanished");
            let node_left = get_l(a, p) == Some(node);
            let p_left = get_l(a, pp) == Some(p);
            if node_left == p_left {
                // zig-zig
                rotate(a, p);
                rotate(a, node);
            } else {
                // zig-zag
                rotate(a, node);
                rotate(a, node);
            }
        }
    }
}

/// First (leftmost) node of the tree containing `node`, splayed to root.
pub(crate) fn get_first<T>(a: &mut [SeqNode<T>], node: u32) -> u32 {
    splay(a, node);
    let mut curr = node;
    while let Some(l) = get_l(a, curr) {
        curr = l;
    }
    splay(a, curr);
    curr
}

/// Last (rightmost) node of the tree containing `node`, splayed to root.
pub(crate) fn get_last<T>(a: &mut [SeqNode<T>], node: u32) -> u32 {
    splay(a, node);
    let mut curr = node;
    while let Some(r) = get_r(a, curr) {
        curr = r;
    }
    splay(a, curr);
    curr
}

/// In-order predecessor of `node`, or `node` itself when none exists.
/// The result is splayed to the root.
pub(crate) fn get_prev<T>(a: &mut [SeqNode<T>], node: u32) -> u32 {
    splay(a, node);
    let mut curr = node;
    if let Some(l) = get_l(a, curr) {
        curr = l;
        while let Some(r) = get_r(a, curr) {
            curr = r;
        }
    }
    splay(a, curr);
    curr
}

/// In-order successor of `node`, or `node` itself when none exists.
/// The result is splayed to the root.
pub(crate) fn get_next<T>(a: &mut [SeqNode<T>], node: u32) -> u32 {
    splay(a, node);
    let mut curr = node;
    if let Some(r) = get_r(a, curr) {
        curr = r;
        while let Some(l) = get_l(a, curr) {
            curr = l;
        }
    }
    splay(a, curr);
    curr
}

/// 0-based in-order position of `node` within its tree.
pub(crate) fn get_pos<T>(a: &mut [SeqNode<T>], node: u32) -> u32 {
    splay(a, node);
    count(a, get_l(a, node))
}

/// Node at in-order offset `pos` within the tree containing `node`,
/// splayed to root. `pos` must be within `[0, tree size)`; callers clamp.
pub(crate) fn get_by_pos<T>(a: &mut [SeqNode<T>], node: u32, pos: u32) -> u32 {
    splay(a, node);
    let mut curr = node;
    let mut pos = pos;
    loop {
        let i = count(a, get_l(a, curr));
        if i == pos {
            break;
        }
        if i < pos {
            pos -= i + 1;
            curr = get_r(a, curr).expect("get_by_pos: position out of range");
        } else {
            curr = get_l(a, curr).expect("get_by_pos: position out of range");
        }
    }
    splay(a, curr);
    curr
}

/// Total node count of the tree containing `node`, splaying it to root.
#[cfg(test)]
pub(crate) fn tree_size<T>(a: &mut [SeqNode<T>], node: u32) -> u32 {
    splay(a, node);
    a[node as usize].n_nodes
}

/// Split the tree before `node`: detach and return the subtree of
/// everything in-order before `node`, leaving `node` as the root of the
/// remainder. Returns `None` when `node` is already first.
pub(crate) fn cut<T>(a: &mut [SeqNode<T>], node: u32) -> Option<u32> {
    splay(a, node);
    let left = get_l(a, node);
    if let Some(l) = left {
        set_p(a, l, None);
    }
    set_l(a, node, None);
    update_count(a, node);
    left
}

/// Join the tree containing `new` immediately before `node`.
///
/// `new` may be a single node or the root of a whole subtree; its leftmost
/// node is splayed to its root so it has no left child, then it adopts
/// `node`'s former left subtree and becomes `node`'s left child.
pub(crate) fn insert_before<T>(a: &mut [SeqNode<T>], node: u32, new: u32) {
    splay(a, node);
    let new = get_first(a, new);
    debug_assert!(get_l(a, new).is_none());

    let old_l = get_l(a, node);
    if let Some(l) = old_l {
        set_p(a, l, Some(new));
    }
    set_l(a, new, old_l);
    set_p(a, new, Some(node));
    set_l(a, node, Some(new));

    update_count(a, new);
    update_count(a, node);
}

/// Join the tree containing `new` immediately after `node`. The mirror of
/// [`insert_before`], used to stitch a suffix back onto a prefix after a
/// range has been cut out of the middle.
pub(crate) fn insert_after<T>(a: &mut [SeqNode<T>], node: u32, new: u32) {
    splay(a, node);
    let new = get_last(a, new);
    debug_assert!(get_r(a, new).is_none());

    let old_r = get_r(a, node);
    if let Some(r) = old_r {
        set_p(a, r, Some(new));
    }
    set_r(a, new, old_r);
    set_p(a, new, Some(node));
    set_r(a, node, Some(new));

    update_count(a, new);
    update_count(a, node);
}

/// Detach `node` from its tree without freeing it, re-joining its left and
/// right subtrees. Afterwards `node` is parentless, childless, and has
/// `n_nodes == 1`.
pub(crate) fn unlink<T>(a: &mut [SeqNode<T>], node: u32) {
    splay(a, node);

    let left = get_l(a, node);
    let right = get_r(a, node);

    set_p(a, node, None);
    set_l(a, node, None);
    set_r(a, node, None);
    update_count(a, node);

    if let Some(right) = right {
        set_p(a, right, None);
        let right = get_first(a, right);
        debug_assert!(get_l(a, right).is_none());
        set_l(a, right, left);
        if let Some(left) = left {
            set_p(a, left, Some(right));
            update_count(a, right);
        }
    } else if let Some(left) = left {
        set_p(a, left, None);
    }
}

/// Comparator-guided descent from the root of the tree containing `node`.
///
/// `cmp` receives the arena and the visited node's index and reports how
/// that node compares against the probe; taking the whole arena lets the
/// probe itself live in another slot. The end sentinel `end` is treated as
/// greater than everything, so the descent always terminates on a node.
/// When the final comparison was `Less`, the result steps to the in-order
/// successor, so the returned node is never smaller than the probe.
pub(crate) fn find_closest<T, F>(a: &mut [SeqNode<T>], node: u32, end: u32, mut cmp: F) -> u32
where
    F: FnMut(&[SeqNode<T>], u32) -> Ordering,
{
    splay(a, node);

    let mut curr = Some(node);
    let mut best = node;
    let mut c = Ordering::Equal;
    while let Some(i) = curr {
        best = i;
        c = if i == end {
            Ordering::Greater
        } else {
            cmp(a, i)
        };
        curr = match c {
            Ordering::Greater => get_l(a, i),
            Ordering::Less => get_r(a, i),
            Ordering::Equal => break,
        };
    }

    if best != end && c == Ordering::Less {
        best = get_next(a, best);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Arena with a sentinel at index 0 and `n` element nodes appended in
    /// order, as the sequence layer would build it.
    fn build(n: u32) -> (Vec<SeqNode<u32>>, u32) {
        let mut a = vec![SeqNode::new(0, None)];
        for v in 0..n {
            a.push(SeqNode::new(u64::from(v) + 1, Some(v)));
            let idx = a.len() as u32 - 1;
            insert_before(&mut a, 0, idx);
        }
        (a, 0)
    }

    fn inorder(a: &mut [SeqNode<u32>], end: u32) -> Vec<u32> {
        let mut out = Vec::new();
        let mut curr = get_first(a, end);
        while curr != end {
            out.push(a[curr as usize].data.unwrap());
            let next = get_next(a, curr);
            assert_ne!(next, curr);
            curr = next;
        }
        out
    }

    #[test]
    fn insert_before_keeps_order_and_counts() {
        let (mut a, end) = build(5);
        assert_eq!(inorder(&mut a, end), vec![0, 1, 2, 3, 4]);
        assert_eq!(tree_size(&mut a, end), 6);
    }

    #[test]
    fn get_by_pos_finds_every_offset() {
        let (mut a, end) = build(7);
        for pos in 0..7 {
            let node = get_by_pos(&mut a, end, pos);
            assert_eq!(a[node as usize].data, Some(pos));
            assert_eq!(get_pos(&mut a, node), pos);
        }
        let node = get_by_pos(&mut a, end, 7);
        assert_eq!(node, end);
    }

    #[test]
    fn prev_and_next_walk_the_sequence() {
        let (mut a, end) = build(3);
        let first = get_first(&mut a, end);
        assert_eq!(get_prev(&mut a, first), first);

        let second = get_next(&mut a, first);
        let third = get_next(&mut a, second);
        assert_eq!(a[second as usize].data, Some(1));
        assert_eq!(a[third as usize].data, Some(2));
        assert_eq!(get_next(&mut a, third), end);
        assert_eq!(get_next(&mut a, end), end);
    }

    #[test]
    fn cut_detaches_the_prefix() {
        let (mut a, end) = build(4);
        let node = get_by_pos(&mut a, end, 2);
        let left = cut(&mut a, node).unwrap();

        assert_eq!(tree_size(&mut a, left), 2);
        // node now anchors [2, 3, end]
        assert_eq!(tree_size(&mut a, node), 3);
        assert_eq!(get_pos(&mut a, node), 0);

        // re-join restores the original order
        insert_before(&mut a, node, left);
        assert_eq!(inorder(&mut a, end), vec![0, 1, 2, 3]);
    }

    #[test]
    fn unlink_isolates_a_single_node() {
        let (mut a, end) = build(4);
        let node = get_by_pos(&mut a, end, 1);
        unlink(&mut a, node);

        assert_eq!(a[node as usize].n_nodes, 1);
        assert_eq!(a[node as usize].p, None);
        assert_eq!(inorder(&mut a, end), vec![0, 2, 3]);
        assert_eq!(tree_size(&mut a, end), 4);
    }

    #[test]
    fn splay_preserves_inorder_traversal() {
        let (mut a, end) = build(6);
        for idx in 1..=6u32 {
            splay(&mut a, idx);
            assert_eq!(a[idx as usize].p, None);
        }
        assert_eq!(inorder(&mut a, end), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn find_closest_lands_on_first_not_less() {
        let (mut a, end) = build(0);
        // values 10, 20, 30
        for v in [10u32, 20, 30] {
            a.push(SeqNode::new(u64::from(v), Some(v)));
            let idx = a.len() as u32 - 1;
            insert_before(&mut a, end, idx);
        }

        let hit = find_closest(&mut a, end, end, |a, i| a[i as usize].data.unwrap().cmp(&20));
        assert_eq!(a[hit as usize].data, Some(20));

        let hit = find_closest(&mut a, end, end, |a, i| a[i as usize].data.unwrap().cmp(&15));
        assert_eq!(a[hit as usize].data, Some(20));

        let hit = find_closest(&mut a, end, end, |a, i| a[i as usize].data.unwrap().cmp(&99));
        assert_eq!(hit, end);
    }
}
