//! Model-based tests driving a [`Sequence`] and a plain `Vec` through the
//! same random operation streams and asserting they never disagree.

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use splay_sequence::Sequence;

const N_OPS: usize = 60;

#[derive(Debug, Clone)]
enum Op {
    Append,
    Prepend,
    InsertAt(u16),
    RemoveAt(u16),
    RemoveRange(u16, u16),
    MoveRange(u16, u16, u16),
    Swap(u16, u16),
    Sort,
}

fn arbitrary_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Append),
        Just(Op::Prepend),
        any::<u16>().prop_map(Op::InsertAt),
        any::<u16>().prop_map(Op::RemoveAt),
        (any::<u16>(), any::<u16>()).prop_map(|(b, e)| Op::RemoveRange(b, e)),
        (any::<u16>(), any::<u16>(), any::<u16>())
            .prop_map(|(d, b, e)| Op::MoveRange(d, b, e)),
        (any::<u16>(), any::<u16>()).prop_map(|(a, b)| Op::Swap(a, b)),
        Just(Op::Sort),
    ]
}

fn collect(seq: &mut Sequence<u64>) -> Vec<u64> {
    let mut out = Vec::new();
    seq.foreach(|_, v| out.push(*v));
    out
}

/// Apply one operation to both the sequence and the `Vec` model,
/// recording every element the model considers removed. Elements are
/// minted from a counter so every value is unique, which keeps the
/// model's `sort` unambiguous.
fn apply(
    seq: &mut Sequence<u64>,
    model: &mut Vec<u64>,
    removed: &mut Vec<u64>,
    serial: &mut u64,
    op: &Op,
) {
    let len = model.len();
    let mut mint = || {
        *serial += 1;
        *serial
    };
    match *op {
        Op::Append => {
            let v = mint();
            seq.append(v);
            model.push(v);
        }
        Op::Prepend => {
            let v = mint();
            seq.prepend(v);
            model.insert(0, v);
        }
        Op::InsertAt(p) => {
            let p = p as usize % (len + 1);
            let v = mint();
            let at = seq.at_position(p);
            seq.insert_before(at, v);
            model.insert(p, v);
        }
        Op::RemoveAt(p) => {
            if len == 0 {
                return;
            }
            let p = p as usize % len;
            let at = seq.at_position(p);
            seq.remove(at);
            removed.push(model.remove(p));
        }
        Op::RemoveRange(b, e) => {
            let b = b as usize % (len + 1);
            let e = e as usize % (len + 1);
            let begin = seq.at_position(b);
            let end = seq.at_position(e);
            seq.remove_range(begin, end);
            // a reversed interval is a defined no-op
            if b >= e {
                return;
            }
            removed.extend(model.drain(b..e));
        }
        Op::MoveRange(d, b, e) => {
            let d = d as usize % (len + 1);
            let b = b as usize % (len + 1);
            let e = e as usize % (len + 1);
            let dest = seq.at_position(d);
            let begin = seq.at_position(b);
            let end = seq.at_position(e);
            seq.move_range(Some(dest), begin, end);
            // mirror the degenerate no-ops: empty range, dest touching the
            // range boundary, dest strictly inside the range
            if b >= e || d == b || d == e || (b < d && d < e) {
                return;
            }
            let moved: Vec<u64> = model.drain(b..e).collect();
            let at = if d < b { d } else { d - (e - b) };
            model.splice(at..at, moved);
        }
        Op::Swap(a, b) => {
            if len == 0 {
                return;
            }
            let a = a as usize % len;
            let b = b as usize % len;
            let ia = seq.at_position(a);
            let ib = seq.at_position(b);
            seq.swap(ia, ib);
            model.swap(a, b);
        }
        Op::Sort => {
            seq.sort(u64::cmp);
            model.sort_unstable();
        }
    }
}

proptest! {
    /// Random edit streams leave the sequence equal to the `Vec` model
    /// after every single step, with a structurally sound tree, and the
    /// eviction hook fires for exactly the elements the model removed.
    #[test]
    fn prop_matches_vec_model(
        ops in prop::collection::vec(arbitrary_op(), 0..N_OPS),
    ) {
        let evicted = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&evicted);
        let mut seq = Sequence::with_eviction_hook(move |v: u64| log.borrow_mut().push(v));
        let mut model = Vec::new();
        let mut removed = Vec::new();
        let mut serial = 0u64;

        for op in &ops {
            apply(&mut seq, &mut model, &mut removed, &mut serial, op);
            prop_assert_eq!(seq.len(), model.len());
            prop_assert_eq!(collect(&mut seq), model.clone());

            let mut gone = evicted.borrow().clone();
            gone.sort_unstable();
            let mut expected_gone = removed.clone();
            expected_gone.sort_unstable();
            prop_assert_eq!(gone, expected_gone);

            seq.self_check().unwrap();
        }
    }

    /// Position queries agree with the model after a random edit stream:
    /// walking the iterators front to back visits positions 0..len, and
    /// `at_position` inverts `position_of`.
    #[test]
    fn prop_positions_are_consistent(
        ops in prop::collection::vec(arbitrary_op(), 0..N_OPS),
    ) {
        let mut seq = Sequence::new();
        let mut model = Vec::new();
        let mut removed = Vec::new();
        let mut serial = 0u64;
        for op in &ops {
            apply(&mut seq, &mut model, &mut removed, &mut serial, op);
        }

        let mut it = seq.begin();
        for pos in 0..model.len() {
            prop_assert_eq!(seq.position_of(it), pos);
            prop_assert_eq!(seq.at_position(pos), it);
            prop_assert_eq!(seq.get(it), Some(&model[pos]));
            it = seq.next(it);
        }
        prop_assert!(seq.is_end(it));
    }

    /// `insert_sorted` over random values produces the same order as
    /// sorting the values up front.
    #[test]
    fn prop_insert_sorted_is_sorted(
        values in prop::collection::vec(any::<u32>(), 0..N_OPS),
    ) {
        let mut seq = Sequence::new();
        for v in &values {
            seq.insert_sorted(*v, u32::cmp);
        }

        let mut expected = values.clone();
        expected.sort();
        let mut got = Vec::new();
        seq.foreach(|_, v| got.push(*v));
        prop_assert_eq!(got, expected);
        seq.self_check().unwrap();
    }
}
