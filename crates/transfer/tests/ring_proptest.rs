//! Property-based tests for the SPSC ring.
//! Every operation sequence is checked against a plain queue model.

#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::indexing_slicing)]

use std::collections::VecDeque;

use proptest::prelude::*;
use transfer::RingStorage;

const CAP: usize = 32;

#[derive(Debug, Clone)]
enum Op {
    Write(Vec<u8>),
    Read(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        proptest::collection::vec(any::<u8>(), 0..40).prop_map(Op::Write),
        (0usize..40).prop_map(Op::Read),
    ]
}

proptest! {
    /// Writes and reads succeed exactly when a byte queue with CAP-1 slots
    /// says they should, and return the same bytes in the same order.
    #[test]
    fn ring_matches_queue_model(ops in proptest::collection::vec(op(), 1..200)) {
        let mut ring = RingStorage::<CAP>::new();
        let (mut tx, mut rx) = ring.split();
        let mut model: VecDeque<u8> = VecDeque::new();

        for op in ops {
            match op {
                Op::Write(data) => {
                    let free = CAP - 1 - model.len();
                    let expect = data.len() <= free && free > 0;
                    prop_assert_eq!(tx.try_write(&data), expect);
                    if expect {
                        model.extend(&data);
                    }
                }
                Op::Read(len) => {
                    let mut out = vec![0u8; len];
                    let expect = !model.is_empty() && len <= model.len();
                    prop_assert_eq!(rx.try_read(&mut out), expect);
                    if expect {
                        let want: Vec<u8> = model.drain(..len).collect();
                        prop_assert_eq!(out, want);
                    }
                }
            }
            prop_assert_eq!(tx.len(), model.len());
            prop_assert!(tx.len() <= CAP - 1);
            prop_assert!(!(tx.is_full() && tx.is_empty()));
            prop_assert!(!(rx.is_full() && rx.is_empty()));
        }
    }

    /// Any record that fits round-trips unchanged, whatever the starting
    /// offset, including records that wrap past the physical end.
    #[test]
    fn round_trip_from_any_offset(
        offset in 0usize..CAP,
        data in proptest::collection::vec(any::<u8>(), 1..CAP),
    ) {
        let mut ring = RingStorage::<CAP>::new();
        let (mut tx, mut rx) = ring.split();
        let mut skip = vec![0u8; offset % (CAP - 1)];
        prop_assert!(tx.try_write(&skip));
        prop_assert!(skip.is_empty() || rx.try_read(&mut skip));

        prop_assert!(tx.try_write(&data));
        let mut out = vec![0u8; data.len()];
        prop_assert!(rx.try_read(&mut out));
        prop_assert_eq!(out, data);
        prop_assert!(rx.is_empty());
    }
}
