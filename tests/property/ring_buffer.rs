// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for the Ring Buffer
//!
//! The buffer must behave exactly like "keep the last C elements of
//! everything pushed", whatever mix of loads and pushes produced it.

use gesha_telemetry::buffer::RingBuffer;
use proptest::prelude::*;

// ============================================================================
// Reference Model
// ============================================================================

/// Last `capacity` elements of `values`
fn tail(values: &[i32], capacity: usize) -> Vec<i32> {
    values[values.len().saturating_sub(capacity)..].to_vec()
}

#[derive(Debug, Clone)]
enum Op {
    Push(i32),
    Load(Vec<i32>),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => any::<i32>().prop_map(Op::Push),
        1 => prop::collection::vec(any::<i32>(), 0..40).prop_map(Op::Load),
    ]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Property: the buffer never holds more than its capacity
    #[test]
    fn prop_len_bounded_by_capacity(
        capacity in 0usize..32,
        values in prop::collection::vec(any::<i32>(), 0..200),
    ) {
        let mut buffer = RingBuffer::new(capacity);

        for value in values {
            buffer.push(value);
            prop_assert!(buffer.len() <= capacity);
        }
    }

    /// Property: values() is the tail of everything pushed, in arrival order
    #[test]
    fn prop_values_preserve_arrival_order(
        capacity in 1usize..32,
        values in prop::collection::vec(any::<i32>(), 0..200),
    ) {
        let mut buffer = RingBuffer::new(capacity);
        buffer.extend(values.iter().copied());

        let expected = tail(&values, capacity);
        prop_assert_eq!(buffer.values(), expected.clone());
        prop_assert_eq!(buffer.first(), expected.first());
        prop_assert_eq!(buffer.last(), values.last());
    }

    /// Property: load(xs) then push(y) equals load(xs ++ [y])
    #[test]
    fn prop_push_after_load_continues_tail(
        capacity in 1usize..32,
        loaded in prop::collection::vec(any::<i32>(), 0..64),
        pushed in any::<i32>(),
    ) {
        let mut incremental = RingBuffer::new(capacity);
        incremental.load(loaded.clone()).push(pushed);

        let mut combined = loaded;
        combined.push(pushed);
        let mut bulk = RingBuffer::new(capacity);
        bulk.load(combined);

        prop_assert_eq!(incremental.values(), bulk.values());
        prop_assert_eq!(incremental.last(), bulk.last());
    }

    /// Property: any sequence of pushes and loads matches the reference model
    #[test]
    fn prop_matches_reference_model(
        capacity in 0usize..16,
        ops in prop::collection::vec(op_strategy(), 0..100),
    ) {
        let mut buffer = RingBuffer::new(capacity);
        let mut model: Vec<i32> = Vec::new();

        for op in ops {
            match op {
                Op::Push(value) => {
                    buffer.push(value);
                    model.push(value);
                }
                Op::Load(values) => {
                    buffer.load(values.clone());
                    model = values;
                }
            }
            model = tail(&model, capacity);

            prop_assert_eq!(buffer.values(), model.clone());
            prop_assert_eq!(buffer.iter().rev().copied().collect::<Vec<_>>(),
                model.iter().rev().copied().collect::<Vec<_>>());
        }
    }
}
