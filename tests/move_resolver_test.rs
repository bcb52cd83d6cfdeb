//! Move resolver tests.
//!
//! Schedules are executed on a simulated store in which every variable starts
//! out holding a distinct sentinel. After the schedule has run, each
//! destination must hold the original value of its source and every other
//! variable must be untouched.

use proptest::prelude::*;
use std::collections::HashMap;
use tpde_ssa::lir::{Value, ValueKind, Variable};
use tpde_ssa::ssa::{schedule_moves, MoveResolver, MoveSource, ParallelMove, Schedule};

const VARS: u32 = 12;

fn var(id: u32) -> Variable {
    Variable::new(id, ValueKind::I64)
}

fn sentinel(id: u32) -> i64 {
    1000 + id as i64
}

fn initial(value: Value) -> i64 {
    match value {
        Value::Variable(v) => sentinel(v.id),
        Value::Constant { bits, .. } => bits,
        other => panic!("unexpected source {:?}", other),
    }
}

/// Run `schedule` and compare against the parallel semantics of `pairs`.
fn simulate(pairs: &[ParallelMove], schedule: &Schedule) -> Result<(), String> {
    let mut store: HashMap<u32, i64> = (0..VARS).map(|id| (id, sentinel(id))).collect();
    let mut temp: Option<i64> = None;

    for mv in &schedule.moves {
        let value = match mv.src {
            MoveSource::Value(Value::Variable(v)) => store[&v.id],
            MoveSource::Value(other) => initial(other),
            MoveSource::Temp => temp.take().ok_or("temporary read before it was written")?,
        };
        match mv.dst {
            Some(dst) => {
                store.insert(dst.id, value);
            }
            None => {
                if temp.is_some() {
                    return Err("temporary overwritten while holding a value".to_string());
                }
                temp = Some(value);
            }
        }
    }

    for id in 0..VARS {
        let expected = pairs
            .iter()
            .find(|p| p.dst.id == id)
            .map_or(sentinel(id), |p| initial(p.src));
        if store[&id] != expected {
            return Err(format!("v{} holds {} instead of {}", id, store[&id], expected));
        }
    }
    Ok(())
}

/// Whether the non-trivial pairs contain a copy cycle.
fn has_cycle(pairs: &[ParallelMove]) -> bool {
    let src_of: HashMap<u32, u32> = pairs
        .iter()
        .filter_map(|p| match p.src {
            Value::Variable(v) if v.id != p.dst.id => Some((p.dst.id, v.id)),
            _ => None,
        })
        .collect();

    src_of.keys().any(|&start| {
        let mut current = start;
        for _ in 0..=src_of.len() {
            match src_of.get(&current) {
                Some(&next) if next == start => return true,
                Some(&next) => current = next,
                None => return false,
            }
        }
        false
    })
}

#[test]
fn test_swap() {
    let pairs = [ParallelMove::new(var(1), var(0)), ParallelMove::new(var(0), var(1))];
    let schedule = schedule_moves(&pairs);

    assert_eq!(schedule.len(), 3);
    assert!(schedule.uses_temp());
    simulate(&pairs, &schedule).unwrap();
}

#[test]
fn test_two_cycles_share_one_temporary() {
    let pairs = [
        ParallelMove::new(var(1), var(0)),
        ParallelMove::new(var(0), var(1)),
        ParallelMove::new(var(3), var(2)),
        ParallelMove::new(var(4), var(3)),
        ParallelMove::new(var(2), var(4)),
    ];
    let schedule = schedule_moves(&pairs);

    assert_eq!(schedule.cycles, 2);
    assert_eq!(schedule.len(), pairs.len() + 2);
    assert_eq!(schedule.moves.iter().filter(|m| m.dst.is_none()).count(), 2);
    simulate(&pairs, &schedule).unwrap();
}

#[test]
fn test_cycle_with_hanging_tree() {
    // v0 <-> v1 cycle; v2 and v3 read v0 before it is overwritten
    let pairs = [
        ParallelMove::new(var(0), var(2)),
        ParallelMove::new(var(1), var(0)),
        ParallelMove::new(var(0), var(1)),
        ParallelMove::new(var(2), var(3)),
    ];
    let schedule = schedule_moves(&pairs);
    simulate(&pairs, &schedule).unwrap();
    assert_eq!(schedule.cycles, 1);
}

#[test]
fn test_constants_and_fixed_sources() {
    let pairs = [
        ParallelMove::new(Value::constant(ValueKind::I64, -3), var(0)),
        ParallelMove::new(var(0), var(1)),
    ];
    let schedule = schedule_moves(&pairs);
    assert!(!schedule.uses_temp());
    simulate(&pairs, &schedule).unwrap();
}

#[test]
fn test_arena_resolver_matches_free_function() {
    let arena = bumpalo::Bump::new();
    let resolver = MoveResolver::new(&arena);
    let pairs = [
        ParallelMove::new(var(2), var(1)),
        ParallelMove::new(var(1), var(2)),
        ParallelMove::new(var(5), var(6)),
    ];
    assert_eq!(resolver.resolve(&pairs), schedule_moves(&pairs));
}

#[derive(Debug, Clone)]
enum Source {
    Var(u32),
    Const(i16),
}

/// Parallel move sets over `VARS` variables with distinct destinations.
fn parallel_moves() -> impl Strategy<Value = Vec<ParallelMove>> {
    let source = prop_oneof![
        4 => (0..VARS).prop_map(Source::Var),
        1 => any::<i16>().prop_map(Source::Const),
    ];
    (
        proptest::collection::vec(source, VARS as usize),
        proptest::collection::vec(any::<bool>(), VARS as usize),
        Just((0..VARS).collect::<Vec<_>>()).prop_shuffle(),
    )
        .prop_map(|(sources, mask, order)| {
            order
                .into_iter()
                .filter(|&dst| mask[dst as usize])
                .map(|dst| {
                    let src = match sources[dst as usize] {
                        Source::Var(id) => Value::Variable(var(id)),
                        Source::Const(bits) => Value::constant(ValueKind::I64, bits as i64),
                    };
                    ParallelMove::new(src, var(dst))
                })
                .collect()
        })
}

proptest! {
    #[test]
    fn prop_schedule_preserves_parallel_semantics(pairs in parallel_moves()) {
        let schedule = schedule_moves(&pairs);
        let result = simulate(&pairs, &schedule);
        prop_assert!(result.is_ok(), "{:?} for {:?}", result, pairs);
    }

    #[test]
    fn prop_temporary_only_for_cycles(pairs in parallel_moves()) {
        let schedule = schedule_moves(&pairs);
        prop_assert_eq!(schedule.uses_temp(), has_cycle(&pairs));

        let non_trivial = pairs.iter().filter(|p| p.src != Value::Variable(p.dst)).count();
        prop_assert_eq!(schedule.len(), non_trivial + schedule.cycles);
    }

    #[test]
    fn prop_schedule_is_deterministic(pairs in parallel_moves()) {
        prop_assert_eq!(schedule_moves(&pairs), schedule_moves(&pairs));
    }
}
