//! Parallel-move sequentialization with a single temporary.
//!
//! The copies feeding one merge are logically simultaneous. Each destination
//! is written at most once, so the set forms a functional graph: every node
//! has at most one incoming edge, and every strongly connected component is a
//! simple cycle with trees hanging off it. Tree moves are emitted leaves
//! first; each cycle is opened by saving one source in the temporary.
//!
//! ```text
//!   v10 <- v11          tmp <- v11
//!   v11 <- v10    =>    v11 <- v10
//!                       v10 <- tmp
//! ```

use crate::lir::{Value, ValueKind, Variable};
use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;
use std::fmt;

/// One logically-simultaneous copy `dst <- src`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelMove {
    pub src: Value,
    pub dst: Variable,
}

impl ParallelMove {
    pub fn new(src: impl Into<Value>, dst: Variable) -> Self {
        Self { src: src.into(), dst }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveSource {
    Value(Value),
    /// The schedule's temporary.
    Temp,
}

/// One sequential move. `dst == None` stores into the temporary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub src: MoveSource,
    pub dst: Option<Variable>,
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dst {
            Some(dst) => write!(f, "%{}", dst)?,
            None => f.write_str("TEMP")?,
        }
        f.write_str(" <- ")?;
        match self.src {
            MoveSource::Value(value) => write!(f, "{}", value),
            MoveSource::Temp => f.write_str("TEMP"),
        }
    }
}

/// Ordered moves implementing a parallel-move set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    pub moves: Vec<Move>,
    /// Kind of the temporary, if the schedule uses one.
    pub temp_kind: Option<ValueKind>,
    /// Number of cycles opened through the temporary.
    pub cycles: usize,
}

impl Schedule {
    pub fn uses_temp(&self) -> bool {
        self.temp_kind.is_some()
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

#[derive(Clone, Copy)]
struct Pending {
    src: MoveSource,
    dst: Variable,
}

/// Arena-backed resolver. Scratch state lives in the arena for the
/// duration of one call.
pub struct MoveResolver<'arena> {
    arena: &'arena Bump,
}

impl<'arena> MoveResolver<'arena> {
    pub fn new(arena: &'arena Bump) -> Self {
        Self { arena }
    }

    /// Sequentialize `pairs`. Deterministic for a given input order.
    ///
    /// # Panics
    ///
    /// Panics if two pairs write the same destination.
    pub fn resolve(&self, pairs: &[ParallelMove]) -> Schedule {
        self.resolve_live(pairs, |_| true)
    }

    /// Like [`resolve`](Self::resolve), but drops pairs whose destination
    /// is not live.
    pub fn resolve_live(
        &self,
        pairs: &[ParallelMove],
        mut is_live: impl FnMut(Variable) -> bool,
    ) -> Schedule {
        let mut pending: BumpVec<'arena, Pending> = BumpVec::with_capacity_in(pairs.len(), self.arena);
        for pair in pairs {
            if pair.src == Value::Variable(pair.dst) || !is_live(pair.dst) {
                continue;
            }
            assert!(
                !pending.iter().any(|p| p.dst == pair.dst),
                "parallel move set writes %{} twice",
                pair.dst
            );
            pending.push(Pending { src: MoveSource::Value(pair.src), dst: pair.dst });
        }

        let mut schedule = Schedule {
            moves: Vec::with_capacity(pending.len() + 1),
            temp_kind: None,
            cycles: 0,
        };
        let mut temp_busy = false;

        while !pending.is_empty() {
            let ready = (0..pending.len()).find(|&i| {
                let dst = MoveSource::Value(Value::Variable(pending[i].dst));
                !pending.iter().enumerate().any(|(j, p)| j != i && p.src == dst)
            });

            match ready {
                Some(i) => {
                    let pair = pending.remove(i);
                    if pair.src == MoveSource::Temp {
                        temp_busy = false;
                    }
                    log::trace!("move %{} <- {:?}", pair.dst, pair.src);
                    schedule.moves.push(Move { src: pair.src, dst: Some(pair.dst) });
                }
                None => {
                    // Every pending destination is still read: only cycles remain.
                    assert!(!temp_busy, "cycle temporary reused while still holding a value");
                    let head = &mut pending[0];
                    let MoveSource::Value(src) = head.src else {
                        unreachable!("temporary-sourced move cannot be part of a cycle");
                    };
                    log::debug!("breaking cycle at %{} through the temporary", head.dst);

                    schedule.moves.push(Move { src: head.src, dst: None });
                    schedule.temp_kind = Some(match schedule.temp_kind {
                        Some(kind) => kind.join(src.kind()),
                        None => src.kind(),
                    });
                    schedule.cycles += 1;
                    head.src = MoveSource::Temp;
                    temp_busy = true;
                }
            }
        }

        schedule
    }
}

/// Sequentialize `pairs` with a private arena.
pub fn schedule_moves(pairs: &[ParallelMove]) -> Schedule {
    let arena = Bump::new();
    MoveResolver::new(&arena).resolve(pairs)
}
