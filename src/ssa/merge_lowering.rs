//! Lowering of merge-block phis into edge moves.
//!
//! For every predecessor edge of a merge, the phi bindings of that edge are
//! sequentialized by the [`MoveResolver`] and the resulting moves are placed
//! right before the predecessor's jump. Once every edge into a merge has
//! been lowered, its label is emptied and the former phi variables are
//! recorded as merge variables of the block.

use super::move_resolver::{MoveResolver, MoveSource, ParallelMove, Schedule};
use super::phi_edges::{EdgeId, PhiEdges};
use crate::core::{CompilationSession, LowerError, LowerResult};
use crate::lir::{BlockId, Cfg, Function, Inst, Value, Variable};
use hashbrown::HashSet;

/// Result of lowering one edge.
#[derive(Debug, Clone)]
pub struct LoweredEdge {
    pub edge: EdgeId,
    pub schedule: Schedule,
    /// Instructions inserted before the predecessor's jump.
    pub moves: Vec<Inst>,
    /// Variable materializing the schedule's temporary.
    pub temp: Option<Variable>,
    /// Phi bindings dropped because the phi is never read.
    pub pruned: usize,
}

/// Lowering state for one function.
pub struct MergeLowering<'s, 'arena> {
    session: &'s CompilationSession<'arena>,
    edges: PhiEdges,
    observed: HashSet<Variable>,
}

impl<'s, 'arena> MergeLowering<'s, 'arena> {
    /// Check the label/jump pairs of `func` and prepare its edge table.
    pub fn new(session: &'s CompilationSession<'arena>, func: &Function) -> LowerResult<Self> {
        let cfg = Cfg::compute(func)?;
        let edges = PhiEdges::build(func, &cfg)?;
        Ok(Self { session, edges, observed: func.observed_variables() })
    }

    /// Edges still to be lowered, in lowering order.
    pub fn pending_edges(&self) -> Vec<EdgeId> {
        self.edges
            .edges()
            .iter()
            .copied()
            .filter(|&edge| self.edges.bindings(edge).is_some())
            .collect()
    }

    fn is_used(&self, var: Variable) -> bool {
        self.observed.contains(&var)
    }

    /// Replace the phi bindings of the edge `pred -> merge` with moves.
    pub fn lower_merge_edge(
        &mut self,
        func: &mut Function,
        pred: BlockId,
        merge: BlockId,
    ) -> LowerResult<LoweredEdge> {
        let edge = EdgeId { pred, merge };
        let unknown_edge = |func: &Function| LowerError::UnknownEdge {
            func: func.name.clone(),
            pred: func.block_name(pred).to_string(),
            merge: func.block_name(merge).to_string(),
        };

        let jumps_to_merge = matches!(
            func.blocks().get(pred.index()).and_then(|b| b.terminator()),
            Some(Inst::Jump { target, .. }) if *target == merge
        );
        let bindings = match self.edges.take(edge) {
            Some(bindings) if jumps_to_merge => bindings,
            _ => return Err(unknown_edge(func)),
        };

        let pairs: Vec<ParallelMove> = bindings
            .iter()
            .map(|b| ParallelMove { src: b.src, dst: b.dst })
            .collect();
        let pruned = pairs.iter().filter(|p| !self.is_used(p.dst)).count();

        let resolver = MoveResolver::new(self.session.arena());
        let schedule = resolver.resolve_live(&pairs, |dst| self.is_used(dst));

        let temp = schedule.temp_kind.map(|kind| func.new_variable("tmp", kind));
        let moves: Vec<Inst> = schedule
            .moves
            .iter()
            .filter_map(|mv| {
                let src = match mv.src {
                    MoveSource::Value(value) => value,
                    MoveSource::Temp => Value::Variable(temp?),
                };
                let dst = mv.dst.or(temp)?;
                Some(Inst::Move { dst, src })
            })
            .collect();

        let block = func.block_mut(pred);
        let at = block.insts.len() - 1;
        if let Some(Inst::Jump { outgoing, .. }) = block.insts.last_mut() {
            outgoing.clear();
        }
        block.insts.splice(at..at, moves.iter().cloned());

        log::debug!(
            "{}: lowered edge {} -> {}: {} moves, {} pruned{}",
            func.name,
            func.block_name(pred),
            func.block_name(merge),
            moves.len(),
            pruned,
            if temp.is_some() { ", temporary used" } else { "" }
        );
        for mv in &moves {
            log::trace!("  {}", func.display_inst(mv));
        }

        self.session.record_edge_lowered(moves.len(), pruned, temp.is_some());
        for _ in 0..schedule.cycles {
            self.session.record_cycle_broken();
        }

        if self.edges.pending_into(merge) == 0 {
            self.finish_merge(func, merge);
        }

        Ok(LoweredEdge { edge, schedule, moves, temp, pruned })
    }

    /// Empty the label of a fully lowered merge.
    fn finish_merge(&self, func: &mut Function, merge: BlockId) {
        let incoming = match func.block_mut(merge).insts.first_mut() {
            Some(Inst::Label { incoming }) => std::mem::take(incoming),
            _ => return,
        };
        for var in incoming {
            if self.is_used(var) {
                func.mark_merge_variable(var, merge);
            }
        }
        log::trace!("{}: label of {} cleared", func.name, func.block_name(merge));
    }
}

/// Lower every phi of `func` into edge moves.
///
/// Merges are handled in block order and each merge's edges in
/// predecessor order. Returns the lowered edges in that order.
pub fn lower_function(
    session: &CompilationSession<'_>,
    func: &mut Function,
) -> LowerResult<Vec<LoweredEdge>> {
    session.set_current_function(&func.name);
    let mut lowering = MergeLowering::new(session, func)?;

    let mut lowered = Vec::new();
    for edge in lowering.pending_edges() {
        lowered.push(lowering.lower_merge_edge(func, edge.pred, edge.merge)?);
    }

    session.record_function_lowered(&func.name, lowered.len());
    Ok(lowered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lir::parse_function;
    use bumpalo::Bump;

    const LOOP: &str = "\
func count {
entry:
  %n:i32 = param
  jump ^head [#0:i32, #0:i32]
head:
  label [%i:i32, %acc:i32]
  %done:i32 = cmp %i, %n
  branch %done, ^exit, ^body
body:
  %i2:i32 = add %i, #1:i32
  %acc2:i32 = add %acc, %i
  jump ^head [%i2, %acc2]
exit:
  ret %i
}
";

    #[test]
    fn test_lower_loop() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut func = parse_function(LOOP).unwrap();

        let lowered = lower_function(&session, &mut func).unwrap();
        assert_eq!(lowered.len(), 2);

        let body = func.block_by_name("body").unwrap();
        let insts = &func.block(body).insts;
        assert_eq!(insts.len(), 5);
        assert!(matches!(insts[2], Inst::Move { .. }));
        assert!(matches!(&insts[4], Inst::Jump { outgoing, .. } if outgoing.is_empty()));

        let head = func.block_by_name("head").unwrap();
        assert_eq!(func.block(head).label(), Some(&[][..]));
        assert_eq!(func.merged_variables(head).len(), 2);
        assert!(!func.has_phis());

        let stats = session.stats();
        assert_eq!(stats.edges_lowered, 2);
        assert_eq!(stats.moves_emitted, 4);
        assert_eq!(stats.temporaries_introduced, 0);
    }

    #[test]
    fn test_unused_phi_is_pruned() {
        let text = "\
func pruned {
entry:
  %a:i64 = param
  %b:i64 = param
  jump ^m [%a, %b]
m:
  label [%x:i64, %y:i64]
  ret %x
}
";
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut func = parse_function(text).unwrap();
        let lowered = lower_function(&session, &mut func).unwrap();

        assert_eq!(lowered[0].pruned, 1);
        assert_eq!(lowered[0].moves.len(), 1);
        let y = func.variable("y").unwrap();
        assert!(func.merge_block_of(y).is_none());
        assert_eq!(session.stats().phi_moves_pruned, 1);
    }

    #[test]
    fn test_unknown_edge() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut func = parse_function(LOOP).unwrap();
        let mut lowering = MergeLowering::new(&session, &func).unwrap();

        let entry = func.entry();
        let exit = func.block_by_name("exit").unwrap();
        let err = lowering.lower_merge_edge(&mut func, entry, exit).unwrap_err();
        assert!(matches!(err, LowerError::UnknownEdge { .. }));

        let head = func.block_by_name("head").unwrap();
        lowering.lower_merge_edge(&mut func, entry, head).unwrap();
        // an edge can only be lowered once
        assert!(lowering.lower_merge_edge(&mut func, entry, head).is_err());
    }
}
