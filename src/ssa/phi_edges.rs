//! Per-edge phi binding table.
//!
//! A merge's phi variables live in its label while the values flowing in
//! live in each predecessor's jump. [`PhiEdges::build`] checks every such
//! pair once and turns it into an owned list of `(src, dst)` bindings keyed by
//! the edge, so later passes never have to keep the two lists in sync.

use crate::core::{LowerError, LowerResult};
use crate::lir::{BlockId, Cfg, Function, Inst, Value, Variable};
use hashbrown::{HashMap, HashSet};

/// A control-flow edge into a block with phis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId {
    pub pred: BlockId,
    pub merge: BlockId,
}

/// `dst` takes `src` when control flows along the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhiBinding {
    pub src: Value,
    pub dst: Variable,
}

#[derive(Debug, Clone, Default)]
pub struct PhiEdges {
    /// Edges ordered by merge block, then predecessor.
    edges: Vec<EdgeId>,
    bindings: HashMap<EdgeId, Vec<PhiBinding>>,
    /// Blocks whose label declares phis, in block order.
    merges: Vec<BlockId>,
}

impl PhiEdges {
    /// Check every label/jump pair in `func` and collect the bindings.
    pub fn build(func: &Function, cfg: &Cfg) -> LowerResult<Self> {
        let mut table = PhiEdges::default();

        for block in func.block_ids() {
            let Some(incoming) = func.block(block).label() else {
                continue;
            };
            let mut seen = HashSet::new();
            for var in incoming {
                if !seen.insert(*var) {
                    return Err(LowerError::DuplicatePhi {
                        func: func.name.clone(),
                        block: func.block(block).name.clone(),
                        value: format!("%{}", func.variable_name(*var)),
                    });
                }
            }
            if !incoming.is_empty() {
                table.merges.push(block);
            }
        }

        for &merge in &table.merges {
            let incoming = func.block(merge).label().unwrap_or_default();
            for &pred in cfg.preds(merge) {
                let bindings = Self::check_edge(func, pred, merge, incoming)?;
                let edge = EdgeId { pred, merge };
                table.edges.push(edge);
                table.bindings.insert(edge, bindings);
            }
        }

        // Values passed to a block without phis have nowhere to go.
        for pred in func.block_ids() {
            if let Some(Inst::Jump { target, outgoing }) = func.block(pred).terminator() {
                let has_phis = func.block(*target).label().is_some_and(|l| !l.is_empty());
                if !outgoing.is_empty() && !has_phis {
                    return Err(LowerError::MissingLabel {
                        func: func.name.clone(),
                        pred: func.block(pred).name.clone(),
                        merge: func.block(*target).name.clone(),
                    });
                }
            }
        }

        log::debug!(
            "{}: {} phi edges into {} merge blocks",
            func.name,
            table.edges.len(),
            table.merges.len()
        );
        Ok(table)
    }

    fn check_edge(
        func: &Function,
        pred: BlockId,
        merge: BlockId,
        incoming: &[Variable],
    ) -> LowerResult<Vec<PhiBinding>> {
        let pred_name = || func.block(pred).name.clone();
        let merge_name = || func.block(merge).name.clone();

        let outgoing = match func.block(pred).terminator() {
            Some(Inst::Jump { outgoing, .. }) => outgoing,
            _ => {
                return Err(LowerError::CriticalEdge {
                    func: func.name.clone(),
                    pred: pred_name(),
                    merge: merge_name(),
                })
            }
        };

        if outgoing.len() != incoming.len() {
            return Err(LowerError::PhiArityMismatch {
                func: func.name.clone(),
                pred: pred_name(),
                merge: merge_name(),
                outgoing: outgoing.len(),
                incoming: incoming.len(),
            });
        }

        let mut bindings = Vec::with_capacity(incoming.len());
        for (position, (&src, &dst)) in outgoing.iter().zip(incoming).enumerate() {
            if !dst.kind.accepts(src.kind()) {
                return Err(LowerError::PhiKindMismatch {
                    func: func.name.clone(),
                    pred: pred_name(),
                    merge: merge_name(),
                    position,
                    outgoing: func.display_value(src).to_string(),
                    outgoing_kind: src.kind().to_string(),
                    incoming: func.display_value(dst.into()).to_string(),
                    incoming_kind: dst.kind.to_string(),
                });
            }
            bindings.push(PhiBinding { src, dst });
        }
        Ok(bindings)
    }

    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }

    pub fn merges(&self) -> &[BlockId] {
        &self.merges
    }

    pub fn bindings(&self, edge: EdgeId) -> Option<&[PhiBinding]> {
        self.bindings.get(&edge).map(Vec::as_slice)
    }

    /// Hand the bindings of `edge` over to the caller. Each edge can be
    /// taken once.
    pub fn take(&mut self, edge: EdgeId) -> Option<Vec<PhiBinding>> {
        self.bindings.remove(&edge)
    }

    /// Edges into `merge` that have not been taken yet.
    pub fn pending_into(&self, merge: BlockId) -> usize {
        self.bindings.keys().filter(|e| e.merge == merge).count()
    }
}
