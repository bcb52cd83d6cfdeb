//! Control-flow graph, reverse post-order and dominator tree of a function.

use super::{BlockId, Function};
use crate::core::{LowerError, LowerResult};

/// Derived control-flow facts. Recompute after changing terminators.
#[derive(Debug, Clone)]
pub struct Cfg {
    preds: Vec<Vec<BlockId>>,
    succs: Vec<Vec<BlockId>>,
    /// Reachable blocks in reverse post-order, entry first.
    rpo: Vec<BlockId>,
    /// Position in `rpo`; `usize::MAX` for unreachable blocks.
    rpo_index: Vec<usize>,
    idom: Vec<Option<BlockId>>,
}

impl Cfg {
    pub fn compute(func: &Function) -> LowerResult<Self> {
        let count = func.blocks().len();
        let mut preds: Vec<Vec<BlockId>> = vec![Vec::new(); count];
        let mut succs: Vec<Vec<BlockId>> = vec![Vec::new(); count];

        for id in func.block_ids() {
            for succ in func.block(id).successors() {
                if succ.index() >= count {
                    return Err(LowerError::UnknownBlock {
                        func: func.name.clone(),
                        block: func.block(id).name.clone(),
                        target: succ.0,
                    });
                }
                if !succs[id.index()].contains(&succ) {
                    succs[id.index()].push(succ);
                }
                if !preds[succ.index()].contains(&id) {
                    preds[succ.index()].push(id);
                }
            }
        }
        for list in &mut preds {
            list.sort();
        }

        let mut cfg = Self {
            preds,
            succs,
            rpo: Vec::new(),
            rpo_index: vec![usize::MAX; count],
            idom: vec![None; count],
        };
        if count > 0 {
            cfg.compute_rpo(func.entry());
            cfg.compute_dominators(func.entry());
        }
        Ok(cfg)
    }

    fn compute_rpo(&mut self, entry: BlockId) {
        let mut visited = vec![false; self.succs.len()];
        let mut post_order = Vec::with_capacity(self.succs.len());
        let mut stack = vec![(entry, false)];

        while let Some((block, processed)) = stack.pop() {
            if processed {
                post_order.push(block);
                continue;
            }
            if visited[block.index()] {
                continue;
            }
            visited[block.index()] = true;
            stack.push((block, true));

            // Reversed so the first successor is visited first.
            for &succ in self.succs[block.index()].iter().rev() {
                if !visited[succ.index()] {
                    stack.push((succ, false));
                }
            }
        }

        post_order.reverse();
        for (idx, block) in post_order.iter().enumerate() {
            self.rpo_index[block.index()] = idx;
        }
        self.rpo = post_order;
    }

    /// Iterative dominator computation over the reverse post-order.
    fn compute_dominators(&mut self, entry: BlockId) {
        self.idom[entry.index()] = Some(entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in self.rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for &pred in &self.preds[block.index()] {
                    if self.idom[pred.index()].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => self.intersect(pred, current),
                    });
                }
                if new_idom.is_some() && self.idom[block.index()] != new_idom {
                    self.idom[block.index()] = new_idom;
                    changed = true;
                }
            }
        }
    }

    fn intersect(&self, mut a: BlockId, mut b: BlockId) -> BlockId {
        while a != b {
            while self.rpo_index[a.index()] > self.rpo_index[b.index()] {
                a = self.idom[a.index()].unwrap_or(a);
            }
            while self.rpo_index[b.index()] > self.rpo_index[a.index()] {
                b = self.idom[b.index()].unwrap_or(b);
            }
        }
        a
    }

    /// Distinct predecessors ordered by block index.
    pub fn preds(&self, block: BlockId) -> &[BlockId] {
        &self.preds[block.index()]
    }

    pub fn rpo(&self) -> &[BlockId] {
        &self.rpo
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.rpo_index[block.index()] != usize::MAX
    }

    /// Blocks with two or more distinct predecessors.
    pub fn is_merge(&self, block: BlockId) -> bool {
        self.preds[block.index()].len() >= 2
    }

    /// Immediate dominator; the entry is its own.
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        self.idom[block.index()]
    }

    /// Whether `a` dominates `b`. A block dominates itself; nothing
    /// dominates an unreachable block.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.idom[current.index()] {
                Some(next) if next != current => current = next,
                _ => return false,
            }
        }
    }
}
