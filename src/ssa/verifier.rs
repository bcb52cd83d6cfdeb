//! SSA invariant verifier.
//!
//! Checks that every variable is defined exactly once, that each use is
//! dominated by its definition, and that labels and jumps agree on every
//! edge into a merge. Reachable blocks are visited in reverse post-order so
//! a loop header is seen before its latch.
//!
//! Lowered functions are accepted as well: a variable recorded as a merge
//! variable of block `M` counts as defined at the head of `M`. Its
//! assignments must be single moves in predecessors of `M`, and a block that
//! assigns it must not read it afterwards. Every reachable predecessor of `M`
//! must assign it, unless `M` dominates that predecessor and the value
//! already flows around the loop unchanged.

use super::phi_edges::PhiEdges;
use crate::core::{LowerError, LowerResult};
use crate::lir::{BlockId, Cfg, Function, Inst, Value, Variable};
use hashbrown::{HashMap, HashSet};

#[derive(Debug, Clone, Copy)]
struct DefSite {
    block: BlockId,
    index: usize,
}

#[derive(Debug, Default)]
struct Defs {
    sites: HashMap<Variable, DefSite>,
    /// Blocks assigning each merge variable.
    merge_moves: HashSet<(BlockId, Variable)>,
}

/// Verify `func`, returning the first violation found.
pub fn verify(func: &Function) -> LowerResult<()> {
    check_structure(func)?;
    let cfg = Cfg::compute(func)?;
    PhiEdges::build(func, &cfg)?;

    for id in func.block_ids() {
        if !cfg.is_reachable(id) {
            log::debug!("{}: skipping unreachable block {}", func.name, func.block_name(id));
        }
    }

    let verifier = Verifier { func, cfg: &cfg };
    let defs = verifier.collect_defs()?;
    verifier.check_uses(&defs)?;
    verifier.check_merge_inputs(&defs)?;

    log::trace!("{}: SSA form verified", func.name);
    Ok(())
}

/// Verify `func` and panic with the diagnostic and the function on failure.
pub fn verify_or_panic(func: &Function) {
    if let Err(err) = verify(func) {
        panic!("SSA verification failed: {}\n{}", err, func);
    }
}

/// Labels first, terminators last, nothing empty.
fn check_structure(func: &Function) -> LowerResult<()> {
    for block in func.blocks() {
        let Some(last) = block.insts.last() else {
            return Err(LowerError::MissingTerminator {
                func: func.name.clone(),
                block: block.name.clone(),
            });
        };
        if !last.is_terminator() {
            return Err(LowerError::MissingTerminator {
                func: func.name.clone(),
                block: block.name.clone(),
            });
        }
        for (index, inst) in block.insts.iter().enumerate() {
            if inst.is_terminator() && index + 1 != block.insts.len() {
                return Err(LowerError::MisplacedTerminator {
                    func: func.name.clone(),
                    block: block.name.clone(),
                    index,
                });
            }
            if matches!(inst, Inst::Label { .. }) && index != 0 {
                return Err(LowerError::MisplacedLabel {
                    func: func.name.clone(),
                    block: block.name.clone(),
                    index,
                });
            }
        }
    }
    Ok(())
}

struct Verifier<'a> {
    func: &'a Function,
    cfg: &'a Cfg,
}

impl Verifier<'_> {
    fn value_name(&self, var: Variable) -> String {
        format!("%{}", self.func.variable_name(var))
    }

    fn inst_text(&self, block: BlockId, index: usize) -> String {
        let inst = &self.func.block(block).insts[index];
        self.func.display_inst(inst).to_string()
    }

    /// Record the single definition of every ordinary variable and check
    /// the placement of merge-variable moves.
    fn collect_defs(&self) -> LowerResult<Defs> {
        let func = self.func;
        let mut defs = Defs::default();

        for &block in self.cfg.rpo() {
            for (index, inst) in func.block(block).insts.iter().enumerate() {
                let mut result: LowerResult<()> = Ok(());
                inst.for_each_def(|value| {
                    let Value::Variable(var) = value else {
                        return;
                    };
                    if result.is_err() {
                        return;
                    }

                    if let Some(merge) = func.merge_block_of(var) {
                        let placed = matches!(inst, Inst::Move { .. })
                            && self.cfg.preds(merge).contains(&block)
                            && defs.merge_moves.insert((block, var));
                        if !placed {
                            result = Err(LowerError::MisplacedMergeMove {
                                func: func.name.clone(),
                                block: func.block(block).name.clone(),
                                index,
                                inst: self.inst_text(block, index),
                                value: self.value_name(var),
                                merge: func.block(merge).name.clone(),
                            });
                        }
                        return;
                    }

                    if let Some(prior) = defs.sites.get(&var) {
                        result = Err(LowerError::Redefinition {
                            func: func.name.clone(),
                            block: func.block(block).name.clone(),
                            index,
                            inst: self.inst_text(block, index),
                            value: self.value_name(var),
                            prior_block: func.block(prior.block).name.clone(),
                            prior_site: format!(
                                "instruction {} `{}`",
                                prior.index,
                                self.inst_text(prior.block, prior.index)
                            ),
                        });
                        return;
                    }
                    defs.sites.insert(var, DefSite { block, index });
                });
                result?;
            }
        }

        Ok(defs)
    }

    fn check_uses(&self, defs: &Defs) -> LowerResult<()> {
        let func = self.func;

        for &block in self.cfg.rpo() {
            // Merge variables already overwritten in this block.
            let mut clobbered = HashSet::new();

            for (index, inst) in func.block(block).insts.iter().enumerate() {
                let mut result: LowerResult<()> = Ok(());
                inst.for_each_use(|operand| {
                    let Value::Variable(var) = operand.value else {
                        return;
                    };
                    if result.is_err() {
                        return;
                    }
                    result = self.check_use(&defs.sites, &clobbered, var, operand.uninit, block, index);
                });
                result?;

                inst.for_each_def(|value| {
                    if let Value::Variable(var) = value {
                        if func.merge_block_of(var).is_some() {
                            clobbered.insert(var);
                        }
                    }
                });
            }
        }

        Ok(())
    }

    fn check_use(
        &self,
        defs: &HashMap<Variable, DefSite>,
        clobbered: &HashSet<Variable>,
        var: Variable,
        uninit: bool,
        block: BlockId,
        index: usize,
    ) -> LowerResult<()> {
        let func = self.func;

        if let Some(merge) = func.merge_block_of(var) {
            // Nothing assigns it on entry to the function.
            if merge == func.entry() {
                return Err(self.use_before_def(var, block, index));
            }
            if clobbered.contains(&var) {
                return Err(LowerError::ClobberedMergeValue {
                    func: func.name.clone(),
                    block: func.block(block).name.clone(),
                    index,
                    inst: self.inst_text(block, index),
                    value: self.value_name(var),
                    merge: func.block(merge).name.clone(),
                });
            }
            if !self.cfg.dominates(merge, block) {
                return Err(self.not_dominated(var, block, index, merge));
            }
            return Ok(());
        }

        if uninit {
            return Ok(());
        }

        match defs.get(&var) {
            Some(def) if def.block == block && def.index < index => Ok(()),
            Some(def) if def.block != block => {
                if self.cfg.dominates(def.block, block) {
                    Ok(())
                } else {
                    Err(self.not_dominated(var, block, index, def.block))
                }
            }
            _ => Err(self.use_before_def(var, block, index)),
        }
    }

    /// Each merge variable must be assigned on every edge that can change
    /// it. Reported at the predecessor's jump, which reads it on entry to
    /// the merge.
    fn check_merge_inputs(&self, defs: &Defs) -> LowerResult<()> {
        for &merge in self.cfg.rpo() {
            for var in self.func.merged_variables(merge) {
                for &pred in self.cfg.preds(merge) {
                    let assigned = defs.merge_moves.contains(&(pred, var));
                    if assigned || !self.cfg.is_reachable(pred) || self.cfg.dominates(merge, pred) {
                        continue;
                    }
                    let jump = self.func.block(pred).insts.len() - 1;
                    return Err(self.use_before_def(var, pred, jump));
                }
            }
        }
        Ok(())
    }

    fn use_before_def(&self, var: Variable, block: BlockId, index: usize) -> LowerError {
        LowerError::UseBeforeDef {
            func: self.func.name.clone(),
            block: self.func.block(block).name.clone(),
            index,
            inst: self.inst_text(block, index),
            value: self.value_name(var),
        }
    }

    fn not_dominated(&self, var: Variable, block: BlockId, index: usize, def: BlockId) -> LowerError {
        LowerError::NotDominated {
            func: self.func.name.clone(),
            block: self.func.block(block).name.clone(),
            index,
            inst: self.inst_text(block, index),
            value: self.value_name(var),
            def_block: self.func.block(def).name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lir::parse_function;

    fn check(text: &str) -> LowerResult<()> {
        verify(&parse_function(text).unwrap())
    }

    #[test]
    fn test_valid_loop() {
        check(
            "func f {\nentry:\n  %n:i32 = param\n  jump ^h [%n]\n\
             h:\n  label [%i:i32]\n  %c:i32 = cmp %i, %n\n  branch %c, ^b, ^x\n\
             b:\n  %j:i32 = add %i, #1:i32\n  jump ^h [%j]\n\
             x:\n  ret %i\n}\n",
        )
        .unwrap();
    }

    #[test]
    fn test_redefinition_names_prior_site() {
        let err = check(
            "func f {\nentry:\n  %a:i32 = param\n  %a = add %a, %a\n  ret %a\n}\n",
        )
        .unwrap_err();
        match err {
            LowerError::Redefinition { index, prior_block, prior_site, .. } => {
                assert_eq!(index, 1);
                assert_eq!(prior_block, "entry");
                assert_eq!(prior_site, "instruction 0 `%a:i32 = param`");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_use_before_def_in_block() {
        let err = check(
            "func f {\nentry:\n  %b:i32 = add %a, %a\n  %a:i32 = param\n  ret %b\n}\n",
        )
        .unwrap_err();
        assert!(matches!(err, LowerError::UseBeforeDef { index: 0, .. }), "{}", err);
        assert!(err.to_string().contains("%a"));
    }

    #[test]
    fn test_uninit_operand_allowed() {
        check("func f {\nentry:\n  %a:i32 = param\n  %b:i32 = add %a, %u:i32?\n  ret %b\n}\n")
            .unwrap();
    }

    #[test]
    fn test_not_dominated() {
        let err = check(
            "func f {\nentry:\n  %c:i32 = param\n  branch %c, ^l, ^r\n\
             l:\n  %x:i32 = add %c, %c\n  jump ^m\n\
             r:\n  jump ^m\n\
             m:\n  ret %x\n}\n",
        )
        .unwrap_err();
        match err {
            LowerError::NotDominated { block, def_block, .. } => {
                assert_eq!(block, "m");
                assert_eq!(def_block, "l");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_structure_errors() {
        let err = check("func f {\nentry:\n  %a:i32 = param\n}\n").unwrap_err();
        assert!(matches!(err, LowerError::MissingTerminator { .. }));

        let err = check("func f {\nentry:\n  ret\n  ret\n}\n").unwrap_err();
        assert!(matches!(err, LowerError::MisplacedTerminator { index: 0, .. }));

        let err = check("func f {\nentry:\n  %a:i32 = param\n  label\n  ret\n}\n").unwrap_err();
        assert!(matches!(err, LowerError::MisplacedLabel { index: 1, .. }));
    }

    #[test]
    fn test_lowered_form() {
        let misplaced = "func f {\nentry:\n  %a:i32 = param\n  jump ^m\n\
                         m(%x:i32):\n  label\n  %x = move %a\n  ret %x\n}\n";
        assert!(matches!(check(misplaced).unwrap_err(), LowerError::MisplacedMergeMove { .. }));

        let ok = "func f {\nentry:\n  %a:i32 = param\n  %c:i32 = param\n  branch %c, ^l, ^r\n\
                  l:\n  %x:i32 = move %a\n  jump ^m\nr:\n  %x:i32 = move %c\n  jump ^m\n\
                  m(%x:i32):\n  label\n  ret %x\n}\n";
        check(ok).unwrap();

        let clobbered = "func f {\nentry:\n  %a:i32 = param\n  %x:i32 = move %a\n  %y:i32 = move %a\n  jump ^m\n\
                         m(%x:i32, %y:i32):\n  label\n  %x = move %y\n  %y = move %x\n  jump ^m\n}\n";
        assert!(matches!(check(clobbered).unwrap_err(), LowerError::ClobberedMergeValue { .. }));
    }
}
