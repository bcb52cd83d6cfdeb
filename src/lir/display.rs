//! Printing functions and instructions in the textual LIR syntax.
//!
//! Variables print with their source names. Definitions carry a `:kind`
//! annotation so printed functions parse back unchanged.

use super::{Function, Inst, Operand, Value};
use std::fmt;

/// Renders one value in the context of its function.
pub struct ValueDisplay<'a> {
    func: &'a Function,
    value: Value,
    with_kind: bool,
    uninit: bool,
}

impl fmt::Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Variable(var) => {
                write!(f, "%{}", self.func.variable_name(var))?;
                if self.with_kind {
                    write!(f, ":{}", var.kind)?;
                }
            }
            other => write!(f, "{}", other)?,
        }
        if self.uninit {
            f.write_str("?")?;
        }
        Ok(())
    }
}

/// Renders one instruction in the context of its function.
pub struct InstDisplay<'a> {
    func: &'a Function,
    inst: &'a Inst,
}

impl Function {
    pub fn display_value(&self, value: Value) -> ValueDisplay<'_> {
        ValueDisplay { func: self, value, with_kind: false, uninit: false }
    }

    fn display_def(&self, value: Value) -> ValueDisplay<'_> {
        ValueDisplay { func: self, value, with_kind: true, uninit: false }
    }

    fn display_operand(&self, operand: Operand) -> ValueDisplay<'_> {
        ValueDisplay { func: self, value: operand.value, with_kind: false, uninit: operand.uninit }
    }

    pub fn display_inst<'a>(&'a self, inst: &'a Inst) -> InstDisplay<'a> {
        InstDisplay { func: self, inst }
    }
}

fn write_list<T: Copy>(
    f: &mut fmt::Formatter<'_>,
    items: &[T],
    mut item: impl FnMut(&mut fmt::Formatter<'_>, T) -> fmt::Result,
) -> fmt::Result {
    for (i, &it) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        item(f, it)?;
    }
    Ok(())
}

impl fmt::Display for InstDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let func = self.func;
        match self.inst {
            Inst::Label { incoming } => {
                f.write_str("label")?;
                if !incoming.is_empty() {
                    f.write_str(" [")?;
                    write_list(f, incoming, |f, v| write!(f, "{}", func.display_def(v.into())))?;
                    f.write_str("]")?;
                }
                Ok(())
            }
            Inst::Jump { target, outgoing } => {
                write!(f, "jump ^{}", func.block_name(*target))?;
                if !outgoing.is_empty() {
                    f.write_str(" [")?;
                    write_list(f, outgoing, |f, v| write!(f, "{}", func.display_value(v)))?;
                    f.write_str("]")?;
                }
                Ok(())
            }
            Inst::Branch { cond, if_true, if_false } => write!(
                f,
                "branch {}, ^{}, ^{}",
                func.display_operand(*cond),
                func.block_name(*if_true),
                func.block_name(*if_false)
            ),
            Inst::Return { value: None } => f.write_str("ret"),
            Inst::Return { value: Some(value) } => write!(f, "ret {}", func.display_operand(*value)),
            Inst::Move { dst, src } => write!(
                f,
                "{} = move {}",
                func.display_def((*dst).into()),
                func.display_value(*src)
            ),
            Inst::Op(op) => {
                if !op.outputs.is_empty() {
                    write_list(f, &op.outputs, |f, v| write!(f, "{}", func.display_def(v)))?;
                    f.write_str(" = ")?;
                }
                f.write_str(&op.name)?;
                if !op.inputs.is_empty() {
                    f.write_str(" ")?;
                    write_list(f, &op.inputs, |f, o| write!(f, "{}", func.display_operand(o)))?;
                }
                if !op.temps.is_empty() {
                    f.write_str(" temp ")?;
                    write_list(f, &op.temps, |f, v| write!(f, "{}", func.display_def(v)))?;
                }
                if !op.alive.is_empty() {
                    f.write_str(" alive ")?;
                    write_list(f, &op.alive, |f, o| write!(f, "{}", func.display_operand(o)))?;
                }
                if !op.state.is_empty() {
                    f.write_str(" state ")?;
                    write_list(f, &op.state, |f, o| write!(f, "{}", func.display_operand(o)))?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "func {} {{", self.name)?;
        for id in self.block_ids() {
            let block = self.block(id);
            f.write_str(&block.name)?;

            let merged = self.merged_variables(id);
            if !merged.is_empty() {
                f.write_str("(")?;
                write_list(f, &merged, |f, v| write!(f, "{}", self.display_def(v.into())))?;
                f.write_str(")")?;
            }
            writeln!(f, ":")?;

            for inst in &block.insts {
                writeln!(f, "  {}", self.display_inst(inst))?;
            }
        }
        writeln!(f, "}}")
    }
}
