//! Block-structured low-level IR (LIR) handled by the SSA passes.
//!
//! A [`Function`] is a list of [`Block`]s, each an ordered list of [`Inst`]s
//! ending in a terminator. Merge blocks start with a [`Inst::Label`] that
//! declares the phi variables of the block; every unconditional predecessor
//! ends in an [`Inst::Jump`] whose outgoing list is positionally aligned with
//! that label.
//!
//! # Text format
//!
//! ```text
//! ; Comments start with semicolon
//! func swap {
//! entry:
//!   %a:i32 = param
//!   %b:i32 = param
//!   %c:i32 = param
//!   branch %c, ^left, ^right
//! left:
//!   jump ^merge [%a, %b]
//! right:
//!   jump ^merge [%b, %a]
//! merge:
//!   label [%x:i32, %y:i32]
//!   %s:i32 = add %x, %y
//!   ret %s
//! }
//! ```
//!
//! Operands are `%name` variables, `#42:i32` constants, `r3:i64` registers
//! and `s1:i64` stack slots. A trailing `?` marks an operand that may be read
//! before it is defined. After lowering, the merged variables of a block are
//! listed in its header: `merge(%x:i32, %y:i32):`.

use hashbrown::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};

pub mod cfg;
pub mod check;
pub mod display;
pub mod parser;

pub use cfg::Cfg;
pub use check::{CheckDirective, TestRunner, TestSpec};
pub use parser::{parse_function, parse_module};

/// Width and category of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    I32,
    I64,
    F32,
    F64,
    /// Reference with a known type.
    Ref,
    /// Reference whose type is not constrained.
    AnyRef,
    /// Untyped 64-bit slot. Only used for cycle temporaries holding mixed kinds.
    Any,
}

impl ValueKind {
    pub const fn name(self) -> &'static str {
        match self {
            ValueKind::I32 => "i32",
            ValueKind::I64 => "i64",
            ValueKind::F32 => "f32",
            ValueKind::F64 => "f64",
            ValueKind::Ref => "ref",
            ValueKind::AnyRef => "anyref",
            ValueKind::Any => "any",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "i32" => Some(ValueKind::I32),
            "i64" => Some(ValueKind::I64),
            "f32" => Some(ValueKind::F32),
            "f64" => Some(ValueKind::F64),
            "ref" => Some(ValueKind::Ref),
            "anyref" => Some(ValueKind::AnyRef),
            "any" => Some(ValueKind::Any),
            _ => None,
        }
    }

    /// Whether a value of kind `outgoing` may flow into a phi of this kind.
    ///
    /// Kinds must match, except that an unconstrained reference may be
    /// narrowed into a typed reference slot.
    pub fn accepts(self, outgoing: ValueKind) -> bool {
        self == outgoing || (self == ValueKind::Ref && outgoing == ValueKind::AnyRef)
    }

    /// Smallest kind able to hold values of both kinds.
    pub fn join(self, other: ValueKind) -> ValueKind {
        match (self, other) {
            (a, b) if a == b => a,
            (ValueKind::Ref, ValueKind::AnyRef) | (ValueKind::AnyRef, ValueKind::Ref) => {
                ValueKind::AnyRef
            }
            _ => ValueKind::Any,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An SSA variable. Identity is the id; the kind is carried along for checks.
#[derive(Debug, Clone, Copy)]
pub struct Variable {
    pub id: u32,
    pub kind: ValueKind,
}

impl Variable {
    pub const fn new(id: u32, kind: ValueKind) -> Self {
        Self { id, kind }
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Variable {}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Variable {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Variable {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.id)
    }
}

/// Operand descriptor.
///
/// Only [`Value::Variable`] takes part in the SSA invariant; constants,
/// pre-colored registers and stack slots exist before SSA numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    Constant { kind: ValueKind, bits: i64 },
    StackSlot { kind: ValueKind, index: u32 },
    Register { kind: ValueKind, number: u16 },
    Variable(Variable),
}

impl Value {
    pub const fn constant(kind: ValueKind, bits: i64) -> Self {
        Value::Constant { kind, bits }
    }

    pub fn kind(&self) -> ValueKind {
        match *self {
            Value::Constant { kind, .. }
            | Value::StackSlot { kind, .. }
            | Value::Register { kind, .. } => kind,
            Value::Variable(var) => var.kind,
        }
    }

    pub fn as_variable(&self) -> Option<Variable> {
        match *self {
            Value::Variable(var) => Some(var),
            _ => None,
        }
    }
}

impl From<Variable> for Value {
    fn from(var: Variable) -> Self {
        Value::Variable(var)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Value::Constant { kind, bits } => write!(f, "#{}:{}", bits, kind),
            Value::StackSlot { kind, index } => write!(f, "s{}:{}", index, kind),
            Value::Register { kind, number } => write!(f, "r{}:{}", number, kind),
            Value::Variable(var) => write!(f, "%{}", var),
        }
    }
}

/// A value read by an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operand {
    pub value: Value,
    /// The value may be read before any definition (incoming state that
    /// predates SSA numbering).
    pub uninit: bool,
}

impl Operand {
    pub fn new(value: impl Into<Value>) -> Self {
        Self { value: value.into(), uninit: false }
    }

    pub fn uninit(value: impl Into<Value>) -> Self {
        Self { value: value.into(), uninit: true }
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::new(value)
    }
}

impl From<Variable> for Operand {
    fn from(var: Variable) -> Self {
        Operand::new(var)
    }
}

/// Index of a block inside its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Any instruction that is not control flow, a label or a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpInst {
    pub name: String,
    pub outputs: Vec<Value>,
    pub inputs: Vec<Operand>,
    /// Scratch values defined and clobbered by the instruction.
    pub temps: Vec<Value>,
    /// Values that must stay alive across the instruction.
    pub alive: Vec<Operand>,
    /// Values referenced by the instruction's state description.
    pub state: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inst {
    /// First instruction of a merge block, declaring its phi variables.
    Label { incoming: Vec<Variable> },
    /// Unconditional jump passing phi values positionally to the target label.
    Jump { target: BlockId, outgoing: Vec<Value> },
    Branch {
        cond: Operand,
        if_true: BlockId,
        if_false: BlockId,
    },
    Return { value: Option<Operand> },
    Move { dst: Variable, src: Value },
    Op(OpInst),
}

impl Inst {
    /// Generic instruction with outputs and inputs only.
    pub fn op(name: &str, outputs: Vec<Value>, inputs: Vec<Operand>) -> Self {
        Inst::Op(OpInst {
            name: name.to_string(),
            outputs,
            inputs,
            temps: Vec::new(),
            alive: Vec::new(),
            state: Vec::new(),
        })
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, Inst::Jump { .. } | Inst::Branch { .. } | Inst::Return { .. })
    }

    pub fn mnemonic(&self) -> &str {
        match self {
            Inst::Label { .. } => "label",
            Inst::Jump { .. } => "jump",
            Inst::Branch { .. } => "branch",
            Inst::Return { .. } => "ret",
            Inst::Move { .. } => "move",
            Inst::Op(op) => &op.name,
        }
    }

    /// Successor blocks in operand order.
    pub fn successors(&self) -> impl Iterator<Item = BlockId> {
        let (first, second) = match *self {
            Inst::Jump { target, .. } => (Some(target), None),
            Inst::Branch { if_true, if_false, .. } => (Some(if_true), Some(if_false)),
            _ => (None, None),
        };
        first.into_iter().chain(second)
    }

    pub(crate) fn successors_mut(&mut self) -> Vec<&mut BlockId> {
        match self {
            Inst::Jump { target, .. } => vec![target],
            Inst::Branch { if_true, if_false, .. } => vec![if_true, if_false],
            _ => Vec::new(),
        }
    }

    /// Visit every value read by the instruction: inputs, alive-across and
    /// state operands, outgoing phi values, move sources and conditions.
    pub fn for_each_use(&self, mut f: impl FnMut(Operand)) {
        match self {
            Inst::Label { .. } => {}
            Inst::Jump { outgoing, .. } => outgoing.iter().for_each(|v| f(Operand::new(*v))),
            Inst::Branch { cond, .. } => f(*cond),
            Inst::Return { value } => {
                if let Some(value) = value {
                    f(*value);
                }
            }
            Inst::Move { src, .. } => f(Operand::new(*src)),
            Inst::Op(op) => {
                op.inputs.iter().for_each(|o| f(*o));
                op.alive.iter().for_each(|o| f(*o));
                op.state.iter().for_each(|o| f(*o));
            }
        }
    }

    /// Visit every value written by the instruction: temps first, then outputs.
    pub fn for_each_def(&self, mut f: impl FnMut(Value)) {
        match self {
            Inst::Label { incoming } => incoming.iter().for_each(|v| f(Value::Variable(*v))),
            Inst::Move { dst, .. } => f(Value::Variable(*dst)),
            Inst::Op(op) => {
                op.temps.iter().for_each(|v| f(*v));
                op.outputs.iter().for_each(|v| f(*v));
            }
            Inst::Jump { .. } | Inst::Branch { .. } | Inst::Return { .. } => {}
        }
    }

    pub(crate) fn for_each_variable_mut(&mut self, f: &mut impl FnMut(&mut Variable)) {
        fn value(v: &mut Value, f: &mut impl FnMut(&mut Variable)) {
            if let Value::Variable(var) = v {
                f(var);
            }
        }

        match self {
            Inst::Label { incoming } => incoming.iter_mut().for_each(|v| f(v)),
            Inst::Jump { outgoing, .. } => outgoing.iter_mut().for_each(|v| value(v, f)),
            Inst::Branch { cond, .. } => value(&mut cond.value, f),
            Inst::Return { value: ret } => {
                if let Some(op) = ret {
                    value(&mut op.value, f);
                }
            }
            Inst::Move { dst, src } => {
                f(dst);
                value(src, f);
            }
            Inst::Op(op) => {
                op.outputs.iter_mut().for_each(|v| value(v, f));
                op.temps.iter_mut().for_each(|v| value(v, f));
                op.inputs
                    .iter_mut()
                    .chain(op.alive.iter_mut())
                    .chain(op.state.iter_mut())
                    .for_each(|o| value(&mut o.value, f));
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub name: String,
    pub insts: Vec<Inst>,
}

impl Block {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), insts: Vec::new() }
    }

    /// Last instruction, if it is a terminator.
    pub fn terminator(&self) -> Option<&Inst> {
        self.insts.last().filter(|inst| inst.is_terminator())
    }

    pub fn terminator_mut(&mut self) -> Option<&mut Inst> {
        self.insts.last_mut().filter(|inst| inst.is_terminator())
    }

    /// Phi variables declared by the leading label, if the block has one.
    pub fn label(&self) -> Option<&[Variable]> {
        match self.insts.first() {
            Some(Inst::Label { incoming }) => Some(incoming),
            _ => None,
        }
    }

    pub fn successors(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.terminator().into_iter().flat_map(|inst| inst.successors())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct VarInfo {
    name: String,
    kind: ValueKind,
}

/// One compilation unit: blocks plus the variable table.
///
/// The variable table is the compilation unit's own numbering; temporaries
/// introduced by lowering are minted from it, so no counter is shared
/// between functions compiled on different threads.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    blocks: Vec<Block>,
    vars: Vec<VarInfo>,
    var_names: HashMap<String, u32>,
    /// Variables whose phi definitions were lowered into edge moves, with
    /// the merge block they belong to.
    merge_vars: HashMap<Variable, BlockId>,
}

impl Function {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            blocks: Vec::new(),
            vars: Vec::new(),
            var_names: HashMap::new(),
            merge_vars: HashMap::new(),
        }
    }

    /// Entry block. Blocks are numbered in definition order.
    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn add_block(&mut self, name: &str) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::new(name));
        id
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn block_by_name(&self, name: &str) -> Option<BlockId> {
        self.blocks.iter().position(|b| b.name == name).map(|idx| BlockId(idx as u32))
    }

    /// Block name for diagnostics; tolerates ids outside the function.
    pub fn block_name(&self, id: BlockId) -> &str {
        self.blocks.get(id.index()).map(|b| b.name.as_str()).unwrap_or("<unknown>")
    }

    pub fn push(&mut self, block: BlockId, inst: Inst) {
        self.blocks[block.index()].insts.push(inst);
    }

    /// Look up a variable by name, creating it if it does not exist yet.
    pub fn declare_variable(&mut self, name: &str, kind: ValueKind) -> Variable {
        if let Some(&id) = self.var_names.get(name) {
            return Variable::new(id, self.vars[id as usize].kind);
        }
        let id = self.vars.len() as u32;
        self.vars.push(VarInfo { name: name.to_string(), kind });
        self.var_names.insert(name.to_string(), id);
        Variable::new(id, kind)
    }

    /// Mint a fresh variable whose name starts with `hint`.
    pub fn new_variable(&mut self, hint: &str, kind: ValueKind) -> Variable {
        let mut name = hint.to_string();
        let mut suffix = 0;
        while self.var_names.contains_key(&name) {
            suffix += 1;
            name = format!("{}.{}", hint, suffix);
        }
        self.declare_variable(&name, kind)
    }

    pub fn variable(&self, name: &str) -> Option<Variable> {
        self.var_names
            .get(name)
            .map(|&id| Variable::new(id, self.vars[id as usize].kind))
    }

    pub fn variable_count(&self) -> usize {
        self.vars.len()
    }

    pub fn variable_name(&self, var: Variable) -> &str {
        self.vars.get(var.id as usize).map(|v| v.name.as_str()).unwrap_or("?")
    }

    pub(crate) fn set_variable_kind(&mut self, id: u32, kind: ValueKind) {
        self.vars[id as usize].kind = kind;
    }

    /// Rewrite the kind carried by every variable reference to the kind in
    /// the variable table.
    pub(crate) fn sync_variable_kinds(&mut self) {
        let vars = &self.vars;
        let mut sync = |var: &mut Variable| var.kind = vars[var.id as usize].kind;
        for block in &mut self.blocks {
            for inst in &mut block.insts {
                inst.for_each_variable_mut(&mut sync);
            }
        }
        self.merge_vars = self
            .merge_vars
            .iter()
            .map(|(var, block)| (Variable::new(var.id, vars[var.id as usize].kind), *block))
            .collect();
    }

    /// Merge block whose phi defined `var` before lowering, if any.
    pub fn merge_block_of(&self, var: Variable) -> Option<BlockId> {
        self.merge_vars.get(&var).copied()
    }

    /// Lowered phi variables of `block`, ordered by id.
    pub fn merged_variables(&self, block: BlockId) -> Vec<Variable> {
        let mut vars: Vec<_> = self
            .merge_vars
            .iter()
            .filter(|(_, b)| **b == block)
            .map(|(v, _)| *v)
            .collect();
        vars.sort();
        vars
    }

    pub(crate) fn mark_merge_variable(&mut self, var: Variable, block: BlockId) {
        self.merge_vars.insert(var, block);
    }

    /// Variables whose value is observed.
    ///
    /// Any read outside a jump counts. A value passed along a jump counts
    /// only if the phi receiving it is itself observed, so a phi that is
    /// merely handed back to itself around a loop is not.
    pub fn observed_variables(&self) -> HashSet<Variable> {
        let mut observed = HashSet::new();
        // (receiving phi, passed variable)
        let mut passes = Vec::new();

        for block in &self.blocks {
            for inst in &block.insts {
                let Inst::Jump { target, outgoing } = inst else {
                    inst.for_each_use(|op| {
                        if let Value::Variable(var) = op.value {
                            observed.insert(var);
                        }
                    });
                    continue;
                };
                let incoming = self.blocks.get(target.index()).and_then(Block::label).unwrap_or_default();
                for (position, value) in outgoing.iter().enumerate() {
                    let Value::Variable(var) = *value else {
                        continue;
                    };
                    match incoming.get(position) {
                        Some(&phi) if phi == var => {}
                        Some(&phi) => passes.push((phi, var)),
                        None => {
                            observed.insert(var);
                        }
                    }
                }
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for &(phi, var) in &passes {
                if observed.contains(&phi) && observed.insert(var) {
                    changed = true;
                }
            }
        }
        observed
    }

    /// Whether any label still carries phi variables.
    pub fn has_phis(&self) -> bool {
        self.blocks.iter().any(|b| b.label().is_some_and(|l| !l.is_empty()))
    }
}
