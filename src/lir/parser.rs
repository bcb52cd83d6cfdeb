//! LIR text parser.
//!
//! Block references are resolved after the whole function has been read so
//! jumps may target blocks defined later. A variable needs a kind annotation
//! on at least one of its occurrences; all occurrences must agree.

use super::*;
use crate::core::{LowerError, LowerResult};

/// Parse every function in `text`.
pub fn parse_module(text: &str) -> LowerResult<Vec<Function>> {
    Parser::new(text).parse()
}

/// Parse text holding exactly one function.
pub fn parse_function(text: &str) -> LowerResult<Function> {
    let mut funcs = parse_module(text)?;
    if funcs.len() != 1 {
        return Err(LowerError::Parse {
            line: 1,
            column: 1,
            message: format!("expected exactly one function, found {}", funcs.len()),
        });
    }
    Ok(funcs.remove(0))
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,

    // Per-function maps
    blocks: HashMap<&'a str, BlockId>,
    block_resolves: Vec<Resolve<'a>>,
    kinds: Vec<Option<ValueKind>>,
    first_mention: Vec<usize>,
}

/// A `^name` block reference waiting for its target.
#[derive(Debug)]
struct Resolve<'a> {
    name: &'a str,
    block: BlockId,
    inst: usize,
    slot: usize,
    pos: usize,
}

const SECTION_KEYWORDS: [&str; 3] = ["temp", "alive", "state"];

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            blocks: HashMap::new(),
            block_resolves: Vec::new(),
            kinds: Vec::new(),
            first_mention: Vec::new(),
        }
    }

    fn parse(mut self) -> LowerResult<Vec<Function>> {
        let mut funcs = Vec::new();
        self.skip_whitespace(true);

        while !self.is_eof() {
            let func = self.parse_function()?;
            log::trace!("parsed function {} ({} blocks)", func.name, func.blocks().len());
            funcs.push(func);
            self.skip_whitespace(true);
        }

        Ok(funcs)
    }

    fn error<T>(&self, pos: usize, message: impl Into<String>) -> LowerResult<T> {
        let before = &self.text[..pos.min(self.text.len())];
        let line = before.matches('\n').count() + 1;
        let column = before.rfind('\n').map_or(before.len(), |nl| before.len() - nl - 1) + 1;
        Err(LowerError::Parse { line, column, message: message.into() })
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn current_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self, skip_newlines: bool) {
        while let Some(ch) = self.current_char() {
            if ch == ';' {
                // Comment runs to the end of the line
                while let Some(ch) = self.current_char() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else if ch.is_whitespace() {
                if ch == '\n' && !skip_newlines {
                    break;
                }
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Consume `ch` if it is the next character on the current line.
    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace(false);
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> LowerResult<()> {
        if !self.try_read(ch) {
            return match self.current_char() {
                Some(found) if found != '\n' => {
                    self.error(self.pos, format!("expected '{}' but found '{}'", ch, found))
                }
                _ => self.error(self.pos, format!("expected '{}' before end of line", ch)),
            };
        }
        Ok(())
    }

    fn at_line_end(&mut self) -> bool {
        self.skip_whitespace(false);
        matches!(self.current_char(), None | Some('\n'))
    }

    fn expect_line_end(&mut self) -> LowerResult<()> {
        if !self.at_line_end() {
            return self.error(self.pos, "expected end of line");
        }
        Ok(())
    }

    fn read_identifier(&mut self) -> LowerResult<&'a str> {
        self.skip_whitespace(false);
        let start = self.pos;

        match self.current_char() {
            Some(ch) if ch.is_alphanumeric() || ch == '_' => {}
            Some(ch) => return self.error(start, format!("expected identifier but found '{}'", ch)),
            None => return self.error(start, "expected identifier but found end of input"),
        }

        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                self.advance();
            } else {
                break;
            }
        }

        Ok(&self.text[start..self.pos])
    }

    /// Look ahead without consuming anything.
    fn peek_identifier(&mut self) -> Option<&'a str> {
        let saved = self.pos;
        let ident = self.read_identifier().ok();
        self.pos = saved;
        ident
    }

    fn read_number(&mut self) -> LowerResult<i64> {
        let start = self.pos;
        if self.current_char() == Some('-') {
            self.advance();
        }
        while self.current_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        let digits = &self.text[start..self.pos];
        match digits.parse::<i64>() {
            Ok(n) => Ok(n),
            Err(_) => self.error(start, format!("invalid number '{}'", digits)),
        }
    }

    /// Optional `:kind` suffix.
    fn read_kind_suffix(&mut self) -> LowerResult<Option<ValueKind>> {
        if self.current_char() != Some(':') {
            return Ok(None);
        }
        self.advance();
        let start = self.pos;
        let name = self.read_identifier()?;
        match ValueKind::parse(name) {
            Some(kind) => Ok(Some(kind)),
            None => self.error(start, format!("unknown kind '{}'", name)),
        }
    }

    fn parse_function(&mut self) -> LowerResult<Function> {
        let start = self.pos;
        if self.read_identifier()? != "func" {
            return self.error(start, "expected 'func'");
        }
        let name = self.read_identifier()?;
        self.skip_whitespace(false);
        self.expect('{')?;

        self.blocks.clear();
        self.block_resolves.clear();
        self.kinds.clear();
        self.first_mention.clear();

        let mut func = Function::new(name);
        loop {
            self.skip_whitespace(true);
            if self.is_eof() {
                return self.error(self.pos, format!("unterminated function {}", name));
            }
            if self.current_char() == Some('}') {
                self.advance();
                break;
            }
            self.parse_block(&mut func)?;
        }

        if func.blocks().is_empty() {
            return self.error(start, format!("function {} has no blocks", name));
        }

        self.resolve_blocks(&mut func)?;
        self.resolve_kinds(&mut func)?;
        Ok(func)
    }

    fn resolve_blocks(&mut self, func: &mut Function) -> LowerResult<()> {
        for resolve in std::mem::take(&mut self.block_resolves) {
            let Some(&target) = self.blocks.get(resolve.name) else {
                return self.error(resolve.pos, format!("undefined block ^{}", resolve.name));
            };
            let inst = &mut func.block_mut(resolve.block).insts[resolve.inst];
            if let Some(slot) = inst.successors_mut().into_iter().nth(resolve.slot) {
                *slot = target;
            }
        }
        Ok(())
    }

    fn resolve_kinds(&mut self, func: &mut Function) -> LowerResult<()> {
        for id in 0..func.variable_count() {
            match self.kinds[id] {
                Some(kind) => func.set_variable_kind(id as u32, kind),
                None => {
                    let name = func.variable_name(Variable::new(id as u32, ValueKind::Any));
                    return self.error(
                        self.first_mention[id],
                        format!("value %{} has no kind annotation", name),
                    );
                }
            }
        }
        func.sync_variable_kinds();
        Ok(())
    }

    fn parse_block(&mut self, func: &mut Function) -> LowerResult<()> {
        let start = self.pos;
        let name = self.read_identifier()?;
        if self.blocks.contains_key(name) {
            return self.error(start, format!("duplicate block {}", name));
        }
        let block = func.add_block(name);
        self.blocks.insert(name, block);

        // Lowered merge blocks list their former phi variables
        if self.try_read('(') {
            if !self.try_read(')') {
                loop {
                    self.skip_whitespace(false);
                    let var = self.read_variable(func)?;
                    func.mark_merge_variable(var, block);
                    if !self.try_read(',') {
                        self.expect(')')?;
                        break;
                    }
                }
            }
        }
        self.expect(':')?;
        self.expect_line_end()?;

        loop {
            self.skip_whitespace(true);
            if self.is_eof() || self.current_char() == Some('}') || self.at_block_header() {
                break;
            }
            let inst = self.parse_instruction(func, block)?;
            func.push(block, inst);
            self.expect_line_end()?;
        }

        Ok(())
    }

    fn at_block_header(&mut self) -> bool {
        let saved = self.pos;
        let is_header = self.read_identifier().is_ok()
            && match self.current_char() {
                Some('(') => true,
                Some(':') => {
                    self.advance();
                    self.at_line_end()
                }
                _ => false,
            };
        self.pos = saved;
        is_header
    }

    /// Whether the upcoming word is a fixed register or stack slot rather
    /// than an instruction name.
    fn at_fixed_location(&mut self) -> bool {
        let saved = self.pos;
        let fixed = match self.read_identifier() {
            Ok(ident) if is_location(ident) => {
                let _ = self.read_kind_suffix();
                self.skip_whitespace(false);
                matches!(self.current_char(), Some(',') | Some('='))
            }
            _ => false,
        };
        self.pos = saved;
        fixed
    }

    fn parse_instruction(&mut self, func: &mut Function, block: BlockId) -> LowerResult<Inst> {
        self.skip_whitespace(false);
        let start = self.pos;

        let mut outputs = Vec::new();
        if self.current_char() == Some('%') || self.at_fixed_location() {
            loop {
                self.skip_whitespace(false);
                outputs.push(self.read_value(func)?);
                if !self.try_read(',') {
                    break;
                }
            }
            self.expect('=')?;
        }

        let name_pos = self.pos;
        let name = self.read_identifier()?;
        let index = func.block(block).insts.len();

        if !outputs.is_empty() && matches!(name, "label" | "jump" | "branch" | "ret") {
            return self.error(start, format!("'{}' does not define values", name));
        }

        match name {
            "label" => {
                let mut incoming = Vec::new();
                if self.try_read('[') && !self.try_read(']') {
                    loop {
                        self.skip_whitespace(false);
                        incoming.push(self.read_variable(func)?);
                        if !self.try_read(',') {
                            self.expect(']')?;
                            break;
                        }
                    }
                }
                Ok(Inst::Label { incoming })
            }
            "jump" => {
                self.read_block_ref(block, index, 0)?;
                let mut outgoing = Vec::new();
                if self.try_read('[') && !self.try_read(']') {
                    loop {
                        self.skip_whitespace(false);
                        outgoing.push(self.read_value(func)?);
                        if !self.try_read(',') {
                            self.expect(']')?;
                            break;
                        }
                    }
                }
                Ok(Inst::Jump { target: BlockId(u32::MAX), outgoing })
            }
            "branch" => {
                self.skip_whitespace(false);
                let cond = self.read_operand(func)?;
                self.expect(',')?;
                self.read_block_ref(block, index, 0)?;
                self.expect(',')?;
                self.read_block_ref(block, index, 1)?;
                Ok(Inst::Branch {
                    cond,
                    if_true: BlockId(u32::MAX),
                    if_false: BlockId(u32::MAX),
                })
            }
            "ret" => {
                let value = if self.at_line_end() {
                    None
                } else {
                    Some(self.read_operand(func)?)
                };
                Ok(Inst::Return { value })
            }
            "move" => {
                let dst = match outputs.as_slice() {
                    [Value::Variable(var)] => *var,
                    _ => return self.error(start, "move defines exactly one variable"),
                };
                self.skip_whitespace(false);
                let src = self.read_value(func)?;
                Ok(Inst::Move { dst, src })
            }
            _ => {
                if name.is_empty() {
                    return self.error(name_pos, "expected instruction name");
                }
                let inputs = self.parse_operand_list(func)?;
                let mut op = OpInst {
                    name: name.to_string(),
                    outputs,
                    inputs,
                    temps: Vec::new(),
                    alive: Vec::new(),
                    state: Vec::new(),
                };
                while !self.at_line_end() {
                    let kw_pos = self.pos;
                    match self.read_identifier()? {
                        "temp" => {
                            op.temps = self
                                .parse_operand_list(func)?
                                .into_iter()
                                .map(|o| o.value)
                                .collect()
                        }
                        "alive" => op.alive = self.parse_operand_list(func)?,
                        "state" => op.state = self.parse_operand_list(func)?,
                        other => {
                            return self.error(kw_pos, format!("unexpected '{}' in operand list", other))
                        }
                    }
                }
                Ok(Inst::Op(op))
            }
        }
    }

    fn parse_operand_list(&mut self, func: &mut Function) -> LowerResult<Vec<Operand>> {
        let mut operands = Vec::new();
        loop {
            if self.at_line_end() {
                break;
            }
            if let Some(ident) = self.peek_identifier() {
                if SECTION_KEYWORDS.contains(&ident) {
                    break;
                }
            }
            operands.push(self.read_operand(func)?);
            if !self.try_read(',') {
                break;
            }
        }
        Ok(operands)
    }

    fn read_block_ref(&mut self, block: BlockId, inst: usize, slot: usize) -> LowerResult<()> {
        self.skip_whitespace(false);
        let pos = self.pos;
        self.expect('^')?;
        let name = self.read_identifier()?;
        self.block_resolves.push(Resolve { name, block, inst, slot, pos });
        Ok(())
    }

    fn read_operand(&mut self, func: &mut Function) -> LowerResult<Operand> {
        let value = self.read_value(func)?;
        let uninit = if self.current_char() == Some('?') {
            self.advance();
            true
        } else {
            false
        };
        Ok(Operand { value, uninit })
    }

    fn read_value(&mut self, func: &mut Function) -> LowerResult<Value> {
        self.skip_whitespace(false);
        let start = self.pos;
        match self.current_char() {
            Some('%') => Ok(Value::Variable(self.read_variable(func)?)),
            Some('#') => {
                self.advance();
                let bits = self.read_number()?;
                let kind = self.read_kind_suffix()?.unwrap_or(ValueKind::I64);
                Ok(Value::Constant { kind, bits })
            }
            Some(ch) if ch.is_alphabetic() => {
                let ident = self.read_identifier()?;
                if !is_location(ident) {
                    return self.error(start, format!("expected operand but found '{}'", ident));
                }
                let kind = self.read_kind_suffix()?.unwrap_or(ValueKind::I64);
                let (prefix, digits) = ident.split_at(1);
                match (prefix, digits.parse::<u32>()) {
                    ("r", Ok(n)) if n <= u16::MAX as u32 => {
                        Ok(Value::Register { kind, number: n as u16 })
                    }
                    ("s", Ok(index)) => Ok(Value::StackSlot { kind, index }),
                    _ => self.error(start, format!("invalid location '{}'", ident)),
                }
            }
            Some(ch) => self.error(start, format!("expected operand but found '{}'", ch)),
            None => self.error(start, "expected operand but found end of input"),
        }
    }

    fn read_variable(&mut self, func: &mut Function) -> LowerResult<Variable> {
        let start = self.pos;
        self.expect('%')?;
        let name = self.read_identifier()?;
        let kind = self.read_kind_suffix()?;

        let var = func.declare_variable(name, kind.unwrap_or(ValueKind::Any));
        let id = var.id as usize;
        if id >= self.kinds.len() {
            self.kinds.resize(id + 1, None);
            self.first_mention.resize(id + 1, start);
        }
        if let Some(kind) = kind {
            match self.kinds[id] {
                None => self.kinds[id] = Some(kind),
                Some(prev) if prev != kind => {
                    return self.error(
                        start,
                        format!("conflicting kinds for %{}: {} and {}", name, prev, kind),
                    );
                }
                Some(_) => {}
            }
        }
        Ok(var)
    }
}

/// `r<N>` or `s<N>`.
fn is_location(ident: &str) -> bool {
    let mut chars = ident.chars();
    matches!(chars.next(), Some('r') | Some('s'))
        && ident.len() > 1
        && chars.all(|c| c.is_ascii_digit())
}
