// RDB - Replay Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Compiler from syntax tree to wordcode
//!
//! Each module body and each function body becomes one [`Code`]: a shared
//! [`CodeDescriptor`] plus the typed constants the VM needs (including the code of
//! nested functions). Code is first emitted against symbolic labels and then
//! assembled: operand widths are grown until jump targets stop moving, after which
//! the `EXTENDED_ARG` prefixes are final and the line table can be built.
//!
//! Line attribution: every instruction carries the line of the statement that
//! produced it, except for instructions with no source counterpart (the implicit
//! return at the end of a unit, loop back-edges, branch exits), which are left in
//! synthetic (`None`) ranges.

use std::{rc::Rc, sync::Arc};

use rdb_common::{
    encode_instruction, encoded_size,
    types::{format_float, quote_str, CodeDescriptor, LineRange, MODULE_UNIT_NAME},
    CompareOp, Opcode,
};

use crate::lang::{
    ast::{BinaryOp, CmpOp, Expr, Module, Stmt, StmtKind, Target},
    parse, CompileError,
};

/// Constant operand of a code unit
#[derive(Debug, Clone)]
pub enum Constant {
    /// `None`
    None,
    /// Boolean literal
    Bool(bool),
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal
    Str(Rc<str>),
    /// Body of a nested function
    Code(Rc<Code>),
}

impl Constant {
    /// Display form stored in the descriptor
    pub fn display(&self) -> String {
        match self {
            Self::None => "None".to_string(),
            Self::Bool(true) => "True".to_string(),
            Self::Bool(false) => "False".to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(x) => format_float(*x),
            Self::Str(s) => quote_str(s),
            Self::Code(code) => format!("<code object {}>", code.descriptor.name),
        }
    }

    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            _ => false,
        }
    }
}

/// A compiled unit: descriptor plus typed constants
#[derive(Debug)]
pub struct Code {
    /// Immutable description shared with frame snapshots
    pub descriptor: Arc<CodeDescriptor>,
    /// Typed constants, index-aligned with `descriptor.constants`
    pub constants: Vec<Constant>,
    /// Number of positional parameters (zero for a module)
    pub arg_count: usize,
}

impl Code {
    /// Whether this unit is a module body
    pub fn is_module(&self) -> bool {
        self.descriptor.is_module()
    }

    /// Name of the unit
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// Parse and compile program text
pub fn compile(filename: &str, source: &str) -> Result<Rc<Code>, CompileError> {
    let module = parse(source)?;
    compile_module(filename, &module)
}

/// Compile a parsed module
pub fn compile_module(filename: &str, module: &Module) -> Result<Rc<Code>, CompileError> {
    let mut unit = Unit::new(filename, MODULE_UNIT_NAME, Vec::new(), false);
    unit.block(&module.body)?;
    unit.finish(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Label(usize);

#[derive(Debug, Clone, Copy)]
enum Arg {
    Value(u32),
    Label(Label),
}

#[derive(Debug)]
struct Pending {
    opcode: Opcode,
    arg: Arg,
    line: Option<u32>,
}

struct LoopLabels {
    start: Label,
    end: Label,
}

struct Unit {
    filename: String,
    name: String,
    is_function: bool,
    instructions: Vec<Pending>,
    labels: Vec<Option<usize>>,
    constants: Vec<Constant>,
    names: Vec<String>,
    locals: Vec<String>,
    loops: Vec<LoopLabels>,
    line: Option<u32>,
}

impl Unit {
    fn new(filename: &str, name: &str, locals: Vec<String>, is_function: bool) -> Self {
        Self {
            filename: filename.to_string(),
            name: name.to_string(),
            is_function,
            instructions: Vec::new(),
            labels: Vec::new(),
            constants: Vec::new(),
            names: Vec::new(),
            locals,
            loops: Vec::new(),
            line: None,
        }
    }

    fn emit(&mut self, opcode: Opcode, arg: u32) {
        self.instructions.push(Pending { opcode, arg: Arg::Value(arg), line: self.line });
    }

    fn emit_jump(&mut self, opcode: Opcode, target: Label) {
        self.instructions.push(Pending { opcode, arg: Arg::Label(target), line: self.line });
    }

    /// Emit a jump with no source line of its own
    fn emit_synthetic_jump(&mut self, opcode: Opcode, target: Label) {
        let line = self.line.take();
        self.emit_jump(opcode, target);
        self.line = line;
    }

    fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(self.instructions.len());
    }

    fn add_constant(&mut self, constant: Constant) -> u32 {
        if !matches!(constant, Constant::Code(_)) {
            if let Some(idx) = self.constants.iter().position(|c| c.same(&constant)) {
                return idx as u32;
            }
        }
        self.constants.push(constant);
        (self.constants.len() - 1) as u32
    }

    fn add_name(&mut self, name: &str) -> u32 {
        if let Some(idx) = self.names.iter().position(|n| n == name) {
            return idx as u32;
        }
        self.names.push(name.to_string());
        (self.names.len() - 1) as u32
    }

    fn local_slot(&self, name: &str) -> Option<u32> {
        if !self.is_function {
            return None;
        }
        self.locals.iter().position(|n| n == name).map(|idx| idx as u32)
    }

    fn load_name(&mut self, name: &str) {
        match self.local_slot(name) {
            Some(slot) => self.emit(Opcode::LOAD_FAST, slot),
            None if self.is_function => {
                let idx = self.add_name(name);
                self.emit(Opcode::LOAD_GLOBAL, idx);
            }
            None => {
                let idx = self.add_name(name);
                self.emit(Opcode::LOAD_NAME, idx);
            }
        }
    }

    fn store_name(&mut self, name: &str) {
        match self.local_slot(name) {
            Some(slot) => self.emit(Opcode::STORE_FAST, slot),
            None => {
                let idx = self.add_name(name);
                self.emit(Opcode::STORE_NAME, idx);
            }
        }
    }

    fn block(&mut self, body: &[Stmt]) -> Result<(), CompileError> {
        body.iter().try_for_each(|stmt| self.statement(stmt))
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        self.line = Some(stmt.line);
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.expression(expr);
                self.emit(Opcode::POP_TOP, 0);
            }
            StmtKind::Assign { target: Target::Name(name), value } => {
                self.expression(value);
                self.store_name(name);
            }
            StmtKind::Assign { target: Target::Subscript { object, index }, value } => {
                self.expression(value);
                self.expression(object);
                self.expression(index);
                self.emit(Opcode::STORE_SUBSCR, 0);
            }
            StmtKind::AugAssign { name, op, value } => {
                self.load_name(name);
                self.expression(value);
                self.emit(binary_opcode(*op), 0);
                self.store_name(name);
            }
            StmtKind::If { branches, orelse } => {
                let end = self.new_label();
                let last = branches.len() - 1;
                for (idx, (condition, line, body)) in branches.iter().enumerate() {
                    self.line = Some(*line);
                    let next = self.new_label();
                    self.expression(condition);
                    self.emit_jump(Opcode::POP_JUMP_IF_FALSE, next);
                    self.block(body)?;
                    if idx < last || !orelse.is_empty() {
                        self.emit_synthetic_jump(Opcode::JUMP_ABSOLUTE, end);
                    }
                    self.bind(next);
                }
                self.block(orelse)?;
                self.bind(end);
            }
            StmtKind::While { condition, body } => {
                let start = self.new_label();
                let end = self.new_label();
                self.bind(start);
                self.expression(condition);
                self.emit_jump(Opcode::POP_JUMP_IF_FALSE, end);
                self.loops.push(LoopLabels { start, end });
                let result = self.block(body);
                self.loops.pop();
                result?;
                self.emit_synthetic_jump(Opcode::JUMP_ABSOLUTE, start);
                self.bind(end);
            }
            StmtKind::Break => {
                let end = self
                    .loops
                    .last()
                    .map(|l| l.end)
                    .ok_or_else(|| CompileError::new(stmt.line, "'break' outside loop"))?;
                self.emit_jump(Opcode::JUMP_ABSOLUTE, end);
            }
            StmtKind::Continue => {
                let start = self
                    .loops
                    .last()
                    .map(|l| l.start)
                    .ok_or_else(|| CompileError::new(stmt.line, "'continue' not properly in loop"))?;
                self.emit_jump(Opcode::JUMP_ABSOLUTE, start);
            }
            StmtKind::Pass => self.emit(Opcode::NOP, 0),
            StmtKind::Def { name, params, body } => {
                let code = self.function(name, params, body)?;
                let idx = self.add_constant(Constant::Code(code));
                self.emit(Opcode::LOAD_CONST, idx);
                self.emit(Opcode::MAKE_FUNCTION, 0);
                self.store_name(name);
            }
            StmtKind::Return(value) => {
                if !self.is_function {
                    return Err(CompileError::new(stmt.line, "'return' outside function"));
                }
                match value {
                    Some(value) => self.expression(value),
                    None => {
                        let idx = self.add_constant(Constant::None);
                        self.emit(Opcode::LOAD_CONST, idx);
                    }
                }
                self.emit(Opcode::RETURN_VALUE, 0);
            }
        }
        Ok(())
    }

    fn function(
        &self,
        name: &str,
        params: &[String],
        body: &[Stmt],
    ) -> Result<Rc<Code>, CompileError> {
        let mut locals = params.to_vec();
        collect_assigned(body, &mut locals);
        let mut unit = Unit::new(&self.filename, name, locals, true);
        unit.block(body)?;
        unit.finish(params.len())
    }

    fn expression(&mut self, expr: &Expr) {
        match expr {
            Expr::Int(i) => self.constant(Constant::Int(*i)),
            Expr::Float(x) => self.constant(Constant::Float(*x)),
            Expr::Str(s) => self.constant(Constant::Str(Rc::from(s.as_str()))),
            Expr::Bool(b) => self.constant(Constant::Bool(*b)),
            Expr::None => self.constant(Constant::None),
            Expr::Name(name) => self.load_name(name),
            Expr::List(items) => {
                items.iter().for_each(|item| self.expression(item));
                self.emit(Opcode::BUILD_LIST, items.len() as u32);
            }
            Expr::Neg(operand) => {
                self.expression(operand);
                self.emit(Opcode::UNARY_NEGATIVE, 0);
            }
            Expr::Not(operand) => {
                self.expression(operand);
                self.emit(Opcode::UNARY_NOT, 0);
            }
            Expr::Binary { op, left, right } => {
                self.expression(left);
                self.expression(right);
                self.emit(binary_opcode(*op), 0);
            }
            Expr::Compare { op, left, right } => {
                self.expression(left);
                self.expression(right);
                self.emit(Opcode::COMPARE_OP, compare_arg(*op));
            }
            Expr::And(left, right) => self.short_circuit(Opcode::JUMP_IF_FALSE_OR_POP, left, right),
            Expr::Or(left, right) => self.short_circuit(Opcode::JUMP_IF_TRUE_OR_POP, left, right),
            Expr::Call { callee, args } => {
                self.expression(callee);
                args.iter().for_each(|arg| self.expression(arg));
                self.emit(Opcode::CALL_FUNCTION, args.len() as u32);
            }
            Expr::Subscript { object, index } => {
                self.expression(object);
                self.expression(index);
                self.emit(Opcode::BINARY_SUBSCR, 0);
            }
        }
    }

    fn constant(&mut self, constant: Constant) {
        let idx = self.add_constant(constant);
        self.emit(Opcode::LOAD_CONST, idx);
    }

    fn short_circuit(&mut self, opcode: Opcode, left: &Expr, right: &Expr) {
        let end = self.new_label();
        self.expression(left);
        self.emit_jump(opcode, end);
        self.expression(right);
        self.bind(end);
    }

    fn finish(mut self, arg_count: usize) -> Result<Rc<Code>, CompileError> {
        self.line = None;
        let none = self.add_constant(Constant::None);
        self.emit(Opcode::LOAD_CONST, none);
        self.emit(Opcode::RETURN_VALUE, 0);

        let (instructions, line_table) = self.assemble()?;
        let descriptor = CodeDescriptor {
            filename: self.filename,
            name: self.name,
            instructions,
            constants: self.constants.iter().map(Constant::display).collect(),
            names: self.names,
            local_names: self.locals,
            line_table,
        };
        Ok(Rc::new(Code {
            descriptor: Arc::new(descriptor),
            constants: self.constants,
            arg_count,
        }))
    }

    /// Resolve labels, size operands to a fixed point and lay out the bytes
    fn assemble(&self) -> Result<(Vec<u8>, Vec<LineRange>), CompileError> {
        let count = self.instructions.len();
        // operands only grow, so the widths converge
        let mut sizes = vec![2usize; count];
        let mut offsets = vec![0usize; count + 1];

        let resolve = |arg: Arg, offsets: &[usize]| -> Result<u32, CompileError> {
            match arg {
                Arg::Value(value) => Ok(value),
                Arg::Label(label) => {
                    let idx = self.labels[label.0]
                        .ok_or_else(|| CompileError::new(0, "internal error: unbound label"))?;
                    u32::try_from(offsets[idx])
                        .map_err(|_| CompileError::new(0, "code unit too large"))
                }
            }
        };

        loop {
            for idx in 0..count {
                offsets[idx + 1] = offsets[idx] + sizes[idx];
            }
            let mut changed = false;
            for (idx, pending) in self.instructions.iter().enumerate() {
                let size = encoded_size(resolve(pending.arg, &offsets)?);
                if size > sizes[idx] {
                    sizes[idx] = size;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let mut bytes = Vec::with_capacity(offsets[count]);
        let mut line_table: Vec<LineRange> = Vec::new();
        for (idx, pending) in self.instructions.iter().enumerate() {
            let arg = resolve(pending.arg, &offsets)?;
            let start = bytes.len();
            encode_instruction(&mut bytes, pending.opcode, arg);
            debug_assert_eq!(bytes.len(), offsets[idx + 1]);

            match line_table.last_mut() {
                Some(range) if range.line == pending.line => range.end = bytes.len(),
                _ => line_table.push(LineRange { start, end: bytes.len(), line: pending.line }),
            }
        }

        Ok((bytes, line_table))
    }
}

fn binary_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::BINARY_ADD,
        BinaryOp::Sub => Opcode::BINARY_SUBTRACT,
        BinaryOp::Mul => Opcode::BINARY_MULTIPLY,
        BinaryOp::Div => Opcode::BINARY_TRUE_DIVIDE,
        BinaryOp::FloorDiv => Opcode::BINARY_FLOOR_DIVIDE,
        BinaryOp::Mod => Opcode::BINARY_MODULO,
    }
}

fn compare_arg(op: CmpOp) -> u32 {
    let op = match op {
        CmpOp::Lt => CompareOp::Lt,
        CmpOp::Le => CompareOp::Le,
        CmpOp::Eq => CompareOp::Eq,
        CmpOp::Ne => CompareOp::Ne,
        CmpOp::Gt => CompareOp::Gt,
        CmpOp::Ge => CompareOp::Ge,
    };
    op as u32
}

/// Names bound anywhere in a function body, nested function bodies excluded
fn collect_assigned(body: &[Stmt], names: &mut Vec<String>) {
    let mut bind = |name: &String, names: &mut Vec<String>| {
        if !names.contains(name) {
            names.push(name.clone());
        }
    };
    for stmt in body {
        match &stmt.kind {
            StmtKind::Assign { target: Target::Name(name), .. }
            | StmtKind::AugAssign { name, .. }
            | StmtKind::Def { name, .. } => bind(name, names),
            StmtKind::If { branches, orelse } => {
                for (_, _, branch) in branches {
                    collect_assigned(branch, names);
                }
                collect_assigned(orelse, names);
            }
            StmtKind::While { body, .. } => collect_assigned(body, names),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdb_common::{decode_all, disassemble};

    fn opcodes(code: &Code) -> Vec<Opcode> {
        decode_all(&code.descriptor.instructions).unwrap().into_iter().map(|i| i.opcode).collect()
    }

    #[test]
    fn test_two_line_program() {
        let code = compile("/tmp/prog.pyl", "x = 1\nprint(x)\n").unwrap();
        let descriptor = &code.descriptor;

        assert_eq!(
            opcodes(&code),
            vec![
                Opcode::LOAD_CONST,
                Opcode::STORE_NAME,
                Opcode::LOAD_NAME,
                Opcode::LOAD_NAME,
                Opcode::CALL_FUNCTION,
                Opcode::POP_TOP,
                Opcode::LOAD_CONST,
                Opcode::RETURN_VALUE,
            ]
        );
        assert_eq!(descriptor.names, vec!["x", "print"]);
        assert_eq!(descriptor.constants, vec!["1", "None"]);
        assert_eq!(
            descriptor.line_table,
            vec![
                LineRange { start: 0, end: 4, line: Some(1) },
                LineRange { start: 4, end: 12, line: Some(2) },
                LineRange { start: 12, end: 16, line: None },
            ]
        );
        assert!(descriptor.line_table_is_partition());
        assert!(code.is_module());
    }

    #[test]
    fn test_function_locals_and_globals() {
        let source = "\
def f(a):
    b = a + g
    return b
";
        let module = compile("/tmp/prog.pyl", source).unwrap();
        let Constant::Code(f) = &module.constants[0] else { panic!("expected code constant") };

        assert_eq!(f.name(), "f");
        assert_eq!(f.arg_count, 1);
        assert_eq!(f.descriptor.local_names, vec!["a", "b"]);
        assert_eq!(f.descriptor.names, vec!["g"]);
        assert_eq!(module.descriptor.constants[0], "<code object f>");
        assert!(opcodes(f).contains(&Opcode::LOAD_GLOBAL));
        assert!(opcodes(f).contains(&Opcode::LOAD_FAST));
        assert!(f.descriptor.line_table_is_partition());
    }

    #[test]
    fn test_loop_back_edge_is_synthetic() {
        let code = compile("/tmp/prog.pyl", "i = 0\nwhile i < 3:\n    i += 1\n").unwrap();
        let listing = disassemble(&code.descriptor).unwrap();
        let back_edge = listing
            .instructions
            .iter()
            .find(|inst| inst.instruction.opcode == Opcode::JUMP_ABSOLUTE)
            .unwrap();
        assert_eq!(back_edge.line, None);
        assert_eq!(back_edge.instruction.arg as usize, code.descriptor.first_offset_of_line(2).unwrap());
    }

    #[test]
    fn test_wide_jumps_get_prefixes() {
        let mut source = String::from("x = 0\nif x:\n");
        for i in 0..200 {
            source.push_str(&format!("    x = x + {i}\n"));
        }
        source.push_str("y = 1\n");
        let code = compile("/tmp/prog.pyl", &source).unwrap();
        let instructions = decode_all(&code.descriptor.instructions).unwrap();
        let jump = instructions.iter().find(|i| i.opcode == Opcode::POP_JUMP_IF_FALSE).unwrap();

        assert!(jump.arg > 0xff);
        assert_eq!(jump.size, 4);
        assert_eq!(
            code.descriptor.line_for_offset(jump.arg as usize),
            Some(203),
            "jump must land on the first instruction after the block"
        );
        assert!(code.descriptor.line_table_is_partition());
    }

    #[test]
    fn test_compile_errors() {
        assert!(compile("p", "return 1\n").is_err());
        assert!(compile("p", "break\n").is_err());
        assert!(compile("p", "def f():\n    continue\n").is_err());
    }
}
