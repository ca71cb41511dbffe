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

//! Instruction set and decoding utilities
//!
//! Code is stored as wordcode: every instruction is an `(opcode, operand)` byte
//! pair. Operands wider than eight bits are carried by one or more `EXTENDED_ARG`
//! prefixes, each contributing the next higher byte of the operand. Decoding an
//! instruction at an offset that starts with prefixes yields a single
//! [`Instruction`] covering the prefixes and the real opcode.
//!
//! The recorder, the VM and the front ends all go through [`decode_at`], so the
//! notion of "the instruction at this offset" is the same everywhere.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::CodeDescriptor;

/// Maximum number of `EXTENDED_ARG` prefixes in front of one instruction
pub const MAX_EXTENDED_ARGS: usize = 3;

macro_rules! opcodes {
    ($($(#[$doc:meta])* $name:ident = $value:literal,)*) => {
        /// Instruction opcodes understood by the VM
        #[allow(non_camel_case_types, clippy::upper_case_acronyms)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum Opcode {
            $($(#[$doc])* $name = $value,)*
        }

        impl Opcode {
            /// Mnemonic of the opcode
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name),)*
                }
            }

            /// All opcodes, in numeric order
            pub const ALL: &'static [Opcode] = &[$(Self::$name,)*];
        }

        impl TryFrom<u8> for Opcode {
            type Error = DecodeError;

            fn try_from(byte: u8) -> Result<Self, Self::Error> {
                match byte {
                    $($value => Ok(Self::$name),)*
                    other => Err(DecodeError::UnknownOpcode(other)),
                }
            }
        }
    };
}

opcodes! {
    /// Discard the top of stack
    POP_TOP = 1,
    /// Do nothing
    NOP = 9,
    /// Negate the top of stack
    UNARY_NEGATIVE = 11,
    /// Logical not of the top of stack
    UNARY_NOT = 12,
    /// `a * b`
    BINARY_MULTIPLY = 20,
    /// `a % b`
    BINARY_MODULO = 22,
    /// `a + b`
    BINARY_ADD = 23,
    /// `a - b`
    BINARY_SUBTRACT = 24,
    /// `a[b]`
    BINARY_SUBSCR = 25,
    /// `a // b`
    BINARY_FLOOR_DIVIDE = 26,
    /// `a / b`
    BINARY_TRUE_DIVIDE = 27,
    /// `obj[idx] = value` with stack `[value, obj, idx]`
    STORE_SUBSCR = 60,
    /// Return the top of stack to the caller
    RETURN_VALUE = 83,
    /// Bind the top of stack to `names[arg]` in the global namespace
    STORE_NAME = 90,
    /// Push `constants[arg]`
    LOAD_CONST = 100,
    /// Push the global or builtin `names[arg]`
    LOAD_NAME = 101,
    /// Build a list from the top `arg` values
    BUILD_LIST = 103,
    /// Compare the two top values with the operator numbered `arg`
    COMPARE_OP = 107,
    /// Jump to `arg` if the top is falsy, otherwise pop it
    JUMP_IF_FALSE_OR_POP = 111,
    /// Jump to `arg` if the top is truthy, otherwise pop it
    JUMP_IF_TRUE_OR_POP = 112,
    /// Jump to `arg`
    JUMP_ABSOLUTE = 113,
    /// Pop the top and jump to `arg` if it is falsy
    POP_JUMP_IF_FALSE = 114,
    /// Pop the top and jump to `arg` if it is truthy
    POP_JUMP_IF_TRUE = 115,
    /// Push the global or builtin `names[arg]` from inside a function
    LOAD_GLOBAL = 116,
    /// Push local slot `arg`
    LOAD_FAST = 124,
    /// Store the top of stack into local slot `arg`
    STORE_FAST = 125,
    /// Call with `arg` positional arguments; the callable sits below them
    CALL_FUNCTION = 131,
    /// Turn the code constant on top of stack into a function
    MAKE_FUNCTION = 132,
    /// Operand prefix carrying the next higher operand byte
    EXTENDED_ARG = 144,
}

impl Opcode {
    /// Whether this opcode invokes a callable
    pub fn is_call(&self) -> bool {
        matches!(self, Self::CALL_FUNCTION)
    }

    /// Whether the operand of this opcode is an absolute jump target
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            Self::JUMP_ABSOLUTE
                | Self::POP_JUMP_IF_FALSE
                | Self::POP_JUMP_IF_TRUE
                | Self::JUMP_IF_FALSE_OR_POP
                | Self::JUMP_IF_TRUE_OR_POP
        )
    }

    /// Look an opcode up by mnemonic
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Comparison operators carried by `COMPARE_OP`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `<`
    Lt = 0,
    /// `<=`
    Le = 1,
    /// `==`
    Eq = 2,
    /// `!=`
    Ne = 3,
    /// `>`
    Gt = 4,
    /// `>=`
    Ge = 5,
}

impl CompareOp {
    /// Operator for a `COMPARE_OP` operand
    pub fn from_arg(arg: u32) -> Option<Self> {
        Some(match arg {
            0 => Self::Lt,
            1 => Self::Le,
            2 => Self::Eq,
            3 => Self::Ne,
            4 => Self::Gt,
            5 => Self::Ge,
            _ => return None,
        })
    }

    /// Source form of the operator
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Errors raised while decoding wordcode
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The byte is not a known opcode
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),

    /// The offset is not an instruction boundary inside the stream
    #[error("offset {offset} is not an instruction boundary (code size {size})")]
    BadOffset {
        /// Requested offset
        offset: usize,
        /// Size of the instruction stream
        size: usize,
    },

    /// The stream ends inside an instruction or its prefixes
    #[error("instruction at offset {0} is truncated")]
    Truncated(usize),

    /// More prefixes than any operand can need
    #[error("too many EXTENDED_ARG prefixes at offset {0}")]
    TooManyPrefixes(usize),
}

/// A decoded instruction, prefixes included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Offset of the first byte, which is the first prefix if there are any
    pub offset: usize,
    /// The real opcode
    pub opcode: Opcode,
    /// Full operand with prefixes applied
    pub arg: u32,
    /// Size in bytes, prefixes included
    pub size: usize,
}

impl Instruction {
    /// Offset of the instruction that follows this one
    pub fn next_offset(&self) -> usize {
        self.offset + self.size
    }

    /// Argument count when this is a call instruction
    pub fn call_argc(&self) -> Option<usize> {
        self.opcode.is_call().then_some(self.arg as usize)
    }
}

/// Decode the instruction starting at `offset`
pub fn decode_at(code: &[u8], offset: usize) -> Result<Instruction, DecodeError> {
    if offset % 2 != 0 || offset >= code.len() {
        return Err(DecodeError::BadOffset { offset, size: code.len() });
    }

    let mut arg: u32 = 0;
    let mut pos = offset;
    let mut prefixes = 0;
    loop {
        let (&op, &operand) = match (code.get(pos), code.get(pos + 1)) {
            (Some(op), Some(operand)) => (op, operand),
            _ => return Err(DecodeError::Truncated(offset)),
        };
        arg |= u32::from(operand);

        if op == Opcode::EXTENDED_ARG as u8 {
            prefixes += 1;
            if prefixes > MAX_EXTENDED_ARGS {
                return Err(DecodeError::TooManyPrefixes(offset));
            }
            arg <<= 8;
            pos += 2;
            continue;
        }

        let opcode = Opcode::try_from(op)?;
        return Ok(Instruction { offset, opcode, arg, size: pos + 2 - offset });
    }
}

/// Decode every instruction of a stream in order
pub fn decode_all(code: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < code.len() {
        let instruction = decode_at(code, offset)?;
        offset = instruction.next_offset();
        out.push(instruction);
    }
    Ok(out)
}

/// Number of bytes needed to encode an instruction with operand `arg`
pub fn encoded_size(arg: u32) -> usize {
    match arg {
        0..=0xff => 2,
        0x100..=0xffff => 4,
        0x1_0000..=0xff_ffff => 6,
        _ => 8,
    }
}

/// Append the wordcode for `opcode arg`, prefixes included
pub fn encode_instruction(out: &mut Vec<u8>, opcode: Opcode, arg: u32) {
    let size = encoded_size(arg);
    for shift in (1..size / 2).rev() {
        out.push(Opcode::EXTENDED_ARG as u8);
        out.push((arg >> (8 * shift)) as u8);
    }
    out.push(opcode as u8);
    out.push(arg as u8);
}

/// A single disassembled instruction with the operand resolved for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisassemblyInstruction {
    /// The decoded instruction
    pub instruction: Instruction,
    /// Source line of the instruction, `None` in synthetic regions
    pub line: Option<u32>,
    /// Whether this instruction is the first one of its line range
    pub starts_line: bool,
    /// Operand rendered against the descriptor tables, if it refers to one
    pub argument: Option<String>,
}

impl DisassemblyInstruction {
    /// Offset of the instruction
    pub fn offset(&self) -> usize {
        self.instruction.offset
    }

    /// One-line rendering: `offset OPNAME arg (argument)`
    pub fn render(&self) -> String {
        let Instruction { offset, opcode, arg, .. } = self.instruction;
        match &self.argument {
            Some(argument) => format!("{offset:>4} {:<20} {arg} ({argument})", opcode.name()),
            None => format!("{offset:>4} {:<20} {arg}", opcode.name()),
        }
    }
}

/// Complete disassembly of one code unit
#[derive(Debug, Clone)]
pub struct DisassemblyResult {
    /// Name of the unit that was disassembled
    pub unit_name: String,
    /// Instructions in offset order
    pub instructions: Vec<DisassemblyInstruction>,
}

impl DisassemblyResult {
    /// Get the total number of instructions
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Index of the instruction starting at `offset`
    pub fn position_of(&self, offset: usize) -> Option<usize> {
        self.instructions.iter().position(|inst| inst.offset() == offset)
    }

    /// Get instruction starting at a specific offset
    pub fn get_instruction_at(&self, offset: usize) -> Option<&DisassemblyInstruction> {
        self.position_of(offset).map(|idx| &self.instructions[idx])
    }

    /// Render the whole unit, one instruction per line, marking `current` with `-->`
    pub fn render(&self, current: Option<usize>) -> String {
        self.instructions
            .iter()
            .map(|inst| {
                let marker = if Some(inst.offset()) == current { "-->" } else { "   " };
                let line = match (inst.starts_line, inst.line) {
                    (true, Some(line)) => format!("{line:>4}"),
                    _ => "    ".to_string(),
                };
                format!("{line} {marker} {}", inst.render())
            })
            .join("\n")
    }
}

fn describe_argument(code: &CodeDescriptor, instruction: &Instruction) -> Option<String> {
    let index = instruction.arg as usize;
    match instruction.opcode {
        Opcode::LOAD_CONST => code.constants.get(index).cloned(),
        Opcode::LOAD_NAME | Opcode::STORE_NAME | Opcode::LOAD_GLOBAL => {
            code.names.get(index).cloned()
        }
        Opcode::LOAD_FAST | Opcode::STORE_FAST => code.local_names.get(index).cloned(),
        Opcode::COMPARE_OP => CompareOp::from_arg(instruction.arg).map(|op| op.symbol().into()),
        op if op.is_jump() => Some(format!("to {}", instruction.arg)),
        _ => None,
    }
}

/// Disassemble a code unit into a structured representation
///
/// # Examples
/// ```rust
/// use rdb_common::{disassemble, types::{CodeDescriptor, LineRange}, Opcode};
///
/// let code = CodeDescriptor {
///     filename: "prog.pyl".into(),
///     name: "<module>".into(),
///     instructions: vec![Opcode::LOAD_CONST as u8, 0, Opcode::RETURN_VALUE as u8, 0],
///     constants: vec!["None".into()],
///     names: vec![],
///     local_names: vec![],
///     line_table: vec![LineRange { start: 0, end: 4, line: None }],
/// };
/// let result = disassemble(&code).unwrap();
/// assert_eq!(result.instruction_count(), 2);
/// assert_eq!(result.instructions[0].argument.as_deref(), Some("None"));
/// ```
pub fn disassemble(code: &CodeDescriptor) -> Result<DisassemblyResult, DecodeError> {
    let mut previous_line = None;
    let instructions = decode_all(&code.instructions)?
        .into_iter()
        .map(|instruction| {
            let line = code.line_for_offset(instruction.offset);
            let starts_line = line.is_some() && line != previous_line;
            previous_line = line;
            let argument = describe_argument(code, &instruction);
            DisassemblyInstruction { instruction, line, starts_line, argument }
        })
        .collect();

    Ok(DisassemblyResult { unit_name: code.name.clone(), instructions })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_table_is_consistent() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::try_from(*op as u8), Ok(*op));
            assert_eq!(Opcode::from_name(op.name()), Some(*op));
        }
        assert_eq!(Opcode::try_from(0), Err(DecodeError::UnknownOpcode(0)));
        assert!(Opcode::CALL_FUNCTION.is_call());
        assert!(!Opcode::LOAD_NAME.is_call());
        assert!(Opcode::POP_JUMP_IF_FALSE.is_jump());
    }

    #[test]
    fn test_extended_arg_decoding() {
        let mut code = Vec::new();
        encode_instruction(&mut code, Opcode::LOAD_CONST, 3);
        encode_instruction(&mut code, Opcode::JUMP_ABSOLUTE, 0x1234);
        encode_instruction(&mut code, Opcode::CALL_FUNCTION, 0x01_0203);
        assert_eq!(code.len(), 2 + 4 + 6);

        let decoded = decode_all(&code).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0], Instruction { offset: 0, opcode: Opcode::LOAD_CONST, arg: 3, size: 2 });
        assert_eq!(decoded[1].offset, 2);
        assert_eq!(decoded[1].arg, 0x1234);
        assert_eq!(decoded[1].size, 4);
        assert_eq!(decoded[2].call_argc(), Some(0x01_0203));
        assert_eq!(decoded[2].next_offset(), code.len());
    }

    #[test]
    fn test_decode_errors() {
        let code = [Opcode::EXTENDED_ARG as u8, 1];
        assert_eq!(decode_at(&code, 0), Err(DecodeError::Truncated(0)));
        assert!(matches!(decode_at(&code, 1), Err(DecodeError::BadOffset { .. })));
        assert!(matches!(decode_at(&code, 2), Err(DecodeError::BadOffset { .. })));

        let prefixes = [144, 0, 144, 0, 144, 0, 144, 0, 100, 0];
        assert_eq!(decode_at(&prefixes, 0), Err(DecodeError::TooManyPrefixes(0)));
    }

    #[test]
    fn test_disassembly_marks_current_offset() {
        let code = CodeDescriptor {
            filename: "prog.pyl".into(),
            name: "<module>".into(),
            instructions: vec![100, 0, 90, 0, 101, 1, 100, 1, 83, 0],
            constants: vec!["1".into(), "None".into()],
            names: vec!["x".into(), "print".into()],
            local_names: vec![],
            line_table: vec![
                crate::types::LineRange { start: 0, end: 4, line: Some(1) },
                crate::types::LineRange { start: 4, end: 6, line: Some(2) },
                crate::types::LineRange { start: 6, end: 10, line: None },
            ],
        };

        let result = disassemble(&code).unwrap();
        assert_eq!(result.instruction_count(), 5);
        assert!(result.instructions[0].starts_line);
        assert!(!result.instructions[1].starts_line);
        assert_eq!(result.instructions[2].argument.as_deref(), Some("print"));
        assert_eq!(result.position_of(4), Some(2));

        let text = result.render(Some(4));
        let marked: Vec<_> = text.lines().filter(|l| l.contains("-->")).collect();
        assert_eq!(marked.len(), 1);
        assert!(marked[0].contains("LOAD_NAME"));
        assert!(marked[0].starts_with("   2"));
    }
}
