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

//! Interpreter frames and the view the execution hook gets of them

use std::rc::Rc;

use rdb_common::{
    decode_at,
    types::{Bindings, CodeDescriptor, FrameSnapshot},
    DecodeError, Instruction,
};

use super::Value;
use crate::{compiler::Code, context::Globals};

/// Which hook event an instruction boundary is waiting to deliver next
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Stage {
    Call,
    Line,
    Opcode,
    Execute,
}

/// One activation of a code unit
#[derive(Debug)]
pub(crate) struct Frame {
    pub(crate) code: Rc<Code>,
    /// Offset of the next instruction
    pub(crate) ip: usize,
    pub(crate) stack: Vec<Value>,
    /// Local slots; unused by module frames
    pub(crate) locals: Vec<Option<Value>>,
    /// Whether the hook still sees this frame
    pub(crate) traced: bool,
    pub(crate) trace_opcodes: bool,
    pub(crate) stage: Stage,
    /// Offset of the last instruction executed in this frame
    pub(crate) last_offset: Option<usize>,
}

impl Frame {
    pub(crate) fn new(code: Rc<Code>, args: Vec<Value>, traced: bool) -> Self {
        let mut locals = vec![None; code.descriptor.local_names.len()];
        for (slot, arg) in locals.iter_mut().zip(args) {
            *slot = Some(arg);
        }
        Self {
            code,
            ip: 0,
            stack: Vec::new(),
            locals,
            traced,
            trace_opcodes: false,
            stage: Stage::Call,
            last_offset: None,
        }
    }

    pub(crate) fn line(&self) -> Option<u32> {
        self.code.descriptor.line_for_offset(self.ip)
    }

    /// Whether reaching `ip` counts as arriving on a new line
    pub(crate) fn starts_line(&self) -> bool {
        let descriptor = &self.code.descriptor;
        let Some(line) = descriptor.line_for_offset(self.ip) else { return false };
        match self.last_offset {
            None => true,
            Some(last) => self.ip <= last || descriptor.line_for_offset(last) != Some(line),
        }
    }
}

/// Mutable view of a live frame, handed to the execution hook.
///
/// Only valid for the duration of one hook callback.
#[derive(Debug)]
pub struct FrameView<'a> {
    frame: &'a mut Frame,
    globals: &'a Globals,
}

impl<'a> FrameView<'a> {
    pub(crate) fn new(frame: &'a mut Frame, globals: &'a Globals) -> Self {
        Self { frame, globals }
    }

    /// The executing code unit
    pub fn code(&self) -> &Rc<Code> {
        &self.frame.code
    }

    /// Descriptor of the executing code unit
    pub fn descriptor(&self) -> &CodeDescriptor {
        &self.frame.code.descriptor
    }

    /// Source file of the executing code unit
    pub fn filename(&self) -> &str {
        &self.frame.code.descriptor.filename
    }

    /// Offset of the instruction about to execute
    pub fn instruction_offset(&self) -> usize {
        self.frame.ip
    }

    /// Current source line, `None` in synthetic regions
    pub fn line(&self) -> Option<u32> {
        self.frame.line()
    }

    /// Decode the instruction about to execute
    pub fn decode_current(&self) -> Result<Instruction, DecodeError> {
        decode_at(&self.frame.code.descriptor.instructions, self.frame.ip)
    }

    /// Operand stack entry `depth` places from the top; depth 1 is the top
    pub fn peek(&self, depth: usize) -> Option<&Value> {
        let len = self.frame.stack.len();
        depth.checked_sub(1).and_then(|d| len.checked_sub(d + 1)).map(|idx| &self.frame.stack[idx])
    }

    /// Replace the operand stack entry at `depth`, returning the old value
    pub fn overwrite(&mut self, depth: usize, value: Value) -> Option<Value> {
        let len = self.frame.stack.len();
        let idx = depth.checked_sub(1).and_then(|d| len.checked_sub(d + 1))?;
        Some(std::mem::replace(&mut self.frame.stack[idx], value))
    }

    /// Ask for (or stop) opcode events in this frame
    pub fn set_trace_opcodes(&mut self, enabled: bool) {
        self.frame.trace_opcodes = enabled;
    }

    /// Local bindings as display strings; the global namespace at module level
    pub fn locals(&self) -> Bindings {
        if self.frame.code.is_module() {
            return self.globals();
        }
        self.frame
            .code
            .descriptor
            .local_names
            .iter()
            .zip(&self.frame.locals)
            .filter_map(|(name, value)| value.as_ref().map(|v| (name.clone(), v.repr())))
            .collect()
    }

    /// Global bindings as display strings
    pub fn globals(&self) -> Bindings {
        self.globals.iter().map(|(name, value)| (name.clone(), value.repr())).collect()
    }

    /// Capture the frame's state at this boundary
    pub fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            line: self.line(),
            instruction_offset: self.frame.ip,
            locals: self.locals(),
            globals: self.globals(),
            code: self.frame.code.descriptor.clone(),
        }
    }
}
