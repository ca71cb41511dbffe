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

//! Resumable bytecode interpreter
//!
//! [`Vm::resume`] runs until the program finishes, fails, or the execution hook
//! asks to suspend. Suspension happens at an instruction boundary before the
//! instruction executes; resuming continues from that boundary without
//! re-delivering the events already delivered there.
//!
//! Per instruction, hook events are delivered in a fixed order:
//! `Call` (first instruction of a new frame), `Line` (arrival on a new source
//! line or a backward jump), `Opcode` (when the frame asked for it). Frames the
//! hook detached from, and everything they call, produce no events.

pub mod builtins;
mod error;
mod frame;
mod ops;
pub mod value;

use std::rc::Rc;

pub use error::*;
pub use frame::FrameView;
pub use value::{Function, NativeFunction, Opaque, Value};

use frame::{Frame, Stage};
use rdb_common::{decode_at, CompareOp, Opcode};
use tracing::{debug, trace};

use crate::{
    compiler::Code,
    context::ExecutionContext,
    inspector::{Event, Inspector, NoopInspector, TraceControl},
};

/// Maximum depth of nested calls
pub const RECURSION_LIMIT: usize = 1000;

/// How a call to [`Vm::resume`] ended
#[derive(Debug, Clone)]
pub enum Exit {
    /// The hook asked to pause; call `resume` again to continue
    Suspended,
    /// The module body returned
    Finished(Value),
}

/// Interpreter for one run of a program
#[derive(Debug)]
pub struct Vm {
    frames: Vec<Frame>,
    ctx: ExecutionContext,
    result: Option<Value>,
    failed: bool,
}

impl Vm {
    /// Prepare to run the module `code` in `ctx`
    pub fn new(code: Rc<Code>, ctx: ExecutionContext) -> Self {
        Self { frames: vec![Frame::new(code, Vec::new(), true)], ctx, result: None, failed: false }
    }

    /// The execution context of this run
    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Mutable access to the execution context
    pub fn context_mut(&mut self) -> &mut ExecutionContext {
        &mut self.ctx
    }

    /// Whether the program has returned or failed
    pub fn is_finished(&self) -> bool {
        self.result.is_some() || self.failed
    }

    /// Current call depth
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Run to completion without a hook
    pub fn run(&mut self) -> Result<Value, VmError> {
        match self.resume(&mut NoopInspector)? {
            Exit::Finished(value) => Ok(value),
            Exit::Suspended => Err(VmError::Internal("untraced run suspended".to_string())),
        }
    }

    /// Run until the program ends or `inspector` suspends it
    pub fn resume<I: Inspector + ?Sized>(&mut self, inspector: &mut I) -> Result<Exit, VmError> {
        if let Some(value) = &self.result {
            return Ok(Exit::Finished(value.clone()));
        }
        if self.failed {
            return Err(VmError::Internal("execution already ended with an error".to_string()));
        }

        loop {
            if deliver_events(&mut self.frames, &self.ctx, inspector)? {
                return Ok(Exit::Suspended);
            }
            match self.execute(inspector) {
                Ok(Some(value)) => {
                    debug!(result = %value.repr(), "program finished");
                    self.result = Some(value.clone());
                    return Ok(Exit::Finished(value));
                }
                Ok(None) => {}
                Err(err) => {
                    self.failed = true;
                    self.frames.clear();
                    return Err(err);
                }
            }
        }
    }

    /// Execute the instruction at the top frame's `ip`
    fn execute<I: Inspector + ?Sized>(&mut self, inspector: &mut I) -> Result<Option<Value>, VmError> {
        let line = self.top()?.line();
        self.step(inspector).map_err(|err| match err {
            VmError::Runtime(err) => VmError::Runtime(err.at_line(line)),
            other => other,
        })
    }

    fn top(&self) -> Result<&Frame, VmError> {
        self.frames.last().ok_or_else(|| VmError::Internal("no frame to execute".to_string()))
    }

    fn top_mut(&mut self) -> Result<&mut Frame, VmError> {
        self.frames.last_mut().ok_or_else(|| VmError::Internal("no frame to execute".to_string()))
    }

    fn pop(&mut self) -> Result<Value, VmError> {
        self.top_mut()?.stack.pop().ok_or_else(|| VmError::Internal("operand stack underflow".to_string()))
    }

    fn push(&mut self, value: Value) -> Result<(), VmError> {
        self.top_mut()?.stack.push(value);
        Ok(())
    }

    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, VmError> {
        let stack = &mut self.top_mut()?.stack;
        let at = stack
            .len()
            .checked_sub(n)
            .ok_or_else(|| VmError::Internal("operand stack underflow".to_string()))?;
        Ok(stack.split_off(at))
    }

    fn step<I: Inspector + ?Sized>(&mut self, inspector: &mut I) -> Result<Option<Value>, VmError> {
        let frame = self.top_mut()?;
        let code = frame.code.clone();
        let instruction = decode_at(&code.descriptor.instructions, frame.ip)?;
        frame.last_offset = Some(frame.ip);
        frame.ip = instruction.next_offset();
        frame.stage = Stage::Line;
        let arg = instruction.arg as usize;

        match instruction.opcode {
            Opcode::NOP => {}
            Opcode::POP_TOP => {
                self.pop()?;
            }
            Opcode::UNARY_NEGATIVE => {
                let value = self.pop()?;
                self.push(ops::negate(&value)?)?;
            }
            Opcode::UNARY_NOT => {
                let value = self.pop()?;
                self.push(Value::Bool(!value.is_truthy()))?;
            }
            Opcode::BINARY_ADD
            | Opcode::BINARY_SUBTRACT
            | Opcode::BINARY_MULTIPLY
            | Opcode::BINARY_TRUE_DIVIDE
            | Opcode::BINARY_FLOOR_DIVIDE
            | Opcode::BINARY_MODULO => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.push(ops::binary(instruction.opcode, &left, &right)?)?;
            }
            Opcode::BINARY_SUBSCR => {
                let index = self.pop()?;
                let object = self.pop()?;
                self.push(ops::subscript(&object, &index)?)?;
            }
            Opcode::STORE_SUBSCR => {
                let index = self.pop()?;
                let object = self.pop()?;
                let value = self.pop()?;
                ops::store_subscript(&object, &index, value)?;
            }
            Opcode::COMPARE_OP => {
                let op = CompareOp::from_arg(instruction.arg)
                    .ok_or_else(|| VmError::Internal(format!("bad comparison operand {arg}")))?;
                let right = self.pop()?;
                let left = self.pop()?;
                self.push(ops::compare(op, &left, &right)?)?;
            }
            Opcode::LOAD_CONST => {
                let constant = code
                    .constants
                    .get(arg)
                    .ok_or_else(|| VmError::Internal(format!("constant {arg} out of range")))?;
                self.push(Value::from_constant(constant))?;
            }
            Opcode::LOAD_NAME | Opcode::LOAD_GLOBAL => {
                let name = operand_name(&code, arg)?;
                let value = self.ctx.lookup_global(name).ok_or_else(|| {
                    RuntimeError::new(ErrorKind::NameError, format!("name '{name}' is not defined"))
                })?;
                self.push(value)?;
            }
            Opcode::STORE_NAME => {
                let name = operand_name(&code, arg)?.to_string();
                let value = self.pop()?;
                self.ctx.globals.insert(name, value);
            }
            Opcode::LOAD_FAST => {
                let frame = self.top_mut()?;
                let value = frame.locals.get(arg).cloned().flatten().ok_or_else(|| {
                    let name = code.descriptor.local_names.get(arg).map(String::as_str).unwrap_or("?");
                    RuntimeError::new(
                        ErrorKind::NameError,
                        format!("local variable '{name}' referenced before assignment"),
                    )
                })?;
                frame.stack.push(value);
            }
            Opcode::STORE_FAST => {
                let value = self.pop()?;
                let slot = self
                    .top_mut()?
                    .locals
                    .get_mut(arg)
                    .ok_or_else(|| VmError::Internal(format!("local slot {arg} out of range")))?;
                *slot = Some(value);
            }
            Opcode::BUILD_LIST => {
                let items = self.pop_n(arg)?;
                self.push(items.into())?;
            }
            Opcode::JUMP_ABSOLUTE => self.top_mut()?.ip = arg,
            Opcode::POP_JUMP_IF_FALSE | Opcode::POP_JUMP_IF_TRUE => {
                let value = self.pop()?;
                if value.is_truthy() == (instruction.opcode == Opcode::POP_JUMP_IF_TRUE) {
                    self.top_mut()?.ip = arg;
                }
            }
            Opcode::JUMP_IF_FALSE_OR_POP | Opcode::JUMP_IF_TRUE_OR_POP => {
                let frame = self.top_mut()?;
                let truthy = frame
                    .stack
                    .last()
                    .map(Value::is_truthy)
                    .ok_or_else(|| VmError::Internal("operand stack underflow".to_string()))?;
                if truthy == (instruction.opcode == Opcode::JUMP_IF_TRUE_OR_POP) {
                    frame.ip = arg;
                } else {
                    frame.stack.pop();
                }
            }
            Opcode::MAKE_FUNCTION => {
                let Value::Code(body) = self.pop()? else {
                    return Err(VmError::Internal("MAKE_FUNCTION without code object".to_string()));
                };
                self.push(Value::Function(Rc::new(Function { code: body })))?;
            }
            Opcode::CALL_FUNCTION => self.call(inspector, arg)?,
            Opcode::RETURN_VALUE => {
                let value = self.pop()?;
                self.frames.pop();
                match self.frames.last_mut() {
                    Some(caller) => caller.stack.push(value),
                    None => return Ok(Some(value)),
                }
            }
            Opcode::EXTENDED_ARG => {
                return Err(VmError::Internal("dangling EXTENDED_ARG".to_string()));
            }
        }
        Ok(None)
    }

    fn call<I: Inspector + ?Sized>(&mut self, inspector: &mut I, argc: usize) -> Result<(), VmError> {
        let Some(frame) = self.frames.last_mut() else {
            return Err(VmError::Internal("no frame to execute".to_string()));
        };
        let callee = frame
            .stack
            .len()
            .checked_sub(argc + 1)
            .map(|idx| frame.stack[idx].clone())
            .ok_or_else(|| VmError::Internal("operand stack underflow".to_string()))?;
        let traced = frame.traced;

        if traced {
            // the view must show the boundary of the call, not the one after it
            let next = frame.ip;
            frame.ip = frame.last_offset.unwrap_or(next);
            let stub = inspector.intercept_call(&FrameView::new(frame, &self.ctx.globals), &callee, argc);
            frame.ip = next;
            if let Some(value) = stub? {
                trace!(callee = %callee.repr(), result = %value.repr(), "call stubbed");
                self.pop_n(argc + 1)?;
                return self.push(value);
            }
        }

        let args = self.pop_n(argc)?;
        self.pop()?;
        match callee {
            Value::Function(func) => {
                let expected = func.code.arg_count;
                if args.len() != expected {
                    return Err(RuntimeError::type_error(format!(
                        "{}() takes {expected} positional arguments but {} were given",
                        func.name(),
                        args.len()
                    ))
                    .into());
                }
                if self.frames.len() >= RECURSION_LIMIT {
                    return Err(RuntimeError::new(
                        ErrorKind::RecursionError,
                        "maximum recursion depth exceeded",
                    )
                    .into());
                }
                self.frames.push(Frame::new(func.code.clone(), args, traced));
            }
            Value::Builtin(native) => {
                let result = (native.func)(&mut self.ctx.host, args)?;
                self.push(result)?;
            }
            other => {
                return Err(RuntimeError::type_error(format!(
                    "'{}' object is not callable",
                    other.type_name()
                ))
                .into());
            }
        }
        Ok(())
    }
}

fn operand_name(code: &Code, idx: usize) -> Result<&str, VmError> {
    code.descriptor
        .names
        .get(idx)
        .map(String::as_str)
        .ok_or_else(|| VmError::Internal(format!("name {idx} out of range")))
}

/// Deliver the pending events of the top frame's current boundary.
///
/// Returns `true` when the hook asked to suspend.
fn deliver_events<I: Inspector + ?Sized>(
    frames: &mut [Frame],
    ctx: &ExecutionContext,
    inspector: &mut I,
) -> Result<bool, VmError> {
    let Some(frame) = frames.last_mut() else {
        return Err(VmError::Internal("no frame to execute".to_string()));
    };

    while frame.stage != Stage::Execute {
        let event = match frame.stage {
            Stage::Call => {
                frame.stage = Stage::Line;
                Event::Call
            }
            Stage::Line => {
                frame.stage = Stage::Opcode;
                if !frame.starts_line() {
                    continue;
                }
                Event::Line
            }
            Stage::Opcode => {
                frame.stage = Stage::Execute;
                if !frame.trace_opcodes {
                    continue;
                }
                Event::Opcode
            }
            Stage::Execute => break,
        };
        if !frame.traced {
            continue;
        }

        let control = inspector.trace(&mut FrameView::new(frame, &ctx.globals), event)?;
        match control {
            TraceControl::Continue => {}
            TraceControl::Detach => {
                frame.traced = false;
                frame.trace_opcodes = false;
            }
            TraceControl::Suspend => return Ok(true),
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, io::Write};

    use super::*;
    use crate::compiler::compile;

    /// Output sink shared with the test
    #[derive(Clone, Default)]
    struct Captured(Rc<RefCell<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn run(source: &str) -> (Result<Value, VmError>, String) {
        let out = Captured::default();
        let code = compile("/tmp/prog.pyl", source).unwrap();
        let ctx = ExecutionContext::new("/tmp/prog.pyl").with_output(out.clone());
        let result = Vm::new(code, ctx).run();
        let text = String::from_utf8(out.0.borrow().clone()).unwrap();
        (result, text)
    }

    #[test]
    fn test_arithmetic_and_print() {
        let (result, out) = run("x = 2\ny = x * 3 + 1\nprint(x, y, y / 2, 'done')\n");
        assert!(result.is_ok());
        assert_eq!(out, "2 7 3.5 done\n");
    }

    #[test]
    fn test_functions_and_recursion() {
        let source = "\
def fact(n):
    if n <= 1:
        return 1
    return n * fact(n - 1)

print(fact(10))
";
        let (result, out) = run(source);
        assert!(result.is_ok());
        assert_eq!(out, "3628800\n");
    }

    #[test]
    fn test_loops_and_lists() {
        let source = "\
xs = []
i = 0
while True:
    i += 1
    if i % 2 == 0:
        continue
    if i > 7:
        break
    xs = xs + [i]
xs[0] = 'one'
print(xs, len(xs))
";
        let (result, out) = run(source);
        assert!(result.is_ok());
        assert_eq!(out, "['one', 3, 5, 7] 4\n");
    }

    #[test]
    fn test_short_circuit() {
        let (_, out) = run("print(0 or 'a', 1 and 2, None and x, not [])\n");
        assert_eq!(out, "a 2 None True\n");
    }

    #[test]
    fn test_runtime_errors_carry_line() {
        let (result, out) = run("print('before')\nx = 1 // 0\n");
        assert_eq!(out, "before\n");
        let Err(VmError::Runtime(err)) = result else { panic!("expected runtime error") };
        assert_eq!(err.kind, ErrorKind::ZeroDivisionError);
        assert_eq!(err.line, Some(2));
        assert_eq!(err.to_string(), "line 2: ZeroDivisionError: integer division or modulo by zero");

        let (result, _) = run("y = undefined_name\n");
        assert!(matches!(result, Err(VmError::Runtime(RuntimeError { kind: ErrorKind::NameError, .. }))));
    }

    #[test]
    fn test_recursion_limit() {
        let (result, _) = run("def f(n):\n    return f(n + 1)\nf(0)\n");
        let Err(VmError::Runtime(err)) = result else { panic!("expected runtime error") };
        assert_eq!(err.kind, ErrorKind::RecursionError);
    }

    #[test]
    fn test_module_return_value_is_none() {
        let (result, _) = run("x = 1\n");
        assert!(matches!(result, Ok(Value::None)));
    }
}
