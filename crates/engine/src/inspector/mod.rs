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

//! Execution hook: the seam between the interpreter and the recorder, the player
//! and the tracer
//!
//! The interpreter reports [`Event`]s at instruction boundaries of traced frames
//! and asks [`Inspector::intercept_call`] before each call from a traced frame.

mod record_inspector;
mod replay_inspector;
mod step_inspector;

pub use record_inspector::*;
pub use replay_inspector::*;
pub use step_inspector::*;

use rdb_common::DecodeError;
use thiserror::Error;

pub use crate::vm::FrameView;
use crate::{record_log::RecordLogError, vm::Value};

/// What happened at an instruction boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Event {
    /// A new frame begins
    #[display("call")]
    Call,
    /// Control arrived on a new source line
    #[display("line")]
    Line,
    /// Control reached an instruction boundary
    #[display("opcode")]
    Opcode,
}

/// What the interpreter should do after a hook callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceControl {
    /// Keep tracing
    Continue,
    /// Stop tracing this frame and everything it calls
    Detach,
    /// Pause before the current instruction executes
    Suspend,
}

/// Failure inside a hook; it ends the run
#[derive(Debug, Error)]
pub enum HookError {
    /// Reading or writing the record log failed
    #[error(transparent)]
    RecordLog(#[from] RecordLogError),

    /// The current instruction could not be decoded
    #[error("cannot decode current instruction: {0}")]
    Decode(#[from] DecodeError),

    /// The hook found the frame in a state it cannot handle
    #[error("{0}")]
    Other(String),
}

/// Receives execution events from the interpreter
pub trait Inspector {
    /// Called on every event of a traced frame
    fn trace(&mut self, frame: &mut FrameView<'_>, event: Event) -> Result<TraceControl, HookError>;

    /// Called before a traced frame invokes `callee` with `argc` arguments.
    ///
    /// Returning a value skips the call and uses the value as its result.
    fn intercept_call(
        &mut self,
        _frame: &FrameView<'_>,
        _callee: &Value,
        _argc: usize,
    ) -> Result<Option<Value>, HookError> {
        Ok(None)
    }
}

/// Hook that detaches from everything; used for plain runs
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInspector;

impl Inspector for NoopInspector {
    fn trace(&mut self, _frame: &mut FrameView<'_>, _event: Event) -> Result<TraceControl, HookError> {
        Ok(TraceControl::Detach)
    }
}

/// Whether calling `callee` leaves the traced source unit.
///
/// Builtins, host functions and functions defined in another file are external;
/// their results are what gets recorded and replayed.
pub fn is_external_call(callee: &Value, traced_file: &str) -> bool {
    match callee {
        Value::Function(func) => func.filename() != traced_file,
        _ => true,
    }
}

/// Log one hook event at trace level
pub(crate) fn trace_event(frame: &FrameView<'_>, event: Event) {
    tracing::trace!(
        %event,
        unit = frame.descriptor().name.as_str(),
        offset = frame.instruction_offset(),
        line = ?frame.line(),
        "hook event"
    );
}
