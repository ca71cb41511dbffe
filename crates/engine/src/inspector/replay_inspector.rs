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

//! Hook of the replaying run: serves external call results from the record log
//! and suspends at the boundaries the player steps to

use std::{io::BufRead, sync::Arc};

use rdb_common::types::{CodeDescriptor, FrameSnapshot, RecordEntry, StepCommand};
use tracing::trace;

use super::{is_external_call, trace_event, Event, FrameView, HookError, Inspector, TraceControl};
use crate::{record_log::RecordReader, vm::Value};

/// Inspector that replays a record log
#[derive(Debug)]
pub struct ReplayInspector<R: BufRead> {
    reader: RecordReader<R>,
    traced_file: String,
    mode: StepCommand,
    snapshot: Option<FrameSnapshot>,
    /// Boundary of the last line suspension, whose opcode event is still due
    line_boundary: Option<(usize, Arc<CodeDescriptor>)>,
    trace_events: bool,
}

impl<R: BufRead> ReplayInspector<R> {
    /// Replay calls leaving `traced_file` from `reader`
    pub fn new(reader: RecordReader<R>, traced_file: impl Into<String>) -> Self {
        Self {
            reader,
            traced_file: traced_file.into(),
            mode: StepCommand::Line,
            snapshot: None,
            line_boundary: None,
            trace_events: false,
        }
    }

    /// Log every hook event at trace level
    pub fn with_trace_events(mut self, trace_events: bool) -> Self {
        self.trace_events = trace_events;
        self
    }

    /// Granularity of the boundaries to suspend at
    pub fn set_mode(&mut self, mode: StepCommand) {
        self.mode = mode;
    }

    /// Snapshot taken at the last suspension
    pub fn take_snapshot(&mut self) -> Option<FrameSnapshot> {
        self.snapshot.take()
    }

    /// Number of log entries served so far
    pub fn records_consumed(&self) -> usize {
        self.reader.consumed()
    }

    fn suspend_if(&mut self, frame: &FrameView<'_>, mode: StepCommand) -> TraceControl {
        let offset = frame.instruction_offset();
        let descriptor = &frame.code().descriptor;
        let at_line_boundary = self
            .line_boundary
            .take()
            .is_some_and(|(line_offset, code)| line_offset == offset && Arc::ptr_eq(&code, descriptor));
        // a step always moves past the boundary the last line step stopped at
        if self.mode != mode || (mode == StepCommand::Opcode && at_line_boundary) {
            return TraceControl::Continue;
        }
        if mode == StepCommand::Line {
            self.line_boundary = Some((offset, descriptor.clone()));
        }
        self.snapshot = Some(frame.snapshot());
        TraceControl::Suspend
    }
}

impl<R: BufRead> Inspector for ReplayInspector<R> {
    fn trace(&mut self, frame: &mut FrameView<'_>, event: Event) -> Result<TraceControl, HookError> {
        if self.trace_events {
            trace_event(frame, event);
        }

        Ok(match event {
            Event::Call => {
                if frame.filename() != self.traced_file {
                    return Ok(TraceControl::Detach);
                }
                frame.set_trace_opcodes(true);
                TraceControl::Continue
            }
            Event::Line => self.suspend_if(frame, StepCommand::Line),
            Event::Opcode => self.suspend_if(frame, StepCommand::Opcode),
        })
    }

    fn intercept_call(
        &mut self,
        _frame: &FrameView<'_>,
        callee: &Value,
        _argc: usize,
    ) -> Result<Option<Value>, HookError> {
        if !is_external_call(callee, &self.traced_file) {
            return Ok(None);
        }
        let entry = self.reader.next_entry()?;
        trace!(index = self.reader.consumed() - 1, tag = %entry.tag(), "replaying call result");
        Ok(Some(match entry {
            RecordEntry::Normal(value) => Value::from_recorded(&value),
            RecordEntry::Unrepresentable => Value::placeholder(),
        }))
    }
}
