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

//! Hook of the recording run: appends the result of every external call to the
//! record log
//!
//! On the opcode event of a `CALL_FUNCTION` whose callee is external, a capture is
//! armed. External callees never produce events of their own, so the next opcode
//! event of a traced frame is the instruction after the call, with the call's
//! result on top of the stack.

use std::io::Write;

use rdb_common::types::RecordEntry;
use tracing::trace;

use super::{is_external_call, trace_event, Event, FrameView, HookError, Inspector, TraceControl};
use crate::record_log::RecordWriter;

/// Inspector that writes the record log
#[derive(Debug)]
pub struct RecordInspector<W: Write> {
    writer: RecordWriter<W>,
    traced_file: String,
    pending_capture: bool,
    trace_events: bool,
}

impl<W: Write> RecordInspector<W> {
    /// Record calls leaving `traced_file` into `writer`
    pub fn new(writer: RecordWriter<W>, traced_file: impl Into<String>) -> Self {
        Self { writer, traced_file: traced_file.into(), pending_capture: false, trace_events: false }
    }

    /// Log every hook event at trace level
    pub fn with_trace_events(mut self, trace_events: bool) -> Self {
        self.trace_events = trace_events;
        self
    }

    /// Number of entries written so far
    pub fn entries_written(&self) -> usize {
        self.writer.entries_written()
    }

    /// The log being written
    pub fn writer_mut(&mut self) -> &mut RecordWriter<W> {
        &mut self.writer
    }

    /// Give back the log writer
    pub fn into_writer(self) -> RecordWriter<W> {
        self.writer
    }

    fn capture_result(&mut self, frame: &FrameView<'_>) -> Result<(), HookError> {
        let result = frame
            .peek(1)
            .ok_or_else(|| HookError::Other("external call left no result on the stack".to_string()))?;
        let entry = match result.to_recorded() {
            Some(value) => RecordEntry::Normal(value),
            None => RecordEntry::Unrepresentable,
        };
        trace!(index = self.writer.entries_written(), tag = %entry.tag(), "recording call result");
        self.writer.append(&entry)?;
        Ok(())
    }
}

impl<W: Write> Inspector for RecordInspector<W> {
    fn trace(&mut self, frame: &mut FrameView<'_>, event: Event) -> Result<TraceControl, HookError> {
        if self.trace_events {
            trace_event(frame, event);
        }

        match event {
            Event::Call => {
                if frame.filename() != self.traced_file {
                    return Ok(TraceControl::Detach);
                }
                frame.set_trace_opcodes(true);
            }
            Event::Line => {}
            Event::Opcode => {
                if std::mem::take(&mut self.pending_capture) {
                    self.capture_result(frame)?;
                }
                let instruction = frame.decode_current()?;
                if let Some(argc) = instruction.call_argc() {
                    let callee = frame.peek(argc + 1).ok_or_else(|| {
                        HookError::Other("callable missing below call arguments".to_string())
                    })?;
                    self.pending_capture = is_external_call(callee, &self.traced_file);
                }
            }
        }
        Ok(TraceControl::Continue)
    }
}
