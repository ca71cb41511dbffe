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

//! Step inspector collecting a frame snapshot at every instruction boundary
//!
//! Used for traced direct runs (`rdb run --steps`) and as the reference a replay
//! is compared against.

use rdb_common::types::FrameSnapshot;

use super::{trace_event, Event, FrameView, HookError, Inspector, TraceControl};

/// Inspector that records every instruction boundary of the traced source unit
#[derive(Debug, Default)]
pub struct StepInspector {
    /// Source unit to follow; every frame when `None`
    traced_file: Option<String>,
    /// Snapshots in execution order
    snapshots: Vec<FrameSnapshot>,
    trace_events: bool,
}

impl StepInspector {
    /// Create a step inspector following every frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Only follow frames executing `traced_file`
    pub fn with_traced_file(traced_file: impl Into<String>) -> Self {
        Self { traced_file: Some(traced_file.into()), ..Default::default() }
    }

    /// Log every hook event at trace level
    pub fn with_trace_events(mut self, trace_events: bool) -> Self {
        self.trace_events = trace_events;
        self
    }

    /// Snapshots collected so far
    pub fn snapshots(&self) -> &[FrameSnapshot] {
        &self.snapshots
    }

    /// Consume the inspector and return the collected snapshots
    pub fn into_snapshots(self) -> Vec<FrameSnapshot> {
        self.snapshots
    }

    /// Source lines in the order they were reached
    pub fn visited_lines(&self) -> Vec<u32> {
        let mut lines: Vec<u32> = Vec::new();
        let mut last = None;
        for snapshot in &self.snapshots {
            let key = (snapshot.unit_name(), snapshot.line);
            if let (Some(line), true) = (snapshot.line, last != Some(key)) {
                lines.push(line);
            }
            last = Some(key);
        }
        lines
    }

    /// Discard collected snapshots
    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

impl Inspector for StepInspector {
    fn trace(&mut self, frame: &mut FrameView<'_>, event: Event) -> Result<TraceControl, HookError> {
        if self.trace_events {
            trace_event(frame, event);
        }

        match event {
            Event::Call => {
                if self.traced_file.as_deref().is_some_and(|file| file != frame.filename()) {
                    return Ok(TraceControl::Detach);
                }
                frame.set_trace_opcodes(true);
            }
            Event::Line => {}
            Event::Opcode => self.snapshots.push(frame.snapshot()),
        }
        Ok(TraceControl::Continue)
    }
}
