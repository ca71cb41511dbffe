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

//! Recorder: run a program to completion while logging every external call result

use std::io::Write;

use thiserror::Error;
use tracing::{info, warn};

use crate::{
    context::ExecutionContext,
    inspector::{HookError, RecordInspector},
    program::Program,
    record_log::{RecordLogError, RecordWriter},
    vm::{Exit, RuntimeError, Value, Vm, VmError},
};

/// Result of a completed recording
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    /// Entries appended to the log
    pub entries: usize,
    /// Value the module body returned
    pub result: Value,
}

/// Why a recording did not complete
#[derive(Debug, Error)]
pub enum RecordError {
    /// The program raised; the log holds every call completed before the error
    #[error("{error}")]
    Program {
        /// The uncaught error
        error: RuntimeError,
        /// Entries written before the error
        entries: usize,
    },

    /// Writing the log failed
    #[error(transparent)]
    RecordLog(#[from] RecordLogError),

    /// The interpreter or the hook failed
    #[error("recording failed: {0}")]
    Vm(VmError),
}

impl From<VmError> for RecordError {
    fn from(err: VmError) -> Self {
        match err {
            VmError::Hook(HookError::RecordLog(err)) => Self::RecordLog(err),
            other => Self::Vm(other),
        }
    }
}

/// Record `program` into `log`
pub fn record<W: Write>(
    program: &Program,
    ctx: ExecutionContext,
    log: RecordWriter<W>,
) -> Result<RecordOutcome, RecordError> {
    record_with_events(program, ctx, log, false)
}

/// Record `program` into `log`, optionally logging every hook event
pub fn record_with_events<W: Write>(
    program: &Program,
    ctx: ExecutionContext,
    log: RecordWriter<W>,
    trace_events: bool,
) -> Result<RecordOutcome, RecordError> {
    info!(program = program.filename(), "recording");
    let mut inspector =
        RecordInspector::new(log, program.filename()).with_trace_events(trace_events);
    let mut vm = Vm::new(program.code(), ctx);

    let outcome = vm.resume(&mut inspector);
    let entries = inspector.entries_written();
    // keep whatever was recorded, even when the run failed
    let flushed = inspector.writer_mut().flush();

    match outcome {
        Ok(Exit::Finished(result)) => {
            flushed?;
            info!(entries, "recording complete");
            Ok(RecordOutcome { entries, result })
        }
        Ok(Exit::Suspended) => Err(RecordError::Vm(VmError::Internal(
            "recording hook never suspends".to_string(),
        ))),
        Err(VmError::Runtime(error)) => {
            flushed?;
            warn!(%error, entries, "program raised during recording");
            Err(RecordError::Program { error, entries })
        }
        Err(err) => Err(err.into()),
    }
}
