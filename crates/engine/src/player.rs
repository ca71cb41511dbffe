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

//! Player: deterministic replay of a recorded run, one step at a time
//!
//! The player re-executes the program from the start. Every external call is
//! intercepted before it runs and answered with the next unread log entry, so the
//! program sees exactly the values it saw while recording. Execution pauses at
//! line or instruction boundaries on request.
//!
//! State machine: `Running` (nothing executed yet, or executing) to `Suspended`
//! (a snapshot was emitted) and back; `Terminated` once the program returns,
//! raises, or replay fails. A terminated player answers every step with no frame.

use std::{
    fs::File,
    io::{BufRead, BufReader, Read, Write},
};

use rdb_common::{
    types::{FrameSnapshot, StepCommand},
    ChannelError, ControlServer, FrameReport,
};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
    context::ExecutionContext,
    inspector::{HookError, ReplayInspector},
    program::Program,
    record_log::{RecordLogError, RecordReader},
    vm::{Exit, RuntimeError, Vm, VmError},
};

/// Where the player is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Awaiting or executing a step
    Running,
    /// Paused at a reported boundary
    Suspended,
    /// The program ended or replay failed
    Terminated,
}

/// Replay failures; they end the replay
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The record log could not serve the next entry
    #[error(transparent)]
    RecordLog(#[from] RecordLogError),

    /// The interpreter or the hook failed
    #[error("replay failed: {0}")]
    Vm(VmError),

    /// The control channel failed
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl From<VmError> for ReplayError {
    fn from(err: VmError) -> Self {
        match err {
            VmError::Hook(HookError::RecordLog(err)) => Self::RecordLog(err),
            other => Self::Vm(other),
        }
    }
}

/// Replays one recorded run of a program
#[derive(Debug)]
pub struct Player<R: BufRead = BufReader<File>> {
    vm: Vm,
    inspector: ReplayInspector<R>,
    state: PlayerState,
    uncaught: Option<RuntimeError>,
}

impl Player<BufReader<File>> {
    /// Replay `program` from its record log
    pub fn open(program: &Program, ctx: ExecutionContext) -> Result<Self, ReplayError> {
        let reader = RecordReader::open(&program.record_log_path())?;
        Ok(Self::new(program, ctx, reader))
    }
}

impl<R: BufRead> Player<R> {
    /// Replay `program` serving external calls from `log`
    pub fn new(program: &Program, ctx: ExecutionContext, log: RecordReader<R>) -> Self {
        Self {
            vm: Vm::new(program.code(), ctx),
            inspector: ReplayInspector::new(log, program.filename()),
            state: PlayerState::Running,
            uncaught: None,
        }
    }

    /// Log every hook event at trace level
    pub fn with_trace_events(mut self, trace_events: bool) -> Self {
        self.inspector = self.inspector.with_trace_events(trace_events);
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// The error the program raised, once it has terminated with one
    pub fn uncaught_error(&self) -> Option<&RuntimeError> {
        self.uncaught.as_ref()
    }

    /// Log entries consumed so far
    pub fn records_consumed(&self) -> usize {
        self.inspector.records_consumed()
    }

    /// Run to the next boundary of `granularity`; `None` once the program has ended
    pub fn step(&mut self, granularity: StepCommand) -> Result<Option<FrameSnapshot>, ReplayError> {
        if self.state == PlayerState::Terminated {
            return Ok(None);
        }
        self.state = PlayerState::Running;
        self.inspector.set_mode(granularity);

        match self.vm.resume(&mut self.inspector) {
            Ok(Exit::Suspended) => {
                let snapshot = self.inspector.take_snapshot().ok_or_else(|| {
                    self.state = PlayerState::Terminated;
                    ReplayError::Vm(VmError::Internal("suspended without a snapshot".to_string()))
                })?;
                self.state = PlayerState::Suspended;
                Ok(Some(snapshot))
            }
            Ok(Exit::Finished(_)) => {
                info!(consumed = self.records_consumed(), "replay finished");
                self.state = PlayerState::Terminated;
                Ok(None)
            }
            Err(VmError::Runtime(err)) => {
                info!(error = %err, "program raised during replay");
                self.state = PlayerState::Terminated;
                self.uncaught = Some(err);
                Ok(None)
            }
            Err(err) => {
                self.state = PlayerState::Terminated;
                Err(err.into())
            }
        }
    }

    /// Run to the next source line
    pub fn step_line(&mut self) -> Result<Option<FrameSnapshot>, ReplayError> {
        self.step(StepCommand::Line)
    }

    /// Run to the next instruction
    pub fn step_opcode(&mut self) -> Result<Option<FrameSnapshot>, ReplayError> {
        self.step(StepCommand::Opcode)
    }

    /// Answer step requests on `server` until the replay ends or the client leaves.
    ///
    /// A failed replay is reported to the client as `Aborted` and returned.
    pub fn serve<Rd: Read, Wr: Write>(
        &mut self,
        server: &mut ControlServer<Rd, Wr>,
    ) -> Result<(), ReplayError> {
        while let Some(request) = server.recv_request()? {
            debug!(granularity = %request.granularity, "step requested");
            let report = match self.step(request.granularity) {
                Ok(Some(frame)) => FrameReport::Frame(frame),
                Ok(None) => FrameReport::EndOfStream {
                    uncaught: self.uncaught.as_ref().map(ToString::to_string),
                },
                Err(err) => {
                    error!(error = %err, "replay aborted");
                    server.send_report(&FrameReport::Aborted { reason: err.to_string() })?;
                    return Err(err);
                }
            };

            match server.send_report(&report) {
                Ok(()) if report.is_final() => return Ok(()),
                Ok(()) => {}
                Err(err @ (ChannelError::MessageTooLarge { .. } | ChannelError::Codec(_))) => {
                    error!(error = %err, "frame report cannot be sent");
                    self.state = PlayerState::Terminated;
                    server.send_report(&FrameReport::Aborted { reason: err.to_string() })?;
                    return Err(err.into());
                }
                Err(err) => return Err(err.into()),
            }
        }
        debug!("client closed the control channel");
        Ok(())
    }
}
