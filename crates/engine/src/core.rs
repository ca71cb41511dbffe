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

//! Engine facade tying programs, recording and replay together.
//!
//! The front ends drive everything through [`Engine`]:
//!
//! 1. **Run**: execute a program directly, optionally collecting a snapshot at
//!    every instruction boundary ([`Engine::trace`])
//! 2. **Record**: execute a program while logging external call results next to it
//!    ([`Engine::record`])
//! 3. **Replay**: re-execute a recorded program step by step, either in process
//!    ([`Engine::player`]) or as the player child process serving the control
//!    channel on stdin/stdout ([`Engine::serve_stdio`])

use std::io;

use eyre::{Result, WrapErr};
use rdb_common::{types::FrameSnapshot, ControlServer, FrameReport};
use tracing::{error, info};

use crate::{
    context::ExecutionContext,
    inspector::StepInspector,
    player::Player,
    program::Program,
    record_log::RecordWriter,
    recorder::{record_with_events, RecordOutcome},
    vm::{Exit, RuntimeError, Value, Vm, VmError},
};

/// Configuration for the RDB engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Log every execution hook event at trace level
    pub trace_events: bool,
    /// Seed for the program's random source; entropy when unset
    pub seed: Option<u64>,
}

impl EngineConfig {
    /// Enable or disable logging of every hook event
    pub fn with_trace_events(mut self, trace_events: bool) -> Self {
        self.trace_events = trace_events;
        self
    }

    /// Seed the program's random source
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

/// Result of a traced direct run
#[derive(Debug)]
pub struct TraceOutcome {
    /// Snapshot at every instruction boundary, in execution order
    pub snapshots: Vec<FrameSnapshot>,
    /// How the program ended
    pub result: std::result::Result<Value, RuntimeError>,
}

/// The main Engine struct
#[derive(Debug, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    /// Create a new Engine instance from configuration
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// The engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fresh execution context for `program` honouring the configured seed
    pub fn context(&self, program: &Program) -> ExecutionContext {
        let ctx = program.new_context();
        match self.config.seed {
            Some(seed) => ctx.with_seed(seed),
            None => ctx,
        }
    }

    /// Run `program` to completion without instrumentation
    pub fn run(&self, program: &Program, ctx: ExecutionContext) -> Result<Value> {
        info!(program = program.filename(), "running");
        let mut vm = Vm::new(program.code(), ctx);
        Ok(vm.run()?)
    }

    /// Run `program` collecting a snapshot at every instruction boundary
    pub fn trace(&self, program: &Program, ctx: ExecutionContext) -> Result<TraceOutcome> {
        info!(program = program.filename(), "running with step tracing");
        let mut inspector = StepInspector::with_traced_file(program.filename())
            .with_trace_events(self.config.trace_events);
        let mut vm = Vm::new(program.code(), ctx);

        let result = match vm.resume(&mut inspector) {
            Ok(Exit::Finished(value)) => Ok(value),
            Ok(Exit::Suspended) => eyre::bail!("step tracing suspended the program"),
            Err(VmError::Runtime(err)) => Err(err),
            Err(err) => return Err(err.into()),
        };
        Ok(TraceOutcome { snapshots: inspector.into_snapshots(), result })
    }

    /// Record `program` into its record log
    pub fn record(&self, program: &Program, ctx: ExecutionContext) -> Result<RecordOutcome> {
        let path = program.record_log_path();
        let log = RecordWriter::create(&path)
            .wrap_err_with(|| format!("cannot create record log {}", path.display()))?;
        let outcome = record_with_events(program, ctx, log, self.config.trace_events)?;
        info!(entries = outcome.entries, log = %path.display(), "record log written");
        Ok(outcome)
    }

    /// Player replaying the record log of `program` with its output discarded
    pub fn player(&self, program: &Program) -> Result<Player> {
        let ctx = self.context(program).with_sink();
        let player = Player::open(program, ctx).wrap_err_with(|| {
            format!("cannot open record log {}", program.record_log_path().display())
        })?;
        Ok(player.with_trace_events(self.config.trace_events))
    }

    /// Serve the control channel on stdin/stdout until the client leaves or the
    /// replay ends
    pub fn serve_stdio(&self, program: &Program) -> Result<()> {
        let mut server = ControlServer::new(io::stdin().lock(), io::stdout().lock());
        let mut player = match self.player(program) {
            Ok(player) => player,
            Err(err) => {
                error!(error = %err, "player cannot start");
                // the front end is waiting for an answer to its first request
                if server.recv_request()?.is_some() {
                    server.send_report(&FrameReport::Aborted { reason: format!("{err:#}") })?;
                }
                return Err(err);
            }
        };
        player.serve(&mut server)?;
        Ok(())
    }
}
