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

//! Player command - serve the step-control channel on stdin/stdout
//!
//! This is the child-process entry point spawned by the front ends. Its stdout is
//! the channel, so it logs to a file only.

use eyre::Result;
use rdb_common::{init_file_logging, ControlServer, FrameReport};
use rdb_engine::{Engine, EngineConfig, Program};
use std::{io, path::Path, process::ExitCode};
use tracing::error;

/// Replay the program at `path` for the front end on the other end of stdin/stdout
pub fn serve_player(path: &Path, config: EngineConfig) -> Result<ExitCode> {
    init_file_logging("rdb-player")?;

    let program = match Program::load(path) {
        Ok(program) => program,
        Err(err) => {
            error!(error = %err, "player cannot load program");
            // the front end is waiting for an answer to its first request
            let mut server = ControlServer::new(io::stdin().lock(), io::stdout().lock());
            if server.recv_request()?.is_some() {
                server.send_report(&FrameReport::Aborted { reason: err.to_string() })?;
            }
            return Err(err.into());
        }
    };

    Engine::new(config).serve_stdio(&program)?;
    Ok(ExitCode::SUCCESS)
}
