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

//! Utility functions for the RDB binary

use eyre::{Result, WrapErr};
use rdb_common::{env::player_executable, init_logging};
use rdb_engine::Program;
use std::{
    path::Path,
    process::{Child, Command, Stdio},
};
use tracing::debug;

/// Console logging on stderr, leaving stdout to the program and the prompt
pub fn init_console_logging() -> Result<()> {
    init_logging("rdb", false)
}

/// Read and compile the program at `path`
pub fn load_program(path: &Path) -> Result<Program> {
    let program = Program::load(path)?;
    debug!("Loaded program {}", program.filename());
    Ok(program)
}

/// Spawn `<player> player <program>` with the control channel on its stdin/stdout.
///
/// The player's stderr is discarded and nothing else is inherited.
pub fn spawn_player(program: &Program) -> Result<Child> {
    let bin = player_executable().wrap_err("cannot locate the player executable")?;
    debug!("Spawning player {:?} for {}", bin, program.filename());

    Command::new(&bin)
        .arg("player")
        .arg(program.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .wrap_err_with(|| format!("cannot spawn player {}", bin.display()))
}
