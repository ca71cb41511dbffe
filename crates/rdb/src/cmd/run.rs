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

//! Run command - execute a program without recording

use crate::utils::{init_console_logging, load_program};
use eyre::Result;
use rdb_common::types::FrameSnapshot;
use rdb_engine::{Engine, EngineConfig};
use std::{path::Path, process::ExitCode};

/// One line per instruction boundary: `<unit>:<line> offset <offset>`
pub fn format_boundary(snapshot: &FrameSnapshot) -> String {
    let line = snapshot.line.map_or_else(|| "-".to_string(), |line| line.to_string());
    format!("{}:{line} offset {}", snapshot.unit_name(), snapshot.instruction_offset)
}

/// Run the program at `path` to completion
pub fn run_program(path: &Path, steps: bool, config: EngineConfig) -> Result<ExitCode> {
    init_console_logging()?;
    let program = load_program(path)?;
    let engine = Engine::new(config);
    let ctx = engine.context(&program);

    if !steps {
        engine.run(&program, ctx)?;
        return Ok(ExitCode::SUCCESS);
    }

    let outcome = engine.trace(&program, ctx)?;
    for snapshot in &outcome.snapshots {
        println!("{}", format_boundary(snapshot));
    }
    outcome.result?;
    Ok(ExitCode::SUCCESS)
}
