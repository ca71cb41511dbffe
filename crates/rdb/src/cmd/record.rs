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

//! Record command - run a program while logging its external call results

use crate::utils::{init_console_logging, load_program};
use eyre::Result;
use rdb_engine::{Engine, EngineConfig};
use std::{path::Path, process::ExitCode};
use tracing::info;

/// Record the program at `path` into its record log.
///
/// The log is written even when the program raises; the error is then reported
/// and the exit status is non-zero.
pub fn record_program(path: &Path, config: EngineConfig) -> Result<ExitCode> {
    init_console_logging()?;
    let program = load_program(path)?;
    let engine = Engine::new(config);

    let ctx = engine.context(&program);
    let outcome = engine.record(&program, ctx)?;
    info!(
        "Recorded {} external calls to {}",
        outcome.entries,
        program.record_log_path().display()
    );
    Ok(ExitCode::SUCCESS)
}
