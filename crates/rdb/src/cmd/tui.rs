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

//! Tui command - replay a recording in the full-screen front end

use crate::utils::load_program;
use eyre::Result;
use rdb_common::init_file_logging;
use rdb_tui::TuiConfig;
use std::{path::Path, process::ExitCode};
use tracing::info;

/// Start the full-screen debugger on the recording of the program at `path`
pub async fn start_tui(path: &Path) -> Result<ExitCode> {
    init_file_logging("rdb-tui")?;
    let program = load_program(path)?;

    info!("Launching Terminal UI for {}", program.filename());
    rdb_tui::api::start_tui(TuiConfig::new(program.path())).await?;
    Ok(ExitCode::SUCCESS)
}
