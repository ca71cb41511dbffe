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

//! RDB - Record/Replay Debugger
//!
//! Records the results of a program's external calls and replays the program
//! step by step from that recording.

use clap::{Parser, Subcommand};
use eyre::Result;
use rdb_engine::EngineConfig;
use std::{path::PathBuf, process::ExitCode};

mod cmd;
mod utils;

/// Command-line interface for RDB
#[derive(Debug, Parser)]
#[command(name = "rdb")]
#[command(about = "Record/Replay Debugger - record a program once, replay it step by step")]
#[command(version)]
pub struct Cli {
    /// Log every execution hook event at trace level
    #[arg(long, global = true, env = "RDB_TRACE_EVENTS")]
    pub trace_events: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a program without recording
    Run {
        /// Program to run
        program: PathBuf,
        /// Print every instruction boundary after the run
        #[arg(long)]
        steps: bool,
        /// Seed for the program's random source
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Record the external calls of a program
    Record {
        /// Program to record
        program: PathBuf,
        /// Seed for the program's random source
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Dump the record log of a program as JSON lines
    Records {
        /// Program whose record log is dumped
        program: PathBuf,
    },
    /// Replay a recording with the line-oriented debugger
    Debug {
        /// Recorded program
        program: PathBuf,
    },
    /// Replay a recording with the full-screen debugger
    Tui {
        /// Recorded program
        program: PathBuf,
    },
    /// Serve the step-control channel on stdin/stdout
    #[command(hide = true)]
    Player {
        /// Recorded program
        program: PathBuf,
    },
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        let seed = match &self.command {
            Commands::Run { seed, .. } | Commands::Record { seed, .. } => *seed,
            _ => None,
        };
        EngineConfig::default().with_trace_events(self.trace_events).with_seed(seed)
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let config = cli.engine_config();
    match cli.command {
        Commands::Run { program, steps, .. } => cmd::run_program(&program, steps, config),
        Commands::Record { program, .. } => cmd::record_program(&program, config),
        Commands::Records { program } => cmd::dump_records(&program),
        Commands::Debug { program } => cmd::debug_program(&program),
        Commands::Tui { program } => cmd::start_tui(&program).await,
        Commands::Player { program } => cmd::serve_player(&program, config),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!("{e:?}");
            eprintln!("rdb: {e:#}");
            ExitCode::FAILURE
        }
    }
}
