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

// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
// SPDX-License-Identifier: AGPL-3.0
//! Terminal User Interface for RDB
//!
//! This crate provides a full-screen front end for replaying a recorded program.
//! The replay itself runs in a player child process; a background task owns the
//! connection to it so that at most one step is in flight.

mod app;
mod client;
mod config;

pub use app::{App, EventResponse, ExecutionStatus, SourceRow, FOOTER};
pub use client::PlayerClient;
pub use config::{
    BytecodePanelConfig, ColorScheme, Config, PanelConfig, SourcePanelConfig, Theme, ThemeConfig,
    VariablesPanelConfig,
};

use crossterm::{
    event::{Event, EventStream, KeyEvent},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use eyre::{Result, WrapErr};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use rdb_common::{types::StepCommand, FrameReport, SourceFile};
use std::{io, path::PathBuf, time::Duration};
use tokio::{
    select,
    sync::mpsc,
    task::JoinHandle,
    time::interval,
};
use tracing::{debug, error, info};

/// Configuration for the TUI
#[derive(Debug, Clone)]
pub struct TuiConfig {
    /// Program whose recording is replayed
    pub program: PathBuf,
    /// Terminal refresh interval
    pub refresh_interval: Duration,
}

impl TuiConfig {
    /// Configuration replaying `program` with the default refresh interval
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), ..Default::default() }
    }
}

impl Default for TuiConfig {
    fn default() -> Self {
        Self { program: PathBuf::new(), refresh_interval: Duration::from_millis(100) }
    }
}

type StepResult = std::result::Result<FrameReport, String>;

/// Spawn the task owning `client`; it serves one step command at a time and
/// stops after the player's final report
fn spawn_client_task(
    mut client: PlayerClient,
) -> (mpsc::Sender<StepCommand>, mpsc::Receiver<StepResult>, JoinHandle<()>) {
    let (command_tx, mut command_rx) = mpsc::channel::<StepCommand>(1);
    let (report_tx, report_rx) = mpsc::channel::<StepResult>(1);

    let handle = tokio::spawn(async move {
        while let Some(command) = command_rx.recv().await {
            let report = client.step(command).await.map_err(|e| e.to_string());
            let done = !matches!(report, Ok(FrameReport::Frame(_)));
            if report_tx.send(report).await.is_err() || done {
                break;
            }
        }
        client.shutdown().await;
        debug!("Player client task finished");
    });

    (command_tx, report_rx, handle)
}

/// Main TUI runner that manages the terminal interface and event loop
pub struct Tui {
    /// The main application state
    app: App,
    /// Terminal backend for rendering and input handling
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    /// Configuration settings for the TUI behavior
    config: TuiConfig,
    /// Connection to the player, handed to the background task by `run`
    client: Option<PlayerClient>,
}

impl Tui {
    /// Create a new TUI instance
    pub async fn new(config: TuiConfig) -> Result<Self> {
        info!("Initializing TUI with config: {:?}", config);

        let source = SourceFile::load(&config.program).wrap_err_with(|| {
            format!("can't read program file '{}'", config.program.display())
        })?;
        let app = App::new(source, Config::load_or_default());

        // Spawn the player before touching the terminal so failures print normally
        let client = PlayerClient::spawn(&config.program)?;

        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(Self { app, terminal, config, client: Some(client) })
    }

    /// Run the main TUI event loop
    pub async fn run(mut self) -> Result<()> {
        info!("Starting TUI event loop");

        let client = self.client.take().ok_or_else(|| eyre::eyre!("TUI already ran"))?;
        let (command_tx, mut report_rx, client_handle) = spawn_client_task(client);

        // Move to the first line right away
        self.app.begin_step(StepCommand::Line);
        command_tx.send(StepCommand::Line).await?;

        let mut event_stream = EventStream::new();
        let mut ticker = interval(self.config.refresh_interval);

        let result = loop {
            if let Err(e) = self.terminal.draw(|frame| self.app.render(frame)) {
                break Err(e.into());
            }

            select! {
                // Handle terminal events (keyboard, resize)
                event_result = event_stream.next() => {
                    match event_result {
                        Some(Ok(Event::Key(key_event))) => {
                            if let Some(command) = self.handle_key_event(key_event) {
                                if command_tx.send(command).await.is_err() {
                                    self.app.apply_report(Err("player terminated".to_string()));
                                }
                            }
                        }
                        Some(Ok(Event::Resize(width, height))) => {
                            debug!("Terminal resized: {}x{}", width, height);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break Err(e.into()),
                        None => break Ok(()),
                    }
                }

                // Answer from the player
                Some(report) = report_rx.recv() => {
                    self.app.apply_report(report);
                }

                // Periodic refresh tick
                _ = ticker.tick() => {}
            }

            // Check if app wants to exit
            if self.app.should_exit() {
                info!("App requested exit");
                break Ok(());
            }
        };

        // Closing the channel stops the player
        drop(command_tx);
        drop(report_rx);
        if let Err(e) = client_handle.await {
            error!("Player client task failed: {}", e);
        }

        info!("TUI event loop ended");
        result
    }

    // Handle a single key event, returning the step to request, if any
    fn handle_key_event(&mut self, key_event: KeyEvent) -> Option<StepCommand> {
        match self.app.handle_key_event(key_event) {
            EventResponse::Step(command) => Some(command),
            EventResponse::Exit => {
                info!("Exit requested");
                None
            }
            EventResponse::Handled => None,
            EventResponse::NotHandled => {
                debug!("Unhandled key event: {:?}", key_event);
                None
            }
        }
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        // Restore terminal state
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Public API for the TUI module
pub mod api {
    use super::*;

    /// Start the TUI with the given configuration
    pub async fn start_tui(config: TuiConfig) -> Result<()> {
        let tui = Tui::new(config).await?;
        tui.run().await
    }
}
