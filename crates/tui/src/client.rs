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

//! Client side of the step-control channel
//!
//! The TUI never replays anything itself: it spawns `rdb player <program>` and
//! talks to it over the child's stdin/stdout.

use eyre::{Result, WrapErr};
use rdb_common::{
    env::player_executable, read_message_async, types::StepCommand, write_message_async,
    ChannelError, FrameReport, StepRequest,
};
use std::{path::Path, process::Stdio};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    process::{Child, ChildStdin, ChildStdout, Command},
};
use tracing::{debug, info, warn};

/// Async client for a player process
#[derive(Debug)]
pub struct PlayerClient<R = ChildStdout, W = ChildStdin> {
    reader: R,
    writer: W,
    child: Option<Child>,
    terminated: bool,
}

impl PlayerClient {
    /// Spawn the player for `program` and connect to it
    pub fn spawn(program: &Path) -> Result<Self> {
        let bin = player_executable().wrap_err("cannot locate the player executable")?;
        info!("Spawning player {:?} for {:?}", bin, program);

        let mut child = Command::new(&bin)
            .arg("player")
            .arg(program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .wrap_err_with(|| format!("cannot spawn player {}", bin.display()))?;

        let writer = child.stdin.take().ok_or_else(|| eyre::eyre!("player stdin unavailable"))?;
        let reader =
            child.stdout.take().ok_or_else(|| eyre::eyre!("player stdout unavailable"))?;

        Ok(Self { reader, writer, child: Some(child), terminated: false })
    }
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> PlayerClient<R, W> {
    /// Client over an already connected transport
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer, child: None, terminated: false }
    }

    /// Whether the player already sent its final report
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Ask for one step and wait for the report
    pub async fn step(&mut self, granularity: StepCommand) -> Result<FrameReport, ChannelError> {
        if self.terminated {
            return Err(ChannelError::Terminated);
        }

        debug!("Requesting {} step", granularity);
        write_message_async(&mut self.writer, &StepRequest::new(granularity).encode()).await?;

        let payload = match read_message_async(&mut self.reader).await? {
            Some(payload) => payload,
            None => {
                self.terminated = true;
                return Err(ChannelError::Closed);
            }
        };
        let report = FrameReport::decode(&payload)?;
        if report.is_final() {
            self.terminated = true;
        }
        Ok(report)
    }

    /// Close the channel and reap the player
    pub async fn shutdown(self) {
        let Self { reader, writer, child, .. } = self;
        drop(writer);
        drop(reader);
        if let Some(mut child) = child {
            match child.wait().await {
                Ok(status) => debug!("Player exited with {}", status),
                Err(e) => warn!("Failed to reap player: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdb_common::types::{CodeDescriptor, FrameSnapshot, LineRange};
    use std::sync::Arc;
    use tokio::io::{duplex, split};

    fn snapshot(line: u32) -> FrameSnapshot {
        FrameSnapshot {
            line: Some(line),
            instruction_offset: 0,
            locals: Default::default(),
            globals: Default::default(),
            code: Arc::new(CodeDescriptor {
                filename: "prog.pyl".into(),
                name: "<module>".into(),
                instructions: vec![],
                constants: vec![],
                names: vec![],
                local_names: vec![],
                line_table: vec![LineRange { start: 0, end: 0, line: Some(line) }],
            }),
        }
    }

    /// Answer each request with the next report, then hang up
    fn fake_player(
        reports: Vec<FrameReport>,
    ) -> PlayerClient<impl AsyncRead + Unpin, impl AsyncWrite + Unpin> {
        let (client, server) = duplex(64 * 1024);
        tokio::spawn(async move {
            let (mut rx, mut tx) = split(server);
            for report in reports {
                let Ok(Some(request)) = read_message_async(&mut rx).await else { return };
                StepRequest::decode(&request).unwrap();
                let payload = report.encode().unwrap();
                write_message_async(&mut tx, &payload).await.unwrap();
            }
        });
        let (rx, tx) = split(client);
        PlayerClient::new(rx, tx)
    }

    #[tokio::test]
    async fn test_steps_until_end_of_stream() {
        let mut client = fake_player(vec![
            FrameReport::Frame(snapshot(1)),
            FrameReport::Frame(snapshot(2)),
            FrameReport::EndOfStream { uncaught: None },
        ]);

        let first = client.step(StepCommand::Line).await.unwrap();
        assert_eq!(first.frame().unwrap().line, Some(1));
        let second = client.step(StepCommand::Opcode).await.unwrap();
        assert_eq!(second.frame().unwrap().line, Some(2));
        assert!(!client.is_terminated());

        let last = client.step(StepCommand::Line).await.unwrap();
        assert_eq!(last, FrameReport::EndOfStream { uncaught: None });
        assert!(client.is_terminated());
        assert!(matches!(client.step(StepCommand::Line).await, Err(ChannelError::Terminated)));
    }

    #[tokio::test]
    async fn test_aborted_report_terminates() {
        let mut client =
            fake_player(vec![FrameReport::Aborted { reason: "record log exhausted".into() }]);
        let report = client.step(StepCommand::Line).await.unwrap();
        assert!(report.is_final());
        assert!(client.is_terminated());
    }

    #[tokio::test]
    async fn test_closed_channel() {
        let mut client = fake_player(vec![]);
        let err = client.step(StepCommand::Line).await.unwrap_err();
        assert!(matches!(err, ChannelError::Closed | ChannelError::Io(_)), "{err:?}");
        client.shutdown().await;
    }
}
