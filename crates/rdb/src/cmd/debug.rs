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

//! Debug command - the line-oriented replay debugger
//!
//! Commands are matched by prefix at the `(rdb) ` prompt. The replay runs in a
//! player child process driven over its stdin/stdout.

use crate::utils::{init_console_logging, load_program, spawn_player};
use eyre::{bail, Result, WrapErr};
use rdb_common::{
    disassemble,
    types::{FrameSnapshot, StepCommand},
    ChannelError, ControlClient, FrameReport, SourceFile,
};
use std::{
    io::{self, BufRead, BufReader, Read, Write},
    path::Path,
    process::ExitCode,
};
use tracing::{debug, warn};

/// Prompt printed before each command
pub const PROMPT: &str = "(rdb) ";

/// Commands understood at the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Print help
    Help,
    /// Show the source around the current line
    Source,
    /// Show the bytecode of the current code unit
    Opcode,
    /// Run to the next line
    Next,
    /// Run to the next instruction
    Step,
    /// Show variables
    Vars,
    /// Leave the debugger
    Quit,
}

impl Command {
    /// Every command, in help order
    pub const ALL: [Self; 7] =
        [Self::Help, Self::Source, Self::Opcode, Self::Next, Self::Step, Self::Vars, Self::Quit];

    /// Name typed at the prompt
    pub fn name(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Source => "source",
            Self::Opcode => "opcode",
            Self::Next => "next",
            Self::Step => "step",
            Self::Vars => "vars",
            Self::Quit => "quit",
        }
    }

    /// One-line description
    pub fn help(&self) -> &'static str {
        match self {
            Self::Help => "print help",
            Self::Source => "show source code",
            Self::Opcode => "show bytecode",
            Self::Next => "next line",
            Self::Step => "next bytecode",
            Self::Vars => "show variables (locals, globals)",
            Self::Quit => "exit debugger",
        }
    }

    /// Commands whose name starts with `input`
    pub fn matching(input: &str) -> Vec<Self> {
        Self::ALL.into_iter().filter(|command| command.name().starts_with(input)).collect()
    }
}

/// A debugging session over a connected player
#[derive(Debug)]
pub struct DebugSession<R: Read, W: Write> {
    client: ControlClient<R, W>,
    frame: Option<FrameSnapshot>,
    source: Option<SourceFile>,
}

impl<R: Read, W: Write> DebugSession<R, W> {
    /// Session driving `client`
    pub fn new(client: ControlClient<R, W>) -> Self {
        Self { client, frame: None, source: None }
    }

    /// Step to the first line, then read commands from `input` until `quit` or
    /// end of input.
    ///
    /// Aborted replays and a lost player end the session with an error.
    pub fn run(&mut self, mut input: impl BufRead, out: &mut impl Write) -> Result<()> {
        self.advance(StepCommand::Line, out)?;

        let mut line = String::new();
        loop {
            write!(out, "{PROMPT}")?;
            out.flush()?;

            line.clear();
            if input.read_line(&mut line)? == 0 {
                writeln!(out)?;
                break;
            }

            let commands = Command::matching(line.trim());
            let command = match commands.as_slice() {
                [] => {
                    writeln!(out, "que?")?;
                    continue;
                }
                [command] => *command,
                _ => {
                    writeln!(out, "ambiguous command specified:")?;
                    for command in &commands {
                        writeln!(out, "  {}", command.name())?;
                    }
                    continue;
                }
            };

            debug!("Command {:?}", command);
            match command {
                Command::Help => {
                    for command in Command::ALL {
                        writeln!(out, "{:<6} - {}", command.name(), command.help())?;
                    }
                }
                Command::Source => self.show_source(out)?,
                Command::Opcode => self.show_opcodes(out)?,
                Command::Next => self.advance(StepCommand::Line, out)?,
                Command::Step => self.advance(StepCommand::Opcode, out)?,
                Command::Vars => self.show_vars(out)?,
                Command::Quit => break,
            }
        }

        writeln!(out, "goodbye")?;
        Ok(())
    }

    fn advance(&mut self, granularity: StepCommand, out: &mut impl Write) -> Result<()> {
        let report = match self.client.step(granularity) {
            Ok(report) => report,
            Err(ChannelError::Terminated) => {
                writeln!(out, "the program has terminated")?;
                return Ok(());
            }
            Err(e) => return Err(e).wrap_err("player terminated"),
        };

        match report {
            FrameReport::Frame(frame) => {
                self.frame = Some(frame);
                match granularity {
                    StepCommand::Line => self.show_current_line(out)?,
                    StepCommand::Opcode => self.show_current_instruction(out)?,
                }
            }
            FrameReport::EndOfStream { uncaught: None } => {
                writeln!(out, "the program has finished")?;
            }
            FrameReport::EndOfStream { uncaught: Some(error) } => {
                writeln!(out, "the program raised {error}")?;
            }
            FrameReport::Aborted { reason } => bail!("player aborted: {reason}"),
        }
        Ok(())
    }

    /// Source of the current frame's file, loaded once per file
    fn source_file(&mut self) -> Option<&SourceFile> {
        let filename = self.frame.as_ref()?.filename().to_string();
        if self.source.as_ref().map(SourceFile::path) != Some(filename.as_str()) {
            match SourceFile::load(&filename) {
                Ok(source) => self.source = Some(source),
                Err(e) => {
                    warn!("Cannot read {}: {}", filename, e);
                    self.source = None;
                }
            }
        }
        self.source.as_ref()
    }

    fn show_current_line(&mut self, out: &mut impl Write) -> Result<()> {
        let Some(lineno) = self.frame.as_ref().and_then(|frame| frame.line) else {
            return Ok(());
        };
        if let Some(text) = self.source_file().and_then(|source| source.line(lineno)) {
            writeln!(out, "{lineno:>3} {text}")?;
        }
        Ok(())
    }

    fn show_current_instruction(&self, out: &mut impl Write) -> Result<()> {
        let Some(frame) = &self.frame else { return Ok(()) };
        let disassembly = disassemble(&frame.code)?;
        if let Some(instruction) = disassembly.get_instruction_at(frame.instruction_offset) {
            writeln!(out, "{}", instruction.render())?;
        }
        Ok(())
    }

    fn show_source(&mut self, out: &mut impl Write) -> Result<()> {
        let Some(frame) = &self.frame else {
            writeln!(out, "no frame to show")?;
            return Ok(());
        };
        let filename = frame.filename().to_string();
        let line = frame.line;

        match (self.source_file(), line) {
            (None, _) => writeln!(out, "can't read source file '{filename}'")?,
            (Some(source), Some(line)) => write!(out, "{}", source.render_window(line))?,
            (Some(source), None) => {
                for (lineno, text) in source.window(1, rdb_common::MAX_SOURCE_ROWS) {
                    writeln!(out, "{lineno:>3} {text}")?;
                }
            }
        }
        Ok(())
    }

    fn show_opcodes(&self, out: &mut impl Write) -> Result<()> {
        let Some(frame) = &self.frame else {
            writeln!(out, "no frame to show")?;
            return Ok(());
        };
        let disassembly = disassemble(&frame.code)?;
        writeln!(out, "{}:", frame.unit_name())?;
        writeln!(out, "{}", disassembly.render(Some(frame.instruction_offset)))?;
        Ok(())
    }

    fn show_vars(&self, out: &mut impl Write) -> Result<()> {
        let Some(frame) = &self.frame else {
            writeln!(out, "no frame to show")?;
            return Ok(());
        };
        writeln!(out, "locals:")?;
        for (name, value) in &frame.locals {
            writeln!(out, "  {name} = {value}")?;
        }
        if !frame.is_module_frame() {
            writeln!(out, "globals:")?;
            for (name, value) in &frame.globals {
                writeln!(out, "  {name} = {value}")?;
            }
        }
        Ok(())
    }
}

/// Debug the recording of the program at `path` on the terminal
pub fn debug_program(path: &Path) -> Result<ExitCode> {
    init_console_logging()?;
    let program = load_program(path)?;

    let mut child = spawn_player(&program)?;
    let writer = child.stdin.take().ok_or_else(|| eyre::eyre!("player stdin unavailable"))?;
    let reader = child.stdout.take().ok_or_else(|| eyre::eyre!("player stdout unavailable"))?;

    let mut session = DebugSession::new(ControlClient::new(BufReader::new(reader), writer));
    let result = session.run(io::stdin().lock(), &mut io::stdout().lock());

    // closing the channel ends the player
    drop(session);
    match child.wait() {
        Ok(status) => debug!("Player exited with {}", status),
        Err(e) => warn!("Failed to reap player: {}", e),
    }

    result?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use rdb_common::types::{RecordEntry, RecordedValue};
    use rdb_engine::{Player, Program, RecordReader, RecordWriter};
    use std::{fs, io::Cursor, os::unix::net::UnixStream, thread};

    #[test]
    fn test_prefix_matching() {
        assert_eq!(Command::matching("n"), vec![Command::Next]);
        assert_eq!(Command::matching("st"), vec![Command::Step]);
        assert_eq!(Command::matching("s"), vec![Command::Source, Command::Step]);
        assert_eq!(Command::matching(""), Command::ALL.to_vec());
        assert!(Command::matching("foo").is_empty());
        assert!(Command::matching("quitting").is_empty());
    }

    /// Run a session with `script` as input against an in-process player
    fn session(source: &str, entries: &[RecordEntry], script: &str) -> (Result<()>, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog.pyl");
        fs::write(&path, source).unwrap();

        let mut writer = RecordWriter::new(Vec::new());
        for entry in entries {
            writer.append(entry).unwrap();
        }
        let log = writer.finish().unwrap();

        let (server_end, client_end) = UnixStream::pair().unwrap();
        let script = script.to_string();
        let front_end = thread::spawn(move || {
            let client = ControlClient::new(client_end.try_clone().unwrap(), client_end);
            let mut session = DebugSession::new(client);
            let mut out = Vec::new();
            let result = session.run(Cursor::new(script), &mut out);
            (result, String::from_utf8(out).unwrap())
        });

        let program = Program::load(&path).unwrap();
        let mut player = Player::new(
            &program,
            program.new_context().with_sink(),
            RecordReader::new(Cursor::new(log)),
        );
        let mut server =
            rdb_common::ControlServer::new(server_end.try_clone().unwrap(), server_end);
        let _ = player.serve(&mut server);
        drop(server);

        front_end.join().unwrap()
    }

    #[test]
    fn test_session_walks_the_program() {
        let (result, out) = session(
            "x = 1\nprint(x)\n",
            &[RecordEntry::Normal(RecordedValue::None)],
            "next\nvars\ns\nfoo\nnext\nnext\nquit\n",
        );
        assert!(result.is_ok(), "{result:?}");

        assert!(out.starts_with("  1 x = 1\n(rdb) "), "{out}");
        assert!(out.contains("  2 print(x)\n"), "{out}");
        assert!(out.contains("locals:\n  x = 1\n"), "{out}");
        assert!(out.contains("ambiguous command specified:\n  source\n  step\n"), "{out}");
        assert!(out.contains("que?\n"), "{out}");
        assert!(out.contains("the program has finished\n"), "{out}");
        assert!(out.contains("the program has terminated\n"), "{out}");
        assert!(out.ends_with("goodbye\n"), "{out}");
    }

    #[test]
    fn test_source_and_opcode_views() {
        let (result, out) = session("x = 1\ny = 2\n", &[], "source\nstep\nopcode\nhelp\n");
        assert!(result.is_ok(), "{result:?}");

        assert!(out.contains("--> x = 1\n  2 y = 2\n"), "{out}");
        assert!(out.contains("STORE_NAME"), "{out}");
        assert!(out.contains("<module>:\n"), "{out}");
        assert!(out.contains("-->"), "{out}");
        assert!(out.contains("next   - next line\n"), "{out}");
        // end of input quits
        assert!(out.ends_with("goodbye\n"), "{out}");
    }

    #[test]
    fn test_underrun_aborts_session() {
        let (result, out) = session("x = len([])\n", &[], "next\nnext\n");
        let err = result.unwrap_err();
        assert!(err.to_string().starts_with("player aborted"), "{err:#}");
        assert!(!out.contains("goodbye"), "{out}");
    }
}
