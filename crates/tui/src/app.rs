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

//! Main application state and logic
//!
//! The app holds the last frame reported by the player and renders it into
//! four areas: source, variables, bytecode and a status line with the key
//! footer below it.

use crate::config::{ColorScheme, Config};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};
use rdb_common::{
    disassemble,
    types::{CodeDescriptor, FrameSnapshot, StepCommand},
    DisassemblyResult, FrameReport, SourceFile,
};
use std::{path::Path, sync::Arc};
use tracing::{debug, info, warn};

/// Key help shown at the bottom of the screen
pub const FOOTER: &str = "n / space next line, s step opcode, q / esc quit";

/// Outcome of handling a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResponse {
    /// Event was handled, no further action needed
    Handled,
    /// Event was not handled
    NotHandled,
    /// Ask the player for one step
    Step(StepCommand),
    /// Request application exit
    Exit,
}

/// Where the replay stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Waiting for the first report
    Starting,
    /// A step is in flight
    Stepping(StepCommand),
    /// Paused at a boundary
    Paused,
    /// The program ran to completion
    Finished {
        /// Display form of the uncaught error, if the program raised one
        uncaught: Option<String>,
    },
    /// The player aborted or went away
    Terminated(String),
}

impl ExecutionStatus {
    /// Whether a step request may be sent now
    pub fn can_step(&self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Whether the player will not report again
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Terminated(_))
    }
}

/// One row of the source panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow<'a> {
    /// 1-based line number
    pub lineno: u32,
    /// Line text
    pub text: &'a str,
    /// Whether execution is paused on this line
    pub current: bool,
}

/// Main application state
#[derive(Debug)]
pub struct App {
    source: SourceFile,
    config: Config,
    colors: ColorScheme,
    frame: Option<FrameSnapshot>,
    disassembly: Option<(Arc<CodeDescriptor>, Result<DisassemblyResult, String>)>,
    status: ExecutionStatus,
    steps: usize,
    should_exit: bool,
}

impl App {
    /// Create a new application instance
    pub fn new(source: SourceFile, config: Config) -> Self {
        let colors = config.colors();
        Self {
            source,
            config,
            colors,
            frame: None,
            disassembly: None,
            status: ExecutionStatus::Starting,
            steps: 0,
            should_exit: false,
        }
    }

    /// Current replay status
    pub fn status(&self) -> &ExecutionStatus {
        &self.status
    }

    /// Last reported frame
    pub fn current_frame(&self) -> Option<&FrameSnapshot> {
        self.frame.as_ref()
    }

    /// Number of frames received so far
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Whether the application should exit
    pub fn should_exit(&self) -> bool {
        self.should_exit
    }

    /// Mark `command` as in flight
    pub fn begin_step(&mut self, command: StepCommand) {
        self.status = ExecutionStatus::Stepping(command);
    }

    /// Handle a key press
    pub fn handle_key_event(&mut self, event: KeyEvent) -> EventResponse {
        if event.kind != KeyEventKind::Press {
            return EventResponse::NotHandled;
        }

        let command = match event.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_exit = true;
                return EventResponse::Exit;
            }
            KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_exit = true;
                return EventResponse::Exit;
            }
            KeyCode::Char('n') | KeyCode::Char(' ') => StepCommand::Line,
            KeyCode::Char('s') => StepCommand::Opcode,
            _ => return EventResponse::NotHandled,
        };

        if !self.status.can_step() {
            debug!("Ignoring {} step while {:?}", command, self.status);
            return EventResponse::Handled;
        }
        self.begin_step(command);
        EventResponse::Step(command)
    }

    /// Apply the answer to the step in flight
    pub fn apply_report(&mut self, report: Result<FrameReport, String>) {
        match report {
            Ok(FrameReport::Frame(frame)) => {
                self.steps += 1;
                self.refresh_disassembly(&frame.code);
                self.frame = Some(frame);
                self.status = ExecutionStatus::Paused;
            }
            Ok(FrameReport::EndOfStream { uncaught }) => {
                info!("Replay finished");
                self.status = ExecutionStatus::Finished { uncaught };
            }
            Ok(FrameReport::Aborted { reason }) => {
                warn!("Player aborted: {}", reason);
                self.status = ExecutionStatus::Terminated(reason);
            }
            Err(reason) => {
                warn!("Player channel failed: {}", reason);
                self.status = ExecutionStatus::Terminated(reason);
            }
        }
    }

    fn refresh_disassembly(&mut self, code: &Arc<CodeDescriptor>) {
        if let Some((cached, _)) = &self.disassembly {
            if Arc::ptr_eq(cached, code) || **cached == **code {
                return;
            }
        }
        let result = disassemble(code).map_err(|e| e.to_string());
        self.disassembly = Some((code.clone(), result));
    }

    /// Source rows to show in a panel `height` rows tall
    pub fn source_rows(&self, height: usize) -> Vec<SourceRow<'_>> {
        let current = self.frame.as_ref().and_then(|frame| frame.line);
        let context = u32::from(self.config.panels.source.context_rows);
        let start = current.map_or(1, |line| line.saturating_sub(context).max(1));
        self.source
            .numbered_lines()
            .skip_while(|(lineno, _)| *lineno < start)
            .take(height)
            .map(|(lineno, text)| SourceRow { lineno, text, current: Some(lineno) == current })
            .collect()
    }

    /// `name = value` rows of the variables panel
    pub fn variable_rows(&self) -> Vec<String> {
        let Some(frame) = &self.frame else { return Vec::new() };

        let mut rows: Vec<String> =
            frame.locals.iter().map(|(name, value)| format!("{name} = {value}")).collect();
        if !frame.is_module_frame() && self.config.panels.variables.show_globals {
            rows.push("-- globals --".to_string());
            rows.extend(frame.globals.iter().map(|(name, value)| format!("{name} = {value}")));
        }
        rows
    }

    /// Disassembly rows around the current instruction, `(is_current, text)`
    pub fn bytecode_rows(&self, height: usize) -> Vec<(bool, String)> {
        let (Some(frame), Some((_, result))) = (&self.frame, &self.disassembly) else {
            return Vec::new();
        };
        let disassembly = match result {
            Ok(disassembly) => disassembly,
            Err(e) => return vec![(false, format!("bytecode unavailable: {e}"))],
        };

        let offset = frame.instruction_offset;
        let position = disassembly.position_of(offset).unwrap_or(0);
        let start = position.saturating_sub(usize::from(self.config.panels.bytecode.context_rows));
        disassembly
            .instructions
            .iter()
            .skip(start)
            .take(height)
            .map(|inst| {
                let current = inst.offset() == offset;
                let marker = if current { "-->" } else { "   " };
                (current, format!("{marker} {}", inst.render()))
            })
            .collect()
    }

    /// Text of the status line
    pub fn status_text(&self) -> String {
        match &self.status {
            ExecutionStatus::Starting => "starting player...".to_string(),
            ExecutionStatus::Stepping(command) => format!("stepping ({command})..."),
            ExecutionStatus::Paused => match &self.frame {
                Some(frame) => {
                    let file = Path::new(frame.filename())
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_else(|| frame.filename().to_string());
                    let line = frame.line.map_or("-".to_string(), |line| line.to_string());
                    format!(
                        "{file}:{line} in {} at offset {}, step {}",
                        frame.unit_name(),
                        frame.instruction_offset,
                        self.steps
                    )
                }
                None => "paused".to_string(),
            },
            ExecutionStatus::Finished { uncaught: None } => "program finished".to_string(),
            ExecutionStatus::Finished { uncaught: Some(error) } => {
                format!("program raised {error}")
            }
            ExecutionStatus::Terminated(reason) => format!("player terminated: {reason}"),
        }
    }

    /// Render the whole screen
    pub fn render(&self, frame: &mut Frame<'_>) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(1), Constraint::Length(1)])
            .split(frame.area());
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(rows[0]);
        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(columns[1]);

        self.render_source(frame, columns[0]);
        self.render_variables(frame, right[0]);
        self.render_bytecode(frame, right[1]);
        self.render_status(frame, rows[1]);

        let footer = Paragraph::new(FOOTER).style(Style::default().fg(self.colors.help_text()));
        frame.render_widget(footer, rows[2]);
    }

    fn block(&self, title: &str) -> Block<'static> {
        Block::default()
            .borders(Borders::ALL)
            .title(Span::styled(format!(" {title} "), Style::default().fg(self.colors.title())))
            .border_style(Style::default().fg(self.colors.border()))
    }

    fn highlight(&self) -> Style {
        Style::default()
            .bg(self.colors.highlight_bg())
            .fg(self.colors.highlight_fg())
            .add_modifier(Modifier::BOLD)
    }

    fn render_source(&self, frame: &mut Frame<'_>, area: Rect) {
        let height = usize::from(area.height.saturating_sub(2));
        let show_numbers = self.config.panels.source.show_line_numbers;
        let items: Vec<ListItem<'_>> = self
            .source_rows(height)
            .into_iter()
            .map(|row| {
                let mut spans = Vec::new();
                if show_numbers {
                    spans.push(Span::styled(
                        format!("{:>4} ", row.lineno),
                        Style::default().fg(self.colors.line_number()),
                    ));
                }
                spans.push(Span::raw(if row.current { "-> " } else { "   " }));
                spans.push(Span::raw(row.text.to_string()));
                let item = ListItem::new(Line::from(spans));
                if row.current {
                    item.style(self.highlight())
                } else {
                    item
                }
            })
            .collect();

        let title = Path::new(self.source.path())
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.path().to_string());
        frame.render_widget(List::new(items).block(self.block(&title)), area);
    }

    fn render_variables(&self, frame: &mut Frame<'_>, area: Rect) {
        let items: Vec<ListItem<'_>> = self.variable_rows().into_iter().map(ListItem::new).collect();
        frame.render_widget(List::new(items).block(self.block("Variables")), area);
    }

    fn render_bytecode(&self, frame: &mut Frame<'_>, area: Rect) {
        let height = usize::from(area.height.saturating_sub(2));
        let items: Vec<ListItem<'_>> = self
            .bytecode_rows(height)
            .into_iter()
            .map(|(current, text)| {
                let item = ListItem::new(text);
                if current {
                    item.style(self.highlight())
                } else {
                    item
                }
            })
            .collect();

        let title = match &self.frame {
            Some(snapshot) => format!("Bytecode: {}", snapshot.unit_name()),
            None => "Bytecode".to_string(),
        };
        frame.render_widget(List::new(items).block(self.block(&title)), area);
    }

    fn render_status(&self, frame: &mut Frame<'_>, area: Rect) {
        let color = match &self.status {
            ExecutionStatus::Starting | ExecutionStatus::Stepping(_) => self.colors.warning(),
            ExecutionStatus::Paused => self.colors.info(),
            ExecutionStatus::Finished { uncaught: None } => self.colors.success(),
            ExecutionStatus::Finished { .. } | ExecutionStatus::Terminated(_) => {
                self.colors.error()
            }
        };
        let status = Paragraph::new(Line::from(Span::styled(
            self.status_text(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )));
        frame.render_widget(status, area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};
    use rdb_common::{
        types::{Bindings, LineRange},
        Opcode,
    };

    const SOURCE: &str = "def f(a):\n    return a\nx = 1\nprint(f(x))\n";

    fn descriptor(name: &str) -> Arc<CodeDescriptor> {
        Arc::new(CodeDescriptor {
            filename: "/tmp/prog.pyl".into(),
            name: name.into(),
            instructions: vec![
                Opcode::LOAD_CONST as u8,
                0,
                Opcode::STORE_NAME as u8,
                0,
                Opcode::LOAD_CONST as u8,
                1,
                Opcode::RETURN_VALUE as u8,
                0,
            ],
            constants: vec!["1".into(), "None".into()],
            names: vec!["x".into()],
            local_names: vec![],
            line_table: vec![
                LineRange { start: 0, end: 4, line: Some(3) },
                LineRange { start: 4, end: 8, line: None },
            ],
        })
    }

    fn frame(code: Arc<CodeDescriptor>, line: u32, offset: usize) -> FrameSnapshot {
        let bindings = |pairs: &[(&str, &str)]| -> Bindings {
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
        };
        FrameSnapshot {
            line: Some(line),
            instruction_offset: offset,
            locals: bindings(&[("a", "1")]),
            globals: bindings(&[("x", "1")]),
            code,
        }
    }

    fn app() -> App {
        App::new(SourceFile::from_text("/tmp/prog.pyl", SOURCE), Config::default())
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_keys_map_to_steps() {
        let mut app = app();
        // nothing to step until the first frame arrives
        assert_eq!(app.handle_key_event(key(KeyCode::Char('n'))), EventResponse::Handled);

        app.apply_report(Ok(FrameReport::Frame(frame(descriptor("<module>"), 3, 0))));
        assert_eq!(
            app.handle_key_event(key(KeyCode::Char(' '))),
            EventResponse::Step(StepCommand::Line)
        );
        assert_eq!(app.status(), &ExecutionStatus::Stepping(StepCommand::Line));
        // one step in flight at a time
        assert_eq!(app.handle_key_event(key(KeyCode::Char('s'))), EventResponse::Handled);

        app.apply_report(Ok(FrameReport::Frame(frame(descriptor("<module>"), 3, 2))));
        assert_eq!(
            app.handle_key_event(key(KeyCode::Char('s'))),
            EventResponse::Step(StepCommand::Opcode)
        );
        assert_eq!(app.handle_key_event(key(KeyCode::Char('x'))), EventResponse::NotHandled);
        assert_eq!(app.handle_key_event(key(KeyCode::Esc)), EventResponse::Exit);
        assert!(app.should_exit());
    }

    #[test]
    fn test_final_reports() {
        let mut app = app();
        app.apply_report(Ok(FrameReport::EndOfStream { uncaught: None }));
        assert!(app.status().is_final());
        assert_eq!(app.status_text(), "program finished");
        assert_eq!(app.handle_key_event(key(KeyCode::Char('n'))), EventResponse::Handled);

        let mut app = self::app();
        app.apply_report(Err("channel closed by peer".into()));
        assert_eq!(app.status_text(), "player terminated: channel closed by peer");
    }

    #[test]
    fn test_source_window_follows_current_line() {
        let mut app = app();
        assert_eq!(app.source_rows(2).len(), 2);
        app.apply_report(Ok(FrameReport::Frame(frame(descriptor("<module>"), 4, 0))));
        let rows = app.source_rows(10);
        assert_eq!(rows.first().map(|row| row.lineno), Some(1));
        let current: Vec<_> = rows.iter().filter(|row| row.current).collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].text, "print(f(x))");
    }

    #[test]
    fn test_variables_include_globals_in_functions() {
        let mut app = app();
        app.apply_report(Ok(FrameReport::Frame(frame(descriptor("<module>"), 3, 0))));
        assert_eq!(app.variable_rows(), vec!["a = 1"]);

        app.apply_report(Ok(FrameReport::Frame(frame(descriptor("f"), 2, 0))));
        assert_eq!(app.variable_rows(), vec!["a = 1", "-- globals --", "x = 1"]);

        app.config.panels.variables.show_globals = false;
        assert_eq!(app.variable_rows(), vec!["a = 1"]);
    }

    #[test]
    fn test_bytecode_marks_current_offset() {
        let mut app = app();
        app.apply_report(Ok(FrameReport::Frame(frame(descriptor("<module>"), 3, 2))));
        let rows = app.bytecode_rows(10);
        assert_eq!(rows.len(), 4);
        assert!(rows[1].0);
        assert!(rows[1].1.starts_with("-->"));
        assert!(rows[1].1.contains("STORE_NAME"));
    }

    #[test]
    fn test_render_draws_all_panels() {
        let mut app = app();
        app.apply_report(Ok(FrameReport::Frame(frame(descriptor("<module>"), 3, 0))));

        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal.draw(|f| app.render(f)).unwrap();
        let screen: String =
            terminal.backend().buffer().content.iter().map(|cell| cell.symbol()).collect();

        assert!(screen.contains("prog.pyl"));
        assert!(screen.contains("Variables"));
        assert!(screen.contains("Bytecode: <module>"));
        assert!(screen.contains("prog.pyl:3 in <module> at offset 0, step 1"));
        assert!(screen.contains(FOOTER));
    }
}
