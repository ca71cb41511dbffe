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

//! Source file access for the debugger front ends.

use std::{fs, io, path::Path};

/// Number of rows shown around the current line by [`SourceFile::render_window`]
pub const MAX_SOURCE_ROWS: u32 = 20;

/// The text of a program, split into numbered lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    path: String,
    lines: Vec<String>,
}

impl SourceFile {
    /// Read a source file from disk
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Ok(Self::from_text(path.display().to_string(), &text))
    }

    /// Build a source file from text already in memory
    pub fn from_text(path: impl Into<String>, text: &str) -> Self {
        Self { path: path.into(), lines: text.lines().map(str::to_string).collect() }
    }

    /// Path the text was read from
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of lines
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Text of 1-based line `lineno`, `None` past the end of the file
    pub fn line(&self, lineno: u32) -> Option<&str> {
        let idx = usize::try_from(lineno).ok()?.checked_sub(1)?;
        self.lines.get(idx).map(String::as_str)
    }

    /// All lines with their 1-based numbers
    pub fn numbered_lines(&self) -> impl Iterator<Item = (u32, &str)> + '_ {
        self.lines.iter().enumerate().map(|(idx, line)| (idx as u32 + 1, line.as_str()))
    }

    /// Lines from `lineno - rows / 2` to `rows` lines after that, clamped to the file
    pub fn window(&self, lineno: u32, rows: u32) -> impl Iterator<Item = (u32, &str)> + '_ {
        let start = lineno.saturating_sub(rows / 2).max(1);
        let end = start + rows;
        self.numbered_lines().filter(move |(n, _)| (start..=end).contains(n))
    }

    /// Render the window around `current`, marking it with `-->`
    pub fn render_window(&self, current: u32) -> String {
        let mut out = String::new();
        for (lineno, line) in self.window(current, MAX_SOURCE_ROWS) {
            if lineno == current {
                out.push_str(&format!("--> {line}\n"));
            } else {
                out.push_str(&format!("{lineno:>3} {line}\n"));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: u32) -> SourceFile {
        let text: String = (1..=n).map(|i| format!("x{i} = {i}\n")).collect();
        SourceFile::from_text("prog.pyl", &text)
    }

    #[test]
    fn test_line_access() {
        let source = SourceFile::from_text("prog.pyl", "x = 1\nprint(x)\n");
        assert_eq!(source.line_count(), 2);
        assert_eq!(source.line(1), Some("x = 1"));
        assert_eq!(source.line(2), Some("print(x)"));
        assert_eq!(source.line(0), None);
        assert_eq!(source.line(3), None);
    }

    #[test]
    fn test_window_is_clamped() {
        let source = numbered(50);
        let first: Vec<_> = source.window(3, MAX_SOURCE_ROWS).map(|(n, _)| n).collect();
        assert_eq!(first.first(), Some(&1));
        assert_eq!(first.last(), Some(&21));

        let middle: Vec<_> = source.window(30, MAX_SOURCE_ROWS).map(|(n, _)| n).collect();
        assert_eq!(middle.first(), Some(&20));
        assert_eq!(middle.last(), Some(&40));

        assert_eq!(source.window(50, MAX_SOURCE_ROWS).last().map(|(n, _)| n), Some(50));
    }

    #[test]
    fn test_render_marks_current_line() {
        let rendered = numbered(3).render_window(2);
        assert_eq!(rendered, "  1 x1 = 1\n--> x2 = 2\n  3 x3 = 3\n");
    }
}
