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

//! Front half of the host interpreter: tokenizer, syntax tree and parser for the
//! scripting language the debugger runs.
//!
//! The language is a small indentation-structured subset in the style of Python:
//! integers, floats, strings, lists, functions, `if`/`elif`/`else`, `while`,
//! `break`/`continue`, and calls into builtins.

use thiserror::Error;

pub mod ast;
pub mod lexer;
pub mod parser;

pub use parser::parse;

/// A program text that could not be turned into code
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: SyntaxError: {message}")]
pub struct CompileError {
    /// 1-based line the problem was found on
    pub line: u32,
    /// What is wrong
    pub message: String,
}

impl CompileError {
    /// Create an error at `line`
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        Self { line, message: message.into() }
    }
}
