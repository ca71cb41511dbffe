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

//! Errors raised while executing a program

use std::fmt;

use rdb_common::DecodeError;
use thiserror::Error;

use crate::inspector::HookError;

/// Category of a program-level error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unbound name
    NameError,
    /// Operation applied to a value of the wrong type
    TypeError,
    /// Right type, unacceptable value
    ValueError,
    /// Division or modulo by zero
    ZeroDivisionError,
    /// Sequence index out of range
    IndexError,
    /// Integer result out of range
    OverflowError,
    /// Call depth exceeded
    RecursionError,
    /// `input()` hit the end of its input
    EOFError,
    /// Host I/O failed
    OSError,
}

impl ErrorKind {
    /// Name shown in error reports
    pub fn name(&self) -> &'static str {
        match self {
            Self::NameError => "NameError",
            Self::TypeError => "TypeError",
            Self::ValueError => "ValueError",
            Self::ZeroDivisionError => "ZeroDivisionError",
            Self::IndexError => "IndexError",
            Self::OverflowError => "OverflowError",
            Self::RecursionError => "RecursionError",
            Self::EOFError => "EOFError",
            Self::OSError => "OSError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An error raised by the program itself; it always ends the run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{kind}: {message}", line_prefix(.line))]
pub struct RuntimeError {
    /// Category
    pub kind: ErrorKind,
    /// Human readable detail
    pub message: String,
    /// Line of the innermost frame when the error was raised
    pub line: Option<u32>,
}

fn line_prefix(line: &Option<u32>) -> String {
    line.map(|line| format!("line {line}: ")).unwrap_or_default()
}

impl RuntimeError {
    /// Create an error that is not yet attributed to a line
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), line: None }
    }

    /// Shorthand for a `TypeError`
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    /// Shorthand for a `ValueError`
    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValueError, message)
    }

    /// Attribute the error to `line` unless it already has one
    pub fn at_line(mut self, line: Option<u32>) -> Self {
        if self.line.is_none() {
            self.line = line;
        }
        self
    }
}

/// Why [`crate::vm::Vm::resume`] stopped without finishing
#[derive(Debug, Error)]
pub enum VmError {
    /// The program raised an error
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// The execution hook failed
    #[error("execution hook failed: {0}")]
    Hook(#[from] HookError),

    /// The instruction stream could not be decoded
    #[error("corrupt instruction stream: {0}")]
    Decode(#[from] DecodeError),

    /// The interpreter reached a state the compiler never produces
    #[error("internal interpreter error: {0}")]
    Internal(String),
}
