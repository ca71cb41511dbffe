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

//! RDB Engine - interpreter, execution hook, recorder and player

pub mod compiler;
pub mod context;
pub mod lang;
pub mod program;
pub mod record_log;
pub mod vm;

pub mod core;
pub use self::core::*;

pub mod inspector;
pub use inspector::*;

pub mod player;
pub use player::*;

pub mod recorder;
pub use recorder::*;

pub use context::ExecutionContext;
pub use program::{LoadError, Program};
pub use record_log::{record_log_path, RecordLogError, RecordReader, RecordWriter};
