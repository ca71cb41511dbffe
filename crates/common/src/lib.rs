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
//! RDB Common - Shared functionality for RDB components
//!
//! This crate provides the pieces shared by the replay engine, the player
//! process and the debugger front ends: the data model, the frame snapshot
//! codec, the instruction set, and the step-control wire protocol.

/// Common types used throughout RDB including code descriptors, snapshots and log entries
pub mod types;

/// Synchronous request/response step-control channel between player and front end
pub mod channel;
/// Binary encoding of frame snapshots for the control channel
pub mod codec;
/// Environment variable names understood by RDB components
pub mod env;
/// Logging setup and utilities for consistent logging across RDB components
pub mod logging;
/// Instruction set, instruction decoding and disassembly
pub mod opcode;
/// Source file access for front ends
pub mod source;

pub use channel::*;
pub use codec::*;
pub use logging::*;
pub use opcode::*;
pub use source::*;
