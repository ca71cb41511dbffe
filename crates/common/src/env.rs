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

//! Environment variable name constants for RDB configuration.
//!
//! - [`RDB_PLAYER_BIN`] - Executable spawned as the replay player
//! - [`RDB_CONFIG_PATH`] - Location of the front-end configuration file

/// Environment variable overriding the executable the front ends spawn as the player.
///
/// The executable is invoked as `<bin> player <program>` and must speak the step
/// control protocol on its stdin/stdout.
///
/// # Default
///
/// When not set, the front ends re-invoke the current executable.
pub const RDB_PLAYER_BIN: &str = "RDB_PLAYER_BIN";

/// Environment variable overriding the path of the front-end configuration file.
///
/// # Default
///
/// `~/.rdb.toml`
pub const RDB_CONFIG_PATH: &str = "RDB_CONFIG_PATH";

/// Executable the front ends spawn as the player: [`RDB_PLAYER_BIN`] when set,
/// the current executable otherwise.
pub fn player_executable() -> std::io::Result<std::path::PathBuf> {
    match std::env::var_os(RDB_PLAYER_BIN) {
        Some(bin) if !bin.is_empty() => Ok(bin.into()),
        _ => std::env::current_exe(),
    }
}
