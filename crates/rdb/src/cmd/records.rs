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

//! Records command - dump a record log as JSON lines

use crate::utils::{init_console_logging, load_program};
use eyre::{Result, WrapErr};
use rdb_common::types::RecordEntry;
use rdb_engine::RecordReader;
use serde_json::{json, Value};
use std::{
    io::{self, Write},
    path::Path,
    process::ExitCode,
};

/// JSON form of one entry: `{"index", "tag", "value"}`, `value` being the
/// display form of the recorded value or `null`
pub fn entry_json(index: usize, entry: &RecordEntry) -> Value {
    json!({
        "index": index,
        "tag": entry.tag().to_string(),
        "value": entry.value().map(ToString::to_string),
    })
}

/// Print every entry of the record log of the program at `path`
pub fn dump_records(path: &Path) -> Result<ExitCode> {
    init_console_logging()?;
    let program = load_program(path)?;
    let log_path = program.record_log_path();

    let mut reader = RecordReader::open(&log_path)
        .wrap_err_with(|| format!("cannot open record log {}", log_path.display()))?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    while let Some(entry) = reader.try_next_entry()? {
        let index = reader.consumed() - 1;
        writeln!(out, "{}", entry_json(index, &entry))?;
    }
    out.flush()?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdb_common::types::RecordedValue;

    #[test]
    fn test_entry_json() {
        let normal = RecordEntry::Normal(RecordedValue::Str("hi".into()));
        assert_eq!(
            entry_json(0, &normal).to_string(),
            r#"{"index":0,"tag":"NORMAL","value":"'hi'"}"#
        );
        assert_eq!(
            entry_json(3, &RecordEntry::Unrepresentable).to_string(),
            r#"{"index":3,"tag":"UNREPRESENTABLE","value":null}"#
        );
    }
}
