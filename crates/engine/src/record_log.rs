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

//! Record log: the ordered results of every external call of a recorded run
//!
//! Entries are bincode-encoded back to back, with no header and no length prefix.
//! The log lives next to the program as `<program-file-name>-records`.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use rdb_common::types::RecordEntry;
use thiserror::Error;
use tracing::debug;

/// Suffix appended to the program file name to form the log file name
pub const RECORD_LOG_SUFFIX: &str = "-records";

/// Errors of the record log
#[derive(Debug, Error)]
pub enum RecordLogError {
    /// The log file could not be read or written
    #[error("record log I/O failed: {0}")]
    Io(#[from] io::Error),

    /// Replay asked for more entries than were recorded
    #[error("record log exhausted after {consumed} entries")]
    Underrun {
        /// Entries consumed before the log ran out
        consumed: usize,
    },

    /// An entry could not be encoded or decoded
    #[error("corrupt record log entry: {0}")]
    Corrupt(#[from] bincode::Error),
}

/// Location of the record log of `program`
pub fn record_log_path(program: &Path) -> PathBuf {
    let name = program.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    program.with_file_name(format!("{name}{RECORD_LOG_SUFFIX}"))
}

/// Appends entries to a record log
#[derive(Debug)]
pub struct RecordWriter<W: Write> {
    inner: W,
    written: usize,
}

impl RecordWriter<BufWriter<File>> {
    /// Create (or truncate) the log at `path`
    pub fn create(path: &Path) -> Result<Self, RecordLogError> {
        debug!(path = %path.display(), "creating record log");
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> RecordWriter<W> {
    /// Write entries to `inner`
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Append one entry
    pub fn append(&mut self, entry: &RecordEntry) -> Result<(), RecordLogError> {
        bincode::serialize_into(&mut self.inner, entry)?;
        self.written += 1;
        Ok(())
    }

    /// Push buffered entries to the underlying writer
    pub fn flush(&mut self) -> Result<(), RecordLogError> {
        self.inner.flush()?;
        Ok(())
    }

    /// Number of entries appended so far
    pub fn entries_written(&self) -> usize {
        self.written
    }

    /// Flush and hand back the underlying writer
    pub fn finish(mut self) -> Result<W, RecordLogError> {
        self.flush()?;
        Ok(self.inner)
    }
}

/// Reads entries of a record log in order
#[derive(Debug)]
pub struct RecordReader<R: BufRead> {
    inner: R,
    consumed: usize,
}

impl RecordReader<BufReader<File>> {
    /// Open the log at `path`
    pub fn open(path: &Path) -> Result<Self, RecordLogError> {
        debug!(path = %path.display(), "opening record log");
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> RecordReader<R> {
    /// Read entries from `inner`
    pub fn new(inner: R) -> Self {
        Self { inner, consumed: 0 }
    }

    /// Next entry, or `None` at the end of the log
    pub fn try_next_entry(&mut self) -> Result<Option<RecordEntry>, RecordLogError> {
        if self.inner.fill_buf()?.is_empty() {
            return Ok(None);
        }
        let entry = bincode::deserialize_from(&mut self.inner)?;
        self.consumed += 1;
        Ok(Some(entry))
    }

    /// Next entry; running out is an underrun
    pub fn next_entry(&mut self) -> Result<RecordEntry, RecordLogError> {
        self.try_next_entry()?.ok_or(RecordLogError::Underrun { consumed: self.consumed })
    }

    /// Number of entries consumed so far
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Read every remaining entry
    pub fn read_to_end(&mut self) -> Result<Vec<RecordEntry>, RecordLogError> {
        let mut entries = Vec::new();
        while let Some(entry) = self.try_next_entry()? {
            entries.push(entry);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rdb_common::types::RecordedValue;

    use super::*;

    fn sample() -> Vec<RecordEntry> {
        vec![
            RecordEntry::Normal(RecordedValue::None),
            RecordEntry::Unrepresentable,
            RecordEntry::Normal(RecordedValue::List(vec![
                RecordedValue::Int(1),
                RecordedValue::Str("two".to_string()),
            ])),
        ]
    }

    #[test]
    fn test_entries_come_back_in_order() {
        let mut writer = RecordWriter::new(Vec::new());
        for entry in sample() {
            writer.append(&entry).unwrap();
        }
        assert_eq!(writer.entries_written(), 3);
        let bytes = writer.finish().unwrap();

        let mut reader = RecordReader::new(Cursor::new(bytes));
        assert_eq!(reader.read_to_end().unwrap(), sample());
        assert_eq!(reader.consumed(), 3);
        assert!(reader.try_next_entry().unwrap().is_none());
    }

    #[test]
    fn test_underrun_reports_consumed_entries() {
        let mut writer = RecordWriter::new(Vec::new());
        writer.append(&RecordEntry::Normal(RecordedValue::Int(5))).unwrap();
        let mut reader = RecordReader::new(Cursor::new(writer.finish().unwrap()));

        reader.next_entry().unwrap();
        let err = reader.next_entry().unwrap_err();
        assert!(matches!(err, RecordLogError::Underrun { consumed: 1 }));
        assert_eq!(err.to_string(), "record log exhausted after 1 entries");
    }

    #[test]
    fn test_truncated_entry_is_corrupt() {
        let mut writer = RecordWriter::new(Vec::new());
        writer.append(&RecordEntry::Normal(RecordedValue::Str("hello".to_string()))).unwrap();
        let mut bytes = writer.finish().unwrap();
        bytes.truncate(bytes.len() - 2);

        let mut reader = RecordReader::new(Cursor::new(bytes));
        assert!(matches!(reader.next_entry(), Err(RecordLogError::Corrupt(_))));
    }

    #[test]
    fn test_log_path_sits_next_to_program() {
        assert_eq!(
            record_log_path(Path::new("/work/demo.pyl")),
            PathBuf::from("/work/demo.pyl-records")
        );
    }

    #[test]
    fn test_create_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog.pyl-records");
        std::fs::write(&path, b"stale bytes").unwrap();

        RecordWriter::create(&path).unwrap().finish().unwrap();
        assert!(std::fs::read(&path).unwrap().is_empty());
        assert!(RecordReader::open(&path).unwrap().try_next_entry().unwrap().is_none());
    }
}
