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

//! A loaded, compiled program

use std::{
    fs, io,
    path::{Path, PathBuf},
    rc::Rc,
};

use thiserror::Error;
use tracing::debug;

use crate::{
    compiler::{compile, Code},
    context::ExecutionContext,
    lang::CompileError,
    record_log::record_log_path,
};

/// Why a program could not be loaded
#[derive(Debug, Error)]
pub enum LoadError {
    /// The program file is missing or unreadable
    #[error("can't read program file '{}'", path.display())]
    Read {
        /// Path as given
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: io::Error,
    },

    /// The program text does not compile
    #[error("{}: {error}", path.display())]
    Compile {
        /// Resolved path
        path: PathBuf,
        /// Compilation failure
        #[source]
        error: CompileError,
    },
}

/// Program text and its compiled module body
#[derive(Debug, Clone)]
pub struct Program {
    path: PathBuf,
    filename: String,
    source: String,
    code: Rc<Code>,
}

impl Program {
    /// Read and compile the program at `path`
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let read_error = |source| LoadError::Read { path: path.to_path_buf(), source };
        let resolved = path.canonicalize().map_err(read_error)?;
        if !resolved.is_file() {
            return Err(read_error(io::Error::new(io::ErrorKind::InvalidInput, "not a file")));
        }
        let source = fs::read_to_string(&resolved).map_err(read_error)?;

        let filename = resolved.to_string_lossy().into_owned();
        let code = compile(&filename, &source)
            .map_err(|error| LoadError::Compile { path: resolved.clone(), error })?;
        debug!(program = %filename, bytes = code.descriptor.instructions.len(), "program compiled");

        Ok(Self { path: resolved, filename, source, code })
    }

    /// Compile `source` as if it were the file `filename`
    pub fn from_source(filename: &str, source: &str) -> Result<Self, CompileError> {
        let code = compile(filename, source)?;
        Ok(Self {
            path: PathBuf::from(filename),
            filename: filename.to_string(),
            source: source.to_string(),
            code,
        })
    }

    /// Resolved path of the program file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Identity of the source unit, as stored in code descriptors
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Program text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Compiled module body
    pub fn code(&self) -> Rc<Code> {
        self.code.clone()
    }

    /// Where the record log of this program lives
    pub fn record_log_path(&self) -> PathBuf {
        record_log_path(&self.path)
    }

    /// Fresh execution context for one run of this program
    pub fn new_context(&self) -> ExecutionContext {
        ExecutionContext::new(&self.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_resolves_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog.pyl");
        fs::write(&path, "x = 1\n").unwrap();

        let program = Program::load(&path).unwrap();
        assert!(program.path().is_absolute());
        assert_eq!(program.filename(), program.code().descriptor.filename);
        assert_eq!(
            program.record_log_path().file_name().unwrap().to_string_lossy(),
            "prog.pyl-records"
        );
    }

    #[test]
    fn test_missing_file() {
        let err = Program::load(Path::new("/definitely/not/here.pyl")).unwrap_err();
        assert_eq!(err.to_string(), "can't read program file '/definitely/not/here.pyl'");
    }

    #[test]
    fn test_directory_is_not_a_program() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(Program::load(dir.path()), Err(LoadError::Read { .. })));
    }

    #[test]
    fn test_syntax_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.pyl");
        fs::write(&path, "x = = 1\n").unwrap();
        assert!(matches!(Program::load(&path), Err(LoadError::Compile { .. })));
    }
}
