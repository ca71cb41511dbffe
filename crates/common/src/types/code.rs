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

use serde::{Deserialize, Serialize};

/// Name given to the code unit of a module body.
pub const MODULE_UNIT_NAME: &str = "<module>";

/// One contiguous range of the instruction stream attributed to a single source line.
///
/// A range whose `line` is `None` is synthetic: the compiler produced it without a
/// corresponding source line (implicit returns, loop back-edges, branch exits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    /// First byte offset covered by this range
    pub start: usize,
    /// One past the last byte offset covered by this range
    pub end: usize,
    /// Source line of the instructions in this range, if any
    pub line: Option<u32>,
}

impl LineRange {
    /// Whether `offset` falls inside this range
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

/// Immutable description of one executable unit (module body or function body).
///
/// Produced once by the compiler and shared read-only by every frame snapshot that
/// refers to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeDescriptor {
    /// Identity of the source unit, the absolute path of the program file
    pub filename: String,
    /// Name of the unit, `<module>` or the function name
    pub name: String,
    /// Raw wordcode: `(opcode, operand)` byte pairs
    pub instructions: Vec<u8>,
    /// Constant operands rendered as display strings
    pub constants: Vec<String>,
    /// Global name operands
    pub names: Vec<String>,
    /// Local variable slot names
    pub local_names: Vec<String>,
    /// Line ranges partitioning `[0, instructions.len())` in offset order
    pub line_table: Vec<LineRange>,
}

impl CodeDescriptor {
    /// Whether this descriptor describes a module body
    pub fn is_module(&self) -> bool {
        self.name == MODULE_UNIT_NAME
    }

    /// Source line of the instruction at `offset`, `None` for synthetic regions
    /// and offsets outside the instruction stream.
    pub fn line_for_offset(&self, offset: usize) -> Option<u32> {
        let idx = self.line_table.partition_point(|range| range.end <= offset);
        self.line_table.get(idx).filter(|range| range.contains(offset)).and_then(|range| range.line)
    }

    /// First offset attributed to `line`, if the line has code
    pub fn first_offset_of_line(&self, line: u32) -> Option<usize> {
        self.line_table.iter().find(|range| range.line == Some(line)).map(|range| range.start)
    }

    /// Check that the line table partitions the instruction stream.
    pub fn line_table_is_partition(&self) -> bool {
        let mut expected = 0;
        for range in &self.line_table {
            if range.start != expected || range.end <= range.start {
                return false;
            }
            expected = range.end;
        }
        expected == self.instructions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> CodeDescriptor {
        CodeDescriptor {
            filename: "/tmp/prog.pyl".to_string(),
            name: MODULE_UNIT_NAME.to_string(),
            instructions: vec![0; 12],
            constants: vec![],
            names: vec![],
            local_names: vec![],
            line_table: vec![
                LineRange { start: 0, end: 4, line: Some(1) },
                LineRange { start: 4, end: 8, line: Some(2) },
                LineRange { start: 8, end: 12, line: None },
            ],
        }
    }

    #[test]
    fn test_line_lookup() {
        let code = descriptor();
        assert_eq!(code.line_for_offset(0), Some(1));
        assert_eq!(code.line_for_offset(2), Some(1));
        assert_eq!(code.line_for_offset(4), Some(2));
        assert_eq!(code.line_for_offset(10), None);
        assert_eq!(code.line_for_offset(12), None);
        assert_eq!(code.first_offset_of_line(2), Some(4));
        assert_eq!(code.first_offset_of_line(3), None);
    }

    #[test]
    fn test_partition_check() {
        let mut code = descriptor();
        assert!(code.line_table_is_partition());
        assert!(code.is_module());

        code.line_table[1].start = 5;
        assert!(!code.line_table_is_partition());
    }
}
