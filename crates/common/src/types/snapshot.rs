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

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};

use super::CodeDescriptor;

/// Name bindings of a frame rendered for display: name to display string.
pub type Bindings = BTreeMap<String, String>;

/// Where execution is paused and what the paused frame can see.
///
/// Created fresh at each reported boundary and never mutated afterwards. The code
/// descriptor is shared with every other snapshot of the same unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    /// Current source line, `None` inside synthetic regions
    pub line: Option<u32>,
    /// Byte offset of the next instruction to execute
    pub instruction_offset: usize,
    /// Local bindings; the global namespace at module level
    pub locals: Bindings,
    /// Global bindings
    pub globals: Bindings,
    /// The executing code unit
    pub code: Arc<CodeDescriptor>,
}

impl FrameSnapshot {
    /// Path of the source file the frame is executing
    pub fn filename(&self) -> &str {
        &self.code.filename
    }

    /// Name of the executing code unit
    pub fn unit_name(&self) -> &str {
        &self.code.name
    }

    /// Whether the frame executes a module body rather than a function
    pub fn is_module_frame(&self) -> bool {
        self.code.is_module()
    }
}
