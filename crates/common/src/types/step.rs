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

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Granularity of a single replay step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepCommand {
    /// Run to the next source line boundary
    Line,
    /// Run to the next instruction boundary
    Opcode,
}

impl StepCommand {
    /// Wire token of the command
    pub fn token(&self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Opcode => "opcode",
        }
    }
}

impl fmt::Display for StepCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Error returned when a step token is not recognised
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized step command '{0}'")]
pub struct UnknownStepCommand(pub String);

impl FromStr for StepCommand {
    type Err = UnknownStepCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "line" => Ok(Self::Line),
            "opcode" => Ok(Self::Opcode),
            other => Err(UnknownStepCommand(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens() {
        assert_eq!("line".parse::<StepCommand>(), Ok(StepCommand::Line));
        assert_eq!("opcode".parse::<StepCommand>(), Ok(StepCommand::Opcode));
        assert_eq!(StepCommand::Opcode.to_string(), "opcode");
        assert!("LINE".parse::<StepCommand>().is_err());
    }
}
