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

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Structural, serializable form of a value returned by an external call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordedValue {
    /// The `None` singleton
    None,
    /// A boolean
    Bool(bool),
    /// A 64-bit integer
    Int(i64),
    /// A float
    Float(f64),
    /// A string
    Str(String),
    /// A list of recorded values
    List(Vec<RecordedValue>),
}

impl fmt::Display for RecordedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => f.write_str(&format_float(*x)),
            Self::Str(s) => f.write_str(&quote_str(s)),
            Self::List(items) => write!(f, "[{}]", items.iter().join(", ")),
        }
    }
}

/// Tag of a record log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
pub enum RecordTag {
    /// The entry carries a value
    #[display("NORMAL")]
    Normal,
    /// The captured value had no structural form
    #[display("UNREPRESENTABLE")]
    Unrepresentable,
}

/// One result of an external call, in call order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordEntry {
    /// The call returned a value with a structural form
    Normal(RecordedValue),
    /// The call returned something that could not be serialized
    Unrepresentable,
}

impl RecordEntry {
    /// Tag of this entry
    pub fn tag(&self) -> RecordTag {
        match self {
            Self::Normal(_) => RecordTag::Normal,
            Self::Unrepresentable => RecordTag::Unrepresentable,
        }
    }

    /// Value carried by this entry, present only for `Normal` entries
    pub fn value(&self) -> Option<&RecordedValue> {
        match self {
            Self::Normal(value) => Some(value),
            Self::Unrepresentable => None,
        }
    }
}

/// Render a float the way the scripting language displays it.
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        format!("{x:?}")
    }
}

/// Quote a string the way the scripting language displays it: single quotes unless the
/// text contains a single quote and no double quote.
pub fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let value = RecordedValue::List(vec![
            RecordedValue::Int(1),
            RecordedValue::Str("a".into()),
            RecordedValue::None,
            RecordedValue::Float(2.0),
            RecordedValue::Bool(true),
        ]);
        assert_eq!(value.to_string(), "[1, 'a', None, 2.0, True]");
    }

    #[test]
    fn test_quote_str() {
        assert_eq!(quote_str("it's"), "\"it's\"");
        assert_eq!(quote_str("a\nb"), "'a\\nb'");
        assert_eq!(quote_str("both ' and \""), "'both \\' and \"'");
    }

    #[test]
    fn test_entry_tag() {
        assert_eq!(RecordEntry::Normal(RecordedValue::None).tag(), RecordTag::Normal);
        assert_eq!(RecordEntry::Unrepresentable.tag().to_string(), "UNREPRESENTABLE");
        assert!(RecordEntry::Unrepresentable.value().is_none());
    }
}
