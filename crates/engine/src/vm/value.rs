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

//! Runtime values of the scripting language

use std::{cell::RefCell, fmt, rc::Rc};

use itertools::Itertools;
use rdb_common::types::{format_float, quote_str, RecordedValue};

use super::{ErrorKind, RuntimeError, RECURSION_LIMIT};
use crate::{
    compiler::{Code, Constant},
    context::Host,
};

/// Shared, mutable list storage
pub type ListRef = Rc<RefCell<Vec<Value>>>;

/// Signature of a host function callable from the program
pub type NativeFn = Rc<dyn Fn(&mut Host, Vec<Value>) -> Result<Value, RuntimeError>>;

/// A value on the operand stack or in a namespace
#[derive(Clone)]
pub enum Value {
    /// `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// 64-bit integer
    Int(i64),
    /// Double precision float
    Float(f64),
    /// Immutable string
    Str(Rc<str>),
    /// Mutable list, shared by reference
    List(ListRef),
    /// Interpreted function
    Function(Rc<Function>),
    /// Function implemented by the host
    Builtin(Rc<NativeFunction>),
    /// Compiled body awaiting `MAKE_FUNCTION`
    Code(Rc<Code>),
    /// Host object with no structural form
    Opaque(Rc<Opaque>),
}

/// A function defined by the program
#[derive(Debug)]
pub struct Function {
    /// Compiled body
    pub code: Rc<Code>,
}

impl Function {
    /// Name the function was defined with
    pub fn name(&self) -> &str {
        self.code.name()
    }

    /// Source file the function was defined in
    pub fn filename(&self) -> &str {
        &self.code.descriptor.filename
    }
}

/// A function implemented by the host
pub struct NativeFunction {
    /// Name used in reprs and error messages
    pub name: String,
    /// Implementation
    pub func: NativeFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Host objects the program can hold but not look into
#[derive(Debug)]
pub enum Opaque {
    /// Result of `lock()`
    Lock,
    /// Stand-in for a value that could not be recorded
    Placeholder,
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            other => f.write_str(&other.repr()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }
}

impl Value {
    /// Wrap a host closure as a callable value
    pub fn native(
        name: impl Into<String>,
        func: impl Fn(&mut Host, Vec<Value>) -> Result<Value, RuntimeError> + 'static,
    ) -> Self {
        Self::Builtin(Rc::new(NativeFunction { name: name.into(), func: Rc::new(func) }))
    }

    /// Placeholder standing in for an unrepresentable recorded value
    pub fn placeholder() -> Self {
        Self::Opaque(Rc::new(Opaque::Placeholder))
    }

    /// Materialise a compile-time constant
    pub fn from_constant(constant: &Constant) -> Self {
        match constant {
            Constant::None => Self::None,
            Constant::Bool(b) => Self::Bool(*b),
            Constant::Int(i) => Self::Int(*i),
            Constant::Float(x) => Self::Float(*x),
            Constant::Str(s) => Self::Str(s.clone()),
            Constant::Code(code) => Self::Code(code.clone()),
        }
    }

    /// Rebuild a value from its recorded form
    pub fn from_recorded(value: &RecordedValue) -> Self {
        match value {
            RecordedValue::None => Self::None,
            RecordedValue::Bool(b) => Self::Bool(*b),
            RecordedValue::Int(i) => Self::Int(*i),
            RecordedValue::Float(x) => Self::Float(*x),
            RecordedValue::Str(s) => Self::from(s.as_str()),
            RecordedValue::List(items) => items.iter().map(Self::from_recorded).collect_vec().into(),
        }
    }

    /// Structural form of the value, `None` when it has none
    pub fn to_recorded(&self) -> Option<RecordedValue> {
        self.to_recorded_guarded(&mut Vec::new())
    }

    fn to_recorded_guarded(&self, seen: &mut Vec<ListRef>) -> Option<RecordedValue> {
        Some(match self {
            Self::None => RecordedValue::None,
            Self::Bool(b) => RecordedValue::Bool(*b),
            Self::Int(i) => RecordedValue::Int(*i),
            Self::Float(x) => RecordedValue::Float(*x),
            Self::Str(s) => RecordedValue::Str(s.to_string()),
            Self::List(list) => {
                let revisited = seen.iter().any(|outer| Rc::ptr_eq(outer, list));
                if revisited || seen.len() >= RECURSION_LIMIT {
                    return None;
                }
                seen.push(list.clone());
                let items = list
                    .borrow()
                    .iter()
                    .map(|item| item.to_recorded_guarded(seen))
                    .collect::<Option<Vec<_>>>();
                seen.pop();
                RecordedValue::List(items?)
            }
            Self::Function(_) | Self::Builtin(_) | Self::Code(_) | Self::Opaque(_) => return None,
        })
    }

    /// Name of the value's type
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Function(_) => "function",
            Self::Builtin(_) => "builtin_function_or_method",
            Self::Code(_) => "code",
            Self::Opaque(opaque) => match **opaque {
                Opaque::Lock => "lock",
                Opaque::Placeholder => "unrepresentable",
            },
        }
    }

    /// Truth value used by conditions and `not`
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(x) => *x != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(list) => !list.borrow().is_empty(),
            Self::Function(_) | Self::Builtin(_) | Self::Code(_) | Self::Opaque(_) => true,
        }
    }

    /// Display string, strings quoted
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out, &mut Vec::new());
        out
    }

    fn write_repr(&self, out: &mut String, seen: &mut Vec<ListRef>) {
        match self {
            Self::None => out.push_str("None"),
            Self::Bool(true) => out.push_str("True"),
            Self::Bool(false) => out.push_str("False"),
            Self::Int(i) => out.push_str(&i.to_string()),
            Self::Float(x) => out.push_str(&format_float(*x)),
            Self::Str(s) => out.push_str(&quote_str(s)),
            Self::List(list) => {
                let revisited = seen.iter().any(|outer| Rc::ptr_eq(outer, list));
                if revisited || seen.len() >= RECURSION_LIMIT {
                    out.push_str("[...]");
                    return;
                }
                seen.push(list.clone());
                out.push('[');
                for (idx, item) in list.borrow().iter().enumerate() {
                    if idx > 0 {
                        out.push_str(", ");
                    }
                    item.write_repr(out, seen);
                }
                out.push(']');
                seen.pop();
            }
            Self::Function(func) => out.push_str(&format!("<function {}>", func.name())),
            Self::Builtin(native) => out.push_str(&format!("<built-in function {}>", native.name)),
            Self::Code(code) => out.push_str(&format!("<code object {}>", code.name())),
            Self::Opaque(opaque) => match **opaque {
                Opaque::Lock => out.push_str("<lock object>"),
                Opaque::Placeholder => out.push_str("<unrepresentable>"),
            },
        }
    }

    /// Numeric view used by arithmetic and comparisons; booleans count as integers
    pub(crate) fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub(crate) fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(*x),
            other => other.as_int().map(|i| i as f64),
        }
    }

    /// Equality as the `==` operator sees it
    ///
    /// Lists compare element by element; nesting deeper than
    /// [`RECURSION_LIMIT`], which includes lists that contain each other,
    /// raises `RecursionError`.
    pub fn equals(&self, other: &Self) -> Result<bool, RuntimeError> {
        self.equals_at(other, 0)
    }

    pub(crate) fn equals_at(&self, other: &Self, depth: usize) -> Result<bool, RuntimeError> {
        Ok(match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let depth = enter_nested(depth)?;
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    if !x.equals_at(y, depth)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => Rc::ptr_eq(a, b),
            (Self::Code(a), Self::Code(b)) => Rc::ptr_eq(a, b),
            (Self::Opaque(a), Self::Opaque(b)) => Rc::ptr_eq(a, b),
            (a, b) => match (a.as_int(), b.as_int()) {
                (Some(x), Some(y)) => x == y,
                _ => match (a.as_float(), b.as_float()) {
                    (Some(x), Some(y)) => x == y,
                    _ => false,
                },
            },
        })
    }
}

/// Step one container level deeper while comparing
pub(crate) fn enter_nested(depth: usize) -> Result<usize, RuntimeError> {
    if depth >= RECURSION_LIMIT {
        return Err(RuntimeError::new(
            ErrorKind::RecursionError,
            "maximum recursion depth exceeded in comparison",
        ));
    }
    Ok(depth + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repr() {
        assert_eq!(Value::None.repr(), "None");
        assert_eq!(Value::Bool(true).repr(), "True");
        assert_eq!(Value::Float(1.0).repr(), "1.0");
        assert_eq!(Value::from("it's").repr(), "\"it's\"");
        assert_eq!(Value::from(vec![Value::Int(1), Value::from("a")]).repr(), "[1, 'a']");
        assert_eq!(Value::placeholder().repr(), "<unrepresentable>");
        assert_eq!(Value::Opaque(Rc::new(Opaque::Lock)).repr(), "<lock object>");
    }

    #[test]
    fn test_cyclic_list() {
        let list: ListRef = Rc::new(RefCell::new(vec![Value::Int(1)]));
        list.borrow_mut().push(Value::List(list.clone()));
        let value = Value::List(list.clone());

        assert_eq!(value.repr(), "[1, [...]]");
        assert_eq!(value.to_recorded(), None);

        // break the cycle so the test does not leak
        list.borrow_mut().clear();
    }

    #[test]
    fn test_recorded_forms() {
        let value = Value::from(vec![Value::Int(2), Value::None, Value::from("x")]);
        let recorded = value.to_recorded().unwrap();
        assert_eq!(
            recorded,
            RecordedValue::List(vec![
                RecordedValue::Int(2),
                RecordedValue::None,
                RecordedValue::Str("x".to_string())
            ])
        );
        assert!(Value::from_recorded(&recorded).equals(&value).unwrap());
        assert_eq!(Value::Opaque(Rc::new(Opaque::Lock)).to_recorded(), None);
    }

    #[test]
    fn test_equality_and_truth() {
        assert!(Value::Int(1).equals(&Value::Float(1.0)).unwrap());
        assert!(Value::Bool(true).equals(&Value::Int(1)).unwrap());
        assert!(!Value::from("1").equals(&Value::Int(1)).unwrap());
        assert!(!Value::from(Vec::new()).is_truthy());
        assert!(Value::from("x").is_truthy());
    }

    #[test]
    fn test_mutually_nested_lists_do_not_compare_forever() {
        let a: ListRef = Rc::new(RefCell::new(vec![Value::Int(0)]));
        let b: ListRef = Rc::new(RefCell::new(vec![Value::List(a.clone())]));
        a.borrow_mut()[0] = Value::List(b.clone());

        let err = Value::List(a.clone()).equals(&Value::List(b.clone())).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RecursionError);
        assert!(Value::List(a.clone()).equals(&Value::List(a.clone())).unwrap());

        a.borrow_mut().clear();
    }
}
