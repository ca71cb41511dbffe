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

//! Operator semantics: arithmetic, comparison and subscripting

use std::{cmp::Ordering, rc::Rc};

use rdb_common::{CompareOp, Opcode};

use super::{value::enter_nested, ErrorKind, RuntimeError, Value};

fn overflow() -> RuntimeError {
    RuntimeError::new(ErrorKind::OverflowError, "integer result too large")
}

fn unsupported(symbol: &str, a: &Value, b: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "unsupported operand type(s) for {symbol}: '{}' and '{}'",
        a.type_name(),
        b.type_name()
    ))
}

/// Symbol of a binary opcode, used in error messages
fn symbol(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::BINARY_ADD => "+",
        Opcode::BINARY_SUBTRACT => "-",
        Opcode::BINARY_MULTIPLY => "*",
        Opcode::BINARY_TRUE_DIVIDE => "/",
        Opcode::BINARY_FLOOR_DIVIDE => "//",
        Opcode::BINARY_MODULO => "%",
        _ => "?",
    }
}

/// Apply a `BINARY_*` arithmetic opcode
pub fn binary(opcode: Opcode, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (opcode, a, b) {
        (Opcode::BINARY_ADD, Value::Str(x), Value::Str(y)) => {
            return Ok(Value::from(format!("{x}{y}")));
        }
        (Opcode::BINARY_ADD, Value::List(x), Value::List(y)) => {
            let mut items = x.borrow().clone();
            items.extend(y.borrow().iter().cloned());
            return Ok(items.into());
        }
        (Opcode::BINARY_MULTIPLY, Value::Str(s), n) | (Opcode::BINARY_MULTIPLY, n, Value::Str(s))
            if n.as_int().is_some() =>
        {
            let count = repeat_count(n, s.len())?;
            return Ok(Value::from(s.repeat(count)));
        }
        (Opcode::BINARY_MULTIPLY, Value::List(list), n)
        | (Opcode::BINARY_MULTIPLY, n, Value::List(list))
            if n.as_int().is_some() =>
        {
            let items = list.borrow();
            let count = repeat_count(n, items.len())?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            return Ok(out.into());
        }
        _ => {}
    }

    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        return int_binary(opcode, x, y);
    }
    match (a.as_float(), b.as_float()) {
        (Some(x), Some(y)) => float_binary(opcode, x, y),
        _ => Err(unsupported(symbol(opcode), a, b)),
    }
}

/// Longest sequence, in bytes or items, that repetition may produce
pub const MAX_REPEAT_LEN: usize = 10_000_000;

/// Repetition count for a sequence of `len` bytes or items; negative counts repeat zero times
fn repeat_count(n: &Value, len: usize) -> Result<usize, RuntimeError> {
    let count = usize::try_from(n.as_int().unwrap_or_default()).unwrap_or(0);
    if len == 0 {
        return Ok(0);
    }
    match len.checked_mul(count) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(count),
        _ => Err(RuntimeError::new(ErrorKind::OverflowError, "repeated sequence is too long")),
    }
}

fn int_binary(opcode: Opcode, x: i64, y: i64) -> Result<Value, RuntimeError> {
    let result = match opcode {
        Opcode::BINARY_ADD => x.checked_add(y).ok_or_else(overflow)?,
        Opcode::BINARY_SUBTRACT => x.checked_sub(y).ok_or_else(overflow)?,
        Opcode::BINARY_MULTIPLY => x.checked_mul(y).ok_or_else(overflow)?,
        Opcode::BINARY_TRUE_DIVIDE => return float_binary(opcode, x as f64, y as f64),
        Opcode::BINARY_FLOOR_DIVIDE => {
            if y == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            let q = x.checked_div(y).ok_or_else(overflow)?;
            if (x % y != 0) && ((x < 0) != (y < 0)) {
                q - 1
            } else {
                q
            }
        }
        Opcode::BINARY_MODULO => {
            if y == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            let r = x.checked_rem(y).unwrap_or(0);
            if r != 0 && ((r < 0) != (y < 0)) {
                r + y
            } else {
                r
            }
        }
        other => return Err(RuntimeError::type_error(format!("{other} is not arithmetic"))),
    };
    Ok(Value::Int(result))
}

fn float_binary(opcode: Opcode, x: f64, y: f64) -> Result<Value, RuntimeError> {
    let result = match opcode {
        Opcode::BINARY_ADD => x + y,
        Opcode::BINARY_SUBTRACT => x - y,
        Opcode::BINARY_MULTIPLY => x * y,
        Opcode::BINARY_TRUE_DIVIDE => {
            if y == 0.0 {
                return Err(zero_division("division by zero"));
            }
            x / y
        }
        Opcode::BINARY_FLOOR_DIVIDE => {
            if y == 0.0 {
                return Err(zero_division("float floor division by zero"));
            }
            (x / y).floor()
        }
        Opcode::BINARY_MODULO => {
            if y == 0.0 {
                return Err(zero_division("float modulo"));
            }
            let r = x % y;
            if r != 0.0 && ((r < 0.0) != (y < 0.0)) {
                r + y
            } else {
                r
            }
        }
        other => return Err(RuntimeError::type_error(format!("{other} is not arithmetic"))),
    };
    Ok(Value::Float(result))
}

fn zero_division(message: &str) -> RuntimeError {
    RuntimeError::new(ErrorKind::ZeroDivisionError, message)
}

/// `-value`
pub fn negate(value: &Value) -> Result<Value, RuntimeError> {
    match value {
        Value::Float(x) => Ok(Value::Float(-x)),
        other => match other.as_int() {
            Some(i) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
            None => Err(RuntimeError::type_error(format!(
                "bad operand type for unary -: '{}'",
                other.type_name()
            ))),
        },
    }
}

/// Apply a `COMPARE_OP`
pub fn compare(op: CompareOp, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let result = match op {
        CompareOp::Eq => a.equals(b)?,
        CompareOp::Ne => !a.equals(b)?,
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
            let ordering = order(a, b, 0)?.ok_or_else(|| {
                RuntimeError::type_error(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    op.symbol(),
                    a.type_name(),
                    b.type_name()
                ))
            })?;
            match (op, ordering) {
                (_, None) => false,
                (CompareOp::Lt, Some(o)) => o.is_lt(),
                (CompareOp::Le, Some(o)) => o.is_le(),
                (CompareOp::Gt, Some(o)) => o.is_gt(),
                (_, Some(o)) => o.is_ge(),
            }
        }
    };
    Ok(Value::Bool(result))
}

/// Ordering of two values; the outer `None` means the types are not comparable,
/// the inner `None` means they are but the result is unordered (NaN)
fn order(a: &Value, b: &Value, depth: usize) -> Result<Option<Option<Ordering>>, RuntimeError> {
    Ok(match (a, b) {
        (Value::Str(x), Value::Str(y)) => Some(Some(x.cmp(y))),
        (Value::List(x), Value::List(y)) => {
            let depth = enter_nested(depth)?;
            let (x, y) = (x.borrow(), y.borrow());
            for (p, q) in x.iter().zip(y.iter()) {
                if !p.equals_at(q, depth)? {
                    return order(p, q, depth);
                }
            }
            Some(Some(x.len().cmp(&y.len())))
        }
        _ => match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => Some(Some(x.cmp(&y))),
            _ => match (a.as_float(), b.as_float()) {
                (Some(x), Some(y)) => Some(x.partial_cmp(&y)),
                _ => None,
            },
        },
    })
}

fn list_index(len: usize, index: &Value, what: &str) -> Result<usize, RuntimeError> {
    let Some(i) = index.as_int() else {
        return Err(RuntimeError::type_error(format!(
            "{what} indices must be integers, not {}",
            index.type_name()
        )));
    };
    let resolved = if i < 0 { i.checked_add(len as i64) } else { Some(i) };
    resolved
        .and_then(|i| usize::try_from(i).ok())
        .filter(|&i| i < len)
        .ok_or_else(|| RuntimeError::new(ErrorKind::IndexError, format!("{what} index out of range")))
}

/// `object[index]`
pub fn subscript(object: &Value, index: &Value) -> Result<Value, RuntimeError> {
    match object {
        Value::List(list) => {
            let items = list.borrow();
            let idx = list_index(items.len(), index, "list")?;
            Ok(items[idx].clone())
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let idx = list_index(chars.len(), index, "string")?;
            Ok(Value::Str(Rc::from(chars[idx].to_string())))
        }
        other => Err(RuntimeError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// `object[index] = value`
pub fn store_subscript(object: &Value, index: &Value, value: Value) -> Result<(), RuntimeError> {
    match object {
        Value::List(list) => {
            let mut items = list.borrow_mut();
            let idx = list_index(items.len(), index, "list assignment")?;
            items[idx] = value;
            Ok(())
        }
        other => Err(RuntimeError::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}
