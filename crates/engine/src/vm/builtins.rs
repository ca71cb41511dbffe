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

//! Builtin functions
//!
//! All builtins are external from the debugger's point of view: their results
//! are what the record log captures.

use std::{
    collections::HashMap,
    io::{self, BufRead, Write},
    rc::Rc,
    time::{SystemTime, UNIX_EPOCH},
};

use rand::Rng;

use super::{value::Opaque, ErrorKind, RuntimeError, Value};
use crate::context::Host;

/// Upper bound on the length of a list built by `range`
const MAX_RANGE_LEN: i64 = 10_000_000;

/// The builtin table installed in every execution context
pub fn table() -> HashMap<String, Value> {
    let entries: [(&str, fn(&mut Host, Vec<Value>) -> Result<Value, RuntimeError>); 14] = [
        ("print", print),
        ("len", len),
        ("str", str),
        ("int", int),
        ("float", float),
        ("abs", abs),
        ("type", type_name),
        ("range", range),
        ("random", random),
        ("randint", randint),
        ("time", time),
        ("input", input),
        ("getenv", getenv),
        ("lock", lock),
    ];
    entries.into_iter().map(|(name, func)| (name.to_string(), Value::native(name, func))).collect()
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), RuntimeError> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max { format!("{min}") } else { format!("{min} to {max}") };
    Err(RuntimeError::type_error(format!(
        "{name}() takes {expected} arguments ({} given)",
        args.len()
    )))
}

fn os_error(err: io::Error) -> RuntimeError {
    RuntimeError::new(ErrorKind::OSError, err.to_string())
}

fn print(host: &mut Host, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let line = args.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
    writeln!(host.output, "{line}").map_err(os_error)?;
    host.output.flush().map_err(os_error)?;
    Ok(Value::None)
}

fn len(_: &mut Host, args: Vec<Value>) -> Result<Value, RuntimeError> {
    arity("len", &args, 1, 1)?;
    let n = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(list) => list.borrow().len(),
        other => {
            return Err(RuntimeError::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(n as i64))
}

fn str(_: &mut Host, args: Vec<Value>) -> Result<Value, RuntimeError> {
    arity("str", &args, 0, 1)?;
    Ok(Value::from(args.first().map(ToString::to_string).unwrap_or_default()))
}

fn int(_: &mut Host, args: Vec<Value>) -> Result<Value, RuntimeError> {
    arity("int", &args, 0, 1)?;
    let Some(value) = args.first() else { return Ok(Value::Int(0)) };
    match value {
        Value::Float(x) if x.is_nan() => {
            Err(RuntimeError::value_error("cannot convert float NaN to integer"))
        }
        Value::Float(x) if x.is_infinite() => Err(RuntimeError::new(
            ErrorKind::OverflowError,
            "cannot convert float infinity to integer",
        )),
        Value::Float(x) => {
            let truncated = x.trunc();
            if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
                return Err(RuntimeError::new(ErrorKind::OverflowError, "int too large to convert"));
            }
            Ok(Value::Int(truncated as i64))
        }
        Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            RuntimeError::value_error(format!("invalid literal for int() with base 10: {}", value.repr()))
        }),
        other => other.as_int().map(Value::Int).ok_or_else(|| {
            RuntimeError::type_error(format!(
                "int() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn float(_: &mut Host, args: Vec<Value>) -> Result<Value, RuntimeError> {
    arity("float", &args, 0, 1)?;
    let Some(value) = args.first() else { return Ok(Value::Float(0.0)) };
    match value {
        Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            RuntimeError::value_error(format!("could not convert string to float: {}", value.repr()))
        }),
        other => other.as_float().map(Value::Float).ok_or_else(|| {
            RuntimeError::type_error(format!(
                "float() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn abs(_: &mut Host, args: Vec<Value>) -> Result<Value, RuntimeError> {
    arity("abs", &args, 1, 1)?;
    match &args[0] {
        Value::Float(x) => Ok(Value::Float(x.abs())),
        other => match other.as_int() {
            Some(i) => i.checked_abs().map(Value::Int).ok_or_else(|| {
                RuntimeError::new(ErrorKind::OverflowError, "integer result too large")
            }),
            None => Err(RuntimeError::type_error(format!(
                "bad operand type for abs(): '{}'",
                other.type_name()
            ))),
        },
    }
}

/// `type(x)` returns the name of the value's type
fn type_name(_: &mut Host, args: Vec<Value>) -> Result<Value, RuntimeError> {
    arity("type", &args, 1, 1)?;
    Ok(Value::from(args[0].type_name()))
}

fn range(_: &mut Host, args: Vec<Value>) -> Result<Value, RuntimeError> {
    arity("range", &args, 1, 3)?;
    let ints = args
        .iter()
        .map(|arg| {
            arg.as_int().ok_or_else(|| {
                RuntimeError::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    arg.type_name()
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let (start, stop, step) = match ints[..] {
        [stop] => (0, stop, 1),
        [start, stop] => (start, stop, 1),
        [start, stop, step, ..] => (start, stop, step),
        [] => return Err(RuntimeError::type_error("range expected at least 1 argument, got 0")),
    };
    if step == 0 {
        return Err(RuntimeError::value_error("range() arg 3 must not be zero"));
    }

    let span = if step > 0 {
        i128::from(stop) - i128::from(start)
    } else {
        i128::from(start) - i128::from(stop)
    };
    let count = if span <= 0 { 0 } else { (span - 1) / i128::from(step).abs() + 1 };
    if count > i128::from(MAX_RANGE_LEN) {
        return Err(RuntimeError::new(ErrorKind::OverflowError, "range() result is too large"));
    }

    let items = (0..count as i64).map(|k| Value::Int(start + k * step)).collect::<Vec<_>>();
    Ok(items.into())
}

fn random(host: &mut Host, args: Vec<Value>) -> Result<Value, RuntimeError> {
    arity("random", &args, 0, 0)?;
    Ok(Value::Float(host.rng.random::<f64>()))
}

fn randint(host: &mut Host, args: Vec<Value>) -> Result<Value, RuntimeError> {
    arity("randint", &args, 2, 2)?;
    let (Some(a), Some(b)) = (args[0].as_int(), args[1].as_int()) else {
        return Err(RuntimeError::type_error("randint() arguments must be integers"));
    };
    if a > b {
        return Err(RuntimeError::value_error(format!("empty range for randint() ({a}, {b})")));
    }
    Ok(Value::Int(host.rng.random_range(a..=b)))
}

fn time(_: &mut Host, args: Vec<Value>) -> Result<Value, RuntimeError> {
    arity("time", &args, 0, 0)?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| RuntimeError::new(ErrorKind::OSError, err.to_string()))?;
    Ok(Value::Float(now.as_secs_f64()))
}

fn input(host: &mut Host, args: Vec<Value>) -> Result<Value, RuntimeError> {
    arity("input", &args, 0, 1)?;
    if let Some(prompt) = args.first() {
        write!(host.output, "{prompt}").map_err(os_error)?;
        host.output.flush().map_err(os_error)?;
    }
    let mut line = String::new();
    let read = host.input.read_line(&mut line).map_err(os_error)?;
    if read == 0 {
        return Err(RuntimeError::new(ErrorKind::EOFError, "EOF when reading a line"));
    }
    let trimmed = line.strip_suffix('\n').unwrap_or(&line);
    let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);
    Ok(Value::from(trimmed))
}

fn getenv(_: &mut Host, args: Vec<Value>) -> Result<Value, RuntimeError> {
    arity("getenv", &args, 1, 2)?;
    let Value::Str(name) = &args[0] else {
        return Err(RuntimeError::type_error("getenv() name must be a string"));
    };
    Ok(match std::env::var(&**name) {
        Ok(value) => Value::from(value),
        Err(_) => args.get(1).cloned().unwrap_or(Value::None),
    })
}

fn lock(_: &mut Host, args: Vec<Value>) -> Result<Value, RuntimeError> {
    arity("lock", &args, 0, 0)?;
    Ok(Value::Opaque(Rc::new(Opaque::Lock)))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::context::ExecutionContext;

    fn call(host: &mut Host, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let Value::Builtin(native) = &table()[name] else { panic!("{name} is not a builtin") };
        (native.func)(host, args)
    }

    #[test]
    fn test_conversions() {
        let mut host = Host::default();
        assert_eq!(call(&mut host, "int", vec![Value::from(" 42 ")]).unwrap().repr(), "42");
        assert_eq!(call(&mut host, "int", vec![Value::Float(-2.7)]).unwrap().repr(), "-2");
        assert_eq!(call(&mut host, "float", vec![Value::Int(3)]).unwrap().repr(), "3.0");
        assert_eq!(call(&mut host, "str", vec![Value::from("x")]).unwrap().repr(), "'x'");
        assert_eq!(call(&mut host, "len", vec![Value::from("héllo")]).unwrap().repr(), "5");

        let err = call(&mut host, "int", vec![Value::from("abc")]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValueError);
        assert_eq!(err.message, "invalid literal for int() with base 10: 'abc'");
    }

    #[test]
    fn test_range() {
        let mut host = Host::default();
        let r = |host: &mut Host, args: Vec<i64>| {
            call(host, "range", args.into_iter().map(Value::Int).collect()).unwrap().repr()
        };
        assert_eq!(r(&mut host, vec![3]), "[0, 1, 2]");
        assert_eq!(r(&mut host, vec![1, 7, 2]), "[1, 3, 5]");
        assert_eq!(r(&mut host, vec![3, 0, -1]), "[3, 2, 1]");
        assert_eq!(r(&mut host, vec![3, 0]), "[]");
        assert!(call(&mut host, "range", vec![Value::Int(0), Value::Int(1), Value::Int(0)]).is_err());
    }

    #[test]
    fn test_seeded_randomness_is_reproducible() {
        let mut a = ExecutionContext::new("p").with_seed(7).host;
        let mut b = ExecutionContext::new("p").with_seed(7).host;
        let args = || vec![Value::Int(1), Value::Int(100)];
        for _ in 0..5 {
            let x = call(&mut a, "randint", args()).unwrap();
            let y = call(&mut b, "randint", args()).unwrap();
            assert!(x.equals(&y).unwrap());
        }
    }

    #[test]
    fn test_input_and_eof() {
        let mut host = ExecutionContext::new("p").with_sink().with_input(Cursor::new("abc\n")).host;
        assert_eq!(call(&mut host, "input", vec![]).unwrap().repr(), "'abc'");
        let err = call(&mut host, "input", vec![]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::EOFError);
    }

    #[test]
    fn test_lock_is_opaque() {
        let mut host = Host::default();
        let value = call(&mut host, "lock", vec![]).unwrap();
        assert_eq!(value.repr(), "<lock object>");
        assert_eq!(value.to_recorded(), None);
    }
}
