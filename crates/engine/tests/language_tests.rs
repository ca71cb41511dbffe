use std::{cell::RefCell, io::Write, rc::Rc};

use rdb_engine::{
    vm::{ErrorKind, Value, VmError},
    Engine, Program,
};
use tracing::info;

#[derive(Clone, Default)]
struct Captured(Rc<RefCell<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn run(source: &str) -> (eyre::Result<Value>, String) {
    let program = Program::from_source("/tmp/lang.pyl", source).unwrap();
    let out = Captured::default();
    let engine = Engine::default();
    let result = engine.run(&program, program.new_context().with_output(out.clone()));
    (result, out.text())
}

#[test]
fn test_fizzbuzz() {
    rdb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let source = "\
def fizzbuzz(n):
    if n % 15 == 0:
        return 'FizzBuzz'
    elif n % 3 == 0:
        return 'Fizz'
    elif n % 5 == 0:
        return 'Buzz'
    return str(n)

i = 1
out = []
while i <= 15:
    out = out + [fizzbuzz(i)]
    i += 1
print(out[2], out[4], out[14], len(out))
";
    let (result, out) = run(source);
    assert!(result.is_ok());
    assert_eq!(out, "Fizz Buzz FizzBuzz 15\n");
}

#[test]
fn test_globals_visible_in_functions() {
    rdb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let source = "\
scale = 3

def apply(v):
    result = v * scale
    return result

print(apply(4), type(scale), type(apply))
";
    let (_, out) = run(source);
    assert_eq!(out, "12 int function\n");
}

#[test]
fn test_list_aliasing_and_repr() {
    rdb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let source = "\
a = [1, 'two', 3.0, None, True]
b = a
b[0] = [a]
print(a)
";
    let (_, out) = run(source);
    assert_eq!(out, "[[[...]], 'two', 3.0, None, True]\n");
}

#[test]
fn test_type_errors_are_reported() {
    rdb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let (result, _) = run("x = 1\ny = x + 'a'\n");
    let err = result.unwrap_err();
    let Some(VmError::Runtime(err)) = err.downcast_ref::<VmError>() else {
        panic!("expected runtime error, got {err:?}");
    };
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.line, Some(2));
}

#[test]
fn test_arity_mismatch() {
    rdb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let (result, _) = run("def f(a, b):\n    return a\nf(1)\n");
    let message = result.unwrap_err().to_string();
    assert_eq!(message, "line 3: TypeError: f() takes 2 positional arguments but 1 were given");
}

#[test]
fn test_comparing_mutually_nested_lists_raises() {
    rdb_common::logging::ensure_test_logging(None);
    info!("Running test");
    for op in ["==", "!=", "<", ">="] {
        let source = format!("a = [0]\nb = [0]\na[0] = b\nb[0] = a\nprint(a {op} b)\n");
        let (result, out) = run(&source);
        let err = result.unwrap_err();
        let Some(VmError::Runtime(err)) = err.downcast_ref::<VmError>() else {
            panic!("expected runtime error for {op}, got {err:?}");
        };
        assert_eq!(err.kind, ErrorKind::RecursionError);
        assert_eq!(err.line, Some(5));
        assert_eq!(out, "");
    }

    let (result, out) = run("a = [1]\na[0] = a\nprint(a == a, [1, [2]] < [1, [3]])\n");
    assert!(result.is_ok());
    assert_eq!(out, "True True\n");
}

#[test]
fn test_deeply_nested_program_is_rejected() {
    rdb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let source = format!("x = {}1{}\n", "(".repeat(100_000), ")".repeat(100_000));
    let err = Program::from_source("/tmp/nested.pyl", &source).unwrap_err();
    assert_eq!(err.to_string(), "line 1: SyntaxError: too many nested parentheses");

    let (result, out) = run(&format!("x = {}1{}\nprint(x)\n", "(".repeat(50), ")".repeat(50)));
    assert!(result.is_ok());
    assert_eq!(out, "1\n");
}
