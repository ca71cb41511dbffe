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

//! Execution context of a single run
//!
//! Every run (direct, traced, recorded or replayed) gets a fresh
//! [`ExecutionContext`]: the global namespace seeded with `__name__` and
//! `__file__`, the builtin table, and the [`Host`] through which builtins reach
//! the outside world (output, input, randomness).

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    io::{self, BufRead, Write},
};

use rand::{rngs::StdRng, SeedableRng};

use crate::vm::{builtins, RuntimeError, Value};

/// Global namespace, ordered by name
pub type Globals = BTreeMap<String, Value>;

/// Everything outside the interpreter a builtin may touch
pub struct Host {
    /// Where `print` writes
    pub output: Box<dyn Write>,
    /// Where `input` reads
    pub input: Box<dyn BufRead>,
    /// Source of `random` and `randint`
    pub rng: StdRng,
}

impl Default for Host {
    fn default() -> Self {
        Self {
            output: Box::new(io::stdout()),
            input: Box::new(io::BufReader::new(io::stdin())),
            rng: StdRng::from_os_rng(),
        }
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host").finish_non_exhaustive()
    }
}

/// Namespaces and host for one run of a program
#[derive(Debug)]
pub struct ExecutionContext {
    /// Global bindings of the program
    pub globals: Globals,
    /// Builtin bindings, consulted after globals
    pub builtins: HashMap<String, Value>,
    /// Host facilities
    pub host: Host,
}

impl ExecutionContext {
    /// Fresh context for the program at `filename`, talking to the process stdio
    pub fn new(filename: &str) -> Self {
        let mut globals = Globals::new();
        globals.insert("__name__".to_string(), Value::from("__main__"));
        globals.insert("__file__".to_string(), Value::from(filename));
        Self { globals, builtins: builtins::table(), host: Host::default() }
    }

    /// Send program output to `output`
    pub fn with_output(mut self, output: impl Write + 'static) -> Self {
        self.host.output = Box::new(output);
        self
    }

    /// Discard program output
    pub fn with_sink(self) -> Self {
        self.with_output(io::sink())
    }

    /// Read program input from `input`
    pub fn with_input(mut self, input: impl BufRead + 'static) -> Self {
        self.host.input = Box::new(input);
        self
    }

    /// Make `random` and `randint` deterministic
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.host.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Register a host function under `name`
    pub fn register_native(
        mut self,
        name: &str,
        func: impl Fn(&mut Host, Vec<Value>) -> Result<Value, RuntimeError> + 'static,
    ) -> Self {
        self.builtins.insert(name.to_string(), Value::native(name, func));
        self
    }

    /// Resolve a global name, falling back to builtins
    pub fn lookup_global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).or_else(|| self.builtins.get(name)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_namespace() {
        let ctx = ExecutionContext::new("/tmp/prog.pyl");
        assert_eq!(ctx.globals["__name__"].repr(), "'__main__'");
        assert_eq!(ctx.globals["__file__"].repr(), "'/tmp/prog.pyl'");
        assert!(ctx.lookup_global("print").is_some());
        assert!(ctx.lookup_global("nope").is_none());
    }

    #[test]
    fn test_register_native_shadows_nothing_global() {
        let ctx = ExecutionContext::new("p").register_native("g", |_, _| Ok(Value::Int(7)));
        assert_eq!(ctx.lookup_global("g").unwrap().repr(), "<built-in function g>");
    }
}
