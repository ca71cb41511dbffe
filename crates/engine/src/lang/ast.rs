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

//! Syntax tree produced by the parser.

/// Binary arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `//`
    FloorDiv,
    /// `%`
    Mod,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// Expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal
    Str(String),
    /// `True` / `False`
    Bool(bool),
    /// `None`
    None,
    /// Variable reference
    Name(String),
    /// `[a, b, ...]`
    List(Vec<Expr>),
    /// `-e`
    Neg(Box<Expr>),
    /// `not e`
    Not(Box<Expr>),
    /// Arithmetic
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Comparison
    Compare {
        /// Operator
        op: CmpOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Short-circuit `and`
    And(Box<Expr>, Box<Expr>),
    /// Short-circuit `or`
    Or(Box<Expr>, Box<Expr>),
    /// `callee(args...)`
    Call {
        /// Called expression
        callee: Box<Expr>,
        /// Positional arguments
        args: Vec<Expr>,
    },
    /// `object[index]`
    Subscript {
        /// Indexed expression
        object: Box<Expr>,
        /// Index expression
        index: Box<Expr>,
    },
}

/// Assignment targets
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// `name = ...`
    Name(String),
    /// `object[index] = ...`
    Subscript {
        /// Indexed expression
        object: Expr,
        /// Index expression
        index: Expr,
    },
}

/// Statement kinds
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Expression evaluated for its effect
    Expr(Expr),
    /// `target = value`
    Assign {
        /// Where the value goes
        target: Target,
        /// Assigned value
        value: Expr,
    },
    /// `name op= value`
    AugAssign {
        /// Updated variable
        name: String,
        /// Operator applied
        op: BinaryOp,
        /// Right operand
        value: Expr,
    },
    /// `if` with optional `elif` chain and `else`
    If {
        /// `(condition, line, body)` for the `if` and each `elif`
        branches: Vec<(Expr, u32, Vec<Stmt>)>,
        /// `else` body, empty when absent
        orelse: Vec<Stmt>,
    },
    /// `while condition: body`
    While {
        /// Loop condition
        condition: Expr,
        /// Loop body
        body: Vec<Stmt>,
    },
    /// `break`
    Break,
    /// `continue`
    Continue,
    /// `pass`
    Pass,
    /// `def name(params): body`
    Def {
        /// Function name
        name: String,
        /// Parameter names
        params: Vec<String>,
        /// Function body
        body: Vec<Stmt>,
    },
    /// `return [value]`
    Return(Option<Expr>),
}

/// A statement and the line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    /// What the statement is
    pub kind: StmtKind,
    /// 1-based source line
    pub line: u32,
}

/// A parsed program
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    /// Top-level statements in order
    pub body: Vec<Stmt>,
}
