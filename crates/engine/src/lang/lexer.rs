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

//! Tokenizer for the scripting language.
//!
//! Produces a flat token stream where block structure is explicit: `Indent` and
//! `Dedent` tokens bracket indented blocks and `Newline` terminates every logical
//! line. Newlines inside brackets are ignored so expressions may span lines.

use super::CompileError;

/// Width a tab advances the indentation column to a multiple of
const TAB_WIDTH: usize = 8;

/// Kinds of token
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier
    Name(String),
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal with escapes resolved
    Str(String),

    /// `def`
    Def,
    /// `return`
    Return,
    /// `if`
    If,
    /// `elif`
    Elif,
    /// `else`
    Else,
    /// `while`
    While,
    /// `break`
    Break,
    /// `continue`
    Continue,
    /// `pass`
    Pass,
    /// `and`
    And,
    /// `or`
    Or,
    /// `not`
    Not,
    /// `True`
    True,
    /// `False`
    False,
    /// `None`
    None,

    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `=`
    Assign,
    /// `+=`
    PlusAssign,
    /// `-=`
    MinusAssign,
    /// `*=`
    StarAssign,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `//`
    DoubleSlash,
    /// `%`
    Percent,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,

    /// End of a logical line
    Newline,
    /// Start of an indented block
    Indent,
    /// End of an indented block
    Dedent,
    /// End of input
    Eof,
}

/// A token and the source line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// What the token is
    pub kind: TokenKind,
    /// 1-based source line
    pub line: u32,
}

fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "def" => TokenKind::Def,
        "return" => TokenKind::Return,
        "if" => TokenKind::If,
        "elif" => TokenKind::Elif,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "pass" => TokenKind::Pass,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "True" => TokenKind::True,
        "False" => TokenKind::False,
        "None" => TokenKind::None,
        _ => return None,
    })
}

/// Split source text into tokens
pub fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
    let mut lexer = Lexer { tokens: Vec::new(), indents: vec![0], depth: 0 };
    let mut last_line = 0;
    for (idx, raw) in source.lines().enumerate() {
        let line = idx as u32 + 1;
        last_line = line;
        lexer.line(raw.trim_end_matches('\r'), line)?;
    }

    let line = last_line.max(1);
    if lexer.depth > 0 {
        return Err(CompileError::new(line, "unexpected EOF while inside brackets"));
    }
    while lexer.indents.len() > 1 {
        lexer.indents.pop();
        lexer.push(TokenKind::Dedent, line);
    }
    lexer.push(TokenKind::Eof, line);
    Ok(lexer.tokens)
}

struct Lexer {
    tokens: Vec<Token>,
    indents: Vec<usize>,
    depth: usize,
}

impl Lexer {
    fn push(&mut self, kind: TokenKind, line: u32) {
        self.tokens.push(Token { kind, line });
    }

    fn line(&mut self, text: &str, line: u32) -> Result<(), CompileError> {
        let chars: Vec<char> = text.chars().collect();
        let mut pos = 0;

        if self.depth == 0 {
            let mut column = 0;
            while let Some(&c) = chars.get(pos) {
                match c {
                    ' ' => column += 1,
                    '\t' => column = (column / TAB_WIDTH + 1) * TAB_WIDTH,
                    '\x0c' => column = 0,
                    _ => break,
                }
                pos += 1;
            }
            match chars.get(pos) {
                None | Some('#') => return Ok(()),
                _ => {}
            }
            self.indentation(column, line)?;
        }

        let start_len = self.tokens.len();
        while let Some(&c) = chars.get(pos) {
            match c {
                ' ' | '\t' | '\x0c' => pos += 1,
                '#' => break,
                '0'..='9' => pos = self.number(&chars, pos, line)?,
                '.' if chars.get(pos + 1).is_some_and(char::is_ascii_digit) => {
                    pos = self.number(&chars, pos, line)?
                }
                c if c.is_alphabetic() || c == '_' => {
                    let start = pos;
                    while chars.get(pos).is_some_and(|c| c.is_alphanumeric() || *c == '_') {
                        pos += 1;
                    }
                    let word: String = chars[start..pos].iter().collect();
                    let kind = keyword(&word).unwrap_or(TokenKind::Name(word));
                    self.push(kind, line);
                }
                '\'' | '"' => pos = self.string(&chars, pos, line)?,
                _ => pos = self.operator(&chars, pos, line)?,
            }
        }

        if self.depth == 0 && self.tokens.len() > start_len {
            self.push(TokenKind::Newline, line);
        }
        Ok(())
    }

    fn indentation(&mut self, column: usize, line: u32) -> Result<(), CompileError> {
        let current = self.indents.last().copied().unwrap_or(0);
        if column > current {
            self.indents.push(column);
            self.push(TokenKind::Indent, line);
            return Ok(());
        }
        while column < self.indents.last().copied().unwrap_or(0) {
            self.indents.pop();
            self.push(TokenKind::Dedent, line);
        }
        if column != self.indents.last().copied().unwrap_or(0) {
            return Err(CompileError::new(
                line,
                "unindent does not match any outer indentation level",
            ));
        }
        Ok(())
    }

    fn number(&mut self, chars: &[char], start: usize, line: u32) -> Result<usize, CompileError> {
        let mut pos = start;
        let mut is_float = false;
        while let Some(&c) = chars.get(pos) {
            match c {
                '0'..='9' | '_' => pos += 1,
                '.' if !is_float => {
                    is_float = true;
                    pos += 1;
                }
                'e' | 'E' => {
                    is_float = true;
                    pos += 1;
                    if matches!(chars.get(pos), Some('+') | Some('-')) {
                        pos += 1;
                    }
                }
                _ => break,
            }
        }
        if chars.get(pos).is_some_and(|c| c.is_alphabetic() || *c == '_') {
            return Err(CompileError::new(line, "invalid decimal literal"));
        }

        let text: String = chars[start..pos].iter().filter(|c| **c != '_').collect();
        let kind = if is_float {
            TokenKind::Float(
                text.parse().map_err(|_| CompileError::new(line, "invalid float literal"))?,
            )
        } else {
            TokenKind::Int(
                text.parse().map_err(|_| CompileError::new(line, "integer literal too large"))?,
            )
        };
        self.push(kind, line);
        Ok(pos)
    }

    fn string(&mut self, chars: &[char], start: usize, line: u32) -> Result<usize, CompileError> {
        let quote = chars[start];
        let mut pos = start + 1;
        let mut value = String::new();
        loop {
            match chars.get(pos) {
                None => return Err(CompileError::new(line, "unterminated string literal")),
                Some(&c) if c == quote => break,
                Some('\\') => {
                    let escaped = match chars.get(pos + 1) {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some('\\') => '\\',
                        Some('\'') => '\'',
                        Some('"') => '"',
                        Some(other) => {
                            value.push('\\');
                            *other
                        }
                        None => {
                            return Err(CompileError::new(line, "unterminated string literal"))
                        }
                    };
                    value.push(escaped);
                    pos += 2;
                }
                Some(&c) => {
                    value.push(c);
                    pos += 1;
                }
            }
        }
        self.push(TokenKind::Str(value), line);
        Ok(pos + 1)
    }

    fn operator(&mut self, chars: &[char], pos: usize, line: u32) -> Result<usize, CompileError> {
        let next = chars.get(pos + 1).copied();
        let (kind, width) = match (chars[pos], next) {
            ('/', Some('/')) => (TokenKind::DoubleSlash, 2),
            ('=', Some('=')) => (TokenKind::EqEq, 2),
            ('!', Some('=')) => (TokenKind::NotEq, 2),
            ('<', Some('=')) => (TokenKind::Le, 2),
            ('>', Some('=')) => (TokenKind::Ge, 2),
            ('+', Some('=')) => (TokenKind::PlusAssign, 2),
            ('-', Some('=')) => (TokenKind::MinusAssign, 2),
            ('*', Some('=')) => (TokenKind::StarAssign, 2),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('[', _) => (TokenKind::LBracket, 1),
            (']', _) => (TokenKind::RBracket, 1),
            (',', _) => (TokenKind::Comma, 1),
            (':', _) => (TokenKind::Colon, 1),
            ('=', _) => (TokenKind::Assign, 1),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('%', _) => (TokenKind::Percent, 1),
            ('<', _) => (TokenKind::Lt, 1),
            ('>', _) => (TokenKind::Gt, 1),
            (other, _) => {
                return Err(CompileError::new(line, format!("invalid character '{other}'")))
            }
        };

        match kind {
            TokenKind::LParen | TokenKind::LBracket => self.depth += 1,
            TokenKind::RParen | TokenKind::RBracket => {
                self.depth = self
                    .depth
                    .checked_sub(1)
                    .ok_or_else(|| CompileError::new(line, "unmatched closing bracket"))?;
            }
            _ => {}
        }
        self.push(kind, line);
        Ok(pos + width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TokenKind::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_statements() {
        assert_eq!(
            kinds("x = 1\nprint(x)\n"),
            vec![
                Name("x".into()),
                Assign,
                Int(1),
                Newline,
                Name("print".into()),
                LParen,
                Name("x".into()),
                RParen,
                Newline,
                Eof
            ]
        );
    }

    #[test]
    fn test_blocks_and_comments() {
        let source = "def f(a):\n    # comment\n\n    return a // 2\nf(3)\n";
        assert_eq!(
            kinds(source),
            vec![
                Def,
                Name("f".into()),
                LParen,
                Name("a".into()),
                RParen,
                Colon,
                Newline,
                Indent,
                Return,
                Name("a".into()),
                DoubleSlash,
                Int(2),
                Newline,
                Dedent,
                Name("f".into()),
                LParen,
                Int(3),
                RParen,
                Newline,
                Eof
            ]
        );
    }

    #[test]
    fn test_brackets_join_lines() {
        let tokens = tokenize("x = [1,\n     2]\ny = 'a\\'b'\n").unwrap();
        let newlines: Vec<u32> =
            tokens.iter().filter(|t| t.kind == Newline).map(|t| t.line).collect();
        assert_eq!(newlines, vec![2, 3]);
        assert!(tokens.iter().any(|t| t.kind == Str("a'b".into())));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("1.5 2e3 10_000")[..3], [Float(1.5), Float(2000.0), Int(10_000)]);
    }

    #[test]
    fn test_dedent_at_eof() {
        let tokens = kinds("while x:\n    x -= 1");
        assert_eq!(&tokens[tokens.len() - 3..], &[Newline, Dedent, Eof]);
    }

    #[test]
    fn test_errors() {
        assert_eq!(tokenize("x = 'abc\n").unwrap_err().line, 1);
        assert!(tokenize("if x:\n        y = 1\n    z = 2\n").is_err());
        assert!(tokenize("x = (1,\n").is_err());
        assert!(tokenize("x = 1)\n").is_err());
        assert!(tokenize("x = $\n").is_err());
    }
}
