//! Codec between the reader application's settings dialect and [`Table`]
//! trees.
//!
//! The dialect is a restricted Lua subset: a file is any number of leading
//! `--` comment lines, the mandatory `return` prefix, then one brace-
//! delimited table whose entries are `[<integer>] = <value>` or
//! `["<identifier>"] = <value>`. Values are string, numeric and boolean
//! literals and nested tables. A string literal may be split into fragments
//! joined by a backslash at end of line; such a value is an array in
//! disguise and decodes to [`Value::List`].
//!
//! [`decode`] is a tokenizer plus recursive structure builder, not a
//! substitution pipeline, so nested tables and strings containing brackets
//! or quotes survive. [`encode`] is the inverse and is infallible: every
//! [`Value`] shape has a rendering. `decode(encode(t))` is structurally
//! equal to `t` for every `t` a prior `decode` produced.

use crate::error::{KoshelfError, Result};
use crate::value::{Table, Value, LIST_DELIMITER};

const COMMENT_MARKER: &str = "--";
const RETURN_PREFIX: &str = "return";
const INDENT: &str = "    ";

/// Decodes one settings file into a table tree.
///
/// Fails with [`KoshelfError::Parse`] on any malformed input; no partial
/// tree is returned.
pub fn decode(text: &str) -> Result<Table> {
    let mut parser = Parser::new(text);
    parser.skip_leading_comments();
    parser.expect_return()?;
    parser.skip_whitespace();
    let table = parser.parse_table()?;
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(parser.error("trailing content after table"));
    }
    Ok(table)
}

/// Encodes a table tree back into the settings dialect: `return` prefix,
/// 4-space indentation, one key per line, trailing newline.
pub fn encode(table: &Table) -> String {
    let mut out = String::from("return ");
    write_table(&mut out, table, 0);
    out.push('\n');
    out
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0, line: 1 }
    }

    fn rest(&self) -> &str {
        &self.text[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn skip_leading_comments(&mut self) {
        loop {
            self.skip_whitespace();
            if self.rest().starts_with(COMMENT_MARKER) {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                return;
            }
        }
    }

    fn expect_return(&mut self) -> Result<()> {
        self.skip_whitespace();
        if self.rest().starts_with(RETURN_PREFIX) {
            self.pos += RETURN_PREFIX.len();
            Ok(())
        } else {
            Err(self.error("expected `return` prefix"))
        }
    }

    fn error(&self, message: impl Into<String>) -> KoshelfError {
        KoshelfError::Parse {
            line: self.line,
            message: message.into(),
        }
    }

    fn parse_table(&mut self) -> Result<Table> {
        self.skip_whitespace();
        if !self.eat('{') {
            return Err(self.error("expected `{`"));
        }
        let mut table = Table::new();
        loop {
            self.skip_whitespace();
            if self.eat('}') {
                return Ok(table);
            }
            if self.at_end() {
                return Err(self.error("unterminated table"));
            }
            let key = self.parse_key()?;
            self.skip_whitespace();
            if !self.eat('=') {
                return Err(self.error("expected `=` after key"));
            }
            let value = self.parse_value()?;
            table.insert(key, value);
            self.skip_whitespace();
            if !self.eat(',') {
                // last entry may omit the comma
                self.skip_whitespace();
                if self.eat('}') {
                    return Ok(table);
                }
                return Err(self.error("expected `,` or `}` after table entry"));
            }
        }
    }

    fn parse_key(&mut self) -> Result<String> {
        if !self.eat('[') {
            return Err(self.error("expected `[` to open a key"));
        }
        self.skip_whitespace();
        let key = match self.peek() {
            Some('"') => match self.parse_string()? {
                Value::Str(s) => s,
                _ => return Err(self.error("delimited list cannot be used as a key")),
            },
            Some(c) if c.is_ascii_digit() => {
                let start = self.pos;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.bump();
                }
                self.text[start..self.pos].to_string()
            }
            _ => return Err(self.error("expected a numeric or quoted key")),
        };
        self.skip_whitespace();
        if !self.eat(']') {
            return Err(self.error("expected `]` to close the key"));
        }
        Ok(key)
    }

    fn parse_value(&mut self) -> Result<Value> {
        self.skip_whitespace();
        match self.peek() {
            Some('{') => Ok(Value::Table(self.parse_table()?)),
            Some('"') => self.parse_string(),
            Some(c) if c.is_ascii_digit() || c == '-' || c == '.' => self.parse_number(),
            Some(c) if c.is_alphabetic() => self.parse_bare_word(),
            Some(c) => Err(self.error(format!("unexpected character `{c}`"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_string(&mut self) -> Result<Value> {
        self.bump(); // opening quote
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => match self.bump() {
                    // a backslash at end of line joins quoted fragments
                    // into one delimited list value
                    Some('\n') => out.push_str(LIST_DELIMITER),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some('\'') => out.push('\''),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c) => return Err(self.error(format!("unsupported escape `\\{c}`"))),
                    None => return Err(self.error("unterminated string")),
                },
                Some('\n') | None => return Err(self.error("unterminated string")),
                Some(c) => out.push(c),
            }
        }
        if out.contains(LIST_DELIMITER) {
            Ok(Value::List(
                out.split(LIST_DELIMITER).map(str::to_string).collect(),
            ))
        } else {
            Ok(Value::Str(out))
        }
    }

    fn parse_number(&mut self) -> Result<Value> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.bump();
        }
        while matches!(
            self.peek(),
            Some(c) if c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')
        ) {
            self.bump();
        }
        let literal = &self.text[start..self.pos];
        literal
            .parse::<f64>()
            .map(Value::Num)
            .map_err(|_| self.error(format!("invalid number `{literal}`")))
    }

    fn parse_bare_word(&mut self) -> Result<Value> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.bump();
        }
        match &self.text[start..self.pos] {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            word => Err(self.error(format!("unrecognized literal `{word}`"))),
        }
    }
}

fn write_table(out: &mut String, table: &Table, depth: usize) {
    if table.is_empty() {
        out.push_str("{}");
        return;
    }
    out.push_str("{\n");
    for (key, value) in table {
        for _ in 0..=depth {
            out.push_str(INDENT);
        }
        write_key(out, key);
        out.push_str(" = ");
        write_value(out, value, depth + 1);
        out.push_str(",\n");
    }
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    out.push('}');
}

fn write_key(out: &mut String, key: &str) {
    if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) {
        out.push('[');
        out.push_str(key);
        out.push(']');
    } else {
        out.push_str("[\"");
        escape_into(out, key);
        out.push_str("\"]");
    }
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Str(s) => {
            out.push('"');
            escape_into(out, s);
            out.push('"');
        }
        Value::Num(n) => out.push_str(&format_number(*n)),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Table(t) => write_table(out, t, depth),
        Value::List(items) => {
            out.push('"');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str("\\\n");
                }
                escape_into(out, item);
            }
            out.push('"');
        }
    }
}

fn escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
