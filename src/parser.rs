//! JSON5 reader that keeps source positions.
//!
//! Script and host files are human-edited, so the reader accepts the JSON5
//! conveniences (comments, unquoted keys, single quotes, trailing commas, hex
//! numbers) and records the line/column of every value it produces. Errors
//! are [`ScriptError`]s pointing at the offending character.

use std::path::Path;

use crate::error::ScriptError;
use crate::node::{Location, NodeMap, NodeValue, ScriptNode};

/// Deepest object/array nesting a document may use.
pub const MAX_NESTING: usize = 128;

/// Parse `text` into a node tree. `file` is only used for error messages;
/// nodes are tagged with their owning file by the loader.
pub fn parse(text: &str, file: &Path) -> Result<ScriptNode, ScriptError> {
    let mut parser = Parser::new(text, file);
    parser.skip_trivia()?;
    let node = parser.parse_value()?;
    parser.skip_trivia()?;
    if let Some(c) = parser.peek() {
        return Err(parser.error(format!("Unexpected character '{}' after end of document", c)));
    }
    Ok(node)
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    depth: usize,
    file: &'a Path,
}

impl<'a> Parser<'a> {
    fn new(text: &str, file: &'a Path) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            depth: 0,
            file,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::at(message, self.file, self.line, self.column)
    }

    fn error_at(&self, message: impl Into<String>, location: Location) -> ScriptError {
        ScriptError::at(message, self.file, location.line, location.column)
    }

    fn expect(&mut self, expected: char) -> Result<(), ScriptError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.advance();
                Ok(())
            }
            Some(c) => Err(self.error(format!("Expected '{}' but found '{}'", expected, c))),
            None => Err(self.error(format!("Expected '{}' but reached end of input", expected))),
        }
    }

    /// Skip whitespace and both comment styles.
    fn skip_trivia(&mut self) -> Result<(), ScriptError> {
        loop {
            match (self.peek(), self.peek2()) {
                (Some(c), _) if c.is_whitespace() || c == '\u{feff}' => {
                    self.advance();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.location();
                    self.advance();
                    self.advance();
                    loop {
                        match (self.peek(), self.peek2()) {
                            (Some('*'), Some('/')) => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            (Some(_), _) => {
                                self.advance();
                            }
                            (None, _) => {
                                return Err(self.error_at("Unterminated block comment", start));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_value(&mut self) -> Result<ScriptNode, ScriptError> {
        let location = self.location();
        match self.peek() {
            Some(open @ ('{' | '[')) => {
                if self.depth >= MAX_NESTING {
                    return Err(self.error_at(
                        format!("Nesting is deeper than {} levels", MAX_NESTING),
                        location,
                    ));
                }
                self.depth += 1;
                let node = if open == '{' {
                    self.parse_object()
                } else {
                    self.parse_array()
                };
                self.depth -= 1;
                node
            }
            Some(q @ ('"' | '\'')) => {
                let s = self.parse_string(q)?;
                Ok(ScriptNode::new(NodeValue::String(s), location))
            }
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.parse_number(),
            Some(c) if is_ident_start(c) => {
                let word = self.parse_identifier();
                match word.as_str() {
                    "true" => Ok(ScriptNode::new(NodeValue::Boolean(true), location)),
                    "false" => Ok(ScriptNode::new(NodeValue::Boolean(false), location)),
                    "null" => Ok(ScriptNode::new(NodeValue::Null, location)),
                    "Infinity" | "NaN" => {
                        Err(self.error_at(format!("'{}' is not a supported number", word), location))
                    }
                    _ => Err(self.error_at(format!("Unexpected identifier '{}'", word), location)),
                }
            }
            Some(c) => Err(self.error(format!("Unexpected character '{}'", c))),
            None => Err(self.error("Unexpected end of input")),
        }
    }

    fn parse_object(&mut self) -> Result<ScriptNode, ScriptError> {
        let location = self.location();
        self.expect('{')?;
        let mut map = NodeMap::new();

        loop {
            self.skip_trivia()?;
            if self.peek() == Some('}') {
                self.advance();
                break;
            }

            let key = match self.peek() {
                Some(q @ ('"' | '\'')) => self.parse_string(q)?,
                Some(c) if is_ident_start(c) => self.parse_identifier(),
                Some(c) => return Err(self.error(format!("Invalid property name start '{}'", c))),
                None => return Err(self.error_at("Unterminated object", location)),
            };

            self.skip_trivia()?;
            self.expect(':')?;
            self.skip_trivia()?;
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_trivia()?;

            match self.peek() {
                Some(',') => {
                    self.advance();
                }
                Some('}') => {
                    self.advance();
                    break;
                }
                Some(c) => return Err(self.error(format!("Expected ',' or '}}' but found '{}'", c))),
                None => return Err(self.error_at("Unterminated object", location)),
            }
        }

        Ok(ScriptNode::new(NodeValue::Object(map), location))
    }

    fn parse_array(&mut self) -> Result<ScriptNode, ScriptError> {
        let location = self.location();
        self.expect('[')?;
        let mut items = Vec::new();

        loop {
            self.skip_trivia()?;
            if self.peek() == Some(']') {
                self.advance();
                break;
            }

            items.push(self.parse_value()?);
            self.skip_trivia()?;

            match self.peek() {
                Some(',') => {
                    self.advance();
                }
                Some(']') => {
                    self.advance();
                    break;
                }
                Some(c) => return Err(self.error(format!("Expected ',' or ']' but found '{}'", c))),
                None => return Err(self.error_at("Unterminated array", location)),
            }
        }

        Ok(ScriptNode::new(NodeValue::Array(items), location))
    }

    fn parse_identifier(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if s.is_empty() && !is_ident_start(c) {
                break;
            }
            if !s.is_empty() && !is_ident_continue(c) {
                break;
            }
            s.push(c);
            self.advance();
        }
        s
    }

    fn parse_string(&mut self, quote: char) -> Result<String, ScriptError> {
        let start = self.location();
        self.advance();
        let mut s = String::new();

        loop {
            match self.advance() {
                None => return Err(self.error_at("Unterminated string", start)),
                Some(c) if c == quote => return Ok(s),
                Some('\n') => return Err(self.error_at("Unescaped line break in string", start)),
                Some('\\') => self.parse_escape(&mut s)?,
                Some(c) => s.push(c),
            }
        }
    }

    fn parse_escape(&mut self, out: &mut String) -> Result<(), ScriptError> {
        let c = self
            .advance()
            .ok_or_else(|| self.error("Unterminated escape sequence"))?;
        match c {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !self.peek().is_some_and(|d| d.is_ascii_digit()) => out.push('\0'),
            // Line continuation
            '\n' => {}
            '\r' => {
                if self.peek() == Some('\n') {
                    self.advance();
                }
            }
            'x' => {
                let code = self.read_hex(2)?;
                out.push(char::from_u32(code).ok_or_else(|| self.error("Invalid \\x escape"))?);
            }
            'u' => {
                let high = self.read_hex(4)?;
                let code = if (0xD800..0xDC00).contains(&high) {
                    if self.peek() == Some('\\') && self.peek2() == Some('u') {
                        self.advance();
                        self.advance();
                        let low = self.read_hex(4)?;
                        0x10000 + ((high - 0xD800) << 10) + (low.wrapping_sub(0xDC00) & 0x3FF)
                    } else {
                        return Err(self.error("Unpaired surrogate in \\u escape"));
                    }
                } else {
                    high
                };
                out.push(char::from_u32(code).ok_or_else(|| self.error("Invalid \\u escape"))?);
            }
            c if c.is_ascii_digit() => {
                return Err(self.error("Octal escapes are not allowed"));
            }
            other => out.push(other),
        }
        Ok(())
    }

    fn read_hex(&mut self, digits: usize) -> Result<u32, ScriptError> {
        let mut value = 0u32;
        for _ in 0..digits {
            let d = self
                .peek()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("Invalid hexadecimal escape"))?;
            self.advance();
            value = value * 16 + d;
        }
        Ok(value)
    }

    fn parse_number(&mut self) -> Result<ScriptNode, ScriptError> {
        let location = self.location();
        let mut negative = false;

        if let Some(sign @ ('-' | '+')) = self.peek() {
            negative = sign == '-';
            self.advance();
        }

        if self.peek().is_some_and(is_ident_start) {
            let word = self.parse_identifier();
            return Err(self.error_at(format!("'{}' is not a supported number", word), location));
        }

        if self.peek() == Some('0') && matches!(self.peek2(), Some('x' | 'X')) {
            self.advance();
            self.advance();
            let mut digits = String::new();
            while let Some(c) = self.peek().filter(char::is_ascii_hexdigit) {
                digits.push(c);
                self.advance();
            }
            let magnitude = i64::from_str_radix(&digits, 16)
                .map_err(|_| self.error_at("Invalid hexadecimal number", location))?;
            let value = if negative { -magnitude } else { magnitude };
            return Ok(ScriptNode::new(NodeValue::Number(value.into()), location));
        }

        let mut text = String::new();
        if negative {
            text.push('-');
        }
        let mut is_float = false;

        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            text.push(c);
            self.advance();
        }
        if self.peek() == Some('.') {
            is_float = true;
            self.advance();
            text.push('.');
            while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                text.push(c);
                self.advance();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            is_float = true;
            text.push('e');
            self.advance();
            if let Some(sign @ ('-' | '+')) = self.peek() {
                text.push(sign);
                self.advance();
            }
            while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                text.push(c);
                self.advance();
            }
        }

        if !text.chars().any(|c| c.is_ascii_digit()) {
            return Err(self.error_at("Invalid number", location));
        }

        let number = if is_float {
            parse_float(&text)
        } else {
            text.parse::<i64>()
                .ok()
                .map(serde_json::Number::from)
                .or_else(|| parse_float(&text))
        };

        number
            .map(|n| ScriptNode::new(NodeValue::Number(n), location))
            .ok_or_else(|| self.error_at(format!("Invalid number '{}'", text), location))
    }
}

fn parse_float(text: &str) -> Option<serde_json::Number> {
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
