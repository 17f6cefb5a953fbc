//! Interpolation expression lexer, AST, parser and evaluator.
//!
//! The language is deliberately small: literals, property access into the run
//! context namespaces, calls to a fixed set of helper functions and value
//! methods, and the usual unary/binary/ternary operators. There is no
//! assignment and no way to define functions.
//!
//! Operator precedence (lowest → highest):
//!   ternary  →  or  →  and  →  equality  →  relational  →
//!   additive  →  multiplicative  →  unary  →  postfix  →  primary

use serde_json::{Number, Value};

// ── EvalContext ───────────────────────────────────────────────────────────────

/// Dependency-injection interface used by the evaluator.
///
/// [`RunContext`](crate::run_context::RunContext) implements this to expose
/// its namespaces and helper functions.
pub trait EvalContext {
    /// Resolve a bare identifier.
    fn lookup(&self, name: &str) -> Option<Value>;

    /// True for namespaces that only hold functions (`fs`, `path`, ...).
    fn is_function_namespace(&self, name: &str) -> bool;

    /// Invoke `namespace.function(args)`.
    fn call_function(&self, namespace: &str, function: &str, args: Vec<Value>)
    -> Result<Value, String>;
}

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Num(Number),
    Str(String),
    Ident(String),

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,

    Eq,       // ==
    Ne,       // !=
    StrictEq, // ===
    StrictNe, // !==
    Lt,
    Le,
    Gt,
    Ge,

    And, // &&
    Or,  // ||

    Question,
    Colon,
    Comma,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Eof,
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

struct Lexer<'a> {
    src: &'a [u8],
    text: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Lexer {
            src: text.as_bytes(),
            text,
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn eat(&mut self, ch: u8) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn tokenize(mut self) -> Result<Vec<(Token, usize)>, String> {
        let mut tokens = Vec::new();
        loop {
            while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
                self.pos += 1;
            }
            let start = self.pos;
            let Some(ch) = self.peek() else {
                tokens.push((Token::Eof, start));
                return Ok(tokens);
            };
            self.pos += 1;

            let token = match ch {
                b'+' => Token::Plus,
                b'-' => Token::Minus,
                b'*' => Token::Star,
                b'/' => Token::Slash,
                b'%' => Token::Percent,
                b'?' => Token::Question,
                b':' => Token::Colon,
                b',' => Token::Comma,
                b'(' => Token::LParen,
                b')' => Token::RParen,
                b'[' => Token::LBracket,
                b']' => Token::RBracket,
                b'.' if !matches!(self.peek(), Some(b'0'..=b'9')) => Token::Dot,
                b'!' => {
                    if self.eat(b'=') {
                        if self.eat(b'=') { Token::StrictNe } else { Token::Ne }
                    } else {
                        Token::Bang
                    }
                }
                b'=' => {
                    if !self.eat(b'=') {
                        return Err(format!("Assignment is not supported (offset {})", start));
                    }
                    if self.eat(b'=') { Token::StrictEq } else { Token::Eq }
                }
                b'<' => if self.eat(b'=') { Token::Le } else { Token::Lt },
                b'>' => if self.eat(b'=') { Token::Ge } else { Token::Gt },
                b'&' if self.eat(b'&') => Token::And,
                b'|' if self.eat(b'|') => Token::Or,
                b'"' | b'\'' => self.read_string(ch, start)?,
                b'0'..=b'9' | b'.' => self.read_number(start)?,
                c if c.is_ascii_alphabetic() || c == b'_' || c == b'$' => {
                    while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_' || c == b'$')
                    {
                        self.pos += 1;
                    }
                    Token::Ident(self.text[start..self.pos].to_string())
                }
                _ => {
                    let c = self.text[start..].chars().next().unwrap_or('?');
                    return Err(format!("Unexpected character '{}' at offset {}", c, start));
                }
            };
            tokens.push((token, start));
        }
    }

    fn read_number(&mut self, start: usize) -> Result<Token, String> {
        while matches!(self.peek(), Some(b'0'..=b'9' | b'.')) {
            self.pos += 1;
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        let text = &self.text[start..self.pos];
        let number = match text.parse::<i64>() {
            Ok(i) => Some(Number::from(i)),
            Err(_) => text.parse::<f64>().ok().and_then(Number::from_f64),
        };
        number
            .map(Token::Num)
            .ok_or_else(|| format!("Invalid number '{}' at offset {}", text, start))
    }

    fn read_string(&mut self, quote: u8, start: usize) -> Result<Token, String> {
        let mut s = String::new();
        let mut chars = self.text[self.pos..].char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                c if c as u32 == quote as u32 => {
                    self.pos += i + 1;
                    return Ok(Token::Str(s));
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => s.push('\n'),
                    Some((_, 't')) => s.push('\t'),
                    Some((_, 'r')) => s.push('\r'),
                    Some((_, '0')) => s.push('\0'),
                    Some((_, other)) => s.push(other),
                    None => break,
                },
                c => s.push(c),
            }
        }
        Err(format!("Unterminated string starting at offset {}", start))
    }
}

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Array(Vec<Expr>),
    Ident(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Deepest nesting of parentheses, brackets, calls and prefix operators.
pub const MAX_NESTING: usize = 128;

/// Parse `src` into an expression tree.
pub fn parse(src: &str) -> Result<Expr, String> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    let expr = parser.ternary()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(format!(
            "Unexpected {:?} at offset {}",
            other,
            parser.offset()
        )),
    }
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|(t, _)| t)
            .unwrap_or(&Token::Eof)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, o)| *o).unwrap_or(0)
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), String> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(format!(
                "Expected {:?} but found {:?} at offset {}",
                token,
                self.peek(),
                self.offset()
            ))
        }
    }

    fn descend(&mut self) -> Result<(), String> {
        if self.depth >= MAX_NESTING {
            return Err(format!(
                "Expression nesting is deeper than {} levels at offset {}",
                MAX_NESTING,
                self.offset()
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn ternary(&mut self) -> Result<Expr, String> {
        self.descend()?;
        let expr = self.conditional();
        self.depth -= 1;
        expr
    }

    fn conditional(&mut self) -> Result<Expr, String> {
        let cond = self.or()?;
        if self.eat(&Token::Question) {
            let then = self.ternary()?;
            self.expect(Token::Colon)?;
            let otherwise = self.ternary()?;
            return Ok(Expr::Conditional(
                Box::new(cond),
                Box::new(then),
                Box::new(otherwise),
            ));
        }
        Ok(cond)
    }

    fn or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.and()?;
        while self.eat(&Token::Or) {
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.equality()?;
        while self.eat(&Token::And) {
            let rhs = self.equality()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr, String> {
        let mut lhs = self.relational()?;
        loop {
            let op = match self.peek() {
                Token::Eq => BinaryOp::Eq,
                Token::Ne => BinaryOp::Ne,
                Token::StrictEq => BinaryOp::StrictEq,
                Token::StrictNe => BinaryOp::StrictNe,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.relational()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn relational(&mut self) -> Result<Expr, String> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn additive(&mut self) -> Result<Expr, String> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, String> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Mod,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, String> {
        let op = match self.peek() {
            Token::Bang => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Plus,
            _ => return self.postfix(),
        };
        self.pos += 1;
        self.descend()?;
        let operand = self.unary();
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(operand?)))
    }

    fn postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.pos += 1;
                    match self.next() {
                        Token::Ident(name) => expr = Expr::Member(Box::new(expr), name),
                        other => return Err(format!("Expected property name after '.', found {:?}", other)),
                    }
                }
                Token::LBracket => {
                    self.pos += 1;
                    let index = self.ternary()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                Token::LParen => {
                    self.pos += 1;
                    let args = self.list(Token::RParen)?;
                    expr = Expr::Call(Box::new(expr), args);
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Comma-separated expressions up to `close`, trailing comma allowed.
    fn list(&mut self, close: Token) -> Result<Vec<Expr>, String> {
        let mut items = Vec::new();
        loop {
            if self.eat(&close) {
                return Ok(items);
            }
            items.push(self.ternary()?);
            if !self.eat(&Token::Comma) {
                self.expect(close)?;
                return Ok(items);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, String> {
        let offset = self.offset();
        match self.next() {
            Token::Num(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Ident(name) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" | "undefined" => Expr::Literal(Value::Null),
                _ => Expr::Ident(name),
            }),
            Token::LParen => {
                let inner = self.ternary()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => Ok(Expr::Array(self.list(Token::RBracket)?)),
            Token::Eof => Err("Unexpected end of expression".to_string()),
            other => Err(format!("Unexpected {:?} at offset {}", other, offset)),
        }
    }
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

/// Parse and evaluate `src` against `ctx`.
pub fn evaluate(src: &str, ctx: &dyn EvalContext) -> Result<Value, String> {
    let expr = parse(src)?;
    eval(&expr, ctx)
}

pub fn eval(expr: &Expr, ctx: &dyn EvalContext) -> Result<Value, String> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|e| eval(e, ctx))
                .collect::<Result<_, _>>()?,
        )),
        Expr::Ident(name) => {
            if ctx.is_function_namespace(name) {
                return Err(format!("'{}' can only be used to call its functions", name));
            }
            ctx.lookup(name)
                .ok_or_else(|| format!("{} is not defined", name))
        }
        Expr::Member(object, name) => {
            let object = eval(object, ctx)?;
            member(&object, name)
        }
        Expr::Index(object, index) => {
            let object = eval(object, ctx)?;
            let index = eval(index, ctx)?;
            match (&object, &index) {
                (Value::Null, _) => Err(format!(
                    "Cannot read property '{}' of null",
                    to_display_string(&index)
                )),
                (Value::Array(items), Value::Number(n)) => Ok(n
                    .as_u64()
                    .and_then(|i| items.get(i as usize))
                    .cloned()
                    .unwrap_or(Value::Null)),
                (Value::String(s), Value::Number(n)) => Ok(n
                    .as_u64()
                    .and_then(|i| s.chars().nth(i as usize))
                    .map(|c| Value::String(c.to_string()))
                    .unwrap_or(Value::Null)),
                (_, Value::String(key)) => member(&object, key),
                _ => Ok(Value::Null),
            }
        }
        Expr::Call(callee, args) => {
            let args = args
                .iter()
                .map(|e| eval(e, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            match callee.as_ref() {
                Expr::Member(object, function) => {
                    if let Expr::Ident(namespace) = object.as_ref() {
                        if ctx.is_function_namespace(namespace) {
                            return ctx.call_function(namespace, function, args);
                        }
                    }
                    let receiver = eval(object, ctx)?;
                    call_method(&receiver, function, &args)
                }
                _ => Err("Expression is not callable".to_string()),
            }
        }
        Expr::Unary(op, operand) => {
            let v = eval(operand, ctx)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!truthy(&v))),
                UnaryOp::Neg => number_value(-to_number(&v)),
                UnaryOp::Plus => number_value(to_number(&v)),
            }
        }
        Expr::And(lhs, rhs) => {
            let l = eval(lhs, ctx)?;
            if truthy(&l) { eval(rhs, ctx) } else { Ok(l) }
        }
        Expr::Or(lhs, rhs) => {
            let l = eval(lhs, ctx)?;
            if truthy(&l) { Ok(l) } else { eval(rhs, ctx) }
        }
        Expr::Conditional(cond, then, otherwise) => {
            if truthy(&eval(cond, ctx)?) {
                eval(then, ctx)
            } else {
                eval(otherwise, ctx)
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            let l = eval(lhs, ctx)?;
            let r = eval(rhs, ctx)?;
            binary(*op, &l, &r)
        }
    }
}

fn member(object: &Value, name: &str) -> Result<Value, String> {
    match object {
        Value::Null => Err(format!("Cannot read property '{}' of null", name)),
        Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
        Value::Array(items) if name == "length" => Ok(Value::from(items.len())),
        Value::String(s) if name == "length" => Ok(Value::from(s.chars().count())),
        _ => Ok(Value::Null),
    }
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, String> {
    match op {
        BinaryOp::Add => {
            if matches!(l, Value::String(_) | Value::Array(_) | Value::Object(_))
                || matches!(r, Value::String(_) | Value::Array(_) | Value::Object(_))
            {
                Ok(Value::String(format!(
                    "{}{}",
                    to_display_string(l),
                    to_display_string(r)
                )))
            } else {
                number_value(to_number(l) + to_number(r))
            }
        }
        BinaryOp::Sub => number_value(to_number(l) - to_number(r)),
        BinaryOp::Mul => number_value(to_number(l) * to_number(r)),
        BinaryOp::Div => {
            let divisor = to_number(r);
            if divisor == 0.0 {
                return Err("Division by zero".to_string());
            }
            number_value(to_number(l) / divisor)
        }
        BinaryOp::Mod => {
            let divisor = to_number(r);
            if divisor == 0.0 {
                return Err("Division by zero".to_string());
            }
            number_value(to_number(l) % divisor)
        }
        BinaryOp::StrictEq => Ok(Value::Bool(strict_eq(l, r))),
        BinaryOp::StrictNe => Ok(Value::Bool(!strict_eq(l, r))),
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(l, r))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(l, r))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (l, r) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => to_number(l).partial_cmp(&to_number(r)),
            };
            let result = match ordering {
                None => false,
                Some(o) => match op {
                    BinaryOp::Lt => o.is_lt(),
                    BinaryOp::Le => o.is_le(),
                    BinaryOp::Gt => o.is_gt(),
                    _ => o.is_ge(),
                },
            };
            Ok(Value::Bool(result))
        }
    }
}

fn strict_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => l == r,
    }
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(_) | Value::Bool(_), Value::String(_) | Value::Bool(_) | Value::Number(_))
        | (Value::String(_), Value::Number(_) | Value::Bool(_)) => to_number(l) == to_number(r),
        _ => strict_eq(l, r),
    }
}

fn call_method(receiver: &Value, method: &str, args: &[Value]) -> Result<Value, String> {
    let arg_str = |i: usize| args.get(i).map(to_display_string).unwrap_or_default();

    match (receiver, method) {
        (Value::String(s), "toUpperCase") => Ok(Value::String(s.to_uppercase())),
        (Value::String(s), "toLowerCase") => Ok(Value::String(s.to_lowercase())),
        (Value::String(s), "trim") => Ok(Value::String(s.trim().to_string())),
        (Value::String(s), "startsWith") => Ok(Value::Bool(s.starts_with(&arg_str(0)))),
        (Value::String(s), "endsWith") => Ok(Value::Bool(s.ends_with(&arg_str(0)))),
        (Value::String(s), "includes") => Ok(Value::Bool(s.contains(&arg_str(0)))),
        (Value::String(s), "replace") => Ok(Value::String(s.replacen(&arg_str(0), &arg_str(1), 1))),
        (Value::String(s), "split") => Ok(Value::Array(
            s.split(arg_str(0).as_str())
                .map(|p| Value::String(p.to_string()))
                .collect(),
        )),
        (Value::Array(items), "last") => Ok(items.last().cloned().unwrap_or(Value::Null)),
        (Value::Array(items), "includes") => {
            let needle = args.first().unwrap_or(&Value::Null);
            Ok(Value::Bool(items.iter().any(|v| strict_eq(v, needle))))
        }
        (Value::Array(items), "join") => {
            let sep = if args.is_empty() { ",".to_string() } else { arg_str(0) };
            Ok(Value::String(
                items
                    .iter()
                    .map(to_display_string)
                    .collect::<Vec<_>>()
                    .join(&sep),
            ))
        }
        (Value::Null, _) => Err(format!("Cannot call '{}' on null", method)),
        (_, "toString") => Ok(Value::String(to_display_string(receiver))),
        _ => Err(format!("'{}' is not a function", method)),
    }
}

// ── Value helpers ─────────────────────────────────────────────────────────────

/// Truthiness: `null`, `false`, `0`, `NaN` and `""` are false.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub fn to_number(v: &Value) -> f64 {
    match v {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                0.0
            } else {
                t.parse().unwrap_or(f64::NAN)
            }
        }
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

fn number_value(f: f64) -> Result<Value, String> {
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        return Ok(Value::from(f as i64));
    }
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| "Result is not a finite number".to_string())
}

/// Render a value the way it appears inside interpolated text.
pub fn to_display_string(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(to_display_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => v.to_string(),
    }
}
