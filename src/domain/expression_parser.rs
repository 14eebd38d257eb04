//! Alpha expression parser.
//!
//! Recursive descent over the grammar below, producing an [`Expr`] tree with
//! error messages that carry the byte offset of the offending token.
//!
//! ```text
//! expr       := comparison
//! comparison := additive (("<" | "<=" | ">" | ">=" | "==" | "!=") additive)?
//! additive   := term (("+" | "-") term)*
//! term       := power (("*" | "/") power)*
//! power      := unary ("^" power)?
//! unary      := "-" unary | primary
//! primary    := number | field | call | "(" expr ")"
//! call       := name "(" expr ("," expr)* ")"
//! ```

use crate::domain::error::ParseError;
use crate::domain::expression::{BinaryOp, Expr, Field, Function};

/// Deepest nesting accepted, both while parsing and in the resulting tree.
/// Evaluation recurses over the tree, so this also bounds its stack use.
pub const MAX_DEPTH: usize = 256;

/// A parsed subtree and its height.
struct Node {
    expr: Expr,
    depth: usize,
}

impl Node {
    fn leaf(expr: Expr) -> Self {
        Self { expr, depth: 1 }
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    nesting: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            nesting: 0,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn found(&self) -> String {
        match self.peek() {
            Some(ch) => format!("'{ch}'"),
            None => "end of input".to_string(),
        }
    }

    fn error(&self, message: String) -> ParseError {
        ParseError {
            message,
            position: self.pos,
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            _ => Err(self.error(format!("expected '{}', found {}", expected, self.found()))),
        }
    }

    fn consume_exact(&mut self, s: &str) -> bool {
        if self.remaining().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn parse_word(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        &self.input[start..self.pos]
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        let num_str = &self.input[start..self.pos];
        if digits == 0 {
            return Err(ParseError {
                message: format!("invalid number: '{}'", num_str),
                position: start,
            });
        }
        num_str.parse::<f64>().map_err(|_| ParseError {
            message: format!("invalid number: '{}'", num_str),
            position: start,
        })
    }

    fn too_deep(&self, position: usize) -> ParseError {
        ParseError {
            message: format!("expression nested too deeply (limit {MAX_DEPTH})"),
            position,
        }
    }

    fn descend(&mut self) -> Result<(), ParseError> {
        self.nesting += 1;
        if self.nesting > MAX_DEPTH {
            return Err(self.too_deep(self.pos));
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.nesting -= 1;
    }

    fn node(&self, expr: Expr, depth: usize, position: usize) -> Result<Node, ParseError> {
        if depth > MAX_DEPTH {
            return Err(self.too_deep(position));
        }
        Ok(Node { expr, depth })
    }

    fn binary(&self, op: BinaryOp, left: Node, right: Node, position: usize) -> Result<Node, ParseError> {
        let depth = left.depth.max(right.depth) + 1;
        self.node(Expr::binary(op, left.expr, right.expr), depth, position)
    }

    fn parse_expr(&mut self) -> Result<Node, ParseError> {
        self.descend()?;
        let node = self.parse_comparison()?;
        self.ascend();
        Ok(node)
    }

    fn parse_comparison_op(&mut self) -> Option<BinaryOp> {
        // two-character operators first so "<=" is not read as "<"
        for (symbol, op) in [
            ("<=", BinaryOp::Le),
            (">=", BinaryOp::Ge),
            ("==", BinaryOp::Eq),
            ("!=", BinaryOp::Ne),
            ("<", BinaryOp::Lt),
            (">", BinaryOp::Gt),
        ] {
            if self.consume_exact(symbol) {
                return Some(op);
            }
        }
        None
    }

    fn parse_comparison(&mut self) -> Result<Node, ParseError> {
        let left = self.parse_additive()?;
        self.skip_whitespace();
        let at = self.pos;
        match self.parse_comparison_op() {
            Some(op) => {
                let right = self.parse_additive()?;
                self.binary(op, left, right, at)
            }
            None => Ok(left),
        }
    }

    fn parse_additive(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_term()?;
        loop {
            self.skip_whitespace();
            let at = self.pos;
            let op = match self.peek() {
                Some('+') => BinaryOp::Add,
                Some('-') => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_term()?;
            left = self.binary(op, left, right, at)?;
        }
    }

    fn parse_term(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_power()?;
        loop {
            self.skip_whitespace();
            let at = self.pos;
            let op = match self.peek() {
                Some('*') => BinaryOp::Mul,
                Some('/') => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_power()?;
            left = self.binary(op, left, right, at)?;
        }
    }

    fn parse_power(&mut self) -> Result<Node, ParseError> {
        let base = self.parse_unary()?;
        self.skip_whitespace();
        if self.peek() == Some('^') {
            let at = self.pos;
            self.advance();
            self.descend()?;
            let exponent = self.parse_power()?;
            self.ascend();
            return self.binary(BinaryOp::Pow, base, exponent, at);
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<Node, ParseError> {
        self.skip_whitespace();
        if self.peek() == Some('-') {
            let at = self.pos;
            self.advance();
            self.descend()?;
            let inner = self.parse_unary()?;
            self.ascend();
            return match inner.expr {
                Expr::Number(v) => Ok(Node::leaf(Expr::Number(-v))),
                other => self.node(Expr::Neg(Box::new(other)), inner.depth + 1, at),
            };
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Node, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch.is_ascii_digit() || ch == '.' => {
                Ok(Node::leaf(Expr::Number(self.parse_number()?)))
            }
            Some('(') => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect_char(')')?;
                Ok(inner)
            }
            Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => self.parse_identifier(),
            _ => Err(self.error(format!("expected expression, found {}", self.found()))),
        }
    }

    fn parse_identifier(&mut self) -> Result<Node, ParseError> {
        let start = self.pos;
        let name = self.parse_word();
        self.skip_whitespace();

        if self.peek() != Some('(') {
            return Field::from_name(name)
                .map(|field| Node::leaf(Expr::Field(field)))
                .ok_or_else(|| ParseError {
                    message: format!(
                        "unknown field '{}' (expected open, high, low, close, volume, returns)",
                        name
                    ),
                    position: start,
                });
        }

        let function = Function::from_name(name).ok_or_else(|| ParseError {
            message: format!("unknown function '{}'", name),
            position: start,
        })?;
        self.advance();
        self.parse_call(function, start)
    }

    fn parse_call(&mut self, function: Function, start: usize) -> Result<Node, ParseError> {
        let mut args = Vec::new();
        let mut positions = Vec::new();
        let mut depth = 0;

        self.skip_whitespace();
        if self.peek() != Some(')') {
            loop {
                self.skip_whitespace();
                positions.push(self.pos);
                let arg = self.parse_expr()?;
                depth = depth.max(arg.depth);
                args.push(arg.expr);
                self.skip_whitespace();
                if self.peek() == Some(',') {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_char(')')?;

        let expected = function.arity() + usize::from(function.takes_window());
        if args.len() != expected {
            return Err(ParseError {
                message: format!(
                    "{}() takes {} argument{}, found {}",
                    function.name(),
                    expected,
                    if expected == 1 { "" } else { "s" },
                    args.len()
                ),
                position: start,
            });
        }

        let window = if function.takes_window() {
            let position = positions[expected - 1];
            match args.pop() {
                Some(Expr::Number(v)) if v >= 1.0 && v.fract() == 0.0 => Some(v as usize),
                _ => {
                    return Err(ParseError {
                        message: format!(
                            "window of {}() must be a positive integer literal",
                            function.name()
                        ),
                        position,
                    });
                }
            }
        } else {
            None
        };

        self.node(Expr::call(function, args, window), depth + 1, start)
    }

    fn parse(&mut self) -> Result<Expr, ParseError> {
        let node = self.parse_expr()?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error(format!(
                "unexpected input after expression: '{}'",
                self.remaining()
            )));
        }
        Ok(node.expr)
    }
}

pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse()
}
