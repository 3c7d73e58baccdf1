//! Factor program language.
//!
//! A factor program is a list of assignments, one per line:
//!
//! ```text
//! # daily range and a 20-bar z-score
//! $f_range = high - low
//! $f_z20   = (close - ts_mean(close, 20)) / ts_std(close, 20)
//! ```
//!
//! Targets must start with `$f_`. Expressions support numeric literals,
//! field references, unary minus, `+ - * /`, parentheses and a fixed set
//! of functions. There are no loops, no I/O and no user-defined
//! functions, so a program can only read the series it is handed.

use crate::domain::errors::FactorError;
use crate::domain::market::FACTOR_KEY_PREFIX;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Element-wise functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarFn {
    Abs,
    Sign,
    Log,
    Sqrt,
    Min,
    Max,
    /// `fill(x, v)` replaces undefined values of `x` with the literal `v`
    Fill,
}

impl ScalarFn {
    fn arity(&self) -> usize {
        match self {
            ScalarFn::Abs | ScalarFn::Sign | ScalarFn::Log | ScalarFn::Sqrt => 1,
            ScalarFn::Min | ScalarFn::Max | ScalarFn::Fill => 2,
        }
    }
}

/// Functions over a trailing window of `n` bars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollingFn {
    Mean,
    Std,
    Sum,
    Max,
    Min,
    Rank,
    Delta,
    Delay,
    PctChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Number(f64),
    Field(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        function: ScalarFn,
        args: Vec<Expr>,
    },
    Rolling {
        function: RollingFn,
        input: Box<Expr>,
        window: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub target: String,
    pub expr: Expr,
}

/// A parsed factor program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorProgram {
    pub assignments: Vec<Assignment>,
}

impl FactorProgram {
    pub fn parse(source: &str) -> Result<Self, FactorError> {
        let mut assignments = Vec::new();

        for (idx, raw_line) in source.lines().enumerate() {
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }
            let tokens = tokenize(line).map_err(|message| FactorError::Parse {
                line: idx + 1,
                message,
            })?;
            let assignment = Parser::new(tokens, idx + 1).assignment()?;
            assignments.push(assignment);
        }

        if assignments.is_empty() {
            return Err(FactorError::EmptyProgram);
        }
        Ok(Self { assignments })
    }

    /// Keys this program adds to every record, in assignment order.
    pub fn output_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for a in &self.assignments {
            if !keys.contains(&a.target.as_str()) {
                keys.push(&a.target);
            }
        }
        keys
    }
}

fn strip_comment(line: &str) -> &str {
    let cut = [line.find('#'), line.find("//")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(line.len());
    &line[..cut]
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
    Assign,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn tokenize(line: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Assign);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent part, e.g. 1e-3
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{}'", text))?;
                tokens.push(Token::Number(value));
            }
            c if is_ident_start(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    line: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, line: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            line,
        }
    }

    fn error(&self, message: impl Into<String>) -> FactorError {
        FactorError::Parse {
            line: self.line,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), FactorError> {
        match self.next() {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => Err(self.error(format!("expected {}, found {:?}", what, tok))),
            None => Err(self.error(format!("expected {}, found end of line", what))),
        }
    }

    fn assignment(mut self) -> Result<Assignment, FactorError> {
        let target = match self.next() {
            Some(Token::Ident(name)) => name,
            _ => return Err(self.error("line must start with an assignment target")),
        };
        if !target.starts_with(FACTOR_KEY_PREFIX) || target.len() == FACTOR_KEY_PREFIX.len() {
            return Err(FactorError::InvalidTarget(target));
        }
        self.expect(Token::Assign, "'='")?;
        let expr = self.expr()?;
        if let Some(tok) = self.peek() {
            return Err(self.error(format!("unexpected trailing token {:?}", tok)));
        }
        Ok(Assignment { target, expr })
    }

    fn expr(&mut self) -> Result<Expr, FactorError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, FactorError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, FactorError> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            let inner = self.unary()?;
            return Ok(match inner {
                Expr::Number(v) => Expr::Number(-v),
                other => Expr::Neg(Box::new(other)),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, FactorError> {
        match self.next() {
            Some(Token::Number(v)) => Ok(Expr::Number(v)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let args = self.arguments()?;
                    self.build_call(&name, args)
                } else {
                    Ok(Expr::Field(name))
                }
            }
            Some(tok) => Err(self.error(format!("unexpected token {:?}", tok))),
            None => Err(self.error("unexpected end of line")),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, FactorError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                _ => return Err(self.error("expected ',' or ')' in argument list")),
            }
        }
        Ok(args)
    }

    fn build_call(&self, name: &str, mut args: Vec<Expr>) -> Result<Expr, FactorError> {
        let scalar = match name {
            "abs" => Some(ScalarFn::Abs),
            "sign" => Some(ScalarFn::Sign),
            "log" => Some(ScalarFn::Log),
            "sqrt" => Some(ScalarFn::Sqrt),
            "min" => Some(ScalarFn::Min),
            "max" => Some(ScalarFn::Max),
            "fill" => Some(ScalarFn::Fill),
            _ => None,
        };
        if let Some(function) = scalar {
            if args.len() != function.arity() {
                return Err(FactorError::Arity {
                    function: name.to_string(),
                    expected: function.arity(),
                    found: args.len(),
                });
            }
            if function == ScalarFn::Fill && !matches!(args[1], Expr::Number(_)) {
                return Err(self.error("fill() expects a numeric literal as its second argument"));
            }
            return Ok(Expr::Call { function, args });
        }

        let rolling = match name {
            "ts_mean" => RollingFn::Mean,
            "ts_std" => RollingFn::Std,
            "ts_sum" => RollingFn::Sum,
            "ts_max" => RollingFn::Max,
            "ts_min" => RollingFn::Min,
            "ts_rank" => RollingFn::Rank,
            "ts_delta" => RollingFn::Delta,
            "ts_delay" => RollingFn::Delay,
            "ts_pct_change" => RollingFn::PctChange,
            _ => return Err(FactorError::UnknownFunction(name.to_string())),
        };

        if args.len() != 2 {
            return Err(FactorError::Arity {
                function: name.to_string(),
                expected: 2,
                found: args.len(),
            });
        }
        let window_expr = args.pop().unwrap_or(Expr::Number(0.0));
        let window = match window_expr {
            Expr::Number(v) if v >= 1.0 && v.fract() == 0.0 => v as usize,
            other => {
                return Err(FactorError::InvalidWindow {
                    function: name.to_string(),
                    found: format!("{:?}", other),
                });
            }
        };
        let input = args.pop().unwrap_or(Expr::Number(0.0));

        Ok(Expr::Rolling {
            function: rolling,
            input: Box::new(input),
            window,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_precedence() {
        let program = FactorProgram::parse("$f_x = open + high * 2").unwrap();
        assert_eq!(
            program.assignments[0].expr,
            Expr::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(Expr::Field("open".into())),
                rhs: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    lhs: Box::new(Expr::Field("high".into())),
                    rhs: Box::new(Expr::Number(2.0)),
                }),
            }
        );
    }

    #[test]
    fn test_parse_multiline_with_comments() {
        let src = "# header\n$f_range = high - low // spread\n\n$f_mom = ts_delta(close, 5)\n";
        let program = FactorProgram::parse(src).unwrap();
        assert_eq!(program.output_keys(), vec!["$f_range", "$f_mom"]);
        assert!(matches!(
            program.assignments[1].expr,
            Expr::Rolling {
                function: RollingFn::Delta,
                window: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_negative_literal_folds() {
        let program = FactorProgram::parse("$f_neg = -1.5e1 * close").unwrap();
        match &program.assignments[0].expr {
            Expr::Binary { lhs, .. } => assert_eq!(**lhs, Expr::Number(-15.0)),
            other => panic!("unexpected expr {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unprefixed_target() {
        let err = FactorProgram::parse("range = high - low").unwrap_err();
        assert_eq!(err, FactorError::InvalidTarget("range".to_string()));
    }

    #[test]
    fn test_rejects_unknown_function() {
        let err = FactorProgram::parse("$f_x = eval(close)").unwrap_err();
        assert_eq!(err, FactorError::UnknownFunction("eval".to_string()));
    }

    #[test]
    fn test_rejects_non_literal_window() {
        let err = FactorProgram::parse("$f_x = ts_mean(close, volume)").unwrap_err();
        assert!(matches!(err, FactorError::InvalidWindow { .. }));
    }

    #[test]
    fn test_reports_line_number() {
        let err = FactorProgram::parse("$f_a = close\n$f_b = (close").unwrap_err();
        assert!(matches!(err, FactorError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_empty_program() {
        assert_eq!(
            FactorProgram::parse("# nothing\n").unwrap_err(),
            FactorError::EmptyProgram
        );
    }
}
