//! A small internal expression language for virtual-point formulas and
//! alarm condition/message scripts.
//!
//! No scripting-VM crate appears anywhere in the retrieval pack for this
//! kind of embedded evaluation, so rather than pull in an unrelated
//! general-purpose engine this implements the narrow arithmetic/comparison
//! subset the rule engine actually needs: `+ - * / ( )`, comparisons
//! (`> >= < <= == !=`), and boolean combinators (`&& ||`), over named
//! variables resolved from a context map. Numbers are the only value type;
//! booleans are represented as `1.0`/`0.0`.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ExprError {
    UnexpectedToken(String),
    UnexpectedEnd,
    UnknownVariable(String),
    DivisionByZero,
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprError::UnexpectedToken(t) => write!(f, "unexpected token `{t}`"),
            ExprError::UnexpectedEnd => write!(f, "unexpected end of expression"),
            ExprError::UnknownVariable(v) => write!(f, "unknown variable `{v}`"),
            ExprError::DivisionByZero => write!(f, "division by zero"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Lparen,
    Rparen,
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
    And,
    Or,
}

fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' => i += 1,
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
                tokens.push(Token::Lparen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Rparen);
                i += 1;
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Gte);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Lte);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Neq);
                i += 2;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text.parse::<f64>().map_err(|_| ExprError::UnexpectedToken(text))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(ExprError::UnexpectedToken(other.to_string())),
        }
    }
    Ok(tokens)
}

/// A parsed expression, ready to evaluate repeatedly against different
/// variable contexts without re-tokenizing.
#[derive(Debug, Clone)]
pub struct Expr {
    tokens: Vec<Token>,
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        self.pos += 1;
        tok
    }

    fn or_expr(&mut self, ctx: &HashMap<String, f64>) -> Result<f64, ExprError> {
        let mut lhs = self.and_expr(ctx)?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.next();
            let rhs = self.and_expr(ctx)?;
            lhs = ((lhs != 0.0) || (rhs != 0.0)) as i32 as f64;
        }
        Ok(lhs)
    }

    fn and_expr(&mut self, ctx: &HashMap<String, f64>) -> Result<f64, ExprError> {
        let mut lhs = self.comparison(ctx)?;
        while matches!(self.peek(), Some(Token::And)) {
            self.next();
            let rhs = self.comparison(ctx)?;
            lhs = ((lhs != 0.0) && (rhs != 0.0)) as i32 as f64;
        }
        Ok(lhs)
    }

    fn comparison(&mut self, ctx: &HashMap<String, f64>) -> Result<f64, ExprError> {
        let lhs = self.additive(ctx)?;
        let op = match self.peek() {
            Some(Token::Gt) => Some(|a: f64, b: f64| a > b),
            Some(Token::Gte) => Some(|a: f64, b: f64| a >= b),
            Some(Token::Lt) => Some(|a: f64, b: f64| a < b),
            Some(Token::Lte) => Some(|a: f64, b: f64| a <= b),
            Some(Token::Eq) => Some(|a: f64, b: f64| (a - b).abs() < f64::EPSILON),
            Some(Token::Neq) => Some(|a: f64, b: f64| (a - b).abs() >= f64::EPSILON),
            _ => None,
        };
        if let Some(op) = op {
            self.next();
            let rhs = self.additive(ctx)?;
            return Ok(op(lhs, rhs) as i32 as f64);
        }
        Ok(lhs)
    }

    fn additive(&mut self, ctx: &HashMap<String, f64>) -> Result<f64, ExprError> {
        let mut lhs = self.multiplicative(ctx)?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.next();
                    lhs += self.multiplicative(ctx)?;
                }
                Some(Token::Minus) => {
                    self.next();
                    lhs -= self.multiplicative(ctx)?;
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self, ctx: &HashMap<String, f64>) -> Result<f64, ExprError> {
        let mut lhs = self.unary(ctx)?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.next();
                    lhs *= self.unary(ctx)?;
                }
                Some(Token::Slash) => {
                    self.next();
                    let rhs = self.unary(ctx)?;
                    if rhs == 0.0 {
                        return Err(ExprError::DivisionByZero);
                    }
                    lhs /= rhs;
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn unary(&mut self, ctx: &HashMap<String, f64>) -> Result<f64, ExprError> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.next();
            return Ok(-self.unary(ctx)?);
        }
        self.primary(ctx)
    }

    fn primary(&mut self, ctx: &HashMap<String, f64>) -> Result<f64, ExprError> {
        match self.next().cloned() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Ident(name)) => ctx
                .get(&name)
                .copied()
                .ok_or(ExprError::UnknownVariable(name)),
            Some(Token::Lparen) => {
                let value = self.or_expr(ctx)?;
                match self.next() {
                    Some(Token::Rparen) => Ok(value),
                    Some(other) => Err(ExprError::UnexpectedToken(format!("{other:?}"))),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some(other) => Err(ExprError::UnexpectedToken(format!("{other:?}"))),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

impl Expr {
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(source)?;
        Ok(Self { tokens })
    }

    pub fn eval(&self, ctx: &HashMap<String, f64>) -> Result<f64, ExprError> {
        let mut parser = Parser {
            tokens: &self.tokens,
            pos: 0,
        };
        let value = parser.or_expr(ctx)?;
        if parser.pos != parser.tokens.len() {
            return Err(ExprError::UnexpectedToken(format!("{:?}", parser.tokens[parser.pos])));
        }
        Ok(value)
    }

    pub fn eval_bool(&self, ctx: &HashMap<String, f64>) -> Result<bool, ExprError> {
        Ok(self.eval(ctx)? != 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn evaluates_arithmetic_with_precedence() {
        let expr = Expr::parse("a + b * 2").unwrap();
        assert_eq!(expr.eval(&ctx(&[("a", 1.0), ("b", 3.0)])).unwrap(), 7.0);
    }

    #[test]
    fn evaluates_comparison_and_boolean_combinators() {
        let expr = Expr::parse("value > 80 && value < 200").unwrap();
        assert!(expr.eval_bool(&ctx(&[("value", 150.0)])).unwrap());
        assert!(!expr.eval_bool(&ctx(&[("value", 250.0)])).unwrap());
    }

    #[test]
    fn unknown_variable_is_a_typed_error() {
        let expr = Expr::parse("missing + 1").unwrap();
        assert_eq!(
            expr.eval(&ctx(&[])).unwrap_err(),
            ExprError::UnknownVariable("missing".to_string())
        );
    }

    #[test]
    fn division_by_zero_is_a_typed_error() {
        let expr = Expr::parse("1 / 0").unwrap();
        assert_eq!(expr.eval(&ctx(&[])).unwrap_err(), ExprError::DivisionByZero);
    }
}
