//! Restricted boolean expressions used to gate schedule entries.
//!
//! The language only reads from a [`Bindings`] map: comparisons, boolean
//! connectives and simple arithmetic over numbers, strings and booleans.
//! There are no function calls and nothing can reach outside the bindings.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_SOURCE_LEN: usize = 1_024;
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    /// Interprets an external entity state the way helpers publish them.
    pub fn from_state_str(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "on" | "true" => return Self::Bool(true),
            "off" | "false" => return Self::Bool(false),
            _ => {}
        }

        match trimmed.parse::<f64>() {
            Ok(number) if number.is_finite() => Self::Number(number),
            _ => Self::Text(trimmed.to_string()),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Text(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "'{value}'"),
        }
    }
}

pub type Bindings = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("expression is empty")]
    Empty,
    #[error("expression exceeds {MAX_SOURCE_LEN} bytes")]
    TooLong,
    #[error("expression nesting exceeds {MAX_DEPTH} levels")]
    TooDeep,
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unexpected {found} at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("'{op}' expects {expected}, got {found}")]
    WrongOperand {
        op: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("expression produced {0}, expected a boolean")]
    NotBoolean(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Ident(String),
    True,
    False,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Number(value) => format!("number {value}"),
            Self::Text(value) => format!("string '{value}'"),
            Self::Ident(name) => format!("identifier '{name}'"),
            Self::True => "'true'".to_string(),
            Self::False => "'false'".to_string(),
            Self::And => "'and'".to_string(),
            Self::Or => "'or'".to_string(),
            Self::Not => "'not'".to_string(),
            Self::Eq => "'=='".to_string(),
            Self::Ne => "'!='".to_string(),
            Self::Lt => "'<'".to_string(),
            Self::Le => "'<='".to_string(),
            Self::Gt => "'>'".to_string(),
            Self::Ge => "'>='".to_string(),
            Self::Plus => "'+'".to_string(),
            Self::Minus => "'-'".to_string(),
            Self::Star => "'*'".to_string(),
            Self::Slash => "'/'".to_string(),
            Self::Percent => "'%'".to_string(),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, ExprError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let peek = |index: usize| chars.get(index).map(|(_, ch)| *ch);

    while let Some(&(offset, ch)) = chars.get(i) {
        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        let (token, len) = match ch {
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            '+' => (Token::Plus, 1),
            '-' => (Token::Minus, 1),
            '*' => (Token::Star, 1),
            '/' => (Token::Slash, 1),
            '%' => (Token::Percent, 1),
            '=' if peek(i + 1) == Some('=') => (Token::Eq, 2),
            '!' if peek(i + 1) == Some('=') => (Token::Ne, 2),
            '!' => (Token::Not, 1),
            '<' if peek(i + 1) == Some('=') => (Token::Le, 2),
            '<' => (Token::Lt, 1),
            '>' if peek(i + 1) == Some('=') => (Token::Ge, 2),
            '>' => (Token::Gt, 1),
            '&' if peek(i + 1) == Some('&') => (Token::And, 2),
            '|' if peek(i + 1) == Some('|') => (Token::Or, 2),
            '\'' | '"' => {
                let quote = ch;
                let mut end = i + 1;
                while end < chars.len() && chars[end].1 != quote {
                    end += 1;
                }
                if end >= chars.len() {
                    return Err(ExprError::UnterminatedString(offset));
                }
                let text: String = chars[i + 1..end].iter().map(|(_, c)| *c).collect();
                (Token::Text(text), end + 1 - i)
            }
            c if c.is_ascii_digit() => {
                let mut end = i;
                while end < chars.len() && (chars[end].1.is_ascii_digit() || chars[end].1 == '.')
                {
                    end += 1;
                }
                let literal: String = chars[i..end].iter().map(|(_, c)| *c).collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| ExprError::InvalidNumber(literal.clone()))?;
                (Token::Number(value), end - i)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = i;
                while end < chars.len()
                    && (chars[end].1.is_ascii_alphanumeric()
                        || chars[end].1 == '_'
                        || chars[end].1 == '.')
                {
                    end += 1;
                }
                let word: String = chars[i..end].iter().map(|(_, c)| *c).collect();
                let token = match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::True,
                    "false" => Token::False,
                    _ => Token::Ident(word),
                };
                (token, end - i)
            }
            other => {
                return Err(ExprError::UnexpectedChar { ch: other, offset });
            }
        };

        tokens.push((token, offset));
        i += len;
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Literal(Value),
    Variable(String),
    Not(Box<Node>),
    Neg(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(token, _)| token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> ExprError {
        match self.tokens.get(self.pos) {
            Some((token, offset)) => ExprError::UnexpectedToken {
                found: token.describe(),
                offset: *offset,
            },
            None => ExprError::UnexpectedEnd,
        }
    }

    fn descend(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Node, ExprError> {
        let mut node = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            node = Node::Or(Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn parse_and(&mut self) -> Result<Node, ExprError> {
        let mut node = self.parse_not()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_not()?;
            node = Node::And(Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn parse_not(&mut self) -> Result<Node, ExprError> {
        if self.eat(&Token::Not) {
            self.descend()?;
            let inner = self.parse_not()?;
            self.depth -= 1;
            return Ok(Node::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Node, ExprError> {
        let lhs = self.parse_sum()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_sum()?;
        Ok(Node::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_sum(&mut self) -> Result<Node, ExprError> {
        let mut node = self.parse_product()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(node),
            };
            self.pos += 1;
            let rhs = self.parse_product()?;
            node = Node::Binary(op, Box::new(node), Box::new(rhs));
        }
    }

    fn parse_product(&mut self) -> Result<Node, ExprError> {
        let mut node = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(node),
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            node = Node::Binary(op, Box::new(node), Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> Result<Node, ExprError> {
        if self.eat(&Token::Minus) {
            self.descend()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Node::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Node, ExprError> {
        let error = self.unexpected();
        match self.advance() {
            Some(Token::Number(value)) => Ok(Node::Literal(Value::Number(value))),
            Some(Token::Text(value)) => Ok(Node::Literal(Value::Text(value))),
            Some(Token::True) => Ok(Node::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Node::Literal(Value::Bool(false))),
            Some(Token::Ident(name)) => Ok(Node::Variable(name)),
            Some(Token::LParen) => {
                self.descend()?;
                let inner = self.parse_or()?;
                self.depth -= 1;
                if !self.eat(&Token::RParen) {
                    return Err(self.unexpected());
                }
                Ok(inner)
            }
            _ => Err(error),
        }
    }
}

/// A parsed `run_if` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    root: Node,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        if source.len() > MAX_SOURCE_LEN {
            return Err(ExprError::TooLong);
        }

        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(ExprError::Empty);
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let root = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.unexpected());
        }

        Ok(Self { root })
    }

    pub fn evaluate(&self, bindings: &Bindings) -> Result<Value, ExprError> {
        eval(&self.root, bindings)
    }

    pub fn evaluate_bool(&self, bindings: &Bindings) -> Result<bool, ExprError> {
        match self.evaluate(bindings)? {
            Value::Bool(value) => Ok(value),
            other => Err(ExprError::NotBoolean(other.to_string())),
        }
    }
}

fn eval(node: &Node, bindings: &Bindings) -> Result<Value, ExprError> {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Variable(name) => bindings
            .get(name)
            .cloned()
            .ok_or_else(|| ExprError::UnknownVariable(name.clone())),
        Node::Not(inner) => Ok(Value::Bool(!expect_bool("not", eval(inner, bindings)?)?)),
        Node::Neg(inner) => match eval(inner, bindings)? {
            Value::Number(value) => Ok(Value::Number(-value)),
            other => Err(ExprError::WrongOperand {
                op: "-",
                expected: "a number",
                found: other.type_name(),
            }),
        },
        Node::And(lhs, rhs) => {
            if !expect_bool("and", eval(lhs, bindings)?)? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(expect_bool("and", eval(rhs, bindings)?)?))
        }
        Node::Or(lhs, rhs) => {
            if expect_bool("or", eval(lhs, bindings)?)? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(expect_bool("or", eval(rhs, bindings)?)?))
        }
        Node::Binary(op, lhs, rhs) => {
            let left = eval(lhs, bindings)?;
            let right = eval(rhs, bindings)?;
            apply_binary(*op, left, right)
        }
    }
}

fn expect_bool(op: &'static str, value: Value) -> Result<bool, ExprError> {
    match value {
        Value::Bool(value) => Ok(value),
        other => Err(ExprError::WrongOperand {
            op,
            expected: "a boolean",
            found: other.type_name(),
        }),
    }
}

fn apply_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, ExprError> {
    use std::cmp::Ordering;

    let mismatch = |left: &Value, right: &Value| ExprError::TypeMismatch {
        op: op.symbol(),
        left: left.type_name(),
        right: right.type_name(),
    };

    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (Value::Number(a), Value::Number(b)) = (&left, &right) else {
                return Err(mismatch(&left, &right));
            };
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div | BinaryOp::Rem if *b == 0.0 => {
                    return Err(ExprError::DivisionByZero)
                }
                BinaryOp::Div => a / b,
                _ => a % b,
            };
            Ok(Value::Number(result))
        }
        BinaryOp::Eq | BinaryOp::Ne => {
            let equal = match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => a == b,
                (Value::Text(a), Value::Text(b)) => a == b,
                (Value::Bool(a), Value::Bool(b)) => a == b,
                _ => return Err(mismatch(&left, &right)),
            };
            Ok(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
                _ => None,
            }
            .ok_or_else(|| mismatch(&left, &right))?;

            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Bool(result))
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn bindings() -> Bindings {
        let mut bindings = Bindings::new();
        bindings.insert("room_temperature".to_string(), Value::Number(18.5));
        bindings.insert("outside_temperature".to_string(), Value::Number(-2.0));
        bindings.insert("input_boolean.away".to_string(), Value::Bool(false));
        bindings.insert("time".to_string(), Value::Text("06:45".to_string()));
        bindings
    }

    fn check(source: &str) -> Result<bool, ExprError> {
        Expression::parse(source)?.evaluate_bool(&bindings())
    }

    #[test]
    fn evaluates_comparisons_and_connectives() {
        assert_eq!(check("room_temperature < 20"), Ok(true));
        assert_eq!(
            check("room_temperature < 20 and not input_boolean.away"),
            Ok(true)
        );
        assert_eq!(check("outside_temperature > 0 || time >= '06:30'"), Ok(true));
        assert_eq!(check("!(room_temperature - outside_temperature >= 21)"), Ok(true));
        assert_eq!(check("room_temperature * 2 == 37"), Ok(true));
        assert_eq!(check("-outside_temperature % 2 == 0"), Ok(true));
        assert_eq!(check("time < \"06:30\""), Ok(false));
    }

    #[test]
    fn arithmetic_binds_tighter_than_comparison() {
        assert_eq!(check("1 + 2 * 3 == 7"), Ok(true));
        assert_eq!(check("(1 + 2) * 3 == 9"), Ok(true));
        assert_eq!(check("true or false and false"), Ok(true));
    }

    #[test]
    fn short_circuit_skips_missing_variables() {
        assert_eq!(check("false and missing > 1"), Ok(false));
        assert_eq!(check("true or missing > 1"), Ok(true));
        assert_eq!(
            check("true and missing > 1"),
            Err(ExprError::UnknownVariable("missing".to_string()))
        );
    }

    #[test]
    fn rejects_malformed_sources() {
        assert_eq!(check(""), Err(ExprError::Empty));
        assert_eq!(check("room_temperature <"), Err(ExprError::UnexpectedEnd));
        assert!(matches!(
            check("room_temperature = 20"),
            Err(ExprError::UnexpectedChar { ch: '=', .. })
        ));
        assert!(matches!(
            check("(room_temperature < 20"),
            Err(ExprError::UnexpectedEnd)
        ));
        assert!(matches!(
            check("room_temperature < 20 21"),
            Err(ExprError::UnexpectedToken { .. })
        ));
        assert_eq!(check("'open"), Err(ExprError::UnterminatedString(0)));
        assert_eq!(check("1.2.3 > 0"), Err(ExprError::InvalidNumber("1.2.3".to_string())));
    }

    #[test]
    fn reports_type_errors() {
        assert_eq!(
            check("room_temperature"),
            Err(ExprError::NotBoolean("18.5".to_string()))
        );
        assert!(matches!(
            check("time > 5"),
            Err(ExprError::TypeMismatch { op: ">", .. })
        ));
        assert!(matches!(
            check("not room_temperature"),
            Err(ExprError::WrongOperand { op: "not", .. })
        ));
        assert_eq!(check("1 / 0 > 1"), Err(ExprError::DivisionByZero));
    }

    #[test]
    fn limits_nesting_depth() {
        let source = format!("{}true{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert_eq!(check(&source), Err(ExprError::TooDeep));

        let source = "not ".repeat(MAX_DEPTH + 1) + "true";
        assert_eq!(check(&source), Err(ExprError::TooDeep));

        let source = format!("{}true{}", "(".repeat(8), ")".repeat(8));
        assert_eq!(check(&source), Ok(true));
    }

    #[test]
    fn limits_source_length() {
        let source = format!("true{}", " ".repeat(MAX_SOURCE_LEN));
        assert_eq!(check(&source), Err(ExprError::TooLong));
    }

    #[test]
    fn interprets_helper_states() {
        assert_eq!(Value::from_state_str("on"), Value::Bool(true));
        assert_eq!(Value::from_state_str("OFF"), Value::Bool(false));
        assert_eq!(Value::from_state_str(" 21.5"), Value::Number(21.5));
        assert_eq!(Value::from_state_str("home"), Value::Text("home".to_string()));
        assert_eq!(Value::from_state_str("nan"), Value::Text("nan".to_string()));
    }
}
