//! Restricted eligibility expression language.
//!
//! A closed grammar over three named variables (`event_distance`,
//! `athlete_age`, `athlete_gender`): literals, arithmetic, comparisons
//! (chaining allowed), and `and`/`or`/`not`. No function calls,
//! no assignment, no host access. Compilation failures are configuration
//! errors; evaluation faults (type mismatch, absent variable use) are a
//! soft "not eligible" signal handled by the caller.

use anyhow::{bail, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Var {
    EventDistance,
    AthleteAge,
    AthleteGender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Str(String),
    Bool(bool),
    Var(Var),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Chained comparison: `a < b <= c` holds when every adjacent pair holds.
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// Fixed evaluation environment. Exactly these three bindings exist.
#[derive(Debug, Clone, PartialEq)]
pub struct Env {
    pub event_distance: Option<f64>,
    pub athlete_age: i64,
    pub athlete_gender: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Num(f64),
    Str(String),
    Bool(bool),
    /// An unbound optional variable (`event_distance` on a distance-less
    /// event). Using it in arithmetic or ordering faults the expression.
    Absent,
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Num(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bool(b) => *b,
            Value::Absent => false,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::Absent => "absent",
        }
    }
}

/// A runtime evaluation fault. Deliberately not an `anyhow::Error`: the
/// eligibility evaluator treats faults as "ineligible", not as run aborts.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalFault {
    pub message: String,
}

impl fmt::Display for EvalFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

fn fault(message: impl Into<String>) -> EvalFault {
    EvalFault {
        message: message.into(),
    }
}

/// Compile an expression string into its AST.
pub fn compile(source: &str) -> Result<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        bail!(
            "unexpected trailing input at '{}' in expression '{}'",
            parser.describe_current(),
            source
        );
    }
    Ok(expr)
}

impl Expr {
    pub fn eval(&self, env: &Env) -> Result<Value, EvalFault> {
        match self {
            Expr::Num(n) => Ok(Value::Num(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Var(var) => Ok(match var {
                Var::EventDistance => env
                    .event_distance
                    .map(Value::Num)
                    .unwrap_or(Value::Absent),
                Var::AthleteAge => Value::Num(env.athlete_age as f64),
                Var::AthleteGender => Value::Str(env.athlete_gender.clone()),
            }),
            Expr::Neg(inner) => match inner.eval(env)? {
                Value::Num(n) => Ok(Value::Num(-n)),
                other => Err(fault(format!("cannot negate {}", other.type_name()))),
            },
            Expr::Not(inner) => Ok(Value::Bool(!inner.eval(env)?.truthy())),
            Expr::Binary(op, lhs, rhs) => {
                apply_binary(*op, lhs.eval(env)?, rhs.eval(env)?)
            }
            Expr::Compare(first, rest) => {
                let mut prev = first.eval(env)?;
                for (op, next_expr) in rest {
                    let next = next_expr.eval(env)?;
                    if !compare(*op, &prev, &next)? {
                        return Ok(Value::Bool(false));
                    }
                    prev = next;
                }
                Ok(Value::Bool(true))
            }
            // Short-circuit; the deciding operand is the result value.
            Expr::And(lhs, rhs) => {
                let left = lhs.eval(env)?;
                if left.truthy() {
                    rhs.eval(env)
                } else {
                    Ok(left)
                }
            }
            Expr::Or(lhs, rhs) => {
                let left = lhs.eval(env)?;
                if left.truthy() {
                    Ok(left)
                } else {
                    rhs.eval(env)
                }
            }
        }
    }
}

fn apply_binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, EvalFault> {
    match (op, &lhs, &rhs) {
        (BinOp::Add, Value::Num(a), Value::Num(b)) => Ok(Value::Num(a + b)),
        (BinOp::Sub, Value::Num(a), Value::Num(b)) => Ok(Value::Num(a - b)),
        (BinOp::Mul, Value::Num(a), Value::Num(b)) => Ok(Value::Num(a * b)),
        (BinOp::Div, Value::Num(a), Value::Num(b)) => {
            if *b == 0.0 {
                Err(fault("division by zero"))
            } else {
                Ok(Value::Num(a / b))
            }
        }
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
        _ => Err(fault(format!(
            "unsupported operand types: {} and {}",
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<bool, EvalFault> {
    match op {
        CmpOp::Eq => Ok(value_eq(lhs, rhs)),
        CmpOp::Ne => Ok(!value_eq(lhs, rhs)),
        _ => {
            let ordering = match (lhs, rhs) {
                (Value::Num(a), Value::Num(b)) => a
                    .partial_cmp(b)
                    .ok_or_else(|| fault("cannot order NaN"))?,
                (Value::Str(a), Value::Str(b)) => a.cmp(b),
                _ => {
                    return Err(fault(format!(
                        "cannot order {} and {}",
                        lhs.type_name(),
                        rhs.type_name()
                    )))
                }
            };
            Ok(match op {
                CmpOp::Lt => ordering.is_lt(),
                CmpOp::Le => ordering.is_le(),
                CmpOp::Gt => ordering.is_gt(),
                CmpOp::Ge => ordering.is_ge(),
                CmpOp::Eq | CmpOp::Ne => unreachable!(),
            })
        }
    }
}

fn value_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Num(a), Value::Num(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Absent, Value::Absent) => true,
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Str(String),
    Var(Var),
    True,
    False,
    And,
    Or,
    Not,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
    Cmp(CmpOp),
}

fn tokenize(source: &str) -> Result<Vec<Tok>> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Tok::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Tok::RParen);
            }
            '+' => {
                chars.next();
                tokens.push(Tok::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Tok::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Tok::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Tok::Slash);
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Tok::Cmp(CmpOp::Le));
                } else {
                    tokens.push(Tok::Cmp(CmpOp::Lt));
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Tok::Cmp(CmpOp::Ge));
                } else {
                    tokens.push(Tok::Cmp(CmpOp::Gt));
                }
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Tok::Cmp(CmpOp::Eq));
                } else {
                    bail!("assignment is not allowed in eligibility expressions");
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Tok::Cmp(CmpOp::Ne));
                } else {
                    bail!("unexpected '!' in expression (use 'not')");
                }
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some(ch) => literal.push(ch),
                        None => bail!("unterminated string literal"),
                    }
                }
                tokens.push(Tok::Str(literal));
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() || ch == '.' {
                        literal.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value: f64 = literal
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid number literal '{}'", literal))?;
                tokens.push(Tok::Num(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        word.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match word.as_str() {
                    "and" => Tok::And,
                    "or" => Tok::Or,
                    "not" => Tok::Not,
                    "True" | "true" => Tok::True,
                    "False" | "false" => Tok::False,
                    "event_distance" => Tok::Var(Var::EventDistance),
                    "athlete_age" => Tok::Var(Var::AthleteAge),
                    "athlete_gender" => Tok::Var(Var::AthleteGender),
                    other => bail!("unknown name '{}' in eligibility expression", other),
                });
            }
            other => bail!("unexpected character '{}' in expression", other),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn describe_current(&self) -> String {
        match self.peek() {
            Some(tok) => format!("{:?}", tok),
            None => "end of input".to_string(),
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut expr = self.parse_and()?;
        while self.peek() == Some(&Tok::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            expr = Expr::Or(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut expr = self.parse_not()?;
        while self.peek() == Some(&Tok::And) {
            self.advance();
            let rhs = self.parse_not()?;
            expr = Expr::And(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Tok::Not) {
            self.advance();
            Ok(Expr::Not(Box::new(self.parse_not()?)))
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let first = self.parse_additive()?;
        let mut rest = Vec::new();
        while let Some(Tok::Cmp(op)) = self.peek() {
            let op = *op;
            self.advance();
            rest.push((op, self.parse_additive()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut expr = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinOp::Add,
                Some(Tok::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_term()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinOp::Mul,
                Some(Tok::Slash) => BinOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Tok::Minus) {
            self.advance();
            Ok(Expr::Neg(Box::new(self.parse_unary()?)))
        } else {
            self.parse_primary()
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Tok::Num(n)) => Ok(Expr::Num(n)),
            Some(Tok::Str(s)) => Ok(Expr::Str(s)),
            Some(Tok::True) => Ok(Expr::Bool(true)),
            Some(Tok::False) => Ok(Expr::Bool(false)),
            Some(Tok::Var(var)) => Ok(Expr::Var(var)),
            Some(Tok::LParen) => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Tok::RParen) => Ok(inner),
                    _ => bail!("missing closing parenthesis"),
                }
            }
            Some(tok) => bail!("unexpected token {:?} in expression", tok),
            None => bail!("unexpected end of expression"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Env {
        Env {
            event_distance: Some(3.0),
            athlete_age: 12,
            athlete_gender: "female".to_string(),
        }
    }

    fn eval(source: &str, env: &Env) -> Result<Value, EvalFault> {
        compile(source).unwrap().eval(env)
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        assert_eq!(eval("1 + 2 * 3", &env()).unwrap(), Value::Num(7.0));
        assert_eq!(eval("(1 + 2) * 3", &env()).unwrap(), Value::Num(9.0));
        assert_eq!(eval("10 / 4", &env()).unwrap(), Value::Num(2.5));
        assert_eq!(eval("-athlete_age + 2", &env()).unwrap(), Value::Num(-10.0));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("athlete_age <= 12", &env()).unwrap(), Value::Bool(true));
        assert_eq!(eval("athlete_age < 12", &env()).unwrap(), Value::Bool(false));
        assert_eq!(
            eval("athlete_gender == \"female\"", &env()).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval("athlete_gender != 'female'", &env()).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_chained_comparison() {
        assert_eq!(eval("10 <= athlete_age <= 12", &env()).unwrap(), Value::Bool(true));
        assert_eq!(eval("10 <= athlete_age < 12", &env()).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_boolean_operators_short_circuit() {
        let result = eval("athlete_age <= 12 and athlete_gender == 'female'", &env());
        assert_eq!(result.unwrap(), Value::Bool(true));

        // The right side would fault on a distance-less event, but the
        // false left side short-circuits past it.
        let no_distance = Env {
            event_distance: None,
            ..env()
        };
        let result = eval("False and event_distance > 2", &no_distance);
        assert_eq!(result.unwrap(), Value::Bool(false));

        let result = eval("True or event_distance > 2", &no_distance);
        assert_eq!(result.unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_not_and_truthiness() {
        assert_eq!(eval("not True", &env()).unwrap(), Value::Bool(false));
        assert_eq!(eval("not 0", &env()).unwrap(), Value::Bool(true));
        assert_eq!(eval("not ''", &env()).unwrap(), Value::Bool(true));
        assert!(eval("athlete_gender", &env()).unwrap().truthy());
    }

    #[test]
    fn test_absent_distance_faults_in_ordering() {
        let no_distance = Env {
            event_distance: None,
            ..env()
        };
        assert!(eval("event_distance > 2", &no_distance).is_err());
        assert!(eval("event_distance + 1", &no_distance).is_err());
        // Equality against absent does not fault, matching None semantics.
        assert_eq!(
            eval("event_distance == 2", &no_distance).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_division_by_zero_faults() {
        assert!(eval("1 / 0", &env()).is_err());
    }

    #[test]
    fn test_type_mismatch_faults() {
        assert!(eval("athlete_gender < 3", &env()).is_err());
        assert!(eval("athlete_age + 'x'", &env()).is_err());
        // Mixed-type equality is false, not a fault.
        assert_eq!(eval("athlete_age == 'x'", &env()).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(
            eval("'fe' + 'male' == athlete_gender", &env()).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_compile_errors() {
        assert!(compile("athlete_age = 12").is_err());
        assert!(compile("athlete_age <=").is_err());
        assert!(compile("(athlete_age < 12").is_err());
        assert!(compile("'unterminated").is_err());
        assert!(compile("athlete_age < 12 12").is_err());
    }

    #[test]
    fn test_unknown_name_is_a_compile_error() {
        assert!(compile("athlete_height > 150").is_err());
        assert!(compile("open('/etc/passwd')").is_err());
    }

    #[test]
    fn test_empty_expression_is_a_compile_error() {
        assert!(compile("").is_err());
        assert!(compile("   ").is_err());
    }
}
