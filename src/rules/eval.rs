//! The restricted expression evaluator shared by rule conditions and
//! conditional-edge evaluation (spec §4.3, §4.6).
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! expr       := or_expr
//! or_expr    := and_expr ( "or" and_expr )*
//! and_expr   := not_expr ( "and" not_expr )*
//! not_expr   := "not" not_expr | comparison
//! comparison := arith ( ("==" | "!=" | "<" | "<=" | ">" | ">=") arith )?
//! arith      := term ( ("+" | "-") term )*
//! term       := unary ( ("*" | "/") unary )*
//! unary      := "-" unary | primary
//! primary    := number | string | "true" | "false" | "none"
//!             | ident ("." ident)*
//!             | ident "(" (expr ("," expr)*)? ")"
//!             | "(" expr ")"
//! ```
//!
//! Identifier lookup only ever resolves against the caller-supplied
//! `context` map — there is no global namespace, no way to reach host state,
//! and no builtin beyond the fixed safe set (`abs, min, max, len, sum, all,
//! any, bool, int, float, str, list, dict, set`). This is what makes the
//! evaluator safe to run on planner/rule-author-supplied strings.

use serde_json::{Map, Value};
use std::iter::Peekable;
use std::str::CharIndices;

#[derive(Debug, Clone, thiserror::Error)]
pub enum EvalError {
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token: {0}")]
    UnexpectedToken(String),
    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("wrong argument count for {0}")]
    ArgCount(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("trailing input after expression")]
    TrailingInput,
}

/// Evaluate `expr` against `context`, returning `false` on *any* error
/// (parse or runtime) rather than propagating it. This is the spec's
/// documented graceful-degradation policy for rule conditions and
/// conditional edges: a malformed expression must never halt evaluation of
/// the remaining rules or edges.
pub fn evaluate(expr: &str, context: &Map<String, Value>) -> bool {
    match evaluate_checked(expr, context) {
        Ok(value) => truthy(&value),
        Err(err) => {
            tracing::debug!(expr, %err, "condition evaluation failed; treating as false");
            false
        }
    }
}

/// Same as [`evaluate`] but surfaces the error instead of swallowing it —
/// used where a caller wants to distinguish "evaluated false" from
/// "could not evaluate" (e.g. tests, lints).
pub fn evaluate_checked(expr: &str, context: &Map<String, Value>) -> Result<Value, EvalError> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser {
        tokens: tokens.into_iter().peekable(),
    };
    let value = parser.parse_or(context)?;
    if parser.tokens.peek().is_some() {
        return Err(EvalError::TrailingInput);
    }
    Ok(value)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    String(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
    Dot,
}

fn tokenize(src: &str) -> Result<Vec<Token>, EvalError> {
    let mut chars: Peekable<CharIndices> = src.char_indices().peekable();
    let mut tokens = Vec::new();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        match c {
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '+' | '-' | '*' | '/' => {
                chars.next();
                let op: &'static str = match c {
                    '+' => "+",
                    '-' => "-",
                    '*' => "*",
                    '/' => "/",
                    _ => unreachable!(),
                };
                tokens.push(Token::Op(op));
            }
            '=' | '!' | '<' | '>' => {
                chars.next();
                let two_char = matches!(chars.peek(), Some((_, '=')));
                let op: &'static str = match (c, two_char) {
                    ('=', true) => {
                        chars.next();
                        "=="
                    }
                    ('!', true) => {
                        chars.next();
                        "!="
                    }
                    ('<', true) => {
                        chars.next();
                        "<="
                    }
                    ('>', true) => {
                        chars.next();
                        ">="
                    }
                    ('<', false) => "<",
                    ('>', false) => ">",
                    _ => return Err(EvalError::UnexpectedToken(c.to_string())),
                };
                tokens.push(Token::Op(op));
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some((_, ch)) if ch == quote => break,
                        Some((_, ch)) => s.push(ch),
                        None => return Err(EvalError::UnexpectedEnd),
                    }
                }
                tokens.push(Token::String(s));
            }
            c if c.is_ascii_digit() => {
                let mut s = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if ch.is_ascii_digit() || ch == '.' {
                        s.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n = s
                    .parse::<f64>()
                    .map_err(|_| EvalError::UnexpectedToken(s.clone()))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        s.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(s));
            }
            other => return Err(EvalError::UnexpectedToken(other.to_string())),
        }
    }
    Ok(tokens)
}

struct Parser<I: Iterator<Item = Token>> {
    tokens: Peekable<I>,
}

impl<I: Iterator<Item = Token>> Parser<I> {
    fn parse_or(&mut self, ctx: &Map<String, Value>) -> Result<Value, EvalError> {
        let mut left = self.parse_and(ctx)?;
        while matches!(self.tokens.peek(), Some(Token::Ident(w)) if w == "or") {
            self.tokens.next();
            let left_truth = truthy(&left);
            let right = self.parse_and(ctx)?;
            left = Value::Bool(left_truth || truthy(&right));
        }
        Ok(left)
    }

    fn parse_and(&mut self, ctx: &Map<String, Value>) -> Result<Value, EvalError> {
        let mut left = self.parse_not(ctx)?;
        while matches!(self.tokens.peek(), Some(Token::Ident(w)) if w == "and") {
            self.tokens.next();
            let left_truth = truthy(&left);
            let right = self.parse_not(ctx)?;
            left = Value::Bool(left_truth && truthy(&right));
        }
        Ok(left)
    }

    fn parse_not(&mut self, ctx: &Map<String, Value>) -> Result<Value, EvalError> {
        if matches!(self.tokens.peek(), Some(Token::Ident(w)) if w == "not") {
            self.tokens.next();
            let value = self.parse_not(ctx)?;
            return Ok(Value::Bool(!truthy(&value)));
        }
        self.parse_comparison(ctx)
    }

    fn parse_comparison(&mut self, ctx: &Map<String, Value>) -> Result<Value, EvalError> {
        let left = self.parse_arith(ctx)?;
        let op = match self.tokens.peek() {
            Some(Token::Op(op @ ("==" | "!=" | "<" | "<=" | ">" | ">="))) => *op,
            _ => return Ok(left),
        };
        self.tokens.next();
        let right = self.parse_arith(ctx)?;
        compare(op, &left, &right)
    }

    fn parse_arith(&mut self, ctx: &Map<String, Value>) -> Result<Value, EvalError> {
        let mut left = self.parse_term(ctx)?;
        loop {
            match self.tokens.peek() {
                Some(Token::Op(op @ ("+" | "-"))) => {
                    let op = *op;
                    self.tokens.next();
                    let right = self.parse_term(ctx)?;
                    left = arith(op, &left, &right)?;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_term(&mut self, ctx: &Map<String, Value>) -> Result<Value, EvalError> {
        let mut left = self.parse_unary(ctx)?;
        loop {
            match self.tokens.peek() {
                Some(Token::Op(op @ ("*" | "/"))) => {
                    let op = *op;
                    self.tokens.next();
                    let right = self.parse_unary(ctx)?;
                    left = arith(op, &left, &right)?;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_unary(&mut self, ctx: &Map<String, Value>) -> Result<Value, EvalError> {
        if matches!(self.tokens.peek(), Some(Token::Op("-"))) {
            self.tokens.next();
            let value = self.parse_unary(ctx)?;
            let n = as_number(&value)?;
            return Ok(num(-n));
        }
        self.parse_primary(ctx)
    }

    fn parse_primary(&mut self, ctx: &Map<String, Value>) -> Result<Value, EvalError> {
        match self.tokens.next().ok_or(EvalError::UnexpectedEnd)? {
            Token::Number(n) => Ok(num(n)),
            Token::String(s) => Ok(Value::String(s)),
            Token::LParen => {
                let value = self.parse_or(ctx)?;
                match self.tokens.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(EvalError::UnexpectedToken(")".to_string())),
                }
            }
            Token::Ident(name) => self.parse_ident(name, ctx),
            other => Err(EvalError::UnexpectedToken(format!("{other:?}"))),
        }
    }

    fn parse_ident(&mut self, name: String, ctx: &Map<String, Value>) -> Result<Value, EvalError> {
        match name.as_str() {
            "true" | "True" => return Ok(Value::Bool(true)),
            "false" | "False" => return Ok(Value::Bool(false)),
            "none" | "None" | "null" => return Ok(Value::Null),
            _ => {}
        }
        if matches!(self.tokens.peek(), Some(Token::LParen)) {
            self.tokens.next();
            let mut args = Vec::new();
            if !matches!(self.tokens.peek(), Some(Token::RParen)) {
                loop {
                    args.push(self.parse_or(ctx)?);
                    match self.tokens.peek() {
                        Some(Token::Comma) => {
                            self.tokens.next();
                        }
                        _ => break,
                    }
                }
            }
            match self.tokens.next() {
                Some(Token::RParen) => {}
                _ => return Err(EvalError::UnexpectedToken(")".to_string())),
            }
            return call_builtin(&name, args);
        }

        let mut value = ctx
            .get(&name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownIdentifier(name.clone()))?;
        while matches!(self.tokens.peek(), Some(Token::Dot)) {
            self.tokens.next();
            let field = match self.tokens.next() {
                Some(Token::Ident(f)) => f,
                _ => return Err(EvalError::UnexpectedToken(".".to_string())),
            };
            value = value
                .as_object()
                .and_then(|o| o.get(&field))
                .cloned()
                .ok_or_else(|| EvalError::UnknownIdentifier(format!("{name}.{field}")))?;
        }
        Ok(value)
    }
}

fn num(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn as_number(value: &Value) -> Result<f64, EvalError> {
    value
        .as_f64()
        .or_else(|| match value {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        })
        .ok_or_else(|| EvalError::Type(format!("expected number, got {value}")))
}

fn arith(op: &str, left: &Value, right: &Value) -> Result<Value, EvalError> {
    if op == "+" {
        if let (Value::String(a), Value::String(b)) = (left, right) {
            return Ok(Value::String(format!("{a}{b}")));
        }
    }
    let a = as_number(left)?;
    let b = as_number(right)?;
    let result = match op {
        "+" => a + b,
        "-" => a - b,
        "*" => a * b,
        "/" => {
            if b == 0.0 {
                return Err(EvalError::Type("division by zero".to_string()));
            }
            a / b
        }
        _ => unreachable!(),
    };
    Ok(num(result))
}

fn compare(op: &str, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let result = if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        match op {
            "==" => a == b,
            "!=" => a != b,
            "<" => a < b,
            "<=" => a <= b,
            ">" => a > b,
            ">=" => a >= b,
            _ => unreachable!(),
        }
    } else if let (Value::String(a), Value::String(b)) = (left, right) {
        match op {
            "==" => a == b,
            "!=" => a != b,
            "<" => a < b,
            "<=" => a <= b,
            ">" => a > b,
            ">=" => a >= b,
            _ => unreachable!(),
        }
    } else {
        match op {
            "==" => left == right,
            "!=" => left != right,
            _ => return Err(EvalError::Type(format!("cannot order {left} and {right}"))),
        }
    };
    Ok(Value::Bool(result))
}

fn call_builtin(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    match name {
        "abs" => {
            one_arg(&args, name).and_then(|v| as_number(v)).map(|n| num(n.abs()))
        }
        "min" => fold_numbers(&args, name, f64::min),
        "max" => fold_numbers(&args, name, f64::max),
        "len" => {
            let v = one_arg(&args, name)?;
            let len = match v {
                Value::String(s) => s.chars().count(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                _ => return Err(EvalError::Type(format!("len() on {v}"))),
            };
            Ok(num(len as f64))
        }
        "sum" => {
            let v = one_arg(&args, name)?;
            let items = v
                .as_array()
                .ok_or_else(|| EvalError::Type("sum() expects a list".to_string()))?;
            let mut total = 0.0;
            for item in items {
                total += as_number(item)?;
            }
            Ok(num(total))
        }
        "all" => bool_reduce(&args, name, true),
        "any" => bool_reduce(&args, name, false),
        "bool" => Ok(Value::Bool(truthy(one_arg(&args, name)?))),
        "int" => as_number(one_arg(&args, name)?).map(|n| num(n.trunc())),
        "float" => as_number(one_arg(&args, name)?).map(num),
        "str" => Ok(Value::String(value_to_string(one_arg(&args, name)?))),
        "list" => {
            let v = one_arg(&args, name)?;
            Ok(v.as_array().map(|a| Value::Array(a.clone())).unwrap_or_else(|| Value::Array(vec![v.clone()])))
        }
        "dict" => {
            let v = one_arg(&args, name)?;
            Ok(v.as_object().map(|o| Value::Object(o.clone())).unwrap_or(Value::Object(Map::new())))
        }
        "set" => {
            let v = one_arg(&args, name)?;
            let items = v.as_array().cloned().unwrap_or_else(|| vec![v.clone()]);
            let mut seen = Vec::new();
            for item in items {
                if !seen.contains(&item) {
                    seen.push(item);
                }
            }
            Ok(Value::Array(seen))
        }
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}

fn one_arg(args: &[Value], name: &str) -> Result<&Value, EvalError> {
    args.first().ok_or_else(|| EvalError::ArgCount(name.to_string()))
}

fn fold_numbers(args: &[Value], name: &str, f: impl Fn(f64, f64) -> f64) -> Result<Value, EvalError> {
    let values: Vec<f64> = if args.len() == 1 {
        args[0]
            .as_array()
            .ok_or_else(|| EvalError::ArgCount(name.to_string()))?
            .iter()
            .map(as_number)
            .collect::<Result<_, _>>()?
    } else {
        args.iter().map(as_number).collect::<Result<_, _>>()?
    };
    values
        .into_iter()
        .reduce(f)
        .map(num)
        .ok_or_else(|| EvalError::ArgCount(name.to_string()))
}

fn bool_reduce(args: &[Value], name: &str, identity: bool) -> Result<Value, EvalError> {
    let items = one_arg(args, name)?
        .as_array()
        .ok_or_else(|| EvalError::Type(format!("{name}() expects a list")))?;
    let result = if identity {
        items.iter().all(truthy)
    } else {
        items.iter().any(truthy)
    };
    Ok(Value::Bool(result))
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn comparisons_and_boolean_logic() {
        let c = ctx(&[("quality", 0.95.into())]);
        assert!(evaluate("quality > 0.8", &c));
        assert!(!evaluate("quality <= 0.8", &c));
        assert!(evaluate("quality > 0.5 and quality < 1.0", &c));
        assert!(evaluate("not (quality < 0.5)", &c));
    }

    #[test]
    fn unknown_identifier_is_false_not_panic() {
        let c = ctx(&[]);
        assert!(!evaluate("missing_field > 1", &c));
    }

    #[test]
    fn safe_builtins_available() {
        let c = ctx(&[("items", serde_json::json!([1, 2, 3]))]);
        assert!(evaluate("len(items) == 3", &c));
        assert!(evaluate("sum(items) == 6", &c));
        assert!(evaluate("max(items) == 3", &c));
    }

    #[test]
    fn cannot_reach_outside_context() {
        // No builtin or syntax gives access to anything but `context` and
        // the fixed safe-builtins set.
        let c = ctx(&[]);
        assert!(!evaluate("__import__('os')", &c));
    }

    #[test]
    fn dotted_field_access() {
        let c = ctx(&[("payload", serde_json::json!({"action_description": "ship it"}))]);
        assert_eq!(
            evaluate_checked("payload.action_description", &c).unwrap(),
            Value::String("ship it".to_string())
        );
    }
}
