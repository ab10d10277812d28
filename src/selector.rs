// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Label selector parsing and matching.
//!
//! This module compiles Kubernetes label selector expressions (the syntax accepted by
//! `kubectl get -l`) into a [`Selector`] that can be matched against any string map.
//! It is used for two different filters:
//!
//! - The node label selector, matched against node labels when listing the inventory
//! - The annotation filter, matched against node annotations as if they were labels
//!
//! # Grammar
//!
//! ```text
//! selector    := requirement ( "," requirement )*
//! requirement := "!" key
//!              | key
//!              | key ( "=" | "==" | "!=" ) value
//!              | key ( "in" | "notin" ) "(" value ( "," value )* ")"
//! ```
//!
//! All requirements must match (logical AND). An empty expression selects everything.
//!
//! # Example
//!
//! ```
//! use nodedns::selector::parse;
//! use std::collections::BTreeMap;
//!
//! let selector = parse("role in (edge, ingress), !decommissioned").unwrap();
//! let labels = BTreeMap::from([("role".to_string(), "edge".to_string())]);
//! assert!(selector.matches(&labels));
//! ```

use crate::constants::{LABEL_NAME_MAX_LEN, LABEL_PREFIX_MAX_LEN};
use crate::errors::SourceError;
use std::collections::BTreeMap;
use std::fmt;

/// Relationship between a requirement's key and its values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    /// `key=value` or `key==value`
    Equals,
    /// `key!=value`
    NotEquals,
    /// `key in (a, b)`
    In,
    /// `key notin (a, b)`
    NotIn,
    /// `key`
    Exists,
    /// `!key`
    DoesNotExist,
}

/// A single `key <op> values` clause of a selector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    operator: Operator,
    values: Vec<String>,
}

impl Requirement {
    /// The label key this requirement applies to.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The requirement operator.
    #[must_use]
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// The values, sorted and deduplicated.
    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Check this requirement against a label set.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            Operator::Equals | Operator::In => value.is_some_and(|v| self.values.contains(v)),
            Operator::NotEquals | Operator::NotIn => {
                value.is_none_or(|v| !self.values.contains(v))
            }
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::Equals => write!(f, "{}={}", self.key, self.values.join("")),
            Operator::NotEquals => write!(f, "{}!={}", self.key, self.values.join("")),
            Operator::In => write!(f, "{} in ({})", self.key, self.values.join(",")),
            Operator::NotIn => write!(f, "{} notin ({})", self.key, self.values.join(",")),
            Operator::Exists => f.write_str(&self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}

/// A compiled label selector: a conjunction of [`Requirement`]s.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// A selector that matches everything.
    #[must_use]
    pub fn everything() -> Self {
        Self::default()
    }

    /// Returns true if the selector has no requirements and therefore matches everything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// The requirements of this selector, in the order they were written.
    #[must_use]
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Check whether a label (or annotation) set satisfies every requirement.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, requirement) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{requirement}")?;
        }
        Ok(())
    }
}

/// Parse a label selector expression.
///
/// # Errors
///
/// Returns [`SourceError::InvalidSelector`] if the expression is not valid selector
/// syntax or contains an invalid label key or value.
pub fn parse(expression: &str) -> Result<Selector, SourceError> {
    let invalid = |reason: String| SourceError::InvalidSelector {
        expression: expression.to_string(),
        reason,
    };

    let tokens = lex(expression);
    let mut parser = Parser { tokens, pos: 0 };
    let requirements = parser.parse_requirements().map_err(invalid)?;

    Ok(Selector { requirements })
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Identifier(String),
    Comma,
    Equals,
    DoubleEquals,
    NotEquals,
    Bang,
    OpenParen,
    CloseParen,
    In,
    NotIn,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Identifier(s) => f.write_str(s),
            Token::Comma => f.write_str(","),
            Token::Equals => f.write_str("="),
            Token::DoubleEquals => f.write_str("=="),
            Token::NotEquals => f.write_str("!="),
            Token::Bang => f.write_str("!"),
            Token::OpenParen => f.write_str("("),
            Token::CloseParen => f.write_str(")"),
            Token::In => f.write_str("in"),
            Token::NotIn => f.write_str("notin"),
        }
    }
}

fn is_special(c: char) -> bool {
    matches!(c, '!' | '=' | '(' | ')' | ',')
}

fn lex(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        match c {
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '(' => {
                chars.next();
                tokens.push(Token::OpenParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::CloseParen);
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::NotEquals);
                } else {
                    tokens.push(Token::Bang);
                }
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::DoubleEquals);
                } else {
                    tokens.push(Token::Equals);
                }
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || is_special(c) {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(match word.as_str() {
                    "in" => Token::In,
                    "notin" => Token::NotIn,
                    _ => Token::Identifier(word),
                });
            }
        }
    }

    tokens
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_requirements(&mut self) -> Result<Vec<Requirement>, String> {
        let mut requirements = Vec::new();
        if self.peek().is_none() {
            return Ok(requirements);
        }

        loop {
            requirements.push(self.parse_requirement()?);
            match self.next() {
                None => return Ok(requirements),
                Some(Token::Comma) => {
                    if self.peek().is_none() {
                        return Err("found end of string after ',', expected: identifier or '!'"
                            .to_string());
                    }
                }
                Some(other) => return Err(format!("found '{other}', expected: ','")),
            }
        }
    }

    fn parse_requirement(&mut self) -> Result<Requirement, String> {
        let key = match self.next() {
            Some(Token::Bang) => {
                let key = self.parse_key()?;
                return Ok(Requirement {
                    key,
                    operator: Operator::DoesNotExist,
                    values: Vec::new(),
                });
            }
            Some(Token::Identifier(key)) => {
                validate_key(&key)?;
                key
            }
            Some(other) => return Err(format!("found '{other}', expected: identifier or '!'")),
            None => return Err("found end of string, expected: identifier or '!'".to_string()),
        };

        let operator = match self.peek() {
            None | Some(Token::Comma) => {
                return Ok(Requirement {
                    key,
                    operator: Operator::Exists,
                    values: Vec::new(),
                });
            }
            Some(Token::Equals | Token::DoubleEquals) => Operator::Equals,
            Some(Token::NotEquals) => Operator::NotEquals,
            Some(Token::In) => Operator::In,
            Some(Token::NotIn) => Operator::NotIn,
            Some(other) => {
                return Err(format!(
                    "found '{other}', expected: '=', '!=', '==', 'in', 'notin'"
                ))
            }
        };
        self.pos += 1;

        let mut values = match operator {
            Operator::In | Operator::NotIn => self.parse_value_set()?,
            _ => vec![self.parse_exact_value()?],
        };
        values.sort();
        values.dedup();

        Ok(Requirement {
            key,
            operator,
            values,
        })
    }

    fn parse_key(&mut self) -> Result<String, String> {
        match self.next() {
            Some(Token::Identifier(key)) => {
                validate_key(&key)?;
                Ok(key)
            }
            Some(other) => Err(format!("found '{other}', expected: identifier")),
            None => Err("found end of string, expected: identifier".to_string()),
        }
    }

    // `key=` selects the empty value
    fn parse_exact_value(&mut self) -> Result<String, String> {
        match self.peek() {
            None | Some(Token::Comma) => Ok(String::new()),
            Some(Token::Identifier(value)) => {
                let value = value.clone();
                self.pos += 1;
                validate_value(&value)?;
                Ok(value)
            }
            Some(other) => Err(format!("found '{other}', expected: identifier")),
        }
    }

    // Empty members, as in `()`, `(a,)` or `(a,,b)`, select the empty value
    fn parse_value_set(&mut self) -> Result<Vec<String>, String> {
        match self.next() {
            Some(Token::OpenParen) => {}
            Some(other) => return Err(format!("found '{other}', expected: '('")),
            None => return Err("found end of string, expected: '('".to_string()),
        }

        let mut values = Vec::new();
        let mut expect_value = true;
        loop {
            match self.next() {
                Some(Token::Identifier(value)) if expect_value => {
                    validate_value(&value)?;
                    values.push(value);
                    expect_value = false;
                }
                Some(Token::Comma) => {
                    if expect_value {
                        values.push(String::new());
                    }
                    expect_value = true;
                }
                Some(Token::CloseParen) => {
                    if expect_value {
                        values.push(String::new());
                    }
                    return Ok(values);
                }
                Some(other) if expect_value => {
                    return Err(format!("found '{other}', expected: ',', ')' or identifier"))
                }
                Some(other) => return Err(format!("found '{other}', expected: ',' or ')'")),
                None => return Err("found end of string, expected: ')'".to_string()),
            }
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= LABEL_NAME_MAX_LEN
        && name.chars().all(is_name_char)
        && name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name.ends_with(|c: char| c.is_ascii_alphanumeric())
}

fn is_valid_dns_subdomain(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix.len() <= LABEL_PREFIX_MAX_LEN
        && prefix.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
                && !segment.starts_with('-')
                && !segment.ends_with('-')
        })
}

fn validate_key(key: &str) -> Result<(), String> {
    let valid = match key.split_once('/') {
        Some((prefix, name)) => is_valid_dns_subdomain(prefix) && is_valid_name(name),
        None => is_valid_name(key),
    };
    if valid {
        Ok(())
    } else {
        Err(format!("invalid label key '{key}'"))
    }
}

fn validate_value(value: &str) -> Result<(), String> {
    if value.is_empty() || is_valid_name(value) {
        Ok(())
    } else {
        Err(format!("invalid label value '{value}'"))
    }
}

#[cfg(test)]
#[path = "selector_tests.rs"]
mod selector_tests;
