// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! FQDN templates for deriving hostnames from nodes.
//!
//! Operators configure hostnames with the same template syntax used by other DNS
//! sources (Go `text/template`), so templates written for those sources carry over
//! as long as they stay within the syntax and functions listed below:
//!
//! ```text
//! {{ .Name }}.nodes.example.org
//! {{ index .Labels "topology.kubernetes.io/zone" }}.{{ .Name }}.example.org
//! {{ range .Status.Addresses }}{{ if eq .Type "ExternalIP" }}{{ .Address }}.ip.example.org,{{ end }}{{ end }}
//! ```
//!
//! The rendered output is split on `,`; each part is trimmed and loses one trailing
//! dot. A template may therefore produce several hostnames.
//!
//! # Supported syntax
//!
//! - Text and `{{ pipeline }}` actions, with `{{-` / `-}}` whitespace trimming
//! - `{{ if }}`, `{{ else if }}`, `{{ else }}`, `{{ with }}`, `{{ range }}`, `{{ end }}`
//! - Field chains on the current value (`.Spec.ProviderID`) and on the root (`$.Name`)
//! - Variables: `{{ $zone := index .Labels "zone" }}`, `{{ $zone = "default" }}`,
//!   `{{ range $addr := .Status.Addresses }}`, `{{ range $key, $value := .Labels }}`
//! - String, integer and boolean literals, parenthesized pipelines, `|` chaining
//! - Functions: `contains`, `trimPrefix`, `trimSuffix`, `trim`, `toLower`, `replace`,
//!   `isIPv4`, `isIPv6`, `eq`, `ne`, `not`, `and`, `or`, `index`, `len`
//!
//! # Node fields
//!
//! `.ObjectMeta` with `.Name`, `.GenerateName`, `.Namespace`, `.UID`,
//! `.ResourceVersion`, `.Generation`, `.Labels`, `.Annotations` and `.Finalizers`, all
//! also reachable directly on the node (`.Name`, `.Labels`, ...). `.Spec.PodCIDR`,
//! `.Spec.PodCIDRs`, `.Spec.ProviderID`, `.Spec.Unschedulable`,
//! `.Status.Addresses` (each with `.Type` and `.Address`).

use crate::constants::{TEMPLATE_HOSTNAME_SEPARATOR, TEMPLATE_NO_VALUE};
use crate::errors::SourceError;
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

/// A parsed FQDN template.
#[derive(Clone, Debug)]
pub struct FqdnTemplate {
    source: String,
    tree: Vec<TemplateNode>,
}

impl FqdnTemplate {
    /// Parse a template string.
    ///
    /// Returns `Ok(None)` for an empty template, meaning "no template configured".
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidTemplate`] if the template has a syntax error or
    /// calls an unknown function.
    pub fn parse(template: &str) -> Result<Option<Self>, SourceError> {
        if template.is_empty() {
            return Ok(None);
        }

        let tree = parse_tree(template).map_err(|reason| SourceError::InvalidTemplate {
            template: template.to_string(),
            reason,
        })?;

        Ok(Some(Self {
            source: template.to_string(),
            tree,
        }))
    }

    /// The template text as configured.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Execute the template against a node and return the hostnames it produces.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::TemplateExecution`] if evaluation fails, for example when
    /// the template references a field the node does not have.
    pub fn execute(&self, node: &Node) -> Result<Vec<String>, SourceError> {
        let data = Value::from_node(node);
        let mut rendered = String::new();

        Executor::new(&data)
            .walk(&self.tree, &data, &mut rendered)
            .map_err(|reason| SourceError::TemplateExecution {
                node: node.name_any(),
                reason,
            })?;

        Ok(split_hostnames(&rendered))
    }
}

/// Split rendered template output into hostnames.
///
/// Every comma-separated part is kept, even when empty, after trimming whitespace and
/// one trailing dot.
#[must_use]
pub fn split_hostnames(rendered: &str) -> Vec<String> {
    rendered
        .split(TEMPLATE_HOSTNAME_SEPARATOR)
        .map(|name| {
            let name = name.trim();
            name.strip_suffix('.').unwrap_or(name).to_string()
        })
        .collect()
}

// ============================================================================
// Data model
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
enum Value {
    Missing,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, String>),
    Struct(&'static str, BTreeMap<&'static str, Value>),
}

impl Value {
    fn from_node(node: &Node) -> Self {
        let spec = node.spec.as_ref();
        let addresses = node
            .status
            .as_ref()
            .and_then(|status| status.addresses.as_ref())
            .map(|addresses| {
                addresses
                    .iter()
                    .map(|address| {
                        Value::Struct(
                            "NodeAddress",
                            BTreeMap::from([
                                ("Type", Value::Str(address.type_.clone())),
                                ("Address", Value::Str(address.address.clone())),
                            ]),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        let spec_value = Value::Struct(
            "NodeSpec",
            BTreeMap::from([
                (
                    "PodCIDR",
                    Value::Str(spec.and_then(|s| s.pod_cidr.clone()).unwrap_or_default()),
                ),
                (
                    "PodCIDRs",
                    Value::List(
                        spec.and_then(|s| s.pod_cidrs.clone())
                            .unwrap_or_default()
                            .into_iter()
                            .map(Value::Str)
                            .collect(),
                    ),
                ),
                (
                    "ProviderID",
                    Value::Str(spec.and_then(|s| s.provider_id.clone()).unwrap_or_default()),
                ),
                (
                    "Unschedulable",
                    Value::Bool(spec.and_then(|s| s.unschedulable).unwrap_or(false)),
                ),
            ]),
        );

        let meta = &node.metadata;
        let meta_fields = BTreeMap::from([
            ("Name", Value::Str(node.name_any())),
            (
                "GenerateName",
                Value::Str(meta.generate_name.clone().unwrap_or_default()),
            ),
            ("Namespace", Value::Str(node.namespace().unwrap_or_default())),
            ("UID", Value::Str(node.uid().unwrap_or_default())),
            ("ResourceVersion", Value::Str(node.resource_version().unwrap_or_default())),
            ("Generation", Value::Int(meta.generation.unwrap_or_default())),
            ("Labels", Value::Map(node.labels().clone())),
            ("Annotations", Value::Map(node.annotations().clone())),
            (
                "Finalizers",
                Value::List(node.finalizers().iter().cloned().map(Value::Str).collect()),
            ),
        ]);

        // Embedded metadata fields are promoted onto the node itself
        let mut fields = meta_fields.clone();
        fields.insert("ObjectMeta", Value::Struct("ObjectMeta", meta_fields));
        fields.insert("Spec", spec_value);
        fields.insert(
            "Status",
            Value::Struct("NodeStatus", BTreeMap::from([("Addresses", Value::List(addresses))])),
        );

        Value::Struct("Node", fields)
    }

    fn is_true(&self) -> bool {
        match self {
            Value::Missing => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            Value::Struct(..) => true,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Missing => "invalid",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::List(_) => "slice",
            Value::Map(_) => "map[string]string",
            Value::Struct(name, _) => *name,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => f.write_str(TEMPLATE_NO_VALUE),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(entries) => {
                f.write_str("map[")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                f.write_str("]")
            }
            Value::Struct(_, fields) => {
                f.write_str("{")?;
                for (i, value) in fields.values().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

// ============================================================================
// Parse tree
// ============================================================================

#[derive(Clone, Debug)]
enum TemplateNode {
    Text(String),
    Action(Pipeline),
    If {
        condition: Pipeline,
        then: Vec<TemplateNode>,
        otherwise: Vec<TemplateNode>,
    },
    With {
        pipeline: Pipeline,
        body: Vec<TemplateNode>,
        otherwise: Vec<TemplateNode>,
    },
    Range {
        pipeline: Pipeline,
        body: Vec<TemplateNode>,
        otherwise: Vec<TemplateNode>,
    },
}

#[derive(Clone, Debug)]
struct Pipeline {
    // `$x := ...` declares, `$x = ...` assigns
    decl: Vec<String>,
    assign: bool,
    commands: Vec<Command>,
}

#[derive(Clone, Debug)]
struct Command(Vec<Operand>);

#[derive(Clone, Debug)]
enum Operand {
    Dot,
    Field(Vec<String>),
    Variable(String, Vec<String>),
    Literal(Value),
    Function(String),
    Nested(Pipeline),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Dot => f.write_str("."),
            Operand::Field(path) => write!(f, ".{}", path.join(".")),
            Operand::Variable(name, path) if path.is_empty() => f.write_str(name),
            Operand::Variable(name, path) => write!(f, "{name}.{}", path.join(".")),
            Operand::Literal(Value::Str(s)) => write!(f, "{s:?}"),
            Operand::Literal(value) => write!(f, "{value}"),
            Operand::Function(name) => f.write_str(name),
            Operand::Nested(_) => f.write_str("(...)"),
        }
    }
}

const FUNCTIONS: &[&str] = &[
    "and",
    "contains",
    "eq",
    "index",
    "isIPv4",
    "isIPv6",
    "len",
    "ne",
    "not",
    "or",
    "replace",
    "toLower",
    "trim",
    "trimPrefix",
    "trimSuffix",
];

// ============================================================================
// Lexer
// ============================================================================

enum Segment {
    Text(String),
    Action(String),
}

fn split_segments(source: &str) -> Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    let mut rest = source;
    let mut trim_next = false;

    while let Some(start) = rest.find("{{") {
        let mut text = &rest[..start];
        if trim_next {
            text = text.trim_start();
        }

        let after_open = &rest[start + 2..];
        let trim_left = after_open.starts_with('-') && after_open[1..].starts_with(char::is_whitespace);
        if trim_left {
            text = text.trim_end();
        }
        if !text.is_empty() {
            segments.push(Segment::Text(text.to_string()));
        }

        let body = if trim_left { &after_open[1..] } else { after_open };
        let close = find_action_end(body).ok_or_else(|| "unclosed action".to_string())?;
        let mut content = &body[..close];

        trim_next = false;
        if let Some(stripped) = content.strip_suffix('-') {
            if stripped.ends_with(char::is_whitespace) {
                trim_next = true;
                content = stripped;
            }
        }

        segments.push(Segment::Action(content.trim().to_string()));
        rest = &body[close + 2..];
    }

    let text = if trim_next { rest.trim_start() } else { rest };
    if !text.is_empty() {
        segments.push(Segment::Text(text.to_string()));
    }

    Ok(segments)
}

// Byte offset of the closing `}}`, skipping over quoted strings
fn find_action_end(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(b'"') if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'`' => quote = Some(b),
            None if b == b'}' && bytes.get(i + 1) == Some(&b'}') => return Some(i),
            None => {}
        }
        i += 1;
    }

    None
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Dot,
    Field(Vec<String>),
    Variable(String, Vec<String>),
    Identifier(String),
    Str(String),
    Int(i64),
    Bool(bool),
    Pipe,
    OpenParen,
    CloseParen,
    Comma,
    Declare,
    Assign,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Dot => f.write_str("."),
            Token::Field(path) => write!(f, ".{}", path.join(".")),
            Token::Variable(name, path) if path.is_empty() => f.write_str(name),
            Token::Variable(name, path) => write!(f, "{name}.{}", path.join(".")),
            Token::Identifier(word) => f.write_str(word),
            Token::Str(s) => write!(f, "{s:?}"),
            Token::Int(n) => write!(f, "{n}"),
            Token::Bool(b) => write!(f, "{b}"),
            Token::Pipe => f.write_str("|"),
            Token::OpenParen => f.write_str("("),
            Token::CloseParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
            Token::Declare => f.write_str(":="),
            Token::Assign => f.write_str("="),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn read_ident(chars: &[char], mut i: usize) -> (String, usize) {
    let start = i;
    while i < chars.len() && is_ident_char(chars[i]) {
        i += 1;
    }
    (chars[start..i].iter().collect(), i)
}

fn read_field_chain(chars: &[char], mut i: usize) -> (Vec<String>, usize) {
    let mut path = Vec::new();
    while chars.get(i) == Some(&'.') && chars.get(i + 1).is_some_and(|c| is_ident_start(*c)) {
        let (name, next) = read_ident(chars, i + 1);
        path.push(name);
        i = next;
    }
    (path, i)
}

fn read_quoted(chars: &[char], mut i: usize) -> Result<(String, usize), String> {
    let mut value = String::new();
    i += 1;
    while let Some(&c) = chars.get(i) {
        match c {
            '"' => return Ok((value, i + 1)),
            '\\' => {
                let escaped = match chars.get(i + 1) {
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some('"') => '"',
                    Some('\\') => '\\',
                    Some(other) => return Err(format!("unknown escape sequence \\{other}")),
                    None => break,
                };
                value.push(escaped);
                i += 2;
            }
            _ => {
                value.push(c);
                i += 1;
            }
        }
    }
    Err("unterminated quoted string".to_string())
}

fn lex_action(content: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = content.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '(' => {
                tokens.push(Token::OpenParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::CloseParen);
                i += 1;
            }
            '"' => {
                let (value, next) = read_quoted(&chars, i)?;
                tokens.push(Token::Str(value));
                i = next;
            }
            '`' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&c| c == '`')
                    .ok_or_else(|| "unterminated raw quoted string".to_string())?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            '.' => {
                if chars.get(i + 1).is_some_and(|c| is_ident_start(*c)) {
                    let (path, next) = read_field_chain(&chars, i);
                    tokens.push(Token::Field(path));
                    i = next;
                } else {
                    tokens.push(Token::Dot);
                    i += 1;
                }
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ':' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Declare);
                i += 2;
            }
            '=' => {
                tokens.push(Token::Assign);
                i += 1;
            }
            '$' => {
                let (name, next) = read_ident(&chars, i + 1);
                let (path, next) = read_field_chain(&chars, next);
                tokens.push(Token::Variable(format!("${name}"), path));
                i = next;
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text.parse().map_err(|_| format!("invalid number {text}"))?;
                tokens.push(Token::Int(number));
            }
            c if is_ident_start(c) => {
                let (word, next) = read_ident(&chars, i);
                tokens.push(match word.as_str() {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    _ => Token::Identifier(word),
                });
                i = next;
            }
            other => return Err(format!("unexpected {other:?} in command")),
        }
    }

    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

enum Terminator {
    Eof,
    End,
    Else(Vec<Token>),
}

struct TreeParser {
    segments: std::vec::IntoIter<Segment>,
    // Variables in scope, innermost last; `$` is always defined
    vars: Vec<String>,
}

fn parse_tree(source: &str) -> Result<Vec<TemplateNode>, String> {
    let mut parser = TreeParser {
        segments: split_segments(source)?.into_iter(),
        vars: vec!["$".to_string()],
    };

    match parser.parse_list()? {
        (nodes, Terminator::Eof) => Ok(nodes),
        (_, Terminator::End) => Err("unexpected {{end}}".to_string()),
        (_, Terminator::Else(_)) => Err("unexpected {{else}}".to_string()),
    }
}

fn is_keyword(tokens: &[Token], keyword: &str) -> bool {
    matches!(tokens.first(), Some(Token::Identifier(word)) if word == keyword)
}

impl TreeParser {
    fn parse_list(&mut self) -> Result<(Vec<TemplateNode>, Terminator), String> {
        let mut nodes = Vec::new();

        while let Some(segment) = self.segments.next() {
            let content = match segment {
                Segment::Text(text) => {
                    nodes.push(TemplateNode::Text(text));
                    continue;
                }
                Segment::Action(content) => content,
            };

            if content.starts_with("/*") && content.ends_with("*/") {
                continue;
            }

            let tokens = lex_action(&content)?;
            if is_keyword(&tokens, "end") {
                if tokens.len() > 1 {
                    return Err("unexpected tokens in {{end}}".to_string());
                }
                return Ok((nodes, Terminator::End));
            } else if is_keyword(&tokens, "else") {
                return Ok((nodes, Terminator::Else(tokens[1..].to_vec())));
            } else if is_keyword(&tokens, "if") {
                nodes.push(self.parse_if(&tokens[1..])?);
            } else if is_keyword(&tokens, "with") {
                let (pipeline, body, otherwise) = self.parse_block("with", &tokens[1..])?;
                nodes.push(TemplateNode::With {
                    pipeline,
                    body,
                    otherwise,
                });
            } else if is_keyword(&tokens, "range") {
                let (pipeline, body, otherwise) = self.parse_block("range", &tokens[1..])?;
                nodes.push(TemplateNode::Range {
                    pipeline,
                    body,
                    otherwise,
                });
            } else {
                // A variable declared here stays visible until the enclosing block ends
                nodes.push(TemplateNode::Action(self.parse_pipeline("command", &tokens)?));
            }
        }

        Ok((nodes, Terminator::Eof))
    }

    fn parse_if(&mut self, tokens: &[Token]) -> Result<TemplateNode, String> {
        let mark = self.vars.len();
        let condition = self.parse_pipeline("if", tokens)?;
        let (then, terminator) = self.parse_list()?;

        let otherwise = match terminator {
            Terminator::End => Vec::new(),
            Terminator::Else(rest) if rest.is_empty() => self.parse_else_body("if")?,
            // `else if` shares the `end` of the outer `if`
            Terminator::Else(rest) if is_keyword(&rest, "if") => vec![self.parse_if(&rest[1..])?],
            Terminator::Else(_) => return Err("unexpected tokens after else in if".to_string()),
            Terminator::Eof => return Err("unexpected EOF: missing end for if".to_string()),
        };
        self.vars.truncate(mark);

        Ok(TemplateNode::If {
            condition,
            then,
            otherwise,
        })
    }

    fn parse_block(
        &mut self,
        keyword: &str,
        tokens: &[Token],
    ) -> Result<(Pipeline, Vec<TemplateNode>, Vec<TemplateNode>), String> {
        let mark = self.vars.len();
        let pipeline = self.parse_pipeline(keyword, tokens)?;
        let (body, terminator) = self.parse_list()?;

        let otherwise = match terminator {
            Terminator::End => Vec::new(),
            Terminator::Else(rest) if rest.is_empty() => self.parse_else_body(keyword)?,
            Terminator::Else(_) => {
                return Err(format!("unexpected tokens after else in {keyword}"))
            }
            Terminator::Eof => return Err(format!("unexpected EOF: missing end for {keyword}")),
        };
        self.vars.truncate(mark);

        Ok((pipeline, body, otherwise))
    }

    fn parse_else_body(&mut self, keyword: &str) -> Result<Vec<TemplateNode>, String> {
        match self.parse_list()? {
            (nodes, Terminator::End) => Ok(nodes),
            (_, Terminator::Else(_)) => Err(format!("expected end; found else in {keyword}")),
            (_, Terminator::Eof) => Err(format!("unexpected EOF: missing end for {keyword}")),
        }
    }

    fn parse_pipeline(&mut self, context: &str, tokens: &[Token]) -> Result<Pipeline, String> {
        let (decl, assign, rest) = split_declaration(context, tokens)?;

        if assign {
            if let Some(undefined) = decl.iter().find(|name| !self.vars.contains(name)) {
                return Err(format!("undefined variable \"{undefined}\""));
            }
        }

        let commands = parse_commands(rest, &self.vars)?;
        if !assign {
            self.vars.extend(decl.iter().cloned());
        }

        Ok(Pipeline {
            decl,
            assign,
            commands,
        })
    }
}

// Split a leading `$x :=`, `$x =` or (in range) `$k, $v :=` off a pipeline
fn split_declaration<'t>(
    context: &str,
    tokens: &'t [Token],
) -> Result<(Vec<String>, bool, &'t [Token]), String> {
    let declared = |token: &Token| match token {
        Token::Variable(name, path) if path.is_empty() => Some(name.clone()),
        _ => None,
    };

    match tokens {
        [first, op @ (Token::Declare | Token::Assign), rest @ ..] => match declared(first) {
            Some(name) => Ok((vec![name], *op == Token::Assign, rest)),
            None => Err(format!("unexpected \"{op}\" in {context}")),
        },
        [first, Token::Comma, second, op @ (Token::Declare | Token::Assign), rest @ ..] => {
            match (declared(first), declared(second)) {
                (Some(key), Some(value)) if context == "range" => {
                    Ok((vec![key, value], *op == Token::Assign, rest))
                }
                (Some(_), Some(_)) => Err(format!("too many declarations in {context}")),
                _ => Err(format!("unexpected \",\" in {context}")),
            }
        }
        _ => Ok((Vec::new(), false, tokens)),
    }
}

fn parse_commands(tokens: &[Token], vars: &[String]) -> Result<Vec<Command>, String> {
    if tokens.is_empty() {
        return Err("missing value for command".to_string());
    }

    let mut commands = Vec::new();
    let mut current = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            Token::Pipe => {
                if current.is_empty() {
                    return Err("missing command before '|'".to_string());
                }
                commands.push(Command(std::mem::take(&mut current)));
            }
            Token::OpenParen => {
                let close = matching_paren(tokens, i)?;
                let nested = Pipeline {
                    decl: Vec::new(),
                    assign: false,
                    commands: parse_commands(&tokens[i + 1..close], vars)?,
                };
                current.push(Operand::Nested(nested));
                i = close;
            }
            Token::CloseParen => return Err("unexpected right paren".to_string()),
            Token::Dot => current.push(Operand::Dot),
            Token::Field(path) => current.push(Operand::Field(path.clone())),
            Token::Variable(name, path) => {
                if !vars.contains(name) {
                    return Err(format!("undefined variable \"{name}\""));
                }
                current.push(Operand::Variable(name.clone(), path.clone()));
            }
            Token::Str(s) => current.push(Operand::Literal(Value::Str(s.clone()))),
            Token::Int(n) => current.push(Operand::Literal(Value::Int(*n))),
            Token::Bool(b) => current.push(Operand::Literal(Value::Bool(*b))),
            Token::Identifier(name) => {
                if !FUNCTIONS.contains(&name.as_str()) {
                    return Err(format!("function \"{name}\" not defined"));
                }
                current.push(Operand::Function(name.clone()));
            }
            other @ (Token::Comma | Token::Declare | Token::Assign) => {
                return Err(format!("unexpected \"{other}\" in operand"));
            }
        }
        i += 1;
    }

    if current.is_empty() {
        return Err("missing command after '|'".to_string());
    }
    commands.push(Command(current));

    Ok(commands)
}

fn matching_paren(tokens: &[Token], open: usize) -> Result<usize, String> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::OpenParen => depth += 1,
            Token::CloseParen => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }
    Err("unclosed left paren".to_string())
}

// ============================================================================
// Execution
// ============================================================================

struct Executor {
    // Variable stack, innermost last; `$` is the root
    vars: Vec<(String, Value)>,
}

impl Executor {
    fn new(root: &Value) -> Self {
        Self {
            vars: vec![("$".to_string(), root.clone())],
        }
    }

    fn walk(&mut self, nodes: &[TemplateNode], dot: &Value, out: &mut String) -> Result<(), String> {
        for node in nodes {
            match node {
                TemplateNode::Text(text) => out.push_str(text),
                TemplateNode::Action(pipeline) => {
                    let value = self.eval_pipeline(pipeline, dot)?;
                    // Declarations and assignments print nothing
                    if pipeline.decl.is_empty() {
                        out.push_str(&value.to_string());
                    }
                }
                TemplateNode::If {
                    condition,
                    then,
                    otherwise,
                } => {
                    let mark = self.vars.len();
                    if self.eval_pipeline(condition, dot)?.is_true() {
                        self.walk(then, dot, out)?;
                    } else {
                        self.walk(otherwise, dot, out)?;
                    }
                    self.vars.truncate(mark);
                }
                TemplateNode::With {
                    pipeline,
                    body,
                    otherwise,
                } => {
                    let mark = self.vars.len();
                    let value = self.eval_pipeline(pipeline, dot)?;
                    if value.is_true() {
                        self.walk(body, &value, out)?;
                    } else {
                        self.walk(otherwise, dot, out)?;
                    }
                    self.vars.truncate(mark);
                }
                TemplateNode::Range {
                    pipeline,
                    body,
                    otherwise,
                } => {
                    let mark = self.vars.len();
                    let items: Vec<(Value, Value)> = match self.eval_pipeline(pipeline, dot)? {
                        Value::List(items) => (0_i64..).map(Value::Int).zip(items).collect(),
                        Value::Map(entries) => entries
                            .into_iter()
                            .map(|(key, value)| (Value::Str(key), Value::Str(value)))
                            .collect(),
                        Value::Missing => Vec::new(),
                        other => return Err(format!("range can't iterate over {other}")),
                    };

                    if items.is_empty() {
                        self.walk(otherwise, dot, out)?;
                    }
                    for (key, item) in items {
                        let iteration = self.vars.len();
                        self.bind_iteration(pipeline, key, item.clone())?;
                        self.walk(body, &item, out)?;
                        self.vars.truncate(iteration);
                    }
                    self.vars.truncate(mark);
                }
            }
        }
        Ok(())
    }

    // `range $v :=` binds the element; `range $k, $v :=` binds the index or key too
    fn bind_iteration(&mut self, pipeline: &Pipeline, key: Value, item: Value) -> Result<(), String> {
        match pipeline.decl.as_slice() {
            [] => Ok(()),
            [element] => self.bind(element, pipeline.assign, 1, item),
            [index, element] => {
                self.bind(index, pipeline.assign, 2, key)?;
                self.bind(element, pipeline.assign, 1, item)
            }
            _ => Err("too many declarations in range".to_string()),
        }
    }

    fn bind(&mut self, name: &str, assign: bool, depth: usize, value: Value) -> Result<(), String> {
        if assign {
            return self.set_variable(name, value);
        }
        let len = self.vars.len();
        match len.checked_sub(depth).and_then(|i| self.vars.get_mut(i)) {
            Some(slot) => {
                slot.1 = value;
                Ok(())
            }
            None => Err(format!("undefined variable: {name}")),
        }
    }

    fn variable(&self, name: &str) -> Result<&Value, String> {
        self.vars
            .iter()
            .rev()
            .find(|(declared, _)| declared == name)
            .map(|(_, value)| value)
            .ok_or_else(|| format!("undefined variable: {name}"))
    }

    fn set_variable(&mut self, name: &str, value: Value) -> Result<(), String> {
        match self.vars.iter_mut().rev().find(|(declared, _)| declared == name) {
            Some(slot) => {
                slot.1 = value;
                Ok(())
            }
            None => Err(format!("undefined variable: {name}")),
        }
    }

    fn eval_pipeline(&mut self, pipeline: &Pipeline, dot: &Value) -> Result<Value, String> {
        let mut piped = None;
        for command in &pipeline.commands {
            piped = Some(self.eval_command(command, dot, piped)?);
        }
        let value = piped.unwrap_or(Value::Missing);

        for name in &pipeline.decl {
            if pipeline.assign {
                self.set_variable(name, value.clone())?;
            } else {
                self.vars.push((name.clone(), value.clone()));
            }
        }

        Ok(value)
    }

    fn eval_command(
        &mut self,
        command: &Command,
        dot: &Value,
        piped: Option<Value>,
    ) -> Result<Value, String> {
        let Some((first, rest)) = command.0.split_first() else {
            return Err("empty command".to_string());
        };

        if let Operand::Function(name) = first {
            let mut args = rest
                .iter()
                .map(|arg| self.eval_operand(arg, dot))
                .collect::<Result<Vec<_>, _>>()?;
            args.extend(piped);
            return call_function(name, args);
        }

        if !rest.is_empty() || piped.is_some() {
            return Err(format!("can't give argument to non-function {first}"));
        }
        self.eval_operand(first, dot)
    }

    fn eval_operand(&mut self, operand: &Operand, dot: &Value) -> Result<Value, String> {
        match operand {
            Operand::Dot => Ok(dot.clone()),
            Operand::Field(path) => lookup(dot, path),
            Operand::Variable(name, path) => lookup(self.variable(name)?, path),
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Function(name) => call_function(name, Vec::new()),
            Operand::Nested(pipeline) => self.eval_pipeline(pipeline, dot),
        }
    }
}

fn lookup(value: &Value, path: &[String]) -> Result<Value, String> {
    let Some((field, rest)) = path.split_first() else {
        return Ok(value.clone());
    };

    match value {
        Value::Struct(type_name, fields) => {
            let next = fields
                .get(field.as_str())
                .ok_or_else(|| format!("can't evaluate field {field} in type {type_name}"))?;
            lookup(next, rest)
        }
        // A missing map key renders as "<no value>" rather than failing
        Value::Map(entries) => match entries.get(field) {
            Some(entry) => lookup(&Value::Str(entry.clone()), rest),
            None => lookup(&Value::Missing, rest),
        },
        Value::Missing => Ok(Value::Missing),
        other => Err(format!(
            "can't evaluate field {field} in type {}",
            other.type_name()
        )),
    }
}

// ============================================================================
// Functions
// ============================================================================

fn expect_args<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N], String> {
    let got = args.len();
    args.try_into()
        .map_err(|_| format!("wrong number of args for {name}: want {N} got {got}"))
}

fn as_str(value: &Value) -> Result<&str, String> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(format!(
            "wrong type for value; expected string; got {}",
            other.type_name()
        )),
    }
}

fn parse_ip(value: &Value) -> Result<Option<IpAddr>, String> {
    Ok(as_str(value)?.parse::<IpAddr>().ok())
}

fn values_equal(left: &Value, right: &Value) -> Result<bool, String> {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::Int(a), Value::Int(b)) => Ok(a == b),
        (Value::Str(a), Value::Str(b)) => Ok(a == b),
        (
            Value::Bool(_) | Value::Int(_) | Value::Str(_),
            Value::Bool(_) | Value::Int(_) | Value::Str(_),
        ) => Err("incompatible types for comparison".to_string()),
        _ => Err("invalid type for comparison".to_string()),
    }
}

fn index_value(item: Value, key: &Value) -> Result<Value, String> {
    match (item, key) {
        (Value::Map(entries), Value::Str(k)) => {
            Ok(Value::Str(entries.get(k).cloned().unwrap_or_default()))
        }
        (Value::List(items), Value::Int(i)) => usize::try_from(*i)
            .ok()
            .and_then(|i| items.into_iter().nth(i))
            .ok_or_else(|| format!("error calling index: index out of range: {i}")),
        (Value::Missing, _) => Err("error calling index: index of untyped nil".to_string()),
        (other, key) => Err(format!(
            "error calling index: cannot index {} with {}",
            other.type_name(),
            key.type_name()
        )),
    }
}

fn call_function(name: &str, args: Vec<Value>) -> Result<Value, String> {
    match name {
        "contains" => {
            let [s, substr] = expect_args::<2>(name, args)?;
            Ok(Value::Bool(as_str(&s)?.contains(as_str(&substr)?)))
        }
        "trimPrefix" => {
            let [s, prefix] = expect_args::<2>(name, args)?;
            let s = as_str(&s)?;
            Ok(Value::Str(
                s.strip_prefix(as_str(&prefix)?).unwrap_or(s).to_string(),
            ))
        }
        "trimSuffix" => {
            let [s, suffix] = expect_args::<2>(name, args)?;
            let s = as_str(&s)?;
            Ok(Value::Str(
                s.strip_suffix(as_str(&suffix)?).unwrap_or(s).to_string(),
            ))
        }
        "trim" => {
            let [s] = expect_args::<1>(name, args)?;
            Ok(Value::Str(as_str(&s)?.trim().to_string()))
        }
        "toLower" => {
            let [s] = expect_args::<1>(name, args)?;
            Ok(Value::Str(as_str(&s)?.to_lowercase()))
        }
        // replace OLD NEW TARGET, so `{{ .Name | replace "." "-" }}` works
        "replace" => {
            let [old, new, target] = expect_args::<3>(name, args)?;
            Ok(Value::Str(
                as_str(&target)?.replace(as_str(&old)?, as_str(&new)?),
            ))
        }
        // IPv4-mapped IPv6 addresses count as IPv4
        "isIPv4" => {
            let [s] = expect_args::<1>(name, args)?;
            Ok(Value::Bool(match parse_ip(&s)? {
                Some(IpAddr::V4(_)) => true,
                Some(IpAddr::V6(v6)) => v6.to_ipv4_mapped().is_some(),
                None => false,
            }))
        }
        "isIPv6" => {
            let [s] = expect_args::<1>(name, args)?;
            Ok(Value::Bool(match parse_ip(&s)? {
                Some(IpAddr::V6(v6)) => v6.to_ipv4_mapped().is_none(),
                _ => false,
            }))
        }
        "not" => {
            let [value] = expect_args::<1>(name, args)?;
            Ok(Value::Bool(!value.is_true()))
        }
        "and" | "or" => {
            let want_truthy = name == "or";
            let mut last = None;
            for value in args {
                if value.is_true() == want_truthy {
                    return Ok(value);
                }
                last = Some(value);
            }
            last.ok_or_else(|| format!("wrong number of args for {name}: want at least 1 got 0"))
        }
        "eq" => {
            let mut args = args.into_iter();
            let first = args
                .next()
                .ok_or_else(|| "wrong number of args for eq: want at least 1 got 0".to_string())?;
            let mut compared = false;
            for other in args {
                compared = true;
                if values_equal(&first, &other)? {
                    return Ok(Value::Bool(true));
                }
            }
            if compared {
                Ok(Value::Bool(false))
            } else {
                Err("missing argument for comparison".to_string())
            }
        }
        "ne" => {
            let [left, right] = expect_args::<2>(name, args)?;
            Ok(Value::Bool(!values_equal(&left, &right)?))
        }
        "index" => {
            let mut args = args.into_iter();
            let mut item = args
                .next()
                .ok_or_else(|| "wrong number of args for index: want at least 1 got 0".to_string())?;
            for key in args {
                item = index_value(item, &key)?;
            }
            Ok(item)
        }
        "len" => {
            let [value] = expect_args::<1>(name, args)?;
            let length = match &value {
                Value::Str(s) => s.len(),
                Value::List(items) => items.len(),
                Value::Map(entries) => entries.len(),
                other => return Err(format!("error calling len: len of type {}", other.type_name())),
            };
            i64::try_from(length)
                .map(Value::Int)
                .map_err(|_| "error calling len: length overflow".to_string())
        }
        _ => Err(format!("function \"{name}\" not defined")),
    }
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod template_tests;
