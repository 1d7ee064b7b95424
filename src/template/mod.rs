//! Static analysis of double-brace prompt templates.
//!
//! Block helpers (`{{#each}}`, `{{#if}}`, ...) are never expanded. Their
//! arguments and everything between the open and close tags are scanned as
//! ordinary references, and the helper names themselves are structural
//! markup. Malformed delimiters are literal text: analysis never fails.

pub mod codegen;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Primitive kind inferred for a template variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    #[default]
    String,
    Boolean,
    Array,
    Object,
}

impl std::fmt::Display for VariableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VariableKind::String => "string",
            VariableKind::Boolean => "boolean",
            VariableKind::Array => "array",
            VariableKind::Object => "object",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub kind: VariableKind,
}

/// Variables of a template in first-occurrence order, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableSchema {
    variables: Vec<Variable>,
}

impl VariableSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Variable> {
        self.variables.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.name.as_str()).collect()
    }

    /// Add a variable, or refine the kind of an existing one. A specific
    /// kind replaces `String`; the position never changes.
    pub fn insert(&mut self, name: &str, kind: VariableKind) {
        match self.variables.iter_mut().find(|v| v.name == name) {
            Some(existing) => {
                if existing.kind == VariableKind::String {
                    existing.kind = kind;
                }
            }
            None => self.variables.push(Variable {
                name: name.to_string(),
                kind,
            }),
        }
    }

    /// Append every variable of `other` not already present.
    pub fn merge(&mut self, other: &VariableSchema) {
        for var in other.iter() {
            self.insert(&var.name, var.kind);
        }
    }
}

impl<'a> IntoIterator for &'a VariableSchema {
    type Item = &'a Variable;
    type IntoIter = std::slice::Iter<'a, Variable>;

    fn into_iter(self) -> Self::IntoIter {
        self.variables.iter()
    }
}

/// A `{{ ... }}` tag located in the source text.
struct Tag<'a> {
    start: usize,
    end: usize,
    inner: &'a str,
}

/// Find every well-formed tag. An opener with no closer, or one followed by
/// another opener before its closer, is left as literal text.
fn scan_tags(template: &str) -> Vec<Tag<'_>> {
    let mut tags = Vec::new();
    let mut pos = 0;

    while let Some(offset) = template[pos..].find("{{") {
        let start = pos + offset;
        let triple = template[start..].starts_with("{{{")
            && template[start + 3..].contains("}}}");
        let (open_len, close) = if triple {
            (3, "}}}")
        } else if template[start..].starts_with("{{!--") {
            (2, "--}}")
        } else {
            (2, "}}")
        };
        let body_start = start + open_len;

        let Some(close_offset) = template[body_start..].find(close) else {
            break;
        };
        let body_end = body_start + close_offset;

        if close != "--}}" {
            if let Some(reopen) = template[body_start..body_end].find("{{") {
                pos = body_start + reopen;
                continue;
            }
        }

        let inner = &template[body_start..body_end];
        let end = body_end + close.len();
        tags.push(Tag { start, end, inner });
        pos = end;
    }

    tags
}

fn strip_whitespace_control(inner: &str) -> &str {
    let inner = inner.trim();
    let inner = inner.strip_prefix('~').unwrap_or(inner);
    let inner = inner.strip_suffix('~').unwrap_or(inner);
    inner.trim()
}

/// Whether `token` names a data slot rather than a literal, keyword or
/// scope marker.
fn is_variable_path(token: &str) -> bool {
    let Some(first) = token.chars().next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    if matches!(token, "this" | "true" | "false" | "null" | "undefined" | "else") {
        return false;
    }
    if token.ends_with('.') {
        return false;
    }
    token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Argument tokens of a helper call, up to any `as |params|` clause.
fn argument_paths<'a>(tokens: &[&'a str]) -> Vec<&'a str> {
    let mut paths = Vec::new();
    for token in tokens {
        if *token == "as" || token.starts_with('|') {
            break;
        }
        if token.starts_with('(') {
            // subexpression helper name
            continue;
        }
        let token = token.trim_end_matches(')');
        let token = match token.split_once('=') {
            Some((_, value)) => value,
            None => token,
        };
        if is_variable_path(token) {
            paths.push(token);
        }
    }
    paths
}

fn block_kind(helper: &str) -> VariableKind {
    match helper {
        "each" => VariableKind::Array,
        "if" | "unless" => VariableKind::Boolean,
        "with" => VariableKind::Object,
        _ => VariableKind::String,
    }
}

/// Variables referenced by one tag body.
fn tag_variables(inner: &str) -> Vec<(&str, VariableKind)> {
    let inner = strip_whitespace_control(inner);

    if inner.is_empty() || inner.starts_with(|c: char| matches!(c, '!' | '>' | '/')) {
        return Vec::new();
    }

    if let Some(rest) = inner.strip_prefix('#').or_else(|| inner.strip_prefix('^')) {
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        let Some((helper, args)) = tokens.split_first() else {
            return Vec::new();
        };
        if inner.starts_with('^') && args.is_empty() {
            // mustache inverted section: `{{^name}}`
            return argument_paths(&[*helper])
                .into_iter()
                .map(|p| (p, VariableKind::Boolean))
                .collect();
        }
        let kind = block_kind(helper);
        return argument_paths(args).into_iter().map(|p| (p, kind)).collect();
    }

    let tokens: Vec<&str> = inner.split_whitespace().collect();
    match tokens.as_slice() {
        [] => Vec::new(),
        ["else", helper, args @ ..] => {
            let kind = block_kind(helper);
            argument_paths(args).into_iter().map(|p| (p, kind)).collect()
        }
        [single] => argument_paths(&[*single])
            .into_iter()
            .map(|p| (p, VariableKind::String))
            .collect(),
        [_helper, args @ ..] => argument_paths(args)
            .into_iter()
            .map(|p| (p, VariableKind::String))
            .collect(),
    }
}

/// Extract the variable schema of a template.
pub fn extract_variables(template: &str) -> VariableSchema {
    let mut schema = VariableSchema::new();
    for tag in scan_tags(template) {
        for (name, kind) in tag_variables(tag.inner) {
            schema.insert(name, kind);
        }
    }
    schema
}

fn lookup<'v>(input: &'v Value, path: &str) -> Option<&'v Value> {
    let path = path.strip_prefix("this.").unwrap_or(path);
    path.split('.').try_fold(input, |value, key| value.get(key))
}

/// Render `template` with values from `input`.
///
/// Only plain references are substituted; helpers are not evaluated and
/// their tags are removed. Missing values render as empty text.
pub fn render(template: &str, input: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut pos = 0;

    for tag in scan_tags(template) {
        out.push_str(&template[pos..tag.start]);
        pos = tag.end;

        let inner = strip_whitespace_control(tag.inner);
        if inner.split_whitespace().count() != 1 || !is_variable_path(inner) {
            continue;
        }
        match lookup(input, inner) {
            Some(Value::String(s)) => out.push_str(s),
            Some(Value::Null) | None => {}
            Some(other) => out.push_str(&other.to_string()),
        }
    }

    out.push_str(&template[pos..]);
    out
}
