//! Placeholder substitution in template bodies.
//!
//! Two syntaxes are supported. `bare` replaces every literal occurrence of
//! a parameter name, which is what the existing templates rely on
//! (`"Hola, nombre_archivo."`). `braced` only touches `{{name}}` tokens.
//!
//! Both are a single left to right pass over the original body, so
//! substituted values are never scanned again.

use std::{collections::BTreeMap, fmt, str::FromStr};

use courier_common::model::Parameter;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderSyntax {
    /// Parameter names appear verbatim in the body
    #[default]
    Bare,
    /// Parameter names appear as `{{ name }}`
    Braced,
}

impl FromStr for PlaceholderSyntax {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bare" => Ok(Self::Bare),
            "braced" => Ok(Self::Braced),
            other => Err(format!(
                "unknown placeholder syntax '{other}', expected bare or braced"
            )),
        }
    }
}

pub trait Renderer: Send + Sync + fmt::Debug {
    /// Substitute `params` into `body`.
    fn render(&self, body: &str, params: &[Parameter]) -> String;

    /// Whether rendering `body` needs at least one parameter.
    ///
    /// A command without parameters for such a body is rejected.
    fn requires_parameters(&self, body: &str) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderRenderer {
    syntax: PlaceholderSyntax,
}

impl PlaceholderRenderer {
    pub const fn new(syntax: PlaceholderSyntax) -> Self {
        Self { syntax }
    }

    pub const fn syntax(&self) -> PlaceholderSyntax {
        self.syntax
    }
}

impl Renderer for PlaceholderRenderer {
    fn render(&self, body: &str, params: &[Parameter]) -> String {
        let keys = keys(params);
        match self.syntax {
            PlaceholderSyntax::Bare => render_bare(body, &keys),
            PlaceholderSyntax::Braced => render_braced(body, &keys),
        }
    }

    fn requires_parameters(&self, body: &str) -> bool {
        match self.syntax {
            PlaceholderSyntax::Bare => true,
            PlaceholderSyntax::Braced => next_token(body).is_some(),
        }
    }
}

/// Parameter names in lexicographic order. Empty names never match and
/// the first occurrence of a repeated name wins.
fn keys(params: &[Parameter]) -> BTreeMap<&str, &str> {
    let mut keys = BTreeMap::new();
    for param in params.iter().filter(|param| !param.name.is_empty()) {
        keys.entry(param.name.as_str())
            .or_insert(param.value.as_str());
    }
    keys
}

fn render_bare(body: &str, keys: &BTreeMap<&str, &str>) -> String {
    if keys.is_empty() {
        return body.to_string();
    }

    let mut output = String::with_capacity(body.len());
    let mut rest = body;

    while let Some(ch) = rest.chars().next() {
        let longest = keys
            .iter()
            .filter(|(key, _)| rest.starts_with(**key))
            .max_by_key(|(key, _)| key.len());

        if let Some((key, value)) = longest {
            output.push_str(value);
            rest = &rest[key.len()..];
        } else {
            output.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
    }

    output
}

/// Byte range of the next `{{ ... }}` token and its trimmed name.
fn next_token(body: &str) -> Option<(usize, usize, &str)> {
    let open = body.find("{{")?;
    let close = body[open + 2..].find("}}")? + open + 2;
    Some((open, close + 2, body[open + 2..close].trim()))
}

fn render_braced(body: &str, keys: &BTreeMap<&str, &str>) -> String {
    let mut output = String::with_capacity(body.len());
    let mut rest = body;

    while let Some((start, end, name)) = next_token(rest) {
        output.push_str(&rest[..start]);
        match keys.get(name) {
            Some(value) => output.push_str(value),
            None => output.push_str(&rest[start..end]),
        }
        rest = &rest[end..];
    }

    output.push_str(rest);
    output
}
