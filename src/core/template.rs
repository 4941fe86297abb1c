//! GB-003: Template expansion.
//!
//! Expands `{column}` placeholders from one entry. Namespaced placeholders
//! `{NS[key]}` and `{NS.key}` are looked up in a separate set of synthetic
//! values (e.g. `{GL[target_filename]}`, `{commit.id}`), so they never collide
//! with entry columns. `{{` and `}}` produce literal braces.

use super::error::Error;
use super::types::Entry;
use std::collections::HashMap;

/// Synthetic values grouped by namespace.
#[derive(Debug, Clone, Default)]
pub struct Extras {
    namespaces: HashMap<String, HashMap<String, String>>,
}

impl Extras {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `namespace[key] = value`.
    pub fn with(mut self, namespace: &str, key: &str, value: impl Into<String>) -> Self {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
        self
    }

    fn lookup(&self, namespace: &str, key: &str) -> Option<&str> {
        self.namespaces
            .get(namespace)
            .and_then(|values| values.get(key))
            .map(String::as_str)
    }
}

/// Expand `{column}` placeholders using the entry.
pub fn expand(template: &str, entry: &Entry) -> Result<String, Error> {
    expand_with(template, entry, &Extras::default())
}

/// Expand placeholders using the entry and the namespaced extras.
pub fn expand_with(template: &str, entry: &Entry, extras: &Extras) -> Result<String, Error> {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        result.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(after) = tail.strip_prefix("{{") {
            result.push('{');
            rest = after;
            continue;
        }
        if let Some(after) = tail.strip_prefix("}}") {
            result.push('}');
            rest = after;
            continue;
        }
        if tail.starts_with('}') {
            return Err(invalid(template, format!("unmatched '}}' at position {}", template.len() - tail.len())));
        }

        let close = tail
            .find('}')
            .ok_or_else(|| invalid(template, format!("unclosed '{{' at position {}", template.len() - tail.len())))?;
        let key = tail[1..close].trim();
        if key.is_empty() || key.contains('{') {
            return Err(invalid(template, "empty or nested placeholder".to_string()));
        }

        result.push_str(resolve_key(template, key, entry, extras)?);
        rest = &tail[close + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

fn resolve_key<'a>(
    template: &str,
    key: &str,
    entry: &'a Entry,
    extras: &'a Extras,
) -> Result<&'a str, Error> {
    let missing = || Error::TemplateColumnMissing {
        template: template.to_string(),
        column: key.to_string(),
    };

    if let Some((namespace, inner)) = split_namespaced(key) {
        return extras.lookup(namespace, inner).ok_or_else(missing);
    }
    entry.get(key).ok_or_else(missing)
}

/// Split `NS[key]` or `NS.key`; `None` for a plain column name.
fn split_namespaced(key: &str) -> Option<(&str, &str)> {
    if let Some(open) = key.find('[') {
        let inner = key[open + 1..].strip_suffix(']')?;
        return Some((&key[..open], inner));
    }
    key.split_once('.')
}

fn invalid(template: &str, reason: String) -> Error {
    Error::InvalidTemplate {
        template: template.to_string(),
        reason,
    }
}
