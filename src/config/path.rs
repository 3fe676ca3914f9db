use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::sync::OnceLock;

use crate::error::{DosmatError, Result};

static KEY_PATH_PATTERN: OnceLock<Regex> = OnceLock::new();

fn key_path_pattern() -> &'static Regex {
    KEY_PATH_PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_-]*(\.[A-Za-z0-9_][A-Za-z0-9_-]*)*$")
            .expect("key path pattern is valid")
    })
}

/// Dotted address of a node in the raw document, e.g. `optim.params.lr`.
///
/// Numeric segments index into sequences (`optim.params.betas.0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    pub fn parse(path: &str) -> Result<Self> {
        let path = path.trim();
        if !key_path_pattern().is_match(path) {
            return Err(DosmatError::Schema(format!("Invalid key path: '{}'", path)));
        }

        Ok(Self {
            segments: path.split('.').map(str::to_string).collect(),
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment; key paths are never empty
    pub fn leaf(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn get<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        self.segments
            .iter()
            .try_fold(root, |node, segment| step(node, segment))
    }

    /// Mapping that holds the leaf key, creating intermediate mappings when `create` is set
    pub(crate) fn parent_mapping_mut<'v>(
        &self,
        root: &'v mut Value,
        create: bool,
    ) -> Result<&'v mut Mapping> {
        let (_, parents) = self
            .segments
            .split_last()
            .ok_or_else(|| DosmatError::Schema("Empty key path".to_string()))?;

        let mut node = root;
        for (depth, segment) in parents.iter().enumerate() {
            let here = self.segments[..=depth].join(".");
            let mapping = node.as_mapping_mut().ok_or_else(|| {
                DosmatError::Override(format!("'{}' is not a mapping", parent_label(self, depth)))
            })?;

            if !mapping.contains_key(segment.as_str()) {
                if !create {
                    return Err(DosmatError::Override(format!("Key '{}' not found", here)));
                }
                mapping.insert(Value::String(segment.clone()), Value::Mapping(Mapping::new()));
            }

            node = mapping
                .get_mut(segment.as_str())
                .ok_or_else(|| DosmatError::Override(format!("Key '{}' not found", here)))?;
        }

        let label = self.segments[..self.segments.len() - 1].join(".");
        node.as_mapping_mut().ok_or_else(|| {
            DosmatError::Override(format!(
                "'{}' is not a mapping",
                if label.is_empty() { "<root>" } else { label.as_str() }
            ))
        })
    }
}

/// Child of `node` under one path segment
pub(crate) fn step<'v>(node: &'v Value, segment: &str) -> Option<&'v Value> {
    match node {
        Value::Mapping(mapping) => mapping.get(segment),
        Value::Sequence(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        _ => None,
    }
}

fn parent_label(path: &KeyPath, depth: usize) -> String {
    if depth == 0 {
        "<root>".to_string()
    } else {
        path.segments[..depth].join(".")
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}
