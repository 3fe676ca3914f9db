use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;

use crate::config::path::{KeyPath, step};
use crate::error::{DosmatError, Result};

const ENV_RESOLVER: &str = "oc.env:";
const NOW_RESOLVER: &str = "now:";

/// Values available to `${...}` resolvers other than the document itself
#[derive(Debug, Clone)]
pub struct InterpolationContext {
    /// Environment variables (loaded from system environment)
    pub env: HashMap<String, String>,
    /// Timestamp used by every `${now:...}` in one load
    pub now: DateTime<Local>,
}

impl InterpolationContext {
    pub fn new() -> Self {
        Self {
            env: std::env::vars().collect(),
            now: Local::now(),
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_now(mut self, now: DateTime<Local>) -> Self {
        self.now = now;
        self
    }
}

impl Default for InterpolationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, PartialEq)]
enum Segment {
    Literal(String),
    Reference(String),
}

/// Bookkeeping for one `resolve()` pass: references being resolved and finished results
#[derive(Default)]
struct Resolution {
    stack: Vec<String>,
    resolved: HashMap<String, Value>,
}

/// Resolves `${path}`, `${oc.env:VAR[,default]}` and `${now:FORMAT}` across a raw document
pub struct Interpolator<'a> {
    root: &'a Value,
    context: &'a InterpolationContext,
}

impl<'a> Interpolator<'a> {
    pub fn new(root: &'a Value, context: &'a InterpolationContext) -> Self {
        Self { root, context }
    }

    /// Resolve every interpolation in the document, returning a new tree
    pub fn resolve(&self) -> Result<Value> {
        let mut state = Resolution::default();
        self.resolve_node(self.root, &mut state)
    }

    /// Check if a string contains interpolation syntax
    pub fn is_interpolated(s: &str) -> bool {
        s.contains("${")
    }

    fn resolve_node(&self, node: &Value, state: &mut Resolution) -> Result<Value> {
        match node {
            Value::String(s) if Self::is_interpolated(s) => self.resolve_string(s, state),
            Value::Mapping(mapping) => {
                let mut resolved = Mapping::with_capacity(mapping.len());
                for (key, value) in mapping {
                    resolved.insert(key.clone(), self.resolve_node(value, state)?);
                }
                Ok(Value::Mapping(resolved))
            }
            Value::Sequence(items) => items
                .iter()
                .map(|item| self.resolve_node(item, state))
                .collect::<Result<Vec<_>>>()
                .map(Value::Sequence),
            Value::Tagged(tagged) => {
                let mut tagged = (**tagged).clone();
                tagged.value = self.resolve_node(&tagged.value, state)?;
                Ok(Value::Tagged(Box::new(tagged)))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(&self, s: &str, state: &mut Resolution) -> Result<Value> {
        let segments = parse_segments(s)?;

        // A lone reference keeps the type of whatever it points at
        if let [Segment::Reference(expr)] = segments.as_slice() {
            return self.resolve_expr(expr, state);
        }

        let mut out = String::with_capacity(s.len());
        for segment in segments {
            match segment {
                Segment::Literal(text) => out.push_str(&text),
                Segment::Reference(expr) => {
                    let value = self.resolve_expr(&expr, state)?;
                    out.push_str(&stringify(&expr, &value)?);
                }
            }
        }
        Ok(Value::String(out))
    }

    fn resolve_expr(&self, expr: &str, state: &mut Resolution) -> Result<Value> {
        let expr = expr.trim();

        if let Some(args) = expr.strip_prefix(ENV_RESOLVER) {
            return self.resolve_env(args);
        }

        if let Some(format) = expr.strip_prefix(NOW_RESOLVER) {
            return self.resolve_now(format);
        }

        if let Some((resolver, _)) = expr.split_once(':') {
            return Err(DosmatError::Interpolation(format!(
                "Unknown resolver '{}' in '${{{}}}'",
                resolver, expr
            )));
        }

        self.resolve_reference(expr, state)
    }

    fn resolve_env(&self, args: &str) -> Result<Value> {
        let (name, default) = match args.split_once(',') {
            Some((name, default)) => (name.trim(), Some(default.trim())),
            None => (args.trim(), None),
        };

        if name.is_empty() {
            return Err(DosmatError::Interpolation(
                "oc.env requires a variable name".to_string(),
            ));
        }

        match (self.context.env.get(name), default) {
            (Some(value), _) => Ok(Value::String(value.clone())),
            (None, Some(default)) => Ok(Value::String(unquote(default).to_string())),
            (None, None) => Err(DosmatError::Interpolation(format!(
                "Environment variable '{}' is not set",
                name
            ))),
        }
    }

    fn resolve_now(&self, format: &str) -> Result<Value> {
        let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
        if items.iter().any(|item| matches!(item, Item::Error)) {
            return Err(DosmatError::Interpolation(format!(
                "Invalid time format: '{}'",
                format
            )));
        }

        let rendered = self
            .context
            .now
            .format_with_items(items.into_iter())
            .to_string();
        Ok(Value::String(rendered))
    }

    fn resolve_reference(&self, expr: &str, state: &mut Resolution) -> Result<Value> {
        let path = KeyPath::parse(expr).map_err(|_| {
            DosmatError::Interpolation(format!("Invalid reference '${{{}}}'", expr))
        })?;
        self.resolve_path(path.segments(), state)
    }

    /// Resolve the node at `segments`, following references met along the way
    fn resolve_path(&self, segments: &[String], state: &mut Resolution) -> Result<Value> {
        let key = segments.join(".");

        if let Some(value) = state.resolved.get(&key) {
            return Ok(value.clone());
        }

        if state.stack.contains(&key) {
            state.stack.push(key);
            return Err(DosmatError::Interpolation(format!(
                "Reference cycle: {}",
                state.stack.join(" -> ")
            )));
        }

        let not_found =
            || DosmatError::Interpolation(format!("Reference '${{{}}}' not found", key));

        let mut node = self.root;
        for (depth, segment) in segments.iter().enumerate() {
            let child = step(node, segment).ok_or_else(not_found)?;

            // An interpolated section must be resolved before stepping into it
            let remaining = &segments[depth + 1..];
            if !remaining.is_empty()
                && let Value::String(s) = child
                && Self::is_interpolated(s)
            {
                state.stack.push(key.clone());
                let section = self.resolve_path(&segments[..=depth], state);
                state.stack.pop();

                let section = section?;
                let mut target = &section;
                for segment in remaining {
                    target = step(target, segment).ok_or_else(not_found)?;
                }
                let target = target.clone();
                state.resolved.insert(key, target.clone());
                return Ok(target);
            }

            node = child;
        }

        state.stack.push(key.clone());
        let resolved = self.resolve_node(node, state);
        state.stack.pop();

        let resolved = resolved?;
        state.resolved.insert(key, resolved.clone());
        Ok(resolved)
    }
}

/// Split a string into literal text and `${...}` references
fn parse_segments(s: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = s;

    while !rest.is_empty() {
        // `\\${x}` is a literal backslash followed by a real interpolation
        if rest.starts_with("\\\\${") {
            literal.push('\\');
            rest = &rest[2..];
            continue;
        }

        if let Some(after) = rest.strip_prefix("\\${") {
            literal.push_str("${");
            rest = after;
            continue;
        }

        if let Some(after) = rest.strip_prefix("${") {
            let end = after.find('}').ok_or_else(|| {
                DosmatError::Interpolation(format!("Unterminated interpolation in '{}'", s))
            })?;
            let expr = &after[..end];
            if expr.contains("${") {
                return Err(DosmatError::Interpolation(format!(
                    "Nested interpolation is not supported: '{}'",
                    s
                )));
            }
            if expr.trim().is_empty() {
                return Err(DosmatError::Interpolation(format!(
                    "Empty interpolation in '{}'",
                    s
                )));
            }

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Reference(expr.to_string()));
            rest = &after[end + 1..];
            continue;
        }

        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            literal.push(c);
        }
        rest = chars.as_str();
    }

    if !literal.is_empty() || segments.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    Ok(segments)
}

fn stringify(expr: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        _ => Err(DosmatError::Interpolation(format!(
            "'${{{}}}' points at a mapping or sequence and cannot be embedded in a string",
            expr
        ))),
    }
}

fn unquote(s: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = s.strip_prefix(quote).and_then(|s| s.strip_suffix(quote)) {
            return inner;
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn context() -> InterpolationContext {
        InterpolationContext::new()
            .with_env(HashMap::new())
            .with_var("PROJECT_ROOT", "/work/dosmatgen")
            .with_now(Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap())
    }

    fn resolve(yaml: &str) -> Result<Value> {
        let root: Value = serde_yaml::from_str(yaml).unwrap();
        let ctx = context();
        Interpolator::new(&root, &ctx).resolve()
    }

    #[test]
    fn test_whole_string_reference_keeps_type() {
        let out = resolve(
            r#"
data:
  train_max_epochs: 500
train:
  pl_trainer:
    max_epochs: ${data.train_max_epochs}
"#,
        )
        .unwrap();

        assert_eq!(out["train"]["pl_trainer"]["max_epochs"].as_u64(), Some(500));
    }

    #[test]
    fn test_embedded_reference_is_stringified() {
        let out = resolve(
            r#"
expname: dos_cfg
save_dir: ${oc.env:PROJECT_ROOT}/runs/${expname}
"#,
        )
        .unwrap();

        assert_eq!(out["save_dir"].as_str(), Some("/work/dosmatgen/runs/dos_cfg"));
    }

    #[test]
    fn test_chained_references() {
        let out = resolve(
            r#"
a: ${b}
b: ${c}
c: 7
"#,
        )
        .unwrap();

        assert_eq!(out["a"].as_u64(), Some(7));
    }

    #[test]
    fn test_env_default_and_missing() {
        let out = resolve("root: ${oc.env:DATA_ROOT,'/tmp/data'}").unwrap();
        assert_eq!(out["root"].as_str(), Some("/tmp/data"));

        let err = resolve("root: ${oc.env:DATA_ROOT}").unwrap_err();
        assert!(err.to_string().contains("DATA_ROOT"));
    }

    #[test]
    fn test_now_resolver() {
        let out = resolve("stamp: run_${now:%Y-%m-%d}").unwrap();
        assert_eq!(out["stamp"].as_str(), Some("run_2024-03-09"));
    }

    #[test]
    fn test_cycle_is_reported() {
        let err = resolve(
            r#"
a: ${b}
b: ${a}
"#,
        )
        .unwrap_err();

        assert!(matches!(err, DosmatError::Interpolation(_)));
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_missing_reference() {
        let err = resolve("a: ${nope.value}").unwrap_err();
        assert!(err.to_string().contains("nope.value"));
    }

    #[test]
    fn test_escape_and_malformed() {
        let out = resolve(r#"a: '\${literal}'"#).unwrap();
        assert_eq!(out["a"].as_str(), Some("${literal}"));

        assert!(resolve("a: ${unterminated").is_err());
        assert!(resolve("a: ${}").is_err());
        assert!(resolve("a: ${foo:bar}").is_err());
    }

    #[test]
    fn test_mapping_cannot_be_embedded() {
        let err = resolve(
            r#"
section:
  x: 1
label: "prefix ${section}"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot be embedded"));
    }

    #[test]
    fn test_reference_through_interpolated_section() {
        let out = resolve(
            r#"
data:
  model: ${data.base}
  base:
    dim: 64
  dim: ${data.model.dim}
"#,
        )
        .unwrap();

        assert_eq!(out["data"]["dim"].as_u64(), Some(64));
        assert_eq!(out["data"]["model"]["dim"].as_u64(), Some(64));
    }

    #[test]
    fn test_cycle_through_interpolated_section() {
        let err = resolve(
            r#"
a: ${b.x}
b: ${a}
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_whole_string_reference_keeps_mapping() {
        let out = resolve(
            r#"
defaults:
  lr: 0.001
  betas: [0.9, 0.999]
optim: ${defaults}
"#,
        )
        .unwrap();

        let optim = out["optim"].as_mapping().unwrap();
        assert_eq!(optim.len(), 2);
        assert_eq!(out["optim"]["betas"][1].as_f64(), Some(0.999));
    }

    #[test]
    fn test_env_empty_default() {
        let out = resolve("tag: ${oc.env:RUN_TAG,}").unwrap();
        assert_eq!(out["tag"].as_str(), Some(""));

        let out = resolve("name: run${oc.env:RUN_TAG,}").unwrap();
        assert_eq!(out["name"].as_str(), Some("run"));
    }

    #[test]
    fn test_escaped_backslash_before_reference() {
        let out = resolve(
            r#"
name: dos
path: 'C:\\${name}'
"#,
        )
        .unwrap();
        assert_eq!(out["path"].as_str(), Some("C:\\dos"));
    }

    #[test]
    fn test_fan_out_references_resolve_once() {
        let mut yaml = String::from("a0: 1\n");
        for i in 1..=16 {
            yaml.push_str(&format!("a{}: [${{a{}}}, ${{a{}}}]\n", i, i - 1, i - 1));
        }

        let out = resolve(&yaml).unwrap();
        let mut node = &out["a16"];
        for _ in 0..16 {
            node = &node[1];
        }
        assert_eq!(node.as_u64(), Some(1));
    }

    #[test]
    fn test_parse_segments() {
        assert_eq!(
            parse_segments("a${b}c").unwrap(),
            vec![
                Segment::Literal("a".to_string()),
                Segment::Reference("b".to_string()),
                Segment::Literal("c".to_string()),
            ]
        );
        assert_eq!(
            parse_segments(r"\\${b}").unwrap(),
            vec![
                Segment::Literal("\\".to_string()),
                Segment::Reference("b".to_string()),
            ]
        );
        assert_eq!(
            parse_segments("plain").unwrap(),
            vec![Segment::Literal("plain".to_string())]
        );
    }
}
