use serde_yaml::Value;
use std::fmt;
use std::str::FromStr;

use super::path::KeyPath;
use crate::error::{DosmatError, Result};

/// A command-line override of a single key.
///
/// - `a.b=value` replaces an existing key
/// - `+a.b=value` adds a key, creating intermediate sections
/// - `~a.b` removes a key
#[derive(Debug, Clone, PartialEq)]
pub enum Override {
    Set { path: KeyPath, value: Value },
    Add { path: KeyPath, value: Value },
    Remove { path: KeyPath },
}

impl Override {
    pub fn path(&self) -> &KeyPath {
        match self {
            Override::Set { path, .. } | Override::Add { path, .. } | Override::Remove { path } => {
                path
            }
        }
    }

    /// Apply this override to the raw document tree
    pub fn apply(&self, root: &mut Value) -> Result<()> {
        match self {
            Override::Set { path, value } => {
                let parent = path.parent_mapping_mut(root, false)?;
                let slot = parent.get_mut(path.leaf()).ok_or_else(|| {
                    DosmatError::Override(format!(
                        "Key '{}' not found; use '+{}=...' to add it",
                        path, path
                    ))
                })?;
                *slot = value.clone();
            }
            Override::Add { path, value } => {
                let parent = path.parent_mapping_mut(root, true)?;
                if parent.contains_key(path.leaf()) {
                    return Err(DosmatError::Override(format!(
                        "Key '{}' already exists; use '{}=...' to replace it",
                        path, path
                    )));
                }
                parent.insert(Value::String(path.leaf().to_string()), value.clone());
            }
            Override::Remove { path } => {
                let parent = path.parent_mapping_mut(root, false)?;
                if parent.remove(path.leaf()).is_none() {
                    return Err(DosmatError::Override(format!("Key '{}' not found", path)));
                }
            }
        }

        tracing::debug!(key = %self.path(), "applied override {}", self);
        Ok(())
    }

    /// Parse and apply a list of overrides in order
    pub fn apply_all<S: AsRef<str>>(root: &mut Value, overrides: &[S]) -> Result<()> {
        for raw in overrides {
            let parsed: Override = raw.as_ref().parse()?;
            parsed.apply(root)?;
        }
        Ok(())
    }
}

impl FromStr for Override {
    type Err = DosmatError;

    fn from_str(raw: &str) -> Result<Self> {
        let raw = raw.trim();

        if let Some(key) = raw.strip_prefix('~') {
            if key.contains('=') {
                return Err(DosmatError::Override(format!(
                    "Removal '{}' must not carry a value",
                    raw
                )));
            }
            return Ok(Override::Remove {
                path: parse_key(key, raw)?,
            });
        }

        let (key, value) = raw.split_once('=').ok_or_else(|| {
            DosmatError::Override(format!("Expected KEY=VALUE, got '{}'", raw))
        })?;

        let value = parse_value(value)?;
        match key.strip_prefix('+') {
            Some(key) => Ok(Override::Add {
                path: parse_key(key, raw)?,
                value,
            }),
            None => Ok(Override::Set {
                path: parse_key(key, raw)?,
                value,
            }),
        }
    }
}

fn parse_key(key: &str, raw: &str) -> Result<KeyPath> {
    KeyPath::parse(key)
        .map_err(|_| DosmatError::Override(format!("Invalid key in override '{}'", raw)))
}

/// Values are read as YAML so `1e-3`, `true`, `null` and `[0.9, 0.999]` keep their types
fn parse_value(raw: &str) -> Result<Value> {
    if raw.trim().is_empty() {
        return Ok(Value::String(String::new()));
    }

    serde_yaml::from_str(raw)
        .map_err(|e| DosmatError::Override(format!("Invalid value '{}': {}", raw, e)))
}

impl fmt::Display for Override {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let render = |value: &Value| {
            serde_yaml::to_string(value)
                .map(|s| s.trim_end().to_string())
                .unwrap_or_else(|_| "?".to_string())
        };

        match self {
            Override::Set { path, value } => write!(f, "{}={}", path, render(value)),
            Override::Add { path, value } => write!(f, "+{}={}", path, render(value)),
            Override::Remove { path } => write!(f, "~{}", path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Value {
        serde_yaml::from_str(
            r#"
train:
  random_seed: 42
  pl_trainer:
    max_epochs: 100
diffusion:
  model:
    cfg: false
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_kinds() {
        let set: Override = "train.random_seed=7".parse().unwrap();
        assert_eq!(
            set,
            Override::Set {
                path: KeyPath::parse("train.random_seed").unwrap(),
                value: Value::from(7u64),
            }
        );

        let add: Override = "+diffusion.model.cfg_prob=0.1".parse().unwrap();
        assert!(matches!(add, Override::Add { .. }));

        let remove: Override = "~train.random_seed".parse().unwrap();
        assert!(matches!(remove, Override::Remove { .. }));
    }

    #[test]
    fn test_parse_typed_values() {
        let o: Override = "optim.params.betas=[0.9, 0.99]".parse().unwrap();
        match o {
            Override::Set { value, .. } => assert_eq!(value.as_sequence().map(Vec::len), Some(2)),
            _ => panic!("expected set"),
        }

        let o: Override = "datamodule.prop=null".parse().unwrap();
        match o {
            Override::Set { value, .. } => assert!(value.is_null()),
            _ => panic!("expected set"),
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("train.random_seed".parse::<Override>().is_err());
        assert!("=3".parse::<Override>().is_err());
        assert!("~a.b=3".parse::<Override>().is_err());
        assert!("a..b=3".parse::<Override>().is_err());
    }

    #[test]
    fn test_apply_set_add_remove() {
        let mut root = doc();
        Override::apply_all(
            &mut root,
            &[
                "train.pl_trainer.max_epochs=5",
                "diffusion.model.cfg=true",
                "+diffusion.model.cfg_prob=0.1",
                "~train.random_seed",
            ],
        )
        .unwrap();

        assert_eq!(root["train"]["pl_trainer"]["max_epochs"].as_u64(), Some(5));
        assert_eq!(root["diffusion"]["model"]["cfg"].as_bool(), Some(true));
        assert_eq!(root["diffusion"]["model"]["cfg_prob"].as_f64(), Some(0.1));
        assert!(root["train"].get("random_seed").is_none());
    }

    #[test]
    fn test_set_unknown_key_fails() {
        let mut root = doc();
        let err = Override::apply_all(&mut root, &["train.random_sed=1"]).unwrap_err();
        assert!(err.to_string().contains("+train.random_sed"));
    }

    #[test]
    fn test_add_existing_key_fails() {
        let mut root = doc();
        assert!(Override::apply_all(&mut root, &["+train.random_seed=1"]).is_err());
    }

    #[test]
    fn test_remove_missing_key_fails() {
        let mut root = doc();
        let err = Override::apply_all(&mut root, &["~train.deterministic"]).unwrap_err();
        assert!(matches!(err, DosmatError::Override(_)));
        assert!(err.to_string().contains("train.deterministic"));
    }

    #[test]
    fn test_set_under_scalar_or_sequence_fails() {
        let mut root = doc();
        let err = Override::apply_all(&mut root, &["diffusion.model.cfg.scale=2"]).unwrap_err();
        assert!(err.to_string().contains("'diffusion.model.cfg' is not a mapping"));

        let mut root: Value =
            serde_yaml::from_str("optim:\n  params:\n    betas: [0.9, 0.999]\n").unwrap();
        let err = Override::apply_all(&mut root, &["optim.params.betas.0=0.8"]).unwrap_err();
        assert!(err.to_string().contains("'optim.params.betas' is not a mapping"));
        assert_eq!(root["optim"]["params"]["betas"][0].as_f64(), Some(0.9));
    }

    #[test]
    fn test_set_missing_section_fails() {
        let mut root = doc();
        let err = Override::apply_all(&mut root, &["logging.wandb.mode=offline"]).unwrap_err();
        assert!(err.to_string().contains("Key 'logging' not found"));
        assert!(root.get("logging").is_none());

        Override::apply_all(&mut root, &["+logging.wandb.mode=offline"]).unwrap();
        assert_eq!(root["logging"]["wandb"]["mode"].as_str(), Some("offline"));
    }

    #[test]
    fn test_display_round_trips() {
        let o: Override = "+logging.wandb.mode=offline".parse().unwrap();
        assert_eq!(o.to_string(), "+logging.wandb.mode=offline");
    }
}
