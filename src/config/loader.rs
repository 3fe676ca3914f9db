use serde_yaml::Value;
use std::path::Path;

use super::overrides::Override;
use super::schema::Config;
use super::validator::ConfigValidator;
use crate::error::{DosmatError, Result};
use crate::template::{InterpolationContext, Interpolator};

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        Self::load_with_overrides(path, &[] as &[&str])
    }

    /// Load a file, apply `key=value` overrides, then resolve and deserialize
    pub fn load_with_overrides<P: AsRef<Path>, S: AsRef<str>>(
        path: P,
        overrides: &[S],
    ) -> Result<Config> {
        let content = Self::read(path.as_ref())?;
        Self::load_from_string_with(&content, overrides, &InterpolationContext::new())
    }

    /// Load and run the validator, folding its error chain into one message
    pub fn load_from_file_checked<P: AsRef<Path>, S: AsRef<str>>(
        path: P,
        overrides: &[S],
    ) -> Result<Config> {
        let config = Self::load_with_overrides(path, overrides)?;
        ConfigValidator::validate(&config)
            .map_err(|e| DosmatError::Validation(format!("{:#}", e)))?;
        Ok(config)
    }

    pub fn load_from_string(content: &str) -> Result<Config> {
        Self::load_from_string_with(content, &[] as &[&str], &InterpolationContext::new())
    }

    pub fn load_from_string_with<S: AsRef<str>>(
        content: &str,
        overrides: &[S],
        context: &InterpolationContext,
    ) -> Result<Config> {
        let resolved = Self::resolve_document(content, overrides, context)?;

        let config: Config = serde_path_to_error::deserialize(resolved).map_err(|e| {
            let path = e.path().to_string();
            if path == "." {
                DosmatError::Schema(format!("Invalid config: {}", e.inner()))
            } else {
                DosmatError::Schema(format!("Invalid config at '{}': {}", path, e.inner()))
            }
        })?;

        tracing::debug!(expname = %config.expname, "config loaded");
        Ok(config)
    }

    /// Parse, override and interpolate without binding to the schema
    pub fn resolve_document<S: AsRef<str>>(
        content: &str,
        overrides: &[S],
        context: &InterpolationContext,
    ) -> Result<Value> {
        let mut document: Value = serde_yaml::from_str(content)
            .map_err(|e| DosmatError::Schema(format!("Failed to parse YAML config: {}", e)))?;

        if !document.is_mapping() {
            return Err(DosmatError::Schema(
                "Config root must be a mapping of sections".to_string(),
            ));
        }

        document
            .apply_merge()
            .map_err(|e| DosmatError::Schema(format!("Failed to apply merge keys: {}", e)))?;

        if !overrides.is_empty() {
            tracing::debug!(count = overrides.len(), "applying overrides");
            Override::apply_all(&mut document, overrides)?;
        }

        Interpolator::new(&document, context).resolve()
    }

    /// Verify that every configured dataset file exists
    pub fn check_paths(config: &Config) -> Result<()> {
        for (split, path) in config.datamodule.datasets.iter() {
            if !Path::new(path).exists() {
                return Err(DosmatError::Validation(format!(
                    "Dataset for split '{}' not found: {}",
                    split, path
                )));
            }
            tracing::debug!(split, path, "dataset present");
        }
        Ok(())
    }

    fn read(path: &Path) -> Result<String> {
        tracing::debug!(path = %path.display(), "reading config");
        std::fs::read_to_string(path).map_err(|e| {
            DosmatError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file {}: {}", path.display(), e),
            ))
        })
    }
}
