use crate::{config::Config, error::Result};
use std::sync::OnceLock;

/// Configuration of the current run, set once at startup and never mutated
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Initialize the global configuration
/// This should be called once at application startup
pub fn init_config(config: Config) -> Result<()> {
    CONFIG
        .set(config)
        .map_err(|_| anyhow::anyhow!("Config already initialized"))?;
    tracing::debug!("global config initialized");
    Ok(())
}

/// Get a reference to the global configuration
/// Panics if config hasn't been initialized
pub fn config() -> &'static Config {
    CONFIG
        .get()
        .expect("Config not initialized - call init_config first")
}

pub fn try_config() -> Option<&'static Config> {
    CONFIG.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLoader;

    #[test]
    fn test_config_is_set_once() {
        let yaml = r#"
expname: global_test
save_dir: /tmp
train:
  pl_trainer:
    max_epochs: 1
diffusion: {}
optim:
  optimizer: SGD
datamodule:
  datasets:
    train: train.pt
  batch_size: {train: 1, val: 1, test: 1}
"#;
        let loaded = ConfigLoader::load_from_string(yaml).unwrap();

        init_config(loaded.clone()).unwrap();
        assert_eq!(config().expname, "global_test");
        assert!(try_config().is_some());

        let second = init_config(loaded);
        assert!(second.is_err());
        assert!(second.unwrap_err().to_string().contains("already initialized"));
    }
}
