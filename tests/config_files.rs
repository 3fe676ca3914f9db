//! Loads the shipped example config and on-disk variants through the public API.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};
use dosmat_config::DosmatError;
use dosmat_config::config::{
    BetaScheduleMode, ConfigLoader, ConfigValidator, PredictionLevel, WandbMode,
};
use dosmat_config::query::ConfigQuery;
use dosmat_config::template::InterpolationContext;

const DOS_CFG: &str = include_str!("../configs/dos_cfg.yaml");

fn fixture_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("configs/dos_cfg.yaml")
}

fn context() -> InterpolationContext {
    InterpolationContext::new()
        .with_env(HashMap::new())
        .with_var("PROJECT_ROOT", "/srv/dosmatgen")
        .with_now(Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap())
}

// ---------------------------------------------------------------------------
// shipped config
// ---------------------------------------------------------------------------

#[test]
fn example_config_resolves_and_validates() {
    let config = ConfigLoader::load_from_string_with(DOS_CFG, &[] as &[&str], &context()).unwrap();

    ConfigValidator::validate(&config).unwrap();
    assert!(ConfigValidator::warnings(&config).is_empty());

    assert_eq!(config.save_dir, "/srv/dosmatgen/runs/2024-05-01/dos_cfg");
    assert_eq!(
        config.run_dir(),
        PathBuf::from("/srv/dosmatgen/runs/2024-05-01/dos_cfg/dos_cfg")
    );
    assert_eq!(config.train.pl_trainer.max_epochs, 1000);
    assert_eq!(config.train.early_stopping.patience, 100_000);
    assert_eq!(config.diffusion.model.pred_dim, Some(128));
    assert_eq!(config.diffusion.model.prediction_level(), PredictionLevel::None);
    assert_eq!(config.diffusion.beta_scheduler.scheduler_mode, BetaScheduleMode::Cosine);
    assert_eq!(
        config.datamodule.datasets.train,
        "/srv/dosmatgen/data/mp_dos/train.pt"
    );

    let wandb = config.logging.wandb.as_ref().unwrap();
    assert_eq!(wandb.name, "dos_cfg");
    assert_eq!(wandb.group.as_deref(), Some("dos_cfg"));
    assert_eq!(wandb.mode, WandbMode::Online);
    assert!(wandb.entity.is_none());

    let scheduler = config.optim.scheduler().unwrap();
    assert_eq!(scheduler.name, "ReduceLROnPlateau");
    assert_eq!(scheduler.monitor, "val_loss");
    assert_eq!(scheduler.params.get("factor").and_then(|v| v.as_f64()), Some(0.6));
    assert_eq!(config.optim.learning_rate(), Some(0.001));
}

#[test]
fn example_config_loads_from_disk() {
    let config = ConfigLoader::load_from_file(fixture_path()).unwrap();
    assert_eq!(config.expname, "dos_cfg");
    assert!(config.save_dir.ends_with("/dos_cfg"));
    assert!(config.datamodule.datasets.train.ends_with("data/mp_dos/train.pt"));
}

#[test]
fn overrides_flow_through_interpolation() {
    let config = ConfigLoader::load_from_string_with(
        DOS_CFG,
        &[
            "expname=dos_uncond",
            "diffusion.model.cfg=false",
            "diffusion.model.cfg_prob=0.0",
            "+train.pl_trainer.max_time=2days 6h",
            "~logging.wandb",
        ],
        &context(),
    )
    .unwrap();

    assert_eq!(config.expname, "dos_uncond");
    assert!(config.save_dir.ends_with("/dos_uncond"));
    assert!(!config.diffusion.model.cfg);
    assert!(config.logging.wandb.is_none());
    assert_eq!(
        config.train.pl_trainer.max_time(),
        Some(std::time::Duration::from_secs(54 * 3600))
    );
    ConfigValidator::validate(&config).unwrap();
}

#[test]
fn checked_load_reports_validation_errors() {
    let err = ConfigLoader::load_from_file_checked(fixture_path(), &["diffusion.model.cfg_prob=2"])
        .unwrap_err();

    match err {
        DosmatError::Validation(message) => {
            assert!(message.contains("Invalid diffusion section"));
            assert!(message.contains("cfg_prob"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn query_reads_resolved_values() {
    let config = ConfigLoader::load_from_string_with(DOS_CFG, &[] as &[&str], &context()).unwrap();

    let cfg_prob = ConfigQuery::new("diffusion.model.cfg_prob")
        .unwrap()
        .query_single(&config)
        .unwrap();
    assert_eq!(cfg_prob.and_then(|v| v.as_f64()), Some(0.1));

    let tags = ConfigQuery::new("$.tags[*]").unwrap().query(&config).unwrap();
    assert_eq!(tags.len(), 3);
}

// ---------------------------------------------------------------------------
// files on disk
// ---------------------------------------------------------------------------

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ConfigLoader::load_from_file(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, DosmatError::Io(_)));
    assert!(err.to_string().contains("absent.yaml"));
}

#[test]
fn missing_section_is_a_schema_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.yaml");
    std::fs::write(
        &path,
        "expname: partial\nsave_dir: /tmp\ntrain:\n  pl_trainer:\n    max_epochs: 1\n",
    )
    .unwrap();

    let err = ConfigLoader::load_from_file(&path).unwrap_err();
    assert!(matches!(err, DosmatError::Schema(_)));
    assert!(err.to_string().contains("diffusion"));
}

#[test]
fn check_paths_requires_every_split() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_string_lossy().to_string();
    let overrides = [format!("data.root_path={}", root)];

    let config = ConfigLoader::load_with_overrides(fixture_path(), &overrides).unwrap();
    let err = ConfigLoader::check_paths(&config).unwrap_err();
    assert!(err.to_string().contains("train"));

    for split in ["train", "val", "test"] {
        std::fs::write(dir.path().join(format!("{}.pt", split)), b"").unwrap();
    }
    ConfigLoader::check_paths(&config).unwrap();
}
