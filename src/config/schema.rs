use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::defaults::*;

/// Root of a training run configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub expname: String,
    pub save_dir: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_version")]
    pub version: String,
    /// Hydra composition list, kept for round-tripping only
    #[serde(default)]
    pub defaults: Option<Value>,
    /// Hydra runtime block, kept for round-tripping only
    #[serde(default)]
    pub hydra: Option<Value>,
    /// Free-form values referenced by `${data.*}` interpolations
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
    pub train: TrainConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub diffusion: DiffusionConfig,
    pub optim: OptimConfig,
    pub datamodule: DataModuleConfig,
}

impl Config {
    /// Directory where this run writes checkpoints and logs
    pub fn run_dir(&self) -> PathBuf {
        PathBuf::from(&self.save_dir).join(&self.expname)
    }

    /// Samples contributing to one optimizer step across all devices
    pub fn effective_batch_size(&self) -> u64 {
        u64::from(self.datamodule.batch_size.train)
            * u64::from(self.train.pl_trainer.accumulate_grad_batches)
            * u64::from(self.train.pl_trainer.devices)
    }
}

// ---------------------------------------------------------------------------
// train
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TrainConfig {
    #[serde(default = "default_true")]
    pub deterministic: bool,
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
    #[serde(default = "default_monitor_metric")]
    pub monitor_metric: String,
    #[serde(default)]
    pub monitor_metric_mode: MonitorMode,
    pub pl_trainer: TrainerConfig,
    #[serde(default)]
    pub early_stopping: EarlyStoppingConfig,
    #[serde(default)]
    pub model_checkpoints: CheckpointConfig,
    #[serde(default)]
    pub resume_from_checkpoint: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    #[default]
    Min,
    Max,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TrainerConfig {
    #[serde(default)]
    pub fast_dev_run: bool,
    #[serde(default = "default_accelerator")]
    pub accelerator: String,
    #[serde(default = "default_one")]
    pub devices: u32,
    #[serde(default)]
    pub precision: Precision,
    pub max_epochs: u32,
    #[serde(default = "default_max_steps")]
    pub max_steps: i64,
    /// Wall-clock limit in humantime form, e.g. `12h` or `2days 6h`
    #[serde(default)]
    pub max_time: Option<String>,
    #[serde(default = "default_one")]
    pub accumulate_grad_batches: u32,
    #[serde(default = "default_num_sanity_val_steps")]
    pub num_sanity_val_steps: i64,
    #[serde(default = "default_gradient_clip_val")]
    pub gradient_clip_val: f64,
    #[serde(default)]
    pub gradient_clip_algorithm: GradientClipAlgorithm,
    #[serde(default = "default_one")]
    pub check_val_every_n_epoch: u32,
    #[serde(default)]
    pub profiler: Option<String>,
}

impl TrainerConfig {
    /// Parsed `max_time`; `None` when unset or malformed
    pub fn max_time(&self) -> Option<Duration> {
        self.max_time
            .as_deref()
            .and_then(|s| humantime::parse_duration(s).ok())
    }
}

/// Floating point precision, either a bit width (`32`) or a named mode (`bf16-mixed`)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Precision {
    Bits(u8),
    Named(String),
}

impl Default for Precision {
    fn default() -> Self {
        Precision::Bits(32)
    }
}

impl Precision {
    pub const VALID_BITS: [u8; 3] = [16, 32, 64];
    pub const VALID_NAMES: [&'static str; 6] = [
        "bf16",
        "16-mixed",
        "bf16-mixed",
        "32-true",
        "64-true",
        "transformer-engine",
    ];

    pub fn is_supported(&self) -> bool {
        match self {
            Precision::Bits(bits) => Self::VALID_BITS.contains(bits),
            Precision::Named(name) => {
                Self::VALID_NAMES.contains(&name.as_str())
                    || name
                        .parse::<u8>()
                        .is_ok_and(|bits| Self::VALID_BITS.contains(&bits))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GradientClipAlgorithm {
    #[default]
    Value,
    Norm,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EarlyStoppingConfig {
    #[serde(default = "default_patience")]
    pub patience: u32,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub min_delta: f64,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        Self {
            patience: default_patience(),
            verbose: false,
            min_delta: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointConfig {
    /// `-1` keeps every checkpoint, `0` disables saving
    #[serde(default = "default_save_top_k")]
    pub save_top_k: i64,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub save_last: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            save_top_k: default_save_top_k(),
            verbose: false,
            save_last: false,
        }
    }
}

// ---------------------------------------------------------------------------
// logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Fraction of an epoch when <= 1.0, otherwise a number of training batches
    #[serde(default = "default_val_check_interval")]
    pub val_check_interval: f64,
    #[serde(default = "default_progress_bar_refresh_rate")]
    pub progress_bar_refresh_rate: u32,
    #[serde(default = "default_log_every_n_steps")]
    pub log_every_n_steps: u32,
    #[serde(default)]
    pub wandb: Option<WandbConfig>,
    #[serde(default)]
    pub wandb_watch: WandbWatchConfig,
    #[serde(default)]
    pub lr_monitor: LrMonitorConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            val_check_interval: default_val_check_interval(),
            progress_bar_refresh_rate: default_progress_bar_refresh_rate(),
            log_every_n_steps: default_log_every_n_steps(),
            wandb: None,
            wandb_watch: WandbWatchConfig::default(),
            lr_monitor: LrMonitorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WandbConfig {
    pub name: String,
    pub project: String,
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default = "default_true")]
    pub log_model: bool,
    #[serde(default)]
    pub mode: WandbMode,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WandbMode {
    #[default]
    Online,
    Offline,
    Disabled,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WandbWatchConfig {
    #[serde(default)]
    pub log: WatchLog,
    #[serde(default = "default_log_freq")]
    pub log_freq: u32,
}

impl Default for WandbWatchConfig {
    fn default() -> Self {
        Self {
            log: WatchLog::default(),
            log_freq: default_log_freq(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WatchLog {
    Gradients,
    Parameters,
    #[default]
    All,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LrMonitorConfig {
    #[serde(default)]
    pub logging_interval: LoggingInterval,
    #[serde(default)]
    pub log_momentum: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoggingInterval {
    #[default]
    Step,
    Epoch,
}

// ---------------------------------------------------------------------------
// diffusion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DiffusionConfig {
    #[serde(default = "default_timesteps")]
    pub timesteps: u32,
    /// Width of the sinusoidal time embedding
    #[serde(default = "default_time_dim")]
    pub time_dim: u32,
    #[serde(default)]
    pub latent_dim: u32,
    /// Train as a property predictor on clean structures, without noise
    #[serde(default)]
    pub time_independent: bool,
    #[serde(default = "default_cost")]
    pub cost_lattice: f64,
    #[serde(default = "default_cost")]
    pub cost_coord: f64,
    #[serde(default = "default_cost")]
    pub cost_type: f64,
    #[serde(default)]
    pub beta_scheduler: BetaSchedulerConfig,
    #[serde(default)]
    pub sigma_scheduler: SigmaSchedulerConfig,
    #[serde(default)]
    pub model: DecoderConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BetaSchedulerConfig {
    #[serde(default)]
    pub scheduler_mode: BetaScheduleMode,
    #[serde(default = "default_beta_start")]
    pub beta_start: f64,
    #[serde(default = "default_beta_end")]
    pub beta_end: f64,
}

impl Default for BetaSchedulerConfig {
    fn default() -> Self {
        Self {
            scheduler_mode: BetaScheduleMode::default(),
            beta_start: default_beta_start(),
            beta_end: default_beta_end(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BetaScheduleMode {
    Linear,
    #[default]
    Cosine,
    Quadratic,
    Sigmoid,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SigmaSchedulerConfig {
    #[serde(default = "default_sigma_begin")]
    pub sigma_begin: f64,
    #[serde(default = "default_sigma_end")]
    pub sigma_end: f64,
}

impl Default for SigmaSchedulerConfig {
    fn default() -> Self {
        Self {
            sigma_begin: default_sigma_begin(),
            sigma_end: default_sigma_end(),
        }
    }
}

/// Hyperparameters of the periodic-graph denoising network
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DecoderConfig {
    #[serde(default = "default_hidden_dim")]
    pub hidden_dim: u32,
    #[serde(default = "default_decoder_latent_dim")]
    pub latent_dim: u32,
    #[serde(default = "default_num_layers")]
    pub num_layers: u32,
    #[serde(default = "default_max_atoms")]
    pub max_atoms: u32,
    #[serde(default = "default_act_fn")]
    pub act_fn: String,
    #[serde(default)]
    pub dis_emb: DistanceEmbedding,
    #[serde(default = "default_num_freqs")]
    pub num_freqs: u32,
    #[serde(default)]
    pub edge_style: EdgeStyle,
    #[serde(default = "default_cutoff")]
    pub cutoff: f64,
    #[serde(default = "default_max_neighbors")]
    pub max_neighbors: u32,
    #[serde(default)]
    pub ln: bool,
    #[serde(default = "default_true")]
    pub ip: bool,
    #[serde(default)]
    pub smooth: bool,
    #[serde(default)]
    pub pred_type: bool,
    #[serde(default)]
    pub pred_graph_level: bool,
    #[serde(default)]
    pub pred_node_level: bool,
    #[serde(default)]
    pub pred_dim: Option<u32>,
    /// Classifier-free guidance on the conditioning target
    #[serde(default)]
    pub cfg: bool,
    /// Probability of dropping the conditioning target per training step
    #[serde(default)]
    pub cfg_prob: f64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            hidden_dim: default_hidden_dim(),
            latent_dim: default_decoder_latent_dim(),
            num_layers: default_num_layers(),
            max_atoms: default_max_atoms(),
            act_fn: default_act_fn(),
            dis_emb: DistanceEmbedding::default(),
            num_freqs: default_num_freqs(),
            edge_style: EdgeStyle::default(),
            cutoff: default_cutoff(),
            max_neighbors: default_max_neighbors(),
            ln: false,
            ip: true,
            smooth: false,
            pred_type: false,
            pred_graph_level: false,
            pred_node_level: false,
            pred_dim: None,
            cfg: false,
            cfg_prob: 0.0,
        }
    }
}

impl DecoderConfig {
    pub fn prediction_level(&self) -> PredictionLevel {
        match (self.pred_graph_level, self.pred_node_level) {
            (true, false) => PredictionLevel::Graph,
            (false, true) => PredictionLevel::Node,
            (false, false) => PredictionLevel::None,
            (true, true) => PredictionLevel::Ambiguous,
        }
    }
}

/// Which property head the decoder carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionLevel {
    None,
    Graph,
    Node,
    Ambiguous,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DistanceEmbedding {
    #[default]
    Sin,
    None,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStyle {
    /// Fully connected within each crystal
    #[default]
    Fc,
    /// Radius graph under periodic boundary conditions
    Knn,
}

// ---------------------------------------------------------------------------
// optim
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OptimConfig {
    /// Class name under `torch.optim`, e.g. `Adam`
    pub optimizer: String,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    #[serde(default)]
    pub lr_scheduler: LrSchedulerConfig,
}

impl OptimConfig {
    pub fn learning_rate(&self) -> Option<f64> {
        self.params.get("lr").and_then(Value::as_f64)
    }

    /// The active scheduler, `None` when scheduling is switched off
    pub fn scheduler(&self) -> Option<SchedulerSpec<'_>> {
        if !self.lr_scheduler.use_lr_scheduler {
            return None;
        }

        let name = self.lr_scheduler.scheduler.as_deref()?;
        Some(SchedulerSpec {
            name,
            params: &self.lr_scheduler.params,
            monitor: &self.lr_scheduler.monitor_metric,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LrSchedulerConfig {
    #[serde(default)]
    pub use_lr_scheduler: bool,
    /// Class name under `torch.optim.lr_scheduler`
    #[serde(default)]
    pub scheduler: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    #[serde(default = "default_monitor_metric")]
    pub monitor_metric: String,
}

impl Default for LrSchedulerConfig {
    fn default() -> Self {
        Self {
            use_lr_scheduler: false,
            scheduler: None,
            params: BTreeMap::new(),
            monitor_metric: default_monitor_metric(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerSpec<'a> {
    pub name: &'a str,
    pub params: &'a BTreeMap<String, Value>,
    pub monitor: &'a str,
}

// ---------------------------------------------------------------------------
// datamodule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DataModuleConfig {
    pub datasets: DatasetPaths,
    pub batch_size: SplitSizes,
    #[serde(default)]
    pub num_workers: WorkerCounts,
    /// Property used as the conditioning target, e.g. `dos`
    #[serde(default)]
    pub prop: Option<String>,
    #[serde(default = "default_true")]
    pub niggli: bool,
    #[serde(default)]
    pub primitive: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetPaths {
    pub train: String,
    #[serde(default)]
    pub val: Option<String>,
    #[serde(default)]
    pub test: Option<String>,
}

impl DatasetPaths {
    /// `(split, path)` pairs for every configured split
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("train", Some(self.train.as_str())),
            ("val", self.val.as_deref()),
            ("test", self.test.as_deref()),
        ]
        .into_iter()
        .filter_map(|(split, path)| path.map(|p| (split, p)))
    }
}

/// Per-split batch sizes; every split must be given
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SplitSizes {
    pub train: u32,
    pub val: u32,
    pub test: u32,
}

/// Per-split data loader workers, 0 when omitted
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WorkerCounts {
    #[serde(default)]
    pub train: u32,
    #[serde(default)]
    pub val: u32,
    #[serde(default)]
    pub test: u32,
}
