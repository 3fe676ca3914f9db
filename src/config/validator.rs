use anyhow::{Context, Result, anyhow};

use super::schema::{
    Config, DataModuleConfig, DecoderConfig, DiffusionConfig, EdgeStyle, LoggingConfig,
    OptimConfig, PredictionLevel, TrainConfig,
};

/// Optimizer classes available under `torch.optim`
pub const KNOWN_OPTIMIZERS: [&str; 13] = [
    "Adadelta",
    "Adagrad",
    "Adam",
    "AdamW",
    "Adamax",
    "ASGD",
    "LBFGS",
    "NAdam",
    "RAdam",
    "RMSprop",
    "Rprop",
    "SGD",
    "SparseAdam",
];

/// Scheduler classes available under `torch.optim.lr_scheduler`
pub const KNOWN_SCHEDULERS: [&str; 15] = [
    "ChainedScheduler",
    "ConstantLR",
    "CosineAnnealingLR",
    "CosineAnnealingWarmRestarts",
    "CyclicLR",
    "ExponentialLR",
    "LambdaLR",
    "LinearLR",
    "MultiStepLR",
    "MultiplicativeLR",
    "OneCycleLR",
    "PolynomialLR",
    "ReduceLROnPlateau",
    "SequentialLR",
    "StepLR",
];

const SUPPORTED_ACTIVATIONS: [&str; 1] = ["silu"];

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &Config) -> Result<()> {
        if config.expname.trim().is_empty() {
            return Err(anyhow!("expname cannot be empty"));
        }

        if config.save_dir.trim().is_empty() {
            return Err(anyhow!("save_dir cannot be empty"));
        }

        Self::validate_train(&config.train).context("Invalid train section")?;
        Self::validate_logging(&config.logging).context("Invalid logging section")?;
        Self::validate_diffusion(&config.diffusion).context("Invalid diffusion section")?;
        Self::validate_optim(&config.optim).context("Invalid optim section")?;
        Self::validate_datamodule(&config.datamodule).context("Invalid datamodule section")?;

        Ok(())
    }

    /// Non-fatal findings, each also emitted as a `warn` event
    pub fn warnings(config: &Config) -> Vec<String> {
        let mut warnings = Vec::new();
        let model = &config.diffusion.model;

        if !model.cfg && model.cfg_prob > 0.0 {
            warnings.push(format!(
                "diffusion.model.cfg_prob is {} but cfg is disabled; the probability is ignored",
                model.cfg_prob
            ));
        }

        if model.cfg && model.cfg_prob == 0.0 {
            warnings.push(
                "classifier-free guidance is enabled with cfg_prob 0; conditioning is never dropped"
                    .to_string(),
            );
        }

        if model.cfg && model.cfg_prob == 1.0 {
            warnings.push(
                "classifier-free guidance is enabled with cfg_prob 1; conditioning is always dropped"
                    .to_string(),
            );
        }

        if config.diffusion.time_independent {
            warnings.push(
                "diffusion.time_independent is set; denoising sampling is unavailable for this model"
                    .to_string(),
            );
        }

        if config.diffusion.latent_dim > 0 {
            warnings.push(format!(
                "diffusion.latent_dim is {}; sampling does not support latent conditioning",
                config.diffusion.latent_dim
            ));
        }

        if config.train.deterministic && config.train.pl_trainer.fast_dev_run {
            warnings.push(
                "fast_dev_run is enabled; the run stops after a single batch per split".to_string(),
            );
        }

        if config.datamodule.datasets.val.is_none() {
            warnings.push(format!(
                "datamodule.datasets.val is not set; '{}' cannot be monitored",
                config.train.monitor_metric
            ));
        }

        for warning in &warnings {
            tracing::warn!("{}", warning);
        }

        warnings
    }

    fn validate_train(train: &TrainConfig) -> Result<()> {
        let trainer = &train.pl_trainer;

        if trainer.max_epochs == 0 {
            return Err(anyhow!("pl_trainer.max_epochs must be greater than 0"));
        }

        if trainer.devices == 0 {
            return Err(anyhow!("pl_trainer.devices must be greater than 0"));
        }

        if trainer.accumulate_grad_batches == 0 {
            return Err(anyhow!(
                "pl_trainer.accumulate_grad_batches must be greater than 0"
            ));
        }

        if trainer.max_steps < -1 {
            return Err(anyhow!(
                "pl_trainer.max_steps must be -1 (unlimited) or non-negative, got {}",
                trainer.max_steps
            ));
        }

        if trainer.num_sanity_val_steps < -1 {
            return Err(anyhow!(
                "pl_trainer.num_sanity_val_steps must be -1 (all) or non-negative, got {}",
                trainer.num_sanity_val_steps
            ));
        }

        if !trainer.gradient_clip_val.is_finite() || trainer.gradient_clip_val < 0.0 {
            return Err(anyhow!(
                "pl_trainer.gradient_clip_val must be a non-negative number, got {}",
                trainer.gradient_clip_val
            ));
        }

        if trainer.check_val_every_n_epoch == 0 {
            return Err(anyhow!(
                "pl_trainer.check_val_every_n_epoch must be greater than 0"
            ));
        }

        if !trainer.precision.is_supported() {
            return Err(anyhow!(
                "Unsupported precision {:?}. Valid: {:?} or {:?}",
                trainer.precision,
                super::schema::Precision::VALID_BITS,
                super::schema::Precision::VALID_NAMES
            ));
        }

        if let Some(max_time) = &trainer.max_time {
            humantime::parse_duration(max_time)
                .with_context(|| format!("Invalid max_time format: {}", max_time))?;
        }

        if train.monitor_metric.trim().is_empty() {
            return Err(anyhow!("monitor_metric cannot be empty"));
        }

        if train.early_stopping.patience == 0 {
            return Err(anyhow!("early_stopping.patience must be greater than 0"));
        }

        let min_delta = train.early_stopping.min_delta;
        if !(min_delta.is_finite() && min_delta >= 0.0) {
            return Err(anyhow!(
                "early_stopping.min_delta must be a non-negative number, got {}",
                min_delta
            ));
        }

        if train.model_checkpoints.save_top_k < -1 {
            return Err(anyhow!(
                "model_checkpoints.save_top_k must be -1 (all) or non-negative, got {}",
                train.model_checkpoints.save_top_k
            ));
        }

        Ok(())
    }

    fn validate_logging(logging: &LoggingConfig) -> Result<()> {
        let interval = logging.val_check_interval;
        if !interval.is_finite() || interval <= 0.0 {
            return Err(anyhow!(
                "val_check_interval must be greater than 0, got {}",
                interval
            ));
        }

        // Above 1.0 the interval counts batches, so it must be whole
        if interval > 1.0 && interval.fract() != 0.0 {
            return Err(anyhow!(
                "val_check_interval above 1 counts batches and must be an integer, got {}",
                interval
            ));
        }

        if logging.wandb_watch.log_freq == 0 {
            return Err(anyhow!("wandb_watch.log_freq must be greater than 0"));
        }

        if let Some(wandb) = &logging.wandb {
            if wandb.project.trim().is_empty() {
                return Err(anyhow!("wandb.project cannot be empty"));
            }
            if wandb.name.trim().is_empty() {
                return Err(anyhow!("wandb.name cannot be empty"));
            }
        }

        Ok(())
    }

    fn validate_diffusion(diffusion: &DiffusionConfig) -> Result<()> {
        if diffusion.timesteps == 0 {
            return Err(anyhow!("timesteps must be greater than 0"));
        }

        // The sinusoidal embedding splits the width in half and divides by (half - 1)
        if diffusion.time_dim < 4 || diffusion.time_dim % 2 != 0 {
            return Err(anyhow!(
                "time_dim must be an even number of at least 4, got {}",
                diffusion.time_dim
            ));
        }

        for (name, cost) in [
            ("cost_lattice", diffusion.cost_lattice),
            ("cost_coord", diffusion.cost_coord),
            ("cost_type", diffusion.cost_type),
        ] {
            if !cost.is_finite() || cost < 0.0 {
                return Err(anyhow!("{} must be a non-negative number, got {}", name, cost));
            }
        }

        let beta = &diffusion.beta_scheduler;
        if !(0.0 < beta.beta_start && beta.beta_start < beta.beta_end && beta.beta_end < 1.0) {
            return Err(anyhow!(
                "beta_scheduler requires 0 < beta_start < beta_end < 1, got {} and {}",
                beta.beta_start,
                beta.beta_end
            ));
        }

        let sigma = &diffusion.sigma_scheduler;
        if !(0.0 < sigma.sigma_begin
            && sigma.sigma_begin < sigma.sigma_end
            && sigma.sigma_end.is_finite())
        {
            return Err(anyhow!(
                "sigma_scheduler requires 0 < sigma_begin < sigma_end, got {} and {}",
                sigma.sigma_begin,
                sigma.sigma_end
            ));
        }

        Self::validate_decoder(&diffusion.model).context("Invalid model")?;

        Ok(())
    }

    fn validate_decoder(model: &DecoderConfig) -> Result<()> {
        for (name, value) in [
            ("hidden_dim", model.hidden_dim),
            ("num_layers", model.num_layers),
            ("max_atoms", model.max_atoms),
            ("num_freqs", model.num_freqs),
        ] {
            if value == 0 {
                return Err(anyhow!("{} must be greater than 0", name));
            }
        }

        if !SUPPORTED_ACTIVATIONS.contains(&model.act_fn.as_str()) {
            return Err(anyhow!(
                "Unsupported act_fn: {}. Valid: {:?}",
                model.act_fn,
                SUPPORTED_ACTIVATIONS
            ));
        }

        if model.edge_style == EdgeStyle::Knn {
            if !(model.cutoff.is_finite() && model.cutoff > 0.0) {
                return Err(anyhow!(
                    "cutoff must be greater than 0 for knn edges, got {}",
                    model.cutoff
                ));
            }
            if model.max_neighbors == 0 {
                return Err(anyhow!("max_neighbors must be greater than 0 for knn edges"));
            }
        }

        if model.prediction_level() == PredictionLevel::Ambiguous {
            return Err(anyhow!(
                "pred_graph_level and pred_node_level cannot both be enabled"
            ));
        }

        let needs_pred_dim = model.prediction_level() != PredictionLevel::None || model.cfg;
        match model.pred_dim {
            None if needs_pred_dim => {
                return Err(anyhow!(
                    "pred_dim must be set when pred_graph_level, pred_node_level or cfg is enabled"
                ));
            }
            Some(0) => return Err(anyhow!("pred_dim must be greater than 0")),
            _ => {}
        }

        if !(0.0..=1.0).contains(&model.cfg_prob) {
            return Err(anyhow!(
                "cfg_prob must be a probability in [0, 1], got {}",
                model.cfg_prob
            ));
        }

        Ok(())
    }

    fn validate_optim(optim: &OptimConfig) -> Result<()> {
        if !KNOWN_OPTIMIZERS.contains(&optim.optimizer.as_str()) {
            return Err(anyhow!(
                "Unknown optimizer: {}. Valid optimizers: {:?}",
                optim.optimizer,
                KNOWN_OPTIMIZERS
            ));
        }

        if let Some(lr) = optim.params.get("lr") {
            let lr = lr
                .as_f64()
                .ok_or_else(|| anyhow!("params.lr must be a number, got {}", lr))?;
            if !(lr.is_finite() && lr > 0.0) {
                return Err(anyhow!("params.lr must be greater than 0, got {}", lr));
            }
        }

        let scheduler = &optim.lr_scheduler;
        if !scheduler.use_lr_scheduler {
            return Ok(());
        }

        let name = scheduler
            .scheduler
            .as_deref()
            .ok_or_else(|| anyhow!("lr_scheduler.scheduler is required when use_lr_scheduler is true"))?;

        if !KNOWN_SCHEDULERS.contains(&name) {
            return Err(anyhow!(
                "Unknown lr scheduler: {}. Valid schedulers: {:?}",
                name,
                KNOWN_SCHEDULERS
            ));
        }

        if name == "ReduceLROnPlateau" && scheduler.monitor_metric.trim().is_empty() {
            return Err(anyhow!(
                "lr_scheduler.monitor_metric is required for ReduceLROnPlateau"
            ));
        }

        Ok(())
    }

    fn validate_datamodule(datamodule: &DataModuleConfig) -> Result<()> {
        for (split, path) in datamodule.datasets.iter() {
            if path.trim().is_empty() {
                return Err(anyhow!("datasets.{} cannot be empty", split));
            }
        }

        for (split, size) in [
            ("train", datamodule.batch_size.train),
            ("val", datamodule.batch_size.val),
            ("test", datamodule.batch_size.test),
        ] {
            if size == 0 {
                return Err(anyhow!("batch_size.{} must be greater than 0", split));
            }
        }

        if let Some(prop) = &datamodule.prop
            && prop.trim().is_empty()
        {
            return Err(anyhow!("prop cannot be empty when set"));
        }

        Ok(())
    }
}
