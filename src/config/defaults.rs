//! Default values for optional keys.
//!
//! Decoder defaults mirror the constructor defaults of the CSPNet decoder so a
//! document only has to spell out what it changes.

pub const DEFAULT_VERSION: &str = "0.0.1";
pub const DEFAULT_MONITOR_METRIC: &str = "val_loss";

// Run metadata
pub(crate) fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

// Train
pub(crate) fn default_random_seed() -> u64 {
    42
}

pub(crate) fn default_monitor_metric() -> String {
    DEFAULT_MONITOR_METRIC.to_string()
}

pub(crate) fn default_accelerator() -> String {
    "gpu".to_string()
}

pub(crate) fn default_max_steps() -> i64 {
    -1
}

pub(crate) fn default_num_sanity_val_steps() -> i64 {
    2
}

pub(crate) fn default_gradient_clip_val() -> f64 {
    0.5
}

pub(crate) fn default_patience() -> u32 {
    100
}

pub(crate) fn default_save_top_k() -> i64 {
    1
}

// Logging
pub(crate) fn default_val_check_interval() -> f64 {
    1.0
}

pub(crate) fn default_progress_bar_refresh_rate() -> u32 {
    20
}

pub(crate) fn default_log_every_n_steps() -> u32 {
    50
}

pub(crate) fn default_log_freq() -> u32 {
    500
}

// Diffusion
pub(crate) fn default_timesteps() -> u32 {
    1000
}

pub(crate) fn default_time_dim() -> u32 {
    256
}

pub(crate) fn default_cost() -> f64 {
    1.0
}

pub(crate) fn default_beta_start() -> f64 {
    1e-4
}

pub(crate) fn default_beta_end() -> f64 {
    0.02
}

pub(crate) fn default_sigma_begin() -> f64 {
    0.005
}

pub(crate) fn default_sigma_end() -> f64 {
    0.5
}

// Decoder
pub(crate) fn default_hidden_dim() -> u32 {
    128
}

pub(crate) fn default_decoder_latent_dim() -> u32 {
    256
}

pub(crate) fn default_num_layers() -> u32 {
    4
}

pub(crate) fn default_max_atoms() -> u32 {
    100
}

pub(crate) fn default_act_fn() -> String {
    "silu".to_string()
}

pub(crate) fn default_num_freqs() -> u32 {
    10
}

pub(crate) fn default_cutoff() -> f64 {
    6.0
}

pub(crate) fn default_max_neighbors() -> u32 {
    20
}

// Shared
pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_one() -> u32 {
    1
}

