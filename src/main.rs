use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use dosmat_config::{
    config::{Config, ConfigLoader, ConfigValidator},
    globals,
    query::ConfigQuery,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Parser)]
#[command(name = "dosmat-config")]
#[command(about = "Load and validate a DOS diffusion training config", long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Override a key: KEY=VALUE, +KEY=VALUE to add, ~KEY to remove
    #[arg(short, long = "set", value_name = "OVERRIDE")]
    overrides: Vec<String>,

    /// Validate config and exit
    #[arg(long)]
    validate: bool,

    /// Also check that dataset files exist
    #[arg(long)]
    check_paths: bool,

    /// Print the resolved config
    #[arg(long)]
    print: bool,

    /// Print the values matching a JSONPath or dotted key path
    #[arg(short, long, value_name = "PATH")]
    query: Option<String>,

    /// Output format for --print and --query
    #[arg(long, value_enum, default_value = "yaml")]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn render<T: serde::Serialize>(value: &T, format: OutputFormat) -> color_eyre::Result<String> {
    Ok(match format {
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
    })
}

fn print_summary(config: &Config) {
    let trainer = &config.train.pl_trainer;
    let model = &config.diffusion.model;

    eprintln!("\nConfig Summary:");
    eprintln!("  Run: {} -> {}", config.expname, config.run_dir().display());
    eprintln!(
        "  Train: {} epochs, seed {}, deterministic {}",
        trainer.max_epochs, config.train.random_seed, config.train.deterministic
    );
    eprintln!(
        "  Diffusion: {} steps, {:?} betas, time_dim {}",
        config.diffusion.timesteps,
        config.diffusion.beta_scheduler.scheduler_mode,
        config.diffusion.time_dim
    );
    eprintln!(
        "  Model: {} layers x {} hidden, {:?} edges, cfg {} (p={})",
        model.num_layers, model.hidden_dim, model.edge_style, model.cfg, model.cfg_prob
    );
    match config.optim.scheduler() {
        Some(scheduler) => eprintln!(
            "  Optim: {} lr={:?} with {} on {}",
            config.optim.optimizer,
            config.optim.learning_rate(),
            scheduler.name,
            scheduler.monitor
        ),
        None => eprintln!(
            "  Optim: {} lr={:?}",
            config.optim.optimizer,
            config.optim.learning_rate()
        ),
    }
    eprintln!(
        "  Data: batch {} (effective {}), prop {:?}",
        config.datamodule.batch_size.train,
        config.effective_batch_size(),
        config.datamodule.prop
    );
    for (split, path) in config.datamodule.datasets.iter() {
        eprintln!("    - {}: {}", split, path);
    }
    eprintln!();
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Load config
    eprintln!("Loading config from: {:?}", cli.config);
    let config = match ConfigLoader::load_with_overrides(&cli.config, cli.overrides.as_slice()) {
        Ok(cfg) => {
            eprintln!("✓ Config loaded successfully");
            cfg
        }
        Err(e) => {
            eprintln!("✗ Failed to load config: {}", e);
            eprintln!("\nError details: {:?}", e);
            std::process::exit(1);
        }
    };

    // Validate config
    eprintln!("Validating config...");
    if let Err(e) = ConfigValidator::validate(&config) {
        eprintln!("✗ Config validation failed: {}", e);
        eprintln!("\nFull error chain:");
        for cause in e.chain() {
            eprintln!("  - {}", cause);
        }
        std::process::exit(1);
    }

    if cli.check_paths
        && let Err(e) = ConfigLoader::check_paths(&config)
    {
        eprintln!("✗ {}", e);
        std::process::exit(1);
    }

    let warnings = ConfigValidator::warnings(&config);
    if warnings.is_empty() {
        eprintln!("✓ Config is valid");
    } else {
        eprintln!("✓ Config is valid ({} warnings)", warnings.len());
    }

    if cli.verbose {
        print_summary(&config);
    }

    // If validate-only mode, exit here
    if cli.validate {
        eprintln!("\n✓ Configuration is valid!");
        return Ok(());
    }

    globals::init_config(config)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to initialize config: {}", e))?;
    let config = globals::config();

    if let Some(query) = &cli.query {
        let query = ConfigQuery::new(query).map_err(|e| color_eyre::eyre::eyre!("{}", e))?;
        let matches = query
            .query(config)
            .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

        if matches.is_empty() {
            eprintln!("✗ No values match {}", query.as_str());
            std::process::exit(1);
        }

        let output = match matches.as_slice() {
            [single] => render(single, cli.format)?,
            many => render(&many, cli.format)?,
        };
        println!("{}", output.trim_end());
        return Ok(());
    }

    if cli.print {
        println!("{}", render(config, cli.format)?.trim_end());
    }

    Ok(())
}
