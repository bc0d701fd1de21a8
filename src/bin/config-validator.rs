//! # HPCFlow Configuration Validator
//!
//! Command-line tool for validating orchestrator configuration files.
//! Loads the same layered configuration the engine would (defaults for the
//! environment, the optional TOML file, `HPCFLOW__*` overrides) and reports
//! problems before the orchestrator is started.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hpcflow_core::config::{ConfigLoader, Environment, OrchestratorConfig};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate HPCFlow orchestrator configuration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment profile (development, test, production); defaults to HPCFLOW_ENV
    #[arg(short, long)]
    environment: Option<String>,

    /// TOML configuration file layered over the environment defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ignore HPCFLOW__* environment overrides
    #[arg(long)]
    no_env: bool,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the whole configuration
    All,

    /// Validate and print one section
    Component {
        /// Section name (orchestration, backoff, execution, monitor, adaptors, events, logging)
        name: String,
    },

    /// Print the effective configuration
    Show,

    /// List known environment profiles
    Environments,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::All) | None => validate_all(&cli),
        Some(Commands::Component { name }) => validate_component(&cli, name),
        Some(Commands::Show) => show(&cli),
        Some(Commands::Environments) => {
            list_environments();
            Ok(())
        }
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {e:#}");
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> Result<OrchestratorConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(environment) = &cli.environment {
        let environment: Environment = environment
            .parse()
            .with_context(|| format!("unknown environment {environment:?}"))?;
        loader = loader.with_environment(environment);
    }
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    if cli.no_env {
        loader = loader.without_env_overrides();
    }
    loader.load().context("loading configuration")
}

fn validate_all(cli: &Cli) -> Result<()> {
    let config = load(cli)?;
    println!("🔧 Validating HPCFlow configuration");
    println!("Environment: {}", config.environment);
    if let Some(path) = &cli.config {
        println!("Config file: {}", path.display());
    }
    println!();

    println!(
        "   ✅ orchestration: {} retries per task, cancel timeout {}s",
        config.orchestration.max_task_retries, config.orchestration.cancel_timeout_seconds
    );
    println!(
        "   ✅ backoff: base {}ms, max {}ms, x{}",
        config.backoff.base_delay_ms, config.backoff.max_delay_ms, config.backoff.multiplier
    );
    println!(
        "   ✅ execution: {} workers per task type, task timeout {}s",
        config.execution.workers_per_task_type, config.execution.task_timeout_seconds
    );
    println!(
        "   ✅ monitor: poll every {}s, wall-time grace {}s, queue wait up to {}s",
        config.monitor.poll_interval_seconds,
        config.monitor.wall_time_grace_seconds,
        config.monitor.max_queue_wait_seconds
    );
    println!(
        "   ✅ adaptors: {} concurrent commands per resource",
        config.adaptors.max_concurrent_commands_per_resource
    );
    println!("   ✅ logging: level {}, json {}", config.logging.level, config.logging.json);

    println!("\n🎉 All configuration validation checks passed!");
    Ok(())
}

fn validate_component(cli: &Cli, name: &str) -> Result<()> {
    let config = load(cli)?;
    let section = match name.to_lowercase().as_str() {
        "orchestration" => serde_json::to_value(&config.orchestration)?,
        "backoff" => serde_json::to_value(&config.backoff)?,
        "execution" => serde_json::to_value(&config.execution)?,
        "monitor" => serde_json::to_value(&config.monitor)?,
        "adaptors" => serde_json::to_value(&config.adaptors)?,
        "events" => serde_json::to_value(&config.events)?,
        "logging" => serde_json::to_value(&config.logging)?,
        other => bail!("unknown component: {other}"),
    };
    print_value(cli.format, name, &section)?;
    println!("✅ Component '{name}' validation passed!");
    Ok(())
}

fn show(cli: &Cli) -> Result<()> {
    let config = load(cli)?;
    let value = serde_json::to_value(&config)?;
    print_value(cli.format, "configuration", &value)
}

fn print_value(format: OutputFormat, title: &str, value: &serde_json::Value) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => {
            println!("[{title}]");
            print_text(value, "");
        }
    }
    Ok(())
}

fn print_text(value: &serde_json::Value, prefix: &str) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, nested) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                print_text(nested, &path);
            }
        }
        other => println!("  {prefix} = {other}"),
    }
}

fn list_environments() {
    println!("📋 Available environments:");
    for environment in [
        Environment::Development,
        Environment::Test,
        Environment::Production,
    ] {
        println!("  • {environment}");
    }
}
