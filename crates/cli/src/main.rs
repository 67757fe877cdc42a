//! AspectFlow CLI — the main entry point.
//!
//! Commands:
//! - `demos`    — List the built-in demo graphs
//! - `run`      — Evaluate a demo graph with aspect overrides
//! - `inspect`  — Show the input context of a demo graph
//! - `config`   — Show, locate or validate the configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "aspectflow",
    about = "AspectFlow — deferred calls with context-resolved aspects",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in demo graphs
    Demos,

    /// Evaluate a demo graph
    Run {
        /// Demo name (see `aspectflow demos`)
        demo: String,

        /// Override an aspect, as name=value (repeatable)
        #[arg(short, long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,

        /// Apply a [[defaults]] preset from the config file first
        #[arg(short, long)]
        preset: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the input context a demo graph would be evaluated with
    Inspect {
        /// Demo name (see `aspectflow demos`)
        demo: String,

        /// Override an aspect, as name=value (repeatable)
        #[arg(short, long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,

        /// Apply a [[defaults]] preset from the config file first
        #[arg(short, long)]
        preset: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Validate the configuration file
    Validate,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = aspectflow_config::AppConfig::load();

    // Initialize tracing
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config
            .as_ref()
            .map(|c| c.logging.level.clone())
            .unwrap_or_else(|_| "info".to_string())
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Demos => commands::demo::list()?,
        Commands::Run {
            demo,
            set,
            preset,
            json,
        } => commands::demo::run(&config?, &demo, &set, preset.as_deref(), json)?,
        Commands::Inspect { demo, set, preset } => {
            commands::demo::inspect(&config?, &demo, &set, preset.as_deref())?
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Path => commands::config_cmd::path()?,
            ConfigAction::Validate => commands::config_cmd::validate()?,
        },
    }

    Ok(())
}
