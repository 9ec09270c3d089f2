//! DNN CLI - inspect models and run forward passes with OpenCV DNN.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{InfoCommand, ModelsCommand, RunCommand};

/// DNN CLI - inspect models and run forward passes with OpenCV DNN.
///
/// Models can be given as file paths or as IDs registered in the config
/// file (~/.giztoy/dnn/config.yaml).
#[derive(Parser)]
#[command(name = "dnn")]
#[command(about = "OpenCV DNN CLI tool")]
#[command(version)]
pub struct Cli {
    /// Config file (default is ~/.giztoy/dnn/config.yaml)
    #[arg(long = "config-file", global = true)]
    pub config_file: Option<String>,

    /// Path to the shim library
    #[arg(long, global = true)]
    pub library: Option<String>,

    /// Output as JSON (for piping)
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the layers of a model
    Info(InfoCommand),
    /// Run one forward pass on an image
    Run(RunCommand),
    /// List models registered in the config file
    Models(ModelsCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Info(cmd) => cmd.run(&cli),
        Commands::Run(cmd) => cmd.run(&cli),
        Commands::Models(cmd) => cmd.run(&cli),
    }
}
