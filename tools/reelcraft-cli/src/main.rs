//! Reelcraft CLI: assemble narrated short videos from stock footage.
//!
//! Usage:
//!   reelcraft assemble [OPTIONS] <MATERIALS>...   Build a video from footage + narration
//!   reelcraft sync [OPTIONS] <VIDEO>              Match a video to a narration track
//!   reelcraft wrap [OPTIONS] <TEXT>               Preview caption wrapping and placement
//!   reelcraft check                               Check ffmpeg/ffprobe and the caption font
//!   reelcraft config                              Print the effective configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use reelcraft_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "reelcraft",
    about = "Assemble narrated videos from footage, music and captions",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/reelcraft/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a video from source materials and a narration track
    Assemble(commands::assemble::AssembleArgs),

    /// Loop or cut a video to a narration track and mix in music
    Sync(commands::sync::SyncArgs),

    /// Show how a caption would be wrapped and placed
    Wrap {
        /// Caption text
        text: String,

        /// Canvas aspect: portrait|landscape|square
        #[arg(long)]
        aspect: Option<String>,

        /// Placement: bottom|top|center|custom:<percent>
        #[arg(long)]
        placement: Option<String>,

        /// Measure with fixed-width metrics instead of loading the font
        #[arg(long)]
        mono: bool,
    },

    /// Check external tools and configured resources
    Check,

    /// Print the effective configuration as JSON
    Config {
        /// Also write it to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    reelcraft_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Assemble(args) => commands::assemble::run(config, args).await,
        Commands::Sync(args) => commands::sync::run(config, args).await,
        Commands::Wrap {
            text,
            aspect,
            placement,
            mono,
        } => commands::wrap::run(&config, text, aspect, placement, mono),
        Commands::Check => commands::check::run(&config),
        Commands::Config { save } => commands::config::run(&config, cli.config, save),
    }
}
