//! CLI argument definitions.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// mcam - Synchronized photo capture across Android devices over adb.
///
/// Robot Mode: Use --robot or --format=json for machine-parseable output.
#[derive(Parser, Debug)]
#[command(name = "mcam", version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)] // CLI flags naturally use multiple bools
pub struct Cli {
    /// Output format (text for humans, json for agents/scripts)
    #[arg(
        long,
        short = 'f',
        default_value = "text",
        global = true,
        env = "MCAM_FORMAT"
    )]
    pub format: OutputFormat,

    /// Robot mode: equivalent to --format=json, with JSON logs
    #[arg(long, global = true)]
    pub robot: bool,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Configuration file (overrides MCAM_CONFIG_PATH and the search path)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format selection.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text with optional color
    #[default]
    Text,
    /// JSON output for scripts and agents
    Json,
    /// Compact JSON (single line)
    JsonCompact,
}

impl Cli {
    /// Returns true if output should be JSON (robot mode or explicit --format=json).
    pub const fn use_json(&self) -> bool {
        self.robot || matches!(self.format, OutputFormat::Json | OutputFormat::JsonCompact)
    }

    /// Returns true if output should be compact JSON.
    pub const fn use_compact_json(&self) -> bool {
        matches!(self.format, OutputFormat::JsonCompact)
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    // === Service ===
    /// Run the HTTP capture service
    Serve(ServeArgs),

    // === Devices ===
    /// List connected devices in output order
    Devices,

    /// Check that every device answers a no-op command
    Health,

    /// Prime every device and capture one photo from each
    Capture(CaptureArgs),

    // === Configuration ===
    /// Show the resolved configuration
    Config,

    /// Write a sample configuration file
    Init(InitArgs),

    // === Meta ===
    /// Show version and build information
    Version,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Listen address (defaults to server.bind from the config)
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// Bearer token required on /prime and /capture
    #[arg(long, env = "MCAM_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,
}

#[derive(Parser, Debug)]
pub struct CaptureArgs {
    /// Embed base64 image data in JSON output
    #[arg(long)]
    pub include_images: bool,

    /// Also write each photo into this directory
    #[arg(long, short = 'o')]
    pub output_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Where to write the file (defaults to the user config directory)
    #[arg(long, short = 'p')]
    pub path: Option<PathBuf>,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
