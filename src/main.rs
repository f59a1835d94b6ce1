//! mcam - Synchronized photo capture across Android devices over adb.
//!
//! Provides both human-friendly and agent-friendly (robot mode) interfaces.
#![forbid(unsafe_code)]

use std::fs;
use std::future::Future;
use std::io::{self, IsTerminal};
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use console::style;
use serde::Serialize;

use mcam::bridge::{AdbBridge, BridgeClient};
use mcam::cli::{self, Cli, Commands};
use mcam::config::{self, ConfigSearch, LoadedConfig, SAMPLE_CONFIG};
use mcam::device::{DeviceManager, HealthStatus};
use mcam::error::{McError, Result};
use mcam::logging::init_logging;
use mcam::server::dto::{CaptureResponse, HealthResponse};
use mcam::server::{self, AppState};
use mcam::session::{CaptureSession, SessionCache, SessionOptions};

/// Build information embedded at compile time.
mod build_info {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    pub fn git_sha() -> &'static str {
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
    }

    pub fn git_dirty() -> &'static str {
        option_env!("VERGEN_GIT_DIRTY").unwrap_or("false")
    }

    pub fn build_timestamp() -> &'static str {
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown")
    }

    pub fn rustc_semver() -> &'static str {
        option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown")
    }

    pub fn target() -> &'static str {
        option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown")
    }
}

fn main() {
    let cli = Cli::parse();

    if cli.no_color || !io::stdout().is_terminal() {
        console::set_colors_enabled(false);
    }
    if cli.no_color || !io::stderr().is_terminal() {
        console::set_colors_enabled_stderr(false);
    }

    init_logging(cli.robot, cli.verbose, cli.quiet);

    if let Err(e) = run(&cli) {
        output_error(&cli, &e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        None => print_quick_start(cli),
        Some(Commands::Serve(args)) => cmd_serve(cli, args),
        Some(Commands::Devices) => cmd_devices(cli),
        Some(Commands::Health) => cmd_health(cli),
        Some(Commands::Capture(args)) => cmd_capture(cli, args),
        Some(Commands::Config) => cmd_config(cli),
        Some(Commands::Init(args)) => cmd_init(cli, args),
        Some(Commands::Version) => cmd_version(cli),
        Some(Commands::Completions(args)) => cmd_completions(cli, args),
    }
}

// === Quick Start ===

#[allow(clippy::unnecessary_wraps)] // Consistent return type with other commands
fn print_quick_start(cli: &Cli) -> Result<()> {
    if cli.use_json() {
        output_json(
            cli,
            &RobotQuickStart {
                tool: "mcam",
                version: build_info::VERSION,
                description: "Synchronized multi-device photo capture over adb",
                commands: RobotCommands {
                    list_devices: "mcam devices --robot",
                    health: "mcam health --robot",
                    capture_once: "mcam capture --robot [--include-images] [--output-dir DIR]",
                    serve: "mcam serve [--bind ADDR] [--api-token TOKEN]",
                    show_config: "mcam config --robot",
                    write_sample_config: "mcam init [--path FILE] [--force]",
                },
                http: RobotHttp {
                    info: "GET /",
                    health: "GET /health",
                    prime: "POST /prime",
                    capture: "POST /capture",
                    auth: "Authorization: Bearer <token> on POST routes when a token is configured",
                },
                output_modes: OutputModes {
                    human: "--format=text (default)",
                    robot: "--robot or --format=json",
                    compact: "--format=json-compact",
                },
            },
        );
    } else {
        println!(
            "{} {} - synchronized multi-device capture\n",
            style("mcam").bold().cyan(),
            build_info::VERSION
        );
        println!("{}", style("QUICK START").bold().underlined());
        println!();
        println!("  {}  Write a sample config", style("mcam init").green());
        println!("  {}  List devices", style("mcam devices").green());
        println!("  {}  Check reachability", style("mcam health").green());
        println!("  {}  Capture once", style("mcam capture -o photos").green());
        println!("  {}  Run the HTTP service", style("mcam serve").green());
        println!();
        println!("{}", style("ROBOT MODE").bold().underlined());
        println!();
        println!("  {}  JSON output", style("mcam --robot <command>").cyan());
        println!();
        println!("Run {} for full help", style("mcam --help").yellow());
    }
    Ok(())
}

#[derive(Serialize)]
struct RobotQuickStart {
    tool: &'static str,
    version: &'static str,
    description: &'static str,
    commands: RobotCommands,
    http: RobotHttp,
    output_modes: OutputModes,
}

#[derive(Serialize)]
struct RobotCommands {
    list_devices: &'static str,
    health: &'static str,
    capture_once: &'static str,
    serve: &'static str,
    show_config: &'static str,
    write_sample_config: &'static str,
}

#[derive(Serialize)]
struct RobotHttp {
    info: &'static str,
    health: &'static str,
    prime: &'static str,
    capture: &'static str,
    auth: &'static str,
}

#[derive(Serialize)]
struct OutputModes {
    human: &'static str,
    robot: &'static str,
    compact: &'static str,
}

// === Command Implementations ===

fn cmd_serve(cli: &Cli, args: &cli::ServeArgs) -> Result<()> {
    let loaded = load_config(cli)?;
    let bind = args
        .bind
        .clone()
        .unwrap_or_else(|| loaded.config.server.bind.clone());
    let bridge = adb_bridge(&loaded);
    let state = AppState::new(&loaded.config, Some(loaded.path), bridge)
        .with_api_token(args.api_token.clone());

    if !cli.quiet && !cli.use_json() {
        eprintln!(
            "{} listening on {} (auth {})",
            style("mcam").bold().cyan(),
            style(&bind).green(),
            if state.auth_enabled() { "on" } else { "off" }
        );
    }
    block_on(server::serve(state, &bind))?
}

fn cmd_devices(cli: &Cli) -> Result<()> {
    let loaded = load_config(cli)?;
    let manager = DeviceManager::from_settings(adb_bridge(&loaded), &loaded.config.settings);
    let devices = block_on(manager.discover())??;

    if cli.use_json() {
        output_json(cli, &devices);
    } else if devices.is_empty() {
        println!("{}", style("No devices found").yellow());
        println!("Check `adb devices` and USB debugging authorization");
    } else {
        for d in &devices {
            println!(
                "{:>3}  {:<16} {}",
                d.position.index,
                d.position.label,
                style(&d.serial).green()
            );
        }
    }
    Ok(())
}

fn cmd_health(cli: &Cli) -> Result<()> {
    let loaded = load_config(cli)?;
    let manager = DeviceManager::from_settings(adb_bridge(&loaded), &loaded.config.settings);
    let report = HealthResponse::from(block_on(manager.health())??);

    if cli.use_json() {
        output_json(cli, &report);
        return Ok(());
    }
    let status = match report.status {
        HealthStatus::Healthy => style("healthy").green(),
        HealthStatus::Issues => style("issues").red(),
        HealthStatus::NoDevices => style("no devices").yellow(),
    };
    println!("{}: {status}", style("Status").bold());
    for d in &report.devices {
        let mark = if d.ok { style("ok").green() } else { style("FAIL").red() };
        println!("  {:<16} {:<20} {mark}", d.device.position.label, d.device.serial);
        for issue in &d.issues {
            println!("      {}", style(issue).dim());
        }
    }
    Ok(())
}

fn cmd_capture(cli: &Cli, args: &cli::CaptureArgs) -> Result<()> {
    let loaded = load_config(cli)?;
    let settings = &loaded.config.settings;
    let bridge = adb_bridge(&loaded);
    let manager = DeviceManager::from_settings(Arc::clone(&bridge), settings);
    let session = CaptureSession::new(
        bridge,
        Arc::new(SessionCache::new()),
        Arc::new(settings.camera_defaults.clone()),
        SessionOptions::from_settings(settings),
    );

    let outcomes = block_on(async {
        let devices = manager.discover().await?;
        Ok::<_, McError>(session.capture(&devices).await)
    })??;

    let mut saved = Vec::new();
    if let Some(dir) = &args.output_dir {
        fs::create_dir_all(dir)?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        for image in outcomes.iter().filter_map(|o| o.result.as_ref().ok()) {
            let path = dir.join(format!(
                "{}_{}_{stamp}.{}",
                image.position,
                image.serial,
                file_extension(&image.format)
            ));
            fs::write(&path, &image.bytes)?;
            saved.push(path);
        }
    }

    let response = CaptureResponse::from_outcomes(session.id(), &outcomes, args.include_images);
    if cli.use_json() {
        output_json(cli, &response);
        return Ok(());
    }

    println!(
        "{} {}/{} devices captured (session {})",
        style("Capture:").bold(),
        response.captured,
        response.count,
        response.session_id
    );
    for entry in &response.devices {
        match &entry.error {
            None => println!(
                "  {:<16} {:<20} {} {}x{} {} bytes",
                entry.position,
                entry.serial,
                style("ok").green(),
                entry.width.unwrap_or_default(),
                entry.height.unwrap_or_default(),
                entry.size_bytes.unwrap_or_default()
            ),
            Some(err) => println!(
                "  {:<16} {:<20} {} {}",
                entry.position,
                entry.serial,
                style(err.kind).red(),
                err.message
            ),
        }
    }
    for path in &saved {
        println!("  saved {}", path.display());
    }
    Ok(())
}

fn cmd_config(cli: &Cli) -> Result<()> {
    let mut loaded = load_config(cli)?;
    if let Some(token) = loaded.config.server.api_token.as_mut() {
        *token = "<redacted>".to_string();
    }
    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "path": loaded.path.display().to_string(),
                "config": loaded.config,
            }),
        );
    } else {
        println!("{}: {}", style("Config").bold(), loaded.path.display());
        let rendered = serde_yaml::to_string(&loaded.config)
            .map_err(|e| McError::Other(format!("Could not render configuration: {e}")))?;
        print!("{rendered}");
    }
    Ok(())
}

fn cmd_init(cli: &Cli, args: &cli::InitArgs) -> Result<()> {
    let path = match &args.path {
        Some(path) => config::normalize(path)?,
        None => config::user_config_path().ok_or_else(|| {
            McError::Other("No user config directory on this platform; pass --path".to_string())
        })?,
    };

    if path.exists() && !args.force {
        return Err(McError::Other(format!(
            "{} already exists; pass --force to overwrite",
            path.display()
        )));
    }
    write_sample(&path)?;

    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({ "path": path.display().to_string(), "created": true }),
        );
    } else if !cli.quiet {
        println!("Wrote sample configuration to {}", style(path.display()).green());
        println!("Edit camera_defaults for your camera app, then run: mcam health");
    }
    Ok(())
}

#[allow(clippy::unnecessary_wraps)] // Consistent return type with other commands
fn cmd_version(cli: &Cli) -> Result<()> {
    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "version": build_info::VERSION,
                "git_sha": build_info::git_sha(),
                "git_dirty": build_info::git_dirty() == "true",
                "build_timestamp": build_info::build_timestamp(),
                "rustc_version": build_info::rustc_semver(),
                "target": build_info::target(),
            }),
        );
    } else {
        println!("mcam {}", build_info::VERSION);
        println!(
            "git: {}{}",
            build_info::git_sha(),
            if build_info::git_dirty() == "true" {
                " (dirty)"
            } else {
                ""
            }
        );
        println!("built: {}", build_info::build_timestamp());
        println!("rustc: {}", build_info::rustc_semver());
        println!("target: {}", build_info::target());
    }
    Ok(())
}

#[allow(clippy::unnecessary_wraps)] // Consistent return type with other commands
fn cmd_completions(_cli: &Cli, args: &cli::CompletionsArgs) -> Result<()> {
    use clap::CommandFactory;
    clap_complete::generate(args.shell, &mut Cli::command(), "mcam", &mut io::stdout());
    Ok(())
}

// === Utility Functions ===

fn load_config(cli: &Cli) -> Result<LoadedConfig> {
    config::load(&ConfigSearch::from_env(cli.config.clone()))
}

fn adb_bridge(loaded: &LoadedConfig) -> Arc<dyn BridgeClient> {
    Arc::new(AdbBridge::new(
        loaded.config.bridge.executable.clone(),
        loaded.config.settings.command_timeout,
    ))
}

/// Run a future on a fresh multi-threaded runtime.
fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(future))
}

fn write_sample(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, SAMPLE_CONFIG)?;
    Ok(())
}

fn file_extension(format: &str) -> &str {
    match format {
        "jpeg" => "jpg",
        other => other,
    }
}

fn output_json<T: Serialize>(cli: &Cli, data: &T) {
    let rendered = if cli.use_compact_json() {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    match rendered {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Could not serialize output: {e}"),
    }
}

fn output_error(cli: &Cli, error: &McError) {
    if cli.use_json() {
        let json = serde_json::json!({
            "error": error.code(),
            "message": error.to_string(),
            "suggestion": error.suggestion(),
            "recoverable": error.is_user_recoverable(),
        });
        eprintln!("{json:#}");
    } else {
        eprintln!("{}: {}", style("Error").red().bold(), error);
        if let Some(suggestion) = error.suggestion() {
            eprintln!("{}: {}", style("Hint").yellow(), suggestion);
        }
    }
}
