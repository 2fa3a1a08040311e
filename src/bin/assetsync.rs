//! # assetsync CLI - Keep an asset project in sync with its files
//!
//! Runs the sync engine over a project on disk using the file-backed
//! collaborators.
//!
//! ## Usage
//! ```bash
//! # Write a configuration file for a project
//! assetsync init-config --data Data --source Source
//!
//! # Watch the project and print every change
//! assetsync watch
//!
//! # Rewrite references after renaming something by hand
//! assetsync rewrite Data/sprites/hero.png Data/sprites/hero2.png
//! ```

use anyhow::Context;
use assetsync::collaborators::{AutoConfirm, Reimporter};
use assetsync::json_store::{AssetRules, JsonAssetStore, JsonSettingsStore, TrashDirectory};
use assetsync::watcher::spawn_watchers;
use assetsync::{
    EngineConfig, FileEvent, ProgressInfo, PropagationReport, ResourceEvent, SyncEngine,
    SyncError,
};
use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "assetsync.json";
const TICK_INTERVAL: Duration = Duration::from_millis(20);

/// assetsync CLI - Reconcile an asset project with external file changes
#[derive(Parser)]
#[command(name = "assetsync")]
#[command(version)]
#[command(about = "Keep an asset project's cache, references and media tree in sync with its files")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./assetsync.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Asset rules file (built-in rules when omitted)
    #[arg(short, long, global = true)]
    rules: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    InitConfig {
        /// Data root, relative to the configuration file
        #[arg(long, default_value = "Data")]
        data: PathBuf,

        /// Source root, relative to the configuration file
        #[arg(long, default_value = "Source")]
        source: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Watch the project and apply external changes
    Watch {
        /// Stop after this long (e.g. "30s"); runs until killed otherwise
        #[arg(long, value_parser = humantime::parse_duration)]
        duration: Option<Duration>,
    },

    /// Rewrite references for a rename that already happened on disk
    Rewrite {
        /// Path before the rename
        old: PathBuf,

        /// Path after the rename
        new: PathBuf,

        /// The renamed entry is a directory
        #[arg(long)]
        dir: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        if let Some(sync_error) = e.downcast_ref::<SyncError>() {
            let hint = sync_error.user_message();
            if hint != sync_error.to_string() {
                eprintln!("  {}", hint);
            }
        }
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    match cli.command {
        Commands::InitConfig { data, source, force } => cmd_init_config(&config_path, data, source, force),
        Commands::Watch { duration } => cmd_watch(&config_path, cli.rules.as_deref(), duration),
        Commands::Rewrite { old, new, dir } => cmd_rewrite(&config_path, cli.rules.as_deref(), old, new, dir),
    }
}

/// Write a configuration file with default settings
fn cmd_init_config(config_path: &Path, data: PathBuf, source: PathBuf, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite it.",
            config_path.display()
        );
    }

    let config = EngineConfig::new(data, source);
    config.save(config_path)?;

    println!("{} Wrote {}", "✓".green().bold(), config_path.display().to_string().cyan());
    println!("  Data: {}", config.data_root.display().to_string().cyan());
    println!("  Source: {}", config.source_root.display().to_string().cyan());
    println!("  Media: {}", config.media_root().display().to_string().cyan());
    println!("\nNext steps:");
    println!("  - Start watching: {}", "assetsync watch".yellow());
    Ok(())
}

/// Run the engine until the duration elapses
fn cmd_watch(config_path: &Path, rules: Option<&Path>, duration: Option<Duration>) -> anyhow::Result<()> {
    let mut engine = open_engine(config_path, rules)?;
    let events = engine.event_channel();
    let watchers = spawn_watchers(engine.config(), engine.inbox())
        .context("failed to start file system watchers")?;

    println!(
        "{} {}",
        "Watching".blue().bold(),
        engine.config().data_root.display().to_string().cyan()
    );
    if let Some(duration) = duration {
        println!("  Stopping after {}", format_duration(duration));
    }

    let started = Instant::now();
    let unpaired_age = engine.config().quiescence_window;
    let mut bar: Option<ProgressBar> = None;

    loop {
        if duration.is_some_and(|d| started.elapsed() >= d) {
            break;
        }

        watchers.flush_unpaired(unpaired_age);
        let report = engine.tick(Instant::now());
        for warning in &report.warnings {
            println!("  {} {}", "!".yellow().bold(), warning);
        }
        for event in events.try_iter() {
            print_event(&event);
        }

        if !engine.reimport_schedule().is_empty() {
            engine.on_focus_regained();
        }

        match engine.propagation_progress() {
            Some(progress) => {
                let pb = bar.get_or_insert_with(new_progress_bar);
                update_progress_bar(pb, &progress);
            }
            None => {
                if let Some(pb) = bar.take() {
                    pb.finish_and_clear();
                }
            }
        }
        for report in engine.take_propagation_reports() {
            print_propagation_report(&report);
        }

        thread::sleep(TICK_INTERVAL);
    }

    println!("{} Stopped after {}", "✓".green().bold(), format_duration(round_secs(started.elapsed())));
    Ok(())
}

/// Propagate one manual rename
fn cmd_rewrite(
    config_path: &Path,
    rules: Option<&Path>,
    old: PathBuf,
    new: PathBuf,
    is_dir: bool,
) -> anyhow::Result<()> {
    let mut engine = open_engine(config_path, rules)?;
    let old = absolute(&old)?;
    let new = absolute(&new)?;

    println!(
        "{} {} -> {}",
        "Rewriting references".blue().bold(),
        old.display().to_string().cyan(),
        new.display().to_string().cyan()
    );

    let pb = new_progress_bar();
    let report = engine.propagate_now(vec![FileEvent::renamed(old, new, is_dir)], &mut |progress| {
        update_progress_bar(&pb, &progress)
    })?;
    pb.finish_and_clear();

    print_propagation_report(&report);
    Ok(())
}

/// Build an engine with the file-backed collaborators
fn open_engine(config_path: &Path, rules_path: Option<&Path>) -> anyhow::Result<SyncEngine> {
    let config = EngineConfig::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let rules = match rules_path {
        Some(path) => AssetRules::load(path)?,
        None => AssetRules::default(),
    }
    .with_roots(&config.data_root, config.media_root());

    let project_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let settings_dir = project_dir.join("Settings");

    let engine = SyncEngine::builder()
        .catalog(rules.clone())
        .cache(JsonAssetStore::new(&config.data_root, rules))
        .recycle_bin(TrashDirectory::new(project_dir.join(".trash")))
        .settings(JsonSettingsStore::new(
            settings_dir.join("application.json"),
            settings_dir.join("user.json"),
            &config.data_root,
        ))
        .reimporter(PrintReimporter)
        .ui(AutoConfirm::default())
        .build(config)?;
    Ok(engine)
}

/// Reimporter for a host without an import pipeline
struct PrintReimporter;

impl Reimporter for PrintReimporter {
    fn reimport(&mut self, paths: &[PathBuf]) {
        for path in paths {
            println!("  {} {}", "reimport".magenta(), path.display());
        }
    }
}

fn print_event(event: &ResourceEvent) {
    let label = match event {
        ResourceEvent::Created { .. } => "created".green(),
        ResourceEvent::Deleted { .. } => "deleted".red(),
        ResourceEvent::Modified { .. } => "modified".yellow(),
        ResourceEvent::Renamed { .. } => "renamed".blue(),
        ResourceEvent::PluginBinaryChanged { .. } => "plugin".magenta(),
    };
    match event {
        ResourceEvent::Renamed { path, old_path, .. } => {
            println!("  {:<9} {} -> {}", label, old_path.display(), path.display())
        }
        _ => println!("  {:<9} {}", label, event.path().display()),
    }
}

fn print_propagation_report(report: &PropagationReport) {
    println!(
        "{} Propagated {} renames in {}ms",
        "✓".green().bold(),
        report.renames,
        report.duration_ms
    );
    println!("  References rewritten: {}", report.references_rewritten.to_string().cyan());
    println!("  Files saved: {}", report.files_saved.len().to_string().cyan());
    println!("  Files skipped: {}", report.files_skipped);
    for file in &report.files_saved {
        println!("    {}", file.display());
    }
    for warning in &report.warnings {
        println!("  {} {}", "!".yellow().bold(), warning);
    }
}

fn new_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(1000);
    let style = ProgressStyle::default_bar()
        .template("{bar:40.cyan/blue} {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

fn update_progress_bar(pb: &ProgressBar, progress: &ProgressInfo) {
    pb.set_position((progress.percentage() * 10.0) as u64);
    pb.set_message(progress.current_item.clone().unwrap_or_else(|| progress.operation.clone()));
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.canonicalize()?.join(path))
    }
}

fn round_secs(duration: Duration) -> Duration {
    Duration::from_secs(duration.as_secs())
}
