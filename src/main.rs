use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;

use promptloom::generation::{
    Batch, BackgroundRemover, CommandBackend, HandlerSettings, HttpIpProbe, ImageBackend, IpCheck, image_handlers,
};
use promptloom::prompt::{
    LibraryLoader, LibrarySet, PieceStore, check_brackets, combine, load_glob, lower, parse_prompt, parse_words,
    to_phrases,
};
use promptloom::scheduler::{EstimateKind, QueueEvent, TaskQueue};

fn setup_logging(level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("promptloom")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("promptloom.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.unwrap_or("info")))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Load every configured library directory or glob pattern.
fn load_libraries(config: &Config) -> Result<LibrarySet> {
    let mut set = LibrarySet::new();
    for entry in &config.libraries {
        let path = Path::new(entry);
        if path.is_dir() {
            let loaded = LibraryLoader::new(path)
                .load_all()
                .context(format!("Failed to load libraries from {}", path.display()))?;
            set.merge(loaded);
        } else if path.exists() || entry.contains('*') {
            load_glob(entry, &mut set).context(format!("Failed to load libraries matching {}", entry))?;
        } else {
            log::warn!("Library path does not exist: {}", entry);
        }
    }
    info!("Loaded {} piece libraries", set.len());
    Ok(set)
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Expand { prompt, samples } => {
            let libraries = load_libraries(config)?;
            handle_expand_command(prompt, *samples, &libraries)
        }
        Commands::Combine {
            front,
            middle,
            back,
            samples,
        } => {
            let libraries = load_libraries(config)?;
            handle_combine_command(front, middle, back, *samples, &libraries)
        }
        Commands::Check { text } => handle_check_command(text),
        Commands::Run { batch, dry_run } => {
            let libraries = load_libraries(config)?;
            handle_run_command(batch, *dry_run, config, &libraries).await
        }
        Commands::Libraries { pieces } => {
            let libraries = load_libraries(config)?;
            handle_libraries_command(*pieces, &libraries)
        }
    }
}

fn print_samples(node: &promptloom::prompt::PromptNode, samples: usize) {
    for _ in 0..samples.max(1) {
        println!("{}", lower(node));
    }
}

fn handle_expand_command(prompt: &str, samples: usize, libraries: &dyn PieceStore) -> Result<()> {
    info!("Expanding prompt: {}", prompt);
    let node = parse_prompt(prompt, libraries).context("Failed to expand prompt")?;
    print_samples(&node, samples);
    Ok(())
}

fn handle_combine_command(
    front: &str,
    middle: &str,
    back: &str,
    samples: usize,
    libraries: &dyn PieceStore,
) -> Result<()> {
    let (front, middle, back) = (to_phrases(front), to_phrases(middle), to_phrases(back));
    let words = combine(front.as_slice(), middle.as_slice(), back.as_slice());
    info!("Combined words: {:?}", words);
    let node = parse_words(&words, libraries).context("Failed to expand combined prompt")?;
    print_samples(&node, samples);
    Ok(())
}

fn handle_check_command(text: &str) -> Result<()> {
    match check_brackets(text) {
        Ok(()) => println!("{}", "Brackets balanced".green()),
        Err(pos) => {
            println!("{} at column {}", "Unbalanced bracket".red(), pos + 1);
            println!("  {}", text);
            println!("  {}{}", " ".repeat(pos), "^".red());
        }
    }
    Ok(())
}

fn handle_libraries_command(pieces: bool, libraries: &LibrarySet) -> Result<()> {
    if libraries.is_empty() {
        println!("{}", "No piece libraries loaded".yellow());
        return Ok(());
    }
    for name in libraries.names() {
        let Some(library) = libraries.get(name) else {
            continue;
        };
        println!("{} ({} pieces)", name.cyan(), library.pieces.len());
        if pieces {
            for (piece_name, piece) in &library.pieces {
                let marker = if piece.multi { " [multi]" } else { "" };
                println!("  <{}.{}>{}", name, piece_name, marker.dimmed());
            }
        }
    }
    Ok(())
}

async fn handle_run_command(batch_path: &Path, dry_run: bool, config: &Config, libraries: &LibrarySet) -> Result<()> {
    info!("Running batch: {}", batch_path.display());
    let batch = Batch::load(batch_path).context(format!("Failed to load batch {}", batch_path.display()))?;
    let planned = batch
        .plan(libraries, &config.output_dir)
        .context("Failed to expand batch prompts")?;

    let backend = Arc::new(CommandBackend::new(config.backend.clone()));
    let ip_check = if config.ip_check.enabled {
        let probe = HttpIpProbe::from_config(&config.ip_check).context("Failed to build IP probe")?;
        Some(IpCheck {
            probe: Arc::new(probe),
            enforce: config.ip_check.enforce,
        })
    } else {
        None
    };
    let settings = HandlerSettings {
        pacing: config.pacing.clone(),
        retries: config.retries.clone(),
        estimator: config.estimator.clone(),
    };
    let generator: Arc<dyn ImageBackend> = backend.clone();
    let remover: Arc<dyn BackgroundRemover> = backend;
    let queue = TaskQueue::new(
        image_handlers(generator, remover, ip_check, settings),
        config.pacing.clone(),
    );

    for task in planned {
        let task_type = task.params.task_type();
        if !dry_run {
            fs::create_dir_all(&task.params.output_dir)
                .context(format!("Failed to create {}", task.params.output_dir.display()))?;
        }
        queue.add_task(task_type, task.params, task.total)?;
    }

    let stats = queue.stats_all();
    println!(
        "{} {} tasks, {} images, estimated {}",
        "Queued:".green(),
        queue.len(),
        stats.total,
        format_duration(queue.estimate_total_time(EstimateKind::Median))
    );
    for item in queue.calculate_cost() {
        println!("  {} {}: {}", "cost".yellow(), item.scene, item.text);
    }
    if dry_run || queue.is_empty() {
        return Ok(());
    }

    let mut events = queue.subscribe();
    let Some(handle) = queue.run() else {
        return Ok(());
    };

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(QueueEvent::Complete { task_id }) => {
                    let stats = queue.stats_all();
                    println!(
                        "{} {} ({}/{}, eta {})",
                        "done".green(),
                        task_id,
                        stats.done,
                        stats.total,
                        format_duration(queue.estimate_total_time(EstimateKind::Median))
                    );
                }
                Ok(QueueEvent::Error { task_id, message, .. }) => {
                    println!("{} {}: {}", "error".red(), task_id, message);
                }
                Ok(QueueEvent::IpCheckFail) => {
                    println!("{}", "IP address changed, queue stopped".red().bold());
                }
                Ok(QueueEvent::Stop) => break,
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Event stream lagged, skipped {} events", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("{}", "Stopping after the current attempt...".yellow());
                queue.stop();
            }
        }
    }
    handle.await.context("Queue loop panicked")?;

    let stats = queue.stats_all();
    if queue.is_empty() {
        println!("{}", "All tasks complete".green());
    } else {
        println!(
            "{} {} tasks left, {}/{} images done",
            "Stopped:".yellow(),
            queue.len(),
            stats.done,
            stats.total
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration; its log level seeds the logger unless RUST_LOG is set
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
