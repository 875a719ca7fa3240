//! input-replay CLI
//!
//! Groups recorded macros into actions and dry-runs their playback.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use input_replay::{
    config::Config,
    event::Rgb,
    playback::{
        ChannelListener, DocumentLoader, PlaybackEvent, PlaybackOptions, PlaybackReport, Player,
        RecordingActuator, ScriptedSensor, StopReason,
    },
    stats::{create_shared_stats_with_persistence, PlaybackStats},
    timeline::{compute_summary, document::action_to_record, ActionTimeline, MacroDocument},
    VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "input-replay")]
#[command(version = VERSION)]
#[command(about = "Group recorded input macros into actions and replay them", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Group the raw events of a macro into actions
    Group {
        /// Macro document (JSON)
        file: PathBuf,

        /// Print action records as JSON
        #[arg(long)]
        json: bool,

        /// Write the grouped actions back into the document
        #[arg(long)]
        save: bool,
    },

    /// Summarize a macro
    Inspect {
        /// Macro document (JSON)
        file: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Play a macro against the recording backend (no input is injected)
    Play {
        /// Macro document (JSON)
        file: PathBuf,

        /// Number of repeats (default from config)
        #[arg(long)]
        repeat: Option<u32>,

        /// Speed multiplier (default from config)
        #[arg(long)]
        speed: Option<f64>,

        /// Verify click targets against the first repeat
        #[arg(long)]
        prudent: bool,

        /// Stop when the sound sensor gets loud
        #[arg(long)]
        stop_on_sound: bool,

        /// Color the simulated screen reports, as #rrggbb
        #[arg(long, default_value = "#000000")]
        pixel_color: String,
    },

    /// Show lifetime playback statistics
    Status,

    /// Show configuration
    Config,
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Group { file, json, save } => cmd_group(&file, json, save),
        Commands::Inspect { file, json } => cmd_inspect(&file, json),
        Commands::Play {
            file,
            repeat,
            speed,
            prudent,
            stop_on_sound,
            pixel_color,
        } => cmd_play(&file, repeat, speed, prudent, stop_on_sound, &pixel_color),
        Commands::Status => cmd_status(),
        Commands::Config => cmd_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: could not load configuration, using defaults: {e}");
        Config::default()
    })
}

fn load_macro(path: &Path, config: &Config) -> Result<ActionTimeline> {
    MacroDocument::load(path)
        .and_then(|doc| doc.into_timeline(config.grouping.clone()))
        .with_context(|| format!("failed to load macro {}", path.display()))
}

fn cmd_group(file: &Path, json: bool, save: bool) -> Result<()> {
    let config = load_config();
    let mut timeline = load_macro(file, &config)?;
    timeline.regroup();

    if json {
        let records: Vec<_> = timeline.actions().iter().map(action_to_record).collect();
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        println!(
            "{} raw events -> {} actions",
            timeline.events().len(),
            timeline.len()
        );
        println!();
        for (i, action) in timeline.actions().iter().enumerate() {
            println!(
                "{:>4}  {:>8.3}s  {:<40} events {:?}",
                i,
                action.start_time,
                action.label,
                action.event_indices.iter().collect::<Vec<_>>()
            );
        }
        if !timeline.orphans().is_empty() {
            println!();
            println!("Dropped events:");
            for orphan in timeline.orphans() {
                println!("  #{}: {:?}", orphan.index, orphan.reason);
            }
        }
    }

    if save {
        MacroDocument::from_timeline(&timeline, true)
            .save(file)
            .with_context(|| format!("failed to save {}", file.display()))?;
        println!();
        println!("Saved grouped actions to {}", file.display());
    }
    Ok(())
}

fn cmd_inspect(file: &Path, json: bool) -> Result<()> {
    let config = load_config();
    let timeline = load_macro(file, &config)?;
    let summary = compute_summary(&timeline);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Macro: {}", file.display());
    println!("Mode: {:?}", timeline.mode());
    println!();
    println!("{}", summary.report());

    let issues = timeline.control_flow().issues();
    if !issues.is_empty() {
        println!();
        println!("Control flow issues:");
        for issue in issues {
            println!("  - {issue}");
        }
    }
    Ok(())
}

fn cmd_play(
    file: &Path,
    repeat: Option<u32>,
    speed: Option<f64>,
    prudent: bool,
    stop_on_sound: bool,
    pixel_color: &str,
) -> Result<()> {
    let config = load_config();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let Some(color) = Rgb::from_hex(pixel_color) else {
        bail!("invalid pixel color {pixel_color:?}, expected #rrggbb");
    };
    let timeline = Arc::new(load_macro(file, &config)?);

    let mut options: PlaybackOptions = config
        .playback_options()
        .with_prudent_mode(prudent)
        .with_stop_on_sound(stop_on_sound);
    if let Some(repeat) = repeat {
        options = options.with_repeat(repeat);
    }
    if let Some(speed) = speed {
        options = options.with_speed(speed);
    }

    let actuator = Arc::new(RecordingActuator::default());
    let sensor = Arc::new(ScriptedSensor::new(color));
    let (listener, events) = ChannelListener::new();
    let player = Player::new(actuator.clone(), sensor)
        .with_loader(Arc::new(
            DocumentLoader::new(config.grouping.clone()).relative_to(file),
        ))
        .with_listener(Arc::new(listener))
        .with_stats(create_shared_stats_with_persistence(config.stats_path()));

    println!("input-replay v{VERSION} (dry run)");
    println!(
        "Playing {} actions, {} repeat(s) at {}x",
        timeline.len(),
        options.repeat_count,
        options.speed_multiplier
    );
    println!("Press Ctrl+C to stop");
    println!();

    let handle = player.play(timeline, options)?;
    let stop = handle.stop_signal();
    ctrlc::set_handler(move || {
        stop.request(StopReason::UserRequested);
    })
    .expect("Error setting Ctrl+C handler");

    let mut report: Option<PlaybackReport> = None;
    for event in events.iter() {
        match event {
            PlaybackEvent::Log(message) => println!("  {message}"),
            PlaybackEvent::Highlight(_) => {}
            PlaybackEvent::Finished(finished) => {
                report = Some(finished);
                break;
            }
        }
    }
    let report = handle.join().or(report).context("playback worker died")?;

    println!();
    println!("Run {}", report.run_id);
    match report.stop_reason() {
        None => println!("  Outcome: completed"),
        Some(reason) => println!("  Outcome: {reason}"),
    }
    println!("  Repeats completed: {}", report.repeats_completed);
    println!("  Actions dispatched: {}", report.actions_dispatched);
    println!("  Actuator calls recorded: {}", actuator.calls().len());
    println!(
        "  Duration: {:.2}s",
        (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0
    );
    Ok(())
}

fn cmd_status() -> Result<()> {
    let config = load_config();

    println!("input-replay Status");
    println!("===================");
    println!();

    let stats_path = config.stats_path();
    if stats_path.exists() {
        let stats = PlaybackStats::with_persistence(stats_path);
        println!("{}", stats.summary());
    } else {
        println!("No playback has been recorded yet.");
    }
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
