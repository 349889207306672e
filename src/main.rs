//! midimap - drive a MIDI controller from a declarative mapping
//!
//! Checks mapping documents, encodes feedback snapshots and monitors a live
//! controller, printing the decoded actions.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use midimap::config::{AppConfig, MappingConfig, MappingWatcher, MidiConfig};
use midimap::decode::{Action, ActionTag, Decoder};
use midimap::encode::{encode, OutputState};
use midimap::mapping::MappingDefinition;
use midimap::midi::format_hex;
use midimap::ports;
use midimap::session::{ControllerSession, SessionCore};

/// midimap - translate between a MIDI controller and application actions
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Mapping document (overrides the config file)
    #[arg(short, long)]
    mapping: Option<PathBuf>,

    /// Script file stored with the mapping (overrides the config file)
    #[arg(long)]
    script: Option<PathBuf>,

    /// Input port name pattern (overrides the config file)
    #[arg(long)]
    input_port: Option<String>,

    /// Output port name pattern (overrides the config file)
    #[arg(long)]
    output_port: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Parse the mapping, print a summary and exit
    #[arg(long)]
    check: bool,

    /// Encode a JSON output state snapshot and print the feedback bytes
    #[arg(long, value_name = "STATE_JSON")]
    encode: Option<PathBuf>,

    /// With --encode, also send the feedback to the output port
    #[arg(long)]
    send: bool,

    /// Print decoded actions as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    if args.list_ports {
        ports::print_ports();
        return Ok(());
    }

    let config = resolve_config(&args).await?;
    info!("Mapping file: {}", config.mapping.file.display());

    if args.check {
        let definition =
            MappingDefinition::load(&config.mapping.file, config.mapping.script.as_deref()).await?;
        print_summary(&definition);
        return Ok(());
    }

    if let Some(state_path) = &args.encode {
        return run_encode(&config, state_path, args.send).await;
    }

    run_monitor(config, args.json).await
}

/// Merge the optional config file with command-line overrides
async fn resolve_config(args: &Args) -> Result<AppConfig> {
    if let Some(path) = &args.config {
        let mut config = AppConfig::load(path).await?;
        config.resolve_paths(path);
        info!("Configuration file: {}", path.display());

        if let Some(mapping) = &args.mapping {
            config.mapping.file = mapping.clone();
        }
        if let Some(script) = &args.script {
            config.mapping.script = Some(script.clone());
        }
        if let Some(input) = &args.input_port {
            config.midi.input_port = input.clone();
        }
        if let Some(output) = &args.output_port {
            config.midi.output_port = Some(output.clone());
        }
        config.validate()?;
        return Ok(config);
    }

    let file = args
        .mapping
        .clone()
        .context("Either --config or --mapping is required")?;

    Ok(AppConfig {
        midi: MidiConfig {
            input_port: args.input_port.clone().unwrap_or_default(),
            output_port: args.output_port.clone(),
        },
        mapping: MappingConfig {
            file,
            script: args.script.clone(),
            watch: true,
            dedup_feedback: true,
        },
    })
}

async fn run_encode(config: &AppConfig, state_path: &Path, send: bool) -> Result<()> {
    let definition = Arc::new(
        MappingDefinition::load(&config.mapping.file, config.mapping.script.as_deref()).await?,
    );

    let json = tokio::fs::read_to_string(state_path)
        .await
        .with_context(|| format!("Failed to read state file: {}", state_path.display()))?;
    let state = OutputState::from_json(&json)
        .with_context(|| format!("Invalid state file: {}", state_path.display()))?;

    let messages = encode(&definition, &state);
    for message in &messages {
        println!("{}  {}", format_hex(&message.to_bytes()).yellow(), message);
    }
    println!(
        "{}",
        format!("{} feedback message(s)", messages.len()).dimmed()
    );

    if send {
        if config.midi.input_port.is_empty() || config.midi.output_port.is_none() {
            anyhow::bail!("--send needs both an input and an output port");
        }
        let core = SessionCore::new(definition, Decoder::default(), false);
        let mut session = ControllerSession::connect(&config.midi, core)?;
        let sent = session.send_feedback(&state)?;
        info!("Sent {} feedback message(s)", sent);
    }

    Ok(())
}

async fn run_monitor(config: AppConfig, json: bool) -> Result<()> {
    if config.midi.input_port.is_empty() {
        anyhow::bail!("No input port configured (use --input-port or the config file)");
    }

    let (watcher, definition) = if config.mapping.watch {
        let (watcher, definition) =
            MappingWatcher::new(config.mapping.file.clone(), config.mapping.script.clone()).await?;
        (Some(watcher), definition)
    } else {
        let definition =
            MappingDefinition::load(&config.mapping.file, config.mapping.script.as_deref()).await?;
        (None, Arc::new(definition))
    };

    let core = SessionCore::new(definition, Decoder::default(), config.mapping.dedup_feedback);
    let session = ControllerSession::connect(&config.midi, core)?;

    println!("{}", "=== Monitoring controller ===".bold().cyan());
    println!("Press Ctrl+C to exit\n");

    session
        .run(watcher, |actions| {
            for action in actions {
                print_action(action, json);
            }
        })
        .await?;

    info!("midimap shutdown complete");
    Ok(())
}

fn print_action(action: &Action, json: bool) {
    if json {
        match serde_json::to_string(action) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("Failed to serialize action: {}", e),
        }
        return;
    }

    let deck = action
        .deck
        .map(|d| format!("deck {}", d))
        .unwrap_or_else(|| "global".to_string());
    let tag = match action.tag {
        ActionTag::Press if action.down => "press".green(),
        ActionTag::Press => "release".red(),
        ActionTag::Change => "change".yellow(),
    };
    println!(
        "{:<8} {:<8} {:?} {}",
        deck,
        tag,
        action.control,
        action.value.to_string().dimmed()
    );
}

fn print_summary(definition: &MappingDefinition) {
    let meta = definition.metadata();
    println!("\n{}", "=== Mapping ===".bold().cyan());
    println!("  Name:        {}", meta.name.as_deref().unwrap_or("-").green());
    println!("  Author:      {}", meta.author.as_deref().unwrap_or("-"));
    println!("  Description: {}", meta.description.as_deref().unwrap_or("-"));
    if let Some(id) = definition.controller_id() {
        println!("  Controller:  {}", id);
    }
    for file in definition.script_files() {
        println!("  Script file: {}", file.filename);
    }
    println!(
        "  Script:      {}",
        if definition.script_source().is_some() { "loaded" } else { "none" }
    );

    let builtin = Decoder::default();
    println!("\n{} ({})", "Controls".bold(), definition.controls().len());
    for control in definition.controls() {
        let handled = if builtin.registry().contains(control.key()) {
            "builtin".green()
        } else {
            "script".yellow()
        };
        println!(
            "  {}  {:<12} {:<28} {}",
            format_hex(&[control.binding.status, control.binding.note]),
            control.group(),
            control.key(),
            handled
        );
    }

    println!("\n{} ({})", "Outputs".bold(), definition.outputs().len());
    for output in definition.outputs() {
        println!(
            "  {}  {:<12} {:<28} [{:?}, {:?}]",
            format_hex(&[output.binding.status, output.binding.note]),
            output.group(),
            output.key(),
            output.minimum,
            output.maximum
        );
    }
    println!();
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}
