//! `vizcheck` command line: a thin shell over [`App`](crate::App).

use std::{io::Write as _, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    comparison::{CompareOptions, ExactBytesDiff, Screenshot},
    grouping::group_comparisons,
    settings::{state_dir_for, SettingsStore, STATE_DIR_ENV},
    utils::logging,
    App,
};

#[derive(Parser)]
#[command(name = "vizcheck")]
#[command(version, about = "Local visual-regression engine", long_about = None)]
pub struct Cli {
    /// State directory (defaults to `<cwd>/.vizcheck`)
    #[arg(long, global = true, env = STATE_DIR_ENV)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the current report as JSON
    Report,
    /// Print comparisons grouped by name and variant
    Groups,
    /// Compare one image against its baseline
    Compare {
        name: String,
        image: PathBuf,
        /// Property as key=value; repeatable
        #[arg(short, long = "property", value_parser = parse_property)]
        properties: Vec<(String, Value)>,
        /// Percentage of differing pixels tolerated
        #[arg(long)]
        threshold: Option<f64>,
        /// Store the image as the new baseline without comparing
        #[arg(long)]
        set_baseline: bool,
    },
    /// Promote the current image to baseline (signature, id or name)
    Accept { target: String },
    /// Mark a comparison as reviewed and wrong
    Reject { target: String },
    /// Remove a comparison and its images
    Delete { target: String },
    /// Accept every failed or new comparison
    AcceptAll,
    /// Clear all comparisons and images
    Reset,
    /// Stream live dashboard events as server-sent-event frames until interrupted
    Watch,
    /// Print the applied schema version
    SchemaVersion,
}

fn parse_property(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if key.trim().is_empty() {
        return Err(format!("empty property key in '{raw}'"));
    }
    // Numbers and booleans keep their JSON type; anything else is a string.
    let value = serde_json::from_str::<Value>(value)
        .ok()
        .filter(|parsed| parsed.is_number() || parsed.is_boolean())
        .unwrap_or_else(|| Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let state_dir = match cli.state_dir {
        Some(dir) => dir,
        None => state_dir_for(&std::env::current_dir().context("failed to read working directory")?),
    };

    let log_level = SettingsStore::in_state_dir(&state_dir)?.current().log_level;
    logging::init(log_level.as_deref());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let app = App::open(&state_dir, Arc::new(ExactBytesDiff))?;
    let result = runtime.block_on(dispatch(&app, cli.command));
    app.close();
    result
}

async fn dispatch(app: &App, command: Command) -> Result<()> {
    match command {
        Command::Report => match app.db.read_report_data().await? {
            Some(state) => print_json(&state),
            None => {
                println!("null");
                Ok(())
            }
        },
        Command::Groups => {
            let comparisons = app.db.list_comparisons().await?;
            print_json(&group_comparisons(&comparisons))
        }
        Command::Compare {
            name,
            image,
            properties,
            threshold,
            set_baseline,
        } => {
            let image = tokio::fs::read(&image)
                .await
                .with_context(|| format!("failed to read {}", image.display()))?;
            let properties: Map<String, Value> = properties.into_iter().collect();
            let comparison = app
                .engine
                .handle_screenshot(
                    Screenshot {
                        name,
                        image,
                        properties: Value::Object(properties),
                    },
                    CompareOptions {
                        threshold,
                        set_baseline,
                    },
                )
                .await?;
            print_json(&comparison)
        }
        Command::Accept { target } => print_json(&app.engine.accept(&target).await?),
        Command::Reject { target } => print_json(&app.engine.reject(&target).await?),
        Command::Delete { target } => print_json(&app.engine.delete(&target).await?),
        Command::AcceptAll => {
            let accepted = app.engine.accept_all().await?;
            println!("accepted {accepted} comparison(s)");
            Ok(())
        }
        Command::Reset => {
            app.engine.reset().await?;
            println!("reset {}", app.db.state_dir().display());
            Ok(())
        }
        Command::Watch => watch(app).await,
        Command::SchemaVersion => {
            println!("{}", app.db.get_schema_version().await?);
            Ok(())
        }
    }
}

async fn watch(app: &App) -> Result<()> {
    let mut connection = app.live.connect().await?;
    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            event = connection.recv() => {
                let Some(event) = event else { break };
                stdout.write_all(event.to_sse()?.as_bytes())?;
                stdout.flush()?;
            }
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|err| anyhow!("failed to listen for ctrl-c: {err}"))?;
                break;
            }
        }
    }
    connection.disconnect().await;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
