//! Replay a scripted editing session against a collector.
//!
//! Builds an in-memory notebook, wires the full tracker around it and plays
//! a JSON script of steps, so a collector endpoint can be exercised without
//! a browser.
//!
//! ```text
//! comet-replay session.json --base-url http://localhost:8888/ --path work/demo.ipynb
//! ```
//!
//! Script format:
//!
//! ```json
//! {
//!   "cells": [{"kind": "code", "source": "print(1)"}],
//!   "steps": [
//!     {"step": "select", "index": 0},
//!     {"step": "action", "name": "jupyter-notebook:run-cell"},
//!     {"step": "settle"},
//!     {"step": "clipboard", "event": "copy"}
//!   ]
//! }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use comet::{
    ActionHandler, CellClipboard, CellKind, ClipboardEvent, CometConfig, EditMode, HttpTransport,
    MemoryActions, MemoryCell, MemoryClipboard, MemoryNotebook, SettleSignal, SignalBus, Tracker,
};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "comet-replay")]
#[command(about = "Replay a scripted notebook session and post its events")]
struct Cli {
    /// JSON script to replay
    script: PathBuf,

    /// Notebook server base address
    #[arg(long, default_value = "http://localhost:8888/")]
    base_url: String,

    /// Document path relative to the server root
    #[arg(long, default_value = "Untitled.ipynb")]
    path: String,

    /// Seconds to wait for in-flight sends before exiting
    #[arg(long, default_value_t = 5)]
    drain_secs: u64,
}

#[derive(Debug, Deserialize)]
struct Script {
    #[serde(default)]
    cells: Vec<ScriptCell>,
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct ScriptCell {
    kind: CellKind,
    #[serde(default)]
    source: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
enum Step {
    /// Select one cell
    Select { index: usize },
    /// Select a contiguous range of cells
    SelectRange { anchor: usize, cursor: usize },
    /// Dispatch a named action
    Action { name: String },
    /// Finish queued executions and signal the kernel went idle
    Settle,
    CutCell,
    CopyCell,
    PasteCellAbove,
    PasteCellBelow,
    PasteCellReplace,
    /// Raise a system clipboard event
    Clipboard { event: ClipboardEvent },
    Mode { mode: EditMode },
    /// Press the tracking toolbar button
    Toggle,
}

fn load_script(path: &PathBuf) -> Result<Script> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse script {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,comet=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();
    let config = CometConfig::from_env().context("Failed to load configuration")?;
    let script = load_script(&cli.script)?;

    let notebook = Arc::new(
        MemoryNotebook::new(&cli.path, &cli.base_url).with_cells(
            script
                .cells
                .into_iter()
                .map(|cell| MemoryCell::new(cell.kind, cell.source))
                .collect(),
        ),
    );
    let transport = HttpTransport::new(&config).context("Failed to build HTTP client")?;

    let tracker = Tracker::builder(notebook.clone(), Arc::new(transport.clone()))
        .with_config(&config)
        .build();
    let session = tracker.open_session();
    let actions = tracker.intercept(MemoryActions::new(notebook.clone()));
    let clipboard = tracker.track_clipboard(MemoryClipboard::new(notebook.clone()));
    let clipboard_events = tracker.clipboard_listener();
    let kernel = SignalBus::new();
    let listener = tracker.spawn_listener(&kernel);

    info!(
        document = %cli.path,
        service = %config.service,
        steps = script.steps.len(),
        "replaying session"
    );

    for step in script.steps {
        match step {
            Step::Select { index } => notebook.select(index),
            Step::SelectRange { anchor, cursor } => notebook.select_range(anchor, cursor),
            Step::Action { name } => {
                if let Err(e) = actions.call(&name, ()) {
                    warn!(action = %name, error = %e, "action failed");
                }
            }
            Step::Settle => {
                notebook.finish_executions();
                let armed = tracker.correlator().armed_count();
                kernel.emit(SettleSignal::settled());
                // keep record order: let the listener fire before the next step
                while armed > 0 && tracker.correlator().armed_count() >= armed {
                    tokio::task::yield_now().await;
                }
            }
            Step::CutCell => clipboard.cut_cell(),
            Step::CopyCell => clipboard.copy_cell(),
            Step::PasteCellAbove => clipboard.paste_cell_above(),
            Step::PasteCellBelow => clipboard.paste_cell_below(),
            Step::PasteCellReplace => clipboard.paste_cell_replace(),
            Step::Clipboard { event } => {
                clipboard_events.on_clipboard_event(event);
            }
            Step::Mode { mode } => notebook.set_mode(mode),
            Step::Toggle => {
                session.toggle();
            }
        }
    }

    session.close();
    drop(kernel);
    listener.await.context("Signal listener panicked")?;

    if !transport.drain(Duration::from_secs(cli.drain_secs)).await {
        warn!(pending = transport.inflight(), "exiting with sends in flight");
    }
    info!("replay finished");
    Ok(())
}
