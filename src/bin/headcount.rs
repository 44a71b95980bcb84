//! headcount - count adults, children and animals in a video, frame by frame
//!
//! Opens a local video (or a `stub://` synthetic one), runs the detection
//! loop until the video ends or Ctrl-C removes it, and prints the counters of
//! every completed tick.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use headcount::ui::{CounterDisplay, ReportCursor, Ui};
use headcount::{open_video, FileConfig, HeadcountConfig, SessionController, TickReport};

#[derive(Parser, Debug)]
#[command(
    name = "headcount",
    version,
    about = "Count adults, children and animals in a video"
)]
struct Args {
    /// Video file to analyze, or stub://NAME for a synthetic clip
    #[arg(long, value_name = "PATH")]
    video: String,

    /// Detector backend (stub|tract)
    #[arg(long)]
    backend: Option<String>,

    /// ONNX model for the tract backend
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Config file (JSON, or TOML with a .toml extension)
    #[arg(long, value_name = "PATH", env = "HEADCOUNT_CONFIG")]
    config: Option<PathBuf>,

    /// Stop after this many ticks
    #[arg(long, value_name = "N")]
    frames: Option<u64>,

    /// Print one JSON tick report per line on stdout
    #[arg(long)]
    json: bool,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty, args.json || !stdout_is_tty);

    let config = {
        let _stage = ui.stage("Load configuration");
        let mut config = HeadcountConfig::load_with(args.config.as_deref())?;
        if let Some(backend) = &args.backend {
            config.backend = backend.clone();
        }
        if let Some(model) = &args.model {
            config.model_path = Some(model.clone());
        }
        config.validate()?;
        config
    };
    log::info!(
        "headcount: backend={}, refresh={} Hz",
        config.backend,
        config.refresh_hz
    );

    let loader = config.model_loader()?;
    let mut controller = SessionController::new(loader, config.loop_settings());

    {
        let _stage = ui.stage("Open video");
        let source = open_video(FileConfig::new(&args.video))?;
        controller.accept_video(source)?;
    }

    let (stop_tx, mut stop_rx) = tokio::sync::mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    let mut reports = controller.reports();
    let mut status = controller.status();
    let display = ui.counters();
    let mut cursor = ReportCursor::default();
    let mut last_status = status.borrow().clone();

    loop {
        tokio::select! {
            changed = reports.changed() => {
                if changed.is_err() {
                    break;
                }
                let report = reports.borrow_and_update().clone();
                if !show(&report, &mut cursor, args.json, &display)? {
                    continue;
                }
                if args.frames.is_some_and(|max| report.sequence >= max) {
                    log::info!("headcount: reached {} ticks", report.sequence);
                    break;
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                last_status = status.borrow_and_update().clone();
                if last_status.phase.is_terminal() {
                    // The last tick is published before the phase changes.
                    let report = reports.borrow_and_update().clone();
                    show(&report, &mut cursor, args.json, &display)?;
                    break;
                }
            }
            _ = stop_rx.recv() => {
                log::info!("headcount: interrupt received, removing video");
                break;
            }
        }
    }

    controller.remove_video();
    controller.wait_until_stopped().await;
    display.finish(&last_status);

    if let Some(fault) = last_status.fault {
        return Err(anyhow!(fault));
    }
    Ok(())
}

/// Print `report` unless it was already shown. Returns true when printed.
fn show(
    report: &TickReport,
    cursor: &mut ReportCursor,
    json: bool,
    display: &CounterDisplay,
) -> Result<bool> {
    if !cursor.advance(report.sequence) {
        return Ok(false);
    }
    if json {
        println!("{}", serde_json::to_string(report)?);
    } else {
        display.update(report.sequence, &report.counters);
    }
    Ok(true)
}
