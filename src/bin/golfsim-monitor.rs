//! Launch monitor dashboard.
//!
//! Usage: `golfsim-monitor <golf_sim_config.json>`
//!
//! Subscribes to the result topic, keeps the displayed shot current and logs
//! it every refresh interval. Type `driver` or `putter` to change club,
//! `quit` (or EOF) to exit.

use std::io::{self, BufRead};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{Level, debug, error, info, warn};

use golfsim_monitor::{
    ClubType, ConfigError, Consumer, ConsumerSettings, DisplayAssets, LazyPublisher, Monitor,
    MonitorConfig, ResultView, StompConnector, TransportError,
};

#[derive(Error, Debug)]
enum AppError {
    #[error("Config Error: {0}")]
    Config(#[from] ConfigError),
    #[error("Transport Error: {0}")]
    Transport(#[from] TransportError),
    #[error("Failed to start thread: {0}")]
    Thread(#[from] io::Error),
}

enum Input {
    Club(ClubType),
    Quit,
}

fn init_logging() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
}

fn main() -> ExitCode {
    init_logging();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: golfsim-monitor <golf_sim_config.json>");
        return ExitCode::from(2);
    };

    match run(&path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "monitor failed");
            ExitCode::FAILURE
        }
    }
}

fn run(path: &str) -> Result<(), AppError> {
    let config = MonitorConfig::load(path)?;
    let connector =
        StompConnector::new(&config.endpoint, &config.topic)?.with_io_slice(config.poll_interval);
    info!(broker = connector.addr(), topic = connector.destination(), "starting monitor");

    let publisher = LazyPublisher::spawn(connector.clone(), config.system_id.as_str())?;
    let monitor = Arc::new(Monitor::from_config(&config).with_control(Box::new(publisher)));

    let consumer = Consumer::new(
        connector,
        Arc::clone(&monitor),
        ConsumerSettings::from_config(&config),
    );
    let handle = consumer.spawn()?;

    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("stdin".into())
        .spawn(move || read_commands(tx))?;

    let refresh = Duration::from_secs(u64::from(monitor.tick_secs()));
    let mut next_tick = Instant::now() + refresh;
    let mut last_view: Option<ResultView> = None;

    loop {
        let wait = next_tick.saturating_duration_since(Instant::now());
        match rx.recv_timeout(wait) {
            Ok(Input::Club(club)) => monitor.on_club_changed(club),
            Ok(Input::Quit) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                monitor.tick();
                render(&monitor, &config.assets, &mut last_view);
                next_tick += refresh;
            }
        }
    }

    info!("shutting down");
    handle.shutdown();
    Ok(())
}

fn read_commands(tx: Sender<Input>) {
    for line in io::stdin().lock().lines() {
        let input = match line {
            Ok(line) => match line.trim().to_ascii_lowercase().as_str() {
                "" => continue,
                "driver" | "d" => Input::Club(ClubType::Driver),
                "putter" | "p" => Input::Club(ClubType::Putter),
                "quit" | "q" | "exit" => Input::Quit,
                other => {
                    warn!(command = other, "unknown command (driver, putter, quit)");
                    continue;
                }
            },
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        };
        if tx.send(input).is_err() {
            return;
        }
    }
    let _ = tx.send(Input::Quit);
}

fn render(monitor: &Monitor, assets: &DisplayAssets, last_view: &mut Option<ResultView>) {
    let snapshot = monitor.snapshot();
    let view = ResultView::from_result(&snapshot);
    if last_view.as_ref() == Some(&view) {
        debug!(secs_since_update = monitor.secs_since_update(), "display unchanged");
        return;
    }

    info!("{view}");
    for line in &view.log_lines {
        info!(target: "golfsim_monitor::pipeline", "{line}");
    }
    for image in assets.images_for(&snapshot) {
        info!(image = %image, "result image");
    }
    *last_view = Some(view);
}
