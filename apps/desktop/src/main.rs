use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    HttpCommandGateway, SessionController, SessionHandle, SessionUpdate, WsEventConnector,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::{self, error::RecvError},
};
use tracing::{debug, info, warn};

mod config;
mod console;
mod logging;

use config::{load_settings, Overrides, DEFAULT_CONFIG_FILE};
use console::{parse_line, render, OperatorInput, HELP};

/// How long an exiting client waits on the detached disconnect request.
const FAREWELL_GRACE: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(about = "Operator console for a neurofeedback recording station")]
struct Args {
    /// Base URL of the device-control service.
    #[arg(long)]
    service_url: Option<String>,
    #[arg(long)]
    discovery_interval_ms: Option<u64>,
    #[arg(long)]
    discovery_max_attempts: Option<u32>,
    #[arg(long)]
    score_throttle_ms: Option<u64>,
    /// 0 = quiet, 1 = info, 2+ = debug with a copy in logs/session.log.
    #[arg(long)]
    log_verbose: Option<u8>,
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            service_url: self.service_url.clone(),
            discovery_interval_ms: self.discovery_interval_ms,
            discovery_max_attempts: self.discovery_max_attempts,
            score_throttle_ms: self.score_throttle_ms,
            log_verbose: self.log_verbose,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = load_settings(&args.config, &args.overrides());
    let _logging = logging::init_logger(settings.log_verbose);
    info!(service_url = %settings.service_url, "desktop client starting");

    let gateway = Arc::new(HttpCommandGateway::new(settings.service_url.clone()));
    let connector = Arc::new(
        WsEventConnector::from_service_url(&settings.service_url)
            .context("service url cannot carry an event channel")?,
    );
    let (controller, inputs) =
        SessionController::new(gateway, connector, settings.session_settings());
    let handle = controller.session_handle();
    let renderer = tokio::spawn(render_updates(handle.subscribe()));
    let running = tokio::spawn(controller.run(inputs));

    println!("{HELP}");
    operator_loop(&handle).await?;

    if handle.leave().is_err() {
        debug!("controller already stopped");
    }
    let farewell = running.await.context("controller task failed")?;
    if let Some(farewell) = farewell {
        if tokio::time::timeout(FAREWELL_GRACE, farewell).await.is_err() {
            warn!("disconnect request still pending at exit");
        }
    }
    renderer.abort();
    info!("desktop client stopped");
    Ok(())
}

async fn operator_loop(handle: &SessionHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read operator input")?,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                return Ok(());
            }
        };
        let Some(line) = line else {
            return Ok(());
        };
        match parse_line(&line) {
            Ok(None) => {}
            Ok(Some(OperatorInput::Help)) => println!("{HELP}"),
            Ok(Some(OperatorInput::Quit)) => return Ok(()),
            Ok(Some(OperatorInput::Session(command))) => {
                if handle.send(command).is_err() {
                    return Ok(());
                }
            }
            Err(message) => println!("{message}"),
        }
    }
}

async fn render_updates(mut updates: broadcast::Receiver<SessionUpdate>) {
    loop {
        match updates.recv().await {
            Ok(update) => {
                if let Some(line) = render(&update) {
                    println!("{line}");
                }
            }
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "renderer lagged"),
            Err(RecvError::Closed) => return,
        }
    }
}
