mod action;
mod command;
mod config;
mod logging;
mod session;

use action::ProcessRunner;
use anyhow::{Context, Result};
use command::CommandDispatcher;
use config::{Config, LogConfig};
use session::{LanShell, SessionShell};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let log_config = LogConfig::from_env()?;
    let _log_guard = logging::init(&log_config)?;

    let config = Config::from_env()?;

    let runner = Arc::new(ProcessRunner::new(config.process_timeout));
    let dispatcher = CommandDispatcher::new(config.managed_host.clone(), config.scripts.clone(), runner);

    let mut shell = LanShell::bind(&config.listen_host, config.listen_port, &config.credentials).await?;
    info!("Listening IPMI on [{}]:{} ...", config.listen_host, config.listen_port);
    debug!(
        managed_host = %config.managed_host,
        process_timeout = ?config.process_timeout,
        "Dispatcher ready"
    );

    let result = serve(&mut shell, &dispatcher, config.listen_timeout).await;
    info!("Good bye");
    result
}

/// Answer requests one at a time until SIGINT or SIGTERM
async fn serve<S: SessionShell>(shell: &mut S, dispatcher: &CommandDispatcher, listen_timeout: Duration) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    loop {
        let inbound = tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT");
                return Ok(());
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
                return Ok(());
            }
            result = shell.wait_for_request(listen_timeout) => result,
        };

        let inbound = match inbound {
            Ok(Some(inbound)) => inbound,
            Ok(None) => continue,
            Err(e) => {
                warn!("Failed to receive request: {:#}", e);
                continue;
            }
        };

        let response = dispatcher.handle(&inbound.request).await;
        if let Err(e) = shell.send_response(&inbound, &response).await {
            warn!("{:#}", e);
        }
    }
}
