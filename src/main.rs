//! collab-mux - Entry Point
//!
//! Drives one collaboration session from a tokio interval, standing in for
//! the editor's UI timer.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use collab_mux::connection::build_client_config;
use collab_mux::handler::Outbox;
use collab_mux::{Config, Reactor, ReconnectPolicy, SessionHooks, StreamHandler, VERSION};

/// How long `test-connection` waits for the session to become ready
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// collab-mux - cooperative multiplexer for collaboration sessions
#[derive(Parser)]
#[command(name = "collab-mux")]
#[command(version = VERSION)]
#[command(about = "Poll-driven connection multiplexer for collaborative editing sessions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and keep the session running until interrupted
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Connect once and exit after the session becomes ready
    TestConnection {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

/// Hooks for a headless session: everything received is logged
#[derive(Default)]
struct LoggingHooks {
    received: u64,
}

impl SessionHooks for LoggingHooks {
    fn on_connect(&mut self, _outbox: &mut Outbox<'_>) {
        info!("Session established");
    }

    fn on_data(&mut self, data: &[u8], _outbox: &mut Outbox<'_>) {
        self.received += data.len() as u64;
        debug!(bytes = data.len(), total = self.received, "Received data");
    }

    fn on_disconnect(&mut self) {
        warn!("Session transport lost");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // TLS sessions use the ring provider
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run_session(config).await,
        Commands::TestConnection { config } => test_connection(config).await,
    }
}

fn load(config_path: &Path) -> Result<Config> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    collab_mux::util::init_tracing(&config.logging)?;
    Ok(config)
}

/// Build the session handler described by `config`
fn session_handler(config: &Config) -> Result<StreamHandler<LoggingHooks>> {
    let mut handler = StreamHandler::new(LoggingHooks::default())
        .with_policy(ReconnectPolicy::from_config(&config.reconnect));

    if config.session.secure {
        let tls = build_client_config(&config.tls).context("Failed to build TLS configuration")?;
        handler = handler.with_tls_config(tls);
    }

    Ok(handler)
}

async fn run_session(config_path: PathBuf) -> Result<()> {
    let config = load(&config_path)?;

    info!(
        version = VERSION,
        config_path = ?config_path,
        "Starting collab-mux"
    );

    if config.metrics.enabled {
        collab_mux::metrics::init_metrics(&config.metrics)?;
        info!(
            bind_addr = %config.metrics.bind_addr,
            "Metrics endpoint started"
        );
    }

    let mut reactor = Reactor::new();
    reactor.connect(
        session_handler(&config)?,
        &config.session.host,
        config.session.port,
        config.session.secure,
    );

    let mut interval = tokio::time::interval(config.scheduler.tick_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut was_ready = false;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = reactor.tick() {
                    error!(error = %e, "Reactor failed");
                    reactor.stop();
                    return Err(e.into());
                }

                let ready = reactor.is_ready();
                if ready != was_ready {
                    info!(ready, "Session readiness changed");
                    was_ready = ready;
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                reactor.stop();
                break;
            }
        }
    }

    info!("Session stopped");
    Ok(())
}

async fn test_connection(config_path: PathBuf) -> Result<()> {
    let config = load(&config_path)?;

    info!(
        host = %config.session.host,
        port = config.session.port,
        secure = config.session.secure,
        "Testing connection to collaboration server"
    );

    let handler = session_handler(&config)?.with_policy(ReconnectPolicy::disabled());

    let mut reactor = Reactor::new();
    reactor.connect(
        handler,
        &config.session.host,
        config.session.port,
        config.session.secure,
    );

    let started = Instant::now();
    let mut interval = tokio::time::interval(config.scheduler.tick_interval());

    let result = loop {
        interval.tick().await;

        if let Err(e) = reactor.tick() {
            break Err(anyhow::Error::new(e).context("Connection test failed"));
        }
        if reactor.is_ready() {
            info!(elapsed = ?started.elapsed(), "Connection test successful!");
            break Ok(());
        }
        if started.elapsed() >= TEST_TIMEOUT {
            break Err(anyhow::anyhow!(
                "Session not ready after {:?}",
                TEST_TIMEOUT
            ));
        }
    };

    reactor.stop();
    if let Err(e) = &result {
        error!(error = %e, "Connection test failed");
    }
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
