// # syslogd - Syslog Collector Daemon
//
// CRITICAL RULES:
// - This is a THIN integration layer ONLY
// - DO NOT add decoding, routing or buffering logic here
// - All collector logic MUST be in syslog-core
// - Configuration is via environment variables plus the handler file
//
// The syslogd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Loading the handler file
// 3. Registering parser and storer modules
// 4. Starting the receiver (and the optional console feed)
// 5. Stopping cleanly on SIGTERM/SIGINT, with a final flush
//
// ## Configuration
//
// ### Listener
// - `SYSLOG_LISTEN_ADDRESS`: IPv4 address to bind, or `any` (default: any)
// - `SYSLOG_LISTEN_PORT`: UDP port (default: 514)
// - `SYSLOG_FLUSH_INTERVAL_SECS`: Seconds between buffer flushes (default: 30)
//
// ### Handlers
// - `SYSLOG_HANDLERS_FILE`: Path to the JSON handler list (optional; without it
//   messages are only published to monitors)
//
// ### Monitoring
// - `SYSLOG_CONSOLE_ADDR`: TCP address for the JSON-lines console feed (optional)
//
// ### Logging
// - `SYSLOG_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//
// ## Example
//
// ```bash
// export SYSLOG_LISTEN_PORT=5514
// export SYSLOG_HANDLERS_FILE=/etc/syslogd/handlers.json
// export SYSLOG_CONSOLE_ADDR=127.0.0.1:5515
//
// syslogd
// ```

mod console;

use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use syslog_core::config::{self, CollectorConfig, ListenerConfig};
use syslog_core::{ModuleRegistry, Receiver};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Upper bound on the final flush during shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum SyslogExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<SyslogExitCode> for ExitCode {
    fn from(code: SyslogExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    listen_address: String,
    listen_port: u16,
    flush_interval_secs: i64,
    handlers_file: Option<PathBuf>,
    console_addr: Option<SocketAddr>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through a variable lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let listen_port = match lookup("SYSLOG_LISTEN_PORT") {
            Some(port) => port
                .trim()
                .parse()
                .with_context(|| format!("SYSLOG_LISTEN_PORT '{}' is not a valid port", port))?,
            None => config::DEFAULT_PORT,
        };

        let flush_interval_secs = match lookup("SYSLOG_FLUSH_INTERVAL_SECS") {
            Some(secs) => secs.trim().parse().with_context(|| {
                format!("SYSLOG_FLUSH_INTERVAL_SECS '{}' is not a number", secs)
            })?,
            None => config::DEFAULT_FLUSH_INTERVAL_SECS,
        };

        let console_addr = lookup("SYSLOG_CONSOLE_ADDR")
            .filter(|s| !s.trim().is_empty())
            .map(|addr| {
                addr.trim().parse().with_context(|| {
                    format!("SYSLOG_CONSOLE_ADDR '{}' is not a socket address", addr)
                })
            })
            .transpose()?;

        Ok(Self {
            listen_address: lookup("SYSLOG_LISTEN_ADDRESS").unwrap_or_else(|| "any".to_string()),
            listen_port,
            flush_interval_secs,
            handlers_file: lookup("SYSLOG_HANDLERS_FILE")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            console_addr,
            log_level: lookup("SYSLOG_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "SYSLOG_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        if self.flush_interval_secs <= 0 {
            eprintln!(
                "WARNING: SYSLOG_FLUSH_INTERVAL_SECS={} is not positive, using {}s",
                self.flush_interval_secs,
                config::DEFAULT_FLUSH_INTERVAL_SECS
            );
        }

        self.listener()
            .validate()
            .context("SYSLOG_LISTEN_ADDRESS must be an IPv4 address or \"any\"")?;

        if let Some(path) = &self.handlers_file
            && !path.is_file()
        {
            anyhow::bail!("SYSLOG_HANDLERS_FILE does not exist: {}", path.display());
        }

        Ok(())
    }

    fn listener(&self) -> ListenerConfig {
        ListenerConfig::new(self.listen_address.trim(), self.listen_port)
            .with_flush_interval_secs(self.flush_interval_secs)
    }

    /// Build the collector configuration, loading the handler file
    fn collector(&self) -> Result<CollectorConfig> {
        let handlers = match &self.handlers_file {
            Some(path) => config::load_handlers(path)?,
            None => Vec::new(),
        };

        let collector = CollectorConfig {
            listener: self.listener(),
            handlers,
        };
        collector.validate()?;
        Ok(collector)
    }

    fn tracing_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return SyslogExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return SyslogExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.tracing_level())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SyslogExitCode::ConfigError.into();
    }

    info!("Starting syslogd daemon");

    let collector = match config.collector() {
        Ok(collector) => collector,
        Err(e) => {
            error!("Failed to load handlers: {:#}", e);
            return SyslogExitCode::ConfigError.into();
        }
    };
    info!("Configuration loaded: {} handler(s)", collector.handlers.len());

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SyslogExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let daemon = match Daemon::start(collector, config.console_addr).await {
            Ok(daemon) => daemon,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return SyslogExitCode::ConfigError;
            }
        };

        if let Err(e) = daemon.run().await {
            error!("Daemon error: {:#}", e);
            SyslogExitCode::RuntimeError
        } else {
            SyslogExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Running daemon components
struct Daemon {
    receiver: Receiver,
    console_shutdown: Option<watch::Sender<bool>>,
}

impl Daemon {
    /// Register modules, bind sockets and start receiving
    async fn start(collector: CollectorConfig, console_addr: Option<SocketAddr>) -> Result<Self> {
        let registry = ModuleRegistry::new();

        #[cfg(feature = "generic")]
        {
            info!("Registering generic modules");
            syslog_module_generic::register(&registry);
        }

        for handler in &collector.handlers {
            if let Some(parser) = &handler.parser
                && !registry.has_parser(parser)
            {
                warn!("Handler {} uses unknown parser '{}'", handler.id, parser);
            }
            if let Some(storer) = &handler.storer
                && !registry.has_storer(storer)
            {
                warn!("Handler {} uses unknown storer '{}'", handler.id, storer);
            }
        }

        let mut receiver = Receiver::new(collector, Arc::new(registry));
        receiver.start().await?;

        let console_shutdown = match console_addr {
            Some(addr) => {
                let listener = match TcpListener::bind(addr).await {
                    Ok(listener) => listener,
                    Err(e) => {
                        receiver.stop().await;
                        anyhow::bail!("Failed to bind console feed {}: {}", addr, e);
                    }
                };
                info!("Console feed listening on {}", addr);

                let (tx, rx) = watch::channel(false);
                tokio::spawn(console::serve(listener, Arc::clone(receiver.bus()), rx));
                Some(tx)
            }
            None => None,
        };

        Ok(Self {
            receiver,
            console_shutdown,
        })
    }

    /// Run until a shutdown signal, then stop with a final flush
    async fn run(mut self) -> Result<()> {
        info!("Daemon initialized successfully");

        let signal = wait_for_shutdown().await?;
        info!("Received shutdown signal: {}", signal);
        info!("Shutting down daemon");

        if let Some(tx) = self.console_shutdown.take() {
            let _ = tx.send(true);
        }

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.receiver.stop()).await {
            Ok(report) => {
                info!(
                    "Final flush stored {} records in {} batches",
                    report.records_stored, report.batches_stored
                );
                if report.batches_dropped > 0 {
                    warn!("Final flush dropped {} records", report.records_dropped);
                }
                Ok(())
            }
            Err(_) => Err(anyhow::anyhow!(
                "Final flush did not finish within {:?}",
                SHUTDOWN_TIMEOUT
            )),
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for CTRL-C")?;
    Ok("SIGINT")
}
