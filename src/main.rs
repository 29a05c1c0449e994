//! chainmux: whitelisted multiplexing proxy
//!
//! This is the main entry point for the chainmux binary. It handles CLI
//! argument parsing, logging initialization, the initial whitelist load,
//! and runs the proxy until interrupted.
//!
//! # Signals
//!
//! - **SIGHUP**: re-read the whitelist file (same as the reload endpoint)
//! - **SIGINT**: stop accepting connections and exit

use anyhow::{Context, Result};
use chainmux::{
    cli::Cli,
    proxy::ProxyServerBuilder,
    rules::RuleStore,
    telemetry::{AuditEvent, AuditLogger},
};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before any other initialization)
    let cli = Cli::parse();

    init_tracing(cli.verbose)?;

    debug!("Parsed CLI arguments: {:?}", cli);

    let audit = if cli.syslog {
        Arc::new(AuditLogger::syslog().context("Failed to connect to syslog")?)
    } else {
        Arc::new(AuditLogger::new())
    };

    // A whitelist that cannot be read at startup is fatal
    let rules = Arc::new(RuleStore::with_source(cli.conf.clone()));
    let count = rules
        .reload()
        .await
        .with_context(|| format!("Failed to load whitelist {}", cli.conf.display()))?;
    audit.log(AuditEvent::RulesReload { rules: count });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = ProxyServerBuilder::new(rules.clone())
        .listen_addr(cli.addr.as_str())
        .audit(audit.clone())
        .bind(shutdown_rx)
        .await
        .context("Failed to start proxy")?;

    info!("started PDX chainmux on {}", server.local_addr());

    spawn_reload_on_hangup(rules, audit)?;

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received interrupt, shutting down");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!("Failed to listen for interrupt: {}", e),
        }
    });

    server.run().await.context("Proxy failed")?;

    info!("shutdown PDX chainmux");
    Ok(())
}

/// Reload the whitelist every time the process receives SIGHUP.
#[cfg(unix)]
fn spawn_reload_on_hangup(rules: Arc<RuleStore>, audit: Arc<AuditLogger>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;

    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("reloading rewrite conf file");
            match rules.reload().await {
                Ok(count) => audit.log(AuditEvent::RulesReload { rules: count }),
                Err(e) => {
                    warn!("Reload failed, keeping previous rules: {}", e);
                    audit.log(AuditEvent::RulesReloadFailed {
                        reason: e.to_string(),
                    });
                }
            }
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(_rules: Arc<RuleStore>, _audit: Arc<AuditLogger>) -> Result<()> {
    Ok(())
}

/// Initialize the tracing subscriber.
///
/// # Verbosity Levels
/// - 0 (default): `RUST_LOG`, or info
/// - 1 (-v): Debug level
/// - 2+ (-vv): Trace level
fn init_tracing(verbose: u8) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}
