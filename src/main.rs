// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use crate::config::Config;
use crate::diagnostics::LogSink;
use crate::edid::SignatureToken;
use crate::matcher::{Directive, match_signature};
use crate::notify::Notifier;
use crate::peripherals::Peripherals;
use crate::randr::{OutputQuery, Xrandr};
use crate::reconciler::{DisplayEngine, Reconciler};

#[macro_use]
extern crate tracing;

mod command;
mod config;
mod diagnostics;
mod edid;
mod error;
mod hotplug;
mod matcher;
mod notify;
mod peripherals;
mod randr;
mod reconciler;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Configuration file [default: $XDG_CONFIG_HOME/hotplug-brain/config.json]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Cmd {
    /// React to hotplug events (default)
    Run,
    /// Print the signature tokens of the connected outputs
    Signature,
    /// Show which display configuration matches, without applying it
    Match {
        /// Match this comma-separated signature instead of the connected outputs
        #[arg(long)]
        signature: Option<String>,
    },
}

fn setup_logs(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let level = if verbose { "debug" } else { "info" };
    let fmt_layer = fmt::layer().with_target(false);
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new(format!(
        "{level},{}={level}",
        env!("CARGO_CRATE_NAME")
    )));

    if let Ok(journal_layer) = tracing_journald::layer() {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .with(journal_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let path = match path {
        Some(path) => path,
        None => Config::default_path()?,
    };
    if !path.exists() {
        warn!("No configuration at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    Config::load(&path).with_context(|| format!("loading {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logs(cli.verbose);

    let config = load_config(cli.config)?;
    match cli.command.unwrap_or(Cmd::Run) {
        Cmd::Run => run(config).await,
        Cmd::Signature => print_signature(),
        Cmd::Match { signature } => print_match(config, signature.as_deref()),
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let notifier = Notifier::new(config.notification_timeout());
    debug!("Desktop notifications enabled: {}", notifier.is_enabled());
    let settle = config.settle_delay();

    let display = match config.display {
        Some(table) if !table.is_empty() => Some(DisplayEngine::new(
            Arc::new(Xrandr),
            Arc::new(Xrandr),
            table,
        )),
        _ => {
            info!("No display configurations, display hotplug is not handled");
            None
        }
    };
    let peripherals = Peripherals::new(config.keyboard, config.usb, notifier.clone());
    let reconciler = Reconciler::new(
        display,
        Arc::new(peripherals),
        Arc::new(LogSink::new(notifier)),
        settle,
    );

    let events = hotplug::spawn_listener().context("starting the udev monitor thread")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    info!("Waiting for hotplug events");
    reconciler
        .run(events, shutdown_rx)
        .await
        .context("hotplug event stream failed")
}

async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = interrupt => {}
        () = terminate => {}
    }
}

fn print_signature() -> anyhow::Result<()> {
    let outputs = Xrandr.list_outputs().context("querying outputs")?;
    for token in randr::live_signature(&outputs) {
        println!("{token}");
    }
    Ok(())
}

fn print_match(config: Config, signature: Option<&str>) -> anyhow::Result<()> {
    let Some(table) = config.display else {
        bail!("no display configurations");
    };

    if let Some(signature) = signature {
        let live = signature
            .split(',')
            .filter(|token| !token.is_empty())
            .map(|token| {
                SignatureToken::parse(token.trim())
                    .with_context(|| format!("'{token}' is not a connector=identity token"))
            })
            .collect::<anyhow::Result<BTreeSet<_>>>()?;
        let outcome = match_signature(&live, &table);
        match outcome.matched {
            Some((mode, directives)) => print_plan(&mode, &directives),
            None => println!("no match for {}", outcome.signature),
        }
        return Ok(());
    }

    let engine = DisplayEngine::new(Arc::new(Xrandr), Arc::new(Xrandr), table);
    let selection = engine.select().context("querying outputs")?;
    match selection.plan() {
        Some((mode, plan)) => print_plan(mode, &plan),
        None => println!("no match for {}", selection.outcome.signature),
    }
    Ok(())
}

fn print_plan(mode: &str, directives: &[Directive]) {
    println!("{mode}");
    for directive in directives {
        println!("  {directive}");
    }
}
