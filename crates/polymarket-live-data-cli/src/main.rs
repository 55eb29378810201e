/*
[INPUT]:  CLI arguments, YAML configuration file, OS shutdown signals
[OUTPUT]: A live data connection logging every event until shutdown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use polymarket_live_data::LiveDataClient;
use polymarket_live_data_cli::{parse_subscription, LogPrinter, RunnerConfig};

#[derive(Parser, Debug)]
#[command(name = "polymarket-live-data", version, about = "Polymarket live data stream runner")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: Option<PathBuf>,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    /// Extra subscription as topic:type[:filters]; repeatable
    #[arg(long = "subscribe", value_name = "TOPIC:TYPE")]
    subscribe: Vec<String>,
    #[arg(long = "dry-run")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    info!(
        config_path = ?args.config_path,
        dry_run = args.dry_run,
        "starting polymarket-live-data"
    );

    let mut config = match &args.config_path {
        Some(path) => load_config(path)?,
        None => RunnerConfig::default(),
    };
    for arg in &args.subscribe {
        config.subscriptions.push(parse_subscription(arg)?);
    }
    if config.subscriptions.is_empty() {
        bail!("no subscriptions configured; pass --subscribe or a config file");
    }
    info!(
        host = %config.client.host,
        subscription_count = config.subscriptions.len(),
        "configuration loaded"
    );

    if args.dry_run {
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let client = LiveDataClient::new(config.client, LogPrinter::new()).context("create client")?;
    client
        .subscribe(config.subscriptions)
        .context("register subscriptions")?;

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    client.connect().context("start client")?;

    tokio::select! {
        _ = shutdown.cancelled() => {
            info!("shutdown signal received");
            client.disconnect().await;
            info!("client shutdown complete");
        }
        termination = client.closed() => {
            if let Some(termination) = termination {
                warn!(cause = %termination.cause, "client stopped on its own");
                bail!("connection ended: {}", termination.cause);
            }
        }
    }

    Ok(())
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

fn load_config(path: &PathBuf) -> Result<RunnerConfig> {
    let path_str = path
        .to_str()
        .context("config path must be valid utf-8")?;
    RunnerConfig::from_file(path_str).context("load config")
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
