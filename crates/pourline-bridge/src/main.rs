mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use pourline_client::HttpOrderApi;
use pourline_core::{select_backend, Bridge};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser)]
#[command(
    name = "pourline",
    about = "Dispense confirmed kiosk orders through the valve bank",
    version
)]
struct Cli {
    /// YAML config file (default: ./pourline.yaml when present)
    #[arg(long, short = 'c', env = "POURLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Order API base URL, e.g. https://kiosk.example.com/api
    #[arg(long, env = "POURLINE_API_BASE")]
    api_base: Option<String>,

    /// Force the simulation backend even when GPIO is present
    #[arg(long)]
    simulate: bool,

    /// Emit one JSON object per log line
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    print_config: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(json: bool) {
    let filter =
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(cli: Cli) -> Result<()> {
    let overrides = settings::Overrides {
        config: cli.config,
        api_base: cli.api_base,
        simulate: cli.simulate,
    };
    let cwd = std::env::current_dir()?;
    let config = settings::resolve(&overrides, &cwd)?;

    if cli.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    tracing::info!("Hardware Bridge starting...");
    settings::log_effective(&config);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let api = Arc::new(HttpOrderApi::new(&config.api)?);
        let actuator = select_backend(&config.hardware)?;

        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            wait_for_signal().await;
            let _ = tx.send(true);
        });

        let stats = Bridge::new(config, api, actuator)
            .run(rx)
            .await
            .context("bridge stopped before polling")?;
        tracing::info!(orders = stats.orders_dispatched(), "bridge stopped");
        Ok::<(), anyhow::Error>(())
    })
}

/// Resolves on Ctrl-C or SIGTERM. If no handler can be installed it never
/// resolves, leaving the loop running.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutting down... current order will finish first");
}
