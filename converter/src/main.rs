use clap::{Arg, ArgMatches, Command};
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config_arg = Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .help("Sets a custom config file");

    let matches = Command::new("Shipments Converter")
        .version("1.0")
        .about("Converts CSV drops into a partitioned Parquet table registered in Trino")
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_parser(["text", "json"])
                .default_value("text")
                .global(true)
                .help("Log output format"),
        )
        .subcommand(
            Command::new("poll")
                .about("Watch the raw zone and convert new inputs until interrupted")
                .arg(config_arg.clone()),
        )
        .subcommand(
            Command::new("once")
                .about("Run a single poll cycle and exit")
                .arg(config_arg),
        )
        .get_matches();

    init_tracing(&matches);

    match matches.subcommand() {
        Some(("poll", poll_matches)) => {
            let config_path = config_path(poll_matches);
            info!(config = config_path, "Starting converter");

            let shutdown = CancellationToken::new();
            tokio::spawn(cancel_on_signal(shutdown.clone()));

            if let Err(e) = converter::run_converter(config_path, shutdown).await {
                error!(error = %e, "Converter error");
                process::exit(1);
            }
        }
        Some(("once", once_matches)) => {
            let config_path = config_path(once_matches);

            match converter::run_single_cycle(config_path).await {
                Ok(report) => println!(
                    "eligible={} converted={} skipped={} failed={} quarantined={}",
                    report.eligible,
                    report.converted,
                    report.skipped,
                    report.failed,
                    report.quarantined
                ),
                Err(e) => {
                    error!(error = %e, "Converter error");
                    process::exit(1);
                }
            }
        }
        _ => {
            eprintln!("No subcommand specified. Use --help for usage information.");
            process::exit(1);
        }
    }
}

fn config_path(matches: &ArgMatches) -> &str {
    matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .unwrap_or("config/converter.toml")
}

/// Uses `RUST_LOG` for filtering, defaulting to `info`.
fn init_tracing(matches: &ArgMatches) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if matches.get_one::<String>("log-format").map(String::as_str) == Some("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    shutdown_signal().await;
    shutdown.cancel();
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Failed to install signal handlers, falling back to Ctrl-C");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigint.recv() => info!(signal = "SIGINT", "Signal received"),
        _ = sigterm.recv() => info!(signal = "SIGTERM", "Signal received"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!(signal = "ctrl-c", "Signal received");
}
