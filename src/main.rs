//! Netpulse Binary Entry Point
//!
//! Runs the sampling engine and writes every event to stdout.
//! Core functionality is provided by the `netpulse` library crate.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use netpulse::{
    AppConfig, Event, EventSink, LogSink, Scheduler,
    dispatch::{ChannelSink, DEFAULT_CHANNEL_CAPACITY},
};
use tokio::sync::mpsc::Receiver;
use tokio::sync::oneshot;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Event output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One JSON document per line on stdout.
    Json,
    /// Structured log lines.
    Log,
}

/// Netpulse - Network Telemetry Sampling Engine
#[derive(Parser, Debug)]
#[command(name = "netpulse", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (built-in defaults when omitted)
    #[arg(short, long, env = "NETPULSE_CONFIG")]
    config: Option<PathBuf>,

    /// Event output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    output: OutputFormat,

    /// Bandwidth API credential (overrides config file)
    #[arg(long, env = "BANDWIDTH_CALCULATION_API_KEY", hide_env_values = true)]
    bandwidth_token: Option<String>,

    /// Capacity of the event channel
    #[arg(long, default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    channel_capacity: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,netpulse=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Netpulse - Network Telemetry Sampling Engine");
    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading configuration");
            AppConfig::load(path)?
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            AppConfig::default()
        }
    };
    if let Some(token) = cli.bandwidth_token {
        config = config.with_bandwidth_token(token);
    }

    let specs = config.to_specs()?;
    let (sink, events) = ChannelSink::new(cli.channel_capacity);
    let handle = Scheduler::start(specs, Arc::new(sink))?;

    for probe in handle.probes() {
        tracing::info!(
            metric = %probe.metric,
            channel = probe.metric.channel(),
            period = %humantime::format_duration(probe.period),
            overlap = ?probe.overlap,
            substitutes_on_failure = probe.substitutes_on_failure,
            "Probe running"
        );
    }
    tracing::info!("Press Ctrl+C to shutdown");

    let output = cli.output;
    let (drain_tx, drain_rx) = oneshot::channel();
    let consumer = tokio::spawn(consume(events, drain_rx, move |e| write_event(e, output)));

    shutdown_signal().await;

    tracing::info!("Stopping scheduler...");
    handle.stop().await;
    let _ = drain_tx.send(());
    match consumer.await {
        Ok(written) => tracing::info!(events = written, "Event output finished"),
        Err(e) => tracing::warn!(error = %e, "Event consumer ended abnormally"),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn write_event(event: Event, output: OutputFormat) {
    match output {
        OutputFormat::Json => println!("{}", event.to_json()),
        OutputFormat::Log => LogSink.emit(event),
    }
}

/// Write events until the channel closes or `drain` fires.
///
/// On `drain`, events already buffered are written before returning.
/// Returns the number of events written.
async fn consume(
    mut events: Receiver<Event>,
    mut drain: oneshot::Receiver<()>,
    mut write: impl FnMut(Event),
) -> u64 {
    let mut written = 0;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    write(event);
                    written += 1;
                }
                None => return written,
            },
            _ = &mut drain => break,
        }
    }

    while let Ok(event) = events.try_recv() {
        write(event);
        written += 1;
    }
    written
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netpulse::probe::{Measurement, Metric};

    fn event(metric: Metric) -> Event {
        Event::new(Measurement::zero(metric))
    }

    #[tokio::test]
    async fn test_consume_drains_buffered_events() {
        let (sink, events) = ChannelSink::new(8);
        let (drain_tx, drain_rx) = oneshot::channel();

        // Buffered before the consumer ever runs.
        sink.emit(event(Metric::NetworkStats));
        sink.emit(event(Metric::PacketLoss));
        sink.emit(event(Metric::Bandwidth));
        drain_tx.send(()).unwrap();

        let mut seen = Vec::new();
        let written = consume(events, drain_rx, |e| seen.push(e.metric())).await;

        assert_eq!(written, 3);
        assert_eq!(
            seen,
            vec![Metric::NetworkStats, Metric::PacketLoss, Metric::Bandwidth]
        );
    }

    #[tokio::test]
    async fn test_consume_stops_when_channel_closes() {
        let (sink, events) = ChannelSink::new(8);
        let (_drain_tx, drain_rx) = oneshot::channel();
        sink.emit(event(Metric::JitterLatency));
        drop(sink);

        let written = consume(events, drain_rx, |_| {}).await;
        assert_eq!(written, 1);
    }
}
