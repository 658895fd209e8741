//! HEC forwarder binary: reads NDJSON records and delivers them in batches

use clap::Parser;
use hec_forwarder::source::RecordReader;
use hec_forwarder::{DeliveryResult, HecConfig, HecForwarder, Result};
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Forward newline-delimited JSON records to a Splunk HTTP Event Collector.
///
/// Collector options are read from `HEC_*` environment variables.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// NDJSON input file; reads stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Records per delivery cycle
    #[arg(short, long, env = "HEC_BATCH_SIZE", default_value_t = 100)]
    batch_size: usize,

    /// Check collector health and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    initialize_tracing();

    let args = Args::parse();

    info!("Starting HEC forwarder v{}", env!("CARGO_PKG_VERSION"));

    let forwarder = match HecConfig::from_env().and_then(HecForwarder::new) {
        Ok(forwarder) => forwarder,
        Err(e) => {
            error!("Failed to start HEC forwarder: {}", e);
            std::process::exit(1);
        }
    };

    if args.check {
        let healthy = forwarder.client().test_connectivity().await;
        std::process::exit(if healthy { 0 } else { 1 });
    }

    let input: Box<dyn AsyncBufRead + Unpin + Send> = match &args.input {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown requested, stopping after current batch");
            shutdown.cancel();
        }
    });

    let mut reader = RecordReader::new(input, args.batch_size);
    let mut delivered = 0usize;
    let mut failed = 0usize;

    loop {
        let Some(batch) = reader.next_batch_until(&cancel).await? else {
            break;
        };

        match forwarder.deliver_with_cancel(&batch, &cancel).await {
            DeliveryResult::Delivered => delivered += 1,
            DeliveryResult::DeliveredUnconfirmed => {
                warn!("Batch of {} records delivered without confirmation", batch.len());
                delivered += 1;
            }
            DeliveryResult::Failed(e) => {
                error!("Batch of {} records failed: {}", batch.len(), e);
                failed += 1;
            }
        }
    }

    if cancel.is_cancelled() {
        warn!("Forwarding interrupted - delivered: {} batches, failed: {} batches", delivered, failed);
        // The stdin reader thread stays blocked on input and would hold up runtime shutdown.
        std::process::exit(130);
    }

    info!("Forwarding finished - delivered: {} batches, failed: {} batches", delivered, failed);

    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

/// Initialize structured logging
fn initialize_tracing() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .json();

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
