//! product-scan - classify product codes and run batch scanning sessions
//!
//! Module structure:
//! - `domain/` - Code types, GS1 grammar, session state
//! - `io/` - Detection sources, known-valid lookup, session events
//! - `services/` - Classifier, aggregator, session runner
//! - `infra/` - Config, metrics

use clap::{Parser, Subcommand};
use product_scan::domain::{ClassifiedCode, ExtractedIdentity, RawDetection};
use product_scan::infra::{Config, ScanMetrics};
use product_scan::io::{
    create_event_channel, forward_detection_lines, parse_detection_line, ChannelSource,
    KnownValidLookup, KnownValidTable,
};
use product_scan::services::{first_valid_code, product_link, Classifier, ScanRunner};
use serde::Serialize;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// product-scan - GS1 product code classification and scanning sessions
#[derive(Parser, Debug)]
#[command(name = "product-scan", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify codes given as arguments, or one per stdin line
    Classify {
        codes: Vec<String>,
    },
    /// Pick the first valid code from one image's detections and print its product link
    Link {
        /// Detections as `<format>\t<value>` or bare values; stdin if omitted
        detections: Vec<String>,
    },
    /// Run one scanning session over detections read from stdin
    Scan,
}

#[derive(Serialize)]
struct ClassifyOutput<'a> {
    #[serde(flatten)]
    classified: &'a ClassifiedCode,
    gtin: Option<String>,
    serial: Option<String>,
}

#[derive(Serialize)]
struct LinkOutput<'a> {
    #[serde(flatten)]
    classified: &'a ClassifiedCode,
    link: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries JSON output
    // Default: INFO, use RUST_LOG=debug for per-detection events
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::load(args.config.as_deref());

    info!(
        config_file = %config.config_file(),
        sample_interval_ms = %config.sample_interval_ms(),
        batch_interval_ms = %config.batch_interval_ms(),
        max_attempts = %config.max_attempts(),
        smartlink_domains = ?config.smartlink_domains(),
        lookup_table_file = %config.lookup_table_file(),
        lookup_failure_policy = %config.lookup_failure_policy().as_str(),
        "config_loaded"
    );

    let classifier = Classifier::from_config(&config);

    match args.command {
        Command::Classify { codes } => {
            let codes = if codes.is_empty() { read_stdin_lines().await? } else { codes };
            for raw in codes {
                let classified = classifier.classify(&raw);
                let identity = ExtractedIdentity::from_code(&classified);
                let output = ClassifyOutput {
                    classified: &classified,
                    gtin: identity.gtin,
                    serial: identity.serial,
                };
                println!("{}", serde_json::to_string(&output)?);
            }
            Ok(())
        }
        Command::Link { detections } => {
            let lines = if detections.is_empty() { read_stdin_lines().await? } else { detections };
            let detections: Vec<RawDetection> =
                lines.iter().filter_map(|line| parse_detection_line(line)).collect();

            match first_valid_code(&classifier, &detections) {
                Some(classified) => {
                    let output = LinkOutput { link: product_link(&classified.code), classified: &classified };
                    println!("{}", serde_json::to_string(&output)?);
                    Ok(())
                }
                None => anyhow::bail!("no valid code among {} detections", detections.len()),
            }
        }
        Command::Scan => {
            run_scan(config, classifier).await?;
            // Stdin reads hold a blocking thread that runtime shutdown would wait on
            std::process::exit(0);
        }
    }
}

async fn read_stdin_lines() -> anyhow::Result<Vec<String>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = Vec::new();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if !line.is_empty() {
            out.push(line.to_string());
        }
    }
    Ok(out)
}

async fn run_scan(config: Config, classifier: Classifier) -> anyhow::Result<()> {
    let lookup: Arc<dyn KnownValidLookup> = match KnownValidTable::from_file(config.lookup_table_file()) {
        Ok(table) => Arc::new(table),
        Err(e) => {
            warn!(error = %format!("{:#}", e), "known_valid_table_unavailable: using empty table");
            Arc::new(KnownValidTable::new())
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(ScanMetrics::new());

    // Metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Stdin reader feeding the detection channel
    let (detection_tx, detection_rx) = mpsc::channel(1024);
    let reader_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        forward_detection_lines(BufReader::new(tokio::io::stdin()), detection_tx, reader_shutdown).await;
    });

    // Event printer (ends when the runner drops its sender)
    let (events, mut event_rx) = create_event_channel(config.event_capacity());
    let events = events.with_metrics(metrics.clone());
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!(error = %e, "event_serialize_failed"),
            }
        }
    });

    let runner = ScanRunner::new(&config, Arc::new(classifier), lookup, events).with_metrics(metrics.clone());
    let mut handle = runner.spawn(Box::new(ChannelSource::new(detection_rx)));

    let finished = tokio::select! {
        decision = handle.join() => Some(decision),
        _ = tokio::signal::ctrl_c() => None,
    };
    let decision = match finished {
        Some(decision) => decision,
        None => {
            info!("shutdown_signal_received");
            handle.stop_and_join().await
        }
    };

    let _ = shutdown_tx.send(true);
    let _ = printer.await;
    metrics.report().log();

    match decision {
        Some(decision) => info!(outcome = %decision.as_str(), "product-scan session complete"),
        None => info!("product-scan session stopped"),
    }
    Ok(())
}
