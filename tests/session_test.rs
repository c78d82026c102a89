//! Integration tests for scanning sessions end to end

use product_scan::domain::{RawDetection, ScanDecision, SessionPhase, SymbolFormat};
use product_scan::infra::{Config, LookupFailurePolicy};
use product_scan::io::{
    create_event_channel, forward_detection_lines, ChannelSource, KnownValidLookup, KnownValidTable,
    SessionEvent,
};
use product_scan::services::{Classifier, ScanRunner, ScanSession, TickOutcome};
use std::io::Write;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::BufReader;
use tokio::sync::{mpsc, watch};

fn load_table() -> KnownValidTable {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file
        .write_all(
            br#"
[codes]
"12345678901234" = ["SERIAL123", "SERIAL456"]
"98765432109876" = ["TEST789", "TEST012"]
"#,
        )
        .unwrap();
    temp_file.flush().unwrap();
    KnownValidTable::from_file(temp_file.path()).unwrap()
}

#[tokio::test]
async fn test_smartlink_and_retail_barcode_confirm() {
    let table = load_table();
    let mut session = ScanSession::new(Arc::new(Classifier::default()), NonZeroU32::new(3).unwrap());
    session.start();

    // GTIN from an EAN-13-style value, serial from a bare unclassified read
    session.ingest(&[
        RawDetection::new("98765432109876").with_format(SymbolFormat::Ean13),
        RawDetection::new("TEST012"),
    ]);

    let outcome = session.batch_tick(&table, LookupFailurePolicy::NoMatch).await;

    assert_eq!(
        outcome,
        TickOutcome::Finished(ScanDecision::Confirmed {
            code: "019876543210987621TEST012".to_string(),
            gtin: "98765432109876".to_string(),
            serial: "TEST012".to_string(),
        })
    );
}

#[tokio::test]
async fn test_retry_then_confirm_when_serial_arrives_late() {
    let table = load_table();
    let mut session = ScanSession::new(Arc::new(Classifier::default()), NonZeroU32::new(3).unwrap());
    session.start();

    session.ingest(&[RawDetection::new("https://transparency.com/01/12345678901234")]);
    let outcome = session.batch_tick(&table, LookupFailurePolicy::NoMatch).await;
    assert_eq!(outcome, TickOutcome::Retry { attempts: 1 });

    session.ingest(&[RawDetection::new("011234567890123421SERIAL456")]);
    let outcome = session.batch_tick(&table, LookupFailurePolicy::NoMatch).await;

    assert!(matches!(
        outcome,
        TickOutcome::Finished(ScanDecision::Confirmed { ref serial, .. }) if serial == "SERIAL456"
    ));
    assert_eq!(session.phase(), SessionPhase::Confirmed);
}

#[tokio::test(start_paused = true)]
async fn test_line_input_drives_runner_to_decision() {
    let config = Config::default()
        .with_intervals(Duration::from_millis(100), Duration::from_millis(1000))
        .with_max_attempts(NonZeroU32::new(2).unwrap());
    let lookup: Arc<dyn KnownValidLookup> = Arc::new(load_table());

    let input = b"qr_code\thttps://www.amazon.com/01/98765432109876/21/TEST789\n".to_vec();
    let (detection_tx, detection_rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let forwarded = forward_detection_lines(BufReader::new(&input[..]), detection_tx, shutdown_rx).await;
    assert_eq!(forwarded, 1);

    let (events, mut event_rx) = create_event_channel(config.event_capacity());
    let runner = ScanRunner::new(&config, Arc::new(Classifier::from_config(&config)), lookup, events);
    let mut handle = runner.spawn(Box::new(ChannelSource::new(detection_rx)));

    let decision = handle.join().await;

    assert_eq!(
        decision,
        Some(ScanDecision::Confirmed {
            code: "019876543210987621TEST789".to_string(),
            gtin: "98765432109876".to_string(),
            serial: "TEST789".to_string(),
        })
    );

    let mut events = Vec::new();
    while let Some(event) = event_rx.recv().await {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(SessionEvent::Progress(_))));
    assert!(matches!(events.last(), Some(SessionEvent::Finished { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_codes_time_out() {
    let config = Config::default()
        .with_intervals(Duration::from_millis(100), Duration::from_millis(500))
        .with_max_attempts(NonZeroU32::new(2).unwrap());
    let lookup: Arc<dyn KnownValidLookup> = Arc::new(load_table());

    let (detection_tx, detection_rx) = mpsc::channel(16);
    detection_tx.send(RawDetection::new("AZ:ABCDEFGHIJ0123456789ABCDEF")).await.unwrap();
    detection_tx.send(RawDetection::new("https://evil.example/01/12345678901234")).await.unwrap();

    let (events, _event_rx) = create_event_channel(config.event_capacity());
    let runner = ScanRunner::new(&config, Arc::new(Classifier::default()), lookup, events);
    let mut handle = runner.spawn(Box::new(ChannelSource::new(detection_rx)));

    let decision = handle.join().await;

    assert_eq!(
        decision,
        Some(ScanDecision::TimedOut {
            gtins: vec![],
            unknown_codes: vec![
                "AZ:ABCDEFGHIJ0123456789ABCDEF".to_string(),
                "https://evil.example/01/12345678901234".to_string(),
            ],
        })
    );
    drop(detection_tx);
}
