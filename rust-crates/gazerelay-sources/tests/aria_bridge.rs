use gazerelay_blink::BlinkState;
use gazerelay_broadcaster::{RelayBroadcaster, StreamHub, TelemetryEvent};
use gazerelay_sources::{AriaConfig, AriaSource, SourceError, SourceWorker, TcpGazeBridge, WorkerConfig};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::time::Duration;

#[tokio::test]
async fn test_bridge_streams_records_until_closed() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let streamer = std::thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        let mut hello = String::new();
        BufReader::new(socket.try_clone().unwrap())
            .read_line(&mut hello)
            .unwrap();

        let lines = [
            r#"{"tracking_timestamp": 1.0, "yaw": 0.0, "pitch": 0.0, "depth": 0.6}"#,
            "not json",
            r#"{"tracking_timestamp": 2.0, "yaw": 0.2, "pitch": 0.1, "depth": 0.0}"#,
            r#"{"tracking_timestamp": 3.0, "yaw": -0.2, "pitch": -0.1, "depth": 0.6}"#,
        ];
        for line in lines {
            writeln!(socket, "{}", line).unwrap();
        }
        hello
    });

    let config = AriaConfig {
        device_id: Some("aria-test".to_string()),
        hold_ms: 0.0,
        depth_ema_alpha: 0.0,
        ..Default::default()
    };
    let source = AriaSource::new(TcpGazeBridge::new(addr.to_string()), config).unwrap();

    let hub = StreamHub::new(64);
    let (broadcaster, drain) = RelayBroadcaster::spawn(hub.clone());
    let worker_config = WorkerConfig {
        poll_timeout: Duration::from_millis(20),
        ..Default::default()
    };

    let mut worker = SourceWorker::start(source, broadcaster, worker_config).await.unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), worker.result())
        .await
        .unwrap();
    // The streamer hanging up ends the session
    assert!(matches!(outcome, Err(SourceError::Connection(_))));
    worker.stop().await.unwrap();

    let hello = streamer.join().unwrap();
    assert!(hello.contains("aria-test"));

    drain.await.unwrap();
    let history = hub.history();
    let samples = history
        .iter()
        .filter(|e| matches!(e, TelemetryEvent::Sample { .. }))
        .count();
    assert_eq!(samples, 3);

    let blinks: Vec<BlinkState> = history
        .iter()
        .filter_map(|e| match e {
            TelemetryEvent::Blink(b) => Some(b.state),
            _ => None,
        })
        .collect();
    assert_eq!(blinks, vec![BlinkState::Closed, BlinkState::Open]);
}

#[tokio::test]
async fn test_unreachable_bridge_fails_start() {
    // Bind then drop to get a port with nothing listening
    let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();

    let config = AriaConfig {
        device_id: Some("aria-test".to_string()),
        ..Default::default()
    };
    let source = AriaSource::new(TcpGazeBridge::new(addr.to_string()), config).unwrap();
    let (broadcaster, _receiver) = RelayBroadcaster::channel();

    let result = SourceWorker::start(source, broadcaster, WorkerConfig::default()).await;
    assert!(matches!(result, Err(SourceError::Connection(_))));
}
