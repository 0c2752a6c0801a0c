/// End-to-end diagnostics client tests.
///
/// A scripted connector hands the client one prepared byte stream per
/// connection attempt, so reconnects, malformed frames and oversized frames
/// can be driven deterministically. On POSIX one test also runs the client
/// against a real Unix domain socket.
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, Cursor, Read};
use std::sync::Arc;
use std::time::Duration;
use sysmon_ingest::config::DiagnosticsConfig;
use sysmon_ingest::diagnostics::frame::encode_frame;
use sysmon_ingest::diagnostics::{start_diagnostics, Connector, DiagnosticsEvent};

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Connector that serves queued byte streams, then refuses.
#[derive(Clone, Default)]
struct ScriptedConnector {
    streams: Arc<Mutex<VecDeque<Vec<u8>>>>,
    attempts: Arc<Mutex<usize>>,
}

impl ScriptedConnector {
    fn with_streams(streams: Vec<Vec<u8>>) -> Self {
        Self {
            streams: Arc::new(Mutex::new(streams.into())),
            attempts: Arc::default(),
        }
    }

    fn attempts(&self) -> usize {
        *self.attempts.lock()
    }
}

impl Connector for ScriptedConnector {
    fn endpoint(&self) -> &str {
        "scripted"
    }

    fn connect(&self, _timeout: Duration) -> io::Result<Box<dyn Read + Send>> {
        *self.attempts.lock() += 1;
        match self.streams.lock().pop_front() {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes))),
            None => Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
        }
    }
}

fn fast_config() -> DiagnosticsConfig {
    DiagnosticsConfig {
        reconnect_delay_ms: 10,
        max_frame_bytes: 4096,
        ..DiagnosticsConfig::default()
    }
}

fn message(seq: u32) -> Vec<u8> {
    encode_frame(format!(r#"{{"writeSequence": {seq}, "logs": ["tick {seq}"]}}"#).as_bytes())
}

fn next(rx: &Receiver<DiagnosticsEvent>) -> DiagnosticsEvent {
    rx.recv_timeout(Duration::from_secs(5))
        .expect("no diagnostics event within 5 s")
}

fn expect_snapshot(rx: &Receiver<DiagnosticsEvent>, seq: u32) {
    match next(rx) {
        DiagnosticsEvent::Snapshot(snap) => {
            assert_eq!(snap.write_sequence, seq);
            assert_eq!(snap.logs, vec![format!("tick {seq}")]);
        }
        other => panic!("expected snapshot {seq}, got {other:?}"),
    }
}

fn expect_disconnect(rx: &Receiver<DiagnosticsEvent>) -> String {
    match next(rx) {
        DiagnosticsEvent::Disconnected { reason } => reason,
        other => panic!("expected disconnect, got {other:?}"),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// A frame holding `{"a"` is dropped and the next frame on the same
/// connection is still delivered.
#[test]
fn malformed_frame_keeps_connection() {
    let mut stream = vec![0x04, 0x00, 0x00, 0x00, 0x7B, 0x22, 0x61, 0x22];
    stream.extend(message(2));
    let connector = ScriptedConnector::with_streams(vec![stream]);
    let handle = start_diagnostics(connector.clone(), &fast_config());

    assert_eq!(
        next(&handle.receiver),
        DiagnosticsEvent::Connected {
            endpoint: "scripted".into()
        }
    );
    expect_snapshot(&handle.receiver, 2);
    assert!(expect_disconnect(&handle.receiver).contains("stream error"));
    handle.stop();
}

#[test]
fn reconnects_after_end_of_stream() {
    let connector = ScriptedConnector::with_streams(vec![message(2), message(4)]);
    let handle = start_diagnostics(connector.clone(), &fast_config());

    assert!(matches!(next(&handle.receiver), DiagnosticsEvent::Connected { .. }));
    expect_snapshot(&handle.receiver, 2);
    expect_disconnect(&handle.receiver);

    assert!(matches!(next(&handle.receiver), DiagnosticsEvent::Connected { .. }));
    expect_snapshot(&handle.receiver, 4);
    expect_disconnect(&handle.receiver);

    handle.stop();
    assert!(connector.attempts() >= 2);
}

/// A length prefix above the limit drops the connection; frames after it on
/// the same stream are never read.
#[test]
fn oversized_frame_drops_connection() {
    let mut first = encode_frame(&vec![b' '; 8192]);
    first.extend(message(99));
    let connector = ScriptedConnector::with_streams(vec![first, message(4)]);
    let handle = start_diagnostics(connector, &fast_config());

    assert!(matches!(next(&handle.receiver), DiagnosticsEvent::Connected { .. }));
    assert!(expect_disconnect(&handle.receiver).contains("exceeds maximum"));

    assert!(matches!(next(&handle.receiver), DiagnosticsEvent::Connected { .. }));
    expect_snapshot(&handle.receiver, 4);
    handle.stop();
}

/// With a two-slot channel and a consumer that starts late, every frame is
/// still delivered, in order, followed by the disconnect.
#[test]
fn slow_consumer_receives_every_message_in_order() {
    let stream: Vec<u8> = (1..=5).flat_map(message).collect();
    let config = DiagnosticsConfig {
        channel_capacity: 2,
        ..fast_config()
    };
    let handle = start_diagnostics(ScriptedConnector::with_streams(vec![stream]), &config);
    std::thread::sleep(Duration::from_millis(300));

    assert!(matches!(next(&handle.receiver), DiagnosticsEvent::Connected { .. }));
    for seq in 1..=5 {
        expect_snapshot(&handle.receiver, seq);
    }
    expect_disconnect(&handle.receiver);
    handle.stop();
}

#[test]
fn dropping_the_handle_stops_reconnecting() {
    let connector = ScriptedConnector::default();
    let handle = start_diagnostics(connector.clone(), &fast_config());
    std::thread::sleep(Duration::from_millis(50));
    drop(handle);

    std::thread::sleep(Duration::from_millis(150));
    let settled = connector.attempts();
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(connector.attempts(), settled);
}

#[test]
fn stop_ends_the_client() {
    let connector = ScriptedConnector::default();
    let handle = start_diagnostics(connector.clone(), &fast_config());
    std::thread::sleep(Duration::from_millis(50));
    handle.stop();

    assert_eq!(
        handle.receiver.recv_timeout(Duration::from_secs(2)),
        Err(crossbeam_channel::RecvTimeoutError::Disconnected)
    );
    assert!(connector.attempts() >= 1);
}

#[cfg(unix)]
#[test]
fn reads_frames_from_unix_socket() {
    use std::io::Write;
    use std::os::unix::net::UnixListener;
    use sysmon_ingest::PipeConnector;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("SysMonDiag");
    let listener = UnixListener::bind(&path).unwrap();

    let producer = std::thread::spawn(move || {
        let (mut conn, _) = listener.accept().unwrap();
        conn.write_all(&message(10)).unwrap();
        conn.write_all(&message(12)).unwrap();
    });

    let connector = PipeConnector::new(path.to_str().unwrap());
    let handle = start_diagnostics(connector, &fast_config());

    assert!(matches!(next(&handle.receiver), DiagnosticsEvent::Connected { .. }));
    expect_snapshot(&handle.receiver, 10);
    expect_snapshot(&handle.receiver, 12);
    expect_disconnect(&handle.receiver);

    handle.stop();
    producer.join().unwrap();
}
