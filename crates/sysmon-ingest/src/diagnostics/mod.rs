/// Diagnostics stream client.
///
/// Connects to the producer's diagnostics endpoint on a background thread,
/// reads length-prefixed JSON frames and forwards each parsed message on a
/// channel. The connection is re-established after a fixed delay whenever it
/// drops, until the handle is stopped.
///
/// # Usage
///
/// ```ignore
/// let handle = start_diagnostics(PipeConnector::new("SysMonDiag"), &config.diagnostics);
/// while let Ok(event) = handle.receiver.recv() { /* ... */ }
/// handle.stop();
/// ```
///
/// # Cancellation
///
/// The cancel flag is checked between connection attempts, between frames,
/// and every 100 ms during the reconnect delay or while waiting for room in
/// a full channel. A read blocked on an idle but open stream returns when the
/// next frame arrives or the peer closes. Dropping the handle cancels too.
///
/// # Delivery
///
/// Every parsed message is delivered, in stream order. When the consumer
/// falls behind, the client thread waits for channel space instead of
/// dropping events; only frames that fail to parse are skipped.
pub mod frame;

use crate::config::DiagnosticsConfig;
use crate::model::DiagnosticSnapshot;
use crate::platform;
use crate::poller::sleep_until;
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Opens a byte stream to the diagnostics endpoint.
pub trait Connector: Send + 'static {
    /// Display name of the endpoint, for logs and events.
    fn endpoint(&self) -> &str;

    fn connect(&self, timeout: Duration) -> io::Result<Box<dyn Read + Send>>;
}

/// Connector for the platform endpoint: a named pipe on Windows, a Unix
/// domain socket elsewhere.
#[derive(Debug, Clone)]
pub struct PipeConnector {
    path: String,
}

impl PipeConnector {
    /// `endpoint` is a bare name (`SysMonDiag`) or a full path.
    pub fn new(endpoint: &str) -> Self {
        Self {
            path: platform::endpoint_path(endpoint),
        }
    }
}

impl Connector for PipeConnector {
    fn endpoint(&self) -> &str {
        &self.path
    }

    fn connect(&self, timeout: Duration) -> io::Result<Box<dyn Read + Send>> {
        platform::connect_endpoint(&self.path, timeout)
    }
}

/// Message sent from the diagnostics thread, in stream order.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticsEvent {
    Connected { endpoint: String },
    Snapshot(DiagnosticSnapshot),
    Disconnected { reason: String },
}

/// How long a blocked send waits before re-checking the cancel flag.
const SEND_POLL: Duration = Duration::from_millis(100);

/// Handle to a running diagnostics client.
///
/// Dropping the handle stops the client.
pub struct DiagnosticsHandle {
    pub cancel: Arc<AtomicBool>,
    pub receiver: Receiver<DiagnosticsEvent>,
}

impl DiagnosticsHandle {
    /// Signal the client to stop. Non-blocking.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

impl Drop for DiagnosticsHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start the client on a background thread.
pub fn start_diagnostics<C: Connector>(
    connector: C,
    config: &DiagnosticsConfig,
) -> DiagnosticsHandle {
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_clone = Arc::clone(&cancel);
    let (tx, rx) = bounded::<DiagnosticsEvent>(config.channel_capacity.max(1));
    let config = config.clone();

    std::thread::Builder::new()
        .name("sysmon-diagnostics".to_owned())
        .spawn(move || run_client(connector, config, cancel_clone, tx))
        .expect("failed to spawn diagnostics thread");

    DiagnosticsHandle {
        cancel,
        receiver: rx,
    }
}

// ─── Background thread ──────────────────────────────────────────────────────

enum Flow {
    Continue,
    /// Cancelled or the receiver is gone.
    Exit,
}

fn run_client<C: Connector>(
    connector: C,
    config: DiagnosticsConfig,
    cancel: Arc<AtomicBool>,
    tx: Sender<DiagnosticsEvent>,
) {
    debug!(endpoint = connector.endpoint(), "diagnostics client started");
    while !cancel.load(Ordering::Relaxed) {
        match connector.connect(config.connect_timeout()) {
            Ok(mut stream) => {
                let flow = serve_connection(&connector, &mut *stream, &config, &cancel, &tx);
                if let Flow::Exit = flow {
                    break;
                }
            }
            Err(e) => debug!(endpoint = connector.endpoint(), "diagnostics connect failed: {e}"),
        }
        sleep_until(Instant::now() + config.reconnect_delay(), &cancel);
    }
    debug!("diagnostics client stopped");
}

/// Forward frames from one connection until it fails.
fn serve_connection<C: Connector>(
    connector: &C,
    stream: &mut (dyn Read + Send),
    config: &DiagnosticsConfig,
    cancel: &AtomicBool,
    tx: &Sender<DiagnosticsEvent>,
) -> Flow {
    info!(endpoint = connector.endpoint(), "diagnostics connected");
    let connected = DiagnosticsEvent::Connected {
        endpoint: connector.endpoint().to_owned(),
    };
    if let Flow::Exit = deliver(tx, connected, cancel) {
        return Flow::Exit;
    }

    let reason = loop {
        if cancel.load(Ordering::Relaxed) {
            return Flow::Exit;
        }
        let payload = match frame::read_frame(stream, config.max_frame_bytes) {
            Ok(payload) => payload,
            Err(e) => break e.to_string(),
        };
        match frame::parse_payload(&payload) {
            Ok(message) => {
                if let Flow::Exit = deliver(tx, DiagnosticsEvent::Snapshot(message), cancel) {
                    return Flow::Exit;
                }
            }
            Err(e) => debug!(len = payload.len(), "dropping diagnostics frame: {e}"),
        }
    };

    info!(endpoint = connector.endpoint(), %reason, "diagnostics disconnected");
    deliver(tx, DiagnosticsEvent::Disconnected { reason }, cancel)
}

/// Send `event`, waiting for room while the consumer catches up.
fn deliver(
    tx: &Sender<DiagnosticsEvent>,
    mut event: DiagnosticsEvent,
    cancel: &AtomicBool,
) -> Flow {
    loop {
        match tx.send_timeout(event, SEND_POLL) {
            Ok(()) => return Flow::Continue,
            Err(SendTimeoutError::Timeout(pending)) => {
                if cancel.load(Ordering::Relaxed) {
                    return Flow::Exit;
                }
                event = pending;
            }
            Err(SendTimeoutError::Disconnected(_)) => return Flow::Exit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Refusing;

    impl Connector for Refusing {
        fn endpoint(&self) -> &str {
            "refusing"
        }

        fn connect(&self, _timeout: Duration) -> io::Result<Box<dyn Read + Send>> {
            Err(io::Error::from(io::ErrorKind::ConnectionRefused))
        }
    }

    #[test]
    fn pipe_connector_expands_bare_names() {
        let connector = PipeConnector::new("SysMonDiag");
        assert!(connector.endpoint().ends_with("SysMonDiag"));
        assert_ne!(connector.endpoint(), "SysMonDiag");
    }

    /// Stop during the reconnect delay ends the thread and closes the channel.
    #[test]
    fn stop_interrupts_reconnect_delay() {
        let config = DiagnosticsConfig {
            reconnect_delay_ms: 60_000,
            ..DiagnosticsConfig::default()
        };
        let handle = start_diagnostics(Refusing, &config);
        std::thread::sleep(Duration::from_millis(50));
        handle.stop();

        let closed = handle.receiver.recv_timeout(Duration::from_secs(2));
        assert_eq!(closed, Err(crossbeam_channel::RecvTimeoutError::Disconnected));
    }
}
