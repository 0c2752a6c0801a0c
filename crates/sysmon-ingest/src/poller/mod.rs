/// Periodic snapshot polling on a background thread.
///
/// # Usage
///
/// ```ignore
/// let reader = Arc::new(SnapshotReader::from_config(&config));
/// let handle = start_poller(reader, Duration::from_secs(1), 64);
/// for event in handle.receiver.iter() { /* ... */ }
/// handle.stop();
/// ```
///
/// # Cancellation
///
/// `handle.stop()` sets the cancel flag. The thread sleeps in 100 ms slices
/// and exits at the next slice boundary.
use crate::model::Snapshot;
use crate::reader::SnapshotReader;
use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Shortest poll interval; smaller values are raised to this.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Message sent from the poller thread.
#[derive(Debug, Clone)]
pub enum PollEvent {
    Snapshot {
        snapshot: Snapshot,
        received_at: DateTime<Local>,
    },
    /// The reader returned nothing; `reason` is its last error.
    Unavailable { reason: String },
}

/// Handle to a running poller.
pub struct PollerHandle {
    pub cancel: Arc<AtomicBool>,
    pub receiver: Receiver<PollEvent>,
}

impl PollerHandle {
    /// Signal the poller to stop. Non-blocking.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

/// Start polling `reader` every `interval` (at least [`MIN_INTERVAL`]).
///
/// Events are dropped, not queued, when the consumer falls `capacity`
/// events behind.
pub fn start_poller(
    reader: Arc<SnapshotReader>,
    interval: Duration,
    capacity: usize,
) -> PollerHandle {
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_clone = Arc::clone(&cancel);
    let (tx, rx) = bounded::<PollEvent>(capacity.max(1));
    let interval = interval.max(MIN_INTERVAL);

    std::thread::Builder::new()
        .name("sysmon-poller".to_owned())
        .spawn(move || run_poller(reader, interval, cancel_clone, tx))
        .expect("failed to spawn poller thread");

    PollerHandle {
        cancel,
        receiver: rx,
    }
}

// ─── Background thread ──────────────────────────────────────────────────────

fn run_poller(
    reader: Arc<SnapshotReader>,
    interval: Duration,
    cancel: Arc<AtomicBool>,
    tx: Sender<PollEvent>,
) {
    debug!(?interval, "poller started");
    while !cancel.load(Ordering::Relaxed) {
        let started = Instant::now();
        let event = match reader.read() {
            Some(snapshot) => PollEvent::Snapshot {
                snapshot,
                received_at: Local::now(),
            },
            None => PollEvent::Unavailable {
                reason: reader
                    .last_error()
                    .unwrap_or_else(|| "snapshot unavailable".to_owned()),
            },
        };

        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("poller channel full, dropping event"),
            Err(TrySendError::Disconnected(_)) => break,
        }

        sleep_until(started + interval, &cancel);
    }
    debug!("poller stopped");
}

/// Sleep until `deadline` in slices, returning early on cancel.
pub(crate) fn sleep_until(deadline: Instant, cancel: &AtomicBool) {
    loop {
        if cancel.load(Ordering::Relaxed) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}
