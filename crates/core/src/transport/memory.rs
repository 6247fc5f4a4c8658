use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::{
    error::{Result, TelemetryError},
    events::{EventBatch, EventRecord},
    transport::{Beacon, Transport},
};

/// In-process sink that keeps every successful batch.
///
/// Failures can be scripted with [`RecordingTransport::fail_next`], and
/// [`RecordingTransport::hold`] parks deliveries until released.
pub struct RecordingTransport {
    delivered: Mutex<Vec<EventBatch>>,
    attempts: AtomicUsize,
    failures_left: AtomicUsize,
    gate: watch::Sender<bool>,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            delivered: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            gate,
        }
    }

    /// Fail the next `n` delivery attempts.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn batches(&self) -> Vec<EventBatch> {
        self.delivered
            .lock()
            .expect("RecordingTransport poisoned")
            .clone()
    }

    /// Every delivered record, in delivery order.
    pub fn records(&self) -> Vec<EventRecord> {
        self.batches()
            .into_iter()
            .flat_map(|b| b.events)
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn deliver(&self, batch: &EventBatch) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let mut gate = self.gate.subscribe();
        let open = gate.wait_for(|open| *open).await.is_ok();
        if !open {
            return Err(TelemetryError::DeliveryFailed {
                reason: "transport dropped".to_string(),
            });
        }

        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(TelemetryError::DeliveryFailed {
                reason: "scripted failure".to_string(),
            });
        }

        self.delivered
            .lock()
            .expect("RecordingTransport poisoned")
            .push(batch.clone());
        Ok(())
    }
}

/// Beacon that keeps what it was handed.
pub struct RecordingBeacon {
    sent: Mutex<Vec<EventBatch>>,
    accept: AtomicBool,
}

impl Default for RecordingBeacon {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBeacon {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            accept: AtomicBool::new(true),
        }
    }

    /// Make subsequent sends report that the browser refused them.
    pub fn refuse(&self) {
        self.accept.store(false, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<EventBatch> {
        self.sent
            .lock()
            .expect("RecordingBeacon poisoned")
            .clone()
    }
}

impl Beacon for RecordingBeacon {
    fn send_beacon(&self, batch: EventBatch) -> bool {
        if !self.accept.load(Ordering::SeqCst) {
            return false;
        }
        self.sent
            .lock()
            .expect("RecordingBeacon poisoned")
            .push(batch);
        true
    }
}
