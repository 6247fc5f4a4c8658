use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::{events::EventBatch, queues::EventQueue, transport::Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Another flush was in flight.
    Skipped,
    /// Nothing queued.
    Empty,
    Delivered(usize),
    /// Delivery failed; the batch is back at the head of the queue.
    Requeued(usize),
}

#[derive(Debug, Default)]
struct FlushStats {
    attempts: AtomicU64,
    delivered_batches: AtomicU64,
    delivered_records: AtomicU64,
    failures: AtomicU64,
    skipped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStatsSnapshot {
    pub attempts: u64,
    pub delivered_batches: u64,
    pub delivered_records: u64,
    pub failures: u64,
    pub skipped: u64,
}

/// Drains the queue and delivers it as one all-or-nothing batch, with at
/// most one delivery in flight.
pub struct FlushScheduler {
    queue: EventQueue,
    transport: Arc<dyn Transport>,
    flushing: AtomicBool,
    idle: Notify,
    stats: FlushStats,
}

struct FlightGuard<'a>(&'a FlushScheduler);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.flushing.store(false, Ordering::Release);
        self.0.idle.notify_waiters();
    }
}

impl FlushScheduler {
    pub fn new(queue: EventQueue, transport: Arc<dyn Transport>) -> Self {
        Self {
            queue,
            transport,
            flushing: AtomicBool::new(false),
            idle: Notify::new(),
            stats: FlushStats::default(),
        }
    }

    pub async fn flush(&self) -> FlushOutcome {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            debug!("flush already in flight, skipping tick");
            return FlushOutcome::Skipped;
        }
        let _flight = FlightGuard(self);

        let records = self.queue.drain();
        if records.is_empty() {
            return FlushOutcome::Empty;
        }

        let batch = EventBatch::new(records);
        let len = batch.len();
        let (first_seq, last_seq) = batch.seq_range().unwrap_or_default();
        self.stats.attempts.fetch_add(1, Ordering::Relaxed);

        match self.transport.deliver(&batch).await {
            Ok(()) => {
                self.stats.delivered_batches.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .delivered_records
                    .fetch_add(len as u64, Ordering::Relaxed);
                info!(batch_len = len, first_seq, last_seq, "batch delivered");
                FlushOutcome::Delivered(len)
            }
            Err(err) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!(batch_len = len, first_seq, %err, "delivery failed, requeueing batch");
                self.queue.requeue_front(batch.events);
                FlushOutcome::Requeued(len)
            }
        }
    }

    /// Like [`FlushScheduler::flush`], but waits out an in-flight delivery
    /// instead of skipping.
    pub async fn flush_when_idle(&self) -> FlushOutcome {
        loop {
            let idle = self.idle.notified();
            match self.flush().await {
                FlushOutcome::Skipped => idle.await,
                outcome => return outcome,
            }
        }
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> FlushStatsSnapshot {
        FlushStatsSnapshot {
            attempts: self.stats.attempts.load(Ordering::Relaxed),
            delivered_batches: self.stats.delivered_batches.load(Ordering::Relaxed),
            delivered_records: self.stats.delivered_records.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
            skipped: self.stats.skipped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        env::SimulatedPage,
        events::{CorrelationKeys, EventDraft, EventName},
        transport::RecordingTransport,
    };

    fn setup() -> (EventQueue, Arc<RecordingTransport>, Arc<FlushScheduler>) {
        let keys = CorrelationKeys {
            page_id: "detail".into(),
            page_session_id: "ps".into(),
            session_id: "s".into(),
            condition: "control".into(),
            participant_id: "p009".into(),
        };
        let queue = EventQueue::new(keys, None, Arc::new(SimulatedPage::new("https://lab.test/")));
        let transport = Arc::new(RecordingTransport::new());
        let flusher = Arc::new(FlushScheduler::new(queue.clone(), transport.clone()));
        (queue, transport, flusher)
    }

    #[tokio::test]
    async fn empty_queue_is_a_no_op() {
        let (_queue, transport, flusher) = setup();
        assert_eq!(flusher.flush().await, FlushOutcome::Empty);
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test]
    async fn failed_batch_is_redelivered_in_order() {
        let (queue, transport, flusher) = setup();
        for _ in 0..3 {
            queue.push(EventDraft::new(EventName::Click));
        }
        transport.fail_next(1);

        assert_eq!(flusher.flush().await, FlushOutcome::Requeued(3));
        assert_eq!(queue.len(), 3);
        queue.push(EventDraft::new(EventName::Blur));

        assert_eq!(flusher.flush().await, FlushOutcome::Delivered(4));
        let seqs: Vec<u64> = transport.records().iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);

        let stats = flusher.stats();
        assert_eq!(stats.attempts, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.delivered_records, 4);
    }

    #[tokio::test]
    async fn overlapping_flush_is_skipped() {
        let (queue, transport, flusher) = setup();
        queue.push(EventDraft::new(EventName::Focus));
        transport.hold();

        let in_flight = tokio::spawn({
            let flusher = Arc::clone(&flusher);
            async move { flusher.flush().await }
        });
        while !flusher.is_flushing() {
            tokio::task::yield_now().await;
        }

        queue.push(EventDraft::new(EventName::Blur));
        assert_eq!(flusher.flush().await, FlushOutcome::Skipped);

        transport.release();
        assert_eq!(in_flight.await.unwrap(), FlushOutcome::Delivered(1));
        assert_eq!(flusher.flush().await, FlushOutcome::Delivered(1));
        assert_eq!(flusher.stats().skipped, 1);
    }

    #[tokio::test]
    async fn flush_when_idle_waits_for_in_flight_delivery() {
        let (queue, transport, flusher) = setup();
        queue.push(EventDraft::new(EventName::Focus));
        transport.hold();

        let in_flight = tokio::spawn({
            let flusher = Arc::clone(&flusher);
            async move { flusher.flush().await }
        });
        while !flusher.is_flushing() {
            tokio::task::yield_now().await;
        }
        queue.push(EventDraft::new(EventName::PageExit));

        let last = tokio::spawn({
            let flusher = Arc::clone(&flusher);
            async move { flusher.flush_when_idle().await }
        });
        tokio::task::yield_now().await;
        transport.release();

        assert_eq!(in_flight.await.unwrap(), FlushOutcome::Delivered(1));
        assert_eq!(last.await.unwrap(), FlushOutcome::Delivered(1));
        assert_eq!(transport.records().len(), 2);
    }
}
