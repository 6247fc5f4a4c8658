use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    events::{EventBatch, EventDraft},
    queues::EventQueue,
    transport::Beacon,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnloadReport {
    /// Records handed to the beacon, the synthetic exit included.
    pub sent: usize,
    /// Whether the beacon accepted the payload. Nothing is retried either way.
    pub accepted: bool,
}

/// Last-chance delivery when the page is going away.
#[derive(Clone)]
pub struct UnloadGuard {
    queue: EventQueue,
    beacon: Arc<dyn Beacon>,
}

impl UnloadGuard {
    pub fn new(queue: EventQueue, beacon: Arc<dyn Beacon>) -> Self {
        Self { queue, beacon }
    }

    /// Stamp `exit` with a fresh `seq`, put it ahead of everything still
    /// queued, and hand the lot to the beacon. The queue is empty on return.
    pub fn trigger(&self, exit: EventDraft) -> UnloadReport {
        let exit = self.queue.stamp_detached(exit);
        let exit_seq = exit.seq;

        let mut events = vec![exit];
        events.extend(self.queue.drain());
        let sent = events.len();

        let accepted = self.beacon.send_beacon(EventBatch::new(events));
        if accepted {
            info!(batch_len = sent, exit_seq, "unload beacon dispatched");
        } else {
            warn!(batch_len = sent, exit_seq, "unload beacon refused, records dropped");
        }

        UnloadReport { sent, accepted }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        env::SimulatedPage,
        events::{CorrelationKeys, EventName},
        transport::RecordingBeacon,
    };

    fn queue() -> EventQueue {
        let keys = CorrelationKeys {
            page_id: "search".into(),
            page_session_id: "ps".into(),
            session_id: "s".into(),
            condition: "ai_card".into(),
            participant_id: "p003".into(),
        };
        EventQueue::new(keys, None, Arc::new(SimulatedPage::new("https://lab.test/")))
    }

    #[test]
    fn exit_record_leads_pending_records() {
        let queue = queue();
        queue.push(EventDraft::new(EventName::PageEnter));
        queue.push(EventDraft::new(EventName::Scroll));
        let beacon = Arc::new(RecordingBeacon::new());

        let report = UnloadGuard::new(queue.clone(), beacon.clone())
            .trigger(EventDraft::new(EventName::PageExit).dwell_ms(900));

        assert_eq!(report, UnloadReport { sent: 3, accepted: true });
        assert!(queue.is_empty());

        let sent = beacon.sent();
        assert_eq!(sent.len(), 1);
        let names: Vec<EventName> = sent[0].events.iter().map(|r| r.event_name).collect();
        assert_eq!(names, vec![EventName::PageExit, EventName::PageEnter, EventName::Scroll]);
        assert_eq!(sent[0].events[0].seq, 3);
    }

    #[test]
    fn refused_beacon_still_clears_queue() {
        let queue = queue();
        queue.push(EventDraft::new(EventName::Focus));
        let beacon = Arc::new(RecordingBeacon::new());
        beacon.refuse();

        let report = UnloadGuard::new(queue.clone(), beacon).trigger(EventDraft::new(EventName::PageExit));
        assert!(!report.accepted);
        assert!(queue.is_empty());
    }
}
