use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use serde_json::Value;

use crate::{
    env::Environment,
    events::{CorrelationKeys, EventDraft, EventRecord, Meta},
    types::ViewerProfile,
};

/// Ordered buffer of pending records for one page-view.
///
/// Sequence numbers are assigned under the same lock as the append, so
/// buffer order always equals `seq` order. Cloning yields another handle
/// to the same buffer.
#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<EventQueueInner>,
}

struct EventQueueInner {
    state: Mutex<QueueState>,
    keys: CorrelationKeys,
    viewer: Option<ViewerProfile>,
    env: Arc<dyn Environment>,
}

struct QueueState {
    buf: VecDeque<EventRecord>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new(
        keys: CorrelationKeys,
        viewer: Option<ViewerProfile>,
        env: Arc<dyn Environment>,
    ) -> Self {
        Self {
            inner: Arc::new(EventQueueInner {
                state: Mutex::new(QueueState {
                    buf: VecDeque::new(),
                    next_seq: 1,
                }),
                keys,
                viewer,
                env,
            }),
        }
    }

    pub fn keys(&self) -> &CorrelationKeys {
        &self.inner.keys
    }

    /// Stamp `draft` with the next `seq` and append it. Returns the `seq`.
    pub fn push(&self, draft: EventDraft) -> u64 {
        let mut state = self.lock();
        let record = self.stamp(&mut state, draft);
        let seq = record.seq;
        state.buf.push_back(record);
        seq
    }

    /// Stamp `draft` with the next `seq` without buffering it.
    pub fn stamp_detached(&self, draft: EventDraft) -> EventRecord {
        let mut state = self.lock();
        self.stamp(&mut state, draft)
    }

    /// Remove and return everything currently queued.
    pub fn drain(&self) -> Vec<EventRecord> {
        self.lock().buf.drain(..).collect()
    }

    /// Put a failed batch back ahead of anything pushed since it was drained.
    pub fn requeue_front(&self, records: Vec<EventRecord>) {
        let mut state = self.lock();
        for record in records.into_iter().rev() {
            state.buf.push_front(record);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().buf.is_empty()
    }

    /// Last `seq` handed out, 0 before the first push.
    pub fn last_seq(&self) -> u64 {
        self.lock().next_seq - 1
    }

    fn stamp(&self, state: &mut QueueState, draft: EventDraft) -> EventRecord {
        let seq = state.next_seq;
        state.next_seq += 1;

        let keys = &self.inner.keys;
        EventRecord {
            seq,
            timestamp: draft.timestamp.unwrap_or_else(|| self.inner.env.now_ms()),
            event_name: draft.event_name,
            page_id: keys.page_id.clone(),
            page_session_id: keys.page_session_id.clone(),
            session_id: keys.session_id.clone(),
            condition: keys.condition.clone(),
            participant_id: keys.participant_id.clone(),
            dwell_ms: draft.dwell_ms,
            depth: draft.depth,
            action: draft.action,
            target_id: draft.target_id,
            meta: self.base_meta(draft.meta),
        }
    }

    fn base_meta(&self, overlay: Meta) -> Meta {
        let mut meta = Meta::new();
        if let Some(viewer) = &self.inner.viewer {
            if let Some(age) = viewer.age {
                meta.insert("age".to_string(), Value::from(age));
            }
            if let Some(occupation) = &viewer.occupation {
                meta.insert("occupation".to_string(), Value::from(occupation.clone()));
            }
        }
        meta.insert(
            "visibility".to_string(),
            Value::from(self.inner.env.visibility().as_str()),
        );
        meta.extend(overlay);
        meta
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner.state.lock().expect("EventQueue poisoned")
    }
}
