//! Per-page-view listener registry: `unmounted -> active -> tearing_down -> unmounted`.

pub mod handlers;

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::{runtime::Handle, sync::broadcast, task::JoinHandle};
use tracing::{debug, info};

pub use handlers::ViewState;

use crate::{
    config::{PipelineConfig, TrackerConfig},
    env::{BrowserEvent, Environment, ListenerKind},
    error::{Result, TelemetryError},
    events::{CorrelationKeys, EventDraft},
    format::format_dwell,
    identity::{self, SessionStore},
    metrics::scroll_metrics,
    queues::EventQueue,
    scheduler::{FlushOutcome, FlushScheduler, FlushStatsSnapshot, spawn_periodic},
    transport::{Beacon, Transport},
    types::Visibility,
    unload::{UnloadGuard, UnloadReport},
};

use handlers::{draft_for, heartbeat_draft, page_enter_draft, page_exit_draft};

/// Capabilities a tracker is mounted with.
pub struct TrackerDeps {
    pub env: Arc<dyn Environment>,
    pub store: Arc<dyn SessionStore>,
    pub transport: Arc<dyn Transport>,
    pub beacon: Arc<dyn Beacon>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Unmounted,
    Active,
    TearingDown,
}

/// Instruments one logical page-view. Dropping an active tracker unmounts it.
pub struct PageTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    env: Arc<dyn Environment>,
    queue: EventQueue,
    flusher: Arc<FlushScheduler>,
    unload: UnloadGuard,
    runtime: Handle,
    state: Mutex<TrackerState>,
    view: Mutex<ViewState>,
    shutdown: broadcast::Sender<()>,
}

impl PageTracker {
    /// Emit `page_enter`, attach every listener and start the heartbeat
    /// and flush timers. Must be called inside a tokio runtime.
    pub fn mount(cfg: TrackerConfig, pipeline: &PipelineConfig, deps: TrackerDeps) -> Result<Self> {
        cfg.validate()?;
        pipeline.validate()?;
        let runtime = Handle::try_current().map_err(|_| TelemetryError::InvalidConfig {
            reason: "tracker requires a running tokio runtime".to_string(),
        })?;

        let session_id = identity::session_id(deps.store.as_ref(), &pipeline.storage_key);
        let keys = CorrelationKeys::new(&cfg, session_id, identity::page_session_id());
        let queue = EventQueue::new(keys, cfg.viewer_profile.clone(), Arc::clone(&deps.env));
        let flusher = Arc::new(FlushScheduler::new(queue.clone(), deps.transport));
        let unload = UnloadGuard::new(queue.clone(), deps.beacon);

        let entered_at = deps.env.now_ms();
        let initial = scroll_metrics(deps.env.as_ref());
        let view = ViewState::new(entered_at, &initial, deps.env.visibility());
        let (shutdown, _) = broadcast::channel(1);

        let inner = Arc::new(TrackerInner {
            env: deps.env,
            queue,
            flusher,
            unload,
            runtime,
            state: Mutex::new(TrackerState::Unmounted),
            view: Mutex::new(view),
            shutdown,
        });

        inner
            .queue
            .push(page_enter_draft(inner.env.as_ref(), entered_at, &initial));
        *inner.lock_state() = TrackerState::Active;
        inner.attach_listeners();
        inner.start_timers(pipeline);

        let keys = inner.queue.keys();
        info!(
            page_id = %keys.page_id,
            page_session_id = %keys.page_session_id,
            session_id = %keys.session_id,
            "tracker mounted"
        );

        Ok(Self { inner })
    }

    /// Emit `page_exit`, detach listeners, stop both timers and start one
    /// final flush. Returns `None` if the tracker was not active.
    ///
    /// The returned handle may be awaited or dropped; dropping it does not
    /// cancel the delivery.
    pub fn unmount(&self) -> Option<JoinHandle<FlushOutcome>> {
        self.inner.teardown()
    }

    pub fn state(&self) -> TrackerState {
        *self.inner.lock_state()
    }

    pub fn keys(&self) -> &CorrelationKeys {
        self.inner.queue.keys()
    }

    pub fn queue(&self) -> &EventQueue {
        &self.inner.queue
    }

    /// Run one flush tick now, outside the timer.
    pub async fn flush_now(&self) -> FlushOutcome {
        self.inner.flusher.flush().await
    }

    pub fn flush_stats(&self) -> FlushStatsSnapshot {
        self.inner.flusher.stats()
    }

    pub fn max_depth_pct(&self) -> f64 {
        self.inner.lock_view().max_depth_pct
    }
}

impl Drop for PageTracker {
    fn drop(&mut self) {
        let _ = self.inner.teardown();
    }
}

impl TrackerInner {
    fn attach_listeners(self: &Arc<Self>) {
        for kind in ListenerKind::ALL {
            let weak: Weak<TrackerInner> = Arc::downgrade(self);
            self.env.add_listener(
                kind,
                kind.capture(),
                Arc::new(move |event: &BrowserEvent| {
                    if let Some(inner) = weak.upgrade() {
                        inner.handle(event);
                    }
                }),
            );
        }
    }

    fn start_timers(self: &Arc<Self>, pipeline: &PipelineConfig) {
        let weak = Arc::downgrade(self);
        spawn_periodic(
            "heartbeat",
            pipeline.heartbeat_interval,
            self.shutdown.subscribe(),
            move || {
                if let Some(inner) = weak.upgrade() {
                    inner.heartbeat();
                }
                std::future::ready(())
            },
        );

        let flusher = Arc::clone(&self.flusher);
        spawn_periodic(
            "flush",
            pipeline.flush_interval,
            self.shutdown.subscribe(),
            move || {
                let flusher = Arc::clone(&flusher);
                async move {
                    flusher.flush().await;
                }
            },
        );
    }

    fn handle(&self, event: &BrowserEvent) {
        let state = self.lock_state();
        if *state != TrackerState::Active {
            return;
        }

        let now = self.env.now_ms();
        let mut view = self.lock_view();
        match draft_for(&mut view, self.env.as_ref(), now, event) {
            Some(draft) => {
                self.record(draft);
                // A hidden page may be frozen without ever firing pagehide.
                if matches!(event, BrowserEvent::VisibilityChange)
                    && self.env.visibility() == Visibility::Hidden
                {
                    self.fire_unload(&view, now, event);
                }
            }
            None => self.fire_unload(&view, now, event),
        }
    }

    fn fire_unload(&self, view: &ViewState, now: u64, event: &BrowserEvent) {
        let reason = event.kind().dom_name();
        let UnloadReport { sent, accepted } =
            self.unload.trigger(page_exit_draft(view, now, reason));
        debug!(reason, sent, accepted, "unload guard fired");
    }

    fn heartbeat(&self) {
        let state = self.lock_state();
        if *state != TrackerState::Active {
            return;
        }
        let now = self.env.now_ms();
        let draft = heartbeat_draft(&mut self.lock_view(), self.env.as_ref(), now);
        self.record(draft);
    }

    fn record(&self, draft: EventDraft) {
        let event_name = draft.event_name;
        let seq = self.queue.push(draft);
        debug!(seq, %event_name, "event queued");
    }

    fn teardown(&self) -> Option<JoinHandle<FlushOutcome>> {
        {
            let mut state = self.lock_state();
            if *state != TrackerState::Active {
                return None;
            }
            *state = TrackerState::TearingDown;
        }

        let now = self.env.now_ms();
        let exit = page_exit_draft(&self.lock_view(), now, "unmount");
        let dwell_ms = exit.dwell_ms.unwrap_or_default();
        self.record(exit);

        for kind in ListenerKind::ALL {
            self.env.remove_listener(kind);
        }
        // No receivers only means both timers already stopped.
        let _ = self.shutdown.send(());

        let flusher = Arc::clone(&self.flusher);
        let handle = self
            .runtime
            .spawn(async move { flusher.flush_when_idle().await });

        *self.lock_state() = TrackerState::Unmounted;
        info!(
            page_session_id = %self.queue.keys().page_session_id,
            dwell = %format_dwell(dwell_ms),
            "tracker unmounted"
        );
        Some(handle)
    }

    fn lock_state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().expect("tracker state poisoned")
    }

    fn lock_view(&self) -> MutexGuard<'_, ViewState> {
        self.view.lock().expect("tracker view poisoned")
    }
}
