use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{
    env::{BrowserEvent, Environment, Handler, ListenerKind},
    types::{ScrollState, Viewport, Visibility},
};

const SIM_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 feedlab-sim";

enum Clock {
    System,
    Manual(AtomicU64),
}

struct PageState {
    scroll: ScrollState,
    viewport: Viewport,
    visibility: Visibility,
    online: bool,
    url: String,
    referrer: Option<String>,
}

#[derive(Default)]
struct ListenerTable {
    handlers: HashMap<ListenerKind, Handler>,
    capture: HashMap<ListenerKind, bool>,
    attached: HashMap<ListenerKind, u32>,
    detached: HashMap<ListenerKind, u32>,
}

/// Deterministic stand-in for a browsing context.
pub struct SimulatedPage {
    clock: Clock,
    state: Mutex<PageState>,
    listeners: Mutex<ListenerTable>,
}

impl SimulatedPage {
    /// A page whose clock only moves through [`SimulatedPage::advance`].
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_clock(url, Clock::Manual(AtomicU64::new(1_700_000_000_000)))
    }

    /// A page reading the real wall clock.
    pub fn with_system_clock(url: impl Into<String>) -> Self {
        Self::with_clock(url, Clock::System)
    }

    fn with_clock(url: impl Into<String>, clock: Clock) -> Self {
        let viewport = Viewport::default();
        Self {
            clock,
            state: Mutex::new(PageState {
                scroll: ScrollState {
                    scroll_top: 0.0,
                    scroll_height: f64::from(viewport.height) * 4.0,
                    client_height: f64::from(viewport.height),
                },
                viewport,
                visibility: Visibility::Visible,
                online: true,
                url: url.into(),
                referrer: None,
            }),
            listeners: Mutex::new(ListenerTable::default()),
        }
    }

    /// Move the manual clock forward. No-op on a system clock.
    pub fn advance(&self, ms: u64) {
        if let Clock::Manual(now) = &self.clock {
            now.fetch_add(ms, Ordering::SeqCst);
        }
    }

    pub fn set_document_height(&self, scroll_height: f64) {
        self.state().scroll.scroll_height = scroll_height;
    }

    pub fn set_scroll_top(&self, scroll_top: f64) {
        self.state().scroll.scroll_top = scroll_top;
    }

    pub fn set_online(&self, online: bool) {
        self.state().online = online;
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        self.state().visibility = visibility;
    }

    pub fn set_url(&self, url: impl Into<String>) {
        self.state().url = url.into();
    }

    /// `document.referrer`; empty strings read as no referrer.
    pub fn set_referrer(&self, referrer: impl Into<String>) {
        let referrer = referrer.into();
        self.state().referrer = (!referrer.is_empty()).then_some(referrer);
    }

    /// Invoke the listener registered for the event's kind, if any.
    /// Returns whether a listener observed the event.
    pub fn dispatch(&self, event: BrowserEvent) -> bool {
        let handler = self
            .listeners
            .lock()
            .expect("SimulatedPage listeners poisoned")
            .handlers
            .get(&event.kind())
            .cloned();

        match handler {
            Some(handler) => {
                handler(&event);
                true
            }
            None => false,
        }
    }

    /// Scroll to `scroll_top` and fire a scroll event.
    pub fn scroll_to(&self, scroll_top: f64) -> bool {
        self.set_scroll_top(scroll_top);
        self.dispatch(BrowserEvent::Scroll)
    }

    /// Flip visibility and fire `visibilitychange`.
    pub fn change_visibility(&self, visibility: Visibility) -> bool {
        self.set_visibility(visibility);
        self.dispatch(BrowserEvent::VisibilityChange)
    }

    /// History navigation to `url`.
    pub fn pop_state(&self, url: impl Into<String>) -> bool {
        let url = url.into();
        self.set_url(url.clone());
        self.dispatch(BrowserEvent::PopState { url })
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().handlers.len()
    }

    pub fn attach_count(&self, kind: ListenerKind) -> u32 {
        self.listeners().attached.get(&kind).copied().unwrap_or(0)
    }

    /// Whether the listener for `kind` was last registered in the capture phase.
    pub fn is_capture(&self, kind: ListenerKind) -> bool {
        self.listeners().capture.get(&kind).copied().unwrap_or(false)
    }

    pub fn detach_count(&self, kind: ListenerKind) -> u32 {
        self.listeners().detached.get(&kind).copied().unwrap_or(0)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.state.lock().expect("SimulatedPage state poisoned")
    }

    fn listeners(&self) -> std::sync::MutexGuard<'_, ListenerTable> {
        self.listeners
            .lock()
            .expect("SimulatedPage listeners poisoned")
    }
}

impl Environment for SimulatedPage {
    fn now_ms(&self) -> u64 {
        match &self.clock {
            Clock::System => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            Clock::Manual(now) => now.load(Ordering::SeqCst),
        }
    }

    fn scroll_state(&self) -> ScrollState {
        self.state().scroll
    }

    fn viewport(&self) -> Viewport {
        self.state().viewport
    }

    fn visibility(&self) -> Visibility {
        self.state().visibility
    }

    fn is_online(&self) -> bool {
        self.state().online
    }

    fn url(&self) -> String {
        self.state().url.clone()
    }

    fn user_agent(&self) -> String {
        SIM_USER_AGENT.to_string()
    }

    fn referrer(&self) -> Option<String> {
        self.state().referrer.clone()
    }

    fn add_listener(&self, kind: ListenerKind, capture: bool, handler: Handler) {
        let mut table = self.listeners();
        table.handlers.insert(kind, handler);
        table.capture.insert(kind, capture);
        *table.attached.entry(kind).or_default() += 1;
    }

    fn remove_listener(&self, kind: ListenerKind) {
        let mut table = self.listeners();
        if table.handlers.remove(&kind).is_some() {
            *table.detached.entry(kind).or_default() += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, atomic::AtomicUsize};

    use super::*;

    #[test]
    fn dispatch_reaches_only_attached_kinds() {
        let page = SimulatedPage::new("https://lab.test/feed");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        page.add_listener(
            ListenerKind::Scroll,
            false,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(page.scroll_to(120.0));
        assert!(!page.dispatch(BrowserEvent::Focus));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(page.scroll_state().scroll_top, 120.0);

        page.remove_listener(ListenerKind::Scroll);
        page.remove_listener(ListenerKind::Scroll);
        assert_eq!(page.detach_count(ListenerKind::Scroll), 1);
        assert!(!page.scroll_to(200.0));
    }

    #[test]
    fn manual_clock_only_moves_on_advance() {
        let page = SimulatedPage::new("https://lab.test/");
        let t0 = page.now_ms();
        page.advance(250);
        assert_eq!(page.now_ms(), t0 + 250);
    }
}
