//! The browsing context the tracker runs in, expressed as an injected
//! capability so the pipeline can be driven by a real page bridge or by
//! [`SimulatedPage`] in tests and replays.

pub mod element;
pub mod sim;

use std::sync::Arc;

pub use element::*;
pub use sim::*;

use crate::types::{ScrollState, Viewport, Visibility};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ListenerKind {
    Scroll,
    Click,
    TouchStart,
    TouchMove,
    TouchEnd,
    Input,
    VisibilityChange,
    Focus,
    Blur,
    PopState,
    PageHide,
    BeforeUnload,
}

impl ListenerKind {
    pub const ALL: [ListenerKind; 12] = [
        ListenerKind::Scroll,
        ListenerKind::Click,
        ListenerKind::TouchStart,
        ListenerKind::TouchMove,
        ListenerKind::TouchEnd,
        ListenerKind::Input,
        ListenerKind::VisibilityChange,
        ListenerKind::Focus,
        ListenerKind::Blur,
        ListenerKind::PopState,
        ListenerKind::PageHide,
        ListenerKind::BeforeUnload,
    ];

    /// DOM event type the listener is registered under.
    pub fn dom_name(&self) -> &'static str {
        match self {
            ListenerKind::Scroll => "scroll",
            ListenerKind::Click => "click",
            ListenerKind::TouchStart => "touchstart",
            ListenerKind::TouchMove => "touchmove",
            ListenerKind::TouchEnd => "touchend",
            ListenerKind::Input => "input",
            ListenerKind::VisibilityChange => "visibilitychange",
            ListenerKind::Focus => "focus",
            ListenerKind::Blur => "blur",
            ListenerKind::PopState => "popstate",
            ListenerKind::PageHide => "pagehide",
            ListenerKind::BeforeUnload => "beforeunload",
        }
    }

    /// Clicks are taken in the capture phase so nested interactive
    /// elements that stop propagation are still attributed.
    pub fn capture(&self) -> bool {
        matches!(self, ListenerKind::Click)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub touches: u32,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone)]
pub enum BrowserEvent {
    Scroll,
    Click { target: ElementRef, x: f64, y: f64 },
    TouchStart(TouchPoint),
    TouchMove(TouchPoint),
    TouchEnd(TouchPoint),
    Input { target: ElementRef, value_len: usize },
    VisibilityChange,
    Focus,
    Blur,
    PopState { url: String },
    PageHide,
    BeforeUnload,
}

impl BrowserEvent {
    pub fn kind(&self) -> ListenerKind {
        match self {
            BrowserEvent::Scroll => ListenerKind::Scroll,
            BrowserEvent::Click { .. } => ListenerKind::Click,
            BrowserEvent::TouchStart(_) => ListenerKind::TouchStart,
            BrowserEvent::TouchMove(_) => ListenerKind::TouchMove,
            BrowserEvent::TouchEnd(_) => ListenerKind::TouchEnd,
            BrowserEvent::Input { .. } => ListenerKind::Input,
            BrowserEvent::VisibilityChange => ListenerKind::VisibilityChange,
            BrowserEvent::Focus => ListenerKind::Focus,
            BrowserEvent::Blur => ListenerKind::Blur,
            BrowserEvent::PopState { .. } => ListenerKind::PopState,
            BrowserEvent::PageHide => ListenerKind::PageHide,
            BrowserEvent::BeforeUnload => ListenerKind::BeforeUnload,
        }
    }
}

pub type Handler = Arc<dyn Fn(&BrowserEvent) + Send + Sync>;

pub trait Environment: Send + Sync + 'static {
    /// Wall clock, milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
    fn scroll_state(&self) -> ScrollState;
    fn viewport(&self) -> Viewport;
    fn visibility(&self) -> Visibility;
    fn is_online(&self) -> bool;
    fn url(&self) -> String;
    fn user_agent(&self) -> String;

    fn referrer(&self) -> Option<String> {
        None
    }

    /// Register `handler` for `kind`, in the capture phase when `capture`.
    fn add_listener(&self, kind: ListenerKind, capture: bool, handler: Handler);
    fn remove_listener(&self, kind: ListenerKind);
}
