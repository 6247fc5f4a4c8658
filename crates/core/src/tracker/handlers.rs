//! One browser event in, at most one draft out.

use serde_json::json;

use crate::{
    env::{BrowserEvent, Environment},
    events::{EventDraft, EventName},
    format::round_tenth,
    metrics::{DEFAULT_ACTION, ScrollMetrics, scroll_metrics, target_meta},
    types::Visibility,
};

/// Running per-page-view measurements.
#[derive(Debug, Clone)]
pub struct ViewState {
    pub entered_at: u64,
    pub max_depth_pct: f64,
    last_scroll_top: f64,
    last_scroll_at: u64,
    hidden_since: Option<u64>,
    hidden_total_ms: u64,
}

impl ViewState {
    pub fn new(entered_at: u64, initial: &ScrollMetrics, visibility: Visibility) -> Self {
        Self {
            entered_at,
            max_depth_pct: initial.depth_pct,
            last_scroll_top: initial.scroll_top,
            last_scroll_at: entered_at,
            hidden_since: (visibility == Visibility::Hidden).then_some(entered_at),
            hidden_total_ms: 0,
        }
    }

    pub fn dwell_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.entered_at)
    }

    /// Dwell minus time spent hidden.
    pub fn active_ms(&self, now: u64) -> u64 {
        let open_hidden = self.hidden_since.map_or(0, |since| now.saturating_sub(since));
        self.dwell_ms(now)
            .saturating_sub(self.hidden_total_ms + open_hidden)
    }

    fn observe_depth(&mut self, depth_pct: f64) {
        if depth_pct > self.max_depth_pct {
            self.max_depth_pct = depth_pct;
        }
    }

    fn observe_visibility(&mut self, visibility: Visibility, now: u64) {
        match (self.hidden_since, visibility) {
            (None, Visibility::Hidden) => self.hidden_since = Some(now),
            (Some(since), Visibility::Visible) => {
                self.hidden_total_ms += now.saturating_sub(since);
                self.hidden_since = None;
            }
            _ => {}
        }
    }
}

pub fn page_enter_draft(env: &dyn Environment, now: u64, initial: &ScrollMetrics) -> EventDraft {
    let viewport = env.viewport();
    let mut draft = EventDraft::new(EventName::PageEnter)
        .at(now)
        .depth_pct(initial.depth_pct)
        .meta("url", env.url())
        .meta("userAgent", env.user_agent())
        .meta(
            "viewport",
            json!({ "width": viewport.width, "height": viewport.height }),
        );
    if let Some(referrer) = env.referrer() {
        draft = draft.meta("referrer", referrer);
    }
    draft
}

pub fn page_exit_draft(view: &ViewState, now: u64, reason: &str) -> EventDraft {
    EventDraft::new(EventName::PageExit)
        .at(now)
        .dwell_ms(view.dwell_ms(now))
        .depth_pct(view.max_depth_pct)
        .meta("maxDepthPct", round_tenth(view.max_depth_pct))
        .meta("reason", reason)
}

pub fn heartbeat_draft(view: &mut ViewState, env: &dyn Environment, now: u64) -> EventDraft {
    let m = scroll_metrics(env);
    view.observe_depth(m.depth_pct);

    EventDraft::new(EventName::Heartbeat)
        .at(now)
        .dwell_ms(view.dwell_ms(now))
        .depth_pct(m.depth_pct)
        .meta("maxDepthPct", round_tenth(view.max_depth_pct))
        .meta("activeMs", view.active_ms(now))
        .meta("online", env.is_online())
}

/// Map a browser event to its record. `None` for the unload signals,
/// which bypass the queue.
pub fn draft_for(
    view: &mut ViewState,
    env: &dyn Environment,
    now: u64,
    event: &BrowserEvent,
) -> Option<EventDraft> {
    let draft = match event {
        BrowserEvent::Scroll => scroll_draft(view, env, now),
        BrowserEvent::Click { target, x, y } => {
            let t = target_meta(target);
            EventDraft::new(EventName::Click)
                .action(t.action)
                .target_id(t.target_id)
                .meta("tag", t.tag)
                .meta("className", t.class_name)
                .meta("text", t.text)
                .meta("x", *x)
                .meta("y", *y)
        }
        BrowserEvent::TouchStart(p) => touch_draft(EventName::TouchStart, p.touches, p.x, p.y),
        BrowserEvent::TouchMove(p) => touch_draft(EventName::TouchMove, p.touches, p.x, p.y),
        BrowserEvent::TouchEnd(p) => touch_draft(EventName::TouchEnd, p.touches, p.x, p.y),
        BrowserEvent::Input { target, value_len } => {
            let t = target_meta(target);
            let action = if t.action == DEFAULT_ACTION {
                "input".to_string()
            } else {
                t.action
            };
            // Only the length; typed content never leaves the page.
            EventDraft::new(EventName::Input)
                .action(action)
                .target_id(t.target_id)
                .meta("tag", t.tag)
                .meta("valueLength", *value_len as u64)
        }
        BrowserEvent::VisibilityChange => {
            view.observe_visibility(env.visibility(), now);
            EventDraft::new(EventName::VisibilityChange)
        }
        BrowserEvent::Focus => EventDraft::new(EventName::Focus),
        BrowserEvent::Blur => EventDraft::new(EventName::Blur),
        BrowserEvent::PopState { url } => {
            EventDraft::new(EventName::RouteUpdate).meta("url", url.clone())
        }
        BrowserEvent::PageHide | BrowserEvent::BeforeUnload => return None,
    };
    Some(draft.at(now))
}

fn scroll_draft(view: &mut ViewState, env: &dyn Environment, now: u64) -> EventDraft {
    let m = scroll_metrics(env);
    let elapsed_ms = now.saturating_sub(view.last_scroll_at).max(1);
    let delta = m.scroll_top - view.last_scroll_top;
    let velocity = delta / elapsed_ms as f64 * 1000.0;
    let direction = if delta > 0.0 {
        "down"
    } else if delta < 0.0 {
        "up"
    } else {
        "none"
    };

    view.last_scroll_top = m.scroll_top;
    view.last_scroll_at = now;
    view.observe_depth(m.depth_pct);

    EventDraft::new(EventName::Scroll)
        .depth_pct(m.depth_pct)
        .meta("scrollTop", m.scroll_top)
        .meta("velocityPxPerSec", round_tenth(velocity))
        .meta("direction", direction)
        .meta("maxDepthPct", round_tenth(view.max_depth_pct))
}

fn touch_draft(name: EventName, touches: u32, x: f64, y: f64) -> EventDraft {
    EventDraft::new(name)
        .meta("touches", touches)
        .meta("x", x)
        .meta("y", y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{Element, SimulatedPage, TouchPoint};

    fn page() -> SimulatedPage {
        let page = SimulatedPage::new("https://lab.test/topic");
        page.set_document_height(2844.0); // 2000px scrollable with an 844px viewport
        page
    }

    fn view_for(page: &SimulatedPage) -> ViewState {
        let initial = scroll_metrics(page);
        ViewState::new(page.now_ms(), &initial, page.visibility())
    }

    #[test]
    fn scroll_velocity_direction_and_running_max() {
        let page = page();
        let mut view = view_for(&page);

        page.advance(100);
        page.set_scroll_top(1000.0);
        let down = draft_for(&mut view, &page, page.now_ms(), &BrowserEvent::Scroll).unwrap();
        assert_eq!(down.depth.as_deref(), Some("50.0"));
        assert_eq!(down.meta["velocityPxPerSec"], 10_000.0);
        assert_eq!(down.meta["direction"], "down");

        page.advance(200);
        page.set_scroll_top(600.0);
        let up = draft_for(&mut view, &page, page.now_ms(), &BrowserEvent::Scroll).unwrap();
        assert_eq!(up.meta["velocityPxPerSec"], -2_000.0);
        assert_eq!(up.meta["direction"], "up");
        assert_eq!(up.meta["maxDepthPct"], 50.0);
        assert_eq!(view.max_depth_pct, 50.0);
    }

    #[test]
    fn same_millisecond_scroll_floors_elapsed_time() {
        let page = page();
        let mut view = view_for(&page);
        page.set_scroll_top(20.0);
        let draft = draft_for(&mut view, &page, page.now_ms(), &BrowserEvent::Scroll).unwrap();
        assert_eq!(draft.meta["velocityPxPerSec"], 20_000.0);
    }

    #[test]
    fn click_carries_target_attribution() {
        let page = page();
        let mut view = view_for(&page);
        let like = Element::new("button").track("like").track_id("post-3-like").build();
        let icon = Element::new("i").child_of(&like).build();

        let draft = draft_for(
            &mut view,
            &page,
            page.now_ms(),
            &BrowserEvent::Click { target: icon, x: 12.0, y: 300.5 },
        )
        .unwrap();
        assert_eq!(draft.event_name, EventName::Click);
        assert_eq!(draft.action.as_deref(), Some("like"));
        assert_eq!(draft.target_id.as_deref(), Some("post-3-like"));
        assert_eq!(draft.meta["tag"], "button");
        assert_eq!(draft.meta["y"], 300.5);
    }

    #[test]
    fn input_records_length_not_content() {
        let page = page();
        let mut view = view_for(&page);
        let search = Element::new("input").id("search-box").build();

        let draft = draft_for(
            &mut view,
            &page,
            page.now_ms(),
            &BrowserEvent::Input { target: search, value_len: 7 },
        )
        .unwrap();
        assert_eq!(draft.action.as_deref(), Some("input"));
        assert_eq!(draft.target_id.as_deref(), Some("search-box"));
        assert_eq!(draft.meta["valueLength"], 7);
    }

    #[test]
    fn touch_and_route_events_map_one_to_one() {
        let page = page();
        let mut view = view_for(&page);
        let now = page.now_ms();
        let point = TouchPoint { touches: 2, x: 1.0, y: 2.0 };

        let cases = [
            (BrowserEvent::TouchStart(point), EventName::TouchStart),
            (BrowserEvent::TouchMove(point), EventName::TouchMove),
            (BrowserEvent::TouchEnd(point), EventName::TouchEnd),
            (BrowserEvent::Focus, EventName::Focus),
            (BrowserEvent::Blur, EventName::Blur),
            (
                BrowserEvent::PopState { url: "https://lab.test/detail/9".into() },
                EventName::RouteUpdate,
            ),
        ];
        for (event, name) in cases {
            let draft = draft_for(&mut view, &page, now, &event).unwrap();
            assert_eq!(draft.event_name, name);
            assert_eq!(draft.timestamp, Some(now));
        }

        assert!(draft_for(&mut view, &page, now, &BrowserEvent::PageHide).is_none());
        assert!(draft_for(&mut view, &page, now, &BrowserEvent::BeforeUnload).is_none());
    }

    #[test]
    fn hidden_time_is_excluded_from_active_time() {
        let page = page();
        let mut view = view_for(&page);

        page.advance(1_000);
        page.set_visibility(Visibility::Hidden);
        draft_for(&mut view, &page, page.now_ms(), &BrowserEvent::VisibilityChange);
        page.advance(3_000);
        assert_eq!(view.active_ms(page.now_ms()), 1_000);

        page.set_visibility(Visibility::Visible);
        draft_for(&mut view, &page, page.now_ms(), &BrowserEvent::VisibilityChange);
        page.advance(500);

        let beat = heartbeat_draft(&mut view, &page, page.now_ms());
        assert_eq!(beat.dwell_ms, Some(4_500));
        assert_eq!(beat.meta["activeMs"], 1_500);
        assert_eq!(beat.meta["online"], true);
    }
}
