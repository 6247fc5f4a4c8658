use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::format::format_depth;

/// Open attribute bag; contents are documented per [`EventName`].
pub type Meta = Map<String, Value>;

/// Closed set of record kinds the tracker emits.
///
/// | name | populated fields | `meta` keys |
/// |---|---|---|
/// | `page_enter` | `depth` | `url`, `userAgent`, `viewport`, `referrer` |
/// | `page_exit` | `dwellMs`, `depth` (max) | `maxDepthPct`, `reason` |
/// | `scroll` | `depth` | `scrollTop`, `velocityPxPerSec`, `direction`, `maxDepthPct` |
/// | `click` | `action`, `targetId` | `tag`, `className`, `text`, `x`, `y` |
/// | `heartbeat` | `dwellMs`, `depth` | `maxDepthPct`, `activeMs`, `online` |
/// | `touch_*` | | `touches`, `x`, `y` |
/// | `input` | `action`, `targetId` | `tag`, `valueLength` |
/// | `visibility_change` | | (base `visibility` only) |
/// | `focus` / `blur` | | |
/// | `route_update` | | `url` |
///
/// Every record's `meta` also carries `visibility` and, when known, the
/// viewer's `age` and `occupation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    PageEnter,
    PageExit,
    Scroll,
    Click,
    Heartbeat,
    TouchStart,
    TouchMove,
    TouchEnd,
    VisibilityChange,
    Focus,
    Blur,
    Input,
    RouteUpdate,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::PageEnter => "page_enter",
            EventName::PageExit => "page_exit",
            EventName::Scroll => "scroll",
            EventName::Click => "click",
            EventName::Heartbeat => "heartbeat",
            EventName::TouchStart => "touch_start",
            EventName::TouchMove => "touch_move",
            EventName::TouchEnd => "touch_end",
            EventName::VisibilityChange => "visibility_change",
            EventName::Focus => "focus",
            EventName::Blur => "blur",
            EventName::Input => "input",
            EventName::RouteUpdate => "route_update",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub seq: u64,
    pub timestamp: u64,
    pub event_name: EventName,
    pub page_id: String,
    pub page_session_id: String,
    pub session_id: String,
    pub condition: String,
    pub participant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dwell_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default)]
    pub meta: Meta,
}

/// Wire body for both delivery paths: `{ "events": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    pub events: Vec<EventRecord>,
}

impl EventBatch {
    pub fn new(events: Vec<EventRecord>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn seq_range(&self) -> Option<(u64, u64)> {
        let first = self.events.first()?.seq;
        let last = self.events.last()?.seq;
        Some((first, last))
    }
}

/// Caller-supplied part of a record; the queue fills in the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub event_name: EventName,
    pub timestamp: Option<u64>,
    pub dwell_ms: Option<u64>,
    pub depth: Option<String>,
    pub action: Option<String>,
    pub target_id: Option<String>,
    pub meta: Meta,
}

impl EventDraft {
    pub fn new(event_name: EventName) -> Self {
        Self {
            event_name,
            timestamp: None,
            dwell_ms: None,
            depth: None,
            action: None,
            target_id: None,
            meta: Meta::new(),
        }
    }

    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn dwell_ms(mut self, dwell_ms: u64) -> Self {
        self.dwell_ms = Some(dwell_ms);
        self
    }

    pub fn depth_pct(mut self, pct: f64) -> Self {
        self.depth = Some(format_depth(pct));
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn target_id(mut self, target_id: Option<String>) -> Self {
        self.target_id = target_id;
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_serialize_snake_case() {
        assert_eq!(
            serde_json::to_value(EventName::VisibilityChange).unwrap(),
            "visibility_change"
        );
        assert_eq!(EventName::RouteUpdate.to_string(), "route_update");
    }

    #[test]
    fn record_uses_camel_case_and_skips_absent_fields() {
        let record = EventRecord {
            seq: 3,
            timestamp: 1_700_000_000_123,
            event_name: EventName::PageExit,
            page_id: "feed".into(),
            page_session_id: "ps".into(),
            session_id: "s".into(),
            condition: "ai_card".into(),
            participant_id: "p001".into(),
            dwell_ms: Some(4200),
            depth: Some("88.0".into()),
            action: None,
            target_id: None,
            meta: Meta::new(),
        };

        let json = serde_json::to_value(EventBatch::new(vec![record])).unwrap();
        let event = &json["events"][0];
        assert_eq!(event["eventName"], "page_exit");
        assert_eq!(event["pageSessionId"], "ps");
        assert_eq!(event["dwellMs"], 4200);
        assert!(event.get("targetId").is_none());
    }
}
