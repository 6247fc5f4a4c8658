//! Pure reads of document state: scroll depth and click-target attribution.

use serde::Serialize;

use crate::{
    env::{ElementRef, Environment, TRACK_ATTR, TRACK_ID_ATTR, closest},
    format::{collapse_whitespace, truncate_chars},
    types::ScrollState,
};

pub const DEFAULT_ACTION: &str = "dom_click";
pub const MAX_CLASS_LEN: usize = 120;
pub const MAX_TEXT_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
    pub depth_pct: f64,
}

impl From<ScrollState> for ScrollMetrics {
    fn from(s: ScrollState) -> Self {
        let range = (s.scroll_height - s.client_height).max(1.0);
        let raw = s.scroll_top / range * 100.0;
        // NaN from a garbage reading degrades to 0 instead of poisoning max-depth.
        let depth_pct = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 100.0) };
        Self {
            scroll_top: s.scroll_top,
            scroll_height: s.scroll_height,
            client_height: s.client_height,
            depth_pct,
        }
    }
}

pub fn scroll_metrics(env: &dyn Environment) -> ScrollMetrics {
    ScrollMetrics::from(env.scroll_state())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetMeta {
    pub action: String,
    pub target_id: Option<String>,
    pub tag: String,
    pub class_name: String,
    pub text: String,
}

/// Attribute an interaction to the nearest trackable ancestor of `target`.
pub fn target_meta(target: &ElementRef) -> TargetMeta {
    let el = closest(target, TRACK_ATTR).unwrap_or_else(|| target.clone());

    let action = el
        .get_attr(TRACK_ATTR)
        .filter(|a| !a.is_empty())
        .unwrap_or(DEFAULT_ACTION)
        .to_string();
    let target_id = el
        .get_attr(TRACK_ID_ATTR)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .or_else(|| el.id.clone().filter(|id| !id.is_empty()));

    TargetMeta {
        action,
        target_id,
        tag: el.tag.to_lowercase(),
        class_name: truncate_chars(&el.class_name, MAX_CLASS_LEN),
        text: collapse_whitespace(&el.text, MAX_TEXT_LEN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Element;

    fn state(top: f64, height: f64, client: f64) -> ScrollState {
        ScrollState {
            scroll_top: top,
            scroll_height: height,
            client_height: client,
        }
    }

    #[test]
    fn depth_is_percentage_of_scrollable_range() {
        let m = ScrollMetrics::from(state(500.0, 2000.0, 1000.0));
        assert_eq!(m.depth_pct, 50.0);
    }

    #[test]
    fn depth_stays_in_range_for_degenerate_documents() {
        // No scrollable range: denominator floors at 1.
        assert_eq!(ScrollMetrics::from(state(0.0, 800.0, 800.0)).depth_pct, 0.0);
        assert_eq!(ScrollMetrics::from(state(3.0, 800.0, 800.0)).depth_pct, 100.0);
        // Content shorter than the viewport.
        assert_eq!(ScrollMetrics::from(state(0.0, 0.0, 800.0)).depth_pct, 0.0);
        // Overscroll / rubber-banding.
        assert_eq!(ScrollMetrics::from(state(-40.0, 2000.0, 800.0)).depth_pct, 0.0);
        assert_eq!(ScrollMetrics::from(state(5000.0, 2000.0, 800.0)).depth_pct, 100.0);
        assert_eq!(ScrollMetrics::from(state(f64::NAN, 2000.0, 800.0)).depth_pct, 0.0);
    }

    #[test]
    fn target_meta_prefers_annotated_ancestor() {
        let card = Element::new("ARTICLE")
            .class("weibo-card weibo-card--ai")
            .text("  AI   answer\n summary ")
            .track("open_ai_card")
            .track_id("ai-card-1")
            .build();
        let icon = Element::new("svg").id("icon-3").child_of(&card).build();

        let meta = target_meta(&icon);
        assert_eq!(meta.action, "open_ai_card");
        assert_eq!(meta.target_id.as_deref(), Some("ai-card-1"));
        assert_eq!(meta.tag, "article");
        assert_eq!(meta.text, "AI answer summary");
    }

    #[test]
    fn target_meta_falls_back_to_raw_element() {
        let long_class = "c".repeat(300);
        let long_text = "word ".repeat(40);
        let el = Element::new("DIV")
            .id("plain")
            .class(long_class)
            .text(long_text)
            .build();

        let meta = target_meta(&el);
        assert_eq!(meta.action, DEFAULT_ACTION);
        assert_eq!(meta.target_id.as_deref(), Some("plain"));
        assert_eq!(meta.tag, "div");
        assert_eq!(meta.class_name.len(), MAX_CLASS_LEN);
        assert_eq!(meta.text.chars().count(), MAX_TEXT_LEN);
    }

    #[test]
    fn annotation_without_id_uses_element_id() {
        let btn = Element::new("button").id("like-btn").track("like").build();
        let meta = target_meta(&btn);
        assert_eq!(meta.action, "like");
        assert_eq!(meta.target_id.as_deref(), Some("like-btn"));
    }
}
