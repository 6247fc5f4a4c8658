use std::{collections::BTreeMap, sync::Arc};

pub type ElementRef = Arc<Element>;

/// Attribute naming the semantic action of a trackable element.
pub const TRACK_ATTR: &str = "data-track";
/// Attribute carrying the stable identifier of a trackable element.
pub const TRACK_ID_ATTR: &str = "data-track-id";

/// Snapshot of a DOM node and its ancestor chain.
#[derive(Clone, Debug, Default)]
pub struct Element {
    pub tag: String,
    pub id: Option<String>,
    pub class_name: String,
    pub text: String,
    pub attributes: BTreeMap<String, String>,
    pub parent: Option<ElementRef>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Mark the element as trackable under `action`.
    pub fn track(self, action: impl Into<String>) -> Self {
        self.attr(TRACK_ATTR, action)
    }

    pub fn track_id(self, id: impl Into<String>) -> Self {
        self.attr(TRACK_ID_ATTR, id)
    }

    pub fn child_of(mut self, parent: &ElementRef) -> Self {
        self.parent = Some(Arc::clone(parent));
        self
    }

    pub fn build(self) -> ElementRef {
        Arc::new(self)
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }
}

/// Nearest element, starting at `el` itself, that carries `attr`.
pub fn closest(el: &ElementRef, attr: &str) -> Option<ElementRef> {
    let mut current = Some(el);
    while let Some(node) = current {
        if node.has_attr(attr) {
            return Some(Arc::clone(node));
        }
        current = node.parent.as_ref();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closest_walks_up_to_annotated_ancestor() {
        let card = Element::new("article").track("open_post").track_id("post-7").build();
        let body = Element::new("div").class("card-body").child_of(&card).build();
        let span = Element::new("span").text("hello").child_of(&body).build();

        let found = closest(&span, TRACK_ATTR).unwrap();
        assert_eq!(found.tag, "article");
        assert_eq!(found.get_attr(TRACK_ID_ATTR), Some("post-7"));
    }

    #[test]
    fn closest_includes_self_and_misses_cleanly() {
        let btn = Element::new("button").track("like").build();
        assert!(Arc::ptr_eq(&closest(&btn, TRACK_ATTR).unwrap(), &btn));

        let plain = Element::new("p").build();
        assert!(closest(&plain, TRACK_ATTR).is_none());
    }
}
