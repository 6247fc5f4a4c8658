use std::path::Path;

use feedlab_core::{Element, ElementRef, TrackerConfig};
use serde::Deserialize;
use tokio::fs;

/// A scripted visit: who is visiting and what they do, step by step.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayScript {
    pub tracker: TrackerConfig,
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub document_height: Option<f64>,
    pub steps: Vec<Step>,
}

fn default_url() -> String {
    "https://lab.feedlab.local/".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Pause before the action, in milliseconds.
    #[serde(default)]
    pub wait_ms: u64,
    #[serde(flatten)]
    pub action: StepAction,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum StepAction {
    Scroll {
        top: f64,
    },
    Click {
        target: TargetSpec,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
    },
    Touch {
        phase: TouchPhase,
        #[serde(default = "one")]
        touches: u32,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
    },
    Input {
        target: TargetSpec,
        value_length: usize,
    },
    Hide,
    Show,
    Focus,
    Blur,
    Navigate {
        url: String,
    },
    Offline,
    Online,
    PageHide,
    BeforeUnload,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TouchPhase {
    Start,
    Move,
    End,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSpec {
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub track_id: Option<String>,
    #[serde(default)]
    pub parent: Option<Box<TargetSpec>>,
}

fn default_tag() -> String {
    "div".to_string()
}

impl TargetSpec {
    pub fn to_element(&self) -> ElementRef {
        let mut el = Element::new(&self.tag)
            .class(&self.class_name)
            .text(&self.text);
        if let Some(id) = &self.id {
            el = el.id(id);
        }
        if let Some(track) = &self.track {
            el = el.track(track);
        }
        if let Some(track_id) = &self.track_id {
            el = el.track_id(track_id);
        }
        if let Some(parent) = &self.parent {
            el = el.child_of(&parent.to_element());
        }
        el.build()
    }
}

impl ReplayScript {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let json_content = fs::read_to_string(path).await?;
        let script: ReplayScript = serde_json::from_str(&json_content)?;
        script.tracker.validate()?;
        Ok(script)
    }

    pub fn total_wait_ms(&self) -> u64 {
        self.steps.iter().map(|s| s.wait_ms).sum()
    }
}
