//! Feedlab Core Library
//!
//! Client-side interaction telemetry for the feedlab mobile-feed simulation:
//! turns browser signals into sequenced records, buffers them, and delivers
//! them in batches, with a beacon fallback when the page goes away.

pub mod config;
pub mod env;
pub mod error;
pub mod events;
pub mod format;
pub mod identity;
pub mod metrics;
pub mod queues;
pub mod scheduler;
pub mod tracker;
pub mod transport;
pub mod types;
pub mod unload;

// Re-export commonly used items at crate root
pub use config::{PipelineConfig, TrackerConfig};
pub use env::{BrowserEvent, Element, ElementRef, Environment, ListenerKind, SimulatedPage, TouchPoint};
pub use error::{Result, TelemetryError};
pub use events::{EventBatch, EventDraft, EventName, EventRecord, Meta};
pub use identity::{FileStore, MemoryStore, SessionStore};
pub use metrics::{ScrollMetrics, TargetMeta, scroll_metrics, target_meta};
pub use queues::EventQueue;
pub use scheduler::{FlushOutcome, FlushScheduler, FlushStatsSnapshot};
pub use tracker::{PageTracker, TrackerDeps, TrackerState};
pub use transport::{Beacon, HttpBeacon, HttpTransport, RecordingBeacon, RecordingTransport, Transport};
pub use types::{ScrollState, ViewerProfile, Viewport, Visibility};
pub use unload::{UnloadGuard, UnloadReport};
