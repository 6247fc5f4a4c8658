//! Delivery primitives shared by the flush scheduler and the unload guard.

pub mod http;
pub mod memory;

pub use http::*;
pub use memory::*;

use async_trait::async_trait;

use crate::{error::Result, events::EventBatch};

/// Awaited request/response delivery. Any `Err` means the whole batch
/// failed and will be retried.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, batch: &EventBatch) -> Result<()>;
}

/// Fire-and-forget delivery that must not depend on the page staying
/// alive. The return value only says whether the send was queued.
pub trait Beacon: Send + Sync {
    fn send_beacon(&self, batch: EventBatch) -> bool;
}
