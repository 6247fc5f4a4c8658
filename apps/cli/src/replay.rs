use std::{sync::Arc, time::Duration};

use feedlab_core::{
    Beacon, BrowserEvent, FlushOutcome, FlushStatsSnapshot, PageTracker, PipelineConfig,
    SessionStore, SimulatedPage, TouchPoint, TrackerDeps, Transport, Visibility,
    events::CorrelationKeys,
};
use tracing::debug;

use crate::script::{ReplayScript, Step, StepAction, TouchPhase};

pub struct ReplayOutcome {
    pub keys: CorrelationKeys,
    pub steps_applied: usize,
    pub last_seq: u64,
    pub stats: FlushStatsSnapshot,
    pub final_flush: FlushOutcome,
}

/// Mount a tracker on `page`, play `script` against it in real time, then
/// unmount and wait for the final flush.
pub async fn run_replay(
    script: &ReplayScript,
    pipeline: &PipelineConfig,
    page: Arc<SimulatedPage>,
    store: Arc<dyn SessionStore>,
    transport: Arc<dyn Transport>,
    beacon: Arc<dyn Beacon>,
    mut on_step: impl FnMut(usize, &Step),
) -> anyhow::Result<ReplayOutcome> {
    if let Some(referrer) = &script.referrer {
        page.set_referrer(referrer.clone());
    }
    if let Some(height) = script.document_height {
        page.set_document_height(height);
    }

    let tracker = PageTracker::mount(
        script.tracker.clone(),
        pipeline,
        TrackerDeps {
            env: page.clone(),
            store,
            transport,
            beacon,
        },
    )?;

    let mut steps_applied = 0;
    for (i, step) in script.steps.iter().enumerate() {
        if step.wait_ms > 0 {
            tokio::time::sleep(Duration::from_millis(step.wait_ms)).await;
        }
        on_step(i, step);
        if apply(&page, &step.action) {
            steps_applied += 1;
        } else {
            debug!(step = i, "no listener observed step");
        }
    }

    let keys = tracker.keys().clone();
    let final_flush = match tracker.unmount() {
        Some(handle) => handle.await?,
        None => FlushOutcome::Empty,
    };

    Ok(ReplayOutcome {
        keys,
        steps_applied,
        last_seq: tracker.queue().last_seq(),
        stats: tracker.flush_stats(),
        final_flush,
    })
}

fn apply(page: &SimulatedPage, action: &StepAction) -> bool {
    match action {
        StepAction::Scroll { top } => page.scroll_to(*top),
        StepAction::Click { target, x, y } => page.dispatch(BrowserEvent::Click {
            target: target.to_element(),
            x: *x,
            y: *y,
        }),
        StepAction::Touch {
            phase,
            touches,
            x,
            y,
        } => {
            let point = TouchPoint {
                touches: *touches,
                x: *x,
                y: *y,
            };
            page.dispatch(match phase {
                TouchPhase::Start => BrowserEvent::TouchStart(point),
                TouchPhase::Move => BrowserEvent::TouchMove(point),
                TouchPhase::End => BrowserEvent::TouchEnd(point),
            })
        }
        StepAction::Input {
            target,
            value_length,
        } => page.dispatch(BrowserEvent::Input {
            target: target.to_element(),
            value_len: *value_length,
        }),
        StepAction::Hide => page.change_visibility(Visibility::Hidden),
        StepAction::Show => page.change_visibility(Visibility::Visible),
        StepAction::Focus => page.dispatch(BrowserEvent::Focus),
        StepAction::Blur => page.dispatch(BrowserEvent::Blur),
        StepAction::Navigate { url } => page.pop_state(url.clone()),
        StepAction::Offline => {
            page.set_online(false);
            true
        }
        StepAction::Online => {
            page.set_online(true);
            true
        }
        StepAction::PageHide => page.dispatch(BrowserEvent::PageHide),
        StepAction::BeforeUnload => page.dispatch(BrowserEvent::BeforeUnload),
    }
}

#[cfg(test)]
mod tests {
    use feedlab_core::{EventName, MemoryStore, RecordingBeacon, RecordingTransport};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn bundled_script_replays_end_to_end() {
        let script: ReplayScript =
            serde_json::from_str(include_str!("../scripts/ai_card_visit.json")).unwrap();
        let page = Arc::new(SimulatedPage::new(script.url.clone()));
        let transport = Arc::new(RecordingTransport::new());
        let beacon = Arc::new(RecordingBeacon::new());

        let mut seen = 0;
        let outcome = run_replay(
            &script,
            &PipelineConfig::default(),
            page,
            Arc::new(MemoryStore::new()),
            transport.clone(),
            beacon.clone(),
            |_, _| seen += 1,
        )
        .await
        .unwrap();

        assert_eq!(seen, script.steps.len());
        assert_eq!(outcome.steps_applied, script.steps.len());
        assert_eq!(outcome.keys.participant_id, "p001");

        // Everything stamped was delivered exactly once, by one path or the other.
        let mut seqs: Vec<u64> = transport
            .records()
            .into_iter()
            .chain(beacon.sent().into_iter().flat_map(|b| b.events))
            .map(|r| r.seq)
            .collect();
        seqs.sort_unstable();
        let expected: Vec<u64> = (1..=outcome.last_seq).collect();
        assert_eq!(seqs, expected);

        // The hide step fires the guard before the final pagehide does.
        let sent = beacon.sent();
        assert_eq!(sent.len(), 2);
        let hide_exit = &sent[0].events[0];
        assert_eq!(hide_exit.event_name, EventName::PageExit);
        assert_eq!(hide_exit.meta["occupation"], "student");
        assert_eq!(hide_exit.meta["reason"], "visibilitychange");
        assert_eq!(sent[1].events[0].meta["reason"], "pagehide");

        let enter = transport
            .records()
            .into_iter()
            .chain(beacon.sent().into_iter().flat_map(|b| b.events))
            .find(|r| r.event_name == EventName::PageEnter)
            .unwrap();
        assert_eq!(enter.meta["referrer"], "https://lab.feedlab.local/");
    }
}
