use crate::config::TrackerConfig;

/// The five keys stamped onto every record of one page-view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationKeys {
    pub page_id: String,
    pub page_session_id: String,
    pub session_id: String,
    pub condition: String,
    pub participant_id: String,
}

impl CorrelationKeys {
    pub fn new(cfg: &TrackerConfig, session_id: String, page_session_id: String) -> Self {
        Self {
            page_id: cfg.page_id.clone(),
            page_session_id,
            session_id,
            condition: cfg.condition.clone(),
            participant_id: cfg.participant_id.clone(),
        }
    }
}
